//! シミュレーション状態の契約（GameState）
//!
//! 探索コアはゲーム側の盤面表現を直接は見ない。手の列挙・適用・終端
//! 評価をこのトレイト越しに呼ぶだけで、盤面実装はコラボレータが持つ。
//! 状態は探索ごと・スレッドごとにクローンされ、スレッド間では共有
//! されない。

use smallvec::SmallVec;

use super::lgr::LastGoodReply;
use crate::tree::{NodeExpander, NodeIdx};
use crate::types::{Color, Float, Move, MoveList, PlayerMove};

/// プレイヤー数の上限
pub const MAX_PLAYERS: usize = Color::MAX;

/// プレイヤーごとの評価値ベクトル（[0, 1]）
pub type Eval = [Float; MAX_PLAYERS];

/// ゲーム状態の契約
pub trait GameState: Clone + Send + 'static {
    /// プレイヤー数
    fn nu_players(&self) -> usize;

    /// 現局面の手番
    fn player_to_move(&self) -> Color;

    /// 指し手 id の範囲（RAVE 用テーブルのサイズ）
    fn move_range(&self) -> usize;

    /// 探索開始時に一度呼ばれる
    fn start_search(&mut self) {}

    /// シミュレーション開始。`n` は探索全体での通し番号で、状態を
    /// ルート局面に巻き戻す（決定的な乱数の種にも使える）
    fn start_simulation(&mut self, n: usize);

    /// 現局面の合法手を prior 付きで展開する
    ///
    /// 列挙順は局面に対して決定的であること（同じ局面なら同じ順）。
    /// `init_val` は prior の初期値に使えるルート評価の現在値。
    fn gen_children(&mut self, expander: &mut NodeExpander<'_>, init_val: Float);

    /// in-tree フェーズでの指し手適用
    fn play_in_tree(&mut self, mv: Move);

    /// in-tree フェーズの終了
    fn finish_in_tree(&mut self) {}

    /// 展開直後の子への指し手適用
    fn play_expanded_child(&mut self, mv: Move);

    /// playout フェーズの開始
    fn start_playout(&mut self) {}

    /// playout の次の一手を生成する（None = 終端/合法手なし）
    ///
    /// `last`/`second_last` は直前 2 手（LGR のキー）。
    fn gen_playout_move(
        &mut self,
        lgr: Option<&LastGoodReply>,
        last: Move,
        second_last: Move,
    ) -> Option<PlayerMove>;

    /// playout フェーズでの指し手適用
    fn play_playout(&mut self, mv: Move);

    /// 終端（または手詰まり）局面の評価
    fn evaluate(&self, eval: &mut Eval);

    /// この指し手を RAVE 更新から除外するか
    fn skip_rave(&self, _mv: Move) -> bool {
        false
    }

    /// 前回探索のルート `prev` からこの局面への指し手列
    ///
    /// 後続局面でなければ None。同一局面なら空列。サブツリー再利用の
    /// 判定に使われる。
    fn followup_sequence(&self, _prev: &Self) -> Option<MoveList> {
        None
    }
}

/// 1 シミュレーション分の経路（スレッドローカル、共有しない）
#[derive(Debug, Default)]
pub struct Simulation {
    /// ルートから葉までのノード列（nodes.len() == moves.len() + 1）
    pub nodes: SmallVec<[NodeIdx; 128]>,
    /// 経路上の (手番, 指し手) 列（playout の手を含む）
    pub moves: SmallVec<[PlayerMove; 128]>,
    /// プレイヤーごとの評価
    pub eval: Eval,
}

impl Simulation {
    pub fn new() -> Simulation {
        Simulation {
            nodes: SmallVec::new(),
            moves: SmallVec::new(),
            eval: [0.0; MAX_PLAYERS],
        }
    }
}
