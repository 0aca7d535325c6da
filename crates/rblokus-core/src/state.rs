//! Blokus 用シミュレーション状態（GameState 実装）
//!
//! ルート局面のスナップショットを持ち、シミュレーションごとに盤面を
//! コピーして進める（取り消しなし）。指し手生成は接続点 × 前計算
//! リストを生きた隣接禁止ステータスでフィルタする。playout は一様
//! ランダム + Last-Good-Reply 優先。
//!
//! 序盤は大きいピースだけを候補にする（小さいピースを早く使うのは
//! ほぼ常に損なため）。スケジュールはバリアントごとに固定。

use std::sync::Arc;

use rand::Rng;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::board::{Board, MoveMarker};
use crate::movegen::BoardConst;
use crate::search::{Eval, GameState, LastGoodReply};
use crate::tree::NodeExpander;
use crate::types::{Color, Float, Move, MoveList, PlayerMove};
use crate::variant::{BoardType, Variant};

// =============================================================================
// ピース候補スケジュール
// =============================================================================

/// 手数ごとの候補ピース表
#[derive(Debug)]
struct ConsiderTable {
    /// インデックスは盤上の総手数
    by_move: Vec<Vec<bool>>,
    all: Vec<bool>,
}

impl ConsiderTable {
    fn considered(&self, nu_moves: usize) -> &[bool] {
        self.by_move.get(nu_moves).unwrap_or(&self.all)
    }
}

fn filter_min_size(bc: &BoardConst, min_size: u32, considered: &mut [bool]) {
    for i in 0..bc.nu_pieces() {
        if bc.piece_info(crate::types::Piece::new(i as u8)).score_points() < min_size {
            considered[i] = false;
        }
    }
}

fn set_piece_considered(bc: &BoardConst, name: &str, considered: &mut [bool], value: bool) {
    let piece = bc.piece_by_name(name).expect("unknown piece name");
    considered[piece.index()] = value;
}

fn pieces_considered(bc: &BoardConst, nu_moves: usize) -> Vec<bool> {
    let nu_colors = bc.variant().nu_colors() as usize;
    let mut considered = vec![true; bc.nu_pieces()];
    match bc.variant().board_type() {
        BoardType::Duo => {
            if nu_moves < 2 * nu_colors {
                filter_min_size(bc, 5, &mut considered);
            } else if nu_moves < 3 * nu_colors {
                filter_min_size(bc, 4, &mut considered);
            } else if nu_moves < 5 * nu_colors {
                filter_min_size(bc, 3, &mut considered);
            }
        }
        BoardType::Classic => {
            if nu_moves < nu_colors {
                considered.fill(false);
                set_piece_considered(bc, "V5", &mut considered, true);
                set_piece_considered(bc, "Z5", &mut considered, true);
            } else if nu_moves < 2 * nu_colors {
                filter_min_size(bc, 5, &mut considered);
                set_piece_considered(bc, "F", &mut considered, false);
                set_piece_considered(bc, "P", &mut considered, false);
                set_piece_considered(bc, "T5", &mut considered, false);
                set_piece_considered(bc, "U", &mut considered, false);
                set_piece_considered(bc, "X", &mut considered, false);
            } else if nu_moves < 3 * nu_colors {
                filter_min_size(bc, 5, &mut considered);
                set_piece_considered(bc, "P", &mut considered, false);
                set_piece_considered(bc, "U", &mut considered, false);
            } else if nu_moves < 5 * nu_colors {
                filter_min_size(bc, 4, &mut considered);
            } else if nu_moves < 7 * nu_colors {
                filter_min_size(bc, 3, &mut considered);
            }
        }
    }
    considered
}

fn build_consider_table(bc: &BoardConst) -> ConsiderTable {
    let nu_colors = bc.variant().nu_colors() as usize;
    let by_move = (0..7 * nu_colors)
        .map(|i| pieces_considered(bc, i))
        .collect();
    ConsiderTable {
        by_move,
        all: vec![true; bc.nu_pieces()],
    }
}

// =============================================================================
// BlokusState
// =============================================================================

/// Blokus のシミュレーション状態
///
/// スレッドごと・探索ごとにクローンされる。乱数はシミュレーション
/// 通し番号から種を導くので、シングルスレッドなら再現可能。
#[derive(Clone)]
pub struct BlokusState {
    root: Board,
    bd: Board,
    root_game_over: bool,
    game_over: bool,
    consider: Arc<ConsiderTable>,
    marker: MoveMarker,
    moves_buf: Vec<Move>,
    rng: Xoshiro256PlusPlus,
    base_seed: u64,
}

impl BlokusState {
    /// 局面から状態を作る。手番が詰んでいる色なら次の色へ進める
    pub fn new(mut board: Board, seed: u64) -> BlokusState {
        let consider = Arc::new(build_consider_table(board.board_const()));
        let marker = MoveMarker::new(board.board_const().nu_moves());
        let game_over = !advance_to_play(&mut board);
        BlokusState {
            root: board.clone(),
            bd: board,
            root_game_over: game_over,
            game_over,
            consider,
            marker,
            moves_buf: Vec::new(),
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
            base_seed: seed,
        }
    }

    /// 初期局面から状態を作る
    pub fn from_variant(variant: Variant, seed: u64) -> BlokusState {
        BlokusState::new(Board::new(BoardConst::get(variant)), seed)
    }

    /// 現在のシミュレーション盤面
    pub fn board(&self) -> &Board {
        &self.bd
    }

    /// ルート局面
    pub fn root_board(&self) -> &Board {
        &self.root
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    fn play(&mut self, mv: Move) {
        let c = self.bd.to_play();
        self.bd.play(c, mv);
        if !advance_to_play(&mut self.bd) {
            self.game_over = true;
        }
    }

    /// 現手番の合法手を `moves_buf` に列挙する（候補ピースが空振りなら
    /// 全ピースで再列挙）
    fn gen_moves_to_buf(&mut self) {
        let c = self.bd.to_play();
        let considered = self.consider.considered(self.bd.nu_moves_played());
        self.moves_buf.clear();
        self.bd
            .gen_moves(c, considered, &mut self.marker, &mut self.moves_buf);
        if self.moves_buf.is_empty() {
            self.bd
                .gen_moves(c, &self.consider.all, &mut self.marker, &mut self.moves_buf);
        }
    }

    /// LGR の応手が今の局面でも指せるか
    fn is_lgr_reply_playable(&self, c: Color, reply: Move) -> bool {
        if reply.is_null() || self.bd.is_first_move(c) {
            return false;
        }
        let bc = self.bd.board_const();
        self.bd.is_piece_left(c, bc.move_info(reply).piece())
            && self.bd.is_move_legal(c, reply)
            && self.bd.is_move_attached(c, reply)
    }
}

/// 合法手を持つ色まで手番を進める。全滅なら false
fn advance_to_play(bd: &mut Board) -> bool {
    for _ in 0..bd.nu_colors() {
        let c = bd.to_play();
        if bd.has_moves(c) {
            return true;
        }
        bd.set_dead(c);
        bd.skip_to_play();
    }
    false
}

impl GameState for BlokusState {
    fn nu_players(&self) -> usize {
        self.bd.nu_colors() as usize
    }

    fn player_to_move(&self) -> Color {
        self.bd.to_play()
    }

    fn move_range(&self) -> usize {
        self.bd.board_const().nu_moves()
    }

    fn start_simulation(&mut self, n: usize) {
        self.bd = self.root.clone();
        self.game_over = self.root_game_over;
        self.rng = Xoshiro256PlusPlus::seed_from_u64(
            self.base_seed ^ (n as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15),
        );
    }

    fn gen_children(&mut self, expander: &mut NodeExpander<'_>, init_val: Float) {
        if self.game_over {
            return;
        }
        self.gen_moves_to_buf();
        for i in 0..self.moves_buf.len() {
            expander.add_child(self.moves_buf[i], init_val, 1.0);
        }
    }

    fn play_in_tree(&mut self, mv: Move) {
        self.play(mv);
    }

    fn play_expanded_child(&mut self, mv: Move) {
        self.play(mv);
    }

    fn gen_playout_move(
        &mut self,
        lgr: Option<&LastGoodReply>,
        last: Move,
        second_last: Move,
    ) -> Option<PlayerMove> {
        if self.game_over {
            return None;
        }
        let c = self.bd.to_play();
        if let Some(lgr) = lgr {
            if let Some(reply) = lgr.lookup(c, last, second_last) {
                if self.is_lgr_reply_playable(c, reply) {
                    return Some(PlayerMove::new(c, reply));
                }
            }
        }
        self.gen_moves_to_buf();
        debug_assert!(!self.moves_buf.is_empty());
        let mv = self.moves_buf[self.rng.random_range(0..self.moves_buf.len())];
        Some(PlayerMove::new(c, mv))
    }

    fn play_playout(&mut self, mv: Move) {
        self.play(mv);
    }

    fn evaluate(&self, eval: &mut Eval) {
        let n = self.bd.nu_colors() as usize;
        let mut points = [0i32; crate::search::MAX_PLAYERS];
        for (i, p) in points.iter_mut().enumerate().take(n) {
            *p = self.bd.points(Color::new(i as u8));
        }
        for i in 0..n {
            let mut base: Float = 0.0;
            let mut best_other = i32::MIN;
            for (j, &pts) in points.iter().enumerate().take(n) {
                if j == i {
                    continue;
                }
                if points[i] > pts {
                    base += 1.0;
                } else if points[i] == pts {
                    base += 0.5;
                }
                best_other = best_other.max(pts);
            }
            base /= (n - 1) as Float;
            // 僅差より大差の勝ちを好むよう点差を弱く混ぜる。引き分けは
            // ちょうど 0.5 になる
            let margin = ((points[i] - best_other) as Float / 80.0).clamp(-0.5, 0.5);
            eval[i] = 0.99 * base + 0.01 * (0.5 + margin);
        }
    }

    fn followup_sequence(&self, prev: &Self) -> Option<MoveList> {
        if !Arc::ptr_eq(self.root.board_const(), prev.root.board_const()) {
            return None;
        }
        let prev_history = prev.root.history();
        let history = self.root.history();
        if history.len() < prev_history.len() || &history[..prev_history.len()] != prev_history {
            return None;
        }
        Some(history[prev_history.len()..].iter().map(|&(_, mv)| mv).collect())
    }
}

// =============================================================================
// テスト
// =============================================================================
