//! Blokus 盤面（ゲーム側コラボレータ）
//!
//! 探索コアが消費する盤面実装。占有状態に加えて、色ごとの禁止マスと
//! 接続点（斜め接触候補）を `MoveInfoExt` の前計算リストから差分更新する。
//! 指し手の取り消しはない。シミュレーションはルート盤面のコピーから
//! 開始する（探索側の `start_simulation` 参照）。

use std::sync::Arc;

use smallvec::SmallVec;

use crate::movegen::BoardConst;
use crate::types::{Color, Move, Piece, Point};

/// 占有状態（色 index、EMPTY は空きマス）
const EMPTY: u8 = u8::MAX;

/// 指し手生成の重複排除用マーカー
///
/// 世代スタンプ方式でクリアを O(1) にする。
#[derive(Debug, Clone)]
pub struct MoveMarker {
    stamps: Vec<u32>,
    generation: u32,
}

impl MoveMarker {
    pub fn new(nu_moves: usize) -> MoveMarker {
        MoveMarker {
            stamps: vec![0; nu_moves],
            generation: 0,
        }
    }

    #[inline]
    pub fn clear(&mut self) {
        self.generation += 1;
        if self.generation == 0 {
            self.stamps.fill(0);
            self.generation = 1;
        }
    }

    /// 未マークなら true を返してマークする
    #[inline]
    pub fn check_and_set(&mut self, mv: Move) -> bool {
        let stamp = &mut self.stamps[mv.index()];
        if *stamp == self.generation {
            false
        } else {
            *stamp = self.generation;
            true
        }
    }
}

/// 色ごとの状態
#[derive(Debug, Clone)]
struct ColorState {
    /// 占有または自色に直交隣接して置けないマス
    is_forbidden: Vec<bool>,
    /// 接続点フラグ（重複 push 防止用）
    is_attach: Vec<bool>,
    /// 接続点リスト（追記のみ。使用時に forbidden を確認する）
    attach_points: Vec<Point>,
    /// 手持ちピース
    pieces_left: Vec<bool>,
    nu_left: usize,
    /// 置いたマス数
    placed_points: u32,
    last_piece: Option<Piece>,
    /// 合法手が尽きた色（盤面は埋まる一方なので復活しない）
    is_dead: bool,
}

/// Blokus 盤面
#[derive(Clone)]
pub struct Board {
    bc: Arc<BoardConst>,
    point_state: Vec<u8>,
    colors: Vec<ColorState>,
    to_play: Color,
    nu_colors: u8,
    history: Vec<(Color, Move)>,
}

impl Board {
    pub fn new(bc: Arc<BoardConst>) -> Board {
        let nu_points = bc.geometry().nu_points();
        let nu_colors = bc.variant().nu_colors();
        let nu_pieces = bc.nu_pieces();
        let colors = (0..nu_colors)
            .map(|_| ColorState {
                is_forbidden: vec![false; nu_points],
                is_attach: vec![false; nu_points],
                attach_points: Vec::new(),
                pieces_left: vec![true; nu_pieces],
                nu_left: nu_pieces,
                placed_points: 0,
                last_piece: None,
                is_dead: false,
            })
            .collect();
        Board {
            bc,
            point_state: vec![EMPTY; nu_points],
            colors,
            to_play: Color::new(0),
            nu_colors,
            history: Vec::new(),
        }
    }

    #[inline]
    pub fn board_const(&self) -> &Arc<BoardConst> {
        &self.bc
    }

    #[inline]
    pub fn nu_colors(&self) -> u8 {
        self.nu_colors
    }

    #[inline]
    pub fn to_play(&self) -> Color {
        self.to_play
    }

    #[inline]
    pub fn nu_moves_played(&self) -> usize {
        self.history.len()
    }

    #[inline]
    pub fn history(&self) -> &[(Color, Move)] {
        &self.history
    }

    #[inline]
    pub fn point_state(&self, p: Point) -> Option<Color> {
        let s = self.point_state[p.index()];
        if s == EMPTY {
            None
        } else {
            Some(Color::new(s))
        }
    }

    #[inline]
    pub fn is_forbidden(&self, c: Color, p: Point) -> bool {
        self.colors[c.index()].is_forbidden[p.index()]
    }

    #[inline]
    pub fn is_piece_left(&self, c: Color, piece: Piece) -> bool {
        self.colors[c.index()].pieces_left[piece.index()]
    }

    #[inline]
    pub fn is_first_move(&self, c: Color) -> bool {
        self.colors[c.index()].nu_left == self.bc.nu_pieces()
    }

    /// 指し手全体が今の盤面で合法か（セル単位の最終チェック）
    #[inline]
    pub fn is_move_legal(&self, c: Color, mv: Move) -> bool {
        let forbidden = &self.colors[c.index()].is_forbidden;
        self.bc
            .move_info(mv)
            .points()
            .iter()
            .all(|p| !forbidden[p.index()])
    }

    /// いずれかのセルが自色と斜め接触しているか
    ///
    /// 接続点起点の生成では自明に成り立つが、LGR など外から来た指し手の
    /// 検証に使う。
    pub fn is_move_attached(&self, c: Color, mv: Move) -> bool {
        let geo = self.bc.geometry();
        self.bc
            .move_info(mv)
            .points()
            .iter()
            .any(|&p| geo.diag(p).iter().any(|&q| self.point_state(q) == Some(c)))
    }

    /// 点 `p` の隣接禁止ステータス（前計算リストのインデックス）
    #[inline]
    pub fn adj_status(&self, p: Point, c: Color) -> usize {
        let forbidden = &self.colors[c.index()].is_forbidden;
        let mut status = 0;
        for (i, &q) in self.bc.adj_status_list(p).iter().enumerate() {
            if forbidden[q.index()] {
                status |= 1 << i;
            }
        }
        status
    }

    /// 指し手を適用し、手番を進める
    pub fn play(&mut self, c: Color, mv: Move) {
        debug_assert!(self.is_move_legal(c, mv));
        debug_assert!(self.is_piece_left(c, self.bc.move_info(mv).piece()));
        let info = self.bc.move_info(mv);
        let ext = self.bc.move_info_ext(mv);
        for &p in info.points() {
            self.point_state[p.index()] = c.index() as u8;
            for cc in 0..self.nu_colors as usize {
                self.colors[cc].is_forbidden[p.index()] = true;
            }
        }
        let state = &mut self.colors[c.index()];
        for &p in ext.adj_points() {
            state.is_forbidden[p.index()] = true;
        }
        for &p in ext.attach_points() {
            if !state.is_attach[p.index()] {
                state.is_attach[p.index()] = true;
                state.attach_points.push(p);
            }
        }
        let piece = info.piece();
        state.pieces_left[piece.index()] = false;
        state.nu_left -= 1;
        state.placed_points += info.points().len() as u32;
        state.last_piece = Some(piece);
        self.history.push((c, mv));
        self.to_play = c.next(self.nu_colors);
    }

    /// 手番を次の色へ進める（合法手のない色のパス用）
    #[inline]
    pub fn skip_to_play(&mut self) {
        self.to_play = self.to_play.next(self.nu_colors);
    }

    /// 色 c の合法手を列挙する
    ///
    /// `is_piece_considered` が指すピースだけを対象にする（序盤の
    /// 大ピース優先フィルタ用）。重複排除に `marker` を使う。
    pub fn gen_moves(
        &self,
        c: Color,
        is_piece_considered: &[bool],
        marker: &mut MoveMarker,
        out: &mut Vec<Move>,
    ) {
        marker.clear();
        self.for_each_candidate(c, is_piece_considered, |mv| {
            if marker.check_and_set(mv) {
                out.push(mv);
            }
            true
        });
    }

    /// 色 c に合法手が存在するか
    pub fn has_moves(&self, c: Color) -> bool {
        if self.colors[c.index()].is_dead {
            return false;
        }
        let all = vec![true; self.bc.nu_pieces()];
        let mut found = false;
        self.for_each_candidate(c, &all, |_| {
            found = true;
            false
        });
        found
    }

    /// 合法手が尽きた色として記録する
    pub fn set_dead(&mut self, c: Color) {
        self.colors[c.index()].is_dead = true;
    }

    #[inline]
    pub fn is_dead(&self, c: Color) -> bool {
        self.colors[c.index()].is_dead
    }

    /// 接続点（初手は開始点）を走査して合法手候補を列挙する。
    /// コールバックが false を返したら打ち切る。
    fn for_each_candidate(
        &self,
        c: Color,
        is_piece_considered: &[bool],
        mut f: impl FnMut(Move) -> bool,
    ) {
        let state = &self.colors[c.index()];
        let precomp = self.bc.precomp_moves();
        let pieces: SmallVec<[Piece; 24]> = (0..self.bc.nu_pieces())
            .map(|i| Piece::new(i as u8))
            .filter(|p| state.pieces_left[p.index()] && is_piece_considered[p.index()])
            .collect();
        let anchors: &[Point] = if self.is_first_move(c) {
            self.bc.starting_points(c)
        } else {
            &state.attach_points
        };
        for &p in anchors {
            if state.is_forbidden[p.index()] {
                continue;
            }
            let adj_status = self.adj_status(p, c);
            for &piece in &pieces {
                for &mv in precomp.moves(piece, p, adj_status) {
                    if self.is_move_legal(c, mv) && !f(mv) {
                        return;
                    }
                }
            }
        }
    }

    /// 色 c の得点（置いたマス数 + 全ピースボーナス）
    pub fn points(&self, c: Color) -> i32 {
        let state = &self.colors[c.index()];
        let mut points = state.placed_points as i32;
        if state.nu_left == 0 {
            points += 15;
            if state.last_piece == Some(self.bc.piece_by_name("1").unwrap()) {
                points += 5;
            }
        }
        points
    }
}

impl std::fmt::Debug for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Board")
            .field("variant", &self.bc.variant())
            .field("to_play", &self.to_play)
            .field("nu_moves_played", &self.history.len())
            .finish()
    }
}

// =============================================================================
// テスト
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::Variant;

    fn duo_board() -> Board {
        Board::new(BoardConst::get(Variant::Duo))
    }

    #[test]
    fn test_first_moves_cover_starting_point() {
        let bd = duo_board();
        let c = Color::new(0);
        let start = bd.board_const().starting_points(c)[0];
        let all = vec![true; bd.board_const().nu_pieces()];
        let mut marker = MoveMarker::new(bd.board_const().nu_moves());
        let mut moves = Vec::new();
        bd.gen_moves(c, &all, &mut marker, &mut moves);
        assert!(!moves.is_empty());
        for mv in moves {
            assert!(bd.board_const().move_info(mv).points().contains(&start));
        }
    }

    #[test]
    fn test_play_updates_state() {
        let mut bd = duo_board();
        let c = Color::new(0);
        let all = vec![true; bd.board_const().nu_pieces()];
        let mut marker = MoveMarker::new(bd.board_const().nu_moves());
        let mut moves = Vec::new();
        bd.gen_moves(c, &all, &mut marker, &mut moves);
        let mv = moves[0];
        bd.play(c, mv);
        let info = bd.board_const().move_info(mv);
        for &p in info.points() {
            assert_eq!(bd.point_state(p), Some(c));
            assert!(bd.is_forbidden(c, p));
            assert!(bd.is_forbidden(Color::new(1), p));
        }
        assert!(!bd.is_piece_left(c, info.piece()));
        assert_eq!(bd.to_play(), Color::new(1));
        assert_eq!(bd.points(c), info.points().len() as i32);
    }

    #[test]
    fn test_second_move_attaches_diagonally() {
        let mut bd = duo_board();
        let c = Color::new(0);
        let all = vec![true; bd.board_const().nu_pieces()];
        let mut marker = MoveMarker::new(bd.board_const().nu_moves());
        let mut moves = Vec::new();
        bd.gen_moves(c, &all, &mut marker, &mut moves);
        bd.play(c, moves[0]);
        // 相手の手は飛ばして同色の 2 手目を生成
        let mut moves2 = Vec::new();
        bd.gen_moves(c, &all, &mut marker, &mut moves2);
        assert!(!moves2.is_empty());
        let geo = bd.board_const().geometry();
        for mv in moves2 {
            let info = bd.board_const().move_info(mv);
            // どのセルも自色と直交隣接しない
            for &p in info.points() {
                for &q in geo.adj(p) {
                    assert_ne!(bd.point_state(q), Some(c));
                }
            }
            // 少なくとも 1 セルが自色と斜め接触する
            assert!(info
                .points()
                .iter()
                .any(|&p| geo.diag(p).iter().any(|&q| bd.point_state(q) == Some(c))));
        }
    }

    #[test]
    fn test_gen_moves_no_duplicates() {
        let bd = duo_board();
        let all = vec![true; bd.board_const().nu_pieces()];
        let mut marker = MoveMarker::new(bd.board_const().nu_moves());
        let mut moves = Vec::new();
        bd.gen_moves(Color::new(0), &all, &mut marker, &mut moves);
        let mut sorted: Vec<u16> = moves.iter().map(|m| m.to_int()).collect();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), moves.len());
    }

    #[test]
    fn test_has_moves_initial() {
        let bd = duo_board();
        assert!(bd.has_moves(Color::new(0)));
        assert!(bd.has_moves(Color::new(1)));
    }
}
