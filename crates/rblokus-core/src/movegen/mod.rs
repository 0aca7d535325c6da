//! バリアントごとの指し手テーブル構築（BoardConst）
//!
//! ジオメトリとピースカタログから、全ピース・全変換・全点の盤内配置を
//! 列挙して指し手テーブルと前計算リスト（`PrecompMoves`）を構築する。
//! バリアントごとに一度だけ構築し、プロセス全体で読み取り専用に共有する。

mod precomp;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use smallvec::SmallVec;

use crate::types::{Move, Piece, Point};
use crate::variant::{Geometry, PieceInfo, Variant};

pub use precomp::{PrecompMoves, ADJ_STATUS_NU_ADJ, NU_ADJ_STATUS};
use precomp::ListRange;

/// ピースの最大マス数（classic セット）
pub const MAX_PIECE_SIZE: usize = 5;

// =============================================================================
// MoveInfo / MoveInfoExt
// =============================================================================

/// 指し手の基本情報（ピースと占有マス）
#[derive(Debug, Clone)]
pub struct MoveInfo {
    piece: Piece,
    size: u8,
    points: [Point; MAX_PIECE_SIZE],
}

impl MoveInfo {
    #[inline]
    pub fn piece(&self) -> Piece {
        self.piece
    }

    /// 占有マス
    #[inline]
    pub fn points(&self) -> &[Point] {
        &self.points[..self.size as usize]
    }
}

/// 指し手の拡張情報（盤面の差分更新用の前計算）
///
/// - `adj_points`: 占有マスの直交近傍（占有マスを除く）。配置後に
///   自色にとって禁止になるマス。
/// - `attach_points`: 占有マスの斜め近傍（占有・直交近傍を除く）。
///   配置後に自色の接続点候補になるマス。
#[derive(Debug, Clone)]
pub struct MoveInfoExt {
    adj_points: SmallVec<[Point; 12]>,
    attach_points: SmallVec<[Point; 8]>,
}

impl MoveInfoExt {
    #[inline]
    pub fn adj_points(&self) -> &[Point] {
        &self.adj_points
    }

    #[inline]
    pub fn attach_points(&self) -> &[Point] {
        &self.attach_points
    }
}

// =============================================================================
// BoardConst
// =============================================================================

/// バリアントごとの不変テーブル一式
///
/// `BoardConst::get` はプロセス全体のキャッシュを使う。テストなどで
/// 独立したインスタンスが必要な場合は `BoardConst::new` を直接使う。
pub struct BoardConst {
    variant: Variant,
    geo: Geometry,
    pieces: Vec<PieceInfo>,
    move_info: Vec<MoveInfo>,
    move_info_ext: Vec<MoveInfoExt>,
    precomp_moves: PrecompMoves,
    /// 点ごとのステータス対象近傍（直交→斜め、最大 5 点）
    adj_status_list: Vec<SmallVec<[Point; ADJ_STATUS_NU_ADJ]>>,
    starting_points: Vec<Vec<Point>>,
}

impl BoardConst {
    pub fn new(variant: Variant) -> BoardConst {
        let geo = variant.create_geometry();
        let pieces = variant.create_pieces();
        let starting_points = variant.starting_points(&geo);
        let adj_status_list = init_adj_status_list(&geo);

        let mut builder = Builder {
            geo: &geo,
            adj_status_list: &adj_status_list,
            // id 0 は null move 用のダミー
            move_info: vec![MoveInfo {
                piece: Piece::new(0),
                size: 0,
                points: [Point::NULL; MAX_PIECE_SIZE],
            }],
            move_info_ext: vec![MoveInfoExt {
                adj_points: SmallVec::new(),
                attach_points: SmallVec::new(),
            }],
            precomp_moves: Vec::new(),
            ranges: vec![
                ListRange::default();
                geo.nu_points() * NU_ADJ_STATUS * pieces.len()
            ],
            nu_pieces: pieces.len(),
        };
        for (i, piece_info) in pieces.iter().enumerate() {
            builder.create_moves(Piece::new(i as u8), piece_info);
        }
        log::debug!(
            "BoardConst {}: {} moves, {} precomp entries",
            variant,
            builder.move_info.len() - 1,
            builder.precomp_moves.len()
        );
        let Builder {
            move_info,
            move_info_ext,
            precomp_moves,
            ranges,
            nu_pieces,
            ..
        } = builder;
        BoardConst {
            variant,
            geo,
            pieces,
            move_info,
            move_info_ext,
            precomp_moves: PrecompMoves::new(precomp_moves, ranges, nu_pieces),
            adj_status_list,
            starting_points,
        }
    }

    /// プロセス全体で共有するキャッシュからの取得（遅延構築）
    pub fn get(variant: Variant) -> Arc<BoardConst> {
        static CACHE: Lazy<Mutex<HashMap<Variant, Arc<BoardConst>>>> =
            Lazy::new(|| Mutex::new(HashMap::new()));
        let mut cache = CACHE.lock().unwrap();
        Arc::clone(
            cache
                .entry(variant)
                .or_insert_with(|| Arc::new(BoardConst::new(variant))),
        )
    }

    #[inline]
    pub fn variant(&self) -> Variant {
        self.variant
    }

    #[inline]
    pub fn geometry(&self) -> &Geometry {
        &self.geo
    }

    #[inline]
    pub fn nu_pieces(&self) -> usize {
        self.pieces.len()
    }

    #[inline]
    pub fn piece_info(&self, piece: Piece) -> &PieceInfo {
        &self.pieces[piece.index()]
    }

    pub fn piece_by_name(&self, name: &str) -> Option<Piece> {
        self.pieces
            .iter()
            .position(|p| p.name() == name)
            .map(|i| Piece::new(i as u8))
    }

    /// 指し手テーブルの大きさ（null move 込み）
    #[inline]
    pub fn nu_moves(&self) -> usize {
        self.move_info.len()
    }

    #[inline]
    pub fn move_info(&self, mv: Move) -> &MoveInfo {
        debug_assert!(!mv.is_null());
        &self.move_info[mv.index()]
    }

    #[inline]
    pub fn move_info_ext(&self, mv: Move) -> &MoveInfoExt {
        debug_assert!(!mv.is_null());
        &self.move_info_ext[mv.index()]
    }

    #[inline]
    pub fn precomp_moves(&self) -> &PrecompMoves {
        &self.precomp_moves
    }

    /// 点ごとのステータス対象近傍
    #[inline]
    pub fn adj_status_list(&self, p: Point) -> &[Point] {
        &self.adj_status_list[p.index()]
    }

    #[inline]
    pub fn starting_points(&self, c: crate::types::Color) -> &[Point] {
        &self.starting_points[c.index()]
    }

    /// 指し手の文字列表現（"[L5]a1,a2,a3,a4,b4" 形式、診断用）
    pub fn to_string(&self, mv: Move, with_piece_name: bool) -> String {
        if mv.is_null() {
            return "null".to_string();
        }
        let info = self.move_info(mv);
        let mut s = String::new();
        if with_piece_name {
            s.push('[');
            s.push_str(self.piece_info(info.piece()).name());
            s.push(']');
        }
        for (i, &p) in info.points().iter().enumerate() {
            if i > 0 {
                s.push(',');
            }
            s.push_str(&self.geo.to_string(p));
        }
        s
    }
}

impl std::fmt::Debug for BoardConst {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoardConst")
            .field("variant", &self.variant)
            .field("nu_moves", &self.nu_moves())
            .finish()
    }
}

// =============================================================================
// 構築
// =============================================================================

fn init_adj_status_list(geo: &Geometry) -> Vec<SmallVec<[Point; ADJ_STATUS_NU_ADJ]>> {
    geo.iter()
        .map(|p| {
            let mut l: SmallVec<[Point; ADJ_STATUS_NU_ADJ]> = SmallVec::new();
            for &pp in geo.adj(p).iter().chain(geo.diag(p)) {
                if l.len() == ADJ_STATUS_NU_ADJ {
                    break;
                }
                l.push(pp);
            }
            l
        })
        .collect()
}

struct Builder<'a> {
    geo: &'a Geometry,
    adj_status_list: &'a [SmallVec<[Point; ADJ_STATUS_NU_ADJ]>],
    move_info: Vec<MoveInfo>,
    move_info_ext: Vec<MoveInfoExt>,
    precomp_moves: Vec<Move>,
    ranges: Vec<ListRange>,
    nu_pieces: usize,
}

impl Builder<'_> {
    /// 1 ピース分の全配置を生成し、前計算リストへ展開する
    fn create_moves(&mut self, piece: Piece, piece_info: &PieceInfo) {
        // 点 × ステータスごとの一時テーブル（ピース単位でフラット化する）
        let mut full_move_table: Vec<Vec<Move>> =
            vec![Vec::new(); self.geo.nu_points() * NU_ADJ_STATUS];
        let piece_size = piece_info.points().len();
        for p in self.geo.iter() {
            let x = self.geo.x(p) as i32;
            let y = self.geo.y(p) as i32;
            'transform: for t in piece_info.transforms() {
                let mut points = [Point::NULL; MAX_PIECE_SIZE];
                for (j, &(tx, ty)) in t.iter().enumerate() {
                    let (xx, yy) = (x + tx as i32, y + ty as i32);
                    if !self.geo.is_onboard(xx, yy) {
                        continue 'transform;
                    }
                    points[j] = self.geo.point(xx as u32, yy as u32);
                }
                self.create_move(piece, &points[..piece_size], &mut full_move_table);
            }
        }
        // フラット化: 点 → ステータスの順でリストを連結し範囲を記録
        for p in self.geo.iter() {
            for s in 0..NU_ADJ_STATUS {
                let list = &full_move_table[p.index() * NU_ADJ_STATUS + s];
                let begin = self.precomp_moves.len() as u32;
                debug_assert!(list.len() <= u16::MAX as usize);
                self.ranges[(p.index() * NU_ADJ_STATUS + s) * self.nu_pieces + piece.index()] =
                    ListRange {
                        begin,
                        len: list.len() as u16,
                    };
                self.precomp_moves.extend_from_slice(list);
            }
        }
    }

    fn create_move(&mut self, piece: Piece, points: &[Point], full_move_table: &mut [Vec<Move>]) {
        let mv = Move::new(self.move_info.len() as u16);
        let mut info_points = [Point::NULL; MAX_PIECE_SIZE];
        info_points[..points.len()].copy_from_slice(points);
        self.move_info.push(MoveInfo {
            piece,
            size: points.len() as u8,
            points: info_points,
        });

        let contains = |q: Point| points.contains(&q);
        for &p in points {
            for s in 0..NU_ADJ_STATUS {
                if self.is_compatible_with_adj_status(p, s, &contains) {
                    full_move_table[p.index() * NU_ADJ_STATUS + s].push(mv);
                }
            }
        }

        // 差分更新用の直交近傍・斜め近傍リスト
        let mut adj_points: SmallVec<[Point; 12]> = SmallVec::new();
        for &p in points {
            for &q in self.geo.adj(p) {
                if !contains(q) && !adj_points.contains(&q) {
                    adj_points.push(q);
                }
            }
        }
        let mut attach_points: SmallVec<[Point; 8]> = SmallVec::new();
        for &p in points {
            for &q in self.geo.diag(p) {
                if !contains(q) && !adj_points.contains(&q) && !attach_points.contains(&q) {
                    attach_points.push(q);
                }
            }
        }
        self.move_info_ext.push(MoveInfoExt {
            adj_points,
            attach_points,
        });
    }

    /// ステータス `s` で禁止される近傍をこの配置が覆っていないか
    fn is_compatible_with_adj_status(
        &self,
        p: Point,
        s: usize,
        contains: &impl Fn(Point) -> bool,
    ) -> bool {
        for (i, &q) in self.adj_status_list[p.index()].iter().enumerate() {
            if s & (1 << i) != 0 && contains(q) {
                return false;
            }
        }
        true
    }
}

// =============================================================================
// テスト
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monomino_move_count() {
        let bc = BoardConst::new(Variant::Duo);
        let one = bc.piece_by_name("1").unwrap();
        // モノミノの配置数は盤上の点数と一致する
        let mut n = 0;
        for p in bc.geometry().iter() {
            n += bc.precomp_moves().moves(one, p, 0).len();
        }
        assert_eq!(n, bc.geometry().nu_points());
    }

    #[test]
    fn test_move_contains_anchor() {
        let bc = BoardConst::new(Variant::Duo);
        for p in bc.geometry().iter() {
            for i in 0..bc.nu_pieces() {
                let piece = Piece::new(i as u8);
                for &mv in bc.precomp_moves().moves(piece, p, 0) {
                    let info = bc.move_info(mv);
                    assert_eq!(info.piece(), piece);
                    assert!(info.points().contains(&p));
                }
            }
        }
    }

    /// ステータス s' ⊆ s のときリスト(s) ⊆ リスト(s')
    #[test]
    fn test_adj_status_subset() {
        let bc = BoardConst::new(Variant::Duo);
        let geo = bc.geometry();
        let p = geo.point(7, 7);
        for i in 0..bc.nu_pieces() {
            let piece = Piece::new(i as u8);
            let full = bc.precomp_moves().moves(piece, p, 0);
            for s in 1..NU_ADJ_STATUS {
                for mv in bc.precomp_moves().moves(piece, p, s) {
                    assert!(full.contains(mv));
                }
            }
        }
    }

    /// ステータスで禁止された近傍を覆う指し手がリストに現れない
    #[test]
    fn test_adj_status_excludes_covering_moves() {
        let bc = BoardConst::new(Variant::Duo);
        let geo = bc.geometry();
        let p = geo.point(7, 7);
        let status_points = bc.adj_status_list(p);
        assert_eq!(status_points.len(), ADJ_STATUS_NU_ADJ);
        for s in 0..NU_ADJ_STATUS {
            for i in 0..bc.nu_pieces() {
                let piece = Piece::new(i as u8);
                for &mv in bc.precomp_moves().moves(piece, p, s) {
                    let info = bc.move_info(mv);
                    for (bit, &q) in status_points.iter().enumerate() {
                        if s & (1 << bit) != 0 {
                            assert!(!info.points().contains(&q));
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_adj_ext_points_disjoint() {
        let bc = BoardConst::new(Variant::Duo);
        let one = bc.piece_by_name("X").unwrap();
        let p = bc.geometry().point(7, 7);
        for &mv in bc.precomp_moves().moves(one, p, 0) {
            let info = bc.move_info(mv);
            let ext = bc.move_info_ext(mv);
            for q in ext.adj_points() {
                assert!(!info.points().contains(q));
            }
            for q in ext.attach_points() {
                assert!(!info.points().contains(q));
                assert!(!ext.adj_points().contains(q));
            }
        }
    }

    #[test]
    fn test_global_cache_returns_same_instance() {
        let a = BoardConst::get(Variant::Duo);
        let b = BoardConst::get(Variant::Duo);
        assert!(Arc::ptr_eq(&a, &b));
    }
}
