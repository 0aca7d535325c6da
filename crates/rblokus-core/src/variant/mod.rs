//! ゲームバリアント定義（静的データ）
//!
//! 盤面形状・ピースセット・開始点などバリアント固有の不変データ。
//! 盤ロジックそのものは `board` モジュール側。

mod geometry;
mod pieces;

use serde::{Deserialize, Serialize};

pub use geometry::{Geometry, NeighborList};
pub use pieces::{create_pieces_classic, CoordPoint, PieceInfo};

use crate::types::Point;

// =============================================================================
// BoardType / PieceSet / Variant
// =============================================================================

/// 盤面タイプ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoardType {
    /// 20x20、4 色
    Classic,
    /// 14x14、2 色
    Duo,
}

/// ピースセット
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PieceSet {
    Classic,
}

/// ゲームバリアント
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variant {
    /// Blokus classic（20x20、4 人）
    Classic,
    /// Blokus Duo（14x14、2 人）
    Duo,
}

impl Variant {
    #[inline]
    pub fn board_type(self) -> BoardType {
        match self {
            Variant::Classic => BoardType::Classic,
            Variant::Duo => BoardType::Duo,
        }
    }

    #[inline]
    pub fn piece_set(self) -> PieceSet {
        PieceSet::Classic
    }

    /// 色数
    #[inline]
    pub fn nu_colors(self) -> u8 {
        match self {
            Variant::Classic => 4,
            Variant::Duo => 2,
        }
    }

    pub fn create_geometry(self) -> Geometry {
        match self.board_type() {
            BoardType::Classic => Geometry::new(20, 20),
            BoardType::Duo => Geometry::new(14, 14),
        }
    }

    pub fn create_pieces(self) -> Vec<PieceInfo> {
        create_pieces_classic()
    }

    /// 各色の開始点
    pub fn starting_points(self, geo: &Geometry) -> Vec<Vec<Point>> {
        match self.board_type() {
            BoardType::Classic => vec![
                vec![geo.point(0, 0)],
                vec![geo.point(19, 0)],
                vec![geo.point(19, 19)],
                vec![geo.point(0, 19)],
            ],
            BoardType::Duo => vec![vec![geo.point(4, 4)], vec![geo.point(9, 9)]],
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Variant::Classic => write!(f, "classic"),
            Variant::Duo => write!(f, "duo"),
        }
    }
}

impl std::str::FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "classic" => Ok(Variant::Classic),
            "duo" => Ok(Variant::Duo),
            _ => Err(format!("unknown variant: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Color;

    #[test]
    fn test_variant_colors() {
        assert_eq!(Variant::Classic.nu_colors(), 4);
        assert_eq!(Variant::Duo.nu_colors(), 2);
    }

    #[test]
    fn test_starting_points() {
        let v = Variant::Duo;
        let geo = v.create_geometry();
        let sp = v.starting_points(&geo);
        assert_eq!(sp.len(), 2);
        assert_eq!(sp[Color::new(0).index()][0], geo.point(4, 4));
        assert_eq!(sp[Color::new(1).index()][0], geo.point(9, 9));
    }

    #[test]
    fn test_variant_parse() {
        assert_eq!("duo".parse::<Variant>().unwrap(), Variant::Duo);
        assert!("trigon".parse::<Variant>().is_err());
    }
}
