//! ピースカタログ
//!
//! classic セット（21 ピース）の形状データと変換（回転・鏡映）の生成。
//! 形状はアンカー相対の (x, y) 座標（y 軸下向き）。変換は正規化して
//! 重複を除去するため、対称なピースほど変換数が少ない。

/// アンカー相対座標
pub type CoordPoint = (i8, i8);

/// ピース定義
#[derive(Debug)]
pub struct PieceInfo {
    name: &'static str,
    points: Vec<CoordPoint>,
    transforms: Vec<Vec<CoordPoint>>,
}

impl PieceInfo {
    fn new(name: &'static str, points: &[CoordPoint]) -> PieceInfo {
        let transforms = gen_transforms(points);
        PieceInfo {
            name,
            points: points.to_vec(),
            transforms,
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn points(&self) -> &[CoordPoint] {
        &self.points
    }

    /// ピースのマス数（スコア値）
    #[inline]
    pub fn score_points(&self) -> u32 {
        self.points.len() as u32
    }

    /// 正規化済みの一意な変換
    #[inline]
    pub fn transforms(&self) -> &[Vec<CoordPoint>] {
        &self.transforms
    }
}

/// 8 対称変換を適用し、平行移動で正規化した一意な形状を返す
fn gen_transforms(points: &[CoordPoint]) -> Vec<Vec<CoordPoint>> {
    let ops: [fn(CoordPoint) -> CoordPoint; 8] = [
        |(x, y)| (x, y),
        |(x, y)| (-y, x),
        |(x, y)| (-x, -y),
        |(x, y)| (y, -x),
        |(x, y)| (-x, y),
        |(x, y)| (y, x),
        |(x, y)| (x, -y),
        |(x, y)| (-y, -x),
    ];
    let mut transforms: Vec<Vec<CoordPoint>> = Vec::new();
    for op in ops {
        let mut pts: Vec<CoordPoint> = points.iter().map(|&p| op(p)).collect();
        let min_x = pts.iter().map(|p| p.0).min().unwrap();
        let min_y = pts.iter().map(|p| p.1).min().unwrap();
        for p in &mut pts {
            p.0 -= min_x;
            p.1 -= min_y;
        }
        pts.sort_unstable_by(|a, b| (a.1, a.0).cmp(&(b.1, b.0)));
        if !transforms.contains(&pts) {
            transforms.push(pts);
        }
    }
    transforms
}

/// classic セット（Blokus の 21 ピース）を生成する
pub fn create_pieces_classic() -> Vec<PieceInfo> {
    vec![
        PieceInfo::new("1", &[(0, 0)]),
        PieceInfo::new("2", &[(0, 0), (1, 0)]),
        PieceInfo::new("I3", &[(0, 0), (1, 0), (2, 0)]),
        PieceInfo::new("V3", &[(0, 0), (1, 0), (0, 1)]),
        PieceInfo::new("I4", &[(0, 0), (1, 0), (2, 0), (3, 0)]),
        PieceInfo::new("L4", &[(0, 0), (1, 0), (2, 0), (0, 1)]),
        PieceInfo::new("O4", &[(0, 0), (1, 0), (0, 1), (1, 1)]),
        PieceInfo::new("T4", &[(0, 0), (1, 0), (2, 0), (1, 1)]),
        PieceInfo::new("Z4", &[(0, 0), (1, 0), (1, 1), (2, 1)]),
        PieceInfo::new("F", &[(1, 0), (2, 0), (0, 1), (1, 1), (1, 2)]),
        PieceInfo::new("I5", &[(0, 0), (0, 1), (0, 2), (0, 3), (0, 4)]),
        PieceInfo::new("L5", &[(0, 0), (0, 1), (0, 2), (0, 3), (1, 3)]),
        PieceInfo::new("N", &[(0, 0), (0, 1), (1, 1), (1, 2), (1, 3)]),
        PieceInfo::new("P", &[(0, 0), (1, 0), (0, 1), (1, 1), (0, 2)]),
        PieceInfo::new("T5", &[(0, 0), (1, 0), (2, 0), (1, 1), (1, 2)]),
        PieceInfo::new("U", &[(0, 0), (2, 0), (0, 1), (1, 1), (2, 1)]),
        PieceInfo::new("V5", &[(0, 0), (0, 1), (0, 2), (1, 2), (2, 2)]),
        PieceInfo::new("W", &[(0, 0), (0, 1), (1, 1), (1, 2), (2, 2)]),
        PieceInfo::new("X", &[(1, 0), (0, 1), (1, 1), (2, 1), (1, 2)]),
        PieceInfo::new("Y", &[(1, 0), (0, 1), (1, 1), (1, 2), (1, 3)]),
        PieceInfo::new("Z5", &[(0, 0), (1, 0), (1, 1), (1, 2), (2, 2)]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classic_piece_count() {
        assert_eq!(create_pieces_classic().len(), 21);
    }

    /// 既知の変換数: X は 1、I5 は 2、O4 は 1、F は 8
    #[test]
    fn test_transform_counts() {
        let pieces = create_pieces_classic();
        let by_name = |n: &str| pieces.iter().find(|p| p.name() == n).unwrap();
        assert_eq!(by_name("X").transforms().len(), 1);
        assert_eq!(by_name("I5").transforms().len(), 2);
        assert_eq!(by_name("O4").transforms().len(), 1);
        assert_eq!(by_name("F").transforms().len(), 8);
        assert_eq!(by_name("1").transforms().len(), 1);
        assert_eq!(by_name("Z4").transforms().len(), 4);
        assert_eq!(by_name("T4").transforms().len(), 4);
        assert_eq!(by_name("L4").transforms().len(), 8);
    }

    #[test]
    fn test_transforms_normalized() {
        for piece in create_pieces_classic() {
            for t in piece.transforms() {
                assert_eq!(t.len(), piece.points().len());
                assert_eq!(t.iter().map(|p| p.0).min().unwrap(), 0);
                assert_eq!(t.iter().map(|p| p.1).min().unwrap(), 0);
            }
        }
    }

    #[test]
    fn test_total_cells() {
        // 1+2+3*2+4*5+5*12 = 89
        let total: u32 = create_pieces_classic().iter().map(|p| p.score_points()).sum();
        assert_eq!(total, 89);
    }
}
