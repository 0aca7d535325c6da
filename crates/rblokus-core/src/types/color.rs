//! プレイヤー色（Color）

use serde::{Deserialize, Serialize};

/// プレイヤー色
///
/// Blokus 系は最大 4 色。バリアントごとの実際の色数は実行時に決まる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Color(u8);

impl Color {
    /// 色数の上限
    pub const MAX: usize = 4;

    #[inline]
    pub const fn new(i: u8) -> Color {
        debug_assert!(i < Color::MAX as u8);
        Color(i)
    }

    /// インデックスとして使用（配列アクセス用）
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// 次の手番の色を返す
    #[inline]
    pub const fn next(self, nu_colors: u8) -> Color {
        let i = self.0 + 1;
        Color(if i == nu_colors { 0 } else { i })
    }

    /// 全色のイテレータ
    #[inline]
    pub fn iter(nu_colors: u8) -> impl Iterator<Item = Color> {
        (0..nu_colors).map(Color)
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_next() {
        assert_eq!(Color::new(0).next(2), Color::new(1));
        assert_eq!(Color::new(1).next(2), Color::new(0));
        assert_eq!(Color::new(3).next(4), Color::new(0));
    }

    #[test]
    fn test_color_index() {
        assert_eq!(Color::new(2).index(), 2);
    }

    #[test]
    fn test_color_iter() {
        let v: Vec<Color> = Color::iter(3).collect();
        assert_eq!(v, vec![Color::new(0), Color::new(1), Color::new(2)]);
    }
}
