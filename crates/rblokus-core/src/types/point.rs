//! 盤上の点（Point）

/// 盤上の点
///
/// `y * width + x` の一次元インデックス。`Point::NULL` は番兵。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Point(u16);

impl Point {
    /// 番兵（盤外）
    pub const NULL: Point = Point(u16::MAX);

    #[inline]
    pub const fn new(i: u16) -> Point {
        Point(i)
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == u16::MAX
    }

    /// インデックスとして使用（配列アクセス用）
    #[inline]
    pub const fn index(self) -> usize {
        debug_assert!(!self.is_null());
        self.0 as usize
    }

    #[inline]
    pub const fn to_int(self) -> u16 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_null() {
        assert!(Point::NULL.is_null());
        assert!(!Point::new(0).is_null());
    }

    #[test]
    fn test_point_index() {
        assert_eq!(Point::new(37).index(), 37);
    }
}
