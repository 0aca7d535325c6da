//! 指し手識別子（Move）

use smallvec::SmallVec;

use super::Color;

/// 指し手識別子
///
/// バリアントごとに `BoardConst` が構築する指し手テーブルへのコンパクトな
/// インデックス。id 0 は null move（番兵）として予約する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Move(u16);

impl Move {
    /// 番兵（null move）
    pub const NULL: Move = Move(0);

    #[inline]
    pub const fn new(i: u16) -> Move {
        Move(i)
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// インデックスとして使用（配列アクセス用）
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn to_int(self) -> u16 {
        self.0
    }
}

/// (手番, 指し手) の組
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerMove {
    pub color: Color,
    pub mv: Move,
}

impl PlayerMove {
    #[inline]
    pub const fn new(color: Color, mv: Move) -> PlayerMove {
        PlayerMove { color, mv }
    }
}

/// 指し手リスト
///
/// 1 局の長さ（Blokus classic で最大 84 手程度）を想定したインライン容量。
pub type MoveList = SmallVec<[Move; 128]>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_null() {
        assert!(Move::NULL.is_null());
        assert!(!Move::new(1).is_null());
        assert_eq!(Move::NULL.index(), 0);
    }
}
