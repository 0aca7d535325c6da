//! 探索制限（SearchLimits）
//!
//! 1 回の探索呼び出しに対する打ち切り条件。シミュレーション数制限が
//! 指定されていれば時間制限は補助的な安全弁としてのみ使われる。

use crate::types::Float;

/// 探索制限条件
#[derive(Debug, Clone, Copy)]
pub struct SearchLimits {
    /// 最大シミュレーション数（0 なら時間制限を使う）
    ///
    /// 前回探索から再利用したサブツリーの visit カウントを含む。
    pub max_count: Float,

    /// 最小シミュレーション数
    ///
    /// 再利用分を含まない、この探索で実際に行うシミュレーション数の下限。
    pub min_simulations: Float,

    /// 最大探索時間（秒）。`max_count == 0` のときのみ有効
    pub max_time: f64,
}

impl Default for SearchLimits {
    fn default() -> Self {
        SearchLimits {
            max_count: 0.0,
            min_simulations: 0.0,
            max_time: f64::MAX,
        }
    }
}

impl SearchLimits {
    /// シミュレーション数で打ち切る
    pub fn count(max_count: Float) -> SearchLimits {
        SearchLimits {
            max_count,
            ..Default::default()
        }
    }

    /// 時間で打ち切る
    pub fn time(max_time: f64) -> SearchLimits {
        SearchLimits {
            max_time,
            ..Default::default()
        }
    }

    #[inline]
    pub fn has_count_limit(&self) -> bool {
        self.max_count > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_constructors() {
        let l = SearchLimits::count(1000.0);
        assert!(l.has_count_limit());
        assert_eq!(l.max_time, f64::MAX);
        let l = SearchLimits::time(0.5);
        assert!(!l.has_count_limit());
        assert_eq!(l.max_time, 0.5);
    }
}
