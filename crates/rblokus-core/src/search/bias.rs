//! UCT バイアス項
//!
//! `constant * sqrt(ln(parent_count) / (child_count + 1))` の探索ボーナス。
//! 親カウント依存部分は選択のイテレーション開始時に一度だけ計算する。

use crate::types::Float;

#[derive(Debug, Clone)]
pub struct BiasTerm {
    bias_term_constant: Float,
    parent_part: Float,
}

impl BiasTerm {
    pub fn new(bias_term_constant: Float) -> BiasTerm {
        BiasTerm {
            bias_term_constant,
            parent_part: 0.0,
        }
    }

    #[inline]
    pub fn bias_term_constant(&self) -> Float {
        self.bias_term_constant
    }

    pub fn set_bias_term_constant(&mut self, c: Float) {
        self.bias_term_constant = c;
    }

    /// 親ノードの visit カウントで選択イテレーションを開始する
    #[inline]
    pub fn start_iteration(&mut self, parent_count: Float) {
        if self.bias_term_constant == 0.0 {
            self.parent_part = 0.0;
        } else {
            self.parent_part = self.bias_term_constant * parent_count.max(1.0).ln().sqrt();
        }
    }

    /// 子カウントに対するバイアス項（子カウントについて単調減少）
    #[inline]
    pub fn get(&self, child_count: Float) -> Float {
        if self.parent_part == 0.0 {
            0.0
        } else {
            self.parent_part / (child_count + 1.0).sqrt()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bias_decreasing_in_child_count() {
        let mut b = BiasTerm::new(0.5);
        b.start_iteration(1000.0);
        let mut prev = Float::MAX;
        for count in [0.0, 1.0, 2.0, 10.0, 100.0, 10_000.0] {
            let v = b.get(count);
            assert!(v > 0.0);
            assert!(v < prev);
            prev = v;
        }
    }

    #[test]
    fn test_bias_bounded_by_min_count_value() {
        let mut b = BiasTerm::new(0.5);
        b.start_iteration(500.0);
        let upper = b.get(0.0);
        for count in [1.0, 5.0, 50.0] {
            assert!(b.get(count) <= upper);
        }
    }

    #[test]
    fn test_bias_zero_constant() {
        let mut b = BiasTerm::new(0.0);
        b.start_iteration(1000.0);
        assert_eq!(b.get(0.0), 0.0);
        assert_eq!(b.get(10.0), 0.0);
    }

    /// 同じ統計に対して常に同じ値を返す（選択の決定性）
    #[test]
    fn test_bias_deterministic() {
        let mut b = BiasTerm::new(0.7);
        b.start_iteration(123.0);
        let v1 = b.get(7.0);
        b.start_iteration(123.0);
        let v2 = b.get(7.0);
        assert_eq!(v1, v2);
    }
}
