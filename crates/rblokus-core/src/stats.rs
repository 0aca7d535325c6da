//! 逐次統計アキュムレータ
//!
//! - `Statistics`: 逐次平均・分散
//! - `StatisticsExt`: min/max 付き（探索長などの診断用）
//! - `StatisticsDirtyLockFree`: ロックフリー並行更新用（更新ロスを許容）

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::types::Float;

// =============================================================================
// Statistics
// =============================================================================

/// 逐次平均・分散
///
/// Welford 型の逐次更新。`init_val` はカウント 0 のときに `mean()` が返す
/// 値で、カウントが付いた後の平均には影響しない。
#[derive(Debug, Clone, Copy)]
pub struct Statistics {
    count: f64,
    mean: f64,
    variance: f64,
}

impl Statistics {
    pub fn new(init_val: f64) -> Statistics {
        Statistics {
            count: 0.0,
            mean: init_val,
            variance: 0.0,
        }
    }

    pub fn add(&mut self, val: f64) {
        if self.count > 0.0 {
            let count_old = self.count;
            let mean_old = self.mean;
            self.count += 1.0;
            self.mean += (val - self.mean) / self.count;
            self.variance = (count_old * (self.variance + mean_old * mean_old) + val * val)
                / self.count
                - self.mean * self.mean;
        } else {
            self.count = 1.0;
            self.mean = val;
            self.variance = 0.0;
        }
    }

    pub fn clear(&mut self, init_val: f64) {
        self.count = 0.0;
        self.mean = init_val;
        self.variance = 0.0;
    }

    #[inline]
    pub fn count(&self) -> f64 {
        self.count
    }

    #[inline]
    pub fn mean(&self) -> f64 {
        self.mean
    }

    #[inline]
    pub fn variance(&self) -> f64 {
        self.variance
    }

    /// 標準偏差
    ///
    /// 丸め誤差で分散が負になることがあるため 0 でクリップする。
    pub fn deviation(&self) -> f64 {
        if self.variance < 0.0 {
            0.0
        } else {
            self.variance.sqrt()
        }
    }

    /// 平均の標準誤差
    pub fn error(&self) -> f64 {
        if self.count == 0.0 {
            0.0
        } else {
            self.deviation() / self.count.sqrt()
        }
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Statistics::new(0.0)
    }
}

// =============================================================================
// StatisticsExt
// =============================================================================

/// min/max 付き逐次統計
#[derive(Debug, Clone, Copy)]
pub struct StatisticsExt {
    statistics: Statistics,
    max: f64,
    min: f64,
}

impl StatisticsExt {
    pub fn new() -> StatisticsExt {
        StatisticsExt {
            statistics: Statistics::new(0.0),
            max: f64::MIN,
            min: f64::MAX,
        }
    }

    pub fn add(&mut self, val: f64) {
        self.statistics.add(val);
        if val > self.max {
            self.max = val;
        }
        if val < self.min {
            self.min = val;
        }
    }

    pub fn clear(&mut self) {
        self.statistics.clear(0.0);
        self.max = f64::MIN;
        self.min = f64::MAX;
    }

    #[inline]
    pub fn count(&self) -> f64 {
        self.statistics.count()
    }

    #[inline]
    pub fn mean(&self) -> f64 {
        self.statistics.mean()
    }

    #[inline]
    pub fn deviation(&self) -> f64 {
        self.statistics.deviation()
    }

    #[inline]
    pub fn max(&self) -> f64 {
        self.max
    }

    #[inline]
    pub fn min(&self) -> f64 {
        self.min
    }

    /// `mean dev=.. min=.. max=..` 形式（診断出力用）
    pub fn to_string_fmt(&self, precision: usize, integer_values: bool) -> String {
        if self.count() == 0.0 {
            return "-".to_string();
        }
        if integer_values {
            format!(
                "{:.prec$} dev={:.prec$} min={:.0} max={:.0}",
                self.mean(),
                self.deviation(),
                self.min,
                self.max,
                prec = precision
            )
        } else {
            format!(
                "{:.prec$} dev={:.prec$} min={:.prec$} max={:.prec$}",
                self.mean(),
                self.deviation(),
                self.min,
                self.max,
                prec = precision
            )
        }
    }
}

impl Default for StatisticsExt {
    fn default() -> Self {
        StatisticsExt::new()
    }
}

impl fmt::Display for StatisticsExt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_fmt(2, false))
    }
}

// =============================================================================
// StatisticsDirtyLockFree
// =============================================================================

/// ロックフリー並行更新用の逐次平均
///
/// 平均とカウントの更新は atomic な load/store の往復だが同期しない
/// （Relaxed ordering）。並行書き込みでは更新がロスすることがあるが、
/// torn read/write は起きない。単一スレッドからの更新では正確。
/// 初期化（`clear`）は探索停止中にのみ呼ぶこと。
#[derive(Debug)]
pub struct StatisticsDirtyLockFree {
    count: AtomicU32,
    mean: AtomicU32,
}

impl StatisticsDirtyLockFree {
    pub fn new(init_val: Float) -> StatisticsDirtyLockFree {
        StatisticsDirtyLockFree {
            count: AtomicU32::new(0f32.to_bits()),
            mean: AtomicU32::new(init_val.to_bits()),
        }
    }

    pub fn add(&self, val: Float) {
        let mut count = Float::from_bits(self.count.load(Ordering::Relaxed));
        let mut mean = Float::from_bits(self.mean.load(Ordering::Relaxed));
        count += 1.0;
        mean += (val - mean) / count;
        self.mean.store(mean.to_bits(), Ordering::Relaxed);
        self.count.store(count.to_bits(), Ordering::Relaxed);
    }

    /// 重み付き観測の追加
    pub fn add_weighted(&self, val: Float, weight: Float) {
        let mut count = Float::from_bits(self.count.load(Ordering::Relaxed));
        let mut mean = Float::from_bits(self.mean.load(Ordering::Relaxed));
        count += weight;
        mean += weight * (val - mean) / count;
        self.mean.store(mean.to_bits(), Ordering::Relaxed);
        self.count.store(count.to_bits(), Ordering::Relaxed);
    }

    /// 平均とカウントを直接設定する（前回探索からの引き継ぎ用）
    pub fn init(&self, mean: Float, count: Float) {
        self.mean.store(mean.to_bits(), Ordering::SeqCst);
        self.count.store(count.to_bits(), Ordering::SeqCst);
    }

    pub fn clear(&self, init_val: Float) {
        self.count.store(0f32.to_bits(), Ordering::SeqCst);
        self.mean.store(init_val.to_bits(), Ordering::SeqCst);
    }

    #[inline]
    pub fn count(&self) -> Float {
        Float::from_bits(self.count.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn mean(&self) -> Float {
        Float::from_bits(self.mean.load(Ordering::Relaxed))
    }
}

// =============================================================================
// テスト
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistics_mean() {
        let mut s = Statistics::default();
        for v in [1.0, 2.0, 3.0, 4.0] {
            s.add(v);
        }
        assert_eq!(s.count(), 4.0);
        assert!((s.mean() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_statistics_variance() {
        let mut s = Statistics::default();
        for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            s.add(v);
        }
        assert!((s.mean() - 5.0).abs() < 1e-9);
        assert!((s.variance() - 4.0).abs() < 1e-9);
        assert!((s.deviation() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_statistics_init_val() {
        let s = Statistics::new(0.5);
        assert_eq!(s.mean(), 0.5);
        assert_eq!(s.count(), 0.0);
    }

    #[test]
    fn test_statistics_ext_min_max() {
        let mut s = StatisticsExt::new();
        for v in [3.0, 1.0, 2.0] {
            s.add(v);
        }
        assert_eq!(s.min(), 1.0);
        assert_eq!(s.max(), 3.0);
        assert!((s.mean() - 2.0).abs() < 1e-9);
    }

    /// 単一スレッドからの add では算術平均と正確に一致する
    #[test]
    fn test_dirty_lock_free_single_writer_exact() {
        let s = StatisticsDirtyLockFree::new(0.0);
        let vals = [0.0f32, 1.0, 1.0, 0.0, 1.0, 0.5, 0.25];
        for v in vals {
            s.add(v);
        }
        assert_eq!(s.count(), vals.len() as Float);
        let mean: Float = vals.iter().sum::<Float>() / vals.len() as Float;
        assert!((s.mean() - mean).abs() < 1e-6);
    }

    /// 並行更新ではロスがあっても平均はノイズ範囲に収束する
    #[test]
    fn test_dirty_lock_free_concurrent_plausible() {
        use std::sync::Arc;
        let s = Arc::new(StatisticsDirtyLockFree::new(0.0));
        let mut handles = Vec::new();
        for t in 0..4 {
            let s = Arc::clone(&s);
            handles.push(std::thread::spawn(move || {
                for i in 0..10_000u32 {
                    // 全スレッド合わせて平均 0.5 になる系列
                    s.add(((i + t) % 2) as Float);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        // カウントはロスにより 40000 以下になり得る
        assert!(s.count() <= 40_000.0);
        assert!(s.count() > 0.0);
        assert!((s.mean() - 0.5).abs() < 0.1);
    }

    #[test]
    fn test_dirty_lock_free_init() {
        let s = StatisticsDirtyLockFree::new(0.5);
        assert_eq!(s.mean(), 0.5);
        s.init(0.7, 100.0);
        assert_eq!(s.mean(), 0.7);
        assert_eq!(s.count(), 100.0);
        s.clear(0.5);
        assert_eq!(s.count(), 0.0);
        assert_eq!(s.mean(), 0.5);
    }

    #[test]
    fn test_dirty_lock_free_weighted() {
        let s = StatisticsDirtyLockFree::new(0.0);
        s.add_weighted(1.0, 2.0);
        assert_eq!(s.count(), 2.0);
        assert!((s.mean() - 1.0).abs() < 1e-6);
        s.add_weighted(0.0, 2.0);
        assert_eq!(s.count(), 4.0);
        assert!((s.mean() - 0.5).abs() < 1e-6);
    }
}
