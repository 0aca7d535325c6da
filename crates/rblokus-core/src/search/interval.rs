//! 間隔チェッカ
//!
//! シミュレーションループ内の高コストな中断判定（時間計測・最善手
//! 不変判定など）を約 `time_interval` 秒ごとに間引いて呼ぶ。呼び出し
//! 回数ベースのカウンタを実測時間で適応させる。決定的モードでは
//! 固定回数間隔にして壁時計への依存を断つ。

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// 高コスト判定の間引き実行
#[derive(Debug)]
pub struct IntervalChecker {
    time_interval: f64,
    last_time: Instant,
    counter: u32,
    count_interval: u32,
    deterministic: Option<u32>,
    result: bool,
}

impl IntervalChecker {
    pub fn new(time_interval: f64) -> IntervalChecker {
        IntervalChecker {
            time_interval,
            last_time: Instant::now(),
            counter: 0,
            count_interval: 1,
            deterministic: None,
            result: false,
        }
    }

    /// 固定回数間隔モードにする
    pub fn set_deterministic(&mut self, interval: u32) {
        let interval = interval.max(1);
        self.deterministic = Some(interval);
        self.count_interval = interval;
    }

    /// 間隔が来ていれば `f` を呼ぶ
    ///
    /// 一度 `f` が true を返したら以後は常に true（sticky）。
    pub fn check(&mut self, f: &mut dyn FnMut() -> bool) -> bool {
        if self.result {
            return true;
        }
        self.counter += 1;
        if self.counter < self.count_interval {
            return false;
        }
        self.counter = 0;
        if self.deterministic.is_some() {
            if f() {
                self.result = true;
            }
            return self.result;
        }
        let elapsed = self.last_time.elapsed().as_secs_f64();
        if elapsed < self.time_interval {
            // 呼び出し頻度が高すぎる: 間隔を広げて次を待つ
            self.count_interval = self.count_interval.saturating_mul(2).min(1 << 20);
            return false;
        }
        // 実測から次の間隔を合わせ込む
        let adjusted = (self.count_interval as f64 * self.time_interval / elapsed).max(1.0);
        self.count_interval = adjusted as u32;
        self.last_time = Instant::now();
        if f() {
            self.result = true;
        }
        self.result
    }
}

/// コピー・枝刈り用の中断チェッカ
///
/// ノード単位の細かいループから一定回数ごとに経過時間と中断フラグを
/// 確認する。`max_time` 超過または外部 abort で true を返す。
pub struct TimeIntervalChecker<'a> {
    start: Instant,
    max_time: f64,
    abort: &'a AtomicBool,
    counter: u32,
    count_interval: u32,
    result: bool,
}

impl<'a> TimeIntervalChecker<'a> {
    pub fn new(max_time: f64, abort: &'a AtomicBool) -> TimeIntervalChecker<'a> {
        TimeIntervalChecker {
            start: Instant::now(),
            max_time,
            abort,
            counter: 0,
            count_interval: 4096,
            result: false,
        }
    }

    /// 固定回数間隔モードにする（決定的モード用）
    pub fn set_deterministic(&mut self, interval: u32) {
        self.count_interval = interval.max(1);
    }

    /// 中断すべきなら true
    pub fn check(&mut self) -> bool {
        if self.result {
            return true;
        }
        self.counter += 1;
        if self.counter < self.count_interval {
            return false;
        }
        self.counter = 0;
        if self.abort.load(Ordering::Relaxed) || self.start.elapsed().as_secs_f64() > self.max_time
        {
            self.result = true;
        }
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_interval() {
        let mut checker = IntervalChecker::new(0.1);
        checker.set_deterministic(10);
        let mut calls = 0;
        for _ in 0..100 {
            checker.check(&mut || {
                calls += 1;
                false
            });
        }
        assert_eq!(calls, 10);
    }

    #[test]
    fn test_sticky_result() {
        let mut checker = IntervalChecker::new(0.1);
        checker.set_deterministic(1);
        assert!(checker.check(&mut || true));
        // f が以後 false でも true のまま
        assert!(checker.check(&mut || false));
    }

    #[test]
    fn test_time_interval_checker_abort_flag() {
        let abort = AtomicBool::new(false);
        let mut checker = TimeIntervalChecker::new(f64::MAX, &abort);
        checker.set_deterministic(1);
        assert!(!checker.check());
        abort.store(true, Ordering::Relaxed);
        assert!(checker.check());
        assert!(checker.check());
    }

    #[test]
    fn test_time_interval_checker_deadline() {
        let abort = AtomicBool::new(false);
        let mut checker = TimeIntervalChecker::new(0.0, &abort);
        checker.set_deterministic(1);
        std::thread::sleep(std::time::Duration::from_millis(1));
        assert!(checker.check());
    }
}
