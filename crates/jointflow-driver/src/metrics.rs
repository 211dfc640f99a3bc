//! 驱动层运行指标
//!
//! 原子计数器，可在任意线程读取，不引入锁竞争。

use std::sync::atomic::{AtomicU64, Ordering};

/// 驱动层实时指标
#[derive(Debug, Default)]
pub struct DriverMetrics {
    /// 写入缓存的有效反馈数
    pub feedback_accepted: AtomicU64,
    /// 因温度或电压为 0 而丢弃的反馈数
    pub feedback_dropped: AtomicU64,
    /// 反馈读取失败次数（不重试）
    pub feedback_read_errors: AtomicU64,
    /// 发送的 SyncWrite 移动包数
    pub moves_sent: AtomicU64,
    /// 移动包中包含的舵机条目总数
    pub move_entries_sent: AtomicU64,
    /// 因禁用或反馈过期而未下发的目标数
    pub goals_withheld: AtomicU64,
    /// 传输层错误次数
    pub transport_errors: AtomicU64,
    /// 联锁禁用次数
    pub interlock_disables: AtomicU64,
    /// 联锁恢复次数
    pub interlock_enables: AtomicU64,
}

impl DriverMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取指标快照
    pub fn snapshot(&self) -> DriverMetricsSnapshot {
        DriverMetricsSnapshot {
            feedback_accepted: self.feedback_accepted.load(Ordering::Relaxed),
            feedback_dropped: self.feedback_dropped.load(Ordering::Relaxed),
            feedback_read_errors: self.feedback_read_errors.load(Ordering::Relaxed),
            moves_sent: self.moves_sent.load(Ordering::Relaxed),
            move_entries_sent: self.move_entries_sent.load(Ordering::Relaxed),
            goals_withheld: self.goals_withheld.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            interlock_disables: self.interlock_disables.load(Ordering::Relaxed),
            interlock_enables: self.interlock_enables.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器
    pub fn reset(&self) {
        self.feedback_accepted.store(0, Ordering::Relaxed);
        self.feedback_dropped.store(0, Ordering::Relaxed);
        self.feedback_read_errors.store(0, Ordering::Relaxed);
        self.moves_sent.store(0, Ordering::Relaxed);
        self.move_entries_sent.store(0, Ordering::Relaxed);
        self.goals_withheld.store(0, Ordering::Relaxed);
        self.transport_errors.store(0, Ordering::Relaxed);
        self.interlock_disables.store(0, Ordering::Relaxed);
        self.interlock_enables.store(0, Ordering::Relaxed);
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DriverMetricsSnapshot {
    pub feedback_accepted: u64,
    pub feedback_dropped: u64,
    pub feedback_read_errors: u64,
    pub moves_sent: u64,
    pub move_entries_sent: u64,
    pub goals_withheld: u64,
    pub transport_errors: u64,
    pub interlock_disables: u64,
    pub interlock_enables: u64,
}

impl DriverMetricsSnapshot {
    /// 有效反馈比例（百分比），无反馈时返回 0.0
    pub fn feedback_valid_rate(&self) -> f64 {
        let total = self.feedback_accepted + self.feedback_dropped;
        if total == 0 {
            return 0.0;
        }
        (self.feedback_accepted as f64 / total as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_metrics_default() {
        let snapshot = DriverMetrics::new().snapshot();
        assert_eq!(snapshot, DriverMetricsSnapshot::default());
        assert_eq!(snapshot.feedback_valid_rate(), 0.0);
    }

    #[test]
    fn test_metrics_valid_rate() {
        let metrics = DriverMetrics::new();
        metrics.feedback_accepted.fetch_add(3, Ordering::Relaxed);
        metrics.feedback_dropped.fetch_add(1, Ordering::Relaxed);
        assert_eq!(metrics.snapshot().feedback_valid_rate(), 75.0);

        metrics.reset();
        assert_eq!(metrics.snapshot().feedback_accepted, 0);
    }

    #[test]
    fn test_metrics_concurrent_increment() {
        let metrics = Arc::new(DriverMetrics::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let metrics = metrics.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        metrics.moves_sent.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(metrics.snapshot().moves_sent, 4000);
    }
}
