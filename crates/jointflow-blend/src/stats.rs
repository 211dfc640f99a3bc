//! 调度统计

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct BlendStats {
    pub ticks_run: AtomicU64,
    pub ticks_published: AtomicU64,
    pub ticks_skipped: AtomicU64,
    /// 耗时超过周期、推迟了下一轮的次数
    pub ticks_overrun: AtomicU64,
    pub frames_collected: AtomicU64,
    pub output_errors: AtomicU64,
}

impl BlendStats {
    pub fn snapshot(&self) -> BlendStatsSnapshot {
        BlendStatsSnapshot {
            ticks_run: self.ticks_run.load(Ordering::Relaxed),
            ticks_published: self.ticks_published.load(Ordering::Relaxed),
            ticks_skipped: self.ticks_skipped.load(Ordering::Relaxed),
            ticks_overrun: self.ticks_overrun.load(Ordering::Relaxed),
            frames_collected: self.frames_collected.load(Ordering::Relaxed),
            output_errors: self.output_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlendStatsSnapshot {
    pub ticks_run: u64,
    pub ticks_published: u64,
    pub ticks_skipped: u64,
    pub ticks_overrun: u64,
    pub frames_collected: u64,
    pub output_errors: u64,
}
