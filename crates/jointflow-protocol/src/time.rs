//! 墙钟毫秒时间
//!
//! 目标时间、反馈时间戳与调度时间都使用 UTC 毫秒。
//! 周期循环的节拍由 [`Pacer`] 控制，使用单调时钟。

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::warn;

/// 当前 UTC 毫秒
///
/// 系统时钟早于 Unix 纪元时返回 0。
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// 绝对时间锚点节拍器
///
/// 每轮睡眠到 `上一锚点 + period`。某一轮耗时超过周期时不睡眠，
/// 把锚点重置为当前时间：循环体不会并发执行，后续轮次只会被推迟。
#[derive(Debug)]
pub struct Pacer {
    name: &'static str,
    period: Duration,
    next_tick: Instant,
}

impl Pacer {
    pub fn new(name: &'static str, period: Duration) -> Self {
        Self {
            name,
            period,
            next_tick: Instant::now() + period,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// 等待到下一个锚点
    ///
    /// 本轮超时时立即返回 `Some(本轮耗时)`。
    pub fn wait(&mut self) -> Option<Duration> {
        let now = Instant::now();
        if self.next_tick > now {
            spin_sleep::sleep(self.next_tick - now);
            self.next_tick += self.period;
            return None;
        }

        let elapsed = now.duration_since(self.next_tick - self.period);
        warn!(
            "{} loop overrun: tick took {:?}, period {:?}; delaying next tick",
            self.name, elapsed, self.period
        );
        self.next_tick = now + self.period;
        Some(elapsed)
    }
}
