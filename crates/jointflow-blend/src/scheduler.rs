//! 融合调度器
//!
//! 以固定周期驱动 [`Blender`]：每轮取来源快照，逐个轮询，收集返回的帧，调用一次融合。
//!
//! # 不可重入
//!
//! 同一时刻最多只有一轮在执行。周期循环里某一轮超时时，下一轮被推迟而不是并发执行；
//! 外部直接调用 [`BlendScheduler::tick`] 与循环重叠时，后到者返回 `Skipped(Busy)`。
//!
//! # 运行时替换
//!
//! 融合器和来源跟踪器放在同一个 `ArcSwap<Binding>` 中，替换是一次原子指针交换，
//! 下一轮看到的总是完整的一对，不会出现新融合器配旧跟踪器的半更新状态。

use crate::blender::{Blender, SkipReason, StepOutcome};
use crate::error::BlendError;
use crate::frame::MotionFrame;
use crate::source::{SourceId, SourceTracker};
use crate::stats::{BlendStats, BlendStatsSnapshot};
use arc_swap::ArcSwap;
use jointflow_protocol::{Pacer, now_millis};
use smallvec::SmallVec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// 一轮调度的结果
pub type TickOutcome = StepOutcome;

#[derive(Clone, Default)]
struct Binding {
    blender: Option<Arc<Blender>>,
    tracker: Option<Arc<dyn SourceTracker>>,
}

struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// 融合调度器
pub struct BlendScheduler {
    tick_interval: Duration,
    binding: ArcSwap<Binding>,
    in_tick: AtomicBool,
    stats: BlendStats,
}

impl BlendScheduler {
    /// # 错误
    /// - `BlendError::InvalidArgument`: 周期小于 1ms
    pub fn new(tick_interval: Duration) -> Result<Self, BlendError> {
        if tick_interval.as_millis() == 0 {
            return Err(BlendError::InvalidArgument(
                "tick interval must be at least 1 ms".to_string(),
            ));
        }
        Ok(Self {
            tick_interval,
            binding: ArcSwap::from_pointee(Binding::default()),
            in_tick: AtomicBool::new(false),
            stats: BlendStats::default(),
        })
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn tick_interval_ms(&self) -> u64 {
        self.tick_interval.as_millis() as u64
    }

    /// 原子地替换融合器和来源跟踪器
    pub fn bind(&self, blender: Option<Arc<Blender>>, tracker: Option<Arc<dyn SourceTracker>>) {
        self.binding.store(Arc::new(Binding { blender, tracker }));
        debug!("Blend scheduler rebound");
    }

    /// 只替换融合器
    pub fn set_blender(&self, blender: Option<Arc<Blender>>) {
        self.binding.rcu(|current| Binding {
            blender: blender.clone(),
            tracker: current.tracker.clone(),
        });
    }

    /// 只替换来源跟踪器
    pub fn set_tracker(&self, tracker: Option<Arc<dyn SourceTracker>>) {
        self.binding.rcu(|current| Binding {
            blender: current.blender.clone(),
            tracker: tracker.clone(),
        });
    }

    pub fn stats(&self) -> BlendStatsSnapshot {
        self.stats.snapshot()
    }

    /// 执行一轮调度
    ///
    /// 没有跟踪器、没有融合器、没有来源、没有帧或没有基线时返回 `Skipped`，不是错误。
    ///
    /// # 错误
    /// - `BlendError::Output`: 输出端写入失败
    pub fn tick(&self, time_ms: u64) -> Result<TickOutcome, BlendError> {
        if self.in_tick.swap(true, Ordering::AcqRel) {
            self.stats.ticks_skipped.fetch_add(1, Ordering::Relaxed);
            return Ok(StepOutcome::Skipped(SkipReason::Busy));
        }
        let _guard = TickGuard(&self.in_tick);

        self.stats.ticks_run.fetch_add(1, Ordering::Relaxed);
        let result = self.run_tick(time_ms);
        match &result {
            Ok(StepOutcome::Published(_)) => {
                self.stats.ticks_published.fetch_add(1, Ordering::Relaxed);
            },
            Ok(StepOutcome::Skipped(reason)) => {
                self.stats.ticks_skipped.fetch_add(1, Ordering::Relaxed);
                trace!("Blend tick skipped: {:?}", reason);
            },
            Err(e) => {
                self.stats.output_errors.fetch_add(1, Ordering::Relaxed);
                warn!("Blend tick failed: {}", e);
            },
        }
        result
    }

    fn run_tick(&self, time_ms: u64) -> Result<TickOutcome, BlendError> {
        // 本轮只读取一次绑定
        let binding = self.binding.load_full();
        let Some(tracker) = binding.tracker.as_ref() else {
            return Ok(StepOutcome::Skipped(SkipReason::NoTracker));
        };
        let Some(blender) = binding.blender.as_ref() else {
            return Ok(StepOutcome::Skipped(SkipReason::NoBlender));
        };

        let sources = tracker.list_sources();
        if sources.is_empty() {
            return Ok(StepOutcome::Skipped(SkipReason::NoSources));
        }

        let interval_ms = self.tick_interval_ms();
        let frames: SmallVec<[(MotionFrame, SourceId); 4]> = sources
            .iter()
            .filter_map(|tracked| tracked.source.poll(time_ms, interval_ms).map(|f| (f, tracked.id)))
            .collect();
        self.stats.frames_collected.fetch_add(frames.len() as u64, Ordering::Relaxed);

        blender.step(time_ms, interval_ms, &frames)
    }

    /// 在后台线程上按固定周期运行
    ///
    /// # 错误
    /// - `BlendError::Spawn`: 线程创建失败
    pub fn spawn(self: Arc<Self>) -> Result<SchedulerHandle, BlendError> {
        let is_running = Arc::new(AtomicBool::new(true));
        let flag = is_running.clone();
        let join = thread::Builder::new()
            .name("jointflow-blend".to_string())
            .spawn(move || self.run_loop(&flag))
            .map_err(|e| BlendError::Spawn(e.to_string()))?;

        Ok(SchedulerHandle {
            is_running,
            join: Some(join),
        })
    }

    fn run_loop(&self, is_running: &AtomicBool) {
        let mut pacer = Pacer::new("Blend scheduler", self.tick_interval);

        while is_running.load(Ordering::Acquire) {
            // 输出错误已在 tick 内记录，循环继续
            let _ = self.tick(now_millis());

            if pacer.wait().is_some() {
                self.stats.ticks_overrun.fetch_add(1, Ordering::Relaxed);
            }
        }

        trace!("Blend scheduler loop exited");
    }
}

/// 调度线程句柄
///
/// `stop()` 或 drop 时停止并等待线程退出。
#[derive(Debug)]
pub struct SchedulerHandle {
    is_running: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    pub fn stop(&mut self) {
        self.is_running.store(false, Ordering::Release);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                warn!("Blend scheduler thread panicked");
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
