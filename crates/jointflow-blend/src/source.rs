//! 帧来源与来源跟踪
//!
//! [`FrameSource::poll`] 在调度线程上同步执行：必须在有界时间内返回，
//! 不能阻塞在 I/O 或调度器持有的锁上。返回 `None` 表示本轮没有新命令，不是错误。

use crate::frame::MotionFrame;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// 帧来源
pub trait FrameSource: Send + Sync {
    fn poll(&self, time_ms: u64, interval_ms: u64) -> Option<MotionFrame>;
}

impl<F> FrameSource for F
where
    F: Fn(u64, u64) -> Option<MotionFrame> + Send + Sync,
{
    fn poll(&self, time_ms: u64, interval_ms: u64) -> Option<MotionFrame> {
        self(time_ms, interval_ms)
    }
}

/// 来源 ID（按注册顺序单调递增）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceId(pub u64);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source{}", self.0)
    }
}

/// 被跟踪的来源
#[derive(Clone)]
pub struct TrackedSource {
    pub id: SourceId,
    pub source: Arc<dyn FrameSource>,
}

impl fmt::Debug for TrackedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedSource").field("id", &self.id).finish()
    }
}

/// 来源跟踪器
///
/// 返回的列表按注册顺序排列；组合策略依赖这个顺序决定冲突时谁优先。
pub trait SourceTracker: Send + Sync {
    fn list_sources(&self) -> Vec<TrackedSource>;
}

/// 默认来源注册表
///
/// 读路径（调度线程）无锁；注册/注销整体替换列表。
#[derive(Default)]
pub struct SourceRegistry {
    sources: ArcSwap<Vec<TrackedSource>>,
    next_id: AtomicU64,
    write_lock: Mutex<()>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册来源，返回其 ID
    ///
    /// 后注册的来源在冲突时优先。
    pub fn register(&self, source: Arc<dyn FrameSource>) -> SourceId {
        let _guard = self.write_lock.lock();
        let id = SourceId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut next = Vec::clone(&self.sources.load());
        next.push(TrackedSource { id, source });
        self.sources.store(Arc::new(next));
        debug!("Registered frame {}", id);
        id
    }

    /// 注销来源
    pub fn unregister(&self, id: SourceId) -> bool {
        let _guard = self.write_lock.lock();
        let current = self.sources.load();
        if !current.iter().any(|s| s.id == id) {
            return false;
        }
        let next: Vec<_> = current.iter().filter(|s| s.id != id).cloned().collect();
        self.sources.store(Arc::new(next));
        debug!("Unregistered frame {}", id);
        true
    }

    pub fn len(&self) -> usize {
        self.sources.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.load().is_empty()
    }
}

impl SourceTracker for SourceRegistry {
    fn list_sources(&self) -> Vec<TrackedSource> {
        self.sources.load().as_ref().clone()
    }
}
