//! 安全监督
//!
//! [`SafetySupervisor`] 周期性地运行一个 [`PeriodicPolicy`]，策略读取缓存中的遥测，
//! 对舵机施加或释放禁用原因。使能状态真正发生翻转时产生 [`EnableChange`]，
//! 经可选的非阻塞通道通知下游（例如把扭矩开关写到总线）。
//!
//! 过热联锁和空闲超时是同一抽象的两个实例，见 [`policies`](crate::policies)。

use crate::cache::ActuatorCache;
use crate::error::DriverError;
use crate::metrics::DriverMetrics;
use crate::periodic::{LoopHandle, run_periodic};
use crate::state::HoldReason;
use crossbeam_channel::{Sender, TrySendError};
use jointflow_protocol::{ActuatorId, now_millis};
use smallvec::SmallVec;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{info, warn};

/// 使能状态翻转事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnableChange {
    pub id: ActuatorId,
    pub enabled: bool,
    pub reason: HoldReason,
}

/// 一轮策略评估产生的事件
pub type EnableChanges = SmallVec<[EnableChange; 4]>;

/// 周期策略
///
/// `evaluate` 在监督线程上同步执行，必须是非阻塞的。
/// 同一个状态转换只能上报一次（幂等）。
pub trait PeriodicPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(&self, cache: &ActuatorCache, now_ms: u64) -> EnableChanges;
}

/// 安全监督器
pub struct SafetySupervisor<P: PeriodicPolicy> {
    cache: Arc<ActuatorCache>,
    policy: P,
    notifier: Option<Sender<EnableChange>>,
    metrics: Arc<DriverMetrics>,
}

impl<P: PeriodicPolicy> SafetySupervisor<P> {
    pub fn new(cache: Arc<ActuatorCache>, policy: P, metrics: Arc<DriverMetrics>) -> Self {
        Self {
            cache,
            policy,
            notifier: None,
            metrics,
        }
    }

    /// 设置使能变化通知通道
    pub fn with_notifier(mut self, notifier: Sender<EnableChange>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// 在给定时刻运行一轮策略
    pub fn tick(&self, now_ms: u64) -> EnableChanges {
        let changes = self.policy.evaluate(&self.cache, now_ms);

        for change in &changes {
            let counter = if change.enabled {
                &self.metrics.interlock_enables
            } else {
                &self.metrics.interlock_disables
            };
            counter.fetch_add(1, Ordering::Relaxed);
            info!(
                "{}: actuator {} {}",
                self.policy.name(),
                change.id,
                if change.enabled { "re-enabled" } else { "disabled" }
            );

            if let Some(notifier) = &self.notifier {
                match notifier.try_send(*change) {
                    Ok(()) => {},
                    Err(TrySendError::Full(_)) => {
                        warn!("{}: enable notification channel full, dropping", self.policy.name())
                    },
                    Err(TrySendError::Disconnected(_)) => {},
                }
            }
        }

        changes
    }

    /// 以当前墙钟时间运行一轮策略
    pub fn cooldown(&self) -> EnableChanges {
        self.tick(now_millis())
    }
}

impl<P: PeriodicPolicy + 'static> SafetySupervisor<P> {
    /// 在后台线程上以 `period` 周期运行
    ///
    /// # 错误
    /// - `DriverError::InvalidArgument`: 周期为 0
    /// - `DriverError::Spawn`: 线程创建失败
    pub fn spawn(self: Arc<Self>, period: Duration) -> Result<LoopHandle, DriverError> {
        if period.is_zero() {
            return Err(DriverError::InvalidArgument(
                "supervisor period must be greater than zero".to_string(),
            ));
        }
        let name = format!("jointflow-{}", self.policy.name());
        LoopHandle::spawn(&name, move |is_running| {
            run_periodic(self.policy.name(), period, &is_running, || {
                self.cooldown();
            });
        })
    }
}
