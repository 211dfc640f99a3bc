//! 联锁策略
//!
//! - [`ThermalPolicy`]: 过热禁用，冷却后恢复（带回差带）
//! - [`IdleTimeoutPolicy`]: 目标长时间不变则禁用，目标变化后恢复

use crate::cache::ActuatorCache;
use crate::error::DriverError;
use crate::state::HoldReason;
use crate::supervisor::{EnableChange, EnableChanges, PeriodicPolicy};
use jointflow_protocol::ActuatorId;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

/// 过热联锁
///
/// - 温度 `>= max_run_temperature` 且不在 HotSet 中：禁用并加入 HotSet
/// - 在 HotSet 中且温度 `<= cooldown_temperature`：恢复并移出 HotSet
/// - 两个阈值之间：保持不变
#[derive(Debug)]
pub struct ThermalPolicy {
    max_run_temperature: i32,
    cooldown_temperature: i32,
    hot: Mutex<BTreeSet<ActuatorId>>,
}

impl ThermalPolicy {
    /// # 错误
    /// - `DriverError::InvalidArgument`: `cooldown_temperature >= max_run_temperature`
    pub fn new(max_run_temperature: i32, cooldown_temperature: i32) -> Result<Self, DriverError> {
        if cooldown_temperature >= max_run_temperature {
            return Err(DriverError::InvalidArgument(format!(
                "cooldown temperature ({}) must be below max run temperature ({})",
                cooldown_temperature, max_run_temperature
            )));
        }
        Ok(Self {
            max_run_temperature,
            cooldown_temperature,
            hot: Mutex::new(BTreeSet::new()),
        })
    }

    pub fn max_run_temperature(&self) -> i32 {
        self.max_run_temperature
    }

    pub fn cooldown_temperature(&self) -> i32 {
        self.cooldown_temperature
    }

    /// 当前因过热被禁用的舵机
    pub fn hot_set(&self) -> Vec<ActuatorId> {
        self.hot.lock().iter().copied().collect()
    }
}

impl PeriodicPolicy for ThermalPolicy {
    fn name(&self) -> &'static str {
        "thermal"
    }

    fn evaluate(&self, cache: &ActuatorCache, _now_ms: u64) -> EnableChanges {
        let mut changes = EnableChanges::new();
        let mut hot = self.hot.lock();
        hot.retain(|id| cache.contains(*id));

        for state in cache.snapshot() {
            let temperature = state.current_temperature;
            let is_hot = hot.contains(&state.id);

            if !is_hot && temperature >= self.max_run_temperature {
                let Ok(transition) = cache.set_hold(state.id, HoldReason::Thermal, true) else {
                    continue;
                };
                hot.insert(state.id);
                info!(
                    "Actuator {} overheated ({} >= {}), disabling",
                    state.id, temperature, self.max_run_temperature
                );
                if transition.changed() {
                    changes.push(EnableChange {
                        id: state.id,
                        enabled: false,
                        reason: HoldReason::Thermal,
                    });
                }
            } else if is_hot && temperature <= self.cooldown_temperature {
                hot.remove(&state.id);
                let Ok(transition) = cache.set_hold(state.id, HoldReason::Thermal, false) else {
                    continue;
                };
                info!(
                    "Actuator {} cooled down ({} <= {}), re-enabling",
                    state.id, temperature, self.cooldown_temperature
                );
                if transition.changed() {
                    changes.push(EnableChange {
                        id: state.id,
                        enabled: true,
                        reason: HoldReason::Thermal,
                    });
                }
            }
        }

        changes
    }
}

/// 空闲超时
///
/// 目标位置超过超时时间没有变化的舵机被禁用；之后一旦收到不同的目标即恢复。
#[derive(Debug)]
pub struct IdleTimeoutPolicy {
    default_timeout_ms: u64,
    overrides: HashMap<ActuatorId, u64>,
    // 禁用时记录的 goal_revision
    idle: Mutex<HashMap<ActuatorId, u64>>,
}

impl IdleTimeoutPolicy {
    /// # 错误
    /// - `DriverError::InvalidArgument`: 超时为 0
    pub fn new(default_timeout_ms: u64) -> Result<Self, DriverError> {
        if default_timeout_ms == 0 {
            return Err(DriverError::InvalidArgument(
                "idle timeout must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            default_timeout_ms,
            overrides: HashMap::new(),
            idle: Mutex::new(HashMap::new()),
        })
    }

    /// 为单个舵机设置独立超时
    pub fn with_timeout(mut self, id: ActuatorId, timeout_ms: u64) -> Result<Self, DriverError> {
        if timeout_ms == 0 {
            return Err(DriverError::InvalidArgument(format!(
                "idle timeout for {} must be greater than zero",
                id
            )));
        }
        self.overrides.insert(id, timeout_ms);
        Ok(self)
    }

    pub fn timeout_for(&self, id: ActuatorId) -> u64 {
        self.overrides.get(&id).copied().unwrap_or(self.default_timeout_ms)
    }

    /// 当前因空闲被禁用的舵机
    pub fn idle_set(&self) -> Vec<ActuatorId> {
        let mut ids: Vec<_> = self.idle.lock().keys().copied().collect();
        ids.sort();
        ids
    }
}

impl PeriodicPolicy for IdleTimeoutPolicy {
    fn name(&self) -> &'static str {
        "idle"
    }

    fn evaluate(&self, cache: &ActuatorCache, now_ms: u64) -> EnableChanges {
        let mut changes = EnableChanges::new();
        let mut idle = self.idle.lock();
        idle.retain(|id, _| cache.contains(*id));

        for state in cache.snapshot() {
            match idle.get(&state.id).copied() {
                Some(revision) if revision != state.goal_revision => {
                    idle.remove(&state.id);
                    let Ok(transition) = cache.set_hold(state.id, HoldReason::Idle, false) else {
                        continue;
                    };
                    debug!("Actuator {} received a new goal, leaving idle", state.id);
                    if transition.changed() {
                        changes.push(EnableChange {
                            id: state.id,
                            enabled: true,
                            reason: HoldReason::Idle,
                        });
                    }
                },
                Some(_) => {},
                None => {
                    let elapsed = now_ms.saturating_sub(state.last_goal_change_ms);
                    if elapsed <= self.timeout_for(state.id) {
                        continue;
                    }
                    let Ok(transition) = cache.set_hold(state.id, HoldReason::Idle, true) else {
                        continue;
                    };
                    idle.insert(state.id, state.goal_revision);
                    debug!("Actuator {} idle for {} ms, disabling", state.id, elapsed);
                    if transition.changed() {
                        changes.push(EnableChange {
                            id: state.id,
                            enabled: false,
                            reason: HoldReason::Idle,
                        });
                    }
                },
            }
        }

        changes
    }
}
