//! 舵机状态缓存
//!
//! 三条路径并发访问同一个缓存：
//! - 反馈接收线程写遥测
//! - 命令下发路径写目标
//! - 安全监督线程读遥测、写使能
//!
//! 每个舵机占一个槽位，槽位内是 `ArcSwap<ActuatorState>`，所有更新都是
//! 整条记录的 copy-on-write 替换，读者永远不会看到半更新的记录。
//! 槽位表本身也是 `ArcSwap`，注册/注销时整体替换，读路径无锁。

use crate::error::DriverError;
use crate::state::{ActuatorState, HoldReason};
use arc_swap::ArcSwap;
use jointflow_protocol::{ActuatorId, FeedbackSample, Normalized, PositionRange};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// 注册舵机所需的配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorConfig {
    pub id: ActuatorId,
    pub range: PositionRange,
    pub command_delay_ms: u64,
}

impl ActuatorConfig {
    /// 默认命令延迟（毫秒）
    pub const DEFAULT_COMMAND_DELAY_MS: u64 = 2;

    pub fn new(id: ActuatorId, range: PositionRange) -> Self {
        Self {
            id,
            range,
            command_delay_ms: Self::DEFAULT_COMMAND_DELAY_MS,
        }
    }

    pub fn with_command_delay(mut self, command_delay_ms: u64) -> Self {
        self.command_delay_ms = command_delay_ms;
        self
    }
}

struct Slot {
    range: PositionRange,
    state: ArcSwap<ActuatorState>,
}

/// 使能状态变化
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnableTransition {
    pub before: bool,
    pub after: bool,
}

impl EnableTransition {
    pub fn changed(&self) -> bool {
        self.before != self.after
    }
}

/// 并发舵机状态缓存
#[derive(Default)]
pub struct ActuatorCache {
    slots: ArcSwap<HashMap<ActuatorId, Arc<Slot>>>,
    // 仅串行化注册/注销，读写状态不经过此锁
    registry_lock: Mutex<()>,
}

impl ActuatorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册舵机
    ///
    /// # 错误
    /// - `DriverError::InvalidArgument`: 广播 ID，或 ID 已注册
    pub fn register(&self, config: ActuatorConfig, now_ms: u64) -> Result<(), DriverError> {
        if config.id.is_broadcast() {
            return Err(DriverError::InvalidArgument(
                "broadcast id cannot be registered as an actuator".to_string(),
            ));
        }

        let _guard = self.registry_lock.lock();
        let current = self.slots.load();
        if current.contains_key(&config.id) {
            return Err(DriverError::InvalidArgument(format!(
                "actuator {} is already registered",
                config.id
            )));
        }

        let state = ActuatorState::new(
            config.id,
            config.range.default_normalized(),
            config.command_delay_ms,
            now_ms,
        );
        let mut next = HashMap::clone(&current);
        next.insert(
            config.id,
            Arc::new(Slot {
                range: config.range,
                state: ArcSwap::from_pointee(state),
            }),
        );
        self.slots.store(Arc::new(next));
        debug!("Registered actuator {}", config.id);
        Ok(())
    }

    /// 注销舵机，返回最后的状态
    pub fn unregister(&self, id: ActuatorId) -> Option<ActuatorState> {
        let _guard = self.registry_lock.lock();
        let current = self.slots.load();
        let slot = current.get(&id)?.clone();
        let mut next = HashMap::clone(&current);
        next.remove(&id);
        self.slots.store(Arc::new(next));
        debug!("Unregistered actuator {}", id);
        Some(slot.state.load().as_ref().clone())
    }

    fn slot(&self, id: ActuatorId) -> Result<Arc<Slot>, DriverError> {
        self.slots.load().get(&id).cloned().ok_or(DriverError::UnknownActuator(id))
    }

    pub fn contains(&self, id: ActuatorId) -> bool {
        self.slots.load().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.slots.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.load().is_empty()
    }

    /// 已注册的 ID（升序）
    pub fn ids(&self) -> Vec<ActuatorId> {
        let mut ids: Vec<_> = self.slots.load().keys().copied().collect();
        ids.sort();
        ids
    }

    /// 读取单个舵机的状态快照
    pub fn get(&self, id: ActuatorId) -> Option<ActuatorState> {
        self.slots.load().get(&id).map(|slot| slot.state.load().as_ref().clone())
    }

    /// 舵机的位置量程
    pub fn range(&self, id: ActuatorId) -> Option<PositionRange> {
        self.slots.load().get(&id).map(|slot| slot.range)
    }

    /// 所有舵机的状态快照（按 ID 升序）
    pub fn snapshot(&self) -> Vec<ActuatorState> {
        let slots = self.slots.load();
        let mut states: Vec<_> = slots.values().map(|slot| slot.state.load().as_ref().clone()).collect();
        states.sort_by_key(|s| s.id);
        states
    }

    /// 写入反馈采样
    ///
    /// # 错误
    /// - `DriverError::UnknownActuator`: 舵机未注册
    pub fn apply_feedback(&self, sample: &FeedbackSample) -> Result<(), DriverError> {
        let slot = self.slot(sample.id)?;
        slot.state.rcu(|current| Arc::new(current.with_feedback(sample)));
        Ok(())
    }

    /// 写入新目标，旧目标对整体移入 prev
    ///
    /// # 错误
    /// - `DriverError::UnknownActuator`: 舵机未注册
    pub fn set_goal(
        &self,
        id: ActuatorId,
        goal: Normalized,
        target_time_ms: u64,
        now_ms: u64,
    ) -> Result<ActuatorState, DriverError> {
        let slot = self.slot(id)?;
        let previous = slot.state.rcu(|current| Arc::new(current.with_goal(goal, target_time_ms, now_ms)));
        Ok(previous.with_goal(goal, target_time_ms, now_ms))
    }

    /// 施加或释放一个禁用原因
    ///
    /// # 错误
    /// - `DriverError::UnknownActuator`: 舵机未注册
    pub fn set_hold(
        &self,
        id: ActuatorId,
        reason: HoldReason,
        active: bool,
    ) -> Result<EnableTransition, DriverError> {
        let slot = self.slot(id)?;
        let previous = slot.state.rcu(|current| Arc::new(current.with_hold(reason, active)));
        Ok(EnableTransition {
            before: previous.enabled,
            after: previous.with_hold(reason, active).enabled,
        })
    }

    /// 操作员显式使能/禁用
    pub fn set_enabled(&self, id: ActuatorId, enabled: bool) -> Result<EnableTransition, DriverError> {
        self.set_hold(id, HoldReason::Operator, !enabled)
    }

    /// 反馈过期的舵机
    pub fn stale_ids(&self, now_ms: u64, bound_ms: u64) -> Vec<ActuatorId> {
        self.snapshot()
            .into_iter()
            .filter(|s| s.is_feedback_stale(now_ms, bound_ms))
            .map(|s| s.id)
            .collect()
    }
}

impl std::fmt::Debug for ActuatorCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActuatorCache").field("actuators", &self.ids()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn id(v: u8) -> ActuatorId {
        ActuatorId::new(v).unwrap()
    }

    fn config(v: u8) -> ActuatorConfig {
        ActuatorConfig::new(id(v), PositionRange::new(0, 1000, 500).unwrap())
    }

    fn sample(v: u8, temperature: i32, timestamp_ms: u64) -> FeedbackSample {
        FeedbackSample {
            id: id(v),
            position: 400,
            speed: 0,
            load: 0,
            voltage: 120,
            temperature,
            timestamp_ms,
        }
    }

    #[test]
    fn test_register_and_get() {
        let cache = ActuatorCache::new();
        cache.register(config(1), 0).unwrap();
        cache.register(config(2), 0).unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.ids(), vec![id(1), id(2)]);
        let state = cache.get(id(1)).unwrap();
        assert_eq!(state.goal_position.value(), 0.5);
        assert_eq!(state.command_delay_ms, ActuatorConfig::DEFAULT_COMMAND_DELAY_MS);
    }

    #[test]
    fn test_register_rejects_broadcast_and_duplicates() {
        let cache = ActuatorCache::new();
        let broadcast = ActuatorConfig::new(
            ActuatorId::BROADCAST,
            PositionRange::new(0, 1000, 500).unwrap(),
        );
        assert!(matches!(
            cache.register(broadcast, 0),
            Err(DriverError::InvalidArgument(_))
        ));

        cache.register(config(1), 0).unwrap();
        assert!(matches!(
            cache.register(config(1), 0),
            Err(DriverError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_unregister() {
        let cache = ActuatorCache::new();
        cache.register(config(3), 0).unwrap();
        assert!(cache.unregister(id(3)).is_some());
        assert!(cache.unregister(id(3)).is_none());
        assert!(cache.is_empty());
        assert!(matches!(
            cache.apply_feedback(&sample(3, 40, 10)),
            Err(DriverError::UnknownActuator(_))
        ));
    }

    #[test]
    fn test_set_goal_snapshots_previous_pair() {
        let cache = ActuatorCache::new();
        cache.register(config(1), 0).unwrap();
        cache.set_goal(id(1), Normalized::new(0.2).unwrap(), 1000, 900).unwrap();
        let state = cache.set_goal(id(1), Normalized::new(0.8).unwrap(), 2000, 1900).unwrap();

        assert_eq!(state, cache.get(id(1)).unwrap());
        assert_eq!(state.prev_goal_position.value(), 0.2);
        assert_eq!(state.prev_goal_target_time_ms, 1000);
        assert_eq!(state.goal_position.value(), 0.8);
        assert_eq!(state.goal_target_time_ms, 2000);
    }

    #[test]
    fn test_set_hold_reports_transition() {
        let cache = ActuatorCache::new();
        cache.register(config(1), 0).unwrap();

        let t = cache.set_hold(id(1), HoldReason::Thermal, true).unwrap();
        assert!(t.changed());
        assert!(!t.after);

        let t = cache.set_hold(id(1), HoldReason::Thermal, true).unwrap();
        assert!(!t.changed());

        let t = cache.set_enabled(id(1), true).unwrap();
        assert!(!t.changed(), "operator enable does not clear thermal hold");
    }

    #[test]
    fn test_stale_ids() {
        let cache = ActuatorCache::new();
        cache.register(config(1), 0).unwrap();
        cache.register(config(2), 0).unwrap();
        cache.apply_feedback(&sample(1, 40, 1000)).unwrap();

        assert_eq!(cache.stale_ids(1100, 500), vec![id(2)]);
        assert_eq!(cache.stale_ids(2000, 500), vec![id(1), id(2)]);
    }

    #[test]
    fn test_concurrent_goal_pairs_never_torn() {
        // 写线程的每个目标对满足 target_time = goal * 1000，读者检查前后两对都满足
        let cache = Arc::new(ActuatorCache::new());
        cache.register(config(1), 0).unwrap();

        let writer = {
            let cache = cache.clone();
            thread::spawn(move || {
                for i in 1..=1000u64 {
                    let goal = Normalized::clamped(i as f64 / 1000.0);
                    cache.set_goal(id(1), goal, i, 0).unwrap();
                }
            })
        };
        let reader = {
            let cache = cache.clone();
            thread::spawn(move || {
                for _ in 0..1000 {
                    let s = cache.get(id(1)).unwrap();
                    if s.goal_target_time_ms > 0 {
                        let expected = s.goal_target_time_ms as f64 / 1000.0;
                        assert!((s.goal_position.value() - expected).abs() < 1e-9);
                    }
                    if s.prev_goal_target_time_ms > 0 {
                        let expected = s.prev_goal_target_time_ms as f64 / 1000.0;
                        assert!((s.prev_goal_position.value() - expected).abs() < 1e-9);
                    }
                    assert!(s.goal_target_time_ms >= s.prev_goal_target_time_ms);
                }
            })
        };

        writer.join().unwrap();
        reader.join().unwrap();
    }
}
