//! 命令下发
//!
//! 一次下发：给每个目标打上目标时间（`now + interval`），写入缓存（旧目标移入 prev），
//! 再把使能且反馈未过期的舵机打包成一条 GoalPosition SyncWrite：
//!
//! | 字节 | 内容 |
//! |------|------|
//! | 0 | 舵机 ID |
//! | 1-2 | 目标位置（小端） |
//! | 3-4 | 运动速度（小端） |
//!
//! 禁用或过期的舵机仍然记录目标（空闲策略依赖目标变化来恢复），只是不进入移动包。

use crate::cache::ActuatorCache;
use crate::error::DriverError;
use crate::metrics::DriverMetrics;
use crate::reckoning::DeadReckoner;
use crate::speed::ServoModel;
use crate::transport::ServoTransport;
use jointflow_protocol::{
    ActuatorId, Normalized, Register, ServoCommand, SyncWriteEntry, u16_to_bytes_le,
};
use smallvec::SmallVec;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{trace, warn};

/// 下发参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    pub model: ServoModel,
    /// 从调用 `send` 到命令到达总线的估计耗时
    pub command_send_delay_ms: u64,
    /// 反馈过期阈值；`None` 表示不按过期排除
    pub feedback_staleness_ms: Option<u64>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            model: ServoModel::Rx,
            command_send_delay_ms: 0,
            feedback_staleness_ms: None,
        }
    }
}

/// 一次下发的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: SmallVec<[ActuatorId; 8]>,
    pub disabled: SmallVec<[ActuatorId; 4]>,
    pub stale: SmallVec<[ActuatorId; 4]>,
    pub unknown: SmallVec<[ActuatorId; 4]>,
}

/// 命令下发器
pub struct CommandDispatcher {
    cache: Arc<ActuatorCache>,
    transport: Arc<dyn ServoTransport>,
    settings: DispatchSettings,
    metrics: Arc<DriverMetrics>,
}

impl CommandDispatcher {
    pub fn new(
        cache: Arc<ActuatorCache>,
        transport: Arc<dyn ServoTransport>,
        settings: DispatchSettings,
        metrics: Arc<DriverMetrics>,
    ) -> Self {
        Self {
            cache,
            transport,
            settings,
            metrics,
        }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// 下发一组目标
    ///
    /// 未注册的舵机被跳过并记录在报告中。没有可下发的舵机时不访问传输层。
    ///
    /// # 错误
    /// - `DriverError::Transport`: 发送失败（不重试）
    pub fn dispatch(
        &self,
        goals: &[(ActuatorId, Normalized)],
        interval_ms: u64,
        now_ms: u64,
    ) -> Result<DispatchReport, DriverError> {
        let target_time_ms = now_ms.saturating_add(interval_ms);
        let mut report = DispatchReport::default();
        let mut entries = Vec::with_capacity(goals.len());

        for &(id, goal) in goals {
            let Some(range) = self.cache.range(id) else {
                warn!("Dropping goal for unregistered actuator {}", id);
                report.unknown.push(id);
                continue;
            };
            let Some(before) = self.cache.get(id) else {
                report.unknown.push(id);
                continue;
            };
            let current = range.to_raw(DeadReckoner::best_estimate(&before, &range, now_ms));
            let state = self.cache.set_goal(id, goal, target_time_ms, now_ms)?;

            if !state.enabled {
                trace!("Actuator {} disabled, goal recorded but not sent", id);
                report.disabled.push(id);
                continue;
            }
            if let Some(bound) = self.settings.feedback_staleness_ms {
                if state.is_feedback_stale(now_ms, bound) {
                    trace!("Actuator {} feedback stale, excluded from move", id);
                    report.stale.push(id);
                    continue;
                }
            }

            let goal_raw = range.to_raw(goal);
            let time_ms = target_time_ms as i64 - now_ms as i64 - self.settings.command_send_delay_ms as i64;
            let distance = u32::from(goal_raw.abs_diff(current));
            let speed = self.settings.model.moving_speed(distance, time_ms);

            let mut data = Vec::with_capacity(4);
            data.extend_from_slice(&u16_to_bytes_le(goal_raw));
            data.extend_from_slice(&u16_to_bytes_le(speed));
            entries.push(SyncWriteEntry { id, data });
            report.sent.push(id);
        }

        let withheld = (report.disabled.len() + report.stale.len()) as u64;
        self.metrics.goals_withheld.fetch_add(withheld, Ordering::Relaxed);

        if entries.is_empty() {
            return Ok(report);
        }

        let entry_count = entries.len() as u64;
        let command = ServoCommand::sync_write(Register::GoalPosition, entries)?;
        if let Err(e) = self.transport.send(&command) {
            self.metrics.transport_errors.fetch_add(1, Ordering::Relaxed);
            warn!("Failed to send move command: {}", e);
            return Err(e.into());
        }

        self.metrics.moves_sent.fetch_add(1, Ordering::Relaxed);
        self.metrics.move_entries_sent.fetch_add(entry_count, Ordering::Relaxed);
        trace!("Sent move for {} actuators, target time {}", entry_count, target_time_ms);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ActuatorConfig;
    use crate::transport::{MemoryTransport, TransportError};
    use jointflow_protocol::{FeedbackSample, PositionRange};

    fn id(v: u8) -> ActuatorId {
        ActuatorId::new(v).unwrap()
    }

    fn setup(settings: DispatchSettings) -> (Arc<ActuatorCache>, Arc<MemoryTransport>, CommandDispatcher) {
        let cache = Arc::new(ActuatorCache::new());
        for v in 1..=3 {
            cache
                .register(ActuatorConfig::new(id(v), PositionRange::new(0, 1000, 500).unwrap()), 0)
                .unwrap();
        }
        let transport = Arc::new(MemoryTransport::new());
        let dispatcher = CommandDispatcher::new(
            cache.clone(),
            transport.clone(),
            settings,
            Arc::new(DriverMetrics::new()),
        );
        (cache, transport, dispatcher)
    }

    #[test]
    fn test_dispatch_builds_single_sync_write() {
        let (cache, transport, dispatcher) = setup(DispatchSettings::default());
        let goals = [(id(1), Normalized::new(0.75).unwrap()), (id(2), Normalized::new(0.5).unwrap())];

        let report = dispatcher.dispatch(&goals, 100, 10_000).unwrap();
        assert_eq!(report.sent.as_slice(), &[id(1), id(2)]);

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        let params = sent[0].params();
        assert_eq!(params[0], Register::GoalPosition.address());
        assert_eq!(params[1], 4);
        assert_eq!(params[2], 1);
        assert_eq!(u16::from_le_bytes([params[3], params[4]]), 750);
        assert_eq!(params[7], 2);
        assert_eq!(u16::from_le_bytes([params[8], params[9]]), 500);
        // 已在目标位置，速度取下限
        assert_eq!(u16::from_le_bytes([params[10], params[11]]), 1);

        let state = cache.get(id(1)).unwrap();
        assert_eq!(state.goal_target_time_ms, 10_100);
        assert_eq!(state.prev_goal_position.value(), 0.5);
    }

    #[test]
    fn test_dispatch_skips_disabled_but_records_goal() {
        let (cache, transport, dispatcher) = setup(DispatchSettings::default());
        cache.set_enabled(id(2), false).unwrap();

        let goals = [(id(1), Normalized::new(0.1).unwrap()), (id(2), Normalized::new(0.9).unwrap())];
        let report = dispatcher.dispatch(&goals, 20, 1000).unwrap();

        assert_eq!(report.sent.as_slice(), &[id(1)]);
        assert_eq!(report.disabled.as_slice(), &[id(2)]);
        assert_eq!(cache.get(id(2)).unwrap().goal_position.value(), 0.9);

        let params = transport.sent()[0].params();
        assert_eq!(params.len(), 2 + 5);
    }

    #[test]
    fn test_dispatch_excludes_stale_feedback() {
        let settings = DispatchSettings {
            feedback_staleness_ms: Some(200),
            ..Default::default()
        };
        let (cache, transport, dispatcher) = setup(settings);
        cache
            .apply_feedback(&FeedbackSample {
                id: id(1),
                position: 500,
                speed: 0,
                load: 0,
                voltage: 120,
                temperature: 40,
                timestamp_ms: 900,
            })
            .unwrap();

        let goals = [(id(1), Normalized::new(0.6).unwrap()), (id(3), Normalized::new(0.6).unwrap())];
        let report = dispatcher.dispatch(&goals, 20, 1000).unwrap();
        assert_eq!(report.sent.as_slice(), &[id(1)]);
        assert_eq!(report.stale.as_slice(), &[id(3)]);
        assert_eq!(transport.sent().len(), 1);
    }

    #[test]
    fn test_dispatch_nothing_to_send() {
        let (cache, transport, dispatcher) = setup(DispatchSettings::default());
        cache.set_enabled(id(1), false).unwrap();

        let unknown = ActuatorId::new(40).unwrap();
        let goals = [(id(1), Normalized::MAX), (unknown, Normalized::MAX)];
        let report = dispatcher.dispatch(&goals, 20, 1000).unwrap();

        assert!(report.sent.is_empty());
        assert_eq!(report.unknown.as_slice(), &[unknown]);
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_dispatch_transport_failure_counted() {
        let (_cache, transport, dispatcher) = setup(DispatchSettings::default());
        transport.fail_sends(Some(TransportError::Timeout));

        let result = dispatcher.dispatch(&[(id(1), Normalized::MAX)], 20, 1000);
        assert!(matches!(result, Err(DriverError::Transport(TransportError::Timeout))));
        assert_eq!(dispatcher.metrics.snapshot().transport_errors, 1);
        assert_eq!(dispatcher.metrics.snapshot().moves_sent, 0);
    }

    #[test]
    fn test_dispatch_speed_accounts_for_send_delay() {
        let settings = DispatchSettings {
            command_send_delay_ms: 50,
            ..Default::default()
        };
        let (_cache, transport, dispatcher) = setup(settings);

        // 500 -> 1000 单位，目标时间 1050ms 后，扣除 50ms 发送延迟
        dispatcher.dispatch(&[(id(1), Normalized::MAX)], 1050, 0).unwrap();
        let params = transport.sent()[0].params();
        let speed = u16::from_le_bytes([params[5], params[6]]);
        assert_eq!(speed, ServoModel::Rx.moving_speed(500, 1000));
    }
}
