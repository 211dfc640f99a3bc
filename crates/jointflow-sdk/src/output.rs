//! 融合输出到舵机的桥接
//!
//! 关节 ID 与舵机 ID 一一对应。当前位置取自缓存的航位推算估计，
//! 写入经 [`CommandDispatcher`] 打包成一条 SyncWrite。
//!
//! 融合结果中与本轮基线相同的关节视为保持，不作为新目标下发，
//! 反馈估计不会被写回成目标。

use jointflow_blend::{BlendError, JointId, OutputSink, PositionMap};
use jointflow_driver::{ActuatorCache, CommandDispatcher, DeadReckoner, DispatchReport};
use jointflow_protocol::{ActuatorId, Normalized, now_millis};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

/// 舵机输出端
pub struct ServoOutput {
    cache: Arc<ActuatorCache>,
    dispatcher: CommandDispatcher,
    joints: BTreeMap<JointId, ActuatorId>,
    // 最近一次 current_positions 返回的基线，由下一次 write 取走
    baseline: Mutex<Option<PositionMap>>,
}

impl ServoOutput {
    pub fn new(
        cache: Arc<ActuatorCache>,
        dispatcher: CommandDispatcher,
        joints: impl IntoIterator<Item = (JointId, ActuatorId)>,
    ) -> Self {
        Self {
            cache,
            dispatcher,
            joints: joints.into_iter().collect(),
            baseline: Mutex::new(None),
        }
    }

    pub fn actuator_for(&self, joint: JointId) -> Option<ActuatorId> {
        self.joints.get(&joint).copied()
    }

    pub fn joint_for(&self, id: ActuatorId) -> Option<JointId> {
        self.joints.iter().find(|(_, a)| **a == id).map(|(j, _)| *j)
    }

    /// 指定时刻的位置估计
    pub fn positions_at(&self, at_ms: u64) -> PositionMap {
        self.joints
            .iter()
            .filter_map(|(&joint, &id)| {
                let state = self.cache.get(id)?;
                let range = self.cache.range(id)?;
                Some((joint, DeadReckoner::best_estimate(&state, &range, at_ms)))
            })
            .collect()
    }

    /// 把一组关节位置下发到舵机
    ///
    /// 没有映射的关节被忽略。
    pub fn send(
        &self,
        positions: &PositionMap,
        interval_ms: u64,
        now_ms: u64,
    ) -> Result<DispatchReport, jointflow_driver::DriverError> {
        let goals: Vec<(ActuatorId, Normalized)> = positions
            .iter()
            .filter_map(|(joint, position)| match self.joints.get(&joint) {
                Some(&id) => Some((id, position)),
                None => {
                    trace!("No actuator mapped to {}, ignoring", joint);
                    None
                },
            })
            .collect();
        self.dispatcher.dispatch(&goals, interval_ms, now_ms)
    }
}

impl OutputSink for ServoOutput {
    fn current_positions(&self) -> Option<PositionMap> {
        let positions = self.positions_at(now_millis());
        if positions.is_empty() {
            return None;
        }
        *self.baseline.lock() = Some(positions.clone());
        Some(positions)
    }

    fn write(&self, positions: &PositionMap, interval_ms: u64) -> Result<(), BlendError> {
        let baseline = self.baseline.lock().take();
        let changed: PositionMap = match &baseline {
            Some(baseline) => positions
                .iter()
                .filter(|&(joint, position)| baseline.get(joint) != Some(position))
                .collect(),
            None => positions.clone(),
        };
        if changed.len() < positions.len() {
            trace!("Servo output: {} joints held at baseline", positions.len() - changed.len());
        }

        let report = self
            .send(&changed, interval_ms, now_millis())
            .map_err(|e| BlendError::Output(e.to_string()))?;
        trace!(
            "Servo output: {} sent, {} disabled, {} stale",
            report.sent.len(),
            report.disabled.len(),
            report.stale.len()
        );
        Ok(())
    }
}
