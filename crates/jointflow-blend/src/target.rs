//! 目标位置帧来源
//!
//! 以固定的归一化速度（每毫秒）把关节从当前位置推向目标，不越过目标。
//! 可选在全部关节到达目标后自动停用，设置新目标时重新启用。

use crate::blender::OutputSink;
use crate::error::BlendError;
use crate::frame::MotionFrame;
use crate::positions::{JointId, PositionMap};
use crate::source::FrameSource;
use jointflow_protocol::Normalized;
use parking_lot::Mutex;
use std::sync::Arc;

struct TargetState {
    targets: PositionMap,
    velocity_per_ms: f64,
    enabled: bool,
    stop_on_goal: bool,
}

/// 目标位置来源
pub struct PositionTargetSource {
    positions: Arc<dyn OutputSink>,
    state: Mutex<TargetState>,
}

impl PositionTargetSource {
    /// # 错误
    /// - `BlendError::InvalidArgument`: 速度不是正的有限值
    pub fn new(velocity_per_ms: f64, positions: Arc<dyn OutputSink>) -> Result<Self, BlendError> {
        if !velocity_per_ms.is_finite() || velocity_per_ms <= 0.0 {
            return Err(BlendError::InvalidArgument(format!(
                "target velocity must be positive, got {}",
                velocity_per_ms
            )));
        }
        Ok(Self {
            positions,
            state: Mutex::new(TargetState {
                targets: PositionMap::new(),
                velocity_per_ms,
                enabled: true,
                stop_on_goal: true,
            }),
        })
    }

    /// 设置单个关节的目标，并重新启用
    pub fn set_target(&self, joint: JointId, target: Normalized) {
        let mut state = self.state.lock();
        state.targets.insert(joint, target);
        state.enabled = true;
    }

    /// 合并一组目标；与现有目标完全相同时不改变启用状态
    pub fn set_targets(&self, targets: &PositionMap) {
        let mut state = self.state.lock();
        let unchanged = targets.iter().all(|(j, t)| state.targets.get(j) == Some(t));
        if unchanged {
            return;
        }
        state.targets.extend(targets.iter());
        state.enabled = true;
    }

    /// 清除所有目标并停用
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.targets = PositionMap::new();
        state.enabled = false;
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.state.lock().enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    pub fn set_stop_on_goal(&self, stop_on_goal: bool) {
        self.state.lock().stop_on_goal = stop_on_goal;
    }

    /// 负值被忽略
    pub fn set_velocity(&self, velocity_per_ms: f64) {
        if velocity_per_ms.is_finite() && velocity_per_ms > 0.0 {
            self.state.lock().velocity_per_ms = velocity_per_ms;
        }
    }
}

impl FrameSource for PositionTargetSource {
    fn poll(&self, time_ms: u64, interval_ms: u64) -> Option<MotionFrame> {
        let mut state = self.state.lock();
        if !state.enabled || state.targets.is_empty() {
            return None;
        }
        let current = self.positions.current_positions().filter(|c| !c.is_empty())?;

        let step = interval_ms as f64 * state.velocity_per_ms;
        let mut goals = PositionMap::new();
        let mut at_goal = true;
        for (joint, cur) in current.iter() {
            let Some(target) = state.targets.get(joint) else {
                continue;
            };
            let (cur, goal) = (cur.value(), target.value());
            let next = if goal >= cur {
                (cur + step).min(goal)
            } else {
                (cur - step).max(goal)
            };
            at_goal &= next == goal;
            goals.insert(joint, Normalized::clamped(next));
        }

        if goals.is_empty() {
            return None;
        }
        if state.stop_on_goal && at_goal {
            state.enabled = false;
        }
        MotionFrame::new(time_ms, interval_ms, goals, current).ok()
    }
}
