//! 航位推算
//!
//! 在两次反馈之间，根据目标历史估计舵机当前位置。运动被认为在上一个目标
//! 时间之后 `command_delay_ms` 才开始，并在当前目标时间到达目标。

use crate::state::ActuatorState;
use jointflow_protocol::{Normalized, PositionRange};

/// 航位推算器（纯函数）
pub struct DeadReckoner;

impl DeadReckoner {
    /// 按目标历史估计 `at_ms` 时刻的位置
    ///
    /// - `at_ms <= prev_goal_target_time + command_delay`: 返回 `prev_goal_position`
    /// - `at_ms >= goal_target_time`: 返回 `goal_position`
    /// - 其间线性插值
    pub fn estimate(state: &ActuatorState, at_ms: u64) -> Normalized {
        let start = state.prev_goal_target_time_ms.saturating_add(state.command_delay_ms);
        let end = state.goal_target_time_ms;

        if at_ms <= start {
            return state.prev_goal_position;
        }
        if at_ms >= end {
            return state.goal_position;
        }

        let progress = (at_ms - start) as f64 / (end - start) as f64;
        let from = state.prev_goal_position.value();
        let to = state.goal_position.value();
        Normalized::clamped(from + (to - from) * progress)
    }

    /// 最佳位置估计
    ///
    /// 若反馈晚于本段运动的开始时间，反馈优先（换算为归一化位置）；
    /// 否则使用目标历史推算。
    pub fn best_estimate(state: &ActuatorState, range: &PositionRange, at_ms: u64) -> Normalized {
        let motion_start = state.prev_goal_target_time_ms.saturating_add(state.command_delay_ms);
        if state.feedback_timestamp_ms > 0 && state.feedback_timestamp_ms >= motion_start {
            range.to_normalized(state.current_position)
        } else {
            Self::estimate(state, at_ms)
        }
    }
}
