//! 舵机状态记录
//!
//! [`ActuatorState`] 是不可变快照：所有修改都通过 `with_*` 方法返回新记录，
//! 再由 [`ActuatorCache`](crate::ActuatorCache) 整体替换发布。

use jointflow_protocol::{ActuatorId, FeedbackSample, Normalized};

/// 禁用原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HoldReason {
    /// 操作员显式禁用
    Operator,
    /// 过热联锁
    Thermal,
    /// 空闲超时
    Idle,
}

/// 当前生效的禁用原因集合
///
/// 只要有任意一个原因生效，舵机就处于禁用状态。每个策略只释放自己施加的原因，
/// 因此空闲策略不会重新使能一个仍在过热的舵机。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Holds {
    pub operator: bool,
    pub thermal: bool,
    pub idle: bool,
}

impl Holds {
    pub fn is_empty(&self) -> bool {
        !(self.operator || self.thermal || self.idle)
    }

    pub fn contains(&self, reason: HoldReason) -> bool {
        match reason {
            HoldReason::Operator => self.operator,
            HoldReason::Thermal => self.thermal,
            HoldReason::Idle => self.idle,
        }
    }

    fn with(mut self, reason: HoldReason, active: bool) -> Self {
        match reason {
            HoldReason::Operator => self.operator = active,
            HoldReason::Thermal => self.thermal = active,
            HoldReason::Idle => self.idle = active,
        }
        self
    }
}

/// 单个舵机的实时控制记录
///
/// 遥测字段为协议原始单位；目标位置为归一化值。
#[derive(Debug, Clone, PartialEq)]
pub struct ActuatorState {
    pub id: ActuatorId,

    pub current_position: i32,
    pub current_speed: i32,
    pub current_load: i32,
    pub current_voltage: i32,
    pub current_temperature: i32,
    /// 最近一次有效反馈的时间（UTC 毫秒，0 表示从未收到）
    pub feedback_timestamp_ms: u64,

    pub prev_goal_position: Normalized,
    pub prev_goal_target_time_ms: u64,
    pub goal_position: Normalized,
    pub goal_target_time_ms: u64,
    /// 目标位置最近一次发生变化的时间
    pub last_goal_change_ms: u64,
    /// 目标位置变化次数，每次写入不同的目标位置加一
    pub goal_revision: u64,

    /// 从下发命令到开始运动的估计延迟
    pub command_delay_ms: u64,

    pub enabled: bool,
    pub holds: Holds,
}

impl ActuatorState {
    /// 新注册舵机的初始记录
    ///
    /// 前后两个目标都设为静止位置，遥测全部为 0。
    pub fn new(id: ActuatorId, rest: Normalized, command_delay_ms: u64, now_ms: u64) -> Self {
        Self {
            id,
            current_position: 0,
            current_speed: 0,
            current_load: 0,
            current_voltage: 0,
            current_temperature: 0,
            feedback_timestamp_ms: 0,
            prev_goal_position: rest,
            prev_goal_target_time_ms: 0,
            goal_position: rest,
            goal_target_time_ms: 0,
            last_goal_change_ms: now_ms,
            goal_revision: 0,
            command_delay_ms,
            enabled: true,
            holds: Holds::default(),
        }
    }

    /// 写入遥测（目标字段与使能状态不变）
    pub fn with_feedback(&self, sample: &FeedbackSample) -> Self {
        Self {
            current_position: sample.position,
            current_speed: sample.speed,
            current_load: sample.load,
            current_voltage: sample.voltage,
            current_temperature: sample.temperature,
            feedback_timestamp_ms: sample.timestamp_ms,
            ..self.clone()
        }
    }

    /// 写入新目标
    ///
    /// 旧的 `(goal_position, goal_target_time_ms)` 整体移入 prev。
    /// 目标时间不会早于上一个目标时间（时钟回拨时钳位）。
    pub fn with_goal(&self, goal: Normalized, target_time_ms: u64, now_ms: u64) -> Self {
        let (last_goal_change_ms, goal_revision) = if goal != self.goal_position {
            (now_ms, self.goal_revision + 1)
        } else {
            (self.last_goal_change_ms, self.goal_revision)
        };
        Self {
            prev_goal_position: self.goal_position,
            prev_goal_target_time_ms: self.goal_target_time_ms,
            goal_position: goal,
            goal_target_time_ms: target_time_ms.max(self.goal_target_time_ms),
            last_goal_change_ms,
            goal_revision,
            ..self.clone()
        }
    }

    /// 施加或释放一个禁用原因
    pub fn with_hold(&self, reason: HoldReason, active: bool) -> Self {
        let holds = self.holds.with(reason, active);
        Self {
            holds,
            enabled: holds.is_empty(),
            ..self.clone()
        }
    }

    /// 反馈是否过期
    ///
    /// 从未收到反馈的舵机视为过期。
    pub fn is_feedback_stale(&self, now_ms: u64, bound_ms: u64) -> bool {
        self.feedback_timestamp_ms == 0 || now_ms.saturating_sub(self.feedback_timestamp_ms) > bound_ms
    }
}
