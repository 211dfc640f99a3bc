//! 运动帧
//!
//! 一帧描述一组关节在一个时间区间 `[timestamp, timestamp + frame_length]` 内的目标。
//! 帧是值类型，构造后不可修改，参与一次组合后即被丢弃。

use crate::error::BlendError;
use crate::positions::PositionMap;

#[derive(Debug, Clone, PartialEq)]
pub struct MotionFrame {
    timestamp_ms: u64,
    frame_length_ms: u64,
    goal_positions: PositionMap,
    previous_positions: PositionMap,
}

impl MotionFrame {
    /// 创建运动帧
    ///
    /// `previous_positions` 不要求覆盖 `goal_positions` 的所有关节。
    ///
    /// # 错误
    /// - `BlendError::InvalidArgument`: 帧长为 0
    pub fn new(
        timestamp_ms: u64,
        frame_length_ms: u64,
        goal_positions: PositionMap,
        previous_positions: PositionMap,
    ) -> Result<Self, BlendError> {
        if frame_length_ms == 0 {
            return Err(BlendError::InvalidArgument(
                "frame length must be positive".to_string(),
            ));
        }
        Ok(Self {
            timestamp_ms,
            frame_length_ms,
            goal_positions,
            previous_positions,
        })
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    pub fn frame_length_ms(&self) -> u64 {
        self.frame_length_ms
    }

    pub fn end_time_ms(&self) -> u64 {
        self.timestamp_ms.saturating_add(self.frame_length_ms)
    }

    pub fn goal_positions(&self) -> &PositionMap {
        &self.goal_positions
    }

    pub fn previous_positions(&self) -> &PositionMap {
        &self.previous_positions
    }
}
