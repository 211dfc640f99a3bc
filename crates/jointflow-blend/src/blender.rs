//! 融合器
//!
//! 一次融合步骤：读取输出端的当前位置作为基线，调用组合策略，把结果写回输出端。
//! 没有帧或没有基线时跳过（启动阶段输出端尚未上报过位置属于正常情况）。

use crate::combiner::{CombinerKind, FrameCombiner};
use crate::error::BlendError;
use crate::frame::MotionFrame;
use crate::positions::PositionMap;
use crate::source::SourceId;
use std::sync::Arc;
use tracing::trace;

/// 输出端
pub trait OutputSink: Send + Sync {
    /// 当前已应用的位置；尚未建立基线时返回 `None`
    fn current_positions(&self) -> Option<PositionMap>;

    /// 写入新的位置集合，`interval_ms` 为期望的到达时间
    fn write(&self, positions: &PositionMap, interval_ms: u64) -> Result<(), BlendError>;
}

/// 跳过原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// 上一轮仍在执行
    Busy,
    NoTracker,
    NoBlender,
    NoSources,
    NoFrames,
    NoBaseline,
}

/// 一次融合步骤的结果
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// 已写入输出端
    Published(PositionMap),
    Skipped(SkipReason),
}

/// 融合器
pub struct Blender {
    combiner: Arc<dyn FrameCombiner>,
    output: Arc<dyn OutputSink>,
}

impl Blender {
    pub fn builder() -> BlenderBuilder {
        BlenderBuilder::default()
    }

    /// 执行一次融合
    ///
    /// 未跳过时恰好写一次输出端，不重试。
    ///
    /// # 错误
    /// - `BlendError::Output`: 输出端写入失败
    pub fn step(
        &self,
        time_ms: u64,
        interval_ms: u64,
        frames: &[(MotionFrame, SourceId)],
    ) -> Result<StepOutcome, BlendError> {
        if frames.is_empty() {
            return Ok(StepOutcome::Skipped(SkipReason::NoFrames));
        }
        let current = match self.output.current_positions() {
            Some(current) if !current.is_empty() => current,
            _ => {
                trace!("Blend step skipped: no baseline positions yet");
                return Ok(StepOutcome::Skipped(SkipReason::NoBaseline));
            },
        };

        let positions = self.combiner.combine(time_ms, interval_ms, &current, frames);
        self.output.write(&positions, interval_ms)?;
        Ok(StepOutcome::Published(positions))
    }
}

/// 融合器构建器
#[derive(Default)]
pub struct BlenderBuilder {
    combiner: Option<Arc<dyn FrameCombiner>>,
    output: Option<Arc<dyn OutputSink>>,
}

impl BlenderBuilder {
    pub fn combiner(mut self, combiner: Arc<dyn FrameCombiner>) -> Self {
        self.combiner = Some(combiner);
        self
    }

    pub fn combiner_kind(self, kind: CombinerKind) -> Self {
        self.combiner(kind.build())
    }

    pub fn output(mut self, output: Arc<dyn OutputSink>) -> Self {
        self.output = Some(output);
        self
    }

    /// # 错误
    /// - `BlendError::InvalidArgument`: 缺少组合策略或输出端
    pub fn build(self) -> Result<Blender, BlendError> {
        let combiner = self
            .combiner
            .ok_or_else(|| BlendError::InvalidArgument("blender requires a frame combiner".to_string()))?;
        let output = self
            .output
            .ok_or_else(|| BlendError::InvalidArgument("blender requires an output sink".to_string()))?;
        Ok(Blender { combiner, output })
    }
}
