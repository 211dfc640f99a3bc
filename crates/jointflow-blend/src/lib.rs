//! 多来源运动融合
//!
//! 每个调度周期：
//! 1. 向所有被跟踪的来源轮询一帧（[`FrameSource::poll`]）
//! 2. 读取输出端当前位置作为基线
//! 3. 按组合策略（[`FrameCombiner`]）合成一组位置
//! 4. 写入输出端（[`OutputSink`]）
//!
//! 调度器在后台线程上以固定周期运行，融合器和来源跟踪器可以在运行中原子替换。

pub mod blender;
pub mod combiner;
mod error;
pub mod frame;
pub mod positions;
pub mod scheduler;
pub mod source;
pub mod stats;
pub mod target;

pub use blender::{Blender, BlenderBuilder, OutputSink, SkipReason, StepOutcome};
pub use combiner::{AveragingCombiner, CombinerKind, FrameCombiner, LastWriterWins, VelocityCombiner};
pub use error::BlendError;
pub use frame::MotionFrame;
pub use positions::{JointId, PositionMap};
pub use scheduler::{BlendScheduler, SchedulerHandle, TickOutcome};
pub use source::{FrameSource, SourceId, SourceRegistry, SourceTracker, TrackedSource};
pub use stats::{BlendStats, BlendStatsSnapshot};
pub use target::PositionTargetSource;
