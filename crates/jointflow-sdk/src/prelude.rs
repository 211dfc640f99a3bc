//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use jointflow_sdk::prelude::*;
//! ```

// 运行时与配置
pub use crate::config::{ConfigError, MotionConfig};
pub use crate::runtime::{MotionRuntime, MotionRuntimeBuilder};
pub use crate::{SdkError, init_logging};

// 融合层
pub use jointflow_blend::{
    CombinerKind, FrameSource, JointId, MotionFrame, PositionMap, PositionTargetSource, SkipReason,
    SourceId, StepOutcome,
};

// 驱动层
pub use jointflow_driver::{ActuatorState, HoldReason, MemoryTransport, ServoTransport, TransportError};

// 协议层
pub use jointflow_protocol::{ActuatorId, Normalized, ProtocolError, ServoCommand};
