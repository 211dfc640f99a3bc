//! Jointflow SDK - 多来源运动融合与舵机监督
//!
//! # 架构设计
//!
//! 从底层到高层：
//!
//! - **协议层** (`protocol`): 舵机 ID、归一化位置、反馈解码、指令集
//! - **驱动层** (`driver`): 状态缓存、航位推算、命令下发、安全联锁
//! - **融合层** (`blend`): 帧来源、组合策略、固定周期调度
//! - **运行时** (`runtime`): 按配置装配上述各层并持有所有线程
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use jointflow_sdk::prelude::*;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), SdkError> {
//! let config = MotionConfig::load("jointflow.toml")?;
//! let transport = Arc::new(MemoryTransport::new());
//! let runtime = MotionRuntime::builder(config).transport(transport).start()?;
//!
//! let (_id, target) = runtime.add_target_source(0.001)?;
//! target.set_target(JointId(0), Normalized::new(0.8)?);
//! # Ok(())
//! # }
//! ```

pub mod config;
mod error;
pub mod logging;
pub mod output;
pub mod runtime;

// Prelude 模块
pub mod prelude;

pub use jointflow_blend as blend;
pub use jointflow_driver as driver;
pub use jointflow_protocol as protocol;

pub use config::{ConfigError, MotionConfig};
pub use error::SdkError;
pub use logging::init_logging;
pub use output::ServoOutput;
pub use runtime::{MotionRuntime, MotionRuntimeBuilder};
