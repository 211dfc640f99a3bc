//! 舵机监督层
//!
//! 本 crate 负责：
//! - 舵机状态缓存（ArcSwap copy-on-write，读路径无锁）
//! - 航位推算（反馈之间的位置估计）
//! - 反馈接收（轮询 → 通道 → 解码 → 缓存）
//! - 命令下发（目标记录、速度计算、SyncWrite 打包）
//! - 安全监督（过热联锁、空闲超时）
//!
//! 串口/总线驱动通过 [`ServoTransport`] 接入，本 crate 不做组帧。

pub mod cache;
pub mod dispatch;
mod error;
pub mod ingest;
pub mod metrics;
pub mod periodic;
pub mod policies;
pub mod reckoning;
pub mod speed;
pub mod state;
pub mod supervisor;
pub mod transport;

pub use cache::{ActuatorCache, ActuatorConfig, EnableTransition};
pub use dispatch::{CommandDispatcher, DispatchReport, DispatchSettings};
pub use error::DriverError;
pub use ingest::{IngestOutcome, ingest_loop, ingest_sample, poll_loop, poll_once};
pub use metrics::{DriverMetrics, DriverMetricsSnapshot};
pub use periodic::{LoopHandle, run_periodic};
pub use policies::{IdleTimeoutPolicy, ThermalPolicy};
pub use reckoning::DeadReckoner;
pub use speed::ServoModel;
pub use state::{ActuatorState, HoldReason, Holds};
pub use supervisor::{EnableChange, EnableChanges, PeriodicPolicy, SafetySupervisor};
pub use transport::{MemoryTransport, ServoTransport, TransportError};
