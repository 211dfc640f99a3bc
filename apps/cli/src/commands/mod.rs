//! 命令模块

pub mod simulate;
pub mod validate;

pub use simulate::SimulateCommand;
pub use validate::ValidateCommand;
