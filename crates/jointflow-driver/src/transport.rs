//! 传输层抽象
//!
//! 串口/总线驱动在本 crate 之外实现，负责帧头、长度与校验和。本模块只定义
//! 逻辑接口，以及一个用于测试和仿真的内存实现。

use jointflow_protocol::{
    ActuatorId, ErrorStatus, RawFeedback, Register, ServoCommand, bytes_to_u16_le, u16_to_bytes_le,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use thiserror::Error;

/// 传输层错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Transport timeout")]
    Timeout,

    #[error("Transport disconnected")]
    Disconnected,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Actuator {id} reported fault: {status:?}")]
    Fault { id: ActuatorId, status: ErrorStatus },
}

/// 舵机总线传输
///
/// 实现必须是线程安全的：命令下发、反馈轮询和使能通知可能来自不同线程。
pub trait ServoTransport: Send + Sync {
    /// 发送命令，不等待返回数据
    fn send(&self, command: &ServoCommand) -> Result<(), TransportError>;

    /// 发送读命令并返回状态包的参数字节
    fn query(&self, command: &ServoCommand) -> Result<Vec<u8>, TransportError>;
}

impl<T: ServoTransport + ?Sized> ServoTransport for std::sync::Arc<T> {
    fn send(&self, command: &ServoCommand) -> Result<(), TransportError> {
        (**self).send(command)
    }

    fn query(&self, command: &ServoCommand) -> Result<Vec<u8>, TransportError> {
        (**self).query(command)
    }
}

#[derive(Debug, Clone, Copy)]
struct SimServo {
    position: u16,
    voltage: u8,
    temperature: u8,
    torque: bool,
}

/// 内存传输（测试与仿真用）
///
/// - 记录所有发送的命令
/// - 收到 GoalPosition 的 SyncWrite 时，模拟舵机立即到达目标
/// - 收到 TorqueEnable 写入时记录扭矩状态
/// - 对已添加的舵机应答状态读取
#[derive(Debug, Default)]
pub struct MemoryTransport {
    sent: Mutex<Vec<ServoCommand>>,
    servos: Mutex<HashMap<ActuatorId, SimServo>>,
    fail_sends: Mutex<Option<TransportError>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加一个仿真舵机
    pub fn add_servo(&self, id: ActuatorId, position: u16) {
        self.servos.lock().insert(
            id,
            SimServo {
                position,
                voltage: 120,
                temperature: 35,
                torque: true,
            },
        );
    }

    /// 设置仿真舵机温度（0 表示模拟读取失败）
    pub fn set_temperature(&self, id: ActuatorId, temperature: u8) {
        if let Some(servo) = self.servos.lock().get_mut(&id) {
            servo.temperature = temperature;
        }
    }

    /// 直接改变仿真舵机位置（例如断扭矩后的下垂）
    pub fn set_position(&self, id: ActuatorId, position: u16) {
        if let Some(servo) = self.servos.lock().get_mut(&id) {
            servo.position = position;
        }
    }

    pub fn position(&self, id: ActuatorId) -> Option<u16> {
        self.servos.lock().get(&id).map(|s| s.position)
    }

    pub fn torque(&self, id: ActuatorId) -> Option<bool> {
        self.servos.lock().get(&id).map(|s| s.torque)
    }

    /// 之后的 `send` 都返回该错误（`None` 恢复正常）
    pub fn fail_sends(&self, error: Option<TransportError>) {
        *self.fail_sends.lock() = error;
    }

    /// 已发送命令的副本
    pub fn sent(&self) -> Vec<ServoCommand> {
        self.sent.lock().clone()
    }

    /// 取出并清空已发送命令
    pub fn take_sent(&self) -> Vec<ServoCommand> {
        std::mem::take(&mut *self.sent.lock())
    }

    fn apply(&self, command: &ServoCommand) {
        let mut servos = self.servos.lock();
        match command {
            ServoCommand::SyncWrite {
                start: Register::GoalPosition,
                entries,
                ..
            } => {
                for entry in entries {
                    let Some(servo) = servos.get_mut(&entry.id) else {
                        continue;
                    };
                    if let [lo, hi, ..] = entry.data.as_slice() {
                        if servo.torque {
                            servo.position = bytes_to_u16_le([*lo, *hi]);
                        }
                    }
                }
            },
            ServoCommand::WriteData {
                id,
                start: Register::TorqueEnable,
                data,
            } => {
                if let Some(servo) = servos.get_mut(id) {
                    servo.torque = data.first().copied().unwrap_or(0) != 0;
                }
            },
            _ => {},
        }
    }
}

impl ServoTransport for MemoryTransport {
    fn send(&self, command: &ServoCommand) -> Result<(), TransportError> {
        if let Some(err) = self.fail_sends.lock().clone() {
            return Err(err);
        }
        self.apply(command);
        self.sent.lock().push(command.clone());
        Ok(())
    }

    fn query(&self, command: &ServoCommand) -> Result<Vec<u8>, TransportError> {
        let ServoCommand::ReadData {
            id,
            start: Register::PresentPosition,
            ..
        } = command
        else {
            return Err(TransportError::Io(format!(
                "unsupported query: {:?}",
                command.instruction()
            )));
        };

        let servos = self.servos.lock();
        let servo = servos.get(id).ok_or(TransportError::Timeout)?;
        let mut block = Vec::with_capacity(RawFeedback::BLOCK_LEN);
        block.extend_from_slice(&u16_to_bytes_le(servo.position));
        block.extend_from_slice(&[0, 0, 0, 0]);
        block.push(servo.voltage);
        block.push(servo.temperature);
        Ok(block)
    }
}
