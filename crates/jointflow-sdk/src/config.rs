//! 运动配置
//!
//! TOML 格式，示例：
//!
//! ```toml
//! [blend]
//! tick_interval_ms = 20
//! combiner = "last_writer"
//!
//! [thermal]
//! max_run_temperature = 70
//! cooldown_temperature = 50
//!
//! [idle]
//! idle_disable_timeout_ms = 30000
//!
//! [servo]
//! baud_rate = 1000000
//! model = "rx"
//!
//! [[actuators]]
//! id = 1
//! joint = 0
//! min_position = 0
//! max_position = 1023
//! default_position = 512
//! ```
//!
//! 未出现的段落和字段使用默认值。加载时整体校验，非法配置不会产生运行时。

use jointflow_blend::{CombinerKind, JointId};
use jointflow_driver::{ActuatorConfig, DispatchSettings, ServoModel};
use jointflow_protocol::{ActuatorId, BaudRate, PositionRange, ProtocolError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Invalid config value: {0}")]
    Protocol(#[from] ProtocolError),
}

/// 舵机型号（配置名）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelName {
    #[default]
    Rx,
    Mx,
}

impl From<ModelName> for ServoModel {
    fn from(name: ModelName) -> Self {
        match name {
            ModelName::Rx => ServoModel::Rx,
            ModelName::Mx => ServoModel::Mx,
        }
    }
}

/// `[blend]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlendSection {
    pub tick_interval_ms: u64,
    pub combiner: CombinerKind,
}

impl Default for BlendSection {
    fn default() -> Self {
        Self {
            tick_interval_ms: 20,
            combiner: CombinerKind::LastWriter,
        }
    }
}

/// `[thermal]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThermalSection {
    /// 达到或超过此温度（℃）时禁用
    pub max_run_temperature: i32,
    /// 降到或低于此温度时恢复
    pub cooldown_temperature: i32,
    pub check_interval_ms: u64,
}

impl Default for ThermalSection {
    fn default() -> Self {
        Self {
            max_run_temperature: 70,
            cooldown_temperature: 50,
            check_interval_ms: 1000,
        }
    }
}

fn default_idle_check_interval_ms() -> u64 {
    1000
}

/// `[idle]`，缺省时不启用空闲超时
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdleSection {
    pub idle_disable_timeout_ms: u64,
    #[serde(default = "default_idle_check_interval_ms")]
    pub check_interval_ms: u64,
}

/// `[servo]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServoSection {
    /// 从发送到命令到达总线的估计耗时
    pub command_send_delay_ms: u64,
    /// 舵机应答前的等待时间（微秒），启动时写入 `ReturnDelayTime`
    pub status_return_delay_us: u64,
    pub baud_rate: u32,
    /// 反馈过期阈值，缺省时不按过期排除
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback_staleness_ms: Option<u64>,
    pub feedback_poll_interval_ms: u64,
    pub model: ModelName,
}

impl Default for ServoSection {
    fn default() -> Self {
        Self {
            command_send_delay_ms: 0,
            status_return_delay_us: 0,
            baud_rate: BaudRate::default().bps(),
            feedback_staleness_ms: None,
            feedback_poll_interval_ms: 20,
            model: ModelName::Rx,
        }
    }
}

/// `[[actuators]]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActuatorEntry {
    pub id: u8,
    pub joint: JointId,
    pub min_position: u16,
    pub max_position: u16,
    pub default_position: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_delay_ms: Option<u64>,
    /// 覆盖 `[idle]` 的默认超时
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_timeout_ms: Option<u64>,
}

impl ActuatorEntry {
    /// # 错误
    /// - `ConfigError::Protocol`: ID 为广播地址或超出范围，或量程非法
    pub fn actuator_config(&self) -> Result<ActuatorConfig, ConfigError> {
        let id = ActuatorId::new(self.id)?;
        let range = PositionRange::new(self.min_position, self.max_position, self.default_position)?;
        let mut config = ActuatorConfig::new(id, range);
        if let Some(delay) = self.command_delay_ms {
            config = config.with_command_delay(delay);
        }
        Ok(config)
    }
}

/// 完整运动配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MotionConfig {
    pub blend: BlendSection,
    pub thermal: ThermalSection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle: Option<IdleSection>,
    pub servo: ServoSection,
    pub actuators: Vec<ActuatorEntry>,
}

impl MotionConfig {
    /// 解析并校验
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: MotionConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载并校验
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }

    /// 校验所有段落
    ///
    /// # 错误
    /// - `ConfigError::Invalid`: 周期为 0、温度阈值倒置、ID 或关节重复、位置超出型号行程
    /// - `ConfigError::Protocol`: 波特率不受支持、ID 非法、量程非法
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.blend.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("blend.tick_interval_ms must be > 0".to_string()));
        }

        let thermal = &self.thermal;
        if thermal.cooldown_temperature >= thermal.max_run_temperature {
            return Err(ConfigError::Invalid(format!(
                "thermal.cooldown_temperature ({}) must be below thermal.max_run_temperature ({})",
                thermal.cooldown_temperature, thermal.max_run_temperature
            )));
        }
        if thermal.check_interval_ms == 0 {
            return Err(ConfigError::Invalid("thermal.check_interval_ms must be > 0".to_string()));
        }

        if let Some(idle) = &self.idle {
            if idle.idle_disable_timeout_ms == 0 || idle.check_interval_ms == 0 {
                return Err(ConfigError::Invalid(
                    "idle.idle_disable_timeout_ms and idle.check_interval_ms must be > 0".to_string(),
                ));
            }
        }

        self.baud_rate()?;
        if self.servo.feedback_poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("servo.feedback_poll_interval_ms must be > 0".to_string()));
        }

        let max_raw = ServoModel::from(self.servo.model).max_position();
        let mut ids = BTreeSet::new();
        let mut joints = BTreeSet::new();
        for entry in &self.actuators {
            entry.actuator_config()?;
            if !ids.insert(entry.id) {
                return Err(ConfigError::Invalid(format!("duplicate actuator id {}", entry.id)));
            }
            if !joints.insert(entry.joint) {
                return Err(ConfigError::Invalid(format!("duplicate joint {}", entry.joint)));
            }
            let upper = entry.min_position.max(entry.max_position);
            if f64::from(upper) > max_raw {
                return Err(ConfigError::Invalid(format!(
                    "actuator {} position {} exceeds the {:?} range 0..={}",
                    entry.id, upper, self.servo.model, max_raw
                )));
            }
            if entry.idle_timeout_ms == Some(0) {
                return Err(ConfigError::Invalid(format!(
                    "actuator {} idle_timeout_ms must be > 0",
                    entry.id
                )));
            }
        }

        Ok(())
    }

    pub fn baud_rate(&self) -> Result<BaudRate, ConfigError> {
        Ok(BaudRate::try_from(self.servo.baud_rate)?)
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            model: self.servo.model.into(),
            command_send_delay_ms: self.servo.command_send_delay_ms,
            feedback_staleness_ms: self.servo.feedback_staleness_ms,
        }
    }

    /// 每个舵机的注册配置及其关节
    pub fn actuator_configs(&self) -> Result<Vec<(ActuatorConfig, JointId)>, ConfigError> {
        self.actuators
            .iter()
            .map(|entry| Ok((entry.actuator_config()?, entry.joint)))
            .collect()
    }
}
