//! 归一化位置与位置量程映射
//!
//! 上层（动画、遥操作、融合）统一使用 `[0, 1]` 的归一化位置，
//! 下发到舵机前再通过 [`PositionRange`] 换算成原始协议单位。

use crate::ProtocolError;
use std::fmt;

/// 归一化数值，保证位于 `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "f64", into = "f64"))]
pub struct Normalized(f64);

impl Normalized {
    /// 下界 0.0
    pub const MIN: Normalized = Normalized(0.0);
    /// 上界 1.0
    pub const MAX: Normalized = Normalized(1.0);

    /// 创建归一化值
    ///
    /// # 错误
    /// - `ProtocolError::OutOfRange`: 值不在 `[0, 1]` 内或为 NaN
    pub fn new(value: f64) -> Result<Self, ProtocolError> {
        if (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ProtocolError::OutOfRange(value))
        }
    }

    /// 钳位到 `[0, 1]`（NaN 视为 0）
    pub fn clamped(value: f64) -> Self {
        if value.is_nan() {
            return Self::MIN;
        }
        Self(value.clamp(0.0, 1.0))
    }

    /// 获取原始值
    #[inline]
    pub fn value(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Normalized {
    type Error = ProtocolError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Normalized> for f64 {
    fn from(value: Normalized) -> Self {
        value.0
    }
}

impl fmt::Display for Normalized {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

/// 单个舵机的位置量程（原始协议单位）
///
/// `min` 对应归一化 0.0，`max` 对应 1.0。允许 `min > max`，
/// 用于反向安装的舵机。`default` 是上电后的静止位置。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionRange {
    min: u16,
    max: u16,
    default: u16,
}

impl PositionRange {
    /// 创建位置量程
    ///
    /// # 错误
    /// - `ProtocolError::InvalidPositionRange`: `min == max`，或 `default` 不在量程内
    pub fn new(min: u16, max: u16, default: u16) -> Result<Self, ProtocolError> {
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
        if min == max || default < lo || default > hi {
            return Err(ProtocolError::InvalidPositionRange { min, max, default });
        }
        Ok(Self { min, max, default })
    }

    pub fn min(&self) -> u16 {
        self.min
    }

    pub fn max(&self) -> u16 {
        self.max
    }

    /// 静止位置（原始单位）
    pub fn default_raw(&self) -> u16 {
        self.default
    }

    /// 静止位置（归一化）
    pub fn default_normalized(&self) -> Normalized {
        self.to_normalized(i32::from(self.default))
    }

    /// 归一化位置转原始位置（四舍五入）
    pub fn to_raw(&self, position: Normalized) -> u16 {
        let span = f64::from(self.max) - f64::from(self.min);
        let raw = f64::from(self.min) + span * position.value();
        raw.round() as u16
    }

    /// 原始位置转归一化位置（超出量程时钳位）
    pub fn to_normalized(&self, raw: i32) -> Normalized {
        let span = f64::from(self.max) - f64::from(self.min);
        Normalized::clamped((f64::from(raw) - f64::from(self.min)) / span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_bounds() {
        assert!(Normalized::new(0.0).is_ok());
        assert!(Normalized::new(1.0).is_ok());
        assert_eq!(Normalized::new(1.01), Err(ProtocolError::OutOfRange(1.01)));
        assert!(Normalized::new(-0.1).is_err());
        assert!(Normalized::new(f64::NAN).is_err());
    }

    #[test]
    fn test_normalized_clamped() {
        assert_eq!(Normalized::clamped(1.7).value(), 1.0);
        assert_eq!(Normalized::clamped(-3.0).value(), 0.0);
        assert_eq!(Normalized::clamped(f64::NAN).value(), 0.0);
        assert_eq!(Normalized::clamped(0.25).value(), 0.25);
    }

    #[test]
    fn test_position_range_mapping() {
        let range = PositionRange::new(0, 1000, 500).unwrap();
        assert_eq!(range.to_raw(Normalized::new(0.0).unwrap()), 0);
        assert_eq!(range.to_raw(Normalized::new(0.25).unwrap()), 250);
        assert_eq!(range.to_raw(Normalized::MAX), 1000);
        assert_eq!(range.to_normalized(750).value(), 0.75);
        assert_eq!(range.default_normalized().value(), 0.5);
    }

    #[test]
    fn test_position_range_reversed() {
        // 反向安装：min > max
        let range = PositionRange::new(800, 200, 500).unwrap();
        assert_eq!(range.to_raw(Normalized::MIN), 800);
        assert_eq!(range.to_raw(Normalized::MAX), 200);
        assert_eq!(range.to_normalized(500).value(), 0.5);
    }

    #[test]
    fn test_position_range_clamps_feedback() {
        let range = PositionRange::new(100, 900, 500).unwrap();
        assert_eq!(range.to_normalized(1023).value(), 1.0);
        assert_eq!(range.to_normalized(0).value(), 0.0);
    }

    #[test]
    fn test_position_range_invalid() {
        assert!(PositionRange::new(500, 500, 500).is_err());
        assert!(PositionRange::new(100, 900, 950).is_err());
        assert!(PositionRange::new(900, 100, 50).is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_normalized_serde_validates() {
        let ok: Normalized = serde_json::from_str("0.5").unwrap();
        assert_eq!(ok.value(), 0.5);
        assert!(serde_json::from_str::<Normalized>("1.5").is_err());
    }
}
