//! 运动速度计算
//!
//! 下发目标位置时同时写入 `MovingSpeed`，让舵机恰好在目标时间到达。

/// 舵机型号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServoModel {
    /// 10 bit 位置分辨率，300° 行程
    #[default]
    Rx,
    /// 12 bit 位置分辨率，360° 行程
    Mx,
}

impl ServoModel {
    /// 最小速度值（0 在协议中表示"不限速"，因此下限为 1）
    pub const MIN_SPEED: u16 = 1;
    /// 最大速度值
    pub const MAX_SPEED: u16 = 1023;

    /// 满量程位置值
    pub fn max_position(self) -> f64 {
        match self {
            ServoModel::Rx => 1023.0,
            ServoModel::Mx => 4095.0,
        }
    }

    /// 满量程对应的角度
    pub fn rotation_range_deg(self) -> f64 {
        match self {
            ServoModel::Rx => 300.0,
            ServoModel::Mx => 360.0,
        }
    }

    /// 每单位速度值对应的 rpm
    pub fn rpm_per_unit(self) -> f64 {
        match self {
            ServoModel::Rx => 0.111,
            ServoModel::Mx => 0.114,
        }
    }

    /// 在 `time_ms` 内走完 `distance` 个位置单位所需的速度值
    ///
    /// `time_ms` 小于 1 时按 1 计算，结果钳位到 `[1, 1023]`。
    pub fn moving_speed(self, distance: u32, time_ms: i64) -> u16 {
        let theta = f64::from(distance) * self.rotation_range_deg() / self.max_position();
        let time = time_ms.max(1) as f64;
        let rpm = theta * (60_000.0 / time) / 360.0;
        let speed = (rpm / self.rpm_per_unit()) as i64;
        speed.clamp(i64::from(Self::MIN_SPEED), i64::from(Self::MAX_SPEED)) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rx_full_sweep_in_one_second() {
        // 300° / 1s = 50 rpm, 50 / 0.111 = 450.45
        assert_eq!(ServoModel::Rx.moving_speed(1023, 1000), 450);
    }

    #[test]
    fn test_mx_full_sweep_in_one_second() {
        // 360° / 1s = 60 rpm, 60 / 0.114 = 526.3
        assert_eq!(ServoModel::Mx.moving_speed(4095, 1000), 526);
    }

    #[test]
    fn test_speed_bounds() {
        assert_eq!(ServoModel::Rx.moving_speed(0, 1000), 1);
        assert_eq!(ServoModel::Rx.moving_speed(1023, 1), 1023);
        assert_eq!(ServoModel::Rx.moving_speed(1023, -20), 1023);
    }
}
