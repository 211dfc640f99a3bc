//! 仿真命令
//!
//! 在内存舵机上运行完整的运行时：一个目标位置来源在两端之间往复，
//! 可选地让第一个舵机逐渐升温以触发过热联锁。

use anyhow::{Context, Result};
use clap::Args;
use jointflow_sdk::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

/// 仿真参数
#[derive(Args, Debug)]
pub struct SimulateCommand {
    /// 配置文件路径（缺省时生成一个默认配置）
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 未指定配置文件时生成的舵机数量
    #[arg(long, default_value_t = 3)]
    pub actuators: u8,

    /// 运行时长（秒），Ctrl+C 提前结束
    #[arg(short, long, default_value_t = 5)]
    pub seconds: u64,

    /// 目标来源速度（每毫秒归一化位移）
    #[arg(long, default_value_t = 0.001)]
    pub velocity: f64,

    /// 让第一个舵机每 100ms 升温 1℃
    #[arg(long)]
    pub heat: bool,
}

impl SimulateCommand {
    fn load_config(&self) -> Result<MotionConfig> {
        if let Some(path) = &self.config {
            return MotionConfig::load(path).with_context(|| format!("invalid config {}", path.display()));
        }
        let actuators: String = (1..=self.actuators.max(1))
            .map(|id| {
                format!(
                    "[[actuators]]\nid = {}\njoint = {}\nmin_position = 0\nmax_position = 1023\ndefault_position = 512\n",
                    id,
                    id - 1
                )
            })
            .collect();
        Ok(MotionConfig::from_toml_str(&actuators)?)
    }

    fn transport_for(config: &MotionConfig) -> Result<Arc<MemoryTransport>> {
        let transport = Arc::new(MemoryTransport::new());
        for entry in &config.actuators {
            transport.add_servo(ActuatorId::new(entry.id)?, entry.default_position);
        }
        Ok(transport)
    }

    pub fn execute(&self) -> Result<()> {
        let config = self.load_config()?;
        let joints: Vec<JointId> = config.actuators.iter().map(|a| a.joint).collect();
        let first = config.actuators.first().map(|a| a.id);
        let transport = Self::transport_for(&config)?;

        let running = Arc::new(AtomicBool::new(true));
        {
            let running = running.clone();
            ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
                .context("failed to install Ctrl+C handler")?;
        }

        let mut runtime = MotionRuntime::builder(config).transport(transport.clone()).start()?;
        let (_source_id, target) = runtime.add_target_source(self.velocity)?;

        println!("▶ simulating {} joints for {}s (Ctrl+C to stop)", joints.len(), self.seconds);
        let deadline = Instant::now() + Duration::from_secs(self.seconds);
        let mut toward_max = true;
        let mut retarget = true;
        let mut temperature = 35u8;
        let mut last_heat = Instant::now();

        while running.load(Ordering::SeqCst) && Instant::now() < deadline {
            // 到达目标后来源自动停用，换到另一端
            if retarget || !target.is_enabled() {
                let goal = if toward_max { Normalized::MAX } else { Normalized::MIN };
                let targets: PositionMap = joints.iter().map(|&j| (j, goal)).collect();
                target.set_targets(&targets);
                info!("New target {} for all joints", goal);
                toward_max = !toward_max;
                retarget = false;
            }

            if let (true, Some(id)) = (self.heat, first) {
                if last_heat.elapsed() >= Duration::from_millis(100) {
                    temperature = temperature.saturating_add(1);
                    transport.set_temperature(ActuatorId::new(id)?, temperature);
                    last_heat = Instant::now();
                }
            }

            thread::sleep(Duration::from_millis(20));
        }

        runtime.shutdown();

        let metrics = runtime.metrics();
        let stats = runtime.blend_stats();
        println!("■ stopped");
        println!(
            "   blend: {} ticks, {} published, {} skipped, {} overruns",
            stats.ticks_run, stats.ticks_published, stats.ticks_skipped, stats.ticks_overrun
        );
        println!(
            "   servo: {} moves, {} feedback accepted ({:.1}% valid), {} transport errors",
            metrics.moves_sent,
            metrics.feedback_accepted,
            metrics.feedback_valid_rate() * 100.0,
            metrics.transport_errors
        );
        println!(
            "   interlock: {} disables, {} enables, hot now: {:?}",
            metrics.interlock_disables,
            metrics.interlock_enables,
            runtime.hot_actuators()
        );
        Ok(())
    }
}
