//! 配置校验命令

use anyhow::{Context, Result};
use clap::Args;
use jointflow_sdk::MotionConfig;
use std::path::PathBuf;

/// 配置校验参数
#[derive(Args, Debug)]
pub struct ValidateCommand {
    /// 配置文件路径
    pub config: PathBuf,

    /// 打印补全默认值后的配置
    #[arg(long)]
    pub print: bool,
}

impl ValidateCommand {
    pub fn execute(&self) -> Result<()> {
        let config = MotionConfig::load(&self.config)
            .with_context(|| format!("invalid config {}", self.config.display()))?;

        println!("✅ {} is valid", self.config.display());
        println!(
            "   {} actuators, tick {} ms, {:?} combiner, {}",
            config.actuators.len(),
            config.blend.tick_interval_ms,
            config.blend.combiner,
            config.baud_rate()?
        );
        if self.print {
            println!();
            print!("{}", config.to_toml_string()?);
        }
        Ok(())
    }
}
