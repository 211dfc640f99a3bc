//! # Jointflow CLI
//!
//! ```bash
//! # 校验配置文件
//! jointflow-cli validate jointflow.toml
//!
//! # 在内存舵机上运行一段往复运动
//! jointflow-cli simulate --config jointflow.toml --seconds 5
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{SimulateCommand, ValidateCommand};

/// Jointflow CLI - 运动融合与舵机监督工具
#[derive(Parser, Debug)]
#[command(name = "jointflow-cli")]
#[command(about = "Validate jointflow configs and run in-memory simulations", long_about = None)]
#[command(version)]
struct Cli {
    /// 默认日志过滤指令（RUST_LOG 优先）
    #[arg(long, global = true, default_value = "jointflow=info")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 校验配置文件
    Validate {
        #[command(flatten)]
        args: ValidateCommand,
    },

    /// 在内存传输上运行仿真
    Simulate {
        #[command(flatten)]
        args: SimulateCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    jointflow_sdk::init_logging(&cli.log)?;

    match cli.command {
        Commands::Validate { args } => args.execute(),
        Commands::Simulate { args } => args.execute(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_validate() {
        let cli = Cli::parse_from(["jointflow-cli", "validate", "motion.toml", "--print"]);
        let Commands::Validate { args } = cli.command else {
            panic!("expected validate");
        };
        assert_eq!(args.config.to_str(), Some("motion.toml"));
        assert!(args.print);
        assert_eq!(cli.log, "jointflow=info");
    }
}
