//! Spectator CLI
//!
//! 回放记录下来的检查日志，查看生效配置

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use spectator::{read_journal_file, replay, HealthState, SpectatorConfig};

#[derive(Parser)]
#[command(name = "spectator")]
#[command(about = "Spectator - 聚合健康探针结果并回放状态变化")]
#[command(version)]
struct Cli {
    /// 配置文件路径 (默认: ~/.config/spectator/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 用滑动窗口策略回放 JSONL 检查日志，输出每次状态变化
    Replay {
        /// JSONL 文件，每行一条检查记录
        file: PathBuf,
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 打印生效的配置
    Config,
}

fn load_config(path: Option<&PathBuf>) -> Result<SpectatorConfig> {
    match path {
        Some(p) => SpectatorConfig::load(p),
        None => SpectatorConfig::auto_load(),
    }
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("spectator=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Replay { file, json } => {
            let records = read_journal_file(&file)
                .with_context(|| format!("Failed to load journal {}", file.display()))?;
            info!(records = records.len(), "Replaying journal");

            let evaluator = config.evaluator();
            let changes = replay(records, &evaluator, HealthState::Unknown, None, config.retention());

            if json {
                println!("{}", serde_json::to_string_pretty(&changes)?);
            } else if changes.is_empty() {
                println!("No state changes");
            } else {
                for change in &changes {
                    println!(
                        "{}  {} -> {}",
                        change.changed_at.to_rfc3339(),
                        change.previous,
                        change.state
                    );
                }
            }
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
