//! ABRLab
//!
//! 离线评估自适应码率 (ABR) 算法：在录制的带宽轨迹上回放视频下载，
//! 由 RobustMPC 逐分段选择质量等级，并记录每个分段的 QoE 奖励。
//!
//! ```bash
//! abrlab evaluate --videos Data/Videos --traces Data/Traces --reward vmaf
//! abrlab inspect ladder Data/Videos/set_a/bbb_video_info
//! abrlab inspect traces Data/Traces
//! abrlab config init
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod commands;
pub mod config;
pub mod driver;
pub mod ladder;
pub mod network;
pub mod output;
pub mod quality;

use commands::evaluate::EvaluateArgs;
use config::SimConfig;
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "abrlab")]
#[command(version)]
#[command(about = "Offline RobustMPC evaluation over recorded bandwidth traces", long_about = None)]
pub struct Cli {
    /// Config file (JSON)
    #[arg(long, short, global = true, env = "ABRLAB_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the simulation for every video over every trace
    Evaluate(EvaluateArgs),
    /// Summarize input files
    Inspect {
        #[command(subcommand)]
        action: InspectCommands,
    },
    /// Manage the config file
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum InspectCommands {
    /// Show the levels of a ladder file
    Ladder { path: PathBuf },
    /// List the traces in a directory
    Traces {
        dir: PathBuf,
        /// Only show these trace files (repeatable)
        #[arg(long)]
        keep: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective config
    Show,
    /// Print the config file location
    Path,
    /// Write a default config file
    Init {
        #[arg(long)]
        force: bool,
    },
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let config = SimConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Evaluate(args) => commands::evaluate::handle(args, config, cli.format).await,
        Commands::Inspect { action } => match action {
            InspectCommands::Ladder { path } => commands::inspect::handle_ladder(&path, cli.format),
            InspectCommands::Traces { dir, keep } => {
                let keep = (!keep.is_empty()).then_some(keep);
                commands::inspect::handle_traces(&dir, keep.as_deref(), cli.format)
            }
        },
        Commands::Config { action } => {
            commands::config::handle(action, &config, cli.config.as_deref())
        }
    }
}
