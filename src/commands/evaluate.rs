//! Evaluate commands

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use serde::Serialize;

use super::CommandResult;
use crate::config::{RewardKind, SimConfig};
use crate::driver::{discover_videos, run_batch, VideoSource};
use crate::network::TraceSet;
use crate::output::{OutputFormat, TableRow};

#[derive(Debug, Args)]
pub struct EvaluateArgs {
    /// Ladder file, or a directory of ladder files
    #[arg(long, env = "ABRLAB_VIDEOS")]
    pub videos: PathBuf,

    /// Directory of bandwidth trace files
    #[arg(long, env = "ABRLAB_TRACES")]
    pub traces: PathBuf,

    /// Experiment name
    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub results_dir: Option<PathBuf>,

    /// Reward metric: bitrate or vmaf
    #[arg(long)]
    pub reward: Option<RewardKind>,

    #[arg(long)]
    pub lookahead: Option<usize>,

    /// Use the plain harmonic mean instead of the error-discounted estimate
    #[arg(long)]
    pub no_robust: bool,

    #[arg(long)]
    pub warm_up: Option<usize>,

    /// Videos evaluated concurrently
    #[arg(long, short = 'j')]
    pub parallel: Option<usize>,

    /// Stop each video after this many chunks
    #[arg(long)]
    pub budget: Option<usize>,

    /// Only use these trace files (repeatable)
    #[arg(long = "keep")]
    pub keep: Vec<String>,
}

impl EvaluateArgs {
    /// Apply command line overrides on top of the loaded config
    pub fn apply(&self, config: &mut SimConfig) {
        if let Some(name) = &self.name {
            config.name = name.clone();
        }
        if let Some(dir) = &self.results_dir {
            config.results_dir = dir.clone();
        }
        if let Some(kind) = self.reward {
            config.reward_kind = kind;
        }
        if let Some(depth) = self.lookahead {
            config.lookahead_depth = depth;
        }
        if self.no_robust {
            config.robust = false;
        }
        if let Some(probes) = self.warm_up {
            config.warm_up_probes = probes;
        }
        if let Some(parallel) = self.parallel {
            config.parallel_runs = parallel;
        }
        if self.budget.is_some() {
            config.chunk_budget = self.budget;
        }
        if !self.keep.is_empty() {
            config.keep_traces = Some(self.keep.clone());
        }
    }
}

#[derive(Debug, Serialize)]
struct EvaluationRow {
    video: String,
    status: &'static str,
    playbacks: usize,
    skipped: usize,
    chunks: usize,
    mean_reward: f64,
    rebuffer_s: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl TableRow for EvaluationRow {
    fn headers() -> Vec<&'static str> {
        vec!["VIDEO", "STATUS", "PLAYBACKS", "SKIPPED", "CHUNKS", "MEAN REWARD", "REBUFFER (s)"]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.video.clone(),
            self.status.to_string(),
            self.playbacks.to_string(),
            self.skipped.to_string(),
            self.chunks.to_string(),
            format!("{:.3}", self.mean_reward),
            format!("{:.2}", self.rebuffer_s),
        ]
    }
}

pub async fn handle(
    args: EvaluateArgs,
    mut config: SimConfig,
    format: OutputFormat,
) -> CommandResult {
    args.apply(&mut config);
    config.validate()?;

    let traces = TraceSet::load(&args.traces, config.keep_traces.as_deref())?;
    log::info!("Loaded {} traces from {}", traces.len(), args.traces.display());

    let videos = if args.videos.is_file() {
        vec![VideoSource::from_path(&args.videos)]
    } else {
        discover_videos(&args.videos)?
    };
    if videos.is_empty() {
        return Err(format!("no ladder files found in {}", args.videos.display()).into());
    }
    log::info!(
        "Evaluating {} videos as '{}' ({} reward, lookahead {}, {} in parallel)",
        videos.len(),
        config.name,
        config.reward_kind,
        config.lookahead_depth,
        config.parallel_runs
    );

    let results = run_batch(Arc::new(config), Arc::new(traces), videos).await;

    let mut failed = 0;
    let rows: Vec<EvaluationRow> = results
        .into_iter()
        .map(|(source, result)| match result {
            Ok(summary) => EvaluationRow {
                video: source.video_id,
                status: if summary.budget_exhausted { "partial" } else { "ok" },
                playbacks: summary.playbacks,
                skipped: summary.skipped,
                chunks: summary.chunks,
                mean_reward: summary.mean_reward(),
                rebuffer_s: summary.total_rebuffer_s,
                error: None,
            },
            Err(e) => {
                failed += 1;
                EvaluationRow {
                    video: source.video_id,
                    status: "failed",
                    playbacks: 0,
                    skipped: 0,
                    chunks: 0,
                    mean_reward: 0.0,
                    rebuffer_s: 0.0,
                    error: Some(e.to_string()),
                }
            }
        })
        .collect();

    format.print(&rows);

    if failed > 0 {
        return Err(format!("{} of {} videos failed", failed, rows.len()).into());
    }
    Ok(())
}
