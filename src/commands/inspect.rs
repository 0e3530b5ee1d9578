//! Inspect commands

use std::path::Path;

use serde::Serialize;

use super::CommandResult;
use crate::ladder::VideoLadder;
use crate::network::{Trace, TraceSet};
use crate::output::{OutputFormat, TableRow};

#[derive(Debug, Serialize)]
pub struct LevelSummary {
    pub level: usize,
    pub label: String,
    pub mean_bitrate_mbit: f64,
    pub mean_vmaf: f64,
    pub total_mbyte: f64,
}

impl TableRow for LevelSummary {
    fn headers() -> Vec<&'static str> {
        vec!["LEVEL", "RESOLUTION", "BITRATE (Mbit/s)", "VMAF", "SIZE (MB)"]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.level.to_string(),
            self.label.clone(),
            format!("{:.3}", self.mean_bitrate_mbit),
            format!("{:.2}", self.mean_vmaf),
            format!("{:.2}", self.total_mbyte),
        ]
    }
}

/// Per-level averages over all segments
pub fn summarize_ladder(ladder: &VideoLadder) -> Vec<LevelSummary> {
    let chunks = ladder.chunk_count() as f64;
    ladder
        .quality_labels()
        .iter()
        .enumerate()
        .map(|(level, label)| {
            let (mut bitrate, mut vmaf, mut bytes) = (0.0, 0.0, 0.0);
            for chunk in 0..ladder.chunk_count() {
                bitrate += ladder.bitrate_bps(chunk, level);
                vmaf += ladder.vmaf(chunk, level);
                bytes += ladder.byte_size(chunk, level);
            }
            LevelSummary {
                level,
                label: label.clone(),
                mean_bitrate_mbit: bitrate / chunks * 1e-6,
                mean_vmaf: vmaf / chunks,
                total_mbyte: bytes * 1e-6,
            }
        })
        .collect()
}

#[derive(Debug, Serialize)]
pub struct TraceSummary {
    pub name: String,
    pub samples: usize,
    pub duration_s: f64,
    pub mean_mbit: f64,
}

impl From<&Trace> for TraceSummary {
    fn from(trace: &Trace) -> Self {
        Self {
            name: trace.name().to_string(),
            samples: trace.len(),
            duration_s: trace.duration_s(),
            mean_mbit: trace.mean_bandwidth_mbit(),
        }
    }
}

impl TableRow for TraceSummary {
    fn headers() -> Vec<&'static str> {
        vec!["TRACE", "SAMPLES", "DURATION (s)", "MEAN (Mbit/s)"]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.samples.to_string(),
            format!("{:.1}", self.duration_s),
            format!("{:.3}", self.mean_mbit),
        ]
    }
}

pub fn handle_ladder(path: &Path, format: OutputFormat) -> CommandResult {
    let ladder = VideoLadder::load(path)?;
    if format == OutputFormat::Table {
        println!(
            "{}: {} chunks, {:.1}s, {} levels",
            ladder.name(),
            ladder.chunk_count(),
            ladder.total_duration_s(),
            ladder.level_count()
        );
    }
    format.print(&summarize_ladder(&ladder));
    Ok(())
}

pub fn handle_traces(dir: &Path, keep: Option<&[String]>, format: OutputFormat) -> CommandResult {
    let traces = TraceSet::load(dir, keep)?;
    let rows: Vec<TraceSummary> = traces.iter().map(TraceSummary::from).collect();
    format.print(&rows);
    Ok(())
}
