//! 仿真驱动模块
//!
//! 职责：
//! 1. 逐分段驱动 (视频, 轨迹) 仿真，记录奖励与码率决策
//! 2. 按轨迹轮换，跳过已完成的日志 (可断点续跑)
//! 3. 批量并行评估多个视频
//!
//! 模块结构：
//! - result_log: 结果日志读写
//! - batch: 视频发现与并行批处理

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;

pub mod batch;
pub mod result_log;


pub use batch::{discover_videos, evaluate_video, run_batch, VideoSource};
pub use result_log::{LogRow, ResultLog};

use crate::config::SimConfig;
use crate::ladder::{LadderError, VideoLadder};
use crate::network::{
    NetworkSimulator, SimulationError, SimulatorParams, TraceError, TraceSet,
    MILLISECONDS_IN_SECOND,
};
use crate::quality::{create_reward_model, BandwidthEstimator, RewardModel, RobustMpcController};

/// 驱动错误
#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Ladder(#[from] LadderError),

    #[error(transparent)]
    Trace(#[from] TraceError),

    #[error(transparent)]
    Simulation(#[from] SimulationError),

    #[error("Result log {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Video task failed: {0}")]
    Task(String),
}

/// 驱动状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverPhase {
    /// 尚未开始
    Idle,
    /// 正在播放某条轨迹
    Playing,
    /// 一次播放结束，准备下一条轨迹
    EndOfVideo,
    /// 全部轨迹完成或预算耗尽
    Done,
}

/// 单个视频的评估结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoSummary {
    pub video_id: String,
    /// 完成的播放次数
    pub playbacks: usize,
    /// 因日志已完成而跳过的轨迹数
    pub skipped: usize,
    /// 下载的分段总数
    pub chunks: usize,
    pub total_reward: f64,
    pub total_rebuffer_s: f64,
    /// 是否因分段预算提前停止
    pub budget_exhausted: bool,
}

impl VideoSummary {
    fn new(video_id: &str) -> Self {
        Self {
            video_id: video_id.to_string(),
            playbacks: 0,
            skipped: 0,
            chunks: 0,
            total_reward: 0.0,
            total_rebuffer_s: 0.0,
            budget_exhausted: false,
        }
    }

    /// 平均每分段奖励
    pub fn mean_reward(&self) -> f64 {
        if self.chunks == 0 {
            0.0
        } else {
            self.total_reward / self.chunks as f64
        }
    }
}

/// 单视频仿真驱动
///
/// 依次在每条未完成的轨迹上完整播放一次视频
pub struct SimulationDriver<'a> {
    config: &'a SimConfig,
    ladder: &'a VideoLadder,
    traces: &'a TraceSet,
    reward: Box<dyn RewardModel>,
    controller: RobustMpcController,
    video_id: String,
    log_dir: PathBuf,
}

impl<'a> SimulationDriver<'a> {
    /// 创建驱动
    ///
    /// # Arguments
    /// * `video_id` - 视频标识，用于日志文件名
    /// * `log_dir` - 日志目录
    pub fn new(
        config: &'a SimConfig,
        ladder: &'a VideoLadder,
        traces: &'a TraceSet,
        video_id: impl Into<String>,
        log_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config,
            ladder,
            traces,
            reward: create_reward_model(config),
            controller: RobustMpcController::from_config(config),
            video_id: video_id.into(),
            log_dir: log_dir.into(),
        }
    }

    /// 指定轨迹的日志路径
    pub fn log_path(&self, trace_idx: usize) -> PathBuf {
        self.log_dir.join(format!(
            "video_{}_file_id_{}",
            self.video_id,
            self.traces[trace_idx].name()
        ))
    }

    /// 从 `from` 开始找下一条日志未完成的轨迹
    fn next_pending_trace(
        &self,
        from: usize,
        summary: &mut VideoSummary,
    ) -> Result<Option<usize>, DriverError> {
        for trace_idx in from..self.traces.len() {
            let path = self.log_path(trace_idx);
            if result_log::is_complete(&path, self.ladder.chunk_count())
                .map_err(|source| io_error(&path, source))?
            {
                log::info!("Skipping {}, log already complete", path.display());
                summary.skipped += 1;
                continue;
            }
            return Ok(Some(trace_idx));
        }
        Ok(None)
    }

    /// 分段预算是否已用完
    fn budget_spent(&self, summary: &VideoSummary) -> bool {
        self.config
            .chunk_budget
            .is_some_and(|budget| summary.chunks >= budget)
    }

    /// 运行全部轨迹
    pub fn run(&mut self) -> Result<VideoSummary, DriverError> {
        let ladder = self.ladder;
        let mut summary = VideoSummary::new(&self.video_id);
        let params = SimulatorParams::from(self.config);
        let mut simulator = NetworkSimulator::new(ladder, self.traces, params)?;
        let mut history = BandwidthEstimator::new();

        let mut phase = DriverPhase::Idle;
        let mut log: Option<ResultLog> = None;
        let mut playing_trace = 0;
        let mut next_candidate = 0;
        let mut time_ms = 0.0;
        let mut last_level = 0;
        let mut current_level = 0;
        let mut started = Instant::now();

        loop {
            match phase {
                DriverPhase::Idle | DriverPhase::EndOfVideo => {
                    if self.budget_spent(&summary) {
                        log::warn!(
                            "Chunk budget reached for video {}, stopping early",
                            self.video_id
                        );
                        summary.budget_exhausted = true;
                        phase = DriverPhase::Done;
                        continue;
                    }
                    match self.next_pending_trace(next_candidate, &mut summary)? {
                        Some(trace_idx) => {
                            simulator.select_trace(trace_idx)?;
                            let path = self.log_path(trace_idx);
                            log = Some(ResultLog::create(&path).map_err(|e| io_error(&path, e))?);
                            log::info!(
                                "Playing video {} on trace {} ({} chunks)",
                                self.video_id,
                                self.traces[trace_idx].name(),
                                ladder.chunk_count()
                            );

                            playing_trace = trace_idx;
                            history.reset();
                            time_ms = 0.0;
                            last_level = 0;
                            current_level = 0;
                            started = Instant::now();
                            phase = DriverPhase::Playing;
                        }
                        None => phase = DriverPhase::Done,
                    }
                }

                DriverPhase::Playing => {
                    if self.budget_spent(&summary) {
                        log::warn!(
                            "Chunk budget reached for video {}, stopping early",
                            self.video_id
                        );
                        summary.budget_exhausted = true;
                        if let Some(open) = log.take() {
                            let path = open.path().to_path_buf();
                            open.close().map_err(|e| io_error(&path, e))?;
                        }
                        phase = DriverPhase::Done;
                        continue;
                    }

                    let chunk = simulator.get_video_chunk(current_level)?;
                    time_ms += chunk.delay_ms + chunk.sleep_ms;

                    let index = chunk.chunk_index;
                    let reward = self.reward.score(
                        ladder,
                        index,
                        current_level,
                        index.saturating_sub(1),
                        last_level,
                        chunk.rebuffer_s,
                    );
                    last_level = current_level;

                    let row = LogRow {
                        time_s: time_ms / MILLISECONDS_IN_SECOND,
                        bitrate_bps: ladder.bitrate_bps(index, current_level),
                        vmaf: ladder.vmaf(index, current_level),
                        buffer_s: chunk.buffer_s,
                        rebuffer_s: chunk.rebuffer_s,
                        chunk_bytes: chunk.chunk_bytes,
                        seg_len_s: ladder.segment_duration_s(index),
                        delay_ms: chunk.delay_ms,
                        quality_level: current_level,
                        reward,
                    };
                    if let Some(open) = log.as_mut() {
                        open.append(&row).map_err(|e| io_error(open.path(), e))?;
                    }

                    summary.chunks += 1;
                    summary.total_reward += reward;
                    summary.total_rebuffer_s += chunk.rebuffer_s;

                    if chunk.delay_ms > 0.0 {
                        let delay_s = chunk.delay_ms / MILLISECONDS_IN_SECOND;
                        history.record(chunk.chunk_bytes * 8e-6 / delay_s);
                    }

                    if chunk.end_of_video {
                        if let Some(open) = log.take() {
                            let path = open.path().to_path_buf();
                            open.end_playback().map_err(|e| io_error(&path, e))?;
                        }
                        log::info!(
                            "Finished watching video {} on trace {}, took {:.2}s",
                            self.video_id,
                            self.traces[playing_trace].name(),
                            started.elapsed().as_secs_f64()
                        );
                        summary.playbacks += 1;
                        next_candidate = playing_trace + 1;
                        phase = DriverPhase::EndOfVideo;
                        continue;
                    }

                    let decision = self.controller.next_level(
                        self.reward.as_ref(),
                        ladder,
                        &history,
                        current_level,
                        chunk.buffer_s * MILLISECONDS_IN_SECOND,
                        simulator.state().chunk_counter,
                    );
                    log::debug!(
                        "chunk {} level {} -> {} ({}, estimate {:?})",
                        index,
                        last_level,
                        decision.level,
                        decision.mode.description(),
                        decision.estimate_mbit
                    );
                    current_level = decision.level;
                }

                DriverPhase::Done => break,
            }
        }

        Ok(summary)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> DriverError {
    DriverError::Io {
        path: path.to_path_buf(),
        source,
    }
}
