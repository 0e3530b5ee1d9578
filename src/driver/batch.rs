//! 批量评估
//!
//! 在视频目录中发现码率阶梯文件，每个视频在阻塞线程池中独立运行，
//! 并发数由 `parallel_runs` 控制。

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::{DriverError, SimulationDriver, VideoSummary};
use crate::config::SimConfig;
use crate::ladder::VideoLadder;
use crate::network::TraceSet;

/// 码率阶梯文件名后缀
pub const VIDEO_INFO_SUFFIX: &str = "_video_info";

/// 一个待评估的视频
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSource {
    /// 去掉后缀的文件名
    pub video_id: String,
    pub ladder_path: PathBuf,
    /// 所在目录名，作为结果子目录
    pub group: String,
}

impl VideoSource {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let ladder_path = path.into();
        let file_name = ladder_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let video_id = file_name
            .strip_suffix(VIDEO_INFO_SUFFIX)
            .unwrap_or(&file_name)
            .to_string();
        let group = ladder_path
            .parent()
            .and_then(|parent| parent.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            video_id,
            ladder_path,
            group,
        }
    }

    /// 该视频的日志目录
    pub fn log_dir(&self, config: &SimConfig) -> PathBuf {
        config.experiment_dir().join(&self.group)
    }
}

/// 在目录 (及其直接子目录) 中查找码率阶梯文件，按路径排序
///
/// 隐藏文件忽略；文件名的 `_video_info` 后缀不计入视频标识
pub fn discover_videos(dir: &Path) -> Result<Vec<VideoSource>, DriverError> {
    let mut paths = Vec::new();
    for entry in read_dir(dir)? {
        if entry.is_dir() {
            paths.extend(read_dir(&entry)?.into_iter().filter(|p| is_ladder_file(p)));
        } else if is_ladder_file(&entry) {
            paths.push(entry);
        }
    }
    paths.sort();
    Ok(paths.into_iter().map(VideoSource::from_path).collect())
}

fn read_dir(dir: &Path) -> Result<Vec<PathBuf>, DriverError> {
    let io_err = |source| DriverError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        paths.push(entry.map_err(io_err)?.path());
    }
    Ok(paths)
}

fn is_ladder_file(path: &Path) -> bool {
    path.is_file()
        && path
            .file_name()
            .is_some_and(|name| !name.to_string_lossy().starts_with('.'))
}

/// 加载码率阶梯并评估单个视频 (阻塞)
pub fn evaluate_video(
    config: &SimConfig,
    traces: &TraceSet,
    source: &VideoSource,
) -> Result<VideoSummary, DriverError> {
    let ladder = VideoLadder::load(&source.ladder_path)?;
    log::info!(
        "Evaluating video {} ({} chunks, {} levels)",
        source.video_id,
        ladder.chunk_count(),
        ladder.level_count()
    );
    let mut driver = SimulationDriver::new(
        config,
        &ladder,
        traces,
        source.video_id.clone(),
        source.log_dir(config),
    );
    driver.run()
}

/// 并行评估一批视频
///
/// 单个视频失败只记录错误，不影响其他视频。结果按输入顺序返回。
pub async fn run_batch(
    config: Arc<SimConfig>,
    traces: Arc<TraceSet>,
    videos: Vec<VideoSource>,
) -> Vec<(VideoSource, Result<VideoSummary, DriverError>)> {
    let semaphore = Arc::new(Semaphore::new(config.parallel_runs.max(1)));
    let mut tasks = JoinSet::new();

    for (index, source) in videos.iter().cloned().enumerate() {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                log::error!("Batch semaphore closed: {}", e);
                break;
            }
        };
        let config = Arc::clone(&config);
        let traces = Arc::clone(&traces);
        tasks.spawn_blocking(move || {
            let _permit = permit;
            let result = evaluate_video(&config, &traces, &source);
            (index, result)
        });
    }

    let mut results: Vec<Option<Result<VideoSummary, DriverError>>> =
        videos.iter().map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => results[index] = Some(result),
            Err(e) => log::error!("Video task failed: {}", e),
        }
    }

    videos
        .into_iter()
        .zip(results)
        .map(|(source, result)| {
            let result = result.unwrap_or_else(|| {
                Err(DriverError::Task(format!("no result for {}", source.video_id)))
            });
            if let Err(e) = &result {
                log::error!("Video {} failed: {}", source.video_id, e);
            }
            (source, result)
        })
        .collect()
}
