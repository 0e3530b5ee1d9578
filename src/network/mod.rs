//! 网络仿真模块
//!
//! 职责：
//! 1. 加载带宽轨迹 (trace) 文件
//! 2. 基于轨迹逐分段模拟视频下载
//! 3. 维护播放缓冲区与轨迹位置
//!
//! 模块结构：
//! - trace: 轨迹文件与轨迹集合
//! - simulator: 分段下载仿真器

use std::path::PathBuf;

use thiserror::Error;

pub mod simulator;
pub mod trace;

pub use simulator::{ChunkDelivery, NetworkSimulator, SimulationState, SimulatorParams};
pub use trace::{Trace, TraceSet};

/// 每 Mbit 对应的字节数
pub const BYTES_PER_MBIT: f64 = 1_000_000.0 / 8.0;

/// 每秒毫秒数
pub const MILLISECONDS_IN_SECOND: f64 = 1000.0;

/// 轨迹错误
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("Failed to read trace {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed trace {name} at line {line}: {reason}")]
    Parse {
        name: String,
        line: usize,
        reason: String,
    },

    #[error("Invalid trace {name}: {reason}")]
    Validation { name: String, reason: String },

    #[error("No trace files found in {0}")]
    Empty(PathBuf),
}

/// 仿真错误
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Quality level {quality} out of range (max {max})")]
    QualityOutOfRange { quality: usize, max: usize },

    #[error("Trace index {index} out of range ({count} traces)")]
    TraceOutOfRange { index: usize, count: usize },
}
