//! 结果日志
//!
//! 每个 (视频, 轨迹) 一个文件，每个分段一行，制表符分隔：
//! `time_s bitrate vmaf buffer_s rebuffer_s chunk_bytes seg_len_s delay_ms quality_level reward`
//! 一次完整播放结束时写一个空行。

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// 已有日志至少有 N - 5 行时视为完成
pub const COMPLETE_ROW_SLACK: usize = 5;

/// 一行日志
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogRow {
    pub time_s: f64,
    pub bitrate_bps: f64,
    pub vmaf: f64,
    pub buffer_s: f64,
    pub rebuffer_s: f64,
    pub chunk_bytes: f64,
    pub seg_len_s: f64,
    pub delay_ms: f64,
    pub quality_level: usize,
    pub reward: f64,
}

impl fmt::Display for LogRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.time_s,
            self.bitrate_bps,
            self.vmaf,
            self.buffer_s,
            self.rebuffer_s,
            self.chunk_bytes,
            self.seg_len_s,
            self.delay_ms,
            self.quality_level,
            self.reward
        )
    }
}

/// 结果日志写入器
pub struct ResultLog {
    path: PathBuf,
    writer: BufWriter<File>,
    rows: usize,
}

impl ResultLog {
    /// 创建 (或截断) 日志文件
    pub fn create(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            rows: 0,
        })
    }

    pub fn append(&mut self, row: &LogRow) -> io::Result<()> {
        writeln!(self.writer, "{}", row)?;
        self.rows += 1;
        Ok(())
    }

    /// 写入播放结束的空行并关闭
    pub fn end_playback(mut self) -> io::Result<usize> {
        writeln!(self.writer)?;
        self.close()
    }

    /// 刷新并关闭，返回写入的行数
    pub fn close(mut self) -> io::Result<usize> {
        self.writer.flush()?;
        Ok(self.rows)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// 统计已有日志的数据行数 (不含空行)
pub fn count_rows(path: &Path) -> io::Result<usize> {
    let reader = BufReader::new(File::open(path)?);
    let mut rows = 0;
    for line in reader.lines() {
        if !line?.trim().is_empty() {
            rows += 1;
        }
    }
    Ok(rows)
}

/// 日志是否已完成 (不存在视为未完成)
pub fn is_complete(path: &Path, chunk_count: usize) -> io::Result<bool> {
    match count_rows(path) {
        Ok(rows) => Ok(rows >= chunk_count.saturating_sub(COMPLETE_ROW_SLACK)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
