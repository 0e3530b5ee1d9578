//! 带宽轨迹
//!
//! 文件格式：每行 `timestamp_s bandwidth_mbit`，空白分隔，时间戳严格递增。
//! 第 0 行是锚点，回放时从第 1 行开始，循环时回到第 1 行。

use std::fs;
use std::path::Path;

use super::TraceError;

/// 单条带宽轨迹
#[derive(Debug, Clone)]
pub struct Trace {
    name: String,
    times_s: Vec<f64>,
    bandwidth_mbit: Vec<f64>,
}

impl Trace {
    /// 从样本构建并校验
    pub fn new(name: impl Into<String>, samples: Vec<(f64, f64)>) -> Result<Self, TraceError> {
        let name = name.into();
        let invalid = |reason: String| TraceError::Validation {
            name: name.clone(),
            reason,
        };

        if samples.len() < 2 {
            return Err(invalid(format!(
                "need an anchor and at least one sample, found {}",
                samples.len()
            )));
        }
        if samples[0].0 < 0.0 {
            return Err(invalid("anchor timestamp is negative".to_string()));
        }
        for (i, pair) in samples.windows(2).enumerate() {
            if !(pair[1].0 > pair[0].0) {
                return Err(invalid(format!(
                    "timestamps not strictly increasing at sample {}",
                    i + 1
                )));
            }
        }
        if samples.iter().any(|(_, bw)| !(*bw >= 0.0)) {
            return Err(invalid("negative bandwidth sample".to_string()));
        }
        // 回放只用第 1 行之后的样本，全部为 0 时下载永远无法完成
        if samples[1..].iter().all(|(_, bw)| *bw == 0.0) {
            return Err(invalid("no positive bandwidth after the anchor".to_string()));
        }

        let (times_s, bandwidth_mbit) = samples.into_iter().unzip();
        Ok(Self {
            name,
            times_s,
            bandwidth_mbit,
        })
    }

    /// 解析轨迹文本
    pub fn parse(name: &str, content: &str) -> Result<Self, TraceError> {
        let mut samples = Vec::new();
        for (index, line) in content.lines().enumerate() {
            let mut fields = line.split_whitespace();
            let (Some(time), Some(bw)) = (fields.next(), fields.next()) else {
                if line.trim().is_empty() {
                    continue;
                }
                return Err(TraceError::Parse {
                    name: name.to_string(),
                    line: index + 1,
                    reason: "expected two columns".to_string(),
                });
            };
            let number = |raw: &str| {
                raw.parse::<f64>().map_err(|e| TraceError::Parse {
                    name: name.to_string(),
                    line: index + 1,
                    reason: format!("{:?}: {}", raw, e),
                })
            };
            samples.push((number(time)?, number(bw)?));
        }
        Self::new(name, samples)
    }

    /// 从文件加载，名称取文件名
    pub fn load(path: &Path) -> Result<Self, TraceError> {
        let content = fs::read_to_string(path).map_err(|source| TraceError::Load {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::parse(&name, &content)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 样本数 (含锚点)
    pub fn len(&self) -> usize {
        self.times_s.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times_s.is_empty()
    }

    /// 第 i 个样本的时间戳 (秒)
    pub fn time_s(&self, index: usize) -> f64 {
        self.times_s[index]
    }

    /// 第 i 个样本的带宽 (Mbit/s)
    pub fn bandwidth_mbit(&self, index: usize) -> f64 {
        self.bandwidth_mbit[index]
    }

    /// 轨迹时长 (秒)
    pub fn duration_s(&self) -> f64 {
        self.times_s[self.times_s.len() - 1] - self.times_s[0]
    }

    /// 回放部分的平均带宽 (Mbit/s)
    pub fn mean_bandwidth_mbit(&self) -> f64 {
        let replayed = &self.bandwidth_mbit[1..];
        replayed.iter().sum::<f64>() / replayed.len() as f64
    }
}

/// 轨迹集合
///
/// 目录中的文件按文件名字典序加载，保证结果与平台无关
#[derive(Debug, Clone)]
pub struct TraceSet {
    traces: Vec<Trace>,
}

impl TraceSet {
    /// 从已加载的轨迹构建
    pub fn from_traces(traces: Vec<Trace>) -> Self {
        Self { traces }
    }

    /// 加载目录下的全部轨迹
    ///
    /// # Arguments
    /// * `dir` - 轨迹目录
    /// * `keep` - 仅保留这些文件名 (None 表示全部)
    pub fn load(dir: &Path, keep: Option<&[String]>) -> Result<Self, TraceError> {
        let entries = fs::read_dir(dir).map_err(|source| TraceError::Load {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| TraceError::Load {
                path: dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if let Some(keep) = keep {
                if !keep.iter().any(|k| *k == file_name) {
                    continue;
                }
            }
            paths.push((file_name, path));
        }
        paths.sort_by(|a, b| a.0.cmp(&b.0));

        if paths.is_empty() {
            return Err(TraceError::Empty(dir.to_path_buf()));
        }

        let traces = paths
            .iter()
            .map(|(_, path)| Trace::load(path))
            .collect::<Result<Vec<_>, _>>()?;
        log::debug!("Loaded {} traces from {}", traces.len(), dir.display());

        Ok(Self { traces })
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Trace> {
        self.traces.iter()
    }

    /// 各轨迹名称 (加载顺序)
    pub fn names(&self) -> Vec<&str> {
        self.traces.iter().map(|t| t.name()).collect()
    }
}

impl std::ops::Index<usize> for TraceSet {
    type Output = Trace;

    fn index(&self, index: usize) -> &Trace {
        &self.traces[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trace() {
        let trace = Trace::parse("t", "0 1.5\n1 2.0\n\n2.5 3.0\n").unwrap();
        assert_eq!(trace.len(), 3);
        assert_eq!(trace.time_s(2), 2.5);
        assert_eq!(trace.bandwidth_mbit(1), 2.0);
        assert_eq!(trace.duration_s(), 2.5);
        assert_eq!(trace.mean_bandwidth_mbit(), 2.5);
    }

    #[test]
    fn test_non_increasing_timestamps_rejected() {
        let err = Trace::parse("t", "0 1\n1 1\n1 1\n").unwrap_err();
        assert!(matches!(err, TraceError::Validation { .. }));
    }

    #[test]
    fn test_anchor_only_rejected() {
        let err = Trace::parse("t", "0 1\n").unwrap_err();
        assert!(matches!(err, TraceError::Validation { .. }));
    }

    #[test]
    fn test_zero_bandwidth_after_anchor_rejected() {
        // 锚点带宽不参与回放
        let err = Trace::parse("t", "0 5\n1 0\n2 0\n").unwrap_err();
        assert!(matches!(err, TraceError::Validation { .. }));
    }

    #[test]
    fn test_single_column_is_parse_error() {
        match Trace::parse("t", "0 1\n1\n").unwrap_err() {
            TraceError::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_trace_set_sorted_by_file_name() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["c_trace", "a_trace", "b_trace"] {
            fs::write(dir.path().join(name), "0 1\n1 2\n").unwrap();
        }

        let set = TraceSet::load(dir.path(), None).unwrap();
        assert_eq!(set.names(), vec!["a_trace", "b_trace", "c_trace"]);
    }

    #[test]
    fn test_trace_set_keep_filter() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a", "b", "c"] {
            fs::write(dir.path().join(name), "0 1\n1 2\n").unwrap();
        }

        let keep = vec!["c".to_string(), "a".to_string()];
        let set = TraceSet::load(dir.path(), Some(&keep)).unwrap();
        assert_eq!(set.names(), vec!["a", "c"]);
    }

    #[test]
    fn test_empty_dir_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = TraceSet::load(dir.path(), None).unwrap_err();
        assert!(matches!(err, TraceError::Empty(_)));
    }

    #[test]
    fn test_missing_dir_is_load_error() {
        let err = TraceSet::load(Path::new("/nonexistent/traces"), None).unwrap_err();
        assert!(matches!(err, TraceError::Load { .. }));
    }
}
