//! 视频质量阶梯 (Quality Ladder)
//!
//! 每个视频一张表：每个分段在每个质量等级下的字节大小、VMAF、码率，
//! 以及分段时长。加载后不可变。

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// 质量阶梯错误
#[derive(Debug, Error)]
pub enum LadderError {
    #[error("Failed to read ladder {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed ladder {name} at line {line}: {reason}")]
    Parse {
        name: String,
        line: usize,
        reason: String,
    },

    #[error("Invalid ladder {name}: {reason}")]
    Validation { name: String, reason: String },
}

/// 指标族
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetricFamily {
    ByteSize,
    Vmaf,
    Bitrate,
}

impl MetricFamily {
    /// 按列名归类 (子串匹配)
    fn classify(column: &str) -> Option<Self> {
        if column.contains("byte") {
            Some(MetricFamily::ByteSize)
        } else if column.contains("vmaf") {
            Some(MetricFamily::Vmaf)
        } else if column.contains("bitrate") {
            Some(MetricFamily::Bitrate)
        } else {
            None
        }
    }
}

/// 单个分段的数据行
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRow {
    /// 分段时长 (秒)
    pub duration_s: f64,
    /// 各质量等级的字节大小
    pub byte_size: Vec<f64>,
    /// 各质量等级的 VMAF
    pub vmaf: Vec<f64>,
    /// 各质量等级的码率 (bps)
    pub bitrate_bps: Vec<f64>,
}

/// 视频质量阶梯
///
/// 质量等级 0..=max_quality 按分辨率像素数升序排列
#[derive(Debug, Clone)]
pub struct VideoLadder {
    name: String,
    labels: Vec<String>,
    rows: Vec<SegmentRow>,
}

impl VideoLadder {
    /// 从内存数据构建并校验
    pub fn new(
        name: impl Into<String>,
        labels: Vec<String>,
        rows: Vec<SegmentRow>,
    ) -> Result<Self, LadderError> {
        let name = name.into();
        let invalid = |reason: String| LadderError::Validation {
            name: name.clone(),
            reason,
        };

        if rows.is_empty() {
            return Err(invalid("ladder has no segments".to_string()));
        }
        let levels = labels.len();
        if levels == 0 {
            return Err(invalid("ladder has no quality levels".to_string()));
        }

        for (index, row) in rows.iter().enumerate() {
            if row.byte_size.len() != levels
                || row.vmaf.len() != levels
                || row.bitrate_bps.len() != levels
            {
                return Err(invalid(format!(
                    "segment {} has {}/{}/{} byte/vmaf/bitrate values, expected {}",
                    index,
                    row.byte_size.len(),
                    row.vmaf.len(),
                    row.bitrate_bps.len(),
                    levels
                )));
            }
            if !(row.duration_s > 0.0 && row.duration_s.is_finite()) {
                return Err(invalid(format!(
                    "segment {} has invalid duration {}",
                    index, row.duration_s
                )));
            }
            if row.byte_size.iter().any(|b| !(*b >= 0.0 && b.is_finite())) {
                return Err(invalid(format!(
                    "segment {} has a negative or non-finite byte size",
                    index
                )));
            }
            // 质量指标必须是有限值
            for (family, values) in [("vmaf", &row.vmaf), ("bitrate", &row.bitrate_bps)] {
                if values.iter().any(|v| !v.is_finite()) {
                    return Err(invalid(format!(
                        "segment {} has a non-finite {} value",
                        index, family
                    )));
                }
            }
        }

        Ok(Self { name, labels, rows })
    }

    /// 从 CSV 文件加载
    pub fn load(path: &Path) -> Result<Self, LadderError> {
        let content = fs::read_to_string(path).map_err(|source| LadderError::Load {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::parse(&name, &content)
    }

    /// 解析 CSV 内容
    ///
    /// 识别 `seg_len_s` 列和名称含 `byte` / `vmaf` / `bitrate` 的列，
    /// 其余列 (包括首列索引) 忽略。
    pub fn parse(name: &str, content: &str) -> Result<Self, LadderError> {
        let parse_err = |line: usize, reason: String| LadderError::Parse {
            name: name.to_string(),
            line,
            reason,
        };
        let invalid = |reason: String| LadderError::Validation {
            name: name.to_string(),
            reason,
        };

        let mut lines = content
            .lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty());

        let (_, header) = lines
            .next()
            .ok_or_else(|| invalid("file is empty".to_string()))?;
        let columns: Vec<&str> = header.split(',').map(|c| c.trim()).collect();

        let seg_len_col = columns
            .iter()
            .position(|c| *c == "seg_len_s")
            .ok_or_else(|| invalid("missing seg_len_s column".to_string()))?;

        let mut families: [Vec<(f64, usize)>; 3] = [Vec::new(), Vec::new(), Vec::new()];
        for (index, column) in columns.iter().enumerate() {
            let Some(family) = MetricFamily::classify(column) else {
                continue;
            };
            let key = resolution_product(column).ok_or_else(|| {
                invalid(format!("column {} has no WIDTHxHEIGHT resolution token", column))
            })?;
            families[family as usize].push((key, index));
        }
        for family in families.iter_mut() {
            family.sort_by(|a, b| a.0.total_cmp(&b.0));
        }

        let [bytes, vmaf, bitrate] = &families;
        if bytes.is_empty() {
            return Err(invalid("no byte size columns".to_string()));
        }
        if bytes.len() != vmaf.len() || bytes.len() != bitrate.len() {
            return Err(invalid(format!(
                "metric families disagree on level count: {} byte, {} vmaf, {} bitrate",
                bytes.len(),
                vmaf.len(),
                bitrate.len()
            )));
        }

        let labels = bytes
            .iter()
            .map(|(_, index)| resolution_token(columns[*index]).to_string())
            .collect();

        let mut rows = Vec::new();
        for (line_no, line) in lines {
            let fields: Vec<&str> = line.split(',').map(|f| f.trim()).collect();
            if fields.len() != columns.len() {
                return Err(parse_err(
                    line_no + 1,
                    format!("expected {} fields, found {}", columns.len(), fields.len()),
                ));
            }
            let value = |index: usize| -> Result<f64, LadderError> {
                let raw = fields[index];
                if raw.is_empty() {
                    return Err(invalid(format!(
                        "missing {} value on line {}",
                        columns[index],
                        line_no + 1
                    )));
                }
                raw.parse::<f64>().map_err(|e| {
                    parse_err(line_no + 1, format!("{} = {:?}: {}", columns[index], raw, e))
                })
            };
            let pick = |family: &[(f64, usize)]| -> Result<Vec<f64>, LadderError> {
                family.iter().map(|(_, index)| value(*index)).collect()
            };

            rows.push(SegmentRow {
                duration_s: value(seg_len_col)?,
                byte_size: pick(bytes)?,
                vmaf: pick(vmaf)?,
                bitrate_bps: pick(bitrate)?,
            });
        }

        Self::new(name, labels, rows)
    }

    /// 阶梯名称 (文件名)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 分段数 N
    pub fn chunk_count(&self) -> usize {
        self.rows.len()
    }

    /// 最高质量等级
    pub fn max_quality(&self) -> usize {
        self.labels.len() - 1
    }

    /// 质量等级数量
    pub fn level_count(&self) -> usize {
        self.labels.len()
    }

    /// 各等级的分辨率标签
    pub fn quality_labels(&self) -> &[String] {
        &self.labels
    }

    /// 视频总时长 (秒)
    pub fn total_duration_s(&self) -> f64 {
        self.rows.iter().map(|r| r.duration_s).sum()
    }

    pub fn byte_size(&self, chunk: usize, quality: usize) -> f64 {
        self.rows[chunk].byte_size[quality]
    }

    pub fn vmaf(&self, chunk: usize, quality: usize) -> f64 {
        self.rows[chunk].vmaf[quality]
    }

    pub fn bitrate_bps(&self, chunk: usize, quality: usize) -> f64 {
        self.rows[chunk].bitrate_bps[quality]
    }

    /// 分段时长 (秒)
    pub fn segment_duration_s(&self, chunk: usize) -> f64 {
        self.rows[chunk].duration_s
    }

    /// 指定分段全部等级的字节大小
    pub fn next_chunk_sizes(&self, chunk: usize) -> &[f64] {
        &self.rows[chunk].byte_size
    }
}

/// 列名首个 `_` 前的分辨率片段，如 `640x360`
fn resolution_token(column: &str) -> &str {
    column.split('_').next().unwrap_or(column)
}

/// 分辨率片段各数字之积，用于排序
fn resolution_product(column: &str) -> Option<f64> {
    resolution_token(column)
        .split('x')
        .map(|part| part.trim().parse::<f64>().ok())
        .try_fold(1.0, |acc, v| v.map(|v| acc * v))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
,seg_len_s,1280x720_byte,640x360_byte,1280x720_vmaf,640x360_vmaf,1280x720_bitrate,640x360_bitrate
0,4.0,400000,100000,90,60,4000000,1000000
1,4.0,410000,110000,91,61,4100000,1100000
2,2.0,200000,50000,92,62,4000000,1000000
";

    #[test]
    fn test_parse_orders_levels_by_resolution() {
        let ladder = VideoLadder::parse("sample", SAMPLE).unwrap();
        assert_eq!(ladder.chunk_count(), 3);
        assert_eq!(ladder.max_quality(), 1);
        assert_eq!(ladder.quality_labels(), &["640x360", "1280x720"]);

        // 640x360 排在前面
        assert_eq!(ladder.byte_size(0, 0), 100000.0);
        assert_eq!(ladder.byte_size(0, 1), 400000.0);
        assert_eq!(ladder.vmaf(1, 0), 61.0);
        assert_eq!(ladder.bitrate_bps(1, 1), 4_100_000.0);
        assert_eq!(ladder.next_chunk_sizes(2), &[50000.0, 200000.0]);
    }

    #[test]
    fn test_total_duration() {
        let ladder = VideoLadder::parse("sample", SAMPLE).unwrap();
        assert_eq!(ladder.total_duration_s(), 10.0);
        assert_eq!(ladder.segment_duration_s(2), 2.0);
    }

    #[test]
    fn test_missing_family_column_rejected() {
        let content = "\
seg_len_s,640x360_byte,1280x720_byte,640x360_vmaf,640x360_bitrate,1280x720_bitrate
4,1,2,3,4,5
";
        let err = VideoLadder::parse("broken", content).unwrap_err();
        assert!(matches!(err, LadderError::Validation { .. }));
    }

    #[test]
    fn test_empty_ladder_rejected() {
        let content = "seg_len_s,640x360_byte,640x360_vmaf,640x360_bitrate\n";
        let err = VideoLadder::parse("empty", content).unwrap_err();
        assert!(matches!(err, LadderError::Validation { .. }));
    }

    #[test]
    fn test_missing_value_rejected() {
        let content = "\
seg_len_s,640x360_byte,640x360_vmaf,640x360_bitrate
4,100,,1000
";
        let err = VideoLadder::parse("hole", content).unwrap_err();
        assert!(matches!(err, LadderError::Validation { .. }));
    }

    #[test]
    fn test_non_finite_values_rejected() {
        let header = "seg_len_s,640x360_byte,640x360_vmaf,640x360_bitrate\n";
        for row in ["4,inf,60,1000", "inf,100,60,1000", "4,100,NaN,1000", "4,100,60,-inf"] {
            let content = format!("{}{}\n", header, row);
            let err = VideoLadder::parse("non_finite", &content).unwrap_err();
            assert!(
                matches!(err, LadderError::Validation { .. }),
                "row {:?} gave {}",
                row,
                err
            );
        }
    }

    #[test]
    fn test_bad_number_reports_line() {
        let content = "\
seg_len_s,640x360_byte,640x360_vmaf,640x360_bitrate
4,100,60,1000
4,abc,60,1000
";
        match VideoLadder::parse("nan", content).unwrap_err() {
            LadderError::Parse { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let err = VideoLadder::load(Path::new("/nonexistent/ladder.csv")).unwrap_err();
        assert!(matches!(err, LadderError::Load { .. }));
    }
}
