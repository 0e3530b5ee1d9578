//! 带宽估计模块
//!
//! 基于最近吞吐量样本的调和平均估计，RobustMPC 模式下
//! 再按最近的预测误差打折，得到偏保守的未来带宽。

use std::collections::VecDeque;

/// 默认窗口大小
pub const DEFAULT_WINDOW: usize = 5;

/// 带宽估计器
///
/// 同时维护吞吐量样本窗口和相对预测误差窗口
#[derive(Debug, Clone)]
pub struct BandwidthEstimator {
    /// 吞吐量样本 (Mbit/s)
    samples: VecDeque<f64>,
    /// 相对预测误差
    errors: VecDeque<f64>,
    /// 上一次的调和平均估计 (未打折)
    last_estimate: Option<f64>,
    /// 本视频已记录的样本总数
    probes_seen: usize,
    /// 窗口大小
    window: usize,
}

impl BandwidthEstimator {
    /// 创建新的带宽估计器
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }

    /// 指定窗口大小
    pub fn with_window(window: usize) -> Self {
        let window = window.max(1);
        Self {
            samples: VecDeque::with_capacity(window),
            errors: VecDeque::with_capacity(window),
            last_estimate: None,
            probes_seen: 0,
            window,
        }
    }

    /// 记录一次吞吐量测量
    ///
    /// 先用上一次估计计算本次的相对误差，再更新估计
    ///
    /// # Arguments
    /// * `sample_mbit` - 测得的吞吐量 (Mbit/s)
    pub fn record(&mut self, sample_mbit: f64) {
        push_bounded(&mut self.samples, sample_mbit, self.window);
        self.probes_seen += 1;

        let error = match self.last_estimate {
            Some(previous) if sample_mbit > 0.0 => (previous - sample_mbit).abs() / sample_mbit,
            _ => 0.0,
        };
        push_bounded(&mut self.errors, error, self.window);

        self.last_estimate = self.harmonic_mean();
    }

    /// 当前窗口的调和平均 (跳过开头的 0 样本)
    pub fn harmonic_mean(&self) -> Option<f64> {
        let valid: Vec<f64> = self
            .samples
            .iter()
            .copied()
            .skip_while(|s| *s <= 0.0)
            .collect();
        if valid.is_empty() {
            return None;
        }

        let inverse_sum: f64 = valid.iter().map(|s| 1.0 / s).sum();
        let mean = valid.len() as f64 / inverse_sum;
        (mean > 0.0 && mean.is_finite()).then_some(mean)
    }

    /// 未来带宽估计 (Mbit/s)
    ///
    /// `robust` 为真时除以 `1 + max(误差窗口)`。
    /// 返回 None 表示没有可用估计，调用方应退回到预热策略。
    pub fn estimate(&self, robust: bool) -> Option<f64> {
        let harmonic = self.harmonic_mean()?;
        if robust {
            Some(harmonic / (1.0 + self.max_error()))
        } else {
            Some(harmonic)
        }
    }

    /// 误差窗口中的最大相对误差
    pub fn max_error(&self) -> f64 {
        self.errors.iter().copied().fold(0.0, f64::max)
    }

    /// 最近一次样本
    pub fn latest_sample(&self) -> Option<f64> {
        self.samples.back().copied()
    }

    /// 本视频已记录的样本数
    pub fn probes_seen(&self) -> usize {
        self.probes_seen
    }

    /// 窗口中的样本数
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// 重置样本和误差窗口
    pub fn reset(&mut self) {
        self.samples.clear();
        self.errors.clear();
        self.last_estimate = None;
        self.probes_seen = 0;
    }
}

impl Default for BandwidthEstimator {
    fn default() -> Self {
        Self::new()
    }
}

fn push_bounded(queue: &mut VecDeque<f64>, value: f64, limit: usize) {
    queue.push_back(value);
    while queue.len() > limit {
        queue.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_bandwidth_estimator_new() {
        let estimator = BandwidthEstimator::new();
        assert_eq!(estimator.sample_count(), 0);
        assert_eq!(estimator.estimate(true), None);
        assert_eq!(estimator.latest_sample(), None);
    }

    #[test]
    fn test_harmonic_mean() {
        let mut estimator = BandwidthEstimator::new();
        estimator.record(1.0);
        estimator.record(4.0);

        // 2 / (1 + 0.25) = 1.6
        assert!(approx(estimator.estimate(false).unwrap(), 1.6));
    }

    #[test]
    fn test_window_bounded_to_five() {
        let mut estimator = BandwidthEstimator::new();
        for sample in [100.0, 1.0, 1.0, 1.0, 1.0, 1.0] {
            estimator.record(sample);
        }

        assert_eq!(estimator.sample_count(), 5);
        assert_eq!(estimator.probes_seen(), 6);
        assert!(approx(estimator.estimate(false).unwrap(), 1.0));
    }

    #[test]
    fn test_first_error_is_zero() {
        let mut estimator = BandwidthEstimator::new();
        estimator.record(3.0);

        assert_eq!(estimator.max_error(), 0.0);
        assert_eq!(estimator.estimate(true), estimator.estimate(false));
    }

    #[test]
    fn test_relative_error_uses_previous_estimate() {
        let mut estimator = BandwidthEstimator::new();
        estimator.record(4.0);
        estimator.record(2.0);

        // 上次估计 4.0，本次样本 2.0 -> |4 - 2| / 2 = 1.0
        assert!(approx(estimator.max_error(), 1.0));
        let harmonic = estimator.estimate(false).unwrap();
        assert!(approx(estimator.estimate(true).unwrap(), harmonic / 2.0));
    }

    #[test]
    fn test_leading_zero_samples_skipped() {
        let mut estimator = BandwidthEstimator::new();
        estimator.record(0.0);
        estimator.record(0.0);
        estimator.record(2.0);

        assert!(approx(estimator.estimate(false).unwrap(), 2.0));
    }

    #[test]
    fn test_only_zero_samples_gives_no_estimate() {
        let mut estimator = BandwidthEstimator::new();
        estimator.record(0.0);

        assert_eq!(estimator.estimate(false), None);
        assert_eq!(estimator.estimate(true), None);
    }

    #[test]
    fn test_reset() {
        let mut estimator = BandwidthEstimator::new();
        estimator.record(5.0);
        estimator.record(1.0);
        estimator.reset();

        assert_eq!(estimator.sample_count(), 0);
        assert_eq!(estimator.probes_seen(), 0);
        assert_eq!(estimator.max_error(), 0.0);

        // 重置后首个样本误差为 0
        estimator.record(2.0);
        assert_eq!(estimator.max_error(), 0.0);
    }
}
