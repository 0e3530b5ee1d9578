//! QoE 奖励函数
//!
//! 奖励 = 质量项 - 卡顿惩罚 - 平滑惩罚。
//! 两种实现：码率 (BitrateQoE) 和 VMAF (VmafQoE)。

use serde::{Deserialize, Serialize};

use crate::ladder::VideoLadder;

/// 码率项缩放 (bps -> Mbps)
const BITRATE_SCALE: f64 = 1e-6;

/// 单个分段的奖励输入
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardState {
    /// 当前分段的质量指标
    pub quality_metric_now: f64,
    /// 上一分段的质量指标
    pub quality_metric_prev: f64,
    /// 卡顿时间 (秒)
    pub rebuffer_s: f64,
    /// 当前分段时长 (秒)
    pub chunk_len_s: f64,
}

/// 奖励参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardParams {
    /// 卡顿惩罚系数
    pub rebuffer_penalty: f64,
    /// 平滑惩罚系数
    pub smoothing_penalty: f64,
    /// 参考分段时长 (秒)
    pub reference_chunk_len_s: f64,
}

impl RewardParams {
    /// 码率奖励默认参数
    pub const BITRATE: RewardParams = RewardParams {
        rebuffer_penalty: 4.3,
        smoothing_penalty: 1.0,
        reference_chunk_len_s: 4.0,
    };

    /// VMAF 奖励默认参数
    pub const VMAF: RewardParams = RewardParams {
        rebuffer_penalty: 25.0,
        smoothing_penalty: 2.5,
        reference_chunk_len_s: 4.0,
    };
}

/// 奖励模型 trait
pub trait RewardModel: Send + Sync {
    /// 模型名称
    fn name(&self) -> &'static str;

    /// 模型参数
    fn params(&self) -> &RewardParams;

    /// 从阶梯中取出该模型使用的质量指标
    fn quality_metric(&self, ladder: &VideoLadder, chunk: usize, level: usize) -> f64;

    /// 计算奖励
    fn reward(&self, state: &RewardState) -> f64;

    /// 按阶梯查表计算一个分段的奖励
    ///
    /// # Arguments
    /// * `chunk` / `level` - 当前分段及其质量等级
    /// * `prev_chunk` / `prev_level` - 上一分段及其质量等级
    /// * `rebuffer_s` - 卡顿时间
    fn score(
        &self,
        ladder: &VideoLadder,
        chunk: usize,
        level: usize,
        prev_chunk: usize,
        prev_level: usize,
        rebuffer_s: f64,
    ) -> f64 {
        self.reward(&RewardState {
            quality_metric_now: self.quality_metric(ladder, chunk, level),
            quality_metric_prev: self.quality_metric(ladder, prev_chunk, prev_level),
            rebuffer_s,
            chunk_len_s: ladder.segment_duration_s(chunk),
        })
    }
}

/// 基于码率的 QoE
#[derive(Debug, Clone, PartialEq)]
pub struct BitrateQoE {
    params: RewardParams,
}

impl BitrateQoE {
    pub fn new(params: RewardParams) -> Self {
        Self { params }
    }
}

impl Default for BitrateQoE {
    fn default() -> Self {
        Self::new(RewardParams::BITRATE)
    }
}

impl RewardModel for BitrateQoE {
    fn name(&self) -> &'static str {
        "bitrate"
    }

    fn params(&self) -> &RewardParams {
        &self.params
    }

    fn quality_metric(&self, ladder: &VideoLadder, chunk: usize, level: usize) -> f64 {
        ladder.bitrate_bps(chunk, level)
    }

    fn reward(&self, state: &RewardState) -> f64 {
        let p = &self.params;
        state.quality_metric_now * BITRATE_SCALE * (state.chunk_len_s / p.reference_chunk_len_s)
            - p.rebuffer_penalty * state.rebuffer_s
            - p.smoothing_penalty
                * (state.quality_metric_now - state.quality_metric_prev).abs()
                * BITRATE_SCALE
    }
}

/// 基于 VMAF 的 QoE
#[derive(Debug, Clone, PartialEq)]
pub struct VmafQoE {
    params: RewardParams,
}

impl VmafQoE {
    pub fn new(params: RewardParams) -> Self {
        Self { params }
    }
}

impl Default for VmafQoE {
    fn default() -> Self {
        Self::new(RewardParams::VMAF)
    }
}

impl RewardModel for VmafQoE {
    fn name(&self) -> &'static str {
        "vmaf"
    }

    fn params(&self) -> &RewardParams {
        &self.params
    }

    fn quality_metric(&self, ladder: &VideoLadder, chunk: usize, level: usize) -> f64 {
        ladder.vmaf(chunk, level)
    }

    fn reward(&self, state: &RewardState) -> f64 {
        let p = &self.params;
        state.quality_metric_now * (state.chunk_len_s / p.reference_chunk_len_s)
            - p.rebuffer_penalty * state.rebuffer_s
            - p.smoothing_penalty * (state.quality_metric_now - state.quality_metric_prev).abs()
    }
}
