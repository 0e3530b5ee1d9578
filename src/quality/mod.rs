//! 自适应码率决策模块 - RobustMPC
//!
//! 职责：
//! 1. 基于吞吐量历史的带宽估计
//! 2. QoE 奖励函数 (码率 / VMAF)
//! 3. 前瞻搜索与预热策略
//!
//! 模块结构：
//! - bandwidth_estimator: 调和平均带宽估计 + 鲁棒误差折扣
//! - reward: 奖励模型 trait 及两种实现
//! - lookahead: 有限深度穷举搜索
//! - adaptive_controller: 预热 / 前瞻 两种模式的切换
//! - tests: 跨组件测试

// 子模块声明
pub mod adaptive_controller;
pub mod bandwidth_estimator;
pub mod lookahead;
pub mod reward;


// 重新导出常用类型
pub use adaptive_controller::{ControllerMode, Decision, RobustMpcController};
pub use bandwidth_estimator::BandwidthEstimator;
pub use lookahead::{DecisionSnapshot, LookaheadController, LookaheadDecision};
pub use reward::{BitrateQoE, RewardModel, RewardParams, RewardState, VmafQoE};

use crate::config::{RewardKind, SimConfig};

/// 按配置创建奖励模型
///
/// 未显式配置的参数取对应模型的默认值
pub fn create_reward_model(config: &SimConfig) -> Box<dyn RewardModel> {
    let defaults = match config.reward_kind {
        RewardKind::Bitrate => RewardParams::BITRATE,
        RewardKind::Vmaf => RewardParams::VMAF,
    };
    let params = RewardParams {
        rebuffer_penalty: config.rebuffer_penalty.unwrap_or(defaults.rebuffer_penalty),
        smoothing_penalty: config.smoothing_penalty.unwrap_or(defaults.smoothing_penalty),
        reference_chunk_len_s: config
            .reference_chunk_len_s
            .unwrap_or(defaults.reference_chunk_len_s),
    };

    match config.reward_kind {
        RewardKind::Bitrate => Box::new(BitrateQoE::new(params)),
        RewardKind::Vmaf => Box::new(VmafQoE::new(params)),
    }
}
