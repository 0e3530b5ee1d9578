//! 自适应码率控制模块
//!
//! RobustMPC：视频开头若干分段使用预热策略 (按最近吞吐量选码率)，
//! 之后切换到前瞻搜索。

use crate::config::SimConfig;
use crate::ladder::VideoLadder;

use super::{
    bandwidth_estimator::BandwidthEstimator,
    lookahead::{DecisionSnapshot, LookaheadController},
    reward::RewardModel,
};

/// 控制器模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerMode {
    /// 预热：带宽历史尚不可信
    WarmUp,
    /// 前瞻搜索
    Lookahead,
}

impl ControllerMode {
    /// 获取模式描述
    pub fn description(&self) -> &'static str {
        match self {
            ControllerMode::WarmUp => "warm-up",
            ControllerMode::Lookahead => "lookahead",
        }
    }
}

/// 一次码率决策
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    /// 下一个分段的质量等级
    pub level: usize,
    /// 实际采用的模式
    pub mode: ControllerMode,
    /// 前瞻使用的带宽估计 (Mbit/s)
    pub estimate_mbit: Option<f64>,
    /// 前瞻预期的累计奖励
    pub expected_reward: Option<f64>,
}

/// RobustMPC 控制器
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobustMpcController {
    lookahead: LookaheadController,
    warm_up_probes: usize,
    robust: bool,
}

impl RobustMpcController {
    /// 创建控制器
    ///
    /// # Arguments
    /// * `lookahead_depth` - 前瞻分段数
    /// * `warm_up_probes` - 预热阶段的样本数
    /// * `robust` - 是否按预测误差打折带宽估计
    pub fn new(lookahead_depth: usize, warm_up_probes: usize, robust: bool) -> Self {
        Self {
            lookahead: LookaheadController::new(lookahead_depth),
            warm_up_probes,
            robust,
        }
    }

    pub fn from_config(config: &SimConfig) -> Self {
        Self::new(config.lookahead_depth, config.warm_up_probes, config.robust)
    }

    /// 根据已见样本数选择模式
    ///
    /// 已记录的样本数不超过 `warm_up_probes` 时仍处于预热
    pub fn mode(&self, history: &BandwidthEstimator) -> ControllerMode {
        if history.probes_seen() <= self.warm_up_probes {
            ControllerMode::WarmUp
        } else {
            ControllerMode::Lookahead
        }
    }

    /// 预热策略
    ///
    /// 选码率 (取下一分段的行) 不超过最近一次吞吐量样本的最高等级，都不满足时为 0
    pub fn warm_up_level(
        ladder: &VideoLadder,
        next_chunk: usize,
        latest_mbit: Option<f64>,
    ) -> usize {
        let (Some(latest), true) = (latest_mbit, next_chunk < ladder.chunk_count()) else {
            return 0;
        };
        (0..=ladder.max_quality())
            .filter(|&level| ladder.bitrate_bps(next_chunk, level) * 1e-6 <= latest)
            .max()
            .unwrap_or(0)
    }

    /// 决定下一个分段的质量等级
    ///
    /// # Arguments
    /// * `reward` - 奖励模型
    /// * `history` - 吞吐量历史 (只读)
    /// * `last_level` - 刚下载的分段的等级
    /// * `buffer_ms` - 当前缓冲区
    /// * `next_chunk` - 下一个分段索引
    pub fn next_level<R: RewardModel + ?Sized>(
        &self,
        reward: &R,
        ladder: &VideoLadder,
        history: &BandwidthEstimator,
        last_level: usize,
        buffer_ms: f64,
        next_chunk: usize,
    ) -> Decision {
        let warm_up = || Decision {
            level: Self::warm_up_level(ladder, next_chunk, history.latest_sample()),
            mode: ControllerMode::WarmUp,
            estimate_mbit: None,
            expected_reward: None,
        };

        match self.mode(history) {
            ControllerMode::WarmUp => warm_up(),
            ControllerMode::Lookahead => {
                let Some(estimate) = history.estimate(self.robust) else {
                    log::debug!("No bandwidth estimate available, using warm-up rule");
                    return warm_up();
                };
                let snapshot = DecisionSnapshot {
                    last_level,
                    buffer_ms,
                    future_bandwidth_mbit: estimate,
                    chunk_index: next_chunk,
                };
                match self.lookahead.decide(reward, ladder, snapshot) {
                    Some(decision) => Decision {
                        level: decision.level,
                        mode: ControllerMode::Lookahead,
                        estimate_mbit: Some(estimate),
                        expected_reward: Some(decision.reward),
                    },
                    None => warm_up(),
                }
            }
        }
    }
}

impl Default for RobustMpcController {
    fn default() -> Self {
        Self::new(5, 5, true)
    }
}
