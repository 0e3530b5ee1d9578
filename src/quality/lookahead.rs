//! 前瞻搜索 (MPC)
//!
//! 在固定的未来带宽估计下，穷举未来 `horizon` 个分段的质量等级序列，
//! 选出累计奖励最大的序列，返回其第一个决策。
//! 复杂度 O((max_quality + 1)^horizon)。

use crate::ladder::VideoLadder;

use super::reward::RewardModel;

/// 每字节对应的 Mbit
const MBIT_PER_BYTE: f64 = 8e-6;

/// 决策输入快照
///
/// 按值传入，搜索过程不读取也不修改仿真状态
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionSnapshot {
    /// 上一分段的质量等级
    pub last_level: usize,
    /// 当前缓冲区 (毫秒)
    pub buffer_ms: f64,
    /// 未来带宽估计 (Mbit/s)
    pub future_bandwidth_mbit: f64,
    /// 待决策的分段索引
    pub chunk_index: usize,
}

/// 搜索结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LookaheadDecision {
    /// 最优的下一个质量等级
    pub level: usize,
    /// 对应的累计奖励
    pub reward: f64,
}

/// 搜索树中的一个节点：缓冲区与上一等级的解析推演
#[derive(Debug, Clone, Copy)]
struct DecisionHorizon {
    last_level: usize,
    buffer_s: f64,
    chunk_index: usize,
    remaining: usize,
}

impl DecisionHorizon {
    /// 以 `level` 下载当前分段后的节点，以及产生的卡顿时间
    fn step(self, level: usize, delay_s: f64, segment_s: f64) -> (Self, f64) {
        let drained = self.buffer_s - delay_s;
        let rebuffer_s = (-drained).max(0.0);
        let next = Self {
            last_level: level,
            buffer_s: drained.max(0.0) + segment_s,
            chunk_index: self.chunk_index + 1,
            remaining: self.remaining - 1,
        };
        (next, rebuffer_s)
    }
}

/// 前瞻控制器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookaheadController {
    horizon: usize,
}

impl LookaheadController {
    pub fn new(horizon: usize) -> Self {
        Self { horizon }
    }

    /// 选出下一个分段的质量等级
    ///
    /// 带宽估计非正数或非有限值时返回 None，调用方应退回到预热策略
    pub fn decide<R: RewardModel + ?Sized>(
        &self,
        reward: &R,
        ladder: &VideoLadder,
        snapshot: DecisionSnapshot,
    ) -> Option<LookaheadDecision> {
        let bandwidth = snapshot.future_bandwidth_mbit;
        if !(bandwidth > 0.0 && bandwidth.is_finite()) {
            return None;
        }

        let root = DecisionHorizon {
            last_level: snapshot.last_level,
            buffer_s: snapshot.buffer_ms / 1000.0,
            chunk_index: snapshot.chunk_index,
            remaining: self.horizon,
        };
        let (level, total) = search(reward, ladder, bandwidth, root);
        Some(LookaheadDecision {
            level,
            reward: total,
        })
    }
}

/// 递归穷举
///
/// 深度耗尽或超出视频末尾时为叶子，奖励 0。
/// 等级按升序遍历，只有严格更大时才替换，平局取最低等级。
fn search<R: RewardModel + ?Sized>(
    reward: &R,
    ladder: &VideoLadder,
    bandwidth_mbit: f64,
    node: DecisionHorizon,
) -> (usize, f64) {
    if node.remaining == 0 || node.chunk_index >= ladder.chunk_count() {
        return (0, 0.0);
    }

    let chunk = node.chunk_index;
    let segment_s = ladder.segment_duration_s(chunk);
    let prev_chunk = chunk.saturating_sub(1);

    let mut best = (0, f64::NEG_INFINITY);
    for level in 0..=ladder.max_quality() {
        let delay_s = ladder.byte_size(chunk, level) * MBIT_PER_BYTE / bandwidth_mbit;
        let (next, rebuffer_s) = node.step(level, delay_s, segment_s);

        let immediate = reward.score(ladder, chunk, level, prev_chunk, node.last_level, rebuffer_s);
        let (_, future) = search(reward, ladder, bandwidth_mbit, next);

        let total = immediate + future;
        if total > best.1 {
            best = (level, total);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ladder::SegmentRow;
    use crate::quality::reward::{BitrateQoE, VmafQoE};

    fn ladder(segments: usize) -> VideoLadder {
        let rows = (0..segments)
            .map(|_| SegmentRow {
                duration_s: 4.0,
                byte_size: vec![100_000.0, 200_000.0, 400_000.0],
                vmaf: vec![60.0, 75.0, 90.0],
                bitrate_bps: vec![1_000_000.0, 2_000_000.0, 4_000_000.0],
            })
            .collect();
        let labels = vec!["1x1".into(), "2x2".into(), "3x3".into()];
        VideoLadder::new("ladder", labels, rows).unwrap()
    }

    fn snapshot(
        last_level: usize,
        buffer_ms: f64,
        bandwidth: f64,
        chunk: usize,
    ) -> DecisionSnapshot {
        DecisionSnapshot {
            last_level,
            buffer_ms,
            future_bandwidth_mbit: bandwidth,
            chunk_index: chunk,
        }
    }

    #[test]
    fn test_zero_horizon_is_leaf() {
        let ladder = ladder(5);
        let decision = LookaheadController::new(0)
            .decide(&VmafQoE::default(), &ladder, snapshot(2, 10_000.0, 5.0, 1))
            .unwrap();
        assert_eq!(decision, LookaheadDecision { level: 0, reward: 0.0 });
    }

    #[test]
    fn test_past_end_of_video_is_leaf() {
        let ladder = ladder(5);
        let decision = LookaheadController::new(5)
            .decide(&VmafQoE::default(), &ladder, snapshot(2, 10_000.0, 5.0, 5))
            .unwrap();
        assert_eq!(decision, LookaheadDecision { level: 0, reward: 0.0 });
    }

    #[test]
    fn test_non_positive_bandwidth_unavailable() {
        let ladder = ladder(5);
        let controller = LookaheadController::new(3);
        let qoe = VmafQoE::default();
        assert!(controller.decide(&qoe, &ladder, snapshot(0, 0.0, 0.0, 1)).is_none());
        assert!(controller.decide(&qoe, &ladder, snapshot(0, 0.0, -1.0, 1)).is_none());
        assert!(controller.decide(&qoe, &ladder, snapshot(0, 0.0, f64::NAN, 1)).is_none());
    }

    #[test]
    fn test_single_step_reward_arithmetic() {
        let ladder = ladder(10);
        let qoe = VmafQoE::default();
        // 缓冲充足，不会卡顿：
        // L0 = 60 - 2.5 * 15 = 22.5, L1 = 75, L2 = 90 - 2.5 * 15 = 52.5
        let decision = LookaheadController::new(1)
            .decide(&qoe, &ladder, snapshot(1, 20_000.0, 5.0, 3))
            .unwrap();
        assert_eq!(decision.level, 1);
        assert!((decision.reward - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_rebuffer_in_projection() {
        let ladder = ladder(10);
        let qoe = VmafQoE::default();
        // 空缓冲区、低带宽：L2 延迟 3.2 秒全部是卡顿
        let decision = LookaheadController::new(1)
            .decide(&qoe, &ladder, snapshot(0, 0.0, 1.0, 0))
            .unwrap();
        // L0 = 60 - 25 * 0.8 = 40; L1 = 75 - 25 * 1.6 - 37.5 = -2.5; L2 = 90 - 80 - 75 = -65
        assert_eq!(decision.level, 0);
        assert!((decision.reward - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_ties_pick_lowest_level() {
        let ladder = ladder(10);
        // 码率模型、上一级为 1：L1 = 2.0, L2 = 4.0 - 2.0 = 2.0
        let decision = LookaheadController::new(1)
            .decide(&BitrateQoE::default(), &ladder, snapshot(1, 20_000.0, 5.0, 3))
            .unwrap();
        assert_eq!(decision.level, 1);
        assert_eq!(decision.reward, 2.0);
    }

    #[test]
    fn test_deeper_horizon_matches_brute_force() {
        let ladder = ladder(6);
        let qoe = VmafQoE::default();
        let bandwidth = 0.9;
        let start = snapshot(2, 1_500.0, bandwidth, 2);

        // 枚举全部 3^3 个序列
        let mut best = (0, f64::NEG_INFINITY);
        for seq in 0..27usize {
            let levels = [seq / 9, (seq / 3) % 3, seq % 3];
            let mut buffer_s = start.buffer_ms / 1000.0;
            let mut last = start.last_level;
            let mut total = 0.0;
            for (step, &level) in levels.iter().enumerate() {
                let chunk = start.chunk_index + step;
                let delay = ladder.byte_size(chunk, level) * 8e-6 / bandwidth;
                let drained = buffer_s - delay;
                let rebuffer = (-drained).max(0.0);
                buffer_s = drained.max(0.0) + ladder.segment_duration_s(chunk);
                total += qoe.score(&ladder, chunk, level, chunk - 1, last, rebuffer);
                last = level;
            }
            if total > best.1 {
                best = (levels[0], total);
            }
        }

        let decision = LookaheadController::new(3).decide(&qoe, &ladder, start).unwrap();
        assert_eq!(decision.level, best.0);
        assert!((decision.reward - best.1).abs() < 1e-9);
    }

    #[test]
    fn test_horizon_truncated_at_end_of_video() {
        let ladder = ladder(6);
        let qoe = VmafQoE::default();
        let bandwidth = 1.3;
        // 深度 5，但只剩分段 4 和 5
        let start = snapshot(1, 2_000.0, bandwidth, 4);

        let mut best = (0, f64::NEG_INFINITY);
        for seq in 0..9usize {
            let levels = [seq / 3, seq % 3];
            let mut buffer_s = start.buffer_ms / 1000.0;
            let mut last = start.last_level;
            let mut total = 0.0;
            for (step, &level) in levels.iter().enumerate() {
                let chunk = start.chunk_index + step;
                let delay = ladder.byte_size(chunk, level) * 8e-6 / bandwidth;
                let drained = buffer_s - delay;
                let rebuffer = (-drained).max(0.0);
                buffer_s = drained.max(0.0) + ladder.segment_duration_s(chunk);
                total += qoe.score(&ladder, chunk, level, chunk - 1, last, rebuffer);
                last = level;
            }
            if total > best.1 {
                best = (levels[0], total);
            }
        }

        let decision = LookaheadController::new(5).decide(&qoe, &ladder, start).unwrap();
        assert_eq!(decision.level, best.0);
        assert!((decision.reward - best.1).abs() < 1e-9);
        assert_eq!(
            Some(decision),
            LookaheadController::new(2).decide(&qoe, &ladder, start)
        );
    }

    #[test]
    fn test_decide_is_reproducible() {
        let ladder = ladder(20);
        let controller = LookaheadController::new(5);
        let qoe = BitrateQoE::default();
        let input = snapshot(1, 7_300.0, 2.4, 4);

        let first = controller.decide(&qoe, &ladder, input);
        let second = controller.decide(&qoe, &ladder, input);
        assert_eq!(first, second);
    }
}
