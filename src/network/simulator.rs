//! 分段下载仿真器
//!
//! 基于带宽轨迹的令牌桶式下载模拟：逐样本累计可传输字节，
//! 直到当前分段下载完成；同时维护播放缓冲区，缓冲区超过阈值时休眠排空。

use serde::{Deserialize, Serialize};

use super::{SimulationError, TraceSet, BYTES_PER_MBIT, MILLISECONDS_IN_SECOND};
use crate::config::SimConfig;
use crate::ladder::VideoLadder;

/// 轨迹回放起点 (第 0 行是锚点)
const TRACE_START_PTR: usize = 1;

/// 仿真参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatorParams {
    /// 缓冲区上限 (毫秒)
    pub buffer_threshold_ms: f64,
    /// 排空休眠步长 (毫秒)
    pub drain_step_ms: f64,
    /// 有效载荷比例
    pub packet_payload_fraction: f64,
    /// 链路 RTT (毫秒)
    pub link_rtt_ms: f64,
}

impl Default for SimulatorParams {
    fn default() -> Self {
        Self {
            buffer_threshold_ms: 60.0 * MILLISECONDS_IN_SECOND,
            drain_step_ms: 500.0,
            packet_payload_fraction: 0.95,
            link_rtt_ms: 200.0,
        }
    }
}

impl From<&SimConfig> for SimulatorParams {
    fn from(config: &SimConfig) -> Self {
        Self {
            buffer_threshold_ms: config.buffer_threshold_s * MILLISECONDS_IN_SECOND,
            drain_step_ms: config.drain_step_ms,
            packet_payload_fraction: config.packet_payload_fraction,
            link_rtt_ms: config.link_rtt_ms,
        }
    }
}

/// 仿真状态
///
/// 每个 (视频, 轨迹集合) 一份，只由仿真器修改
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    /// 下一个待下载分段
    pub chunk_counter: usize,
    /// 缓冲区 (毫秒)
    pub buffer_ms: f64,
    /// 当前轨迹索引
    pub trace_idx: usize,
    /// 当前轨迹内样本位置 (>= 1)
    pub trace_ptr: usize,
    /// 上次消耗到的轨迹时间 (秒)
    pub last_sample_time_s: f64,
}

/// 单个分段的下载结果
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDelivery {
    /// 刚下载的分段索引
    pub chunk_index: usize,
    /// 下载时延 (毫秒，含 RTT)
    pub delay_ms: f64,
    /// 缓冲区排空休眠 (毫秒)
    pub sleep_ms: f64,
    /// 下载后的缓冲区 (秒)
    pub buffer_s: f64,
    /// 卡顿时间 (秒)
    pub rebuffer_s: f64,
    /// 分段字节数
    pub chunk_bytes: f64,
    /// 下一分段各等级的字节数
    pub next_chunk_sizes: Vec<f64>,
    /// 是否播放结束
    pub end_of_video: bool,
    /// 剩余分段数
    pub chunks_remaining: usize,
}

/// 网络仿真器
pub struct NetworkSimulator<'a> {
    ladder: &'a VideoLadder,
    traces: &'a TraceSet,
    params: SimulatorParams,
    state: SimulationState,
}

impl<'a> NetworkSimulator<'a> {
    /// 创建仿真器，从第 0 条轨迹开始
    pub fn new(
        ladder: &'a VideoLadder,
        traces: &'a TraceSet,
        params: SimulatorParams,
    ) -> Result<Self, SimulationError> {
        if traces.is_empty() {
            return Err(SimulationError::TraceOutOfRange { index: 0, count: 0 });
        }
        let mut simulator = Self {
            ladder,
            traces,
            params,
            state: SimulationState {
                chunk_counter: 0,
                buffer_ms: 0.0,
                trace_idx: 0,
                trace_ptr: TRACE_START_PTR,
                last_sample_time_s: 0.0,
            },
        };
        simulator.select_trace(0)?;
        Ok(simulator)
    }

    /// 切换到指定轨迹并从头播放
    pub fn select_trace(&mut self, index: usize) -> Result<(), SimulationError> {
        if index >= self.traces.len() {
            return Err(SimulationError::TraceOutOfRange {
                index,
                count: self.traces.len(),
            });
        }
        self.state = SimulationState {
            chunk_counter: 0,
            buffer_ms: 0.0,
            trace_idx: index,
            trace_ptr: TRACE_START_PTR,
            last_sample_time_s: self.traces[index].time_s(TRACE_START_PTR - 1),
        };
        Ok(())
    }

    /// 当前状态快照
    pub fn snapshot(&self) -> SimulationState {
        self.state
    }

    /// 恢复状态快照
    pub fn restore(&mut self, state: SimulationState) -> Result<(), SimulationError> {
        let count = self.traces.len();
        if state.trace_idx >= count {
            return Err(SimulationError::TraceOutOfRange {
                index: state.trace_idx,
                count,
            });
        }
        let trace = &self.traces[state.trace_idx];
        if state.trace_ptr < TRACE_START_PTR || state.trace_ptr >= trace.len() {
            return Err(SimulationError::TraceOutOfRange {
                index: state.trace_ptr,
                count: trace.len(),
            });
        }
        self.state = state;
        Ok(())
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn params(&self) -> &SimulatorParams {
        &self.params
    }

    /// 下载一个分段
    ///
    /// # Arguments
    /// * `quality` - 质量等级，范围 `[0, max_quality]`
    pub fn get_video_chunk(&mut self, quality: usize) -> Result<ChunkDelivery, SimulationError> {
        let max = self.ladder.max_quality();
        if quality > max {
            return Err(SimulationError::QualityOutOfRange { quality, max });
        }

        let chunk_index = self.state.chunk_counter;
        let chunk_bytes = self.ladder.byte_size(chunk_index, quality);

        let mut delay_ms = self.transfer_s(chunk_bytes) * MILLISECONDS_IN_SECOND;
        delay_ms += self.params.link_rtt_ms;

        let rebuffer_ms = (delay_ms - self.state.buffer_ms).max(0.0);
        self.state.buffer_ms = (self.state.buffer_ms - delay_ms).max(0.0);
        self.state.buffer_ms +=
            self.ladder.segment_duration_s(chunk_index) * MILLISECONDS_IN_SECOND;

        // 缓冲区超过上限：休眠排空，轨迹照常前进，但不计入时延
        let mut sleep_ms = 0.0;
        if self.state.buffer_ms > self.params.buffer_threshold_ms {
            let drain_ms = self.state.buffer_ms - self.params.buffer_threshold_ms;
            sleep_ms = (drain_ms / self.params.drain_step_ms).ceil() * self.params.drain_step_ms;
            self.state.buffer_ms -= sleep_ms;
            self.idle_s(sleep_ms / MILLISECONDS_IN_SECOND);
        }

        let buffer_s = self.state.buffer_ms / MILLISECONDS_IN_SECOND;
        let total = self.ladder.chunk_count();

        self.state.chunk_counter += 1;
        let chunks_remaining = total - self.state.chunk_counter;

        let end_of_video = self.state.chunk_counter >= total;
        if end_of_video {
            let next_trace = (self.state.trace_idx + 1) % self.traces.len();
            self.select_trace(next_trace)?;
        }

        Ok(ChunkDelivery {
            chunk_index,
            delay_ms,
            sleep_ms,
            buffer_s,
            rebuffer_s: rebuffer_ms / MILLISECONDS_IN_SECOND,
            chunk_bytes,
            next_chunk_sizes: self
                .ladder
                .next_chunk_sizes(self.state.chunk_counter)
                .to_vec(),
            end_of_video,
            chunks_remaining,
        })
    }

    /// 在轨迹上传输 `bytes` 字节，返回耗时 (秒)
    fn transfer_s(&mut self, bytes: f64) -> f64 {
        let fraction = self.params.packet_payload_fraction;
        let traces = self.traces;
        let trace = &traces[self.state.trace_idx];

        let mut elapsed_s = 0.0;
        let mut sent = 0.0;
        loop {
            let ptr = self.state.trace_ptr;
            let throughput = trace.bandwidth_mbit(ptr) * BYTES_PER_MBIT;
            let duration = trace.time_s(ptr) - self.state.last_sample_time_s;
            let payload = throughput * duration * fraction;

            if sent + payload > bytes {
                let fractional_s = (bytes - sent) / throughput / fraction;
                elapsed_s += fractional_s;
                self.state.last_sample_time_s += fractional_s;
                return elapsed_s;
            }

            sent += payload;
            elapsed_s += duration;
            self.state.last_sample_time_s = trace.time_s(ptr);
            self.advance_ptr(trace.len());
        }
    }

    /// 空闲 `idle_s` 秒，仅推进轨迹位置
    fn idle_s(&mut self, mut idle_s: f64) {
        let traces = self.traces;
        let trace = &traces[self.state.trace_idx];
        loop {
            let ptr = self.state.trace_ptr;
            let duration = trace.time_s(ptr) - self.state.last_sample_time_s;
            if duration > idle_s {
                self.state.last_sample_time_s += idle_s;
                return;
            }
            idle_s -= duration;
            self.state.last_sample_time_s = trace.time_s(ptr);
            self.advance_ptr(trace.len());
        }
    }

    /// 样本指针前进，耗尽时回到第 1 行 (锚点不回放)
    fn advance_ptr(&mut self, trace_len: usize) {
        self.state.trace_ptr += 1;
        if self.state.trace_ptr >= trace_len {
            self.state.trace_ptr = TRACE_START_PTR;
            self.state.last_sample_time_s = 0.0;
        }
    }
}
