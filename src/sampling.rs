use crate::probe::FrameRate;

/// 按帧率取模：保留 `index % round(rate) == 0` 的帧，取整结果为 0 时保留全部
pub fn should_keep(frame_index: u64, frame_rate: &FrameRate) -> bool {
    keep_at_interval(frame_index, frame_rate.rounded())
}

fn keep_at_interval(frame_index: u64, interval: u64) -> bool {
    interval == 0 || frame_index % interval == 0
}

/// 采样间隔（以源帧计），默认由标称帧率推导，约每秒一帧
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingPolicy {
    interval: u64,
}

impl SamplingPolicy {
    pub fn new(frame_rate: &FrameRate, interval_override: Option<u64>) -> Self {
        Self {
            interval: interval_override.unwrap_or_else(|| frame_rate.rounded()),
        }
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    pub fn should_keep(&self, frame_index: u64) -> bool {
        keep_at_interval(frame_index, self.interval)
    }
}

/// 一帧被保留时的编号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub frame_index: u64,
    pub ordinal: u32,
}

/// 维护 FrameIndex 与 KeptFrameOrdinal 两个计数器
#[derive(Debug)]
pub struct FrameSampler {
    policy: SamplingPolicy,
    next_index: u64,
    next_ordinal: u32,
}

impl FrameSampler {
    pub fn new(policy: SamplingPolicy) -> Self {
        Self {
            policy,
            next_index: 0,
            next_ordinal: 0,
        }
    }

    /// 记录一帧解码结果；保留时返回其序号
    pub fn observe(&mut self) -> Option<Sample> {
        let frame_index = self.next_index;
        self.next_index += 1;
        if !self.policy.should_keep(frame_index) {
            return None;
        }
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        Some(Sample {
            frame_index,
            ordinal,
        })
    }

    pub fn frames_seen(&self) -> u64 {
        self.next_index
    }

    pub fn frames_kept(&self) -> u32 {
        self.next_ordinal
    }
}
