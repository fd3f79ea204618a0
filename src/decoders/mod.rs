use std::sync::Arc;

use crate::error::{PipelineError, Result};
use crate::probe::StreamDescriptor;

/// 一帧解码后的原始图像：行优先、RGB24、长度恒为 `width * height * 3`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    data: Vec<u8>,
}

impl RawFrame {
    pub fn new(data: Vec<u8>, descriptor: &StreamDescriptor) -> Result<Self> {
        let expected = descriptor.frame_len();
        if data.len() != expected {
            return Err(PipelineError::FrameSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { data })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// 从其他线程打断阻塞中的读取（例如杀掉解码子进程）
pub type Interrupter = Arc<dyn Fn() + Send + Sync>;

/// 有限、不可重启的原始帧序列
pub trait FrameSource: Send {
    /// `Ok(None)` 表示流结束；不足一帧的尾部数据同样视为结束
    fn next_frame(&mut self) -> Result<Option<RawFrame>>;

    /// 释放底层资源（子进程、管道）。驱动保证每次运行恰好调用一次
    fn shutdown(&mut self) -> Result<()>;

    fn interrupter(&self) -> Option<Interrupter> {
        None
    }
}

// 抽象解码器接口
pub trait FrameDecoder: Send + Sync {
    fn open(&self, uri: &str, descriptor: &StreamDescriptor) -> Result<Box<dyn FrameSource>>;
}

pub mod ffmpeg_decoder;
pub mod reader_source;

pub use ffmpeg_decoder::FfmpegDecoder;
pub use reader_source::ReaderFrameSource;
