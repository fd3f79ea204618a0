use std::path::PathBuf;
use std::time::Duration;

use crate::artifacts::ImageFormat;
use crate::uploaders::RetryPolicy;

/// 单次抽帧运行的参数
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub output_dir: PathBuf,
    /// 每隔多少源帧保留一帧；为空时由标称帧率推导（约每秒一帧）
    pub capture_interval: Option<u64>,
    pub image_format: ImageFormat,
    /// 并行编码/上传的帧数，1 表示严格按序号顺序上传
    pub workers: usize,
    pub timeout: Option<Duration>,
    /// 最多解码的帧数，达到后正常结束
    pub max_frames: Option<u64>,
    /// 传给上传器的目标（目录、对象前缀等）
    pub destination: String,
    pub upload_retry: RetryPolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("frames"),
            capture_interval: None,
            image_format: ImageFormat::default(),
            workers: 1,
            timeout: None,
            max_frames: None,
            destination: String::new(),
            upload_retry: RetryPolicy::default(),
        }
    }
}

impl RunConfig {
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub(crate) fn channel_capacity(&self) -> usize {
        self.workers.max(1) * 2
    }
}
