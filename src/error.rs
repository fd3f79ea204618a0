use std::path::PathBuf;

use thiserror::Error;

/// 抽帧流水线的错误分类
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to resolve a playable uri for {url:?}: {reason}")]
    UnresolvableSource { url: String, reason: String },

    #[error("no usable video stream in {uri:?}: {reason}")]
    UnresolvableStream { uri: String, reason: String },

    #[error("unparsable frame rate {value:?}")]
    MetadataFormat { value: String },

    #[error("decoded frame is {actual} bytes, expected {expected}")]
    FrameSizeMismatch { expected: usize, actual: usize },

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("image encode failed for frame #{ordinal}: {message}")]
    Encode { ordinal: u32, message: String },

    #[error("io error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("run cancelled")]
    Cancelled,

    #[error("run exceeded its {0:?} time limit")]
    TimedOut(std::time::Duration),

    #[error("worker task failed: {0}")]
    Worker(String),
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// 上传协作方返回的错误；单个产物上传失败不会中止整次运行
#[derive(Debug, Error)]
#[error("{name}: {message}")]
pub struct UploadError {
    pub name: String,
    pub message: String,
}

impl UploadError {
    pub fn new(name: impl Into<String>, message: impl ToString) -> Self {
        Self {
            name: name.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
