//! stream-snap：从远程视频流按固定间隔抽取静态帧并上传。

pub mod artifacts;
pub mod config;
pub mod decoders;
pub mod error;
pub mod frame_extraction;
pub mod probe;
pub mod resolvers;
pub mod sampling;
pub mod uploaders;

pub use artifacts::{ArtifactWriter, ImageArtifact, ImageFormat};
pub use config::RunConfig;
pub use decoders::{FfmpegDecoder, FrameDecoder, FrameSource, RawFrame};
pub use error::{PipelineError, UploadError};
pub use frame_extraction::{CancelHandle, FramePipeline, RunReport, RunState};
pub use probe::{FfprobeProber, FrameRate, StreamDescriptor, StreamProber};
pub use resolvers::{DirectResolver, SourceResolver, YtDlpResolver};
pub use sampling::{should_keep, FrameSampler, SamplingPolicy};
pub use uploaders::{Uploader, UploaderFactory, UploadTarget};
