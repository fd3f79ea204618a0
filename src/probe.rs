//! 流探测：用 ffprobe 读取视频流的宽高与标称帧率。

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};

/// 有理数形式的标称帧率，例如 `30000/1001`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRate {
    pub numerator: u32,
    pub denominator: u32,
}

impl FrameRate {
    pub fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator: denominator.max(1),
        }
    }

    pub fn as_f64(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    /// 四舍五入（远离零）后的整数帧率
    pub fn rounded(&self) -> u64 {
        self.as_f64().round() as u64
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

impl FromStr for FrameRate {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self> {
        let malformed = || PipelineError::MetadataFormat {
            value: value.to_string(),
        };
        let trimmed = value.trim();
        let (num, den) = match trimmed.split_once('/') {
            Some((num, den)) => (num, den),
            None => (trimmed, "1"),
        };
        let numerator: u32 = num.trim().parse().map_err(|_| malformed())?;
        let denominator: u32 = den.trim().parse().map_err(|_| malformed())?;
        if numerator == 0 || denominator == 0 {
            return Err(malformed());
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }
}

/// 一次运行中解释原始帧所需的几何信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamDescriptor {
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
}

impl StreamDescriptor {
    /// 单帧 RGB24 的字节数
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// 宽高必须为正；任意 `StreamProber` 的结果在解码前都要经过这里
    pub fn validate(&self, uri: &str) -> Result<()> {
        if self.frame_len() == 0 {
            return Err(PipelineError::UnresolvableStream {
                uri: uri.to_string(),
                reason: format!("invalid frame geometry {}x{}", self.width, self.height),
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
pub trait StreamProber: Send + Sync {
    async fn probe(&self, uri: &str) -> Result<StreamDescriptor>;
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

/// 解析 `ffprobe -print_format json -show_streams` 的输出。
///
/// 多个视频流时以声明顺序中的第一个为准。
pub fn parse_probe_output(uri: &str, json: &[u8]) -> Result<StreamDescriptor> {
    let unresolvable = |reason: String| PipelineError::UnresolvableStream {
        uri: uri.to_string(),
        reason,
    };

    let output: ProbeOutput = serde_json::from_slice(json)
        .map_err(|err| unresolvable(format!("invalid ffprobe output: {err}")))?;

    let stream = output
        .streams
        .into_iter()
        .find(|stream| stream.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| unresolvable("no video stream".to_string()))?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(unresolvable("missing frame geometry".to_string())),
    };

    let rate = stream
        .r_frame_rate
        .or(stream.avg_frame_rate)
        .ok_or_else(|| unresolvable("missing frame rate".to_string()))?;

    Ok(StreamDescriptor {
        width,
        height,
        frame_rate: rate.parse()?,
    })
}

/// 调用外部 ffprobe 进程的探测器
pub struct FfprobeProber {
    program: String,
}

impl FfprobeProber {
    pub fn new() -> Self {
        Self::with_program("ffprobe")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FfprobeProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl StreamProber for FfprobeProber {
    async fn probe(&self, uri: &str) -> Result<StreamDescriptor> {
        debug!(program = %self.program, uri, "probing stream");
        let output = Command::new(&self.program)
            .arg("-v")
            .arg("error")
            .arg("-print_format")
            .arg("json")
            .arg("-show_streams")
            .arg(uri)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| PipelineError::UnresolvableStream {
                uri: uri.to_string(),
                reason: format!("failed to run {}: {err}", self.program),
            })?;

        if !output.status.success() {
            return Err(PipelineError::UnresolvableStream {
                uri: uri.to_string(),
                reason: format!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let descriptor = parse_probe_output(uri, &output.stdout)?;
        info!(
            width = descriptor.width,
            height = descriptor.height,
            frame_rate = %descriptor.frame_rate,
            "probed video stream"
        );
        Ok(descriptor)
    }
}
