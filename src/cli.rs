use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use stream_snap::artifacts::ImageFormat;
use stream_snap::config::RunConfig;
use stream_snap::uploaders::{RetryPolicy, UploadTarget};

#[derive(Parser, Debug)]
#[command(name = "stream-snap")]
#[command(about = "stream-snap - 从视频流按间隔抽帧并上传")]
#[command(version = "0.1.0")]
pub struct Cli {
    /// 视频页面链接或可直接播放的流地址
    #[arg(env = "STREAM_SNAP_URL", required_unless_present = "list_targets")]
    pub url: Option<String>,

    /// 输出目录（每次运行前清空）
    #[arg(short, long, default_value = "frames", env = "STREAM_SNAP_OUTPUT")]
    pub output: PathBuf,

    /// 每隔多少源帧保留一帧（默认按标称帧率，约每秒一帧）
    #[arg(short = 'n', long, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: Option<u64>,

    /// 图片格式
    #[arg(short, long, value_enum, default_value = "jpeg")]
    pub format: ImageFormatArg,

    /// JPEG质量
    #[arg(long, default_value = "90", value_parser = clap::value_parser!(u8).range(1..=100))]
    pub quality: u8,

    /// 上传方式
    #[arg(short, long, value_enum, default_value = "none", env = "STREAM_SNAP_UPLOAD")]
    pub upload: UploadArg,

    /// 上传目标：dir 模式下为目录，http 模式下为对象前缀
    #[arg(short, long, default_value = "", env = "STREAM_SNAP_DESTINATION")]
    pub destination: String,

    /// http 模式的基础地址
    #[arg(long, env = "STREAM_SNAP_ENDPOINT")]
    pub endpoint: Option<String>,

    /// 上传失败的重试次数
    #[arg(long, default_value = "2")]
    pub retries: u32,

    /// 并行编码/上传的帧数（1 表示按顺序上传）
    #[arg(short, long, default_value = "1", value_parser = clap::value_parser!(u64).range(1..=64))]
    pub workers: u64,

    /// 整次运行的超时时间（秒）
    #[arg(long)]
    pub timeout: Option<u64>,

    /// 最多解码的帧数
    #[arg(long)]
    pub max_frames: Option<u64>,

    /// 跳过 yt-dlp，直接把 URL 交给 ffmpeg
    #[arg(long)]
    pub direct: bool,

    /// 显示详细日志以及 ffmpeg 输出
    #[arg(short, long)]
    pub verbose: bool,

    /// 列出可用的上传方式
    #[arg(short, long)]
    pub list_targets: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ImageFormatArg {
    /// 有损压缩，体积小
    Jpeg,
    /// 无损压缩
    Png,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum UploadArg {
    /// 不上传
    None,
    /// 复制到 --destination 目录
    Dir,
    /// PUT 到 --endpoint
    Http,
}

impl Cli {
    pub fn image_format(&self) -> ImageFormat {
        match self.format {
            ImageFormatArg::Jpeg => ImageFormat::Jpeg {
                quality: self.quality,
            },
            ImageFormatArg::Png => ImageFormat::Png,
        }
    }

    pub fn upload_target(&self) -> anyhow::Result<UploadTarget> {
        match self.upload {
            UploadArg::None => Ok(UploadTarget::None),
            UploadArg::Dir => {
                if self.destination.is_empty() {
                    anyhow::bail!("--upload dir requires --destination <DIR>");
                }
                Ok(UploadTarget::Directory)
            }
            UploadArg::Http => {
                let base_url = self
                    .endpoint
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("--upload http requires --endpoint <URL>"))?;
                Ok(UploadTarget::Http { base_url })
            }
        }
    }

    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            capture_interval: self.interval,
            image_format: self.image_format(),
            workers: self.workers as usize,
            timeout: self.timeout.map(Duration::from_secs),
            max_frames: self.max_frames,
            destination: self.destination.clone(),
            upload_retry: RetryPolicy {
                retries: self.retries,
                ..RetryPolicy::default()
            },
            ..RunConfig::default().with_output_dir(&self.output)
        }
    }
}
