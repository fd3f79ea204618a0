use std::sync::Arc;

use anyhow::{Context, Result};
use tabled::{Table, Tabled};
use tracing::warn;

use stream_snap::frame_extraction::{FramePipeline, RunReport};
use stream_snap::resolvers::{DirectResolver, SourceResolver, YtDlpResolver};
use stream_snap::uploaders::UploaderFactory;
use stream_snap::{FfmpegDecoder, FfprobeProber, UploadTarget};

use crate::cli::Cli;

pub fn list_available_targets() {
    println!("\n📋 可用的上传方式:");

    for target in [
        UploadTarget::None,
        UploadTarget::Directory,
        UploadTarget::Http {
            base_url: String::new(),
        },
    ] {
        let enabled = UploaderFactory::available_targets().contains(&target.as_str());
        let mark = if enabled { "✅" } else { "❌" };
        println!("  {mark} {}: {}", target.as_str(), target.description());
    }

    println!("\n💡 使用方法:");
    println!("  stream-snap <URL>                                 # 抽帧到 ./frames");
    println!("  stream-snap <URL> -u dir -d /mnt/drive/frames     # 抽帧并复制到目录");
    println!("  stream-snap <URL> -u http --endpoint <URL> -d run # 抽帧并上传");
}

pub async fn run_capture(cli: &Cli) -> Result<()> {
    let url = cli.url.as_deref().context("missing video url")?;
    let config = cli.run_config();
    let target = cli.upload_target()?;
    let writer_format = config.image_format;

    let resolver: Arc<dyn SourceResolver> = if cli.direct {
        Arc::new(DirectResolver)
    } else {
        Arc::new(YtDlpResolver::new())
    };
    let uploader = UploaderFactory::create_uploader(&target, writer_format.mime_type())?;

    let mut pipeline = FramePipeline::new(
        config,
        Arc::new(FfprobeProber::new()),
        Arc::new(FfmpegDecoder::new().verbose(cli.verbose)),
        Arc::from(uploader),
    )
    .with_resolver(resolver);

    let cancel = pipeline.cancel_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping capture");
            cancel.cancel();
        }
    });

    println!("🎬 开始抽帧: {url}");
    let result = pipeline.run(url).await;
    ctrl_c.abort();

    let report = result.with_context(|| format!("capture of {url} failed"))?;
    print_summary(&report, &target);
    Ok(())
}

#[derive(Tabled)]
struct FrameRow {
    #[tabled(rename = "序号")]
    ordinal: u32,
    #[tabled(rename = "源帧")]
    frame_index: u64,
    #[tabled(rename = "文件")]
    file: String,
    #[tabled(rename = "上传")]
    upload: String,
}

fn print_summary(report: &RunReport, target: &UploadTarget) {
    let rows: Vec<FrameRow> = report
        .artifacts
        .iter()
        .map(|record| {
            let upload = match (&record.remote_id, target) {
                (_, UploadTarget::None) => "-".to_string(),
                (Some(id), _) => id.clone(),
                (None, _) => "失败".to_string(),
            };
            FrameRow {
                ordinal: record.ordinal,
                frame_index: record.frame_index,
                file: record.path.display().to_string(),
                upload,
            }
        })
        .collect();

    if !rows.is_empty() {
        println!("\n{}", Table::new(rows));
    }

    println!("\n📊 抽帧统计:");
    println!(
        "  🎞️  视频: {}x{} @ {} fps",
        report.descriptor.width, report.descriptor.height, report.descriptor.frame_rate
    );
    println!("  🔢 采样间隔: 每 {} 帧", report.sampling_interval);
    println!("  📥 解码帧数: {}", report.frames_decoded);
    println!("  🖼️  保存帧数: {}", report.artifacts.len());
    if let Some(message) = &report.source_error {
        println!("  ⚠️  解码源异常结束，视频可能不完整: {message}");
    }
    if *target != UploadTarget::None {
        println!("  ☁️  上传成功: {}", report.uploaded());
        for failure in &report.upload_failures {
            println!("  ❌ {} 上传失败: {}", failure.name, failure.message);
        }
    }
    if !report.purge.issues.is_empty() {
        println!("  ⚠️  清理时跳过 {} 个条目", report.purge.issues.len());
    }
    println!("  ⏱️  总耗时: {:.2}秒", report.elapsed.as_secs_f64());
}
