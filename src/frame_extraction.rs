//! 抽帧流水线：解析 → 探测 → 清理目录 → 解码采样 → 编码落盘 → 上传。

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::artifacts::{purge_output_directory, ArtifactWriter, PurgeReport};
use crate::config::RunConfig;
use crate::decoders::{FrameDecoder, FrameSource, Interrupter, RawFrame};
use crate::error::{PipelineError, Result};
use crate::probe::{StreamDescriptor, StreamProber};
use crate::resolvers::{DirectResolver, SourceResolver};
use crate::sampling::{FrameSampler, Sample, SamplingPolicy};
use crate::uploaders::{upload_with_retry, Uploader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Probing,
    Purging,
    Decoding,
    Draining,
    Closed,
    Aborted,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Probing => "probing",
            RunState::Purging => "purging",
            RunState::Decoding => "decoding",
            RunState::Draining => "draining",
            RunState::Closed => "closed",
            RunState::Aborted => "aborted",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 解码循环结束的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    EndOfStream,
    FrameLimit,
    /// 下游停止接收（编码失败、取消）
    Stopped,
}

#[derive(Debug, Clone)]
pub struct ArtifactRecord {
    pub ordinal: u32,
    pub frame_index: u64,
    pub path: PathBuf,
    pub remote_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UploadFailure {
    pub ordinal: u32,
    pub name: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub source_uri: String,
    pub descriptor: StreamDescriptor,
    pub sampling_interval: u64,
    pub frames_decoded: u64,
    pub end_reason: EndReason,
    /// 解码源结束时报告的故障（例如 ffmpeg 非零退出），流因此可能被截短
    pub source_error: Option<String>,
    /// 按序号排列
    pub artifacts: Vec<ArtifactRecord>,
    pub upload_failures: Vec<UploadFailure>,
    pub purge: PurgeReport,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn uploaded(&self) -> usize {
        self.artifacts.iter().filter(|a| a.remote_id.is_some()).count()
    }
}

/// 取消正在进行（或下一次）的运行
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

struct KeptFrame {
    sample: Sample,
    frame: RawFrame,
}

struct DecodeSummary {
    frames_decoded: u64,
    end_reason: EndReason,
    source_error: Option<String>,
}

struct FrameOutcome {
    record: ArtifactRecord,
    failure: Option<UploadFailure>,
}

pub struct FramePipeline {
    resolver: Arc<dyn SourceResolver>,
    prober: Arc<dyn StreamProber>,
    decoder: Arc<dyn FrameDecoder>,
    uploader: Arc<dyn Uploader>,
    config: RunConfig,
    state: RunState,
    history: Vec<RunState>,
    cancel: Arc<watch::Sender<bool>>,
}

impl FramePipeline {
    pub fn new(
        config: RunConfig,
        prober: Arc<dyn StreamProber>,
        decoder: Arc<dyn FrameDecoder>,
        uploader: Arc<dyn Uploader>,
    ) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            resolver: Arc::new(DirectResolver),
            prober,
            decoder,
            uploader,
            config,
            state: RunState::Idle,
            history: vec![RunState::Idle],
            cancel: Arc::new(cancel),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn SourceResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// 最近一次运行经过的状态
    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel),
        }
    }

    fn transition(&mut self, next: RunState) {
        debug!(from = %self.state, to = %next, "pipeline state");
        self.state = next;
        self.history.push(next);
    }

    /// 对一个源执行完整的一次抽帧。
    ///
    /// 单帧上传失败只记录在报告里；探测、目录、解码、编码错误会中止运行。
    /// 同一输出目录上不能并发运行。
    pub async fn run(&mut self, source_url: &str) -> Result<RunReport> {
        self.state = RunState::Idle;
        self.history = vec![RunState::Idle];

        let result = self.execute(source_url).await;
        match &result {
            Ok(report) => {
                self.transition(RunState::Closed);
                info!(
                    kept = report.artifacts.len(),
                    uploaded = report.uploaded(),
                    failed = report.upload_failures.len(),
                    decoded = report.frames_decoded,
                    "capture finished"
                );
            }
            Err(err) => {
                self.transition(RunState::Aborted);
                error!(error = %err, "capture aborted");
            }
        }
        self.cancel.send_replace(false);
        result
    }

    async fn execute(&mut self, source_url: &str) -> Result<RunReport> {
        let started = Instant::now();
        let deadline = self.config.timeout.map(|limit| started + limit);
        let mut cancel_rx = self.cancel.subscribe();

        self.transition(RunState::Probing);
        let (uri, descriptor) = self
            .guarded(&mut cancel_rx, deadline, async {
                let uri = self.resolver.resolve(source_url).await?;
                let descriptor = self.prober.probe(&uri).await?;
                descriptor.validate(&uri)?;
                Ok((uri, descriptor))
            })
            .await?;

        let policy = SamplingPolicy::new(&descriptor.frame_rate, self.config.capture_interval);
        info!(
            width = descriptor.width,
            height = descriptor.height,
            frame_rate = %descriptor.frame_rate,
            interval = policy.interval(),
            "stream ready"
        );

        self.transition(RunState::Purging);
        let purge = purge_output_directory(&self.config.output_dir)?;

        self.transition(RunState::Decoding);
        let source = self.decoder.open(&uri, &descriptor)?;
        let interrupter = source.interrupter();
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel(self.config.channel_capacity());

        let decode_task = {
            let stop = Arc::clone(&stop);
            let max_frames = self.config.max_frames;
            tokio::task::spawn_blocking(move || decode_loop(source, descriptor, policy, max_frames, stop, tx))
        };

        let mut consume = Box::pin(self.consume(rx, descriptor));
        let consumed = tokio::select! {
            res = &mut consume => res,
            _ = cancelled(&mut cancel_rx) => Err(PipelineError::Cancelled),
            _ = expired(deadline) => Err(self.timed_out()),
        };
        drop(consume);

        if consumed.is_err() {
            interrupt(&stop, interrupter.as_ref());
        }

        // 无论成败都等待解码线程完成 shutdown
        let decoded = decode_task
            .await
            .map_err(|err| PipelineError::Worker(err.to_string()))
            .and_then(|summary| summary);
        let outcomes = consumed?;
        let summary = decoded?;
        self.transition(RunState::Draining);

        let mut artifacts = Vec::with_capacity(outcomes.len());
        let mut upload_failures = Vec::new();
        for outcome in outcomes {
            artifacts.push(outcome.record);
            upload_failures.extend(outcome.failure);
        }
        artifacts.sort_by_key(|record| record.ordinal);
        upload_failures.sort_by_key(|failure| failure.ordinal);

        Ok(RunReport {
            source_uri: uri,
            descriptor,
            sampling_interval: policy.interval(),
            frames_decoded: summary.frames_decoded,
            end_reason: summary.end_reason,
            source_error: summary.source_error,
            artifacts,
            upload_failures,
            purge,
            elapsed: started.elapsed(),
        })
    }

    async fn guarded<T>(
        &self,
        cancel_rx: &mut watch::Receiver<bool>,
        deadline: Option<Instant>,
        work: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::select! {
            res = work => res,
            _ = cancelled(cancel_rx) => Err(PipelineError::Cancelled),
            _ = expired(deadline) => Err(self.timed_out()),
        }
    }

    fn timed_out(&self) -> PipelineError {
        PipelineError::TimedOut(self.config.timeout.unwrap_or_default())
    }

    /// 接收保留帧，按 `workers` 并发编码、写盘并上传
    async fn consume(&self, rx: mpsc::Receiver<KeptFrame>, descriptor: StreamDescriptor) -> Result<Vec<FrameOutcome>> {
        let writer = ArtifactWriter::new(self.config.image_format);
        let output_dir = self.config.output_dir.as_path();

        let frames = stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|kept| (kept, rx)) });
        let mut outcomes = pin!(frames
            .map(|kept| self.persist(writer, output_dir, descriptor, kept))
            .buffer_unordered(self.config.workers.max(1)));

        let mut collected = Vec::new();
        while let Some(outcome) = outcomes.next().await {
            collected.push(outcome?);
        }
        Ok(collected)
    }

    async fn persist(
        &self,
        writer: ArtifactWriter,
        output_dir: &Path,
        descriptor: StreamDescriptor,
        kept: KeptFrame,
    ) -> Result<FrameOutcome> {
        let KeptFrame { sample, frame } = kept;
        let dir = output_dir.to_path_buf();
        let artifact = tokio::task::spawn_blocking(move || {
            writer.write(&dir, sample.ordinal, sample.frame_index, &frame, &descriptor)
        })
        .await
        .map_err(|err| PipelineError::Worker(err.to_string()))??;

        let name = artifact.file_name();
        info!(ordinal = sample.ordinal, frame_index = sample.frame_index, file = %name, "saved frame");

        let uploaded = upload_with_retry(
            self.uploader.as_ref(),
            self.config.upload_retry,
            &artifact.bytes,
            &name,
            &self.config.destination,
        )
        .await;

        let (remote_id, failure) = match uploaded {
            Ok(id) => {
                debug!(file = %name, remote_id = %id, "uploaded frame");
                (Some(id), None)
            }
            Err(err) => {
                warn!(file = %name, error = %err, "upload failed");
                let failure = UploadFailure {
                    ordinal: sample.ordinal,
                    name,
                    message: err.message,
                };
                (None, Some(failure))
            }
        };

        Ok(FrameOutcome {
            record: ArtifactRecord {
                ordinal: sample.ordinal,
                frame_index: sample.frame_index,
                path: artifact.path,
                remote_id,
            },
            failure,
        })
    }
}

fn interrupt(stop: &AtomicBool, interrupter: Option<&Interrupter>) {
    stop.store(true, Ordering::SeqCst);
    if let Some(interrupt) = interrupter {
        interrupt();
    }
}

async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn expired(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

/// 在阻塞线程上运行：读帧、采样、分配序号、投递给下游，最后必定调用一次 shutdown
fn decode_loop(
    mut source: Box<dyn FrameSource>,
    descriptor: StreamDescriptor,
    policy: SamplingPolicy,
    max_frames: Option<u64>,
    stop: Arc<AtomicBool>,
    tx: mpsc::Sender<KeptFrame>,
) -> Result<DecodeSummary> {
    let mut sampler = FrameSampler::new(policy);
    let pumped = pump_frames(source.as_mut(), &descriptor, &mut sampler, max_frames, &stop, &tx);
    drop(tx);

    let closed = source.shutdown();
    let end_reason = pumped?;
    let source_error = closed.err().map(|err| {
        warn!(error = %err, "decoder reported a failure at shutdown");
        err.to_string()
    });

    debug!(
        decoded = sampler.frames_seen(),
        kept = sampler.frames_kept(),
        ?end_reason,
        "decoder finished"
    );
    Ok(DecodeSummary {
        frames_decoded: sampler.frames_seen(),
        end_reason,
        source_error,
    })
}

fn pump_frames(
    source: &mut dyn FrameSource,
    descriptor: &StreamDescriptor,
    sampler: &mut FrameSampler,
    max_frames: Option<u64>,
    stop: &AtomicBool,
    tx: &mpsc::Sender<KeptFrame>,
) -> Result<EndReason> {
    loop {
        if stop.load(Ordering::SeqCst) {
            return Ok(EndReason::Stopped);
        }
        if max_frames.is_some_and(|limit| sampler.frames_seen() >= limit) {
            return Ok(EndReason::FrameLimit);
        }

        let Some(frame) = source.next_frame()? else {
            return Ok(EndReason::EndOfStream);
        };
        // 分辨率变化时直接失败，不做重同步
        if frame.len() != descriptor.frame_len() {
            return Err(PipelineError::FrameSizeMismatch {
                expected: descriptor.frame_len(),
                actual: frame.len(),
            });
        }

        if let Some(sample) = sampler.observe() {
            if tx.blocking_send(KeptFrame { sample, frame }).is_err() {
                return Ok(EndReason::Stopped);
            }
        }
    }
}
