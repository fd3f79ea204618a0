use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, TryLockError};

use tracing::{debug, info, warn};

use super::{FrameDecoder, FrameSource, Interrupter, RawFrame, ReaderFrameSource};
use crate::error::{PipelineError, Result};
use crate::probe::StreamDescriptor;

/// 通过 ffmpeg 子进程把视频解码成 rgb24 原始帧
pub struct FfmpegDecoder {
    program: String,
    verbose: bool,
}

impl FfmpegDecoder {
    pub fn new() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            verbose: false,
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// 是否把 ffmpeg 的 stderr 透传到终端
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn command(&self, uri: &str, descriptor: &StreamDescriptor) -> Command {
        // 强制缩放到探测得到的尺寸，保证每帧长度与描述一致
        let scale_arg = format!("scale={}:{}", descriptor.width, descriptor.height);

        let mut cmd = Command::new(&self.program);
        cmd.arg("-hide_banner")
            .arg("-nostdin")
            .arg("-loglevel")
            .arg(if self.verbose { "info" } else { "error" })
            .arg("-i")
            .arg(uri)
            .arg("-an")
            .arg("-vf")
            .arg(&scale_arg)
            .arg("-pix_fmt")
            .arg("rgb24")
            .arg("-f")
            .arg("rawvideo")
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped());

        if self.verbose {
            cmd.stderr(Stdio::inherit());
        } else {
            cmd.stderr(Stdio::null());
        }
        cmd
    }
}

impl Default for FfmpegDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder for FfmpegDecoder {
    fn open(&self, uri: &str, descriptor: &StreamDescriptor) -> Result<Box<dyn FrameSource>> {
        let mut child = self
            .command(uri, descriptor)
            .spawn()
            .map_err(|err| PipelineError::Decode(format!("failed to spawn {}: {err}", self.program)))?;

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(PipelineError::Decode("failed to capture ffmpeg stdout".to_string()));
            }
        };

        info!(pid = child.id(), "ffmpeg decoder started");
        Ok(Box::new(FfmpegFrameSource {
            frames: ReaderFrameSource::new(stdout, *descriptor),
            child: Arc::new(Mutex::new(child)),
            interrupted: Arc::new(AtomicBool::new(false)),
            closed: false,
        }))
    }
}

struct FfmpegFrameSource {
    frames: ReaderFrameSource<ChildStdout>,
    child: Arc<Mutex<Child>>,
    interrupted: Arc<AtomicBool>,
    closed: bool,
}

impl FrameSource for FfmpegFrameSource {
    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        self.frames.next_frame()
    }

    /// 回收子进程。ffmpeg 在我们介入前就以非零状态退出时返回 `Decode`，
    /// 由驱动记入报告，不中止运行
    fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut child = self
            .child
            .lock()
            .map_err(|_| PipelineError::Decode("ffmpeg process handle poisoned".to_string()))?;

        // 关闭管道前先取状态，避免把 EPIPE 退出误判为源故障
        let exited = child.try_wait().ok().flatten();
        if exited.is_none() {
            debug!("killing ffmpeg decoder");
            let _ = child.kill();
        }
        self.frames.shutdown()?;

        let status = match child.wait() {
            Ok(status) => status,
            Err(err) => {
                warn!(error = %err, "failed to reap ffmpeg decoder");
                return Ok(());
            }
        };
        debug!(%status, "ffmpeg decoder exited");

        match exited {
            Some(status) if !status.success() && !self.interrupted.load(Ordering::SeqCst) => {
                warn!(%status, "ffmpeg decoder exited abnormally");
                Err(PipelineError::Decode(format!("ffmpeg exited with {status}")))
            }
            _ => Ok(()),
        }
    }

    fn interrupter(&self) -> Option<Interrupter> {
        Some(kill_on_interrupt(Arc::clone(&self.child), Arc::clone(&self.interrupted)))
    }
}

/// 从异步线程调用，不能阻塞：shutdown 持锁时子进程已被杀掉或已退出，直接跳过
fn kill_on_interrupt(child: Arc<Mutex<Child>>, interrupted: Arc<AtomicBool>) -> Interrupter {
    Arc::new(move || {
        interrupted.store(true, Ordering::SeqCst);
        match child.try_lock() {
            Ok(mut child) => {
                let _ = child.kill();
            }
            Err(TryLockError::WouldBlock) => debug!("ffmpeg decoder already shutting down"),
            Err(TryLockError::Poisoned(_)) => {}
        }
    })
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.shutdown();
        }
    }
}
