//! 把视频页面链接解析成 ffmpeg 可直接读取的流地址。

use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};

#[async_trait::async_trait]
pub trait SourceResolver: Send + Sync {
    async fn resolve(&self, url: &str) -> Result<String>;
}

/// 原样返回，适用于本地文件或已是直链的地址
pub struct DirectResolver;

#[async_trait::async_trait]
impl SourceResolver for DirectResolver {
    async fn resolve(&self, url: &str) -> Result<String> {
        Ok(url.to_string())
    }
}

/// 调用 `yt-dlp -f best -g` 取得最佳格式的直链
pub struct YtDlpResolver {
    program: String,
    format: String,
}

impl YtDlpResolver {
    pub fn new() -> Self {
        Self {
            program: "yt-dlp".to_string(),
            format: "best".to_string(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

impl Default for YtDlpResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// 取 yt-dlp 输出的第一条非空 URL
fn first_url(stdout: &str) -> Option<&str> {
    stdout.lines().map(str::trim).find(|line| !line.is_empty())
}

#[async_trait::async_trait]
impl SourceResolver for YtDlpResolver {
    async fn resolve(&self, url: &str) -> Result<String> {
        let unresolvable = |reason: String| PipelineError::UnresolvableSource {
            url: url.to_string(),
            reason,
        };

        debug!(program = %self.program, url, "resolving playable url");
        let output = Command::new(&self.program)
            .arg("-f")
            .arg(&self.format)
            .arg("-g")
            .arg("--no-warnings")
            .arg("--no-playlist")
            .arg(url)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| unresolvable(format!("failed to run {}: {err}", self.program)))?;

        if !output.status.success() {
            return Err(unresolvable(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let resolved = first_url(&stdout)
            .ok_or_else(|| unresolvable("resolver returned no url".to_string()))?
            .to_string();
        info!("resolved playable url");
        Ok(resolved)
    }
}
