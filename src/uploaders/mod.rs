use std::time::Duration;

use tracing::warn;

use crate::error::UploadError;

/// 远端为上传对象分配的标识
pub type RemoteId = String;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadTarget {
    /// 只保留本地输出目录
    None,
    /// 复制到另一个目录（挂载的网盘、同步目录等）
    Directory,
    /// HTTP PUT 到对象存储网关
    Http { base_url: String },
}

impl UploadTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadTarget::None => "none",
            UploadTarget::Directory => "dir",
            UploadTarget::Http { .. } => "http",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            UploadTarget::None => "不上传，只保留本地帧",
            UploadTarget::Directory => "复制到目标目录",
            UploadTarget::Http { .. } => "通过HTTP PUT上传到对象存储",
        }
    }
}

/// 上传协作方：每个产物调用一次
#[async_trait::async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, bytes: &[u8], suggested_name: &str, destination: &str) -> Result<RemoteId, UploadError>;
}

/// 什么也不做的上传器，返回本地名称作为标识
pub struct NullUploader;

#[async_trait::async_trait]
impl Uploader for NullUploader {
    async fn upload(&self, _bytes: &[u8], suggested_name: &str, _destination: &str) -> Result<RemoteId, UploadError> {
        Ok(suggested_name.to_string())
    }
}

/// 有限次数的指数退避重试
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }
}

pub async fn upload_with_retry(
    uploader: &dyn Uploader,
    policy: RetryPolicy,
    bytes: &[u8],
    name: &str,
    destination: &str,
) -> Result<RemoteId, UploadError> {
    let mut attempt = 0;
    loop {
        match uploader.upload(bytes, name, destination).await {
            Ok(id) => return Ok(id),
            Err(err) if attempt < policy.retries => {
                let delay = policy.delay_for(attempt);
                warn!(name, attempt, error = %err, ?delay, "upload failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

pub struct UploaderFactory;

impl UploaderFactory {
    pub fn create_uploader(target: &UploadTarget, mime_type: &'static str) -> anyhow::Result<Box<dyn Uploader>> {
        match target {
            UploadTarget::None => Ok(Box::new(NullUploader)),
            UploadTarget::Directory => Ok(Box::new(DirectoryUploader::new())),
            #[cfg(feature = "http-upload")]
            UploadTarget::Http { base_url } => Ok(Box::new(HttpUploader::new(base_url, mime_type)?)),
            #[cfg(not(feature = "http-upload"))]
            UploadTarget::Http { .. } => {
                let _ = mime_type;
                anyhow::bail!("HTTP upload not enabled. Please compile with --features http-upload")
            }
        }
    }

    pub fn available_targets() -> Vec<&'static str> {
        let mut targets = vec!["none", "dir"];

        #[cfg(feature = "http-upload")]
        targets.push("http");

        targets
    }
}

pub mod directory_uploader;
#[cfg(feature = "http-upload")]
pub mod http_uploader;

pub use directory_uploader::DirectoryUploader;
#[cfg(feature = "http-upload")]
pub use http_uploader::HttpUploader;

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    struct Flaky {
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl Uploader for Flaky {
        async fn upload(&self, _bytes: &[u8], name: &str, _destination: &str) -> Result<RemoteId, UploadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(UploadError::new(name, "503"));
            }
            Ok(format!("id-{name}"))
        }
    }

    fn quick(retries: u32) -> RetryPolicy {
        RetryPolicy {
            retries,
            base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn retries_until_success() {
        let flaky = Flaky {
            failures_left: AtomicU32::new(2),
            calls: AtomicU32::new(0),
        };
        let id = upload_with_retry(&flaky, quick(2), b"x", "frame0000.jpg", "dest").await.unwrap();
        assert_eq!(id, "id-frame0000.jpg");
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_budget() {
        let flaky = Flaky {
            failures_left: AtomicU32::new(5),
            calls: AtomicU32::new(0),
        };
        let err = upload_with_retry(&flaky, quick(1), b"x", "frame0001.jpg", "dest").await.unwrap_err();
        assert_eq!(err.name, "frame0001.jpg");
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(800));
    }
}
