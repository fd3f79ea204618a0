use std::path::Path;

use tracing::debug;

use super::{RemoteId, Uploader};
use crate::error::UploadError;

/// 把产物复制到 `destination` 目录，远端标识即目标路径
#[derive(Debug, Default)]
pub struct DirectoryUploader;

impl DirectoryUploader {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Uploader for DirectoryUploader {
    async fn upload(&self, bytes: &[u8], suggested_name: &str, destination: &str) -> Result<RemoteId, UploadError> {
        let dir = Path::new(destination);
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|err| UploadError::new(suggested_name, format!("{}: {err}", dir.display())))?;

        let target = dir.join(suggested_name);
        tokio::fs::write(&target, bytes)
            .await
            .map_err(|err| UploadError::new(suggested_name, format!("{}: {err}", target.display())))?;

        debug!(path = %target.display(), "copied frame");
        Ok(target.to_string_lossy().into_owned())
    }
}
