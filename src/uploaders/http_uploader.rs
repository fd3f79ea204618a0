use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, LOCATION};
use serde::Deserialize;
use tracing::debug;

use super::{RemoteId, Uploader};
use crate::error::UploadError;

/// 以 HTTP PUT 上传到对象存储网关（S3 预签名前缀、GCS XML API、自建网关等）
pub struct HttpUploader {
    client: reqwest::Client,
    base_url: String,
    mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    id: Option<String>,
}

impl HttpUploader {
    pub fn new(base_url: &str, mime_type: &'static str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            mime_type,
        })
    }

    fn object_url(&self, destination: &str, name: &str) -> String {
        let destination = destination.trim_matches('/');
        if destination.is_empty() {
            format!("{}/{}", self.base_url, name)
        } else {
            format!("{}/{}/{}", self.base_url, destination, name)
        }
    }
}

#[async_trait::async_trait]
impl Uploader for HttpUploader {
    async fn upload(&self, bytes: &[u8], suggested_name: &str, destination: &str) -> Result<RemoteId, UploadError> {
        let url = self.object_url(destination, suggested_name);
        let fail = |message: String| UploadError::new(suggested_name, message);

        let response = self
            .client
            .put(&url)
            .header(CONTENT_TYPE, self.mime_type)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|err| fail(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fail(format!("{url} returned {status}")));
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(|err| fail(err.to_string()))?;
        let id = serde_json::from_slice::<UploadResponse>(&body)
            .ok()
            .and_then(|parsed| parsed.id)
            .or(location)
            .unwrap_or(url);

        debug!(name = suggested_name, id = %id, "uploaded frame");
        Ok(id)
    }
}
