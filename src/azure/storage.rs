use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use tracing::{debug, instrument};

use super::fallback_message;
use crate::gateway::{BlobStore, ClientError, RemoteError};

const STORAGE_API_VERSION: &str = "2021-08-06";

/// Block-blob uploader for a single storage account.
pub struct BlobClient {
    http: reqwest::Client,
    endpoint: String,
}

impl BlobClient {
    pub fn new(account: &str, token: &str) -> Result<Self, ClientError> {
        Self::with_endpoint(&format!("https://{account}.blob.core.windows.net"), token)
    }

    pub fn with_endpoint(endpoint: &str, token: &str) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
            .map_err(|_| ClientError::InvalidToken)?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert("x-ms-version", HeaderValue::from_static(STORAGE_API_VERSION));

        let http = reqwest::Client::builder()
            .user_agent("preview-deploy")
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub fn blob_url(&self, container: &str, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, container, key)
    }
}

#[async_trait]
impl BlobStore for BlobClient {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload(
        &self,
        container: &str,
        key: &str,
        bytes: Vec<u8>,
    ) -> Result<String, RemoteError> {
        let url = self.blob_url(container, key);
        debug!(url = %url, "uploading block blob");
        let response = self
            .http
            .put(&url)
            .header("x-ms-blob-type", "BlockBlob")
            .header("content-type", "application/zip")
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(upload_error(status, &body));
        }
        Ok(url)
    }
}

/// Blob service errors are XML; keep the `<Message>` text when present.
fn upload_error(status: StatusCode, body: &str) -> RemoteError {
    let message = xml_message(body)
        .map(str::to_string)
        .unwrap_or_else(|| fallback_message(status, body));
    RemoteError::new(Some(status.as_u16()), message)
}

fn xml_message(body: &str) -> Option<&str> {
    let start = body.find("<Message>")? + "<Message>".len();
    let end = body[start..].find("</Message>")? + start;
    Some(body[start..end].lines().next().unwrap_or("").trim())
        .filter(|message| !message.is_empty())
}
