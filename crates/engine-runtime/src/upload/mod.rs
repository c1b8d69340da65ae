pub mod client;
pub mod stream;
pub mod uploader;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UploadError {
    /// 5xx, 429, timeouts, connection resets. Retried within the shared
    /// budget.
    #[error("transient upload failure: {0}")]
    Transient(String),

    /// The control plane or object store rejected the request outright.
    #[error("upload rejected: {0}")]
    Rejected(String),

    /// The retry budget ran out.
    #[error("upload retry budget exhausted: {0}")]
    Exhausted(String),
}

/// Body of `POST /v1/schemas/{slug}/generate-upload-token`. The upload id is
/// client-generated so a retried artifact deduplicates server-side.
#[derive(Debug, Clone, Serialize)]
pub struct TokenRequest {
    pub upload_id: String,
    pub filename: String,
    pub content_length: u64,
    pub content_type: String,
    pub encoding: String,
}

fn default_method() -> String {
    "PUT".to_string()
}

/// One-shot pre-signed upload issued by the control plane.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadToken {
    pub upload_url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub expires_at: Option<String>,
}

/// Body of `POST /v1/schemas/{slug}/notify-upload`.
#[derive(Debug, Clone, Serialize)]
pub struct NotifyRequest {
    pub upload_id: String,
    pub record_count: u64,
    pub bytes: u64,
    pub watermark_after: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    Acknowledged,
    /// The deployment notifies through an event bus; a 404 here is not an
    /// error.
    NotRequired,
}

#[derive(Debug, Clone)]
pub struct UploadReceipt {
    pub remote_url: String,
    pub confirmed_at: DateTime<Utc>,
    pub bytes: u64,
}

/// Wire seam for the three-phase upload protocol. The production
/// implementation is the reqwest-backed control-plane client; tests script
/// this trait directly.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn request_token(
        &self,
        schema_slug: &str,
        request: &TokenRequest,
    ) -> Result<UploadToken, UploadError>;

    /// Streams the artifact against the pre-signed URL with the token's
    /// method and headers, verbatim.
    async fn put_object(
        &self,
        token: &UploadToken,
        artifact: &Path,
        content_length: u64,
    ) -> Result<(), UploadError>;

    async fn notify(
        &self,
        schema_slug: &str,
        request: &NotifyRequest,
    ) -> Result<NotifyOutcome, UploadError>;
}
