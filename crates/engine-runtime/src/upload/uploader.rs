use crate::upload::{
    NotifyRequest, TokenRequest, UploadError, UploadReceipt, UploadToken, UploadTransport,
};
use crate::writer::Artifact;
use chrono::Utc;
use engine_core::metrics::Metrics;
use engine_core::retry::RetryPolicy;
use model::watermark::Watermark;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Where the protocol stands for one artifact. Token request, object upload
/// and notify share a single retry budget; a transient failure before the
/// object is stored restarts from `NeedToken` because the pre-signed URL is
/// one-shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    NeedToken,
    Uploading,
    Notifying,
}

/// Ships artifacts end-to-end: token, object upload, notify.
pub struct Uploader {
    transport: Arc<dyn UploadTransport>,
    policy: RetryPolicy,
    metrics: Metrics,
}

impl Uploader {
    pub fn new(transport: Arc<dyn UploadTransport>, retry_attempts: u32, metrics: Metrics) -> Self {
        Uploader {
            transport,
            policy: RetryPolicy::for_upload(retry_attempts as usize),
            metrics,
        }
    }

    /// Ships one artifact. On success the artifact has been stored and the
    /// control plane notified (or notification deemed optional); only then
    /// may the caller advance the watermark.
    pub async fn put(
        &self,
        schema_slug: &str,
        artifact: &Artifact,
        watermark_after: &Watermark,
    ) -> Result<UploadReceipt, UploadError> {
        let upload_id = Uuid::new_v4().to_string();
        let filename = artifact
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let token_request = TokenRequest {
            upload_id: upload_id.clone(),
            filename,
            content_length: artifact.bytes,
            content_type: "application/x-ndjson".to_string(),
            encoding: "gzip".to_string(),
        };
        let notify_request = NotifyRequest {
            upload_id: upload_id.clone(),
            record_count: artifact.record_count,
            bytes: artifact.bytes,
            watermark_after: watermark_after.as_str().to_string(),
        };

        let mut phase = Phase::NeedToken;
        let mut token: Option<UploadToken> = None;
        let mut attempt = 0;

        loop {
            let step: Result<Phase, UploadError> = match phase {
                Phase::NeedToken => match self
                    .transport
                    .request_token(schema_slug, &token_request)
                    .await
                {
                    Ok(issued) => {
                        token = Some(issued);
                        Ok(Phase::Uploading)
                    }
                    Err(err) => Err(err),
                },
                Phase::Uploading => {
                    let token = token.as_ref().ok_or_else(|| {
                        UploadError::Rejected("upload attempted without a token".into())
                    })?;
                    self.transport
                        .put_object(token, &artifact.path, artifact.bytes)
                        .await
                        .map(|()| Phase::Notifying)
                }
                Phase::Notifying => {
                    match self.transport.notify(schema_slug, &notify_request).await {
                        Ok(outcome) => {
                            let remote_url = token
                                .as_ref()
                                .map(|t| t.upload_url.clone())
                                .unwrap_or_default();
                            info!(
                                upload_id = %upload_id,
                                records = artifact.record_count,
                                bytes = artifact.bytes,
                                ?outcome,
                                "artifact uploaded"
                            );
                            return Ok(UploadReceipt {
                                remote_url,
                                confirmed_at: Utc::now(),
                                bytes: artifact.bytes,
                            });
                        }
                        Err(err) => Err(err),
                    }
                }
            };

            match step {
                Ok(next) => phase = next,
                Err(UploadError::Transient(message)) => {
                    if attempt + 1 >= self.policy.max_attempts {
                        self.metrics.add_retry_exhausted();
                        return Err(UploadError::Exhausted(message));
                    }
                    let delay = self.policy.backoff_delay(attempt);
                    warn!(
                        upload_id = %upload_id,
                        attempt = attempt + 1,
                        ?phase,
                        "transient upload failure, retrying in {delay:?}: {message}"
                    );
                    self.metrics.add_retry_attempted();
                    tokio::time::sleep(delay).await;
                    attempt += 1;

                    // a notify retry keeps its phase; anything earlier needs
                    // a fresh one-shot URL
                    if phase != Phase::Notifying {
                        phase = Phase::NeedToken;
                        token = None;
                    }
                }
                Err(fatal) => return Err(fatal),
            }
        }
    }
}
