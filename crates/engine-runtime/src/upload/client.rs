use crate::upload::stream::ProgressTimeout;
use crate::upload::{
    NotifyOutcome, NotifyRequest, TokenRequest, UploadError, UploadToken, UploadTransport,
};
use async_trait::async_trait;
use engine_config::api::ApiConfig;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH};
use reqwest::{Body, Method, StatusCode};
use std::path::Path;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::debug;

const DEFAULT_CONTROL_TIMEOUT: Duration = Duration::from_secs(30);
/// Upload stall window, not a total deadline: it resets on every chunk of
/// progress so slow networks can finish large artifacts.
const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// reqwest-backed implementation of the upload protocol against the
/// control plane and the pre-signed object store.
pub struct ControlPlaneClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    control_timeout: Duration,
    upload_timeout: Duration,
}

impl ControlPlaneClient {
    pub fn new(config: ApiConfig, control_timeout: Option<Duration>) -> Result<Self, UploadError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| UploadError::Rejected(format!("http client setup failed: {err}")))?;

        Ok(ControlPlaneClient {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            control_timeout: control_timeout.unwrap_or(DEFAULT_CONTROL_TIMEOUT),
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
        })
    }

    fn endpoint(&self, schema_slug: &str, action: &str) -> String {
        format!("{}/v1/schemas/{schema_slug}/{action}", self.base_url)
    }

    fn classify_status(status: StatusCode, body: String) -> UploadError {
        if status.is_server_error()
            || status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::REQUEST_TIMEOUT
        {
            UploadError::Transient(format!("{status}: {body}"))
        } else {
            UploadError::Rejected(format!("{status}: {body}"))
        }
    }

    fn classify_request(err: reqwest::Error) -> UploadError {
        // connection errors, timeouts, resets: all worth another attempt
        UploadError::Transient(err.to_string())
    }

    fn token_headers(token: &UploadToken) -> Result<HeaderMap, UploadError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &token.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| UploadError::Rejected(format!("bad header '{name}': {err}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|err| UploadError::Rejected(format!("bad header value: {err}")))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

#[async_trait]
impl UploadTransport for ControlPlaneClient {
    async fn request_token(
        &self,
        schema_slug: &str,
        request: &TokenRequest,
    ) -> Result<UploadToken, UploadError> {
        let url = self.endpoint(schema_slug, "generate-upload-token");
        debug!(%url, upload_id = %request.upload_id, "requesting upload token");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(self.control_timeout)
            .json(request)
            .send()
            .await
            .map_err(Self::classify_request)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, body));
        }
        response
            .json::<UploadToken>()
            .await
            .map_err(|err| UploadError::Rejected(format!("malformed token response: {err}")))
    }

    async fn put_object(
        &self,
        token: &UploadToken,
        artifact: &Path,
        content_length: u64,
    ) -> Result<(), UploadError> {
        let method = Method::from_bytes(token.method.to_ascii_uppercase().as_bytes())
            .map_err(|err| UploadError::Rejected(format!("bad upload method: {err}")))?;
        let headers = Self::token_headers(token)?;

        let file = tokio::fs::File::open(artifact)
            .await
            .map_err(|err| UploadError::Rejected(format!("artifact vanished: {err}")))?;
        let body = Body::wrap_stream(ProgressTimeout::new(
            ReaderStream::new(file),
            self.upload_timeout,
        ));

        debug!(url = %token.upload_url, method = %method, "uploading artifact");
        let response = self
            .http
            .request(method, &token.upload_url)
            .headers(headers)
            .header(CONTENT_LENGTH, content_length)
            .body(body)
            .send()
            .await
            .map_err(Self::classify_request)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, body));
        }
        Ok(())
    }

    async fn notify(
        &self,
        schema_slug: &str,
        request: &NotifyRequest,
    ) -> Result<NotifyOutcome, UploadError> {
        let url = self.endpoint(schema_slug, "notify-upload");
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(self.control_timeout)
            .json(request)
            .send()
            .await
            .map_err(Self::classify_request)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            // event-bus deployments do not expose this endpoint
            return Ok(NotifyOutcome::NotRequired);
        }
        if status.is_success() {
            return Ok(NotifyOutcome::Acknowledged);
        }
        let body = response.text().await.unwrap_or_default();
        Err(UploadError::Transient(format!("{status}: {body}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_and_throttling_are_transient() {
        assert!(matches!(
            ControlPlaneClient::classify_status(StatusCode::BAD_GATEWAY, String::new()),
            UploadError::Transient(_)
        ));
        assert!(matches!(
            ControlPlaneClient::classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            UploadError::Transient(_)
        ));
    }

    #[test]
    fn client_errors_are_rejections() {
        assert!(matches!(
            ControlPlaneClient::classify_status(StatusCode::FORBIDDEN, String::new()),
            UploadError::Rejected(_)
        ));
        assert!(matches!(
            ControlPlaneClient::classify_status(StatusCode::BAD_REQUEST, String::new()),
            UploadError::Rejected(_)
        ));
    }

    #[test]
    fn token_headers_pass_through_verbatim() {
        let token = UploadToken {
            upload_url: "https://store.example/obj".into(),
            method: "PUT".into(),
            headers: [("x-amz-meta-run".to_string(), "42".to_string())]
                .into_iter()
                .collect(),
            expires_at: None,
        };
        let headers = ControlPlaneClient::token_headers(&token).unwrap();
        assert_eq!(headers.get("x-amz-meta-run").unwrap(), "42");
    }
}
