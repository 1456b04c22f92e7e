//! Remote task API client
//!
//! Thin, contract-bound client for the three backend operations: submit a
//! score for processing, fetch the current status of a task, and fetch the
//! detailed results of a finished task. No lifecycle logic lives here; the
//! tracker owns all state transitions.
//!
//! The one quirk worth knowing: an HTTP 404 from the status endpoint is a
//! *successful* response carrying the synthetic `not_found` status, because
//! the backend reports unknown tasks that way. Every other non-2xx is a
//! transport error.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::{ServerTaskId, StatusResponse, SubmitOptions, SubmitResponse, TaskResult};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Upload progress sink, invoked synchronously with values in `0..=100`
///
/// Implementations receive monotonically non-decreasing percentages, called
/// at least once at the start (0) and once at completion (100). Intermediate
/// granularity is best-effort; true byte-level progress is transport
/// dependent.
pub type ProgressFn = dyn Fn(u8) + Send + Sync;

/// A score file staged for upload
#[derive(Clone, Debug)]
pub struct ScoreUpload {
    /// Original filename, sent as the multipart filename and used as the
    /// record's display label
    pub filename: String,
    /// Raw file contents
    pub bytes: Vec<u8>,
}

impl ScoreUpload {
    /// Stage a file from in-memory bytes
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    /// Stage a file by reading it from disk
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::Validation(format!("path has no filename: {}", path.display())))?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| Error::Validation(format!("cannot read {}: {e}", path.display())))?;
        Ok(Self { filename, bytes })
    }
}

/// Contract for the three remote task operations
///
/// Implemented by [`HttpApiClient`] for real backends and by scripted mocks
/// in tests. The tracker only ever talks to the backend through this trait.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Submit a score for processing
    ///
    /// Reports progress through `progress` (see [`ProgressFn`] for the
    /// guarantees). Fails with a transport or network error on any non-2xx
    /// response or connection failure.
    async fn submit(
        &self,
        upload: ScoreUpload,
        options: &SubmitOptions,
        progress: &ProgressFn,
    ) -> Result<SubmitResponse>;

    /// Fetch the current status of a task
    ///
    /// HTTP 404 is mapped to a synthetic `not_found` status response, not an
    /// error; any other non-2xx or network failure is an error.
    async fn fetch_status(&self, id: &ServerTaskId) -> Result<StatusResponse>;

    /// Fetch the detailed result payload of a finished task
    ///
    /// No 404 special-casing here; any non-2xx is a transport error.
    async fn fetch_result(&self, id: &ServerTaskId) -> Result<TaskResult>;
}

/// HTTP implementation of [`ApiClient`] backed by reqwest
pub struct HttpApiClient {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
    upload_timeout: Duration,
}

impl HttpApiClient {
    /// Build a client from the tracker configuration
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(Error::Network)?;
        Ok(Self {
            client,
            base_url: config.base_url_trimmed().to_string(),
            request_timeout: config.request_timeout,
            upload_timeout: config.upload_timeout,
        })
    }

    fn upload_url(&self, options: &SubmitOptions) -> String {
        let mut url = format!("{}/music/upload_sheetmusic", self.base_url);
        let mut params = url::form_urlencoded::Serializer::new(String::new());
        if let Some(format) = &options.output_format {
            params.append_pair("output_format", format);
        }
        if let Some(translate) = options.translate_shakespearean {
            params.append_pair("translate_shakespearean", if translate { "true" } else { "false" });
        }
        let query = params.finish();
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query);
        }
        url
    }

    /// Read the body of a non-2xx response into a transport error
    async fn transport_error(response: reqwest::Response) -> Error {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = if body.is_empty() {
            format!("HTTP {status}")
        } else {
            body
        };
        Error::Transport {
            status: Some(status),
            message,
        }
    }

    /// Decode a 2xx response body, mapping decode failures to `Serialization`
    async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let body = response.text().await.map_err(Error::Network)?;
        serde_json::from_str(&body).map_err(Error::Serialization)
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    async fn submit(
        &self,
        upload: ScoreUpload,
        options: &SubmitOptions,
        progress: &ProgressFn,
    ) -> Result<SubmitResponse> {
        let url = self.upload_url(options);
        let filename = upload.filename.clone();
        debug!(url = %url, filename = %filename, bytes = upload.bytes.len(), "submitting score");

        // Contract: at least once at start, once at completion, monotone.
        // Byte-level granularity would need a streamed body; one intermediate
        // step after the body is handed to the transport is best-effort.
        progress(0);

        let part = reqwest::multipart::Part::bytes(upload.bytes)
            .file_name(filename)
            .mime_str("application/octet-stream")
            .map_err(Error::Network)?;
        let form = reqwest::multipart::Form::new().part("file", part);

        progress(10);

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .timeout(self.upload_timeout)
            .send()
            .await
            .map_err(Error::Network)?;

        if !response.status().is_success() {
            return Err(Self::transport_error(response).await);
        }

        progress(100);
        Self::decode(response).await
    }

    async fn fetch_status(&self, id: &ServerTaskId) -> Result<StatusResponse> {
        let url = format!("{}/status/{id}", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(Error::Network)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            // The backend reports unknown tasks as 404; surface that as a
            // synthetic status value so the tracker can transition explicitly.
            warn!(task_id = %id, "status poll returned 404, mapping to not_found");
            return Ok(StatusResponse::not_found());
        }
        if !response.status().is_success() {
            return Err(Self::transport_error(response).await);
        }
        Self::decode(response).await
    }

    async fn fetch_result(&self, id: &ServerTaskId) -> Result<TaskResult> {
        let url = format!("{}/results/{id}", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(Error::Network)?;

        if !response.status().is_success() {
            return Err(Self::transport_error(response).await);
        }
        Self::decode(response).await
    }
}
