//! Core types for scoretrack

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique client-side identifier for a tracked task
///
/// Generated locally when a record is created, before the server has assigned
/// anything. Stable for the lifetime of the record regardless of server state.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Generate a fresh random task identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// View the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Server-assigned identifier for a submitted task
///
/// Only known after a successful upload response; write-once per record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerTaskId(String);

impl ServerTaskId {
    /// View the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ServerTaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ServerTaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ServerTaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Task lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Upload in progress, no server identifier yet
    Uploading,
    /// Accepted by the server, waiting to be processed
    Queued,
    /// Server is processing the score
    Processing,
    /// Processing finished successfully
    Completed,
    /// Processing finished but some steps reported errors
    CompletedWithErrors,
    /// Upload or processing failed
    Failed,
    /// A status poll for this task failed; polling has stopped
    PollingError,
    /// The server reported the task unknown (synthetic, from HTTP 404)
    NotFound,
}

impl Status {
    /// Whether this status participates in the polling loop
    ///
    /// Only tasks that are `queued` or `processing` (and have a server
    /// identifier) are polled; everything else is either pre-upload or
    /// terminal.
    pub fn is_poll_active(&self) -> bool {
        matches!(self, Status::Queued | Status::Processing)
    }

    /// Whether this status is terminal (no further automatic transitions)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Status::Completed
                | Status::CompletedWithErrors
                | Status::Failed
                | Status::PollingError
                | Status::NotFound
        )
    }

    /// Whether this status is in the terminal-success family
    ///
    /// Both variants trigger the detailed result fetch; `completed_with_errors`
    /// still carries usable output.
    pub fn is_terminal_success(&self) -> bool {
        matches!(self, Status::Completed | Status::CompletedWithErrors)
    }

    /// Wire representation used by the backend
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Uploading => "uploading",
            Status::Queued => "queued",
            Status::Processing => "processing",
            Status::Completed => "completed",
            Status::CompletedWithErrors => "completed_with_errors",
            Status::Failed => "failed",
            Status::PollingError => "polling_error",
            Status::NotFound => "not_found",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploading" => Ok(Status::Uploading),
            "queued" => Ok(Status::Queued),
            "processing" => Ok(Status::Processing),
            "completed" => Ok(Status::Completed),
            "completed_with_errors" => Ok(Status::CompletedWithErrors),
            "failed" => Ok(Status::Failed),
            "polling_error" => Ok(Status::PollingError),
            "not_found" => Ok(Status::NotFound),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Error returned when parsing an unrecognized status string
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl std::fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown task status: {:?}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

/// One tracked task: a submitted score and its processing state
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Client-generated identifier, assigned once at creation
    pub id: TaskId,

    /// Original filename, used as the display label
    pub filename: String,

    /// Current lifecycle status
    pub status: Status,

    /// Upload progress percentage (0 to 100), meaningful only pre-terminal
    pub upload_progress: u8,

    /// Server-assigned identifier, populated by the upload response
    pub server_task_id: Option<ServerTaskId>,

    /// Result payload; a status poll may set a minimal one, the detail fetch
    /// replaces it with the full payload
    pub result: Option<TaskResult>,

    /// Human-readable message set on any failure transition
    pub error: Option<String>,

    /// When the record was created
    pub created_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Create a fresh record for a new upload
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            id: TaskId::generate(),
            filename: filename.into(),
            status: Status::Uploading,
            upload_progress: 0,
            server_task_id: None,
            result: None,
            error: None,
            created_at: Utc::now(),
        }
    }

    /// Whether the polling loop should fetch status for this record
    pub fn is_poll_eligible(&self) -> bool {
        self.server_task_id.is_some() && self.status.is_poll_active()
    }
}

/// Partial update applied to a [`TaskRecord`]
///
/// The registry only mutates records through patches, copy-on-write at record
/// granularity, so readers never observe a half-applied update.
#[derive(Clone, Debug, Default)]
pub struct TaskPatch {
    /// New status, if changing
    pub status: Option<Status>,
    /// New upload progress, if changing
    pub upload_progress: Option<u8>,
    /// Server identifier, if newly known (write-once; later writes ignored)
    pub server_task_id: Option<ServerTaskId>,
    /// Result payload, if newly fetched
    pub result: Option<TaskResult>,
    /// Error message, if a failure occurred
    pub error: Option<String>,
}

impl TaskPatch {
    /// Patch that only changes the status
    pub fn status(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Patch that only changes the upload progress
    pub fn progress(percent: u8) -> Self {
        Self {
            upload_progress: Some(percent),
            ..Default::default()
        }
    }

    /// Patch that moves the record to a failure status with a message
    pub fn failure(status: Status, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            error: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Recognized submission options
///
/// The server ignores options it does not recognize, so callers pass the
/// subset they know. Unset fields are omitted from the request entirely.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SubmitOptions {
    /// Desired audio output format (e.g. "mp3", "wav")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,

    /// Translate recognized lyrics into archaic style
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translate_shakespearean: Option<bool>,
}

impl SubmitOptions {
    /// Fill unset fields from `defaults`, leaving explicit values untouched
    pub fn merged_with(mut self, defaults: &SubmitOptions) -> Self {
        if self.output_format.is_none() {
            self.output_format = defaults.output_format.clone();
        }
        if self.translate_shakespearean.is_none() {
            self.translate_shakespearean = defaults.translate_shakespearean;
        }
        self
    }
}

/// Response to a successful upload
#[derive(Clone, Debug, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned task identifier
    pub task_id: String,

    /// Initial status, if the server reports one ("queued" when absent)
    #[serde(default)]
    pub status: Option<String>,
}

impl SubmitResponse {
    /// Initial status for the record, defaulting to [`Status::Queued`]
    ///
    /// Unrecognized status strings also fall back to queued so a creative
    /// backend cannot strand a fresh task outside the poll-eligible set.
    pub fn initial_status(&self) -> Status {
        self.status
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(Status::Queued)
    }
}

/// Response from the status endpoint
#[derive(Clone, Debug, Deserialize)]
pub struct StatusResponse {
    /// Server task identifier echoed back (absent in synthetic responses)
    #[serde(default)]
    pub task_id: Option<String>,

    /// Current status of the task
    pub status: Status,

    /// Error detail for failed tasks, if the server provides one
    #[serde(default)]
    pub error: Option<String>,

    /// Any additional keys, passed through opaquely
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl StatusResponse {
    /// Synthetic response for an unknown task (HTTP 404 on the status poll)
    pub fn not_found() -> Self {
        Self {
            task_id: None,
            status: Status::NotFound,
            error: None,
            extra: serde_json::Map::new(),
        }
    }

    /// A minimal result payload, when the poll carried more than the status
    ///
    /// Keeps `result` monotonically enriched: the detail fetch later replaces
    /// this with the full payload.
    pub fn partial_result(&self) -> Option<TaskResult> {
        if self.extra.is_empty() {
            return None;
        }
        Some(TaskResult {
            final_status: Some(self.status),
            detailed_results: serde_json::Value::Null,
            processing_time_seconds: None,
            completed_at: None,
            extra: self.extra.clone(),
        })
    }
}

/// Detailed result payload for a finished task
///
/// `detailed_results` is an open schema; observed keys include a generated
/// music file reference (content key or direct URL), a translated text, and
/// an analysis summary object. Unknown keys are preserved as-is.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskResult {
    /// Status the task finished with, as reported by the result endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_status: Option<Status>,

    /// Opaque result document
    #[serde(default)]
    pub detailed_results: serde_json::Value,

    /// Wall-clock processing time reported by the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time_seconds: Option<f64>,

    /// When the backend finished the task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Any additional top-level keys, passed through opaquely
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Event emitted during the task lifecycle
///
/// Consumers subscribe via [`crate::ScoreTracker::subscribe`]; slow receivers
/// lag and drop the oldest events rather than blocking the tracker.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A record was created and its upload started
    UploadStarted {
        /// Task identifier
        id: TaskId,
        /// Display filename
        filename: String,
    },

    /// Upload progress changed
    UploadProgress {
        /// Task identifier
        id: TaskId,
        /// Progress percentage (0 to 100)
        percent: u8,
    },

    /// Upload finished and the server accepted the task
    UploadComplete {
        /// Task identifier
        id: TaskId,
        /// Server-assigned identifier
        server_task_id: ServerTaskId,
    },

    /// Upload failed before the server accepted the task
    UploadFailed {
        /// Task identifier
        id: TaskId,
        /// Failure message
        error: String,
    },

    /// A status poll moved the task to a new status outside the
    /// terminal-success and failed families (including the `not_found`
    /// anomaly)
    StatusChanged {
        /// Task identifier
        id: TaskId,
        /// New status
        status: Status,
    },

    /// The task reached a terminal-success status
    Completed {
        /// Task identifier
        id: TaskId,
        /// Terminal status (`completed` or `completed_with_errors`)
        status: Status,
    },

    /// The task failed on the server
    Failed {
        /// Task identifier
        id: TaskId,
        /// Failure message, if the server provided one
        error: Option<String>,
    },

    /// A status poll itself failed; polling stopped for this task
    PollingError {
        /// Task identifier
        id: TaskId,
        /// Poll failure message
        error: String,
    },

    /// The detailed result payload was fetched and stored
    ResultReady {
        /// Task identifier
        id: TaskId,
    },

    /// The detailed result fetch failed; the terminal status stands
    ResultFetchFailed {
        /// Task identifier
        id: TaskId,
        /// Fetch failure message
        error: String,
    },

    /// The tracker is shutting down; no further ticks will run
    Shutdown,
}
