//! Task lifecycle tracker
//!
//! The core of the crate: owns the [`TaskRegistry`], drives uploads, runs the
//! polling loop, applies every status transition, and triggers the detailed
//! result fetch when a task reaches a terminal-success status. The tracker is
//! the sole authority for transitions; everything else reads snapshots.
//!
//! Concurrency model: all work runs on the tokio runtime. Within one polling
//! tick every eligible task is polled concurrently and completions apply in
//! any order; per task, upload → poll → … → terminal → result fetch is
//! causally ordered. One task's failure never aborts the loop or touches
//! another task's record.


use crate::client::{ApiClient, HttpApiClient, ScoreUpload};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::registry::TaskRegistry;
use crate::types::{
    Event, ServerTaskId, Status, StatusResponse, SubmitOptions, TaskId, TaskPatch, TaskRecord,
};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Broadcast channel capacity; lagging subscribers drop oldest events
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Tracks score-processing tasks from upload to final result
///
/// Cloneable; all clones share the same registry, staged-file slot, event
/// channel, and cancellation token.
#[derive(Clone)]
pub struct ScoreTracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    config: Config,
    client: Arc<dyn ApiClient>,
    registry: TaskRegistry,
    /// Single-slot staging area for the next upload; not part of the registry
    staged: Mutex<Option<ScoreUpload>>,
    event_tx: tokio::sync::broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl ScoreTracker {
    /// Create a tracker talking to a real backend over HTTP
    pub fn new(config: Config) -> Result<Self> {
        let client = Arc::new(HttpApiClient::new(&config)?);
        Ok(Self::with_client(config, client))
    }

    /// Create a tracker with an injected API client
    ///
    /// This is the seam tests and alternative transports plug into.
    pub fn with_client(config: Config, client: Arc<dyn ApiClient>) -> Self {
        let (event_tx, _) = tokio::sync::broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(TrackerInner {
                config,
                client,
                registry: TaskRegistry::new(),
                staged: Mutex::new(None),
                event_tx,
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.inner.event_tx.subscribe()
    }

    // --- Staging -----------------------------------------------------------

    /// Stage a score from in-memory bytes for the next upload
    ///
    /// Replaces any previously staged file; the slot holds at most one.
    pub fn stage(&self, filename: impl Into<String>, bytes: Vec<u8>) {
        let upload = ScoreUpload::new(filename, bytes);
        debug!(filename = %upload.filename, bytes = upload.bytes.len(), "score staged");
        *self.staged_slot() = Some(upload);
    }

    /// Stage a score by reading it from disk
    pub async fn stage_path(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let upload = ScoreUpload::from_path(path).await?;
        debug!(filename = %upload.filename, bytes = upload.bytes.len(), "score staged");
        *self.staged_slot() = Some(upload);
        Ok(())
    }

    /// Filename of the currently staged score, if any
    pub fn staged_filename(&self) -> Option<String> {
        self.staged_slot().as_ref().map(|u| u.filename.clone())
    }

    /// Discard the currently staged score
    pub fn clear_staged(&self) {
        *self.staged_slot() = None;
    }

    fn staged_slot(&self) -> std::sync::MutexGuard<'_, Option<ScoreUpload>> {
        self.inner
            .staged
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    // --- Upload flow -------------------------------------------------------

    /// Upload the staged score, creating and returning a tracked task
    ///
    /// Fails with [`Error::Validation`] before any network call when nothing
    /// is staged. The staged slot is cleared regardless of the upload's
    /// outcome. An upload *failure* is not an `Err`: the record transitions to
    /// `failed` with the message attached and the tracker stays live for
    /// other tasks; consumers observe the failure on the record and through
    /// the [`Event::UploadFailed`] event.
    pub async fn upload_staged(&self, options: SubmitOptions) -> Result<TaskId> {
        let upload = self
            .staged_slot()
            .take()
            .ok_or_else(|| Error::Validation("no score staged for upload".to_string()))?;
        Ok(self.upload(upload, options).await)
    }

    /// Upload a score directly, bypassing the staging slot
    pub async fn upload(&self, upload: ScoreUpload, options: SubmitOptions) -> TaskId {
        let options = options.merged_with(&self.inner.config.default_options);
        let record = TaskRecord::new(upload.filename.clone());
        let id = record.id.clone();
        let filename = record.filename.clone();
        self.inner.registry.insert(record);
        self.emit(Event::UploadStarted {
            id: id.clone(),
            filename,
        });

        let sink = {
            let tracker = self.clone();
            let id = id.clone();
            move |percent: u8| {
                if tracker.inner.cancel.is_cancelled() {
                    return;
                }
                tracker.inner.registry.apply(&id, TaskPatch::progress(percent));
                tracker.emit(Event::UploadProgress {
                    id: id.clone(),
                    percent,
                });
            }
        };

        match self.inner.client.submit(upload, &options, &sink).await {
            Ok(response) => {
                let server_id = ServerTaskId::from(response.task_id.clone());
                info!(id = %id, server_task_id = %server_id, "upload accepted");
                self.inner.registry.apply(
                    &id,
                    TaskPatch {
                        status: Some(response.initial_status()),
                        upload_progress: Some(100),
                        server_task_id: Some(server_id.clone()),
                        ..Default::default()
                    },
                );
                self.emit(Event::UploadComplete {
                    id: id.clone(),
                    server_task_id: server_id,
                });
            }
            Err(e) => {
                let message = e.to_string();
                error!(id = %id, error = %message, "upload failed");
                self.inner
                    .registry
                    .apply(&id, TaskPatch::failure(Status::Failed, message.clone()));
                self.emit(Event::UploadFailed {
                    id: id.clone(),
                    error: message,
                });
            }
        }
        id
    }

    // --- Polling loop ------------------------------------------------------

    /// Spawn the polling loop on the current runtime
    ///
    /// The loop runs for the tracker's lifetime, independent of whether any
    /// task is currently eligible; an empty round is a no-op. Stop it with
    /// [`ScoreTracker::shutdown`].
    pub fn start(&self) -> tokio::task::JoinHandle<()> {
        let tracker = self.clone();
        tokio::spawn(async move { tracker.run().await })
    }

    /// Run the polling loop until the tracker is shut down
    pub async fn run(&self) {
        info!(
            interval_secs = self.inner.config.poll_interval.as_secs_f64(),
            "polling loop started"
        );
        let mut interval = tokio::time::interval(self.inner.config.poll_interval);
        // The first tick of a tokio interval fires immediately; consume it so
        // the first real poll happens one interval after startup, matching
        // the fixed-cadence contract.
        interval.tick().await;
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.inner.cancel.cancelled() => {
                    info!("polling loop stopped");
                    break;
                }
                _ = interval.tick() => {
                    self.poll_once().await;
                }
            }
        }
    }

    /// Execute a single polling tick
    ///
    /// Snapshots the eligible set at tick start (tasks becoming eligible
    /// later wait for the next tick), polls every member concurrently, and
    /// applies transitions as completions arrive. Never panics outward; any
    /// per-task failure is contained here so the loop always reaches its
    /// next tick.
    pub(crate) async fn poll_once(&self) {
        let eligible = self.inner.registry.poll_eligible();
        if eligible.is_empty() {
            trace!("poll tick: no eligible tasks");
            return;
        }
        debug!(count = eligible.len(), "poll tick");
        let polls = eligible.into_iter().map(|record| self.poll_task(record));
        futures::future::join_all(polls).await;
    }

    /// Poll a single task and apply the resulting transition
    async fn poll_task(&self, record: TaskRecord) {
        let Some(server_id) = record.server_task_id.clone() else {
            // poll_eligible guarantees this; guard anyway
            return;
        };
        let id = record.id;

        let outcome = self.inner.client.fetch_status(&server_id).await;
        if self.inner.cancel.is_cancelled() {
            // In-flight completion arriving after teardown: discard
            return;
        }

        match outcome {
            Ok(response) => self.apply_status(&id, &server_id, response),
            Err(e) => {
                let message = e.to_string();
                warn!(id = %id, server_task_id = %server_id, error = %message, "status poll failed");
                // A single poll failure permanently stops polling for this
                // task: polling_error is terminal and not poll-eligible.
                self.inner
                    .registry
                    .apply(&id, TaskPatch::failure(Status::PollingError, message.clone()));
                self.emit(Event::PollingError { id, error: message });
            }
        }
    }

    /// Apply a status response to a record
    fn apply_status(&self, id: &TaskId, server_id: &ServerTaskId, response: StatusResponse) {
        match response.status {
            Status::Queued | Status::Processing => {
                let partial = response.partial_result();
                let patch = TaskPatch {
                    status: Some(response.status),
                    result: partial,
                    ..Default::default()
                };
                let changed = self
                    .inner
                    .registry
                    .apply(id, patch)
                    .is_some_and(|r| r.status == response.status);
                if changed {
                    self.emit(Event::StatusChanged {
                        id: id.clone(),
                        status: response.status,
                    });
                }
            }
            Status::Completed | Status::CompletedWithErrors => {
                info!(id = %id, status = %response.status, "task finished");
                self.inner.registry.apply(
                    id,
                    TaskPatch {
                        status: Some(response.status),
                        result: response.partial_result(),
                        ..Default::default()
                    },
                );
                self.emit(Event::Completed {
                    id: id.clone(),
                    status: response.status,
                });
                // Follow-on step; deliberately not awaited by the tick
                self.spawn_result_fetch(id.clone(), server_id.clone());
            }
            Status::Failed => {
                let message = response.error.clone();
                warn!(id = %id, error = ?message, "task failed on the server");
                self.inner.registry.apply(
                    id,
                    TaskPatch {
                        status: Some(Status::Failed),
                        error: message.clone(),
                        ..Default::default()
                    },
                );
                self.emit(Event::Failed {
                    id: id.clone(),
                    error: message,
                });
            }
            Status::NotFound => {
                // Explicit anomaly transition: the record leaves the
                // poll-eligible set instead of silently sticking around.
                warn!(id = %id, server_task_id = %server_id, "server no longer knows this task");
                self.inner.registry.apply(
                    id,
                    TaskPatch::failure(
                        Status::NotFound,
                        format!("server reported task {server_id} as unknown"),
                    ),
                );
                self.emit(Event::StatusChanged {
                    id: id.clone(),
                    status: Status::NotFound,
                });
            }
            other => {
                // The backend should never report these; treat as an anomaly
                warn!(id = %id, status = %other, "unexpected status from poll");
                self.inner.registry.apply(
                    id,
                    TaskPatch::failure(
                        Status::PollingError,
                        format!("unexpected status from server: {other}"),
                    ),
                );
                self.emit(Event::PollingError {
                    id: id.clone(),
                    error: format!("unexpected status from server: {other}"),
                });
            }
        }
    }

    /// Fetch the detailed result payload in the background
    ///
    /// A fetch failure is recorded on the record without reverting the
    /// terminal status; the result simply stays absent or partial.
    fn spawn_result_fetch(&self, id: TaskId, server_id: ServerTaskId) {
        let tracker = self.clone();
        tokio::spawn(async move {
            let outcome = tracker.inner.client.fetch_result(&server_id).await;
            if tracker.inner.cancel.is_cancelled() {
                return;
            }
            match outcome {
                Ok(payload) => {
                    debug!(id = %id, "detailed result stored");
                    tracker.inner.registry.apply(
                        &id,
                        TaskPatch {
                            result: Some(payload),
                            ..Default::default()
                        },
                    );
                    tracker.emit(Event::ResultReady { id });
                }
                Err(e) => {
                    let message = Error::ResultFetch(e.to_string()).to_string();
                    warn!(id = %id, error = %message, "result fetch failed, terminal status stands");
                    tracker.inner.registry.apply(
                        &id,
                        TaskPatch {
                            error: Some(message.clone()),
                            ..Default::default()
                        },
                    );
                    tracker.emit(Event::ResultFetchFailed { id, error: message });
                }
            }
        });
    }

    // --- Reads -------------------------------------------------------------

    /// Current revision of a single task record
    ///
    /// Pure read; no network, no mutation. Presentation convention is to show
    /// detailed results only for terminal-success records, but nothing here
    /// enforces that.
    pub fn task(&self, id: &TaskId) -> Option<TaskRecord> {
        self.inner.registry.get(id)
    }

    /// Snapshot of all task records in creation order
    pub fn snapshot(&self) -> Vec<TaskRecord> {
        self.inner.registry.snapshot()
    }

    /// The tracker configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    // --- Teardown ----------------------------------------------------------

    /// Stop the polling loop and discard in-flight completions
    ///
    /// Requests already on the wire are allowed to finish, but their
    /// resolutions no longer touch the registry.
    pub fn shutdown(&self) {
        info!("tracker shutting down");
        self.inner.cancel.cancel();
        self.emit(Event::Shutdown);
    }

    /// Whether the tracker has been shut down
    pub fn is_shutdown(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine; send only fails when none exist
        let _ = self.inner.event_tx.send(event);
    }
}
