//! # scoretrack
//!
//! Client library for submitting music scores to a remote processing service
//! (optical recognition, translation, audio rendering) and tracking each
//! submission to completion.
//!
//! ## Design Philosophy
//!
//! scoretrack is designed to be:
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Backend-agnostic** - The service is reached through a three-operation
//!   HTTP contract; nothing else is assumed about it
//! - **Event-driven** - Consumers subscribe to lifecycle events and read
//!   registry snapshots; all transitions happen inside the tracker
//! - **Failure-localized** - One task's error never disturbs another task or
//!   the polling loop
//!
//! ## Quick Start
//!
//! ```no_run
//! use scoretrack::{Config, ScoreTracker, SubmitOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tracker = ScoreTracker::new(Config::from_env())?;
//!
//!     // Subscribe to lifecycle events
//!     let mut events = tracker.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     // Start the polling loop
//!     tracker.start();
//!
//!     // Stage and upload a score
//!     tracker.stage_path("scores/moonlight.pdf").await?;
//!     let options = SubmitOptions {
//!         output_format: Some("mp3".to_string()),
//!         translate_shakespearean: Some(true),
//!     };
//!     let id = tracker.upload_staged(options).await?;
//!     println!("tracking task {id}");
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Remote task API client
pub mod client;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Backend processing log stream (server-sent events)
pub mod logs;
/// In-memory task registry
pub mod registry;
/// Task lifecycle tracker
pub mod tracker;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use client::{ApiClient, HttpApiClient, ProgressFn, ScoreUpload};
pub use config::{BASE_URL_ENV, Config};
pub use error::{Error, Result};
pub use registry::TaskRegistry;
pub use tracker::ScoreTracker;
pub use types::{
    Event, ServerTaskId, Status, StatusResponse, SubmitOptions, SubmitResponse, TaskId,
    TaskPatch, TaskRecord, TaskResult,
};

/// Helper function to run the tracker with graceful signal handling.
///
/// Waits for a termination signal and then calls the tracker's `shutdown()`
/// method, stopping the polling loop.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use scoretrack::{Config, ScoreTracker, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let tracker = ScoreTracker::new(Config::default())?;
///     tracker.start();
///
///     // Run with automatic signal handling
///     run_with_shutdown(tracker).await;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(tracker: ScoreTracker) {
    wait_for_signal().await;
    tracker.shutdown();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
