//! Backend processing log stream
//!
//! The backend exposes its processing log as server-sent events at
//! `GET /stream/logs`, one `data:` frame per log line. This module provides
//! the client side: a connect call returning an async stream of log lines,
//! and the pure frame parser it is built on.

use crate::error::{Error, Result};
use futures::{Stream, TryStreamExt};
use tracing::debug;

/// Incremental parser for the server-sent-events wire format
///
/// Feed it raw text chunks in arrival order; it yields one string per
/// completed event (the joined `data:` lines). Handles events split across
/// chunk boundaries, multi-line data, comment lines, and fields other than
/// `data` (ignored, per the SSE spec).
#[derive(Debug, Default)]
pub struct SseFrameParser {
    /// Trailing partial line from the previous chunk
    partial: String,
    /// Data lines of the event currently being assembled
    data: Vec<String>,
}

impl SseFrameParser {
    /// Create an empty parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk, returning every event completed by it
    pub fn feed(&mut self, chunk: &str) -> Vec<String> {
        let mut completed = Vec::new();
        let mut buffer = std::mem::take(&mut self.partial);
        buffer.push_str(chunk);

        // Only lines terminated within this buffer are processed; the final
        // fragment (no trailing newline yet) is carried to the next feed.
        let mut rest = buffer.as_str();
        while let Some(newline) = rest.find('\n') {
            let line = rest[..newline].trim_end_matches('\r');
            rest = &rest[newline + 1..];

            if line.is_empty() {
                // Blank line terminates the event
                if !self.data.is_empty() {
                    completed.push(self.data.join("\n"));
                    self.data.clear();
                }
            } else if let Some(value) = line.strip_prefix("data:") {
                self.data.push(value.strip_prefix(' ').unwrap_or(value).to_string());
            } else if line.starts_with(':') {
                // Comment / keep-alive, ignored
            }
            // Other fields (event:, id:, retry:) carry no log payload
        }
        self.partial = rest.to_string();
        completed
    }
}

/// Connect to the backend's log stream
///
/// Returns a stream of log lines; the stream ends cleanly when the server
/// closes the connection, and yields an error item on mid-stream transport
/// failures. A non-2xx response at connect time is an error.
pub async fn connect(base_url: &str) -> Result<impl Stream<Item = Result<String>> + use<>> {
    let url = format!("{}/stream/logs", base_url.trim_end_matches('/'));
    debug!(url = %url, "connecting to log stream");

    let response = reqwest::Client::new()
        .get(&url)
        .send()
        .await
        .map_err(Error::Network)?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Transport {
            status: Some(status),
            message: if body.is_empty() {
                format!("HTTP {status}")
            } else {
                body
            },
        });
    }

    let mut parser = SseFrameParser::new();
    let lines = response
        .bytes_stream()
        .map_err(Error::Network)
        .map_ok(move |chunk| {
            let events = parser.feed(&String::from_utf8_lossy(&chunk));
            futures::stream::iter(events.into_iter().map(Ok))
        })
        .try_flatten();
    Ok(lines)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // --- Frame parser ---

    #[test]
    fn single_frame_parses_to_one_line() {
        let mut parser = SseFrameParser::new();
        let events = parser.feed("data: [12:00:01] worker started\n\n");
        assert_eq!(events, vec!["[12:00:01] worker started"]);
    }

    #[test]
    fn frames_split_across_chunks_are_reassembled() {
        let mut parser = SseFrameParser::new();
        assert!(parser.feed("data: first ha").is_empty(), "no newline yet");
        assert!(parser.feed("lf\n").is_empty(), "line done, event still open");
        let events = parser.feed("\ndata: second\n\n");
        assert_eq!(events, vec!["first half", "second"]);
    }

    #[test]
    fn multi_line_data_joins_with_newlines() {
        let mut parser = SseFrameParser::new();
        let events = parser.feed("data: line one\ndata: line two\n\n");
        assert_eq!(events, vec!["line one\nline two"]);
    }

    #[test]
    fn comments_and_foreign_fields_are_ignored() {
        let mut parser = SseFrameParser::new();
        let events = parser.feed(": keep-alive\nevent: log\nid: 7\ndata: payload\n\n");
        assert_eq!(events, vec!["payload"]);
    }

    #[test]
    fn blank_line_without_data_emits_nothing() {
        let mut parser = SseFrameParser::new();
        assert!(parser.feed("\n\n\n").is_empty());
    }

    #[test]
    fn crlf_line_endings_are_accepted() {
        let mut parser = SseFrameParser::new();
        let events = parser.feed("data: windows line\r\n\r\n");
        assert_eq!(events, vec!["windows line"]);
    }

    #[test]
    fn data_without_space_after_colon_is_kept_verbatim() {
        let mut parser = SseFrameParser::new();
        let events = parser.feed("data:tight\n\n");
        assert_eq!(events, vec!["tight"]);
    }

    // --- Stream ---

    #[tokio::test]
    async fn connect_yields_parsed_log_lines() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stream/logs"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "text/event-stream")
                    .set_body_string("data: one\n\ndata: two\n\n"),
            )
            .mount(&server)
            .await;

        let stream = connect(&server.uri()).await.unwrap();
        let lines: Vec<String> = stream.map(|l| l.unwrap()).collect().await;
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn connect_rejects_non_2xx_with_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stream/logs"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = connect(&server.uri()).await.err().unwrap();
        match err {
            Error::Transport { status, message } => {
                assert_eq!(status, Some(502));
                assert_eq!(message, "bad gateway");
            }
            other => panic!("expected Transport error, got {other:?}"),
        }
    }
}
