//! End-to-end lifecycle tests: the real HTTP client driven by the tracker
//! against a mock backend.

use scoretrack::{Config, ScoreTracker, Status, SubmitOptions};
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn tracker_for(server: &MockServer) -> ScoreTracker {
    let config = Config {
        base_url: server.uri(),
        poll_interval: Duration::from_millis(50),
        request_timeout: Duration::from_secs(2),
        upload_timeout: Duration::from_secs(2),
        ..Default::default()
    };
    ScoreTracker::new(config).expect("tracker must build against a mock backend")
}

async fn wait_until(description: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {description}");
}

#[tokio::test]
async fn full_lifecycle_upload_poll_complete_fetch_result() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/music/upload_sheetmusic"))
        .and(query_param("output_format", "mp3"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"task_id": "T1", "status": "queued"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    // First poll sees processing, later polls see completed
    Mock::given(method("GET"))
        .and(path("/status/T1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"task_id": "T1", "status": "processing"})),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/status/T1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"task_id": "T1", "status": "completed"})),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/results/T1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "final_status": "completed",
            "detailed_results": {
                "generated_music_file": {"url": "https://cdn.example/T1.mp3"},
                "shakespearean_translation": {"translated": "What light through yonder measure breaks"},
                "analysis_summary": {"measures": 48, "key": "C# minor"}
            },
            "processing_time_seconds": 21.7
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tracker = tracker_for(&server);
    tracker.start();

    tracker.stage("moonlight.pdf", b"fake score".to_vec());
    let id = tracker
        .upload_staged(SubmitOptions {
            output_format: Some("mp3".to_string()),
            translate_shakespearean: None,
        })
        .await
        .expect("upload must succeed");

    {
        let record = tracker.task(&id).expect("record must exist");
        assert_eq!(record.status, Status::Queued);
        assert_eq!(record.upload_progress, 100);
        assert!(record.server_task_id.is_some());
    }

    let probe = tracker.clone();
    let probe_id = id.clone();
    wait_until("task to complete with a detailed result", move || {
        probe
            .task(&probe_id)
            .is_some_and(|r| r.status == Status::Completed && r.result.is_some())
    })
    .await;

    let record = tracker.task(&id).expect("record must exist");
    let result = record.result.expect("detail payload must be stored");
    assert_eq!(result.processing_time_seconds, Some(21.7));
    assert_eq!(
        result.detailed_results["generated_music_file"]["url"],
        "https://cdn.example/T1.mp3"
    );
    assert_eq!(result.detailed_results["analysis_summary"]["measures"], 48);

    tracker.shutdown();
}

#[tokio::test]
async fn poll_failure_is_isolated_and_permanent() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/music/upload_sheetmusic"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"task_id": "flaky", "status": "queued"})),
        )
        .mount(&server)
        .await;

    // Every status poll for this task fails; it must be polled exactly once
    Mock::given(method("GET"))
        .and(path("/status/flaky"))
        .respond_with(ResponseTemplate::new(500).set_body_string("status backend down"))
        .expect(1)
        .mount(&server)
        .await;

    let tracker = tracker_for(&server);
    tracker.start();

    tracker.stage("etude.pdf", vec![0u8; 16]);
    let id = tracker
        .upload_staged(SubmitOptions::default())
        .await
        .expect("upload must succeed");

    let probe = tracker.clone();
    let probe_id = id.clone();
    wait_until("poll failure to be recorded", move || {
        probe
            .task(&probe_id)
            .is_some_and(|r| r.status == Status::PollingError)
    })
    .await;

    // Let several more intervals elapse; the expect(1) above verifies no
    // further polls happen for the errored task
    tokio::time::sleep(Duration::from_millis(300)).await;

    let record = tracker.task(&id).expect("record must exist");
    assert_eq!(record.status, Status::PollingError);
    assert!(
        record
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("status backend down"),
        "the poll failure body must be recorded on the record"
    );

    tracker.shutdown();
}

#[tokio::test]
async fn status_404_transitions_to_not_found_and_stops_polling() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/music/upload_sheetmusic"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"task_id": "ghost", "status": "queued"})),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/status/ghost"))
        .respond_with(ResponseTemplate::new(404).set_body_string("unknown task"))
        .expect(1)
        .mount(&server)
        .await;

    let tracker = tracker_for(&server);
    tracker.start();

    tracker.stage("vanished.pdf", vec![1, 2, 3]);
    let id = tracker
        .upload_staged(SubmitOptions::default())
        .await
        .expect("upload must succeed");

    let probe = tracker.clone();
    let probe_id = id.clone();
    wait_until("not_found anomaly to be recorded", move || {
        probe
            .task(&probe_id)
            .is_some_and(|r| r.status == Status::NotFound)
    })
    .await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    let record = tracker.task(&id).expect("record must exist");
    assert_eq!(record.status, Status::NotFound);
    assert!(record.error.is_some(), "the anomaly must be explicit");

    tracker.shutdown();
}
