use std::io::Write;
use std::time::{Duration, Instant};

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tryon_pipeline::{
    CancellationToken, Config, ImageRef, Phase, TryOnError, TryOnPipeline, TryOnRequest,
    WorkflowState,
};

fn test_config(base_url: &str) -> Config {
    Config {
        api_key: "test-key".to_string(),
        api_base_url: base_url.to_string(),
        retry_base_delay_ms: 50,
        poll_interval_ms: 25,
        poll_request_timeout_ms: 1000,
        max_wait_time_ms: 2000,
        http_timeout_secs: 5,
        mock_delay_ms: 50,
        ..Config::default()
    }
}

/// Local source image on disk; the temp file must outlive the request.
fn local_source_image() -> (tempfile::NamedTempFile, ImageRef) {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 1, 2, 3, 4])
        .unwrap();
    let reference = ImageRef::new(file.path().to_string_lossy().to_string());
    (file, reference)
}

fn request_with_source(source: ImageRef) -> TryOnRequest {
    let mut request = TryOnRequest::new(
        source,
        vec![ImageRef::new("https://cdn.example.com/jacket.jpg")],
    );
    request.prompt_text = Some("an oversized denim jacket over black jeans".to_string());
    request
}

fn phases(states: &[WorkflowState]) -> Vec<Phase> {
    states.iter().map(|s| s.phase).collect()
}

fn assert_progress_non_decreasing(states: &[WorkflowState]) {
    let progress: Vec<u8> = states.iter().map(|s| s.progress).collect();
    for window in progress.windows(2) {
        assert!(
            window[1] >= window[0],
            "progress went backwards: {progress:?}"
        );
    }
}

#[tokio::test]
async fn empty_credential_serves_mock_result_without_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let config = Config {
        api_key: String::new(),
        ..test_config(&server.uri())
    };
    let placeholder = config.placeholder_image_url.clone();
    let pipeline = TryOnPipeline::new(config);
    let (_file, source) = local_source_image();

    let mut states: Vec<WorkflowState> = Vec::new();
    let started = Instant::now();
    let result = pipeline
        .run(request_with_source(source), |state| {
            states.push(state.clone())
        })
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(result.generated_image_url, placeholder);
    assert!(result.metadata.mock);
    assert_eq!(states.last().unwrap().phase, Phase::Completed);
    assert_eq!(states.last().unwrap().progress, 100);
}

#[tokio::test]
async fn happy_path_polls_to_ready_and_returns_the_remote_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/flux-kontext-pro"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "abc123" })))
        .expect(1)
        .mount(&server)
        .await;
    // First two polls report processing, the third is terminal.
    Mock::given(method("GET"))
        .and(path("/get_result"))
        .and(query_param("id", "abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "Processing" })))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/get_result"))
        .and(query_param("id", "abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "Ready",
            "result": { "sample": "https://x/y.jpg" }
        })))
        .mount(&server)
        .await;

    let pipeline = TryOnPipeline::new(test_config(&server.uri()));
    let (_file, source) = local_source_image();

    let mut states: Vec<WorkflowState> = Vec::new();
    let result = pipeline
        .run(request_with_source(source), |state| {
            states.push(state.clone())
        })
        .await
        .unwrap();

    assert_eq!(result.generated_image_url, "https://x/y.jpg");
    assert!(!result.metadata.mock);
    assert!(result.metadata.prompt_used.contains("denim jacket"));

    let phases = phases(&states);
    assert_eq!(phases[0], Phase::InputAnalysis);
    assert_eq!(phases[1], Phase::AiStyling);
    let transmission_events = phases
        .iter()
        .filter(|p| **p == Phase::ApiTransmission)
        .count();
    // One boundary event plus one per poll tick (two processing, one ready).
    assert_eq!(transmission_events, 4);
    assert_eq!(phases[phases.len() - 2], Phase::OutputDelivery);
    assert_eq!(*phases.last().unwrap(), Phase::Completed);

    assert_progress_non_decreasing(&states);
    assert_eq!(states.last().unwrap().progress, 100);
}

#[tokio::test]
async fn server_errors_use_all_three_attempts_with_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/flux-kontext-pro"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({ "detail": "upstream exploded" })),
        )
        .expect(3)
        .mount(&server)
        .await;

    let pipeline = TryOnPipeline::new(test_config(&server.uri()));
    let (_file, source) = local_source_image();

    let mut states: Vec<WorkflowState> = Vec::new();
    let started = Instant::now();
    let err = pipeline
        .run(request_with_source(source), |state| {
            states.push(state.clone())
        })
        .await
        .unwrap_err();

    // Backoff before attempts 2 and 3: 50 ms + 100 ms.
    assert!(started.elapsed() >= Duration::from_millis(150));
    assert!(matches!(err, TryOnError::Server { status: 500, .. }));
    let last = states.last().unwrap();
    assert_eq!(last.phase, Phase::Error);
    assert_eq!(last.progress, 0);
}

#[tokio::test]
async fn authentication_failure_is_terminal_after_one_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/flux-kontext-pro"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "detail": "invalid api key" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = TryOnPipeline::new(test_config(&server.uri()));
    let (_file, source) = local_source_image();

    let err = pipeline
        .run(request_with_source(source), |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, TryOnError::Authentication { status: 401, .. }));
}

#[tokio::test]
async fn connection_failures_surface_as_network_errors_after_retries() {
    // Bind then drop a listener so the port refuses connections.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let pipeline = TryOnPipeline::new(test_config(&format!("http://127.0.0.1:{port}")));
    let (_file, source) = local_source_image();

    let started = Instant::now();
    let err = pipeline
        .run(request_with_source(source), |_| {})
        .await
        .unwrap_err();

    assert!(matches!(err, TryOnError::Network(_)));
    // Proof all three attempts ran: backoff alone is 50 + 100 ms.
    assert!(started.elapsed() >= Duration::from_millis(150));
}

#[tokio::test]
async fn failed_job_carries_the_remote_error_detail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/flux-kontext-pro"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "job-err" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/get_result"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "Error",
            "result": { "error": "content moderated" }
        })))
        .mount(&server)
        .await;

    let pipeline = TryOnPipeline::new(test_config(&server.uri()));
    let (_file, source) = local_source_image();

    let err = pipeline
        .run(request_with_source(source), |_| {})
        .await
        .unwrap_err();
    match err {
        TryOnError::JobFailed(detail) => assert_eq!(detail, "content moderated"),
        other => panic!("expected JobFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn polling_stops_at_the_wait_budget_with_a_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/flux-kontext-pro"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "job-stuck" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/get_result"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "Processing" })))
        .mount(&server)
        .await;

    let config = Config {
        max_wait_time_ms: 300,
        poll_interval_ms: 50,
        ..test_config(&server.uri())
    };
    let pipeline = TryOnPipeline::new(config);
    let (_file, source) = local_source_image();

    let err = pipeline
        .run(request_with_source(source), |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, TryOnError::ProcessingTimeout { .. }));

    // No poll is ever issued after the budget elapses.
    let polls = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/get_result")
        .count();
    assert!(polls <= 6, "saw {polls} polls for a 300 ms budget");
}

#[tokio::test]
async fn cancellation_aborts_an_in_flight_poll() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/flux-kontext-pro"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "job-slow" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/get_result"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "Processing" })))
        .mount(&server)
        .await;

    let pipeline = TryOnPipeline::new(test_config(&server.uri()));
    let (_file, source) = local_source_image();
    let cancel = CancellationToken::new();

    let task = {
        let pipeline = pipeline.clone();
        let cancel = cancel.clone();
        let request = request_with_source(source);
        tokio::spawn(async move { pipeline.run_cancellable(request, |_| {}, cancel).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    let started = Instant::now();
    cancel.cancel();

    let result = task.await.unwrap();
    assert!(matches!(result, Err(TryOnError::Cancelled)));
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn ready_without_an_image_url_substitutes_the_placeholder() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/flux-kontext-pro"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "job-bare" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/get_result"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "status": "Ready", "result": {} })),
        )
        .mount(&server)
        .await;

    let config = test_config(&server.uri());
    let placeholder = config.placeholder_image_url.clone();
    let pipeline = TryOnPipeline::new(config);
    let (_file, source) = local_source_image();

    let result = pipeline
        .run(request_with_source(source), |_| {})
        .await
        .unwrap();
    assert_eq!(result.generated_image_url, placeholder);
}

#[tokio::test]
async fn unreachable_remote_source_degrades_to_standalone_generation() {
    let server = MockServer::start().await;
    // The source image download 404s, which is not retryable.
    Mock::given(method("GET"))
        .and(path("/me.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/flux-pro-1.1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "job-text" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/get_result"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "completed",
            "result": { "sample": "https://x/standalone.jpg" }
        })))
        .mount(&server)
        .await;

    let pipeline = TryOnPipeline::new(test_config(&server.uri()));
    let source = ImageRef::new(format!("{}/me.jpg", server.uri()));

    let result = pipeline
        .run(request_with_source(source), |_| {})
        .await
        .unwrap();
    assert_eq!(result.generated_image_url, "https://x/standalone.jpg");
}
