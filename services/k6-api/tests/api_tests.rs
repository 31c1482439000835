//! Router tests for the k6 API, driving the fake engine end to end.

#![cfg(unix)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use k6_api::error::{EXECUTION_FAILED_MESSAGE, INTERNAL_ERROR_MESSAGE};
use k6_api::runner::{RunnerConfig, TestRunner, MISSING_REPORT_MESSAGE};
use k6_api::server::build_router;
use k6_api::state::AppState;
use k6_script::{ScriptGenerator, StaticTemplates, TemplateDir};
use test_utils::fixtures::requests;
use test_utils::{
    bundled_templates_dir, extract_js_string_const, files_with_prefix, temp_test_dir,
    EngineBehavior, FakeEngine,
};

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    engine: FakeEngine,
    _work: tempfile::TempDir,
}

impl TestApp {
    fn with_generator(behavior: EngineBehavior, generator: ScriptGenerator) -> Self {
        Self::build(behavior, generator, 2)
    }

    fn with_run_limit(behavior: EngineBehavior, max_concurrent_runs: usize) -> Self {
        Self::build(
            behavior,
            ScriptGenerator::with_builtin_template(),
            max_concurrent_runs,
        )
    }

    fn build(
        behavior: EngineBehavior,
        generator: ScriptGenerator,
        max_concurrent_runs: usize,
    ) -> Self {
        let engine = FakeEngine::install(behavior);
        let work = temp_test_dir();
        let config = RunnerConfig {
            k6_binary: engine.program(),
            run_args: engine.args(),
            script_dir: work.path().join("scripts"),
            reports_dir: work.path().join("reports"),
            timeout_grace: Some(Duration::from_secs(30)),
        }
        .prepare()
        .unwrap();

        let state = Arc::new(AppState::new(
            generator,
            TestRunner::new(config),
            max_concurrent_runs,
        ));
        Self {
            router: build_router(state.clone()),
            state,
            engine,
            _work: work,
        }
    }

    fn new(behavior: EngineBehavior) -> Self {
        Self::with_generator(behavior, ScriptGenerator::with_builtin_template())
    }

    fn script_dir(&self) -> &Path {
        &self.state.runner.config().script_dir
    }

    async fn post_run(&self, body: &str) -> (StatusCode, header::HeaderMap, Vec<u8>) {
        send(&self.router, run_request(body)).await
    }

    async fn get(&self, uri: &str) -> (StatusCode, header::HeaderMap, Vec<u8>) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        send(&self.router, request).await
    }
}

fn run_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/k6/run")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, header::HeaderMap, Vec<u8>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
    (status, headers, body)
}

fn error_message(body: &[u8]) -> String {
    let json: Value = serde_json::from_slice(body).unwrap();
    json["error"].as_str().unwrap().to_string()
}

fn script_line<'a>(script: &'a str, prefix: &str) -> &'a str {
    script
        .lines()
        .find(|line| line.starts_with(prefix))
        .unwrap_or_else(|| panic!("no line starting with {:?}", prefix))
}

#[tokio::test]
async fn test_get_run_returns_report_written_by_engine() {
    let app = TestApp::new(EngineBehavior::EchoScriptAsReport);

    let (status, headers, body) = app.post_run(requests::GET_10_VUS).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "text/html");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"k6-report.html\""
    );

    // The fake engine echoes the script, so the report is the generated text.
    let script = String::from_utf8(body).unwrap();
    assert!(script.contains("GET"));
    assert!(script.contains("https://example.com/a"));
    assert!(script.contains("vus: 10,"));
    assert!(script.contains("duration: '30s',"));

    assert_eq!(app.engine.invocations().len(), 1);
    assert!(files_with_prefix(app.script_dir(), "k6-script-").is_empty());
}

#[tokio::test]
async fn test_header_value_survives_escaping() {
    let app = TestApp::new(EngineBehavior::EchoScriptAsReport);
    let request = r#"{
        "url": "https://example.com/a",
        "method": "GET",
        "headers": {"X-Name": "a\"b\\c"},
        "virtualUsers": 10,
        "duration": "30s"
    }"#;

    let (status, _, body) = app.post_run(request).await;
    assert_eq!(status, StatusCode::OK);

    let script = String::from_utf8(body).unwrap();
    let prefix = "const HEADERS = JSON.parse(";
    let headers_json =
        extract_js_string_const(script_line(&script, prefix), prefix).unwrap();
    let headers: Value = serde_json::from_str(&headers_json).unwrap();
    assert_eq!(headers["X-Name"], "a\"b\\c");
}

#[tokio::test]
async fn test_too_many_vus_is_rejected_before_launch() {
    let app = TestApp::new(EngineBehavior::EchoScriptAsReport);

    let (status, _, body) = app.post_run(requests::TOO_MANY_VUS).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_message(&body).contains("vus"));
    assert!(app.engine.invocations().is_empty());
    assert!(files_with_prefix(app.script_dir(), "k6-script-").is_empty());
    assert_eq!(app.state.tracker.get_status().total_completed, 0);
}

#[tokio::test]
async fn test_engine_failure_returns_opaque_500() {
    let app = TestApp::new(EngineBehavior::Fail {
        code: 1,
        stderr: "connection refused".into(),
    });

    let (status, _, body) = app.post_run(requests::POST_WITH_BODY).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let text = String::from_utf8(body.clone()).unwrap();
    assert!(!text.contains("secret-token"));
    assert!(!text.contains("connection refused"));
    assert_eq!(error_message(&body), EXECUTION_FAILED_MESSAGE);

    assert_eq!(app.engine.invocations().len(), 1);
    assert!(files_with_prefix(app.script_dir(), "k6-script-").is_empty());
}

#[tokio::test]
async fn test_missing_report_returns_fallback_text() {
    let app = TestApp::new(EngineBehavior::SkipReport);

    let (status, headers, body) = app.post_run(requests::MINIMAL_GET).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "text/plain; charset=utf-8");
    assert!(headers.get(header::CONTENT_DISPOSITION).is_none());
    assert_eq!(body, MISSING_REPORT_MESSAGE.as_bytes());
}

#[tokio::test]
async fn test_malformed_body_is_400_with_detail() {
    let app = TestApp::new(EngineBehavior::EchoScriptAsReport);

    let (status, _, body) = app.post_run(requests::MALFORMED_BODY).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_message(&body).contains("not valid JSON"));
    assert!(app.engine.invocations().is_empty());
}

#[tokio::test]
async fn test_unsupported_method_is_400() {
    let app = TestApp::new(EngineBehavior::EchoScriptAsReport);

    let (status, _, body) = app.post_run(requests::UNSUPPORTED_METHOD).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!error_message(&body).is_empty());
    assert!(app.engine.invocations().is_empty());
}

#[tokio::test]
async fn test_invalid_json_is_400() {
    let app = TestApp::new(EngineBehavior::EchoScriptAsReport);

    let (status, _, body) = app.post_run("{\"url\": ").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!error_message(&body).is_empty());
}

#[tokio::test]
async fn test_missing_template_returns_opaque_500() {
    let generator = ScriptGenerator::new(Arc::new(StaticTemplates::new()), "absent.js.hbs");
    let app = TestApp::with_generator(EngineBehavior::EchoScriptAsReport, generator);

    let (status, _, body) = app.post_run(requests::MINIMAL_GET).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_message(&body), INTERNAL_ERROR_MESSAGE);
    assert!(app.engine.invocations().is_empty());
}

#[tokio::test]
async fn test_template_directory_matches_bundled_template() {
    let generator = ScriptGenerator::new(
        Arc::new(TemplateDir::new(bundled_templates_dir())),
        k6_script::DEFAULT_TEMPLATE_NAME,
    );
    let app = TestApp::with_generator(EngineBehavior::EchoScriptAsReport, generator);

    let (status, _, body) = app.post_run(requests::MINIMAL_GET).await;

    assert_eq!(status, StatusCode::OK);
    let script = String::from_utf8(body).unwrap();
    assert!(script.contains("handleSummary"));
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new(EngineBehavior::SkipReport);

    let (status, _, body) = app.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "k6-api");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_status_and_metrics_reflect_runs() {
    let app = TestApp::new(EngineBehavior::SkipReport);
    let request = r#"{"url": "https://user:pw@example.com/a?token=secret", "method": "GET"}"#;

    let (status, _, _) = app.post_run(request).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = app.get("/status").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["total_completed"], 1);
    assert_eq!(json["active"].as_array().unwrap().len(), 0);
    let recent = &json["recent"][0];
    assert_eq!(recent["outcome"], "report_missing");
    assert_eq!(recent["method"], "GET");
    assert_eq!(recent["target"], "https://example.com/a");

    let (status, _, body) = app.get("/metrics").await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("k6_runs_started_total 1\n"));
    assert!(text.contains("k6_runs_completed_total{outcome=\"report_missing\"} 1\n"));
    let in_flight = text
        .lines()
        .find_map(|line| line.strip_prefix("k6_runs_in_flight "))
        .map(|value| value.trim().parse::<f64>().unwrap());
    assert_eq!(in_flight, Some(0.0));
}

#[tokio::test]
async fn test_oversized_duration_is_400() {
    let app = TestApp::new(EngineBehavior::EchoScriptAsReport);
    let request =
        r#"{"url": "https://example.com/a", "method": "GET", "duration": "5124095576030431h"}"#;

    let (status, _, body) = app.post_run(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_message(&body).contains("duration"));
    assert!(app.engine.invocations().is_empty());
}

#[tokio::test]
async fn test_json_body_keeps_caller_key_order() {
    let app = TestApp::new(EngineBehavior::EchoScriptAsReport);

    let (status, _, body) = app.post_run(requests::POST_WITH_BODY).await;
    assert_eq!(status, StatusCode::OK);

    let script = String::from_utf8(body).unwrap();
    let prefix = "const PAYLOAD = true ? ";
    let payload = extract_js_string_const(script_line(&script, prefix), prefix).unwrap();
    assert_eq!(payload, r#"{"name":"John","age":30}"#);
}

#[tokio::test]
async fn test_runs_beyond_limit_wait_for_a_slot() {
    let app = TestApp::with_run_limit(EngineBehavior::Sleep { secs: 1 }, 1);
    let request = r#"{"url": "https://example.com/a", "method": "GET", "duration": "1s"}"#;

    let first = tokio::spawn({
        let router = app.router.clone();
        async move { send(&router, run_request(request)).await }
    });
    let second = tokio::spawn({
        let router = app.router.clone();
        async move { send(&router, run_request(request)).await }
    });

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(app.engine.invocations().len(), 1);
    assert_eq!(app.state.tracker.in_flight(), 1);

    let (first_status, _, _) = first.await.unwrap();
    let (second_status, _, _) = second.await.unwrap();
    assert_eq!(first_status, StatusCode::OK);
    assert_eq!(second_status, StatusCode::OK);
    assert_eq!(app.engine.invocations().len(), 2);
    assert_eq!(app.state.tracker.get_status().total_completed, 2);
}

#[tokio::test]
async fn test_shutdown_rejects_new_runs() {
    let app = TestApp::new(EngineBehavior::EchoScriptAsReport);
    app.state.begin_shutdown();

    let (status, _, body) = app.post_run(requests::MINIMAL_GET).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(error_message(&body), "Server is shutting down");
    assert!(app.engine.invocations().is_empty());
}

#[tokio::test]
async fn test_api_definition() {
    let app = TestApp::new(EngineBehavior::SkipReport);

    let (status, headers, body) = app.get("/api").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/yaml");
    let text = String::from_utf8(body).unwrap();
    assert!(text.starts_with("openapi: 3.0"));
    assert!(text.contains("/k6/run:"));
}
