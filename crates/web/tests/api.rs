//! Router tests against a throwaway project directory

use std::path::Path;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use testdeck_common::AppConfig;
use testdeck_web::WebServer;

fn config(root: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.paths.project_root = root.to_path_buf();
    config.paths.tests_dir = root.join("tests");
    config.paths.performance_dir = root.join("tests/performance");
    config.paths.k6_dirs = vec![root.join("k6")];
    config.paths.test_results_dir = root.join("test-results");
    config.paths.results_dir = root.join("results");
    config.paths.visual_dir = root.join("visual-tests");
    config.paths.flows_file = root.join("temp/flows.json");
    config.runner.playwright_command = vec!["sh".into(), "{file}".into()];
    config.runner.k6_command = vec!["sh".into(), "{file}".into(), "{output}".into()];
    config.runner.write_run_logs = false;
    config
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn project() -> (TempDir, Router) {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "tests/e2e/login.spec.js", "echo login\n");
    write(
        tmp.path(),
        "tests/unit/math.test.js",
        "echo running math\necho '{\"passed\":5,\"failed\":0}'\n",
    );
    write(tmp.path(), "tests/node_modules/pkg/fake.test.js", "exit 0\n");
    let router = WebServer::new(config(tmp.path())).unwrap().router();
    (tmp, router)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(body) => {
            request = request.header("content-type", "application/json");
            Body::from(body.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn health_reports_service() {
    let (_tmp, app) = project();
    let (status, body) = call(&app, "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "testdeck-web");
}

#[tokio::test]
async fn lists_tests_grouped_by_category() {
    let (_tmp, app) = project();
    let (status, body) = call(&app, "GET", "/api/tests", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["totalTests"], 2);
    assert_eq!(body["categories"], json!(["e2e", "unit"]));

    let tests = body["tests"].as_array().unwrap();
    assert_eq!(tests[0]["path"], "e2e/login.spec.js");
    assert_eq!(tests[0]["type"], "e2e");
    assert_eq!(tests[1]["path"], "unit/math.test.js");
    assert_eq!(tests[1]["type"], "unit");
    assert_eq!(body["testsByCategory"]["unit"][0]["path"], "unit/math.test.js");
}

#[tokio::test]
async fn filters_tests_by_type_and_category() {
    let (_tmp, app) = project();
    let (_, body) = call(&app, "GET", "/api/tests?type=unit", None).await;
    assert_eq!(body["totalTests"], 1);
    assert_eq!(body["tests"][0]["category"], "unit");

    let (_, body) = call(&app, "GET", "/api/tests?category=e2e", None).await;
    assert_eq!(body["totalTests"], 1);
    assert_eq!(body["tests"][0]["path"], "e2e/login.spec.js");

    let (status, body) = call(&app, "GET", "/api/tests?type=bogus", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn run_requires_test_path() {
    let (_tmp, app) = project();
    let (status, body) = call(&app, "POST", "/api/tests/run", Some(json!({"env": "qa"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "testPath is required");
}

#[tokio::test]
async fn run_of_missing_file_lists_searched_locations() {
    let tmp = tempfile::tempdir().unwrap();
    let app = WebServer::new(config(tmp.path())).unwrap().router();
    let (status, body) = call(
        &app,
        "POST",
        "/api/tests/run",
        Some(json!({"testPath": "unit/math.test.js", "env": "qa"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Test file not found: unit/math.test.js");
    assert_eq!(body["searchedLocations"].as_array().unwrap().len(), 4);
}

#[cfg(unix)]
#[tokio::test]
async fn run_returns_trailing_json_results() {
    let (_tmp, app) = project();
    let (status, body) = call(
        &app,
        "POST",
        "/api/tests/run",
        Some(json!({"testPath": "unit/math.test.js", "env": "qa"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["results"], json!({"passed": 5, "failed": 0}));
    assert!(body["output"].as_str().unwrap().contains("running math"));
    assert_eq!(body["error"], Value::Null);
    assert_eq!(body["exitCode"], 0);
}

#[cfg(unix)]
#[tokio::test]
async fn run_envelope_links_to_stored_log() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "tests/unit/math.test.js", "echo '{\"passed\":5}'\n");
    let mut cfg = config(tmp.path());
    cfg.runner.write_run_logs = true;
    let app = WebServer::new(cfg).unwrap().router();

    let (status, body) = call(
        &app,
        "POST",
        "/api/tests/run",
        Some(json!({"testPath": "unit/math.test.js"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let run_id = body["runId"].as_str().unwrap().to_string();

    let (status, stored) = call(&app, "GET", &format!("/api/tests/results/{}", run_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["run"]["runId"], run_id.as_str());
    assert_eq!(stored["run"]["parsedResults"]["passed"], 5);
}

#[cfg(unix)]
#[tokio::test]
async fn failed_run_is_500_with_output() {
    let (tmp, app) = project();
    write(tmp.path(), "tests/unit/broken.test.js", "echo nope >&2\nexit 3\n");
    let (status, body) = call(
        &app,
        "POST",
        "/api/tests/run",
        Some(json!({"testPath": "unit/broken.test.js"})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Test run failed with exit code 3");
    assert!(body["details"].as_str().unwrap().contains("nope"));
    assert_eq!(body["exitCode"], 3);
}

#[cfg(unix)]
#[tokio::test]
async fn concurrent_runs_of_same_path_are_independent() {
    let (_tmp, app) = project();
    let request = json!({"testPath": "unit/math.test.js"});
    let (a, b) = tokio::join!(
        call(&app, "POST", "/api/tests/run", Some(request.clone())),
        call(&app, "POST", "/api/tests/run", Some(request.clone())),
    );
    assert_eq!(a.0, StatusCode::OK);
    assert_eq!(b.0, StatusCode::OK);
    assert_eq!(a.1["results"]["passed"], 5);
    assert_eq!(b.1["results"]["passed"], 5);
}

#[tokio::test]
async fn flows_crud() {
    let (_tmp, app) = project();

    let (status, created) = call(&app, "POST", "/flows", Some(json!({"name": "login"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["flow"]["id"].as_str().unwrap().to_string();
    let created_at = created["flow"]["createdAt"].clone();

    let (_, listed) = call(&app, "GET", "/flows", None).await;
    assert_eq!(listed["total"], 1);

    let uri = format!("/flows/{}", id);
    let (status, updated) = call(&app, "PUT", &uri, Some(json!({"name": "checkout"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["flow"]["name"], "checkout");
    assert_eq!(updated["flow"]["id"], id.as_str());
    assert_eq!(updated["flow"]["createdAt"], created_at);

    let (status, _) = call(&app, "POST", "/flows", Some(json!(["not", "an", "object"]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = call(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn flows_persist_across_restarts() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = config(tmp.path());
    cfg.store.persist_flows = true;

    let app = WebServer::new(cfg.clone()).unwrap().router();
    let (_, created) = call(&app, "POST", "/flows", Some(json!({"name": "saved"}))).await;
    let id = created["flow"]["id"].as_str().unwrap().to_string();

    let app = WebServer::new(cfg).unwrap().router();
    let (status, body) = call(&app, "GET", &format!("/flows/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["flow"]["name"], "saved");
}

#[tokio::test]
async fn behavior_tracking_and_summary() {
    let (_tmp, app) = project();

    let (status, body) = call(
        &app,
        "POST",
        "/api/behavior/track",
        Some(json!({
            "sessionId": "s1",
            "events": [{"type": "click", "target": "#login"}, {"type": "scroll"}]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["eventCount"], 2);
    assert_eq!(body["active"], true);

    let (_, body) = call(
        &app,
        "POST",
        "/api/behavior/track",
        Some(json!({"sessionId": "s1", "events": [{"type": "click"}], "ended": true})),
    )
    .await;
    assert_eq!(body["eventCount"], 3);
    assert_eq!(body["active"], false);

    let (_, summary) = call(&app, "GET", "/api/behavior/summary", None).await;
    assert_eq!(summary["totalSessions"], 1);
    assert_eq!(summary["activeSessions"], 0);
    assert_eq!(summary["totalEvents"], 3);
    assert_eq!(summary["eventsByType"]["click"], 2);

    let (status, _) = call(&app, "GET", "/api/behavior/sessions/s1", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, "GET", "/api/behavior/sessions/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, "POST", "/api/behavior/track", Some(json!({"events": []}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn jira_without_config_is_unavailable() {
    let (_tmp, app) = project();
    let (status, body) = call(&app, "GET", "/api/jira/projects", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Jira is not configured");
}

#[tokio::test]
async fn keyboard_catalogue_has_six_checks() {
    let (_tmp, app) = project();
    let (status, body) = call(&app, "GET", "/api/keyboard-tests", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tests"].as_array().unwrap().len(), 6);

    let (status, _) = call(
        &app,
        "POST",
        "/api/keyboard-tests/run",
        Some(json!({"testId": "tab-navigation"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_route_is_json_404() {
    let (_tmp, app) = project();
    let (status, body) = call(&app, "GET", "/api/nothing-here", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[cfg(unix)]
#[tokio::test]
async fn dropped_run_request_kills_the_script() {
    let (tmp, app) = project();
    let marker = tmp.path().join("finished.marker");
    write(
        tmp.path(),
        "tests/unit/slow.test.js",
        &format!("echo started\nsleep 1\ntouch '{}'\n", marker.display()),
    );

    let request = Request::builder()
        .method("POST")
        .uri("/api/tests/run")
        .header("content-type", "application/json")
        .body(Body::from(json!({"testPath": "unit/slow.test.js"}).to_string()))
        .unwrap();
    let pending = tokio::time::timeout(
        std::time::Duration::from_millis(300),
        app.clone().oneshot(request),
    )
    .await;
    assert!(pending.is_err());

    tokio::time::sleep(std::time::Duration::from_millis(2000)).await;
    assert!(!marker.exists());
}
