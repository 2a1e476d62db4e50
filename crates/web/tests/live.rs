//! Live channel over a real socket

#![cfg(unix)]

use std::path::Path;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;

use testdeck_common::AppConfig;
use testdeck_web::WebServer;

fn config(root: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.paths.project_root = root.to_path_buf();
    config.paths.tests_dir = root.join("tests");
    config.paths.flows_file = root.join("temp/flows.json");
    config.runner.playwright_command = vec!["sh".into(), "{file}".into()];
    config.runner.write_run_logs = false;
    config
}

fn slow_script(root: &Path) -> std::path::PathBuf {
    let marker = root.join("finished.marker");
    let script = format!(
        "echo started\nsleep 1\necho finished\ntouch '{}'\n",
        marker.display()
    );
    std::fs::create_dir_all(root.join("tests/unit")).unwrap();
    std::fs::write(root.join("tests/unit/slow.test.js"), script).unwrap();
    marker
}

async fn start(root: &Path) -> String {
    let router = WebServer::new(config(root)).unwrap().router();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("ws://{}/ws", addr)
}

fn event(msg: &Message) -> Option<Value> {
    match msg {
        Message::Text(text) => serde_json::from_str(text).ok(),
        _ => None,
    }
}

#[tokio::test]
async fn run_streams_logs_then_status() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(tmp.path().join("tests")).unwrap();
    std::fs::write(tmp.path().join("tests/quick.test.js"), "echo hello\nexit 2\n").unwrap();
    let url = start(tmp.path()).await;

    let (mut socket, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
    let run = json!({"event": "run-test", "data": {"filePath": "quick.test.js"}});
    socket.send(Message::Text(run.to_string())).await.unwrap();

    let mut events = Vec::new();
    while let Ok(Some(Ok(msg))) = tokio::time::timeout(Duration::from_secs(5), socket.next()).await {
        if let Some(value) = event(&msg) {
            let done = value["event"] == "test-status";
            events.push(value);
            if done {
                break;
            }
        }
    }
    assert_eq!(events[0]["event"], "test-log");
    assert_eq!(events[0]["data"]["message"], "hello");
    let last = events.last().unwrap();
    assert_eq!(last["data"]["status"], "failed");
    assert_eq!(last["data"]["code"], 2);
}

#[tokio::test]
async fn closing_the_socket_kills_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let marker = slow_script(tmp.path());
    let url = start(tmp.path()).await;

    let (mut socket, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
    let run = json!({"event": "run-test", "data": {"filePath": "unit/slow.test.js"}});
    socket.send(Message::Text(run.to_string())).await.unwrap();

    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if event(&msg).map(|v| v["data"]["message"] == "started").unwrap_or(false) {
            break;
        }
    }

    socket.close(None).await.unwrap();
    while let Ok(Some(Ok(msg))) = tokio::time::timeout(Duration::from_secs(3), socket.next()).await {
        if let Some(value) = event(&msg) {
            assert_ne!(value["data"]["message"], "finished");
        }
    }

    tokio::time::sleep(Duration::from_millis(2000)).await;
    assert!(!marker.exists());
}

#[tokio::test]
async fn cancel_event_stops_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let marker = slow_script(tmp.path());
    let url = start(tmp.path()).await;

    let (mut socket, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
    let run = json!({"event": "run-test", "data": {"filePath": "unit/slow.test.js"}});
    socket.send(Message::Text(run.to_string())).await.unwrap();

    let mut cancelled = false;
    let mut status = None;
    while let Ok(Some(Ok(msg))) = tokio::time::timeout(Duration::from_secs(5), socket.next()).await {
        let Some(value) = event(&msg) else { continue };
        if value["data"]["message"] == "started" && !cancelled {
            socket
                .send(Message::Text(json!({"event": "cancel-test"}).to_string()))
                .await
                .unwrap();
            cancelled = true;
        }
        assert_ne!(value["data"]["message"], "finished");
        if value["event"] == "test-status" {
            status = Some(value);
            break;
        }
    }

    let status = status.unwrap();
    assert_eq!(status["data"]["status"], "error");
    assert_eq!(status["data"]["message"], "Test run aborted");
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!marker.exists());
}
