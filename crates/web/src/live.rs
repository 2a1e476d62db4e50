//! Live run channel over WebSocket
//!
//! Client frames: `{"event":"run-test","data":{"filePath":..,"env":..}}` and
//! `{"event":"cancel-test"}`. Server frames: `test-log` for every output line
//! while a run is going, then exactly one `test-status`. One run at a time per
//! connection; closing the socket cancels the run.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use testdeck_common::RunStatus;
use testdeck_runner::{LogLine, LogStream, RunRequest};

use crate::server::AppState;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    RunTest {
        file_path: String,
        #[serde(default)]
        env: Option<String>,
    },
    CancelTest,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    TestLog {
        #[serde(rename = "type")]
        kind: &'static str,
        message: String,
        stream: LogStream,
    },
    TestStatus {
        status: RunStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<i32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        results: Option<serde_json::Value>,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    fn log(line: LogLine) -> Self {
        ServerEvent::TestLog {
            kind: "log",
            message: line.message,
            stream: line.stream,
        }
    }

    fn error_status(message: impl Into<String>, code: Option<i32>) -> Self {
        ServerEvent::TestStatus {
            status: RunStatus::Error,
            code,
            message: Some(message.into()),
            results: None,
        }
    }
}

pub type EventSink = mpsc::UnboundedSender<ServerEvent>;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: Arc<AppState>, socket: WebSocket) {
    let (mut ws_write, mut ws_read) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerEvent>();

    let writer = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Dropping unserializable live event: {}", e);
                    continue;
                }
            };
            if ws_write.send(Message::Text(text)).await.is_err() {
                debug!("Live channel closed while sending");
                break;
            }
        }
        let _ = ws_write.close().await;
    });

    let mut current: Option<(CancellationToken, JoinHandle<()>)> = None;

    while let Some(msg) = ws_read.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => {
                debug!("Live channel closed by client");
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                debug!("Live channel error: {}", e);
                break;
            }
        };

        match serde_json::from_str::<ClientEvent>(&text) {
            Ok(ClientEvent::RunTest { file_path, env }) => {
                if current.as_ref().map(|(_, h)| !h.is_finished()).unwrap_or(false) {
                    let _ = out_tx.send(ServerEvent::Error {
                        message: "A test is already running on this connection".to_string(),
                    });
                    continue;
                }
                let mut request = RunRequest::new(file_path);
                request.env = env.filter(|e| !e.trim().is_empty());

                let cancel = CancellationToken::new();
                let handle = tokio::spawn(run_test(
                    state.clone(),
                    request,
                    out_tx.clone(),
                    cancel.clone(),
                ));
                current = Some((cancel, handle));
            }
            Ok(ClientEvent::CancelTest) => match &current {
                Some((cancel, handle)) if !handle.is_finished() => {
                    info!("Live run cancelled by client");
                    cancel.cancel();
                }
                _ => {
                    let _ = out_tx.send(ServerEvent::Error {
                        message: "No test is running".to_string(),
                    });
                }
            },
            Err(e) => {
                let _ = out_tx.send(ServerEvent::Error {
                    message: format!("Invalid message: {}", e),
                });
            }
        }
    }

    if let Some((cancel, handle)) = current.take() {
        if !handle.is_finished() {
            info!("Live channel disconnected, cancelling run");
        }
        cancel.cancel();
        let _ = handle.await;
    }
    drop(out_tx);
    let _ = writer.await;
}

/// Run one test, relaying its output and final status to `out`
pub async fn run_test(state: Arc<AppState>, request: RunRequest, out: EventSink, cancel: CancellationToken) {
    let (log_tx, mut log_rx) = mpsc::unbounded_channel();
    let run = state.orchestrator.run(request, Some(log_tx), cancel);
    tokio::pin!(run);

    let outcome = loop {
        tokio::select! {
            outcome = &mut run => break outcome,
            Some(line) = log_rx.recv() => {
                let _ = out.send(ServerEvent::log(line));
            }
        }
    };
    while let Ok(line) = log_rx.try_recv() {
        let _ = out.send(ServerEvent::log(line));
    }

    let status = match outcome {
        Ok(result) if result.aborted => ServerEvent::error_status("Test run aborted", Some(result.exit_code)),
        Ok(result) => ServerEvent::TestStatus {
            status: result.status(),
            code: Some(result.exit_code),
            message: None,
            results: result.parsed_results,
        },
        Err(e) => ServerEvent::error_status(e.to_string(), None),
    };
    let _ = out.send(status);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_events() {
        let run: ClientEvent = serde_json::from_value(json!({
            "event": "run-test",
            "data": {"filePath": "unit/math.test.js", "env": "qa"}
        }))
        .unwrap();
        assert_eq!(
            run,
            ClientEvent::RunTest {
                file_path: "unit/math.test.js".into(),
                env: Some("qa".into())
            }
        );

        let cancel: ClientEvent = serde_json::from_value(json!({"event": "cancel-test"})).unwrap();
        assert_eq!(cancel, ClientEvent::CancelTest);
    }

    #[test]
    fn test_server_events() {
        let log = ServerEvent::log(LogLine {
            stream: LogStream::Stdout,
            message: "ok 1".into(),
        });
        assert_eq!(
            serde_json::to_value(&log).unwrap(),
            json!({"event": "test-log", "data": {"type": "log", "message": "ok 1", "stream": "stdout"}})
        );

        let status = ServerEvent::TestStatus {
            status: RunStatus::Passed,
            code: Some(0),
            message: None,
            results: None,
        };
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            json!({"event": "test-status", "data": {"status": "passed", "code": 0}})
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_streams_logs_then_one_status() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = testdeck_common::AppConfig::default();
        config.paths.project_root = tmp.path().to_path_buf();
        config.paths.tests_dir = tmp.path().join("tests");
        config.paths.flows_file = tmp.path().join("temp/flows.json");
        config.runner.playwright_command = vec!["sh".into(), "{file}".into()];
        config.runner.write_run_logs = false;
        std::fs::create_dir_all(tmp.path().join("tests")).unwrap();
        std::fs::write(
            tmp.path().join("tests/hello.test.js"),
            "echo hello\necho '{\"passed\":1}'\nexit 1\n",
        )
        .unwrap();
        let state = Arc::new(AppState::new(config).unwrap());

        let (tx, mut rx) = mpsc::unbounded_channel();
        run_test(state.clone(), RunRequest::new("hello.test.js"), tx, CancellationToken::new()).await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(serde_json::to_value(event).unwrap());
        }
        assert_eq!(events.len(), 3);
        assert_eq!(events[0]["data"]["message"], "hello");
        assert_eq!(events[2]["event"], "test-status");
        assert_eq!(events[2]["data"]["status"], "failed");
        assert_eq!(events[2]["data"]["code"], 1);

        let (tx, mut rx) = mpsc::unbounded_channel();
        run_test(state, RunRequest::new("missing.test.js"), tx, CancellationToken::new()).await;
        let only = serde_json::to_value(rx.try_recv().unwrap()).unwrap();
        assert_eq!(only["data"]["status"], "error");
        assert!(only["data"]["message"].as_str().unwrap().contains("not found"));
        assert!(rx.try_recv().is_err());
    }
}
