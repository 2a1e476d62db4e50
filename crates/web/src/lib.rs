//! testdeck HTTP API and live run channel
//!
//! Serves test discovery, one-shot runs, browser checks, flows, behavior
//! sessions and the Jira proxy over JSON, plus a WebSocket at `/ws` that
//! streams a run's output as it happens.

pub mod error;
pub mod flows;
pub mod jira;
pub mod live;
pub mod routes;
pub mod server;

pub use error::{ApiError, ApiResult};
pub use server::{serve, AppState, WebServer};
