//! Test execution for testdeck
//!
//! Resolves test paths, admits runs through a bounded pool and drives the
//! external runners as child processes:
//!
//! ```text
//! RunRequest ─▶ PathResolver ─▶ ExecutionPool ─▶ ProcessRunner ─▶ RunResult
//!                                                   │
//!                                                   └─▶ LogSink (live lines)
//! ```
//!
//! Browser checks (accessibility, keyboard, visual) go through generated
//! Playwright scripts run by [`ScriptRunner`] inside the same pool.

pub mod accessibility;
pub mod error;
pub mod k6;
pub mod keyboard;
pub mod orchestrator;
pub mod playwright;
pub mod pool;
pub mod process;
pub mod report;
pub mod resolve;
pub mod runlog;
pub mod visual;

pub use accessibility::{AccessibilityReport, AccessibilityRequest, AccessibilityRunner};
pub use error::{RunnerError, RunnerResult};
pub use k6::{K6Locator, K6Summary};
pub use keyboard::{KeyboardCheck, KeyboardReport, KeyboardTester};
pub use orchestrator::{Orchestrator, OrchestratorConfig, RunRequest, RunnerKind};
pub use playwright::{Browser, ScriptRunner, Viewport};
pub use pool::ExecutionPool;
pub use process::{LogLine, LogSink, LogStream, ProcessRunner};
pub use resolve::PathResolver;
pub use runlog::{RunLogEntry, RunLogStore};
pub use visual::{CaptureRequest, VisualDiff, VisualTester};
