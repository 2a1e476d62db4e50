//! Web server implementation

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use testdeck_common::{AppConfig, BehaviorSession, TestScanner, TtlStore};
use testdeck_runner::playwright::Viewport;
use testdeck_runner::{
    AccessibilityRunner, K6Locator, KeyboardTester, Orchestrator, OrchestratorConfig, VisualTester,
};

use crate::flows::FlowStore;
use crate::jira::JiraClient;
use crate::{live, routes};

/// Shared state behind every handler
pub struct AppState {
    pub config: AppConfig,
    pub scanner: TestScanner,
    pub orchestrator: Orchestrator,
    pub accessibility: AccessibilityRunner,
    pub keyboard: KeyboardTester,
    pub visual: VisualTester,
    pub k6: K6Locator,
    pub flows: FlowStore,
    pub sessions: TtlStore<BehaviorSession>,
    pub jira: Option<JiraClient>,
}

impl AppState {
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let orchestrator = Orchestrator::new(OrchestratorConfig::from_app(&config))?;
        let scripts = orchestrator.scripts().clone();
        let paths = &config.paths;

        let flows = FlowStore::new(
            config.store.flow_policy(),
            config.store.persist_flows.then(|| paths.flows_file.clone()),
        );
        flows.load();

        Ok(Self {
            scanner: TestScanner::new(),
            accessibility: AccessibilityRunner::new(scripts.clone(), &paths.results_dir),
            keyboard: KeyboardTester::new(scripts.clone(), &paths.results_dir),
            visual: VisualTester::new(
                scripts,
                &paths.visual_dir,
                config.visual.threshold,
                Viewport {
                    width: config.visual.viewport_width,
                    height: config.visual.viewport_height,
                },
            ),
            k6: K6Locator::new(paths.k6_dirs.clone()),
            flows,
            sessions: TtlStore::new("behavior-sessions", config.store.session_policy()),
            jira: JiraClient::from_config(&config.jira)?,
            orchestrator,
            config,
        })
    }
}

/// Web server state
#[derive(Clone)]
pub struct WebServer {
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        Ok(Self::with_state(AppState::new(config)?))
    }

    pub fn with_state(state: AppState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Create router
    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/health", get(health_handler))
            .route("/ws", get(live::ws_handler))
            .merge(routes::tests::routes())
            .merge(routes::performance::routes())
            .merge(routes::k6::routes())
            .merge(routes::accessibility::routes())
            .merge(routes::keyboard::routes())
            .merge(routes::visual::routes())
            .merge(routes::flows::routes())
            .merge(routes::behavior::routes())
            .merge(routes::jira::routes())
            .fallback(not_found_handler)
            .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Start the web server
    pub async fn serve(self, addr: SocketAddr) -> anyhow::Result<()> {
        info!("testdeck API listening on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.router()).await?;

        Ok(())
    }
}

pub async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = config.listen_addr().parse()?;
    WebServer::new(config)?.serve(addr).await
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "testdeck-web",
        "environment": state.config.server.environment,
        "version": testdeck_common::VERSION,
    }))
}

async fn not_found_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"success": false, "error": "Not found"})),
    )
}
