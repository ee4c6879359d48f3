//! QAProbe Web Dashboard
//!
//! Web server for the QAProbe testing dashboard: REST endpoints for run
//! control and results, plus a WebSocket feed of live run events.

pub mod routes;
pub mod websocket;

use axum::{Router, routing::get};
use qaprobe_agent::{AgentRuntime, ProcessAgentRuntime};
use qaprobe_core::{
    RunController, RunEvent, RunStatus, SharedConfig, SharedResults, SharedStatus, TestConfig,
    TestResults, store,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::{Any, CorsLayer};
use websocket::ServerMessage;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Current test configuration
    pub config: SharedConfig,
    /// Accumulated test results
    pub results: SharedResults,
    /// Current run status
    pub status: SharedStatus,
    /// Run controller driving plan generation and batch execution
    pub controller: Arc<RunController>,
    /// WebSocket hub for real-time updates
    pub ws_hub: websocket::WebSocketHub,
    /// Directory for persisted config and results
    pub data_dir: PathBuf,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Port to listen on
    pub port: u16,
    /// Directory for persisted config and results
    pub data_dir: PathBuf,
    /// Path to static files (frontend build output); the embedded dashboard
    /// page is served when unset
    pub static_dir: Option<PathBuf>,
    /// Path to the browser agent binary
    pub agent_binary: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5000,
            data_dir: PathBuf::from(".qaprobe"),
            static_dir: None,
            agent_binary: None,
        }
    }
}

/// Build the shared state: persisted config when present, fresh results and
/// status, a process-backed agent runtime.
pub fn create_state(config: &Config) -> AppState {
    let test_config = match store::load_config(&config.data_dir) {
        Ok(Some(saved)) => saved,
        Ok(None) => TestConfig::default(),
        Err(e) => {
            tracing::warn!("Failed to load saved configuration: {e}");
            TestConfig::default()
        }
    };

    let runtime: Arc<dyn AgentRuntime> =
        Arc::new(ProcessAgentRuntime::new(config.agent_binary.clone()));

    create_state_with_runtime(config, test_config, runtime)
}

/// Build the shared state with an injected agent runtime (for testing).
pub fn create_state_with_runtime(
    config: &Config,
    test_config: TestConfig,
    runtime: Arc<dyn AgentRuntime>,
) -> AppState {
    let shared_config: SharedConfig = Arc::new(RwLock::new(test_config));
    let results: SharedResults = Arc::new(RwLock::new(TestResults::default()));
    let status: SharedStatus = Arc::new(RwLock::new(RunStatus::default()));

    let controller = Arc::new(RunController::new(
        Arc::clone(&shared_config),
        Arc::clone(&results),
        Arc::clone(&status),
        runtime,
        config.data_dir.clone(),
    ));

    AppState {
        config: shared_config,
        results,
        status,
        controller,
        ws_hub: websocket::WebSocketHub::new(),
        data_dir: config.data_dir.clone(),
    }
}

/// Create the application router
pub fn create_app(config: &Config) -> Router {
    create_app_with_state(config, create_state(config))
}

/// Create the application router with provided state (for dependency injection)
pub fn create_app_with_state(config: &Config, state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Forward controller events to connected dashboard clients
    let mut events = state.controller.subscribe();
    let hub = state.ws_hub.clone();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => hub.broadcast(run_event_to_server_message(event)).await,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("WebSocket forwarder lagged, skipped {skipped} events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut app = Router::new().merge(routes::api_routes(state.clone()));

    // The embedded dashboard page stands in when no frontend build is wired up
    if config.static_dir.is_none() {
        app = app.route("/", get(routes::index));
    }

    app = app
        .route("/ws", get(websocket::ws_handler).with_state(state))
        .layer(cors);

    // Add static file serving if configured
    if let Some(ref static_dir) = config.static_dir
        && static_dir.exists()
    {
        app = app.fallback_service(
            tower_http::services::ServeDir::new(static_dir).not_found_service(
                tower_http::services::ServeFile::new(static_dir.join("index.html")),
            ),
        );
    }

    app
}

/// Translate controller events into the dashboard wire vocabulary
fn run_event_to_server_message(event: RunEvent) -> ServerMessage {
    match event {
        RunEvent::Status(status) => ServerMessage::StatusUpdate { status },
        RunEvent::Results(results) => ServerMessage::ResultsUpdate { results },
        RunEvent::Log(log) => ServerMessage::LogMessage { log },
        RunEvent::PlanGenerated { test_cases } => {
            ServerMessage::TestPlanGenerated { test_cases }
        }
        RunEvent::PlanFailed { error } => ServerMessage::PlanFailed { error },
        RunEvent::CaseUpdate {
            test_case,
            status,
            bugs,
            error,
        } => ServerMessage::TestCaseUpdate {
            test_case,
            status,
            bugs,
            error,
        },
        RunEvent::Completed {
            passed,
            failed,
            errored,
        } => ServerMessage::TestCompleted {
            passed,
            failed,
            errored,
        },
        RunEvent::Stopped => ServerMessage::TestStopped,
    }
}

/// Start the server
pub async fn serve(config: Config) -> Result<(), std::io::Error> {
    // Persistence writes expect the directory to exist
    if !config.data_dir.exists() {
        std::fs::create_dir_all(&config.data_dir)?;
        tracing::info!("Created data directory: {:?}", config.data_dir);
    }

    let app = create_app(&config);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    tracing::info!("Starting qaprobe-web server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use qaprobe_core::{CaseStatus, LogEntry};
    use tempfile::TempDir;
    use tower::ServiceExt;

    // ==================== run_event_to_server_message Tests ====================

    #[test]
    fn test_run_event_status_maps_to_status_update() {
        let msg = run_event_to_server_message(RunEvent::Status(RunStatus::default()));
        assert!(matches!(msg, ServerMessage::StatusUpdate { .. }));
    }

    #[test]
    fn test_run_event_log_maps_to_log_message() {
        let msg = run_event_to_server_message(RunEvent::Log(LogEntry::new("INFO", "hello")));
        assert!(matches!(
            msg,
            ServerMessage::LogMessage { log } if log.message == "hello"
        ));
    }

    #[test]
    fn test_run_event_case_update_preserves_fields() {
        let msg = run_event_to_server_message(RunEvent::CaseUpdate {
            test_case: "Verify login".to_string(),
            status: CaseStatus::Passed,
            bugs: Vec::new(),
            error: None,
        });
        assert!(matches!(
            msg,
            ServerMessage::TestCaseUpdate { test_case, status: CaseStatus::Passed, .. }
                if test_case == "Verify login"
        ));
    }

    #[test]
    fn test_run_event_stopped_maps_to_test_stopped() {
        let msg = run_event_to_server_message(RunEvent::Stopped);
        assert_eq!(msg, ServerMessage::TestStopped);
    }

    // ==================== API Tests ====================

    fn test_config(temp: &TempDir) -> Config {
        Config {
            data_dir: temp.path().to_path_buf(),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp);
        let app = create_app(&config);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json["status"], "ok");
        assert!(json["version"].is_string());
    }

    #[tokio::test]
    async fn test_cors_headers() {
        let temp = TempDir::new().unwrap();
        let config = test_config(&temp);
        let app = create_app(&config);

        let response = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/api/health")
                    .header("Origin", "http://localhost:5173")
                    .header("Access-Control-Request-Method", "GET")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response
                .headers()
                .contains_key("access-control-allow-origin")
        );
    }

    #[tokio::test]
    async fn test_create_state_loads_persisted_config() {
        let temp = TempDir::new().unwrap();
        let mut saved = TestConfig::default();
        saved.website_url = "https://example.test/".to_string();
        store::save_config(temp.path(), &saved).unwrap();

        let state = create_state(&test_config(&temp));
        let loaded = qaprobe_core::read_lock(&state.config);
        assert_eq!(loaded.website_url, "https://example.test/");
    }
}
