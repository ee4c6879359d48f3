//! API routes for qaprobe-web

use crate::AppState;
use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::Html,
    routing::{get, post},
};
use qaprobe_core::{
    ConfigUpdate, RunEvent, RunStatus, TestConfig, TestResults, read_lock, sample, store,
    store::{ResultsSnapshot, StoreError},
    write_lock,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn conflict(message: impl Into<String>) -> ApiError {
    (
        StatusCode::CONFLICT,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn internal_error(message: impl Into<String>) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Embedded dashboard page
pub async fn index() -> Html<&'static str> {
    Html(include_str!("../../assets/index.html"))
}

/// Health check endpoint
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Current run status
async fn get_status(State(state): State<AppState>) -> Json<RunStatus> {
    Json(read_lock(&state.status).clone())
}

/// Current test results
async fn get_results(State(state): State<AppState>) -> Json<TestResults> {
    Json(read_lock(&state.results).clone())
}

/// Current configuration. Credentials come back in plain text so the
/// dashboard can re-populate its form fields.
async fn get_config(State(state): State<AppState>) -> Json<TestConfig> {
    Json(read_lock(&state.config).clone())
}

/// Merge a partial config update and persist the result
async fn update_config(
    State(state): State<AppState>,
    Json(update): Json<ConfigUpdate>,
) -> Json<serde_json::Value> {
    let config = {
        let mut config = write_lock(&state.config);
        config.apply_update(&update);
        config.clone()
    };

    if let Err(e) = store::save_config(&state.data_dir, &config) {
        tracing::warn!("Failed to persist configuration: {e}");
    }

    Json(json!({"status": "success", "config": config}))
}

fn validate_url(url: &str) -> Result<(), ApiError> {
    if url.trim().is_empty() {
        return Err(bad_request("Website URL is required"));
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(bad_request(
            "Website URL must start with http:// or https://",
        ));
    }
    Ok(())
}

/// Start a full test run: merge config overrides, generate a plan for the
/// configured URL, then execute it in the background.
async fn start_tests(
    State(state): State<AppState>,
    Json(update): Json<ConfigUpdate>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let config = {
        let mut config = write_lock(&state.config);
        config.apply_update(&update);
        config.clone()
    };
    if let Err(e) = store::save_config(&state.data_dir, &config) {
        tracing::warn!("Failed to persist configuration: {e}");
    }

    let url = config.website_url.clone();
    validate_url(&url)?;
    qaprobe_agent::validate_credential(config.provider, config.credential_for(config.provider))
        .map_err(|e| bad_request(e.to_string()))?;

    let guard = state
        .controller
        .try_begin_run()
        .ok_or_else(|| conflict("A test run is already in progress"))?;

    {
        let mut results = write_lock(&state.results);
        results.clear();
    }
    {
        let mut status = write_lock(&state.status);
        *status = RunStatus {
            is_running: true,
            current_url: url.clone(),
            status_message: "Starting test run".to_string(),
            ..RunStatus::default()
        };
    }
    state
        .controller
        .publish(RunEvent::Status(read_lock(&state.status).clone()));
    state
        .controller
        .publish(RunEvent::Results(read_lock(&state.results).clone()));

    // A configured custom prompt selects the single-pass exploratory mode;
    // otherwise plan generation drives a full batch.
    let exploratory = !config.custom_prompt.trim().is_empty();
    let controller = Arc::clone(&state.controller);
    let run_url = url.clone();
    tokio::spawn(async move {
        if exploratory {
            controller.run_exploratory(guard, run_url).await;
        } else {
            controller.run_full(guard, run_url).await;
        }
    });

    Ok(Json(json!({
        "status": "started",
        "message": format!("Test run started for {url}")
    })))
}

/// Request cancellation of the active run. Takes effect at the next test
/// case boundary.
async fn stop_tests(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.controller.request_stop();
    {
        let mut status = write_lock(&state.status);
        status.is_running = false;
        status.is_paused = false;
        status.status_message = "Stopping test run".to_string();
    }
    state
        .controller
        .publish(RunEvent::Status(read_lock(&state.status).clone()));

    Json(json!({"status": "stopping"}))
}

/// Toggle the advisory paused flag. The executor does not currently hold at
/// pause points; the flag only informs dashboards.
async fn pause_tests(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let paused = {
        let mut status = write_lock(&state.status);
        if !status.is_running {
            return Err(bad_request("No test run in progress"));
        }
        status.is_paused = !status.is_paused;
        status.status_message = if status.is_paused {
            "Test run paused".to_string()
        } else {
            "Test run resumed".to_string()
        };
        status.is_paused
    };
    state
        .controller
        .publish(RunEvent::Status(read_lock(&state.status).clone()));

    Ok(Json(
        json!({"status": if paused { "paused" } else { "resumed" }}),
    ))
}

/// Request body for plan generation
#[derive(Debug, Default, Deserialize)]
pub struct PlanRequest {
    /// Target URL; falls back to the configured website URL
    pub url: Option<String>,
}

async fn generate_plan_get(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    spawn_plan_generation(&state, None)
}

async fn generate_plan_post(
    State(state): State<AppState>,
    Json(req): Json<PlanRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    spawn_plan_generation(&state, req.url)
}

fn spawn_plan_generation(
    state: &AppState,
    url: Option<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let url = url.unwrap_or_else(|| read_lock(&state.config).website_url.clone());
    validate_url(&url)?;

    let guard = state
        .controller
        .try_begin_run()
        .ok_or_else(|| conflict("A test run is already in progress"))?;

    let controller = Arc::clone(&state.controller);
    let plan_url = url.clone();
    tokio::spawn(async move {
        controller.generate_plan(guard, &plan_url).await;
    });

    Ok(Json(json!({
        "status": "generating",
        "message": format!("Generating test plan for {url}")
    })))
}

/// Request body for batch execution
#[derive(Debug, Deserialize)]
pub struct RunTestsRequest {
    pub test_cases: Vec<String>,
}

/// Execute an explicit list of test cases in the background
async fn run_tests(
    State(state): State<AppState>,
    Json(req): Json<RunTestsRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if req.test_cases.is_empty() {
        return Err(bad_request("No test cases provided"));
    }

    let guard = state
        .controller
        .try_begin_run()
        .ok_or_else(|| conflict("A test run is already in progress"))?;

    {
        let mut results = write_lock(&state.results);
        results.clear();
    }
    state
        .controller
        .publish(RunEvent::Results(read_lock(&state.results).clone()));

    let count = req.test_cases.len();
    let controller = Arc::clone(&state.controller);
    tokio::spawn(async move {
        controller.execute_batch(guard, req.test_cases).await;
    });

    Ok(Json(json!({"status": "started", "count": count})))
}

/// Replace the current results with the bundled demonstration fixtures
async fn load_sample_data(State(state): State<AppState>) -> Json<serde_json::Value> {
    {
        let mut results = write_lock(&state.results);
        *results = sample::sample_results();
    }
    state.controller.persist_snapshot();
    state
        .controller
        .publish(RunEvent::Results(read_lock(&state.results).clone()));

    Json(json!({"status": "success", "message": "Sample data loaded"}))
}

fn snapshot(state: &AppState) -> ResultsSnapshot {
    // One read guard at a time, matching the writers.
    let status = read_lock(&state.status).clone();
    let results = read_lock(&state.results).clone();
    let config = read_lock(&state.config).clone();
    ResultsSnapshot::new(status, results, config)
}

/// Persist the current snapshot to disk
async fn save_results(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    store::save_snapshot(&state.data_dir, &snapshot(&state))
        .map_err(|e| internal_error(format!("Failed to save results: {e}")))?;

    Ok(Json(
        json!({"status": "success", "file": store::RESULTS_FILE}),
    ))
}

/// Load the persisted snapshot back into the live state
async fn load_results(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let loaded = match store::load_snapshot(&state.data_dir) {
        Ok(snapshot) => snapshot,
        Err(StoreError::NotFound) => {
            return Err((
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: "No results file found".to_string(),
                }),
            ));
        }
        Err(e) => return Err(internal_error(format!("Failed to load results: {e}"))),
    };

    *write_lock(&state.results) = loaded.results;
    *write_lock(&state.config) = loaded.config;
    {
        // Restore the saved status, except the live-run flags: loading a
        // snapshot never holds the run token.
        let mut status = loaded.status;
        status.is_running = false;
        status.is_paused = false;
        *write_lock(&state.status) = status;
    }
    state
        .controller
        .publish(RunEvent::Status(read_lock(&state.status).clone()));
    state
        .controller
        .publish(RunEvent::Results(read_lock(&state.results).clone()));

    Ok(Json(
        json!({"status": "success", "saved_time": loaded.saved_time}),
    ))
}

/// Clear all results and reset the run status
async fn clear_results(State(state): State<AppState>) -> Json<serde_json::Value> {
    write_lock(&state.results).clear();
    *write_lock(&state.status) = RunStatus::default();
    state.controller.persist_snapshot();
    state
        .controller
        .publish(RunEvent::Results(read_lock(&state.results).clone()));
    state
        .controller
        .publish(RunEvent::Status(read_lock(&state.status).clone()));

    Json(json!({"status": "success"}))
}

/// Download the current snapshot as a JSON attachment
async fn download_results(
    State(state): State<AppState>,
) -> Result<([(header::HeaderName, String); 2], String), ApiError> {
    let body = serde_json::to_string_pretty(&snapshot(&state))
        .map_err(|e| internal_error(format!("Failed to serialize results: {e}")))?;

    let filename = format!(
        "qaprobe_results_{}.json",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    );

    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    ))
}

/// Create API routes
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/api/health", get(health))
        // State snapshots
        .route("/api/status", get(get_status))
        .route("/api/results", get(get_results))
        .route("/api/config", get(get_config).post(update_config))
        // Run control
        .route("/api/start", post(start_tests))
        .route("/api/stop", post(stop_tests))
        .route("/api/pause", post(pause_tests))
        .route(
            "/api/generate_test_plan",
            get(generate_plan_get).post(generate_plan_post),
        )
        .route("/api/run_tests", post(run_tests))
        // Result management
        .route("/api/load_sample_data", get(load_sample_data))
        .route("/api/save_results", get(save_results))
        .route("/api/load_results", get(load_results))
        .route("/api/clear_results", get(clear_results))
        .route("/api/results/download", get(download_results))
        .with_state(state)
}
