//! Persistence for configuration and results snapshots.
//!
//! Both files are whole-document JSON overwrites with no atomic rename and
//! no locking: best-effort snapshotting, not a durable log. Format has no
//! schema version field; changes require manual migration.

use crate::config::TestConfig;
use crate::models::{RunStatus, TestResults};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File name for the persisted configuration.
pub const CONFIG_FILE: &str = "qaprobe_config.json";
/// File name for the persisted results snapshot.
pub const RESULTS_FILE: &str = "qaprobe_results.json";

/// Errors from snapshot persistence.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("No results file found")]
    NotFound,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// Persisted document bundling status, results and config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsSnapshot {
    pub status: RunStatus,
    pub results: TestResults,
    pub config: TestConfig,
    pub saved_time: String,
}

impl ResultsSnapshot {
    pub fn new(status: RunStatus, results: TestResults, config: TestConfig) -> Self {
        Self {
            status,
            results,
            config,
            saved_time: Utc::now().to_rfc3339(),
        }
    }
}

fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE)
}

fn results_path(data_dir: &Path) -> PathBuf {
    data_dir.join(RESULTS_FILE)
}

/// Writes the configuration file, creating the data directory if needed.
pub fn save_config(data_dir: &Path, config: &TestConfig) -> Result<(), StoreError> {
    fs::create_dir_all(data_dir)?;
    let json = serde_json::to_string_pretty(config)?;
    fs::write(config_path(data_dir), json)?;
    Ok(())
}

/// Reads the persisted configuration, or None when the file is absent.
pub fn load_config(data_dir: &Path) -> Result<Option<TestConfig>, StoreError> {
    let path = config_path(data_dir);
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

/// Writes the results snapshot file.
pub fn save_snapshot(data_dir: &Path, snapshot: &ResultsSnapshot) -> Result<(), StoreError> {
    fs::create_dir_all(data_dir)?;
    let json = serde_json::to_string_pretty(snapshot)?;
    fs::write(results_path(data_dir), json)?;
    Ok(())
}

/// Reads the persisted results snapshot.
///
/// A missing file is [`StoreError::NotFound`] (HTTP 404 at the API
/// boundary), never a panic.
pub fn load_snapshot(data_dir: &Path) -> Result<ResultsSnapshot, StoreError> {
    let path = results_path(data_dir);
    if !path.exists() {
        return Err(StoreError::NotFound);
    }
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
