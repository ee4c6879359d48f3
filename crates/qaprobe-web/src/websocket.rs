//! WebSocket infrastructure for real-time dashboard updates.
//!
//! Provides a hub that broadcasts run events to connected dashboard clients.
//! Messages are fire-and-forget snapshots; a client that connects mid-run
//! receives the current status and results on connect but no replay of
//! missed deltas.

use qaprobe_core::{BugReport, CaseStatus, LogEntry, RunStatus, TestResults};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{RwLock, mpsc};

/// Maximum number of concurrent WebSocket connections.
pub const MAX_CONNECTIONS: usize = 10;

/// Unique identifier for a WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Messages sent from server to dashboard clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection accepted
    Connected { connection_id: u64 },
    /// Run status snapshot
    StatusUpdate { status: RunStatus },
    /// Full results snapshot
    ResultsUpdate { results: TestResults },
    /// One execution log line
    LogMessage { log: LogEntry },
    /// Planner produced a test plan
    TestPlanGenerated { test_cases: Vec<String> },
    /// Plan generation failed
    PlanFailed { error: String },
    /// One test case changed state
    TestCaseUpdate {
        test_case: String,
        status: CaseStatus,
        bugs: Vec<BugReport>,
        error: Option<String>,
    },
    /// Batch finished with all cases processed
    TestCompleted {
        passed: usize,
        failed: usize,
        errored: usize,
    },
    /// Batch stopped by request
    TestStopped,
    /// Error message
    Error { message: String },
}

/// Hub for managing WebSocket connections and broadcasting messages.
#[derive(Clone)]
pub struct WebSocketHub {
    connections: Arc<RwLock<HashMap<ConnectionId, mpsc::Sender<ServerMessage>>>>,
}

impl WebSocketHub {
    /// Create a new WebSocket hub.
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Add a new connection to the hub.
    ///
    /// Returns `Err` if the maximum number of connections is reached.
    pub async fn add(
        &self,
        id: ConnectionId,
        tx: mpsc::Sender<ServerMessage>,
    ) -> Result<(), WebSocketError> {
        let mut connections = self.connections.write().await;

        if connections.len() >= MAX_CONNECTIONS {
            return Err(WebSocketError::ConnectionLimitReached);
        }

        connections.insert(id, tx);
        Ok(())
    }

    /// Remove a connection from the hub.
    pub async fn remove(&self, id: &ConnectionId) {
        let mut connections = self.connections.write().await;
        connections.remove(id);
    }

    /// Broadcast a message to all connected clients.
    pub async fn broadcast(&self, msg: ServerMessage) {
        let connections = self.connections.read().await;

        for (_, tx) in connections.iter() {
            // Ignore send errors - the connection cleanup will handle dead connections
            let _ = tx.send(msg.clone()).await;
        }
    }

    /// Get the current number of connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

impl Default for WebSocketHub {
    fn default() -> Self {
        Self::new()
    }
}

/// WebSocket errors.
#[derive(Debug, Clone, PartialEq)]
pub enum WebSocketError {
    /// Maximum connection limit reached
    ConnectionLimitReached,
}

impl std::fmt::Display for WebSocketError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebSocketError::ConnectionLimitReached => {
                write!(f, "Maximum connection limit of {} reached", MAX_CONNECTIONS)
            }
        }
    }
}

impl std::error::Error for WebSocketError {}

// ==================== Axum WebSocket Handler ====================

use crate::AppState;
use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use qaprobe_core::read_lock;

/// WebSocket route handler.
///
/// Upgrades HTTP connection to WebSocket and manages the connection lifecycle.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle an individual WebSocket connection.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Create channel for this connection
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(32);
    let id = ConnectionId::new();

    // Try to add connection to hub
    if let Err(e) = state.ws_hub.add(id, tx).await {
        // Send error and close
        let error_msg = ServerMessage::Error {
            message: e.to_string(),
        };
        if let Ok(json) = serde_json::to_string(&error_msg) {
            let _ = sender.send(Message::Text(json.into())).await;
        }
        return;
    }

    // Greet with the connection id and the current state so a client joining
    // mid-run starts from a full snapshot
    // One read guard at a time, matching the writers.
    let status = read_lock(&state.status).clone();
    let results = read_lock(&state.results).clone();
    let greeting = [
        ServerMessage::Connected { connection_id: id.0 },
        ServerMessage::StatusUpdate { status },
        ServerMessage::ResultsUpdate { results },
    ];
    for msg in greeting {
        if let Ok(json) = serde_json::to_string(&msg)
            && sender.send(Message::Text(json.into())).await.is_err()
        {
            state.ws_hub.remove(&id).await;
            return;
        }
    }

    // Spawn task to forward messages from hub to client
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&msg)
                && sender.send(Message::Text(json.into())).await.is_err()
            {
                break;
            }
        }
    });

    // Process incoming messages (for ping/pong and close)
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(data)) => {
                // Pong is handled automatically by axum
                tracing::debug!("Received ping: {:?}", data);
            }
            Err(_) => break,
            _ => {}
        }
    }

    // Cleanup
    state.ws_hub.remove(&id).await;
    send_task.abort();
}
