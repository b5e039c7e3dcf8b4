//! An in-process stand-in for the agent, bound to an ephemeral port.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde_json::{Value, json};
use tokio::{net::TcpListener, sync::Mutex};

use crate::agent::AgentClient;

#[derive(Clone, Default)]
struct FakeState {
    saved: Arc<Mutex<Option<Value>>>,
    fail_saves: Arc<AtomicBool>,
}

pub struct FakeAgent {
    addr: String,
    state: FakeState,
}

impl FakeAgent {
    pub async fn spawn() -> Self {
        let state = FakeState::default();
        let app = Router::new()
            .route("/stats", get(stats))
            .route("/load-config", get(load_config))
            .route("/config", post(save_config))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        Self { addr, state }
    }

    pub fn client(&self) -> AgentClient {
        AgentClient::new(self.addr.clone(), false, false, Duration::from_secs(5))
    }

    pub fn fail_saves(&self) {
        self.state.fail_saves.store(true, Ordering::SeqCst);
    }

    /// Body of the last accepted `POST /config`.
    pub async fn saved(&self) -> Option<Value> {
        self.state.saved.lock().await.clone()
    }
}

/// An address nothing listens on.
pub async fn unreachable_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().to_string()
}

/// An address that accepts connections and never answers.
pub async fn silent_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    addr
}

async fn stats() -> Json<Value> {
    Json(json!({
        "agentId": "1a2b3c4d",
        "ipAddress": "10.0.0.12",
        "memoryTotal": 64.0,
        "memoryFree": 1.5,
        "swapUsagePct": 12.0,
        "diskStats": [
            {"path": "/", "usage_pct": 41.2, "free_gb": 30.1, "total_gb": 51.2},
            {"path": "/hana/log", "usage_pct": 86.0, "free_gb": 70.0, "total_gb": 500.0}
        ],
        "topProcesses": [
            {"pid": 4242, "name": "hdbindexserver", "memGB": 40.5, "user": "hdbadm"}
        ],
        "oomDetected": false,
        "lastUpdate": "2025-08-14T09:30:00.123456"
    }))
}

async fn load_config() -> Json<Value> {
    Json(json!({
        "customerName": "SLES-1a2b3c4d",
        "memoryThresholdGB": 2.0,
        "partitions": [
            {"path": "/", "enabled": true, "threshold": 90},
            {"path": "/hana/log", "enabled": true, "threshold": 85}
        ],
        "email": {
            "smtpServer": "", "port": 587, "username": "",
            "token": "", "recipients": "", "alertCooldownHours": 6, "useTLS": true
        },
        "intervals": {"ram": 5, "disk": 10, "process": 5}
    }))
}

async fn save_config(
    State(state): State<FakeState>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if state.fail_saves.load(Ordering::SeqCst) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"status": "error", "message": "Failed to save config"})),
        );
    }

    *state.saved.lock().await = Some(body);
    (StatusCode::OK, Json(json!({"status": "ok"})))
}
