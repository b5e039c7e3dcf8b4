use angmon_core::{HealthReport, evaluate};
use axum::{Json, extract::State};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub connected: bool,
    pub ip_address: Option<String>,
    pub last_update: Option<String>,
    /// Latest snapshot judged against the stored configuration, absent until the first poll
    /// succeeds.
    pub report: Option<HealthReport>,
}

pub async fn overview(State(state): State<AppState>) -> Json<Overview> {
    let baseline = state.reconciler.lock().await.baseline().clone();
    let feed = state.stats.read().await;

    Json(Overview {
        connected: feed.connected,
        ip_address: feed.snapshot.as_ref().map(|s| s.ip_address.clone()),
        last_update: feed.snapshot.as_ref().map(|s| s.last_update.clone()),
        report: feed
            .snapshot
            .as_ref()
            .map(|snapshot| evaluate(&baseline, snapshot)),
    })
}
