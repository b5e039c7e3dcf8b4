use std::{sync::Arc, time::Duration};

use angmon_proto::MetricsSnapshot;
use tokio::{
    sync::RwLock,
    time::{Instant, sleep_until},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::{AgentClient, AgentError};

/// Latest snapshot and whether the last poll reached the agent.
#[derive(Debug, Default)]
pub struct StatsFeed {
    pub snapshot: Option<MetricsSnapshot>,
    pub connected: bool,
}

impl StatsFeed {
    /// A failed poll only flips the connection flag, the last snapshot stays on display.
    pub fn record(&mut self, polled: Result<MetricsSnapshot, AgentError>) {
        match polled {
            Ok(snapshot) => {
                if !self.connected {
                    info!(ip = %snapshot.ip_address, "agent online");
                }
                self.connected = true;
                self.snapshot = Some(snapshot);
            }
            Err(e) => {
                if self.connected || self.snapshot.is_none() {
                    warn!("agent offline: {e}");
                } else {
                    debug!("agent still offline: {e}");
                }
                self.connected = false;
            }
        }
    }
}

/// Poll `GET /stats` every `interval` until `shutdown` fires.
pub async fn poll_stats(
    agent: AgentClient,
    feed: Arc<RwLock<StatsFeed>>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    loop {
        let current_time = Instant::now();

        let polled = tokio::select! {
            _ = shutdown.cancelled() => return,
            polled = agent.fetch_stats() => polled,
        };
        feed.write().await.record(polled);

        // wait poll interval or shutdown
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = sleep_until(current_time + interval) => { /* continue */ }
        }
    }
}
