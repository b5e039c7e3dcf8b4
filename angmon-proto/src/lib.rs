use serde::{Deserialize, Serialize};

pub mod config;
mod lenient;

pub use config::{Configuration, EmailSettings, Intervals, PartitionRule};

/// Agent snapshots never list more than this many processes.
pub const MAX_TOP_PROCESSES: usize = 10;

/// One point-in-time reading served by the agent on `GET /stats`.
///
/// The agent sends more than this (`agentId`, `serverInfo`, its own `config`), the extra keys
/// are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    #[serde(default)]
    pub ip_address: String,
    #[serde(rename = "memoryTotalGB", alias = "memoryTotal")]
    pub memory_total_gb: f64,
    #[serde(rename = "memoryFreeGB", alias = "memoryFree")]
    pub memory_free_gb: f64,
    #[serde(default)]
    pub disk_stats: Vec<DiskStat>,
    #[serde(default)]
    pub top_processes: Vec<ProcessInfo>,
    #[serde(default)]
    pub swap_usage_pct: f64,
    #[serde(default)]
    pub oom_detected: bool,
    #[serde(default)]
    pub last_update: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskStat {
    pub path: String,
    #[serde(rename = "totalGB", alias = "total", alias = "total_gb", default)]
    pub total_gb: f64,
    #[serde(rename = "usedGB", alias = "used", alias = "used_gb", default)]
    pub used_gb: f64,
    #[serde(rename = "freeGB", alias = "free", alias = "free_gb", default)]
    pub free_gb: f64,
    #[serde(rename = "usagePct", alias = "usage_pct")]
    pub usage_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    // psutil reports no owner for some kernel threads
    #[serde(default)]
    pub user: Option<String>,
    #[serde(rename = "memGB")]
    pub mem_gb: f64,
}
