use angmon_proto::{
    Configuration, DiskStat, MAX_TOP_PROCESSES, MetricsSnapshot, ProcessInfo,
    config::DEFAULT_PARTITION_THRESHOLD,
};
use serde::Serialize;

/// Swap usage above this percentage is reported as high.
pub const SWAP_HIGH_PCT: f64 = 10.0;
/// Processes holding more than this many GB are reported as high load.
pub const PROCESS_HIGH_LOAD_GB: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub memory: MemoryHealth,
    pub partitions: Vec<PartitionHealth>,
    pub kernel: KernelHealth,
    pub swap: SwapHealth,
    pub processes: Vec<ProcessHealth>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryHealth {
    pub total_gb: f64,
    pub free_gb: f64,
    pub used_gb: f64,
    pub threshold_gb: f64,
    pub critical: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionHealth {
    pub path: String,
    pub usage_pct: f64,
    pub free_gb: f64,
    pub total_gb: f64,
    pub threshold: f64,
    pub threshold_source: ThresholdSource,
    /// False when the matching rule is disabled. Such partitions are shown but never count
    /// toward alerting.
    pub enforced: bool,
    pub critical: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ThresholdSource {
    Configured,
    Implicit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KernelHealth {
    pub oom_detected: bool,
    pub critical: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapHealth {
    pub usage_pct: f64,
    pub level: Level,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessHealth {
    pub pid: u32,
    pub name: String,
    pub user: Option<String>,
    pub mem_gb: f64,
    pub load: Level,
}

/// Fixed two-step scale used for swap and process rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Level {
    High,
    Stable,
}

impl Level {
    fn above(value: f64, limit: f64) -> Self {
        if value > limit {
            Level::High
        } else {
            Level::Stable
        }
    }
}

/// Classify `snapshot` against `config`.
///
/// Values are taken as reported. A free memory figure larger than the total is not corrected
/// here.
pub fn evaluate(config: &Configuration, snapshot: &MetricsSnapshot) -> HealthReport {
    HealthReport {
        memory: memory_health(config, snapshot),
        partitions: snapshot
            .disk_stats
            .iter()
            .map(|stat| partition_health(config, stat))
            .collect(),
        kernel: KernelHealth {
            oom_detected: snapshot.oom_detected,
            critical: snapshot.oom_detected,
        },
        swap: SwapHealth {
            usage_pct: snapshot.swap_usage_pct,
            level: Level::above(snapshot.swap_usage_pct, SWAP_HIGH_PCT),
        },
        processes: snapshot
            .top_processes
            .iter()
            .take(MAX_TOP_PROCESSES)
            .map(process_health)
            .collect(),
    }
}

fn memory_health(config: &Configuration, snapshot: &MetricsSnapshot) -> MemoryHealth {
    MemoryHealth {
        total_gb: snapshot.memory_total_gb,
        free_gb: snapshot.memory_free_gb,
        used_gb: snapshot.memory_total_gb - snapshot.memory_free_gb,
        threshold_gb: config.memory_threshold_gb,
        // equality is still healthy
        critical: snapshot.memory_free_gb < config.memory_threshold_gb,
    }
}

fn partition_health(config: &Configuration, stat: &DiskStat) -> PartitionHealth {
    let rule = config.partition(&stat.path);
    let (threshold, threshold_source) = match rule {
        Some(rule) if rule.threshold.is_finite() => (rule.threshold, ThresholdSource::Configured),
        _ => (DEFAULT_PARTITION_THRESHOLD, ThresholdSource::Implicit),
    };

    PartitionHealth {
        path: stat.path.clone(),
        usage_pct: stat.usage_pct,
        free_gb: stat.free_gb,
        total_gb: stat.total_gb,
        threshold,
        threshold_source,
        enforced: rule.is_none_or(|rule| rule.enabled),
        critical: stat.usage_pct > threshold,
    }
}

fn process_health(process: &ProcessInfo) -> ProcessHealth {
    ProcessHealth {
        pid: process.pid,
        name: process.name.clone(),
        user: process.user.clone(),
        mem_gb: process.mem_gb,
        load: Level::above(process.mem_gb, PROCESS_HIGH_LOAD_GB),
    }
}

impl HealthReport {
    /// Every partition in the snapshot, disabled rules included.
    pub fn monitored_paths(&self) -> usize {
        self.partitions.len()
    }

    /// Critical partitions as displayed, disabled rules included.
    pub fn critical_partitions(&self) -> usize {
        self.partitions.iter().filter(|p| p.critical).count()
    }

    pub fn healthy_partitions(&self) -> usize {
        self.monitored_paths() - self.critical_partitions()
    }

    /// Critical partitions that may drive an alert.
    pub fn alerting_critical_partitions(&self) -> usize {
        self.partitions
            .iter()
            .filter(|p| p.critical && p.enforced)
            .count()
    }

    pub fn is_critical(&self) -> bool {
        self.memory.critical || self.kernel.critical || self.alerting_critical_partitions() > 0
    }
}

#[cfg(test)]
mod tests {
    use angmon_proto::PartitionRule;

    use super::*;

    fn snapshot() -> MetricsSnapshot {
        MetricsSnapshot {
            ip_address: "10.0.0.12".to_owned(),
            memory_total_gb: 64.0,
            memory_free_gb: 16.0,
            disk_stats: Vec::new(),
            top_processes: Vec::new(),
            swap_usage_pct: 0.0,
            oom_detected: false,
            last_update: "2025-08-14T09:30:00".to_owned(),
        }
    }

    fn disk(path: &str, usage_pct: f64) -> DiskStat {
        DiskStat {
            path: path.to_owned(),
            total_gb: 100.0,
            used_gb: usage_pct,
            free_gb: 100.0 - usage_pct,
            usage_pct,
        }
    }

    fn process(pid: u32, mem_gb: f64) -> ProcessInfo {
        ProcessInfo {
            pid,
            name: format!("proc-{pid}"),
            user: Some("hdbadm".to_owned()),
            mem_gb,
        }
    }

    #[test]
    fn memory_below_threshold_is_critical() {
        let config = Configuration {
            memory_threshold_gb: 3.0,
            ..Configuration::default()
        };
        let mut stats = snapshot();

        stats.memory_free_gb = 2.0;
        assert!(evaluate(&config, &stats).memory.critical);

        stats.memory_free_gb = 3.0;
        assert!(!evaluate(&config, &stats).memory.critical);
    }

    #[test]
    fn memory_values_are_reported_as_given() {
        let mut stats = snapshot();
        stats.memory_total_gb = 0.0;
        stats.memory_free_gb = 8.0;

        let report = evaluate(&Configuration::default(), &stats);

        assert_eq!(report.memory.total_gb, 0.0);
        assert_eq!(report.memory.free_gb, 8.0);
        assert_eq!(report.memory.used_gb, -8.0);
        assert!(!report.memory.critical);
    }

    #[test]
    fn partition_threshold_is_exclusive() {
        let config = Configuration {
            partitions: vec![PartitionRule::new("/hana/log", 85.0)],
            ..Configuration::default()
        };
        let mut stats = snapshot();
        stats.disk_stats = vec![disk("/hana/log", 85.0)];

        let report = evaluate(&config, &stats);
        assert!(!report.partitions[0].critical);
        assert_eq!(report.partitions[0].threshold_source, ThresholdSource::Configured);

        stats.disk_stats = vec![disk("/hana/log", 86.0)];
        assert!(evaluate(&config, &stats).partitions[0].critical);
    }

    #[test]
    fn unknown_path_uses_implicit_threshold() {
        let configs = [
            Configuration::default(),
            Configuration {
                partitions: Vec::new(),
                ..Configuration::default()
            },
            Configuration {
                partitions: vec![PartitionRule::new("/backup", 10.0)],
                ..Configuration::default()
            },
        ];
        let mut stats = snapshot();
        stats.disk_stats = vec![disk("/srv/nfs", 90.0), disk("/srv/nfs2", 90.5)];

        for config in &configs {
            let report = evaluate(config, &stats);
            assert_eq!(report.partitions[0].threshold, 90.0);
            assert_eq!(report.partitions[0].threshold_source, ThresholdSource::Implicit);
            assert!(report.partitions[0].enforced);
            assert!(!report.partitions[0].critical);
            assert!(report.partitions[1].critical);
        }
    }

    #[test]
    fn first_matching_rule_wins() {
        let config = Configuration {
            partitions: vec![
                PartitionRule::new("/", 50.0),
                PartitionRule::new("/", 95.0),
            ],
            ..Configuration::default()
        };
        let mut stats = snapshot();
        stats.disk_stats = vec![disk("/", 60.0)];

        let report = evaluate(&config, &stats);

        assert_eq!(report.partitions[0].threshold, 50.0);
        assert!(report.partitions[0].critical);
    }

    #[test]
    fn zero_threshold_is_respected() {
        let config = Configuration {
            partitions: vec![PartitionRule::new("/", 0.0)],
            ..Configuration::default()
        };
        let mut stats = snapshot();
        stats.disk_stats = vec![disk("/", 0.5)];

        let report = evaluate(&config, &stats);

        assert_eq!(report.partitions[0].threshold, 0.0);
        assert!(report.partitions[0].critical);
    }

    #[test]
    fn disabled_partitions_are_shown_but_not_enforced() {
        let mut disabled = PartitionRule::new("/usr/sap", 80.0);
        disabled.enabled = false;
        let config = Configuration {
            partitions: vec![PartitionRule::new("/", 90.0), disabled],
            ..Configuration::default()
        };
        let mut stats = snapshot();
        stats.disk_stats = vec![disk("/", 20.0), disk("/usr/sap", 97.0)];

        let report = evaluate(&config, &stats);

        assert_eq!(report.monitored_paths(), 2);
        assert_eq!(report.critical_partitions(), 1);
        assert_eq!(report.healthy_partitions(), 1);
        assert_eq!(report.alerting_critical_partitions(), 0);
        assert!(!report.partitions[1].enforced);
        assert!(!report.is_critical());
    }

    #[test]
    fn empty_disk_stats_yield_no_partitions() {
        let report = evaluate(&Configuration::default(), &snapshot());

        assert!(report.partitions.is_empty());
        assert_eq!(report.monitored_paths(), 0);
        assert_eq!(report.critical_partitions(), 0);
        assert!(!report.is_critical());
    }

    #[test]
    fn oom_is_reported_independently_of_memory() {
        let config = Configuration {
            memory_threshold_gb: 3.0,
            ..Configuration::default()
        };
        let mut stats = snapshot();
        stats.oom_detected = true;
        stats.memory_free_gb = 1.0;

        let report = evaluate(&config, &stats);

        assert!(report.kernel.critical);
        assert!(report.memory.critical);
        assert!(report.is_critical());

        stats.memory_free_gb = 30.0;
        let report = evaluate(&config, &stats);
        assert!(report.kernel.critical);
        assert!(!report.memory.critical);
        assert!(report.is_critical());
    }

    #[test]
    fn swap_and_process_levels_use_fixed_limits() {
        let mut stats = snapshot();
        stats.swap_usage_pct = 10.0;
        stats.top_processes = vec![process(1, 5.0), process(2, 5.01)];

        let report = evaluate(&Configuration::default(), &stats);
        assert_eq!(report.swap.level, Level::Stable);
        assert_eq!(report.processes[0].load, Level::Stable);
        assert_eq!(report.processes[1].load, Level::High);

        stats.swap_usage_pct = 10.5;
        assert_eq!(evaluate(&Configuration::default(), &stats).swap.level, Level::High);
    }

    #[test]
    fn process_rows_are_capped() {
        let mut stats = snapshot();
        stats.top_processes = (0..15).map(|pid| process(pid, 1.0)).collect();

        let report = evaluate(&Configuration::default(), &stats);

        assert_eq!(report.processes.len(), MAX_TOP_PROCESSES);
        assert_eq!(report.processes[0].pid, 0);
    }

    #[test]
    fn evaluation_is_repeatable() {
        let mut stats = snapshot();
        stats.disk_stats = vec![disk("/", 91.0), disk("/hana/log", 12.0)];
        stats.top_processes = vec![process(7, 9.0)];
        let config = Configuration::default();

        assert_eq!(evaluate(&config, &stats), evaluate(&config, &stats));
    }

    #[test]
    fn report_serializes_in_camel_case() {
        let mut stats = snapshot();
        stats.disk_stats = vec![disk("/", 91.0)];

        let json = serde_json::to_value(evaluate(&Configuration::default(), &stats)).unwrap();

        assert_eq!(json["partitions"][0]["thresholdSource"], "configured");
        assert_eq!(json["partitions"][0]["usagePct"], 91.0);
        assert_eq!(json["memory"]["thresholdGb"], 3.0);
        assert_eq!(json["swap"]["level"], "stable");
    }
}
