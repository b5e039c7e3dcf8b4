use angmon_core::{
    HealthReport, evaluate,
    status::{Level, PartitionHealth},
};
use angmon_proto::{Configuration, MetricsSnapshot};

use crate::agent::AgentClient;

/// Print the current health of the agent's host. Returns whether anything is critical.
pub async fn check(agent: &AgentClient) -> anyhow::Result<bool> {
    let (snapshot, config) = tokio::try_join!(agent.fetch_stats(), agent.load_config())?;
    let report = evaluate(&config, &snapshot);

    for line in summary(&config, &snapshot, &report) {
        println!("{line}");
    }

    Ok(report.is_critical())
}

fn summary(config: &Configuration, snapshot: &MetricsSnapshot, report: &HealthReport) -> Vec<String> {
    let mut lines = vec![
        format!(
            "{} ({}) at {}",
            config.customer_name, snapshot.ip_address, snapshot.last_update
        ),
        format!(
            "memory: {:.2} GB free of {:.2} GB, threshold {:.2} GB [{}]",
            report.memory.free_gb,
            report.memory.total_gb,
            report.memory.threshold_gb,
            verdict(report.memory.critical)
        ),
        format!(
            "kernel: {}",
            if report.kernel.oom_detected {
                "OOM event [ALARM]"
            } else {
                "no OOM detected [OK]"
            }
        ),
        format!(
            "swap: {:.1}% [{}]",
            report.swap.usage_pct,
            level(report.swap.level)
        ),
        format!(
            "partitions: {} monitored, {} critical ({} alerting)",
            report.monitored_paths(),
            report.critical_partitions(),
            report.alerting_critical_partitions()
        ),
    ];
    lines.extend(report.partitions.iter().map(partition_line));
    lines.extend(report.processes.iter().map(|p| {
        format!(
            "  [{}] {} ({}) {:.2} GB [{}]",
            p.pid,
            p.name,
            p.user.as_deref().unwrap_or("-"),
            p.mem_gb,
            level(p.load)
        )
    }));
    lines
}

fn partition_line(p: &PartitionHealth) -> String {
    format!(
        "  {} {:.1}% used, {:.1} GB free, threshold {}% [{}]{}",
        p.path,
        p.usage_pct,
        p.free_gb,
        p.threshold,
        verdict(p.critical),
        if p.enforced { "" } else { " (not enforced)" }
    )
}

fn verdict(critical: bool) -> &'static str {
    if critical { "CRITICAL" } else { "healthy" }
}

fn level(level: Level) -> &'static str {
    match level {
        Level::High => "high",
        Level::Stable => "stable",
    }
}
