use std::ops::Deref;

use angmon_proto::{
    Configuration, EmailSettings, Intervals, PartitionRule, config::DEFAULT_PARTITION_THRESHOLD,
};
use serde::Serialize;

pub const DEFAULT_MEMORY_THRESHOLD_GB: f64 = 2.0;
pub const DEFAULT_SMTP_PORT: f64 = 587.0;
pub const DEFAULT_ALERT_COOLDOWN_HOURS: f64 = 6.0;
pub const DEFAULT_RAM_MINUTES: f64 = 5.0;
pub const DEFAULT_DISK_MINUTES: f64 = 10.0;
pub const DEFAULT_PROCESS_MINUTES: f64 = 5.0;

/// A configuration that went through [`normalize`]: every number is finite and in range.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidConfig(Configuration);

impl ValidConfig {
    pub fn into_inner(self) -> Configuration {
        self.0
    }
}

impl Deref for ValidConfig {
    type Target = Configuration;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Replace every malformed value of `draft` with a usable one.
///
/// Intervals fall back to the value in `baseline` when that one is valid, otherwise to the
/// built-in default. Running it again on its own output changes nothing.
pub fn normalize(draft: &Configuration, baseline: &Configuration) -> ValidConfig {
    let memory_threshold_gb = if draft.memory_threshold_gb.is_finite() {
        draft.memory_threshold_gb
    } else {
        DEFAULT_MEMORY_THRESHOLD_GB
    };

    ValidConfig(Configuration {
        customer_name: draft.customer_name.clone(),
        memory_threshold_gb,
        partitions: draft.partitions.iter().filter_map(partition).collect(),
        email: email(&draft.email),
        intervals: intervals(&draft.intervals, &baseline.intervals),
    })
}

fn partition(rule: &PartitionRule) -> Option<PartitionRule> {
    let path = rule.path.trim();
    if path.is_empty() {
        return None;
    }

    let threshold = if rule.threshold.is_finite() {
        rule.threshold.clamp(0.0, 100.0)
    } else {
        DEFAULT_PARTITION_THRESHOLD
    };

    Some(PartitionRule {
        path: path.to_owned(),
        enabled: rule.enabled,
        threshold,
    })
}

fn email(email: &EmailSettings) -> EmailSettings {
    let port_ok = email.port.is_finite()
        && email.port.fract() == 0.0
        && (1.0..=f64::from(u16::MAX)).contains(&email.port);
    let cooldown_ok = email.alert_cooldown_hours.is_finite() && email.alert_cooldown_hours >= 0.0;

    EmailSettings {
        port: if port_ok { email.port } else { DEFAULT_SMTP_PORT },
        alert_cooldown_hours: if cooldown_ok {
            email.alert_cooldown_hours
        } else {
            DEFAULT_ALERT_COOLDOWN_HOURS
        },
        ..email.clone()
    }
}

fn intervals(draft: &Intervals, baseline: &Intervals) -> Intervals {
    Intervals {
        ram: minutes(draft.ram, baseline.ram, DEFAULT_RAM_MINUTES),
        disk: minutes(draft.disk, baseline.disk, DEFAULT_DISK_MINUTES),
        process: minutes(draft.process, baseline.process, DEFAULT_PROCESS_MINUTES),
    }
}

fn minutes(value: f64, last_valid: f64, default: f64) -> f64 {
    [value, last_valid]
        .into_iter()
        .find(|&v| is_positive_integer(v))
        .unwrap_or(default)
}

fn is_positive_integer(value: f64) -> bool {
    value.is_finite() && value >= 1.0 && value.fract() == 0.0
}
