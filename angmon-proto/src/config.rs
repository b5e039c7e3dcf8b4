use std::fmt;

use serde::{Deserialize, Serialize};

use crate::lenient;

/// Threshold applied to partitions that have no rule, and given to newly added rules.
pub const DEFAULT_PARTITION_THRESHOLD: f64 = 90.0;

/// Alerting configuration as stored by the agent (`GET /load-config`, `POST /config`).
///
/// Numeric fields are kept as `f64` on purpose: a draft may hold NaN until it is normalized,
/// and the store may hand back anything. Keys missing from a payload are taken from
/// [`Configuration::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Configuration {
    pub customer_name: String,
    #[serde(
        rename = "memoryThresholdGB",
        deserialize_with = "lenient::number",
        serialize_with = "lenient::serialize_number"
    )]
    pub memory_threshold_gb: f64,
    pub partitions: Vec<PartitionRule>,
    pub email: EmailSettings,
    pub intervals: Intervals,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            customer_name: "AN-Group Client".to_owned(),
            memory_threshold_gb: 3.0,
            partitions: vec![
                PartitionRule::new("/", 90.0),
                PartitionRule::new("/hana/data", 90.0),
                PartitionRule::new("/hana/shared", 85.0),
                PartitionRule::new("/hana/log", 85.0),
                PartitionRule::new("/usr/sap", 90.0),
            ],
            email: EmailSettings::default(),
            intervals: Intervals::default(),
        }
    }
}

impl Configuration {
    /// First rule whose path matches exactly.
    pub fn partition(&self, path: &str) -> Option<&PartitionRule> {
        self.partitions.iter().find(|rule| rule.path == path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionRule {
    pub path: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(
        alias = "thresholdPct",
        default = "default_partition_threshold",
        deserialize_with = "lenient::number",
        serialize_with = "lenient::serialize_number"
    )]
    pub threshold: f64,
}

impl PartitionRule {
    pub fn new(path: impl Into<String>, threshold: f64) -> Self {
        Self {
            path: path.into(),
            enabled: true,
            threshold,
        }
    }
}

fn enabled_by_default() -> bool {
    true
}

fn default_partition_threshold() -> f64 {
    DEFAULT_PARTITION_THRESHOLD
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EmailSettings {
    pub smtp_server: String,
    #[serde(
        deserialize_with = "lenient::number",
        serialize_with = "lenient::serialize_number"
    )]
    pub port: f64,
    #[serde(rename = "useTLS")]
    pub use_tls: bool,
    pub username: String,
    pub token: String,
    /// Comma separated addresses, see [`EmailSettings::recipient_list`].
    pub recipients: String,
    pub subject_template: String,
    #[serde(
        deserialize_with = "lenient::number",
        serialize_with = "lenient::serialize_number"
    )]
    pub alert_cooldown_hours: f64,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            smtp_server: "smtp.an-group.one".to_owned(),
            port: 587.0,
            use_tls: true,
            username: "monitor@an-group.one".to_owned(),
            token: String::new(),
            recipients: String::new(),
            subject_template: "{type} Alert: {customer} on {server}".to_owned(),
            alert_cooldown_hours: 6.0,
        }
    }
}

impl EmailSettings {
    pub fn recipient_list(&self) -> Vec<&str> {
        self.recipients
            .split(',')
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .collect()
    }
}

impl fmt::Debug for EmailSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailSettings")
            .field("smtp_server", &self.smtp_server)
            .field("port", &self.port)
            .field("use_tls", &self.use_tls)
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .field("recipients", &self.recipients)
            .field("subject_template", &self.subject_template)
            .field("alert_cooldown_hours", &self.alert_cooldown_hours)
            .finish()
    }
}

/// Agent check rates, in minutes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Intervals {
    #[serde(
        alias = "ramMinutes",
        deserialize_with = "lenient::number",
        serialize_with = "lenient::serialize_number"
    )]
    pub ram: f64,
    #[serde(
        alias = "diskMinutes",
        deserialize_with = "lenient::number",
        serialize_with = "lenient::serialize_number"
    )]
    pub disk: f64,
    #[serde(
        alias = "processMinutes",
        deserialize_with = "lenient::number",
        serialize_with = "lenient::serialize_number"
    )]
    pub process: f64,
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            ram: 5.0,
            disk: 10.0,
            process: 5.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let cfg: Configuration =
            serde_json::from_str(r#"{"customerName": "SLES-1a2b3c4d", "memoryThresholdGB": 2.0}"#)
                .unwrap();

        assert_eq!(cfg.customer_name, "SLES-1a2b3c4d");
        assert_eq!(cfg.memory_threshold_gb, 2.0);
        assert_eq!(cfg.partitions, Configuration::default().partitions);
        assert_eq!(cfg.email, EmailSettings::default());
        assert_eq!(cfg.intervals, Intervals::default());
    }

    #[test]
    fn malformed_numbers_decode_as_nan() {
        let cfg: Configuration = serde_json::from_str(
            r#"{
                "memoryThresholdGB": null,
                "email": {"port": "", "alertCooldownHours": "six"},
                "intervals": {"ram": "15", "disk": true}
            }"#,
        )
        .unwrap();

        assert!(cfg.memory_threshold_gb.is_nan());
        assert!(cfg.email.port.is_nan());
        assert!(cfg.email.alert_cooldown_hours.is_nan());
        assert_eq!(cfg.intervals.ram, 15.0);
        assert!(cfg.intervals.disk.is_nan());
        assert_eq!(cfg.intervals.process, 5.0);
        // fields inside a present section are still defaulted one by one
        assert_eq!(cfg.email.smtp_server, "smtp.an-group.one");
    }

    #[test]
    fn partition_rule_accepts_long_key_names() {
        let rule: PartitionRule =
            serde_json::from_str(r#"{"path": "/hana/log", "thresholdPct": 85}"#).unwrap();

        assert_eq!(rule, PartitionRule::new("/hana/log", 85.0));
    }

    #[test]
    fn integral_numbers_encode_as_integers() {
        let json = serde_json::to_value(Configuration::default()).unwrap();

        assert_eq!(json["email"]["port"], serde_json::json!(587));
        assert_eq!(json["intervals"]["disk"], serde_json::json!(10));
        assert_eq!(json["partitions"][2]["threshold"], serde_json::json!(85));
        assert_eq!(json["memoryThresholdGB"], serde_json::json!(3));
        assert_eq!(json["email"]["useTLS"], serde_json::json!(true));
    }

    #[test]
    fn non_finite_numbers_encode_as_null() {
        let mut cfg = Configuration::default();
        cfg.memory_threshold_gb = f64::NAN;
        cfg.email.alert_cooldown_hours = 1.5;

        let json = serde_json::to_value(&cfg).unwrap();

        assert!(json["memoryThresholdGB"].is_null());
        assert_eq!(json["email"]["alertCooldownHours"], serde_json::json!(1.5));
    }

    #[test]
    fn recipients_are_split_and_trimmed() {
        let email = EmailSettings {
            recipients: " ops@example.com,, basis@example.com ,".to_owned(),
            ..EmailSettings::default()
        };

        assert_eq!(
            email.recipient_list(),
            vec!["ops@example.com", "basis@example.com"]
        );
    }

    #[test]
    fn debug_output_hides_token() {
        let email = EmailSettings {
            token: "hunter2".to_owned(),
            ..EmailSettings::default()
        };

        assert!(!format!("{email:?}").contains("hunter2"));
    }
}
