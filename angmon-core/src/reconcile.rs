use std::fmt::Display;

use angmon_proto::{Configuration, PartitionRule, config::DEFAULT_PARTITION_THRESHOLD};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::normalize::{ValidConfig, normalize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DraftState {
    /// Draft equals the baseline.
    Pristine,
    /// Draft carries edits that were not saved.
    Dirty,
    /// A reload from the store is in flight; its result replaces the draft.
    Syncing,
    /// A normalized copy of the draft was handed out for persistence.
    Saving,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    #[error("no partition at index {0}")]
    NoSuchPartition(usize),
    #[error("partition path is blank")]
    BlankPath,
    #[error("partition {0} is already listed")]
    DuplicatePath(String),
    #[error("a save is already in flight")]
    SaveInFlight,
    #[error("a refresh is in flight, its result would replace the draft")]
    RefreshInFlight,
    #[error("no refresh is in flight")]
    NoPendingRefresh,
    #[error("no save is in flight")]
    NoPendingSave,
}

/// A change to one scalar field of the draft.
///
/// Numbers carry the operator's raw text. Parsing is permissive and never substitutes a
/// default: garbage becomes NaN and stays in the draft until the next save normalizes it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum FieldEdit {
    CustomerName(String),
    MemoryThresholdGb(String),
    SmtpServer(String),
    Port(String),
    UseTls(bool),
    Username(String),
    Token(String),
    Recipients(String),
    SubjectTemplate(String),
    AlertCooldownHours(String),
    RamMinutes(String),
    DiskMinutes(String),
    ProcessMinutes(String),
}

impl FieldEdit {
    pub fn name(&self) -> &'static str {
        match self {
            FieldEdit::CustomerName(_) => "customerName",
            FieldEdit::MemoryThresholdGb(_) => "memoryThresholdGb",
            FieldEdit::SmtpServer(_) => "smtpServer",
            FieldEdit::Port(_) => "port",
            FieldEdit::UseTls(_) => "useTls",
            FieldEdit::Username(_) => "username",
            FieldEdit::Token(_) => "token",
            FieldEdit::Recipients(_) => "recipients",
            FieldEdit::SubjectTemplate(_) => "subjectTemplate",
            FieldEdit::AlertCooldownHours(_) => "alertCooldownHours",
            FieldEdit::RamMinutes(_) => "ramMinutes",
            FieldEdit::DiskMinutes(_) => "diskMinutes",
            FieldEdit::ProcessMinutes(_) => "processMinutes",
        }
    }

    fn apply(self, cfg: &mut Configuration) {
        match self {
            FieldEdit::CustomerName(v) => cfg.customer_name = v,
            FieldEdit::MemoryThresholdGb(v) => cfg.memory_threshold_gb = parse_float(&v),
            FieldEdit::SmtpServer(v) => cfg.email.smtp_server = v,
            FieldEdit::Port(v) => cfg.email.port = parse_int(&v),
            FieldEdit::UseTls(v) => cfg.email.use_tls = v,
            FieldEdit::Username(v) => cfg.email.username = v,
            FieldEdit::Token(v) => cfg.email.token = v,
            FieldEdit::Recipients(v) => cfg.email.recipients = v,
            FieldEdit::SubjectTemplate(v) => cfg.email.subject_template = v,
            FieldEdit::AlertCooldownHours(v) => cfg.email.alert_cooldown_hours = parse_float(&v),
            FieldEdit::RamMinutes(v) => cfg.intervals.ram = parse_int(&v),
            FieldEdit::DiskMinutes(v) => cfg.intervals.disk = parse_int(&v),
            FieldEdit::ProcessMinutes(v) => cfg.intervals.process = parse_int(&v),
        }
    }
}

/// Owns the operator's draft of the agent configuration.
///
/// Remote operations are split in a `begin_*` and a `complete_*` half so that the caller can
/// await the network in between. Callers must serialize access; there is no locking here.
#[derive(Debug, Clone)]
pub struct ConfigReconciler {
    baseline: Configuration,
    draft: Configuration,
    dirty: bool,
    refreshes: usize,
    pending_save: Option<ValidConfig>,
    // a refresh replaced the draft after the pending save was handed out
    synced_during_save: bool,
}

impl Default for ConfigReconciler {
    fn default() -> Self {
        Self::new(Configuration::default())
    }
}

impl ConfigReconciler {
    pub fn new(baseline: Configuration) -> Self {
        Self {
            draft: baseline.clone(),
            baseline,
            dirty: false,
            refreshes: 0,
            pending_save: None,
            synced_during_save: false,
        }
    }

    pub fn state(&self) -> DraftState {
        if self.refreshes > 0 {
            DraftState::Syncing
        } else if self.pending_save.is_some() {
            DraftState::Saving
        } else if self.dirty {
            DraftState::Dirty
        } else {
            DraftState::Pristine
        }
    }

    pub fn draft(&self) -> &Configuration {
        &self.draft
    }

    /// Last configuration known to match the store.
    pub fn baseline(&self) -> &Configuration {
        &self.baseline
    }

    pub fn edit(&mut self, edit: FieldEdit) {
        debug!(field = edit.name(), "editing draft");
        edit.apply(&mut self.draft);
        self.dirty = true;
    }

    /// Append an enabled rule at the default threshold.
    pub fn add_partition(&mut self, path: &str) -> Result<(), ReconcileError> {
        let path = path.trim();
        if path.is_empty() {
            return Err(ReconcileError::BlankPath);
        }
        if self.draft.partition(path).is_some() {
            return Err(ReconcileError::DuplicatePath(path.to_owned()));
        }

        self.draft
            .partitions
            .push(PartitionRule::new(path, DEFAULT_PARTITION_THRESHOLD));
        self.dirty = true;
        Ok(())
    }

    pub fn remove_partition(&mut self, index: usize) -> Result<PartitionRule, ReconcileError> {
        if index >= self.draft.partitions.len() {
            return Err(ReconcileError::NoSuchPartition(index));
        }

        self.dirty = true;
        Ok(self.draft.partitions.remove(index))
    }

    /// Flip `enabled` and return the new value.
    pub fn toggle_partition(&mut self, index: usize) -> Result<bool, ReconcileError> {
        let rule = self.partition_mut(index)?;
        rule.enabled = !rule.enabled;
        Ok(rule.enabled)
    }

    /// Set a threshold from operator text. Anything that is not an integer becomes 0.
    pub fn set_threshold(&mut self, index: usize, value: &str) -> Result<f64, ReconcileError> {
        let threshold = parse_int(value);
        let threshold = if threshold.is_finite() { threshold } else { 0.0 };

        let rule = self.partition_mut(index)?;
        rule.threshold = threshold;
        Ok(threshold)
    }

    fn partition_mut(&mut self, index: usize) -> Result<&mut PartitionRule, ReconcileError> {
        let rule = self
            .draft
            .partitions
            .get_mut(index)
            .ok_or(ReconcileError::NoSuchPartition(index))?;
        self.dirty = true;
        Ok(rule)
    }

    /// Start a reload from the store. Allowed in every state.
    pub fn begin_refresh(&mut self) {
        if self.dirty {
            warn!("refresh requested, unsaved edits will be discarded");
        }
        self.refreshes += 1;
    }

    /// Finish a reload. A fetched configuration replaces the draft and the baseline wholesale;
    /// a failure leaves both untouched.
    pub fn complete_refresh<E: Display>(
        &mut self,
        fetched: Result<Configuration, E>,
    ) -> Result<DraftState, ReconcileError> {
        if self.refreshes == 0 {
            return Err(ReconcileError::NoPendingRefresh);
        }
        self.refreshes -= 1;

        match fetched {
            Ok(cfg) => {
                debug!("draft replaced by stored configuration");
                self.draft = cfg.clone();
                self.baseline = cfg;
                self.dirty = false;
                self.synced_during_save = self.pending_save.is_some();
            }
            Err(e) => warn!("configuration refresh failed, draft kept: {e}"),
        }
        Ok(self.state())
    }

    /// Normalize the draft and hand out the copy to persist.
    pub fn begin_save(&mut self) -> Result<ValidConfig, ReconcileError> {
        match self.state() {
            DraftState::Saving => return Err(ReconcileError::SaveInFlight),
            DraftState::Syncing => return Err(ReconcileError::RefreshInFlight),
            DraftState::Pristine | DraftState::Dirty => {}
        }

        let valid = normalize(&self.draft, &self.baseline);
        self.pending_save = Some(valid.clone());
        self.synced_during_save = false;
        // edits made from here on must survive the acknowledgement
        self.dirty = false;
        debug!("saving normalized draft");
        Ok(valid)
    }

    /// Finish a save. On success the saved copy becomes the baseline; on failure the draft is
    /// kept as it is and the state returns to dirty.
    pub fn complete_save<E: Display>(
        &mut self,
        outcome: Result<(), E>,
    ) -> Result<DraftState, ReconcileError> {
        let saved = self
            .pending_save
            .take()
            .ok_or(ReconcileError::NoPendingSave)?
            .into_inner();

        match outcome {
            Ok(()) => {
                debug!("configuration saved");
                if !self.dirty {
                    self.draft = saved.clone();
                }
                self.baseline = saved;
            }
            Err(e) => {
                warn!("configuration save failed, edits kept: {e}");
                // a refresh landing meanwhile already replaced the edits that were submitted
                self.dirty |= !self.synced_during_save;
            }
        }
        Ok(self.state())
    }
}

fn parse_float(text: &str) -> f64 {
    text.trim().parse().unwrap_or(f64::NAN)
}

/// Leading integer of `text`, so `"12.7"` gives 12. NaN when there is none.
fn parse_int(text: &str) -> f64 {
    let text = text.trim();
    let digits_start = usize::from(text.starts_with(['-', '+']));
    let digits_end = text[digits_start..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(text.len(), |i| digits_start + i);

    // f64 keeps digit runs beyond i64 as large numbers
    text[..digits_end].parse::<f64>().unwrap_or(f64::NAN)
}
