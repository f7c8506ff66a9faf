//! Record types for the Vigia rounds pipeline.
//!
//! This crate is shared by the round engine and the dashboard clients to
//! prevent schema drift. The engine remains the authority on mutation rules,
//! but clients reuse the same types to render rounds and construct valid
//! payloads.
//!
//! All timestamps are UTC; display conversion belongs to the presentation
//! layer.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Named checklist slots for the recorder sub-map, in display order.
pub const RECORDER_SLOTS: [&str; 4] = ["recorder-1", "recorder-2", "recorder-3", "recorder-4"];

static SUBJECT_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Normalizes a free-text subject name into the key used by the persisted
/// index: trimmed, lowercased, internal whitespace collapsed.
///
/// Rounds store the operator-entered name verbatim; only cross-round lookups
/// go through this key.
pub fn normalize_subject_key(name: &str) -> String {
    SUBJECT_WS.replace_all(name.trim(), " ").to_lowercase()
}

// ─────────────────────────────────────────────────────────────────────────────
// Status enums
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle state of a round. `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    #[default]
    Planned,
    Running,
    Paused,
    Completed,
}

impl RoundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundStatus::Planned => "planned",
            RoundStatus::Running => "running",
            RoundStatus::Paused => "paused",
            RoundStatus::Completed => "completed",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "planned" => Some(RoundStatus::Planned),
            "running" => Some(RoundStatus::Running),
            "paused" => Some(RoundStatus::Paused),
            "completed" => Some(RoundStatus::Completed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RoundStatus::Completed)
    }
}

/// Operator-assigned condition of a single channel (camera/device slot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    #[default]
    Unset,
    Good,
    Medium,
    Severe,
}

impl ChannelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelStatus::Unset => "unset",
            ChannelStatus::Good => "good",
            ChannelStatus::Medium => "medium",
            ChannelStatus::Severe => "severe",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "unset" => Some(ChannelStatus::Unset),
            "good" => Some(ChannelStatus::Good),
            "medium" => Some(ChannelStatus::Medium),
            "severe" => Some(ChannelStatus::Severe),
            _ => None,
        }
    }

    pub fn is_set(&self) -> bool {
        !matches!(self, ChannelStatus::Unset)
    }
}

/// Tri-state checklist answer. `Unknown` means the operator has not answered
/// yet and blocks finalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriState {
    #[default]
    Unknown,
    True,
    False,
}

impl TriState {
    pub fn is_answered(&self) -> bool {
        !matches!(self, TriState::Unknown)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Channel ledger records
// ─────────────────────────────────────────────────────────────────────────────

/// One entry in a channel's append-only transition history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelTransition {
    pub at: DateTime<Utc>,
    pub from: ChannelStatus,
    pub to: ChannelStatus,
}

/// A numbered camera/device slot within a work item.
///
/// Channel numbers are caller-supplied and not forced unique within a work
/// item; the engine exposes a lookup so the UI can flag duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEntry {
    pub number: u32,
    #[serde(default)]
    pub status: ChannelStatus,
    #[serde(default)]
    pub previous_status: ChannelStatus,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub touched: bool,
    #[serde(default)]
    pub history: Vec<ChannelTransition>,
}

impl ChannelEntry {
    pub fn new(number: u32) -> Self {
        ChannelEntry {
            number,
            status: ChannelStatus::Unset,
            previous_status: ChannelStatus::Unset,
            note: String::new(),
            touched: false,
            history: Vec::new(),
        }
    }

    /// A channel counts toward round progress once it has been touched and
    /// carries a non-Unset status.
    pub fn is_resolved(&self) -> bool {
        self.touched && self.status.is_set()
    }
}

/// Per-work-item operator checklist. Every field must leave `Unknown` before
/// the round can be finalized; a failed recordings check must name at least
/// one failing recorder slot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Checklist {
    #[serde(default)]
    pub recordings_ok: TriState,
    #[serde(default)]
    pub power_cuts_detected: TriState,
    #[serde(default)]
    pub device_offline: TriState,
    /// Recorder slots flagged as failing when `recordings_ok` is `False`.
    #[serde(default)]
    pub failing_recorders: BTreeMap<String, bool>,
}

impl Checklist {
    /// Field name / value pairs in validation order.
    pub fn fields(&self) -> [(&'static str, TriState); 3] {
        [
            ("recordings_ok", self.recordings_ok),
            ("power_cuts_detected", self.power_cuts_detected),
            ("device_offline", self.device_offline),
        ]
    }

    pub fn has_failing_recorder(&self) -> bool {
        self.failing_recorders.values().any(|failing| *failing)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Round records
// ─────────────────────────────────────────────────────────────────────────────

/// One monitored subject (client/site) checked within a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub subject: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub channels: Vec<ChannelEntry>,
    #[serde(default)]
    pub checklist: Checklist,
}

impl WorkItem {
    pub fn new(id: impl Into<String>, subject: impl Into<String>) -> Self {
        WorkItem {
            id: id.into(),
            subject: subject.into(),
            summary: String::new(),
            channels: Vec::new(),
            checklist: Checklist::default(),
        }
    }

    /// First channel with the given number. Duplicates are legal; the first
    /// entry in list order is the addressable one.
    pub fn channel(&self, number: u32) -> Option<&ChannelEntry> {
        self.channels.iter().find(|c| c.number == number)
    }

    pub fn channel_mut(&mut self, number: u32) -> Option<&mut ChannelEntry> {
        self.channels.iter_mut().find(|c| c.number == number)
    }

    pub fn resolved_channel_count(&self) -> usize {
        self.channels.iter().filter(|c| c.is_resolved()).count()
    }
}

/// A pause window inside a round. `to == None` means the round is still
/// paused; at most one open interval may exist and only in last position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseInterval {
    pub from: DateTime<Utc>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
}

impl PauseInterval {
    pub fn is_open(&self) -> bool {
        self.to.is_none()
    }

    /// Length of this pause, treating an open interval as running until
    /// `effective_now`. Never negative.
    pub fn duration(&self, effective_now: DateTime<Utc>) -> Duration {
        let end = self.to.unwrap_or(effective_now);
        (end - self.from).max(Duration::zero())
    }
}

/// One patrol/monitoring session by one operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub id: String,
    #[serde(default)]
    pub operator: String,
    #[serde(default)]
    pub shift_label: String,
    #[serde(default)]
    pub status: RoundStatus,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pauses: Vec<PauseInterval>,
    #[serde(default)]
    pub work_items: Vec<WorkItem>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub incidents: String,
}

impl Round {
    pub fn new(id: impl Into<String>) -> Self {
        Round {
            id: id.into(),
            operator: String::new(),
            shift_label: String::new(),
            status: RoundStatus::Planned,
            start_time: None,
            end_time: None,
            pauses: Vec::new(),
            work_items: Vec::new(),
            notes: String::new(),
            incidents: String::new(),
        }
    }

    pub fn work_item(&self, id: &str) -> Option<&WorkItem> {
        self.work_items.iter().find(|w| w.id == id)
    }

    pub fn work_item_mut(&mut self, id: &str) -> Option<&mut WorkItem> {
        self.work_items.iter_mut().find(|w| w.id == id)
    }

    pub fn open_pause(&self) -> Option<&PauseInterval> {
        self.pauses.last().filter(|p| p.is_open())
    }
}

/// The persisted form of a finalized round. `duration_ms` and
/// `total_paused_ms` are derived from the stored timestamps and pause list;
/// recomputing them from the record must reproduce the stored values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRecord {
    #[serde(flatten)]
    pub round: Round,
    pub total_paused_ms: i64,
    pub duration_ms: i64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Historical index records
// ─────────────────────────────────────────────────────────────────────────────

/// Where a historical channel status came from. Listed in ascending
/// precedence; `FinalizedRound` wins over the other two when present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    PersistedIndex,
    ManualNotation,
    FinalizedRound,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::PersistedIndex => "persisted_index",
            SourceKind::ManualNotation => "manual_notation",
            SourceKind::FinalizedRound => "finalized_round",
        }
    }

    /// Higher precedence wins when merging sources.
    pub fn precedence(&self) -> u8 {
        match self {
            SourceKind::PersistedIndex => 0,
            SourceKind::ManualNotation => 1,
            SourceKind::FinalizedRound => 2,
        }
    }
}

/// Last-known status of one channel of one subject, as reported by a single
/// source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalChannelRecord {
    pub subject_key: String,
    pub channel: u32,
    pub status: ChannelStatus,
    pub updated_at: DateTime<Utc>,
    pub source: SourceKind,
    /// Owning round for `FinalizedRound` / `ManualNotation` records.
    #[serde(default)]
    pub round_id: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Notifications
// ─────────────────────────────────────────────────────────────────────────────

/// Slot reminder emitted by the scheduler when a slot's wall-clock offset is
/// reached. Delivery is at-most-once per slot per round instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotDue {
    pub slot_index: u32,
    pub subjects: Vec<String>,
}
