//! Error types for round engine operations.
//!
//! State-machine and validation errors are returned synchronously and never
//! swallowed. Persistence and source-availability problems are degraded-mode
//! signals: callers keep working with partial data and own the retry policy.

use ronda_model::{RoundStatus, SourceKind};

use crate::validate::Issue;

/// Which external write failed during finalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistTarget {
    RoundStore,
    PersistedIndex,
}

impl PersistTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersistTarget::RoundStore => "round store",
            PersistTarget::PersistedIndex => "persisted index",
        }
    }
}

/// All errors that can occur in round engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    // ─────────────────────────────────────────────────────────────────────
    // State machine
    // ─────────────────────────────────────────────────────────────────────
    #[error("illegal transition: cannot {requested} while round is {}", .from.as_str())]
    InvalidTransition {
        from: RoundStatus,
        requested: &'static str,
    },

    #[error("completion blocked: {} issue(s) outstanding", .issues.len())]
    ValidationFailed { issues: Vec<Issue> },

    #[error("malformed pause sequence: {reason}")]
    MalformedPauseSequence { reason: String },

    // ─────────────────────────────────────────────────────────────────────
    // Round structure
    // ─────────────────────────────────────────────────────────────────────
    #[error("work item limit reached ({max})")]
    WorkItemLimitReached { max: usize },

    #[error("unknown work item: {0}")]
    UnknownWorkItem(String),

    #[error("unknown channel {channel} in work item {work_item}")]
    UnknownChannel { work_item: String, channel: u32 },

    // ─────────────────────────────────────────────────────────────────────
    // External collaborators
    // ─────────────────────────────────────────────────────────────────────
    #[error("{} write failed: {details}", .target.as_str())]
    PersistenceFailure {
        target: PersistTarget,
        details: String,
    },

    #[error("historical sources unavailable: {}", describe_sources(.missing))]
    PartialSourceUnavailable { missing: Vec<SourceKind> },
}

fn describe_sources(missing: &[SourceKind]) -> String {
    missing
        .iter()
        .map(|kind| kind.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convenience alias for Results using EngineError.
pub type Result<T> = std::result::Result<T, EngineError>;
