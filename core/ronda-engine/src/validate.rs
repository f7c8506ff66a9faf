//! Completion gate for a round.
//!
//! Produces the full list of outstanding issues, never just the first: the
//! operator sees everything blocking finalization at once.

use std::fmt;

use ronda_model::{Round, TriState};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;

/// Round-level issues carry this in place of a work-item subject.
pub const ROUND_SUBJECT: &str = "round";

/// One problem blocking finalization, addressed to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Subject of the owning work item, or [`ROUND_SUBJECT`].
    pub subject: String,
    /// Human-readable field name the operator must fix.
    pub field: String,
    pub message: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.subject, self.field, self.message)
    }
}

/// Evaluates every completion rule in order and collects all violations.
/// An empty result means the round may be finalized.
pub fn validate(round: &Round, config: &EngineConfig) -> Vec<Issue> {
    let mut issues = Vec::new();

    // 1. Aggregate resolved-channel threshold across the whole round.
    let resolved: usize = round
        .work_items
        .iter()
        .map(|item| item.resolved_channel_count())
        .sum();
    if resolved < config.minimum_channels_required as usize {
        issues.push(Issue {
            subject: ROUND_SUBJECT.to_string(),
            field: "channels reviewed".to_string(),
            message: format!(
                "{resolved} channel(s) reviewed, at least {} required",
                config.minimum_channels_required
            ),
        });
    }

    // 2. Every checklist field answered.
    for item in &round.work_items {
        for (field, value) in item.checklist.fields() {
            if !value.is_answered() {
                issues.push(Issue {
                    subject: item.subject.clone(),
                    field: field.to_string(),
                    message: "checklist field not answered".to_string(),
                });
            }
        }
    }

    // 3. A failed recordings check must name the failing recorder.
    for item in &round.work_items {
        if item.checklist.recordings_ok == TriState::False
            && !item.checklist.has_failing_recorder()
        {
            issues.push(Issue {
                subject: item.subject.clone(),
                field: "failing recorders".to_string(),
                message: "recordings marked failing but no recorder slot flagged".to_string(),
            });
        }
    }

    issues
}
