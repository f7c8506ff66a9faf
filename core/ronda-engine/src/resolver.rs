//! Merged "last known status" view across the three channel-history sources.
//!
//! Finalized round submissions, manual notations, and the persisted index
//! arrive on independent feeds and any subset may be missing at any time.
//! The resolver keeps the latest snapshot per source and recomputes the
//! merged view whenever one feed updates, without waiting on the other two:
//! a first answer comes from whatever is ready, and per-source readiness
//! flags tell the UI what the answer is missing.
//!
//! Priority per channel: FinalizedRound > ManualNotation > PersistedIndex.
//! Within FinalizedRound only the most recently finalized round containing
//! the subject is considered.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::mpsc::Sender;

use chrono::{DateTime, Utc};
use ronda_model::{HistoricalChannelRecord, SourceKind};
use tracing::{debug, warn};

use crate::error::EngineError;

/// Availability of one source feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceState {
    /// No snapshot received yet.
    #[default]
    Pending,
    Ready,
    /// The feed reported failure; resolution proceeds without it.
    Unavailable,
}

/// Per-source readiness attached to every merged answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceReadiness {
    pub finalized_round: SourceState,
    pub manual_notation: SourceState,
    pub persisted_index: SourceState,
}

impl SourceReadiness {
    pub fn is_complete(&self) -> bool {
        self.states().iter().all(|(_, s)| *s == SourceState::Ready)
    }

    /// Sources that reported failure (not ones merely still pending).
    pub fn unavailable(&self) -> Vec<SourceKind> {
        self.states()
            .iter()
            .filter(|(_, s)| *s == SourceState::Unavailable)
            .map(|(kind, _)| *kind)
            .collect()
    }

    fn states(&self) -> [(SourceKind, SourceState); 3] {
        [
            (SourceKind::FinalizedRound, self.finalized_round),
            (SourceKind::ManualNotation, self.manual_notation),
            (SourceKind::PersistedIndex, self.persisted_index),
        ]
    }
}

/// Merged per-subject view re-emitted to the optional sink on every source
/// change.
#[derive(Debug, Clone)]
pub struct ResolverUpdate {
    pub subject_key: String,
    pub channels: BTreeMap<u32, HistoricalChannelRecord>,
    pub readiness: SourceReadiness,
}

#[derive(Default)]
struct SourceSlot {
    state: SourceState,
    records: Vec<HistoricalChannelRecord>,
}

impl SourceSlot {
    fn subjects(&self) -> BTreeSet<String> {
        self.records.iter().map(|r| r.subject_key.clone()).collect()
    }
}

pub struct HistoricalIndexResolver {
    finalized: SourceSlot,
    manual: SourceSlot,
    index: SourceSlot,
    sink: Option<Sender<ResolverUpdate>>,
}

impl Default for HistoricalIndexResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoricalIndexResolver {
    pub fn new() -> Self {
        HistoricalIndexResolver {
            finalized: SourceSlot::default(),
            manual: SourceSlot::default(),
            index: SourceSlot::default(),
            sink: None,
        }
    }

    /// Re-emits the merged view of every affected subject into `sink` after
    /// each source change.
    pub fn with_sink(sink: Sender<ResolverUpdate>) -> Self {
        HistoricalIndexResolver {
            sink: Some(sink),
            ..Self::new()
        }
    }

    fn slot_mut(&mut self, kind: SourceKind) -> &mut SourceSlot {
        match kind {
            SourceKind::FinalizedRound => &mut self.finalized,
            SourceKind::ManualNotation => &mut self.manual,
            SourceKind::PersistedIndex => &mut self.index,
        }
    }

    /// Replaces one source's snapshot and recomputes. Records tagged with a
    /// different source kind are dropped with a warning rather than
    /// poisoning the merge.
    pub fn apply_update(&mut self, kind: SourceKind, records: Vec<HistoricalChannelRecord>) {
        let slot = self.slot_mut(kind);
        let mut affected = slot.subjects();

        slot.records = records
            .into_iter()
            .filter(|record| {
                if record.source != kind {
                    warn!(
                        expected = kind.as_str(),
                        got = record.source.as_str(),
                        subject = %record.subject_key,
                        "Dropping record with mismatched source kind"
                    );
                    return false;
                }
                true
            })
            .collect();
        slot.state = SourceState::Ready;
        affected.extend(slot.subjects());

        self.emit(affected);
    }

    /// Records a feed failure. Non-fatal: resolution continues from the
    /// remaining sources and the gap shows up in the readiness flags.
    pub fn mark_unavailable(&mut self, kind: SourceKind) {
        let slot = self.slot_mut(kind);
        let affected = slot.subjects();
        slot.records.clear();
        slot.state = SourceState::Unavailable;
        debug!(source = kind.as_str(), "Historical source unavailable");

        self.emit(affected);
    }

    pub fn readiness(&self) -> SourceReadiness {
        SourceReadiness {
            finalized_round: self.finalized.state,
            manual_notation: self.manual.state,
            persisted_index: self.index.state,
        }
    }

    /// The degraded-mode signal for the UI, if any source has failed.
    pub fn degraded(&self) -> Option<EngineError> {
        let missing = self.readiness().unavailable();
        if missing.is_empty() {
            None
        } else {
            Some(EngineError::PartialSourceUnavailable { missing })
        }
    }

    /// Highest-priority record for one channel, or None if no ready source
    /// knows it.
    pub fn resolve(&self, subject_key: &str, channel: u32) -> Option<&HistoricalChannelRecord> {
        self.resolve_finalized(subject_key, channel)
            .or_else(|| self.resolve_manual(subject_key, channel))
            .or_else(|| self.resolve_index(subject_key, channel))
    }

    /// Merged view of every channel any source knows for the subject.
    pub fn resolve_subject(&self, subject_key: &str) -> ResolverUpdate {
        let mut channel_numbers = BTreeSet::new();
        for slot in [&self.finalized, &self.manual, &self.index] {
            channel_numbers.extend(
                slot.records
                    .iter()
                    .filter(|r| r.subject_key == subject_key)
                    .map(|r| r.channel),
            );
        }

        let channels = channel_numbers
            .into_iter()
            .filter_map(|number| {
                self.resolve(subject_key, number)
                    .map(|record| (number, record.clone()))
            })
            .collect();

        ResolverUpdate {
            subject_key: subject_key.to_string(),
            channels,
            readiness: self.readiness(),
        }
    }

    /// Latest finalized round containing the subject, by (end timestamp,
    /// round id) so ties stay deterministic.
    fn latest_finalized_round(&self, subject_key: &str) -> Option<(DateTime<Utc>, &str)> {
        self.finalized
            .records
            .iter()
            .filter(|r| r.subject_key == subject_key)
            .map(|r| (r.updated_at, r.round_id.as_deref().unwrap_or("")))
            .max()
    }

    fn resolve_finalized(
        &self,
        subject_key: &str,
        channel: u32,
    ) -> Option<&HistoricalChannelRecord> {
        let (updated_at, round_id) = self.latest_finalized_round(subject_key)?;
        self.finalized.records.iter().find(|r| {
            r.subject_key == subject_key
                && r.channel == channel
                && r.updated_at == updated_at
                && r.round_id.as_deref().unwrap_or("") == round_id
        })
    }

    /// Freshest manual notation for the channel; ties keep the earliest in
    /// feed order.
    fn resolve_manual(&self, subject_key: &str, channel: u32) -> Option<&HistoricalChannelRecord> {
        self.manual
            .records
            .iter()
            .filter(|r| r.subject_key == subject_key && r.channel == channel)
            .fold(None, |best: Option<&HistoricalChannelRecord>, record| {
                match best {
                    Some(current) if record.updated_at > current.updated_at => Some(record),
                    Some(current) => Some(current),
                    None => Some(record),
                }
            })
    }

    fn resolve_index(&self, subject_key: &str, channel: u32) -> Option<&HistoricalChannelRecord> {
        self.index
            .records
            .iter()
            .find(|r| r.subject_key == subject_key && r.channel == channel)
    }

    fn emit(&self, subjects: BTreeSet<String>) {
        let Some(sink) = &self.sink else {
            return;
        };
        for subject in subjects {
            let update = self.resolve_subject(&subject);
            if sink.send(update).is_err() {
                debug!("Resolver sink dropped, merged updates no longer delivered");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ronda_model::ChannelStatus;
    use std::sync::mpsc;

    fn record(
        kind: SourceKind,
        subject: &str,
        channel: u32,
        status: ChannelStatus,
        age_mins: i64,
        round_id: Option<&str>,
    ) -> HistoricalChannelRecord {
        HistoricalChannelRecord {
            subject_key: subject.to_string(),
            channel,
            status,
            updated_at: Utc::now() - Duration::minutes(age_mins),
            source: kind,
            round_id: round_id.map(|s| s.to_string()),
        }
    }

    fn resolver_with_all_sources() -> HistoricalIndexResolver {
        let mut resolver = HistoricalIndexResolver::new();
        resolver.apply_update(
            SourceKind::FinalizedRound,
            vec![record(
                SourceKind::FinalizedRound,
                "banco central",
                1,
                ChannelStatus::Severe,
                10,
                Some("r2"),
            )],
        );
        resolver.apply_update(
            SourceKind::ManualNotation,
            vec![record(
                SourceKind::ManualNotation,
                "banco central",
                1,
                ChannelStatus::Medium,
                5,
                None,
            )],
        );
        resolver.apply_update(
            SourceKind::PersistedIndex,
            vec![record(
                SourceKind::PersistedIndex,
                "banco central",
                1,
                ChannelStatus::Good,
                1,
                Some("r1"),
            )],
        );
        resolver
    }

    #[test]
    fn finalized_round_wins_then_falls_back_in_priority_order() {
        let mut resolver = resolver_with_all_sources();
        assert_eq!(
            resolver.resolve("banco central", 1).unwrap().source,
            SourceKind::FinalizedRound
        );

        // Finalized feed empties: manual notation takes over.
        resolver.apply_update(SourceKind::FinalizedRound, Vec::new());
        assert_eq!(
            resolver.resolve("banco central", 1).unwrap().source,
            SourceKind::ManualNotation
        );

        // Manual feed fails: the persisted index is the last resort.
        resolver.mark_unavailable(SourceKind::ManualNotation);
        assert_eq!(
            resolver.resolve("banco central", 1).unwrap().source,
            SourceKind::PersistedIndex
        );

        resolver.mark_unavailable(SourceKind::PersistedIndex);
        assert!(resolver.resolve("banco central", 1).is_none());
    }

    #[test]
    fn answers_come_from_whatever_subset_is_ready() {
        let mut resolver = HistoricalIndexResolver::new();
        resolver.apply_update(
            SourceKind::PersistedIndex,
            vec![record(
                SourceKind::PersistedIndex,
                "banco central",
                3,
                ChannelStatus::Medium,
                0,
                None,
            )],
        );

        // Two sources still pending is not a failure.
        assert_eq!(
            resolver.resolve("banco central", 3).unwrap().status,
            ChannelStatus::Medium
        );
        assert!(resolver.degraded().is_none());
        assert_eq!(
            resolver.readiness().finalized_round,
            SourceState::Pending
        );
        assert!(!resolver.readiness().is_complete());
    }

    #[test]
    fn degraded_signal_lists_failed_sources_only() {
        let mut resolver = HistoricalIndexResolver::new();
        resolver.mark_unavailable(SourceKind::FinalizedRound);
        resolver.mark_unavailable(SourceKind::ManualNotation);

        match resolver.degraded() {
            Some(EngineError::PartialSourceUnavailable { missing }) => {
                assert_eq!(
                    missing,
                    vec![SourceKind::FinalizedRound, SourceKind::ManualNotation]
                );
            }
            other => panic!("expected PartialSourceUnavailable, got {other:?}"),
        }
    }

    #[test]
    fn only_the_latest_finalized_round_is_considered() {
        let mut resolver = HistoricalIndexResolver::new();
        resolver.apply_update(
            SourceKind::FinalizedRound,
            vec![
                // Older round knew channel 2.
                record(
                    SourceKind::FinalizedRound,
                    "banco central",
                    2,
                    ChannelStatus::Severe,
                    60,
                    Some("r1"),
                ),
                // Latest round only reports channel 1.
                record(
                    SourceKind::FinalizedRound,
                    "banco central",
                    1,
                    ChannelStatus::Good,
                    5,
                    Some("r2"),
                ),
            ],
        );
        resolver.apply_update(
            SourceKind::PersistedIndex,
            vec![record(
                SourceKind::PersistedIndex,
                "banco central",
                2,
                ChannelStatus::Medium,
                30,
                None,
            )],
        );

        // Channel 1 from the latest round; channel 2 falls through to the
        // index because the stale round no longer counts.
        assert_eq!(
            resolver.resolve("banco central", 1).unwrap().round_id.as_deref(),
            Some("r2")
        );
        assert_eq!(
            resolver.resolve("banco central", 2).unwrap().source,
            SourceKind::PersistedIndex
        );
    }

    #[test]
    fn freshest_manual_notation_wins() {
        let mut resolver = HistoricalIndexResolver::new();
        resolver.apply_update(
            SourceKind::ManualNotation,
            vec![
                record(
                    SourceKind::ManualNotation,
                    "banco central",
                    1,
                    ChannelStatus::Good,
                    60,
                    None,
                ),
                record(
                    SourceKind::ManualNotation,
                    "banco central",
                    1,
                    ChannelStatus::Severe,
                    5,
                    None,
                ),
            ],
        );
        assert_eq!(
            resolver.resolve("banco central", 1).unwrap().status,
            ChannelStatus::Severe
        );
    }

    #[test]
    fn mismatched_source_kind_records_are_dropped() {
        let mut resolver = HistoricalIndexResolver::new();
        resolver.apply_update(
            SourceKind::ManualNotation,
            vec![record(
                SourceKind::FinalizedRound,
                "banco central",
                1,
                ChannelStatus::Good,
                0,
                Some("r1"),
            )],
        );
        assert!(resolver.resolve("banco central", 1).is_none());
        assert_eq!(resolver.readiness().manual_notation, SourceState::Ready);
    }

    #[test]
    fn every_source_change_reemits_the_merged_view() {
        let (sink, rx) = mpsc::channel();
        let mut resolver = HistoricalIndexResolver::with_sink(sink);

        resolver.apply_update(
            SourceKind::PersistedIndex,
            vec![record(
                SourceKind::PersistedIndex,
                "banco central",
                1,
                ChannelStatus::Good,
                10,
                None,
            )],
        );
        let first = rx.try_recv().unwrap();
        assert_eq!(first.subject_key, "banco central");
        assert_eq!(
            first.channels.get(&1).unwrap().source,
            SourceKind::PersistedIndex
        );
        assert_eq!(first.readiness.persisted_index, SourceState::Ready);

        // A higher-priority source arriving re-emits with the override.
        resolver.apply_update(
            SourceKind::FinalizedRound,
            vec![record(
                SourceKind::FinalizedRound,
                "banco central",
                1,
                ChannelStatus::Severe,
                1,
                Some("r9"),
            )],
        );
        let second = rx.try_recv().unwrap();
        assert_eq!(
            second.channels.get(&1).unwrap().source,
            SourceKind::FinalizedRound
        );

        // Losing a source re-emits the shrunken view for its subjects.
        resolver.mark_unavailable(SourceKind::FinalizedRound);
        let third = rx.try_recv().unwrap();
        assert_eq!(
            third.channels.get(&1).unwrap().source,
            SourceKind::PersistedIndex
        );
        assert_eq!(third.readiness.finalized_round, SourceState::Unavailable);
    }

    #[test]
    fn resolution_is_deterministic_for_identical_snapshots() {
        let resolver_a = resolver_with_all_sources();
        let resolver_b = resolver_with_all_sources();
        assert_eq!(
            resolver_a.resolve("banco central", 1).map(|r| r.status),
            resolver_b.resolve("banco central", 1).map(|r| r.status)
        );
    }
}
