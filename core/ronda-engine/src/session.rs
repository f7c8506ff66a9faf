//! The round session state machine.
//!
//! One `RoundSession` is owned by one operator terminal and mutated by that
//! operator's action stream only; there are no module-level singletons, so
//! independent sessions coexist trivially. Timer threads communicate through
//! the slot-due sink and never reach back into the session.
//!
//! Lifecycle: `Planned → Running ↔ Paused → Completed`. Every illegal move
//! returns [`EngineError::InvalidTransition`]; nothing is silently ignored.
//!
//! Each public transition has a `*_at` variant taking the caller's clock.
//! The convenience forms stamp `Utc::now()`; tests drive the `_at` forms
//! with fixed timestamps.

use std::sync::mpsc::Sender;

use chrono::{DateTime, Duration, Utc};
use ronda_model::{
    normalize_subject_key, ChannelStatus, PauseInterval, Round, RoundRecord, RoundStatus, SlotDue,
    TriState, WorkItem,
};
use tracing::{info, warn};
use ulid::Ulid;

use crate::catalog::SubjectCatalog;
use crate::config::EngineConfig;
use crate::elapsed;
use crate::error::{EngineError, PersistTarget, Result};
use crate::ledger;
use crate::scheduler::{self, PendingSlot, SlotPlan, SlotScheduler};
use crate::store::{IndexStore, RoundStore};
use crate::validate::{self, Issue, ROUND_SUBJECT};

/// Result of a successful finalization.
///
/// The round is Completed even when writes failed: persistence problems are
/// degraded-mode warnings the caller may retry via
/// [`RoundSession::retry_persist`], never a rollback of the state machine.
#[derive(Debug)]
pub struct FinalizeOutcome {
    pub record: RoundRecord,
    pub warnings: Vec<EngineError>,
}

impl FinalizeOutcome {
    pub fn fully_persisted(&self) -> bool {
        self.warnings.is_empty()
    }
}

pub struct RoundSession {
    round: Round,
    config: EngineConfig,
    catalog: SubjectCatalog,
    scheduler: SlotScheduler,
    plan: Option<SlotPlan>,
    suspended_slots: Vec<PendingSlot>,
    round_store: RoundStore,
    index_store: IndexStore,
}

impl RoundSession {
    pub fn new(
        config: EngineConfig,
        catalog: SubjectCatalog,
        sink: Sender<SlotDue>,
        round_store: RoundStore,
        index_store: IndexStore,
    ) -> Self {
        RoundSession {
            round: Round::new(Ulid::new().to_string()),
            config,
            catalog,
            scheduler: SlotScheduler::new(sink),
            plan: None,
            suspended_slots: Vec::new(),
            round_store,
            index_store,
        }
    }

    pub fn round(&self) -> &Round {
        &self.round
    }

    pub fn status(&self) -> RoundStatus {
        self.round.status
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn round_store(&self) -> &RoundStore {
        &self.round_store
    }

    pub fn index_store(&self) -> &IndexStore {
        &self.index_store
    }

    /// Timers currently armed; the dashboard surfaces this as "reminders
    /// pending".
    pub fn armed_slot_count(&self) -> usize {
        self.scheduler.armed_count()
    }

    /// The slot assignment for the running round, for the dashboard's
    /// pacing view. None until start.
    pub fn slot_plan(&self) -> Option<&SlotPlan> {
        self.plan.as_ref()
    }

    fn ensure_mutable(&self, requested: &'static str) -> Result<()> {
        if self.round.status.is_terminal() {
            return Err(EngineError::InvalidTransition {
                from: self.round.status,
                requested,
            });
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Round setup
    // ─────────────────────────────────────────────────────────────────────

    pub fn set_operator(&mut self, operator: impl Into<String>) -> Result<()> {
        self.ensure_mutable("set operator")?;
        self.round.operator = operator.into();
        Ok(())
    }

    pub fn set_shift_label(&mut self, label: impl Into<String>) -> Result<()> {
        self.ensure_mutable("set shift label")?;
        self.round.shift_label = label.into();
        Ok(())
    }

    pub fn set_notes(&mut self, notes: impl Into<String>) -> Result<()> {
        self.ensure_mutable("set notes")?;
        self.round.notes = notes.into();
        Ok(())
    }

    pub fn set_incidents(&mut self, incidents: impl Into<String>) -> Result<()> {
        self.ensure_mutable("set incidents")?;
        self.round.incidents = incidents.into();
        Ok(())
    }

    /// Adds a work item and returns its id. Subjects outside the catalog are
    /// accepted with a log entry; operators sometimes check sites ahead of
    /// the catalog sync.
    pub fn add_work_item(&mut self, subject: impl Into<String>) -> Result<String> {
        self.ensure_mutable("add work item")?;
        if self.round.work_items.len() >= self.config.max_work_items {
            return Err(EngineError::WorkItemLimitReached {
                max: self.config.max_work_items,
            });
        }

        let subject = subject.into();
        if !self.catalog.is_empty() && !self.catalog.contains(&subject) {
            warn!(subject = %subject, "Work item subject not in catalog");
        }

        let id = Ulid::new().to_string();
        self.round.work_items.push(WorkItem::new(id.clone(), subject));
        Ok(id)
    }

    pub fn remove_work_item(&mut self, work_item_id: &str) -> Result<()> {
        self.ensure_mutable("remove work item")?;
        let position = self
            .round
            .work_items
            .iter()
            .position(|item| item.id == work_item_id)
            .ok_or_else(|| EngineError::UnknownWorkItem(work_item_id.to_string()))?;
        self.round.work_items.remove(position);
        Ok(())
    }

    pub fn set_work_item_summary(
        &mut self,
        work_item_id: &str,
        summary: impl Into<String>,
    ) -> Result<()> {
        self.ensure_mutable("edit work item")?;
        self.work_item_mut(work_item_id)?.summary = summary.into();
        Ok(())
    }

    fn work_item_mut(&mut self, work_item_id: &str) -> Result<&mut WorkItem> {
        self.round
            .work_item_mut(work_item_id)
            .ok_or_else(|| EngineError::UnknownWorkItem(work_item_id.to_string()))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Channel ledger
    // ─────────────────────────────────────────────────────────────────────

    pub fn set_channel_status(
        &mut self,
        work_item_id: &str,
        channel: u32,
        status: ChannelStatus,
    ) -> Result<()> {
        self.set_channel_status_at(work_item_id, channel, status, Utc::now())
    }

    pub fn set_channel_status_at(
        &mut self,
        work_item_id: &str,
        channel: u32,
        status: ChannelStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_mutable("update channel status")?;
        ledger::set_status(self.work_item_mut(work_item_id)?, channel, status, at)
    }

    pub fn set_channel_note(
        &mut self,
        work_item_id: &str,
        channel: u32,
        note: impl Into<String>,
    ) -> Result<()> {
        self.ensure_mutable("update channel note")?;
        ledger::set_note(self.work_item_mut(work_item_id)?, channel, note)
    }

    /// Appends a channel with the next free number and returns it.
    pub fn add_channel(&mut self, work_item_id: &str) -> Result<u32> {
        self.ensure_mutable("add channel")?;
        Ok(ledger::add_channel(self.work_item_mut(work_item_id)?))
    }

    pub fn add_channel_numbered(&mut self, work_item_id: &str, number: u32) -> Result<()> {
        self.ensure_mutable("add channel")?;
        ledger::add_channel_numbered(self.work_item_mut(work_item_id)?, number);
        Ok(())
    }

    pub fn remove_channel(&mut self, work_item_id: &str, channel: u32) -> Result<()> {
        self.ensure_mutable("remove channel")?;
        ledger::remove_channel(self.work_item_mut(work_item_id)?, channel)
    }

    /// Whether a channel number already exists in the work item, for the
    /// UI's "used elsewhere" hint. Duplicates stay legal.
    pub fn channel_number_in_use(&self, work_item_id: &str, number: u32) -> Result<bool> {
        let item = self
            .round
            .work_item(work_item_id)
            .ok_or_else(|| EngineError::UnknownWorkItem(work_item_id.to_string()))?;
        Ok(ledger::channel_number_in_use(item, number))
    }

    pub fn work_item_progress(&self, work_item_id: &str) -> Result<f64> {
        let item = self
            .round
            .work_item(work_item_id)
            .ok_or_else(|| EngineError::UnknownWorkItem(work_item_id.to_string()))?;
        Ok(ledger::progress(item))
    }

    /// Resolved fraction across every channel of every work item.
    pub fn round_progress(&self) -> f64 {
        let total: usize = self.round.work_items.iter().map(|i| i.channels.len()).sum();
        if total == 0 {
            return 1.0;
        }
        let resolved: usize = self
            .round
            .work_items
            .iter()
            .map(|i| i.resolved_channel_count())
            .sum();
        resolved as f64 / total as f64
    }

    // ─────────────────────────────────────────────────────────────────────
    // Checklist
    // ─────────────────────────────────────────────────────────────────────

    pub fn set_recordings_ok(&mut self, work_item_id: &str, value: TriState) -> Result<()> {
        self.ensure_mutable("update checklist")?;
        self.work_item_mut(work_item_id)?.checklist.recordings_ok = value;
        Ok(())
    }

    pub fn set_power_cuts_detected(&mut self, work_item_id: &str, value: TriState) -> Result<()> {
        self.ensure_mutable("update checklist")?;
        self.work_item_mut(work_item_id)?
            .checklist
            .power_cuts_detected = value;
        Ok(())
    }

    pub fn set_device_offline(&mut self, work_item_id: &str, value: TriState) -> Result<()> {
        self.ensure_mutable("update checklist")?;
        self.work_item_mut(work_item_id)?.checklist.device_offline = value;
        Ok(())
    }

    pub fn flag_recorder(
        &mut self,
        work_item_id: &str,
        slot: impl Into<String>,
        failing: bool,
    ) -> Result<()> {
        self.ensure_mutable("update checklist")?;
        self.work_item_mut(work_item_id)?
            .checklist
            .failing_recorders
            .insert(slot.into(), failing);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Elapsed time
    // ─────────────────────────────────────────────────────────────────────

    pub fn elapsed(&self) -> Duration {
        self.elapsed_at(Utc::now())
    }

    pub fn elapsed_at(&self, now: DateTime<Utc>) -> Duration {
        elapsed::elapsed(
            now,
            self.round.start_time,
            self.round.end_time,
            &self.round.pauses,
        )
    }

    pub fn total_paused_at(&self, now: DateTime<Utc>) -> Duration {
        elapsed::total_paused(now, self.round.end_time, &self.round.pauses)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Transitions
    // ─────────────────────────────────────────────────────────────────────

    pub fn start(&mut self) -> Result<()> {
        self.start_at(Utc::now())
    }

    pub fn start_at(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.round.status != RoundStatus::Planned {
            return Err(EngineError::InvalidTransition {
                from: self.round.status,
                requested: "start",
            });
        }

        let mut issues = Vec::new();
        if self.round.operator.trim().is_empty() {
            issues.push(Issue {
                subject: ROUND_SUBJECT.to_string(),
                field: "operator".to_string(),
                message: "an operator must be selected before starting".to_string(),
            });
        }
        if self.round.work_items.is_empty() {
            issues.push(Issue {
                subject: ROUND_SUBJECT.to_string(),
                field: "work items".to_string(),
                message: "at least one work item is required".to_string(),
            });
        }
        if !issues.is_empty() {
            return Err(EngineError::ValidationFailed { issues });
        }

        self.round.start_time = Some(now);
        self.round.status = RoundStatus::Running;

        let plan = scheduler::plan(
            &self.round.work_items,
            self.config.shift_duration(),
            self.config.slot_count,
        );
        self.scheduler.arm(&plan, now, now);
        self.plan = Some(plan);

        info!(
            round_id = %self.round.id,
            operator = %self.round.operator,
            work_items = self.round.work_items.len(),
            "Round started"
        );
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        self.pause_at(Utc::now())
    }

    pub fn pause_at(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.round.status != RoundStatus::Running {
            return Err(EngineError::InvalidTransition {
                from: self.round.status,
                requested: "pause",
            });
        }

        if self.round.open_pause().is_some() {
            return Err(EngineError::MalformedPauseSequence {
                reason: "running round already has an open pause interval".to_string(),
            });
        }
        self.round.pauses.push(PauseInterval { from: now, to: None });
        self.round.status = RoundStatus::Paused;

        if self.config.defer_slots_while_paused {
            self.suspended_slots = self.scheduler.suspend();
        }

        info!(round_id = %self.round.id, "Round paused");
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        self.resume_at(Utc::now())
    }

    pub fn resume_at(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.round.status != RoundStatus::Paused {
            return Err(EngineError::InvalidTransition {
                from: self.round.status,
                requested: "resume",
            });
        }

        self.close_open_pause(now)?;
        self.round.status = RoundStatus::Running;

        if self.config.defer_slots_while_paused && !self.suspended_slots.is_empty() {
            let pending = std::mem::take(&mut self.suspended_slots);
            let active = self.elapsed_at(now);
            self.scheduler.resume(pending, active);
        }

        info!(round_id = %self.round.id, "Round resumed");
        Ok(())
    }

    pub fn finalize(&mut self) -> Result<FinalizeOutcome> {
        self.finalize_at(Utc::now())
    }

    pub fn finalize_at(&mut self, now: DateTime<Utc>) -> Result<FinalizeOutcome> {
        if !matches!(
            self.round.status,
            RoundStatus::Running | RoundStatus::Paused
        ) {
            return Err(EngineError::InvalidTransition {
                from: self.round.status,
                requested: "finalize",
            });
        }

        // Gate before touching any state so a blocked finalize leaves the
        // round exactly as it was (still Paused, pause still open).
        let issues = validate::validate(&self.round, &self.config);
        if !issues.is_empty() {
            return Err(EngineError::ValidationFailed { issues });
        }

        elapsed::validate_pause_sequence(&self.round.pauses)?;
        if self.round.status == RoundStatus::Paused {
            self.close_open_pause(now)?;
        }

        self.round.end_time = Some(now);
        self.round.status = RoundStatus::Completed;
        self.scheduler.cancel_all();
        self.suspended_slots.clear();
        self.plan = None;

        let total_paused_ms = self
            .total_paused_at(now)
            .num_milliseconds();
        let duration_ms = self.elapsed_at(now).num_milliseconds();

        let record = RoundRecord {
            round: self.round.clone(),
            total_paused_ms,
            duration_ms,
        };

        self.round_store.upsert(record.clone());
        for item in &self.round.work_items {
            let subject_key = normalize_subject_key(&item.subject);
            for channel in item.channels.iter().filter(|c| c.status.is_set()) {
                self.index_store.upsert(
                    &subject_key,
                    channel.number,
                    channel.status,
                    Some(self.round.id.clone()),
                    now,
                );
            }
        }

        let warnings = self.persist_stores();
        info!(
            round_id = %self.round.id,
            duration_ms,
            total_paused_ms,
            degraded = !warnings.is_empty(),
            "Round finalized"
        );

        Ok(FinalizeOutcome { record, warnings })
    }

    /// Discards the in-memory round and returns to a fresh Planned instance.
    /// Always legal; cancels every armed timer.
    pub fn reset(&mut self) {
        self.scheduler.cancel_all();
        self.suspended_slots.clear();
        self.plan = None;
        let previous = std::mem::replace(&mut self.round, Round::new(Ulid::new().to_string()));
        info!(discarded_round = %previous.id, "Round session reset");
    }

    /// Re-attempts the store writes after a degraded finalize. Returns the
    /// failures still outstanding (empty when everything landed).
    pub fn retry_persist(&self) -> Vec<EngineError> {
        self.persist_stores()
    }

    fn persist_stores(&self) -> Vec<EngineError> {
        let mut warnings = Vec::new();

        if self.round_store.is_file_backed() {
            if let Err(details) = self.round_store.save() {
                warn!(error = %details, "Round store write failed");
                warnings.push(EngineError::PersistenceFailure {
                    target: PersistTarget::RoundStore,
                    details,
                });
            }
        }
        if self.index_store.is_file_backed() {
            if let Err(details) = self.index_store.save() {
                warn!(error = %details, "Channel index write failed");
                warnings.push(EngineError::PersistenceFailure {
                    target: PersistTarget::PersistedIndex,
                    details,
                });
            }
        }
        warnings
    }

    fn close_open_pause(&mut self, now: DateTime<Utc>) -> Result<()> {
        let open = self
            .round
            .pauses
            .last_mut()
            .filter(|p| p.is_open())
            .ok_or_else(|| EngineError::MalformedPauseSequence {
                reason: "paused round has no open pause interval".to_string(),
            })?;
        open.to = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn session() -> (RoundSession, mpsc::Receiver<SlotDue>) {
        let (sink, rx) = mpsc::channel();
        let session = RoundSession::new(
            EngineConfig::default(),
            SubjectCatalog::from_names(["Banco Central", "Deposito Norte"]),
            sink,
            RoundStore::new_in_memory(),
            IndexStore::new_in_memory(),
        );
        (session, rx)
    }

    /// Session with one fully answered work item, ready to finalize.
    fn ready_session() -> (RoundSession, String, mpsc::Receiver<SlotDue>) {
        let (mut session, rx) = session();
        session.set_operator("gomez").unwrap();
        let item = session.add_work_item("Banco Central").unwrap();
        session.set_recordings_ok(&item, TriState::True).unwrap();
        session
            .set_power_cuts_detected(&item, TriState::False)
            .unwrap();
        session.set_device_offline(&item, TriState::False).unwrap();
        (session, item, rx)
    }

    #[test]
    fn new_session_is_planned_with_fresh_round() {
        let (session, _rx) = session();
        assert_eq!(session.status(), RoundStatus::Planned);
        assert!(session.round().start_time.is_none());
        assert!(!session.round().id.is_empty());
    }

    #[test]
    fn start_requires_operator_and_work_item() {
        let (mut session, _rx) = session();
        let err = session.start().unwrap_err();
        match err {
            EngineError::ValidationFailed { issues } => {
                assert_eq!(issues.len(), 2);
                assert!(issues.iter().any(|i| i.field == "operator"));
                assert!(issues.iter().any(|i| i.field == "work items"));
            }
            other => panic!("expected ValidationFailed, got {other:?}"),
        }
        assert_eq!(session.status(), RoundStatus::Planned);
    }

    #[test]
    fn illegal_transitions_are_rejected_with_both_states() {
        let (mut session, _item, _rx) = ready_session();

        assert!(matches!(
            session.pause().unwrap_err(),
            EngineError::InvalidTransition {
                from: RoundStatus::Planned,
                requested: "pause"
            }
        ));
        assert!(matches!(
            session.resume().unwrap_err(),
            EngineError::InvalidTransition {
                from: RoundStatus::Planned,
                requested: "resume"
            }
        ));
        assert!(matches!(
            session.finalize().unwrap_err(),
            EngineError::InvalidTransition {
                from: RoundStatus::Planned,
                requested: "finalize"
            }
        ));

        session.start().unwrap();
        assert!(matches!(
            session.start().unwrap_err(),
            EngineError::InvalidTransition {
                from: RoundStatus::Running,
                requested: "start"
            }
        ));
    }

    #[test]
    fn pause_resume_cycle_records_intervals() {
        let (mut session, _item, _rx) = ready_session();
        let t0 = Utc::now();
        session.start_at(t0).unwrap();

        session.pause_at(t0 + Duration::minutes(10)).unwrap();
        assert_eq!(session.status(), RoundStatus::Paused);
        assert!(session.round().open_pause().is_some());

        session.resume_at(t0 + Duration::minutes(25)).unwrap();
        assert_eq!(session.status(), RoundStatus::Running);
        assert!(session.round().open_pause().is_none());
        assert_eq!(session.round().pauses.len(), 1);

        assert_eq!(
            session.elapsed_at(t0 + Duration::minutes(40)),
            Duration::minutes(25)
        );
    }

    #[test]
    fn finalize_computes_durations_and_persists() {
        let (mut session, item, _rx) = ready_session();
        session.add_channel(&item).unwrap();
        session
            .set_channel_status(&item, 1, ChannelStatus::Good)
            .unwrap();

        let t0 = Utc::now();
        session.start_at(t0).unwrap();
        session.pause_at(t0 + Duration::minutes(10)).unwrap();
        session.resume_at(t0 + Duration::minutes(25)).unwrap();

        let outcome = session.finalize_at(t0 + Duration::minutes(40)).unwrap();
        assert!(outcome.fully_persisted());
        assert_eq!(outcome.record.total_paused_ms, 15 * 60 * 1000);
        assert_eq!(outcome.record.duration_ms, 25 * 60 * 1000);
        assert_eq!(session.status(), RoundStatus::Completed);

        // Round store holds the record, index got the channel flush.
        let round_id = session.round().id.clone();
        assert!(session.round_store().get(&round_id).is_some());
        let indexed = session.index_store().get("banco central", 1).unwrap();
        assert_eq!(indexed.status, ChannelStatus::Good);
        assert_eq!(indexed.round_id.as_deref(), Some(round_id.as_str()));
    }

    #[test]
    fn finalize_from_paused_closes_the_open_pause() {
        let (mut session, _item, _rx) = ready_session();
        let t0 = Utc::now();
        session.start_at(t0).unwrap();
        session.pause_at(t0 + Duration::minutes(30)).unwrap();

        let outcome = session.finalize_at(t0 + Duration::minutes(45)).unwrap();
        assert_eq!(outcome.record.round.pauses.len(), 1);
        assert!(!outcome.record.round.pauses[0].is_open());
        assert_eq!(outcome.record.total_paused_ms, 15 * 60 * 1000);
        assert_eq!(outcome.record.duration_ms, 30 * 60 * 1000);
    }

    #[test]
    fn blocked_finalize_reports_all_issues_and_changes_nothing() {
        let (mut session, _rx) = session();
        session.set_operator("gomez").unwrap();
        let item = session.add_work_item("Banco Central").unwrap();
        // recordings_ok answered False without a flagged recorder; the other
        // two fields left Unknown.
        session.set_recordings_ok(&item, TriState::False).unwrap();

        let t0 = Utc::now();
        session.start_at(t0).unwrap();
        session.pause_at(t0 + Duration::minutes(5)).unwrap();

        let err = session.finalize_at(t0 + Duration::minutes(6)).unwrap_err();
        match err {
            EngineError::ValidationFailed { issues } => {
                assert_eq!(issues.len(), 3);
                assert!(issues.iter().any(|i| i.field == "power_cuts_detected"));
                assert!(issues.iter().any(|i| i.field == "device_offline"));
                assert!(issues.iter().any(|i| i.field == "failing recorders"));
            }
            other => panic!("expected ValidationFailed, got {other:?}"),
        }

        // Still paused, pause still open, nothing persisted.
        assert_eq!(session.status(), RoundStatus::Paused);
        assert!(session.round().open_pause().is_some());
        assert!(session.round_store().is_empty());
    }

    #[test]
    fn flagging_a_recorder_unblocks_a_failed_recordings_check() {
        let (mut session, item, _rx) = ready_session();
        session.set_recordings_ok(&item, TriState::False).unwrap();
        session.start().unwrap();

        assert!(matches!(
            session.finalize(),
            Err(EngineError::ValidationFailed { .. })
        ));
        assert_eq!(session.status(), RoundStatus::Running);

        session.flag_recorder(&item, "recorder-3", true).unwrap();
        session.finalize().unwrap();
        assert_eq!(session.status(), RoundStatus::Completed);
    }

    #[test]
    fn completed_round_rejects_all_mutation() {
        let (mut session, item, _rx) = ready_session();
        session.start().unwrap();
        session.finalize().unwrap();

        assert!(matches!(
            session.set_channel_status(&item, 1, ChannelStatus::Good),
            Err(EngineError::InvalidTransition {
                from: RoundStatus::Completed,
                ..
            })
        ));
        assert!(session.add_work_item("Deposito Norte").is_err());
        assert!(session.add_channel(&item).is_err());
        assert!(session.set_notes("late edit").is_err());
        assert!(session.finalize().is_err());
    }

    #[test]
    fn work_item_limit_is_enforced() {
        let (sink, _rx) = mpsc::channel();
        let mut config = EngineConfig::default();
        config.max_work_items = 2;
        let mut session = RoundSession::new(
            config,
            SubjectCatalog::default(),
            sink,
            RoundStore::new_in_memory(),
            IndexStore::new_in_memory(),
        );

        session.add_work_item("A").unwrap();
        session.add_work_item("B").unwrap();
        assert!(matches!(
            session.add_work_item("C"),
            Err(EngineError::WorkItemLimitReached { max: 2 })
        ));
    }

    #[test]
    fn start_arms_one_timer_per_occupied_slot() {
        let (mut session, _item, _rx) = ready_session();
        for subject in ["Deposito Norte", "Sucursal Sur", "Planta Baja", "Anexo"] {
            session.add_work_item(subject).unwrap();
        }

        session.start().unwrap();
        assert_eq!(session.armed_slot_count(), 5);
    }

    #[test]
    fn reset_cancels_timers_and_yields_fresh_round() {
        let (mut session, _item, rx) = ready_session();
        session.start().unwrap();
        let old_id = session.round().id.clone();

        session.reset();
        assert_eq!(session.status(), RoundStatus::Planned);
        assert_ne!(session.round().id, old_id);
        assert_eq!(session.armed_slot_count(), 0);
        assert!(session.round().work_items.is_empty());

        // Slot 0 was due immediately but may have fired before reset; the
        // remaining 63 slots never fire.
        std::thread::sleep(std::time::Duration::from_millis(100));
        let mut late = 0;
        while let Ok(due) = rx.try_recv() {
            assert_eq!(due.slot_index, 0);
            late += 1;
        }
        assert!(late <= 1);
    }

    #[test]
    fn deferred_slots_wait_out_the_pause() {
        let (sink, rx) = mpsc::channel();
        let mut config = EngineConfig::default();
        // One slot per second so the test can observe a deferral.
        config.shift_minutes = 1;
        config.slot_count = 60;
        config.defer_slots_while_paused = true;
        let mut session = RoundSession::new(
            config,
            SubjectCatalog::default(),
            sink,
            RoundStore::new_in_memory(),
            IndexStore::new_in_memory(),
        );
        session.set_operator("gomez").unwrap();
        session.add_work_item("A").unwrap();
        session.add_work_item("B").unwrap();

        session.start().unwrap();
        let first = rx
            .recv_timeout(std::time::Duration::from_secs(2))
            .unwrap();
        assert_eq!(first.slot_index, 0);

        // Pause before slot 1 (due at +1s) fires; the pause holds it back
        // past its wall-clock due time.
        session.pause().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(1300));
        assert!(rx.try_recv().is_err());

        session.resume().unwrap();
        let second = rx
            .recv_timeout(std::time::Duration::from_secs(3))
            .unwrap();
        assert_eq!(second.slot_index, 1);
    }

    #[test]
    fn duplicate_channel_numbers_are_reported_not_rejected() {
        let (mut session, item, _rx) = ready_session();
        session.add_channel_numbered(&item, 4).unwrap();
        assert!(session.channel_number_in_use(&item, 4).unwrap());
        session.add_channel_numbered(&item, 4).unwrap();
        assert_eq!(session.round().work_items[0].channels.len(), 2);
    }

    #[test]
    fn round_progress_aggregates_across_items() {
        let (mut session, first, _rx) = ready_session();
        let second = session.add_work_item("Deposito Norte").unwrap();
        session.add_channel(&first).unwrap();
        session.add_channel(&second).unwrap();

        assert_eq!(session.round_progress(), 0.0);
        session
            .set_channel_status(&first, 1, ChannelStatus::Severe)
            .unwrap();
        assert_eq!(session.round_progress(), 0.5);
        assert_eq!(session.work_item_progress(&first).unwrap(), 1.0);
    }
}
