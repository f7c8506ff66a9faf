//! Slot planning and reminder timers for a round.
//!
//! The shift is divided into a fixed number of equal slots and work items
//! are dealt round-robin over them in list order. Arming spawns one one-shot
//! timer thread per occupied slot; each fires a [`SlotDue`] into the
//! caller-supplied sink and exits. Timers communicate only outward; they
//! never touch round state, so the state machine stays single-threaded in
//! effect and the scheduler is testable without a display.
//!
//! Reminders are wall-clock offsets from round start. Pauses do not shift
//! them unless the session runs with `defer_slots_while_paused`, in which
//! case the session suspends pending timers on pause and re-arms them with
//! their remaining active-time delay on resume.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Duration, Utc};
use ronda_model::{SlotDue, WorkItem};
use tracing::debug;

/// Deterministic slot assignment for one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotPlan {
    slot_length: Duration,
    slots: Vec<Vec<String>>,
}

impl SlotPlan {
    pub fn slot_count(&self) -> u32 {
        self.slots.len() as u32
    }

    pub fn slot_length(&self) -> Duration {
        self.slot_length
    }

    pub fn subjects_in_slot(&self, slot_index: u32) -> &[String] {
        self.slots
            .get(slot_index as usize)
            .map(|s| s.as_slice())
            .unwrap_or(&[])
    }

    /// Occupied slots in ascending index order.
    pub fn occupied(&self) -> impl Iterator<Item = (u32, &Vec<String>)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, subjects)| !subjects.is_empty())
            .map(|(index, subjects)| (index as u32, subjects))
    }
}

/// Partitions work items over `slot_count` slots: item `i` lands in slot
/// `i mod slot_count`. Pure in the input order: no hashing, no rebalancing.
pub fn plan(work_items: &[WorkItem], shift_duration: Duration, slot_count: u32) -> SlotPlan {
    let slot_count = slot_count.max(1) as usize;
    let slot_length = shift_duration / slot_count as i32;

    let mut slots = vec![Vec::new(); slot_count];
    for (index, item) in work_items.iter().enumerate() {
        slots[index % slot_count].push(item.subject.clone());
    }

    SlotPlan { slot_length, slots }
}

/// A slot whose timer was suspended before firing, carrying the active-time
/// offset it is still owed.
#[derive(Debug, Clone)]
pub struct PendingSlot {
    pub slot_index: u32,
    pub subjects: Vec<String>,
    fire_offset: Duration,
}

struct ArmedTimer {
    slot_index: u32,
    /// Offset from round start (active time when deferral is on).
    fire_offset: Duration,
    subjects: Vec<String>,
    cancel_tx: Sender<()>,
    fired: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Arms and cancels the one-shot reminder timers for one round instance.
///
/// Dropping the scheduler cancels everything still armed, so an abandoned
/// session cannot leak timers into the next round.
pub struct SlotScheduler {
    sink: Sender<SlotDue>,
    timers: Vec<ArmedTimer>,
}

impl SlotScheduler {
    pub fn new(sink: Sender<SlotDue>) -> Self {
        SlotScheduler {
            sink,
            timers: Vec::new(),
        }
    }

    /// Number of timers currently armed (fired timers are only removed on
    /// the next cancel/suspend sweep).
    pub fn armed_count(&self) -> usize {
        self.timers.len()
    }

    /// Arms one timer per occupied slot, firing at
    /// `round_start + slot_index * slot_length`. Any previously armed timers
    /// are cancelled first; a round instance owns at most one armed set.
    pub fn arm(&mut self, plan: &SlotPlan, round_start: DateTime<Utc>, now: DateTime<Utc>) {
        self.cancel_all();
        for (slot_index, subjects) in plan.occupied() {
            let fire_offset = plan.slot_length() * slot_index as i32;
            let delay = (round_start + fire_offset - now).max(Duration::zero());
            self.spawn_timer(slot_index, fire_offset, subjects.clone(), delay);
        }
    }

    /// Cancels every armed timer. Must be called on round reset and
    /// finalize; timers surviving a round instance are a leak.
    pub fn cancel_all(&mut self) {
        for timer in self.timers.drain(..) {
            let _ = timer.cancel_tx.send(());
            let _ = timer.handle.join();
        }
    }

    /// Cancels armed timers and returns the ones that had not fired yet,
    /// with the active-time offset each is still owed. Used when the session
    /// defers reminders across a pause.
    pub fn suspend(&mut self) -> Vec<PendingSlot> {
        let mut pending = Vec::new();
        for timer in self.timers.drain(..) {
            let _ = timer.cancel_tx.send(());
            let _ = timer.handle.join();
            if !timer.fired.load(Ordering::SeqCst) {
                pending.push(PendingSlot {
                    slot_index: timer.slot_index,
                    subjects: timer.subjects,
                    fire_offset: timer.fire_offset,
                });
            }
        }
        pending
    }

    /// Re-arms suspended slots with their remaining active-time delay.
    /// `active_elapsed` is the round's worked duration at resume, which the
    /// pause left unchanged since suspension.
    pub fn resume(&mut self, pending: Vec<PendingSlot>, active_elapsed: Duration) {
        for slot in pending {
            let delay = (slot.fire_offset - active_elapsed).max(Duration::zero());
            self.spawn_timer(slot.slot_index, slot.fire_offset, slot.subjects, delay);
        }
    }

    fn spawn_timer(
        &mut self,
        slot_index: u32,
        fire_offset: Duration,
        subjects: Vec<String>,
        delay: Duration,
    ) {
        let (cancel_tx, cancel_rx) = mpsc::channel();
        let fired = Arc::new(AtomicBool::new(false));

        let sink = self.sink.clone();
        let fired_flag = Arc::clone(&fired);
        let thread_subjects = subjects.clone();
        let wait = delay.to_std().unwrap_or_default();

        let handle = thread::spawn(move || {
            match cancel_rx.recv_timeout(wait) {
                Err(RecvTimeoutError::Timeout) => {
                    fired_flag.store(true, Ordering::SeqCst);
                    let due = SlotDue {
                        slot_index,
                        subjects: thread_subjects,
                    };
                    if sink.send(due).is_err() {
                        debug!(slot_index, "Slot-due sink dropped before delivery");
                    }
                }
                // Explicit cancel or the scheduler went away.
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            }
        });

        self.timers.push(ArmedTimer {
            slot_index,
            fire_offset,
            subjects,
            cancel_tx,
            fired,
            handle,
        });
    }
}

impl Drop for SlotScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
