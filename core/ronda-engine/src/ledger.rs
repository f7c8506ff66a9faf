//! Per-channel status ledger for a work item.
//!
//! Every status change is a discrete event: it stamps `previous_status`,
//! appends to the transition history, and marks the channel touched. Setting
//! the same status twice appends twice; idempotence is not assumed at this
//! layer. Structural guards (no mutation after completion) live in the
//! session, which owns the round.

use chrono::{DateTime, Utc};
use ronda_model::{ChannelEntry, ChannelStatus, ChannelTransition, WorkItem};

use crate::error::{EngineError, Result};

/// Records a status change on the first channel with the given number.
pub fn set_status(
    item: &mut WorkItem,
    channel: u32,
    to: ChannelStatus,
    at: DateTime<Utc>,
) -> Result<()> {
    let item_id = item.id.clone();
    let entry = item
        .channel_mut(channel)
        .ok_or(EngineError::UnknownChannel {
            work_item: item_id,
            channel,
        })?;

    let from = entry.status;
    entry.previous_status = from;
    entry.status = to;
    entry.touched = true;
    entry.history.push(ChannelTransition { at, from, to });
    Ok(())
}

/// Replaces the free-text note. Does not touch status, history, or the
/// touched flag.
pub fn set_note(item: &mut WorkItem, channel: u32, note: impl Into<String>) -> Result<()> {
    let item_id = item.id.clone();
    let entry = item
        .channel_mut(channel)
        .ok_or(EngineError::UnknownChannel {
            work_item: item_id,
            channel,
        })?;
    entry.note = note.into();
    Ok(())
}

/// Appends a channel with the next free number (1-based) and returns it.
pub fn add_channel(item: &mut WorkItem) -> u32 {
    let number = item
        .channels
        .iter()
        .map(|c| c.number)
        .max()
        .map_or(1, |n| n + 1);
    item.channels.push(ChannelEntry::new(number));
    number
}

/// Appends a channel with a caller-supplied number. Duplicate numbers are
/// allowed; [`channel_number_in_use`] lets the UI warn about them.
pub fn add_channel_numbered(item: &mut WorkItem, number: u32) {
    item.channels.push(ChannelEntry::new(number));
}

/// Removes the first channel with the given number.
pub fn remove_channel(item: &mut WorkItem, channel: u32) -> Result<()> {
    let position = item
        .channels
        .iter()
        .position(|c| c.number == channel)
        .ok_or(EngineError::UnknownChannel {
            work_item: item.id.clone(),
            channel,
        })?;
    item.channels.remove(position);
    Ok(())
}

/// Whether any channel in this work item already carries the number.
pub fn channel_number_in_use(item: &WorkItem, number: u32) -> bool {
    item.channels.iter().any(|c| c.number == number)
}

/// Fraction of channels that are touched and carry a non-Unset status.
/// An item with no channels reports full progress.
pub fn progress(item: &WorkItem) -> f64 {
    if item.channels.is_empty() {
        return 1.0;
    }
    item.resolved_channel_count() as f64 / item.channels.len() as f64
}
