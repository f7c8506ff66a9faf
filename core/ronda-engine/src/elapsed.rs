//! Active-duration math for a round.
//!
//! Pure functions over persisted state and the caller's clock: no hidden
//! counters, so a process restart reproduces the same value from the same
//! inputs. Safe to call concurrently for reads.

use chrono::{DateTime, Duration, Utc};
use ronda_model::PauseInterval;

use crate::error::{EngineError, Result};

/// Sum of all pause windows, treating an open trailing interval as running
/// until `end` (for a completed round) or `now`. Each window is clamped at
/// zero so a clock skew cannot produce negative pause time.
pub fn total_paused(
    now: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    pauses: &[PauseInterval],
) -> Duration {
    let effective_now = end.unwrap_or(now);
    pauses
        .iter()
        .fold(Duration::zero(), |acc, pause| acc + pause.duration(effective_now))
}

/// Wall-clock time worked: `(end ?? now) - start - total_paused`, floored at
/// zero. A round that never started has worked nothing.
pub fn elapsed(
    now: DateTime<Utc>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    pauses: &[PauseInterval],
) -> Duration {
    let Some(start) = start else {
        return Duration::zero();
    };
    let gross = end.unwrap_or(now) - start;
    (gross - total_paused(now, end, pauses)).max(Duration::zero())
}

/// Checks the structural invariant on a pause list: at most one open interval
/// (`to == None`), and only as the last element.
pub fn validate_pause_sequence(pauses: &[PauseInterval]) -> Result<()> {
    let open_count = pauses.iter().filter(|p| p.is_open()).count();
    if open_count > 1 {
        return Err(EngineError::MalformedPauseSequence {
            reason: format!("{open_count} open intervals, at most one allowed"),
        });
    }
    if let Some(position) = pauses.iter().position(|p| p.is_open()) {
        if position != pauses.len() - 1 {
            return Err(EngineError::MalformedPauseSequence {
                reason: format!(
                    "open interval at position {position} of {}, must be last",
                    pauses.len()
                ),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed(from: DateTime<Utc>, to: DateTime<Utc>) -> PauseInterval {
        PauseInterval {
            from,
            to: Some(to),
        }
    }

    #[test]
    fn unstarted_round_has_zero_elapsed() {
        let now = Utc::now();
        assert_eq!(elapsed(now, None, None, &[]), Duration::zero());
    }

    #[test]
    fn pause_resume_scenario_splits_worked_and_paused() {
        // Start at T0, pause at T0+10m, resume at T0+25m, finalize at T0+40m.
        let t0 = Utc::now();
        let pauses = vec![closed(t0 + Duration::minutes(10), t0 + Duration::minutes(25))];
        let end = Some(t0 + Duration::minutes(40));

        assert_eq!(
            total_paused(t0 + Duration::minutes(40), end, &pauses),
            Duration::minutes(15)
        );
        assert_eq!(
            elapsed(t0 + Duration::minutes(40), Some(t0), end, &pauses),
            Duration::minutes(25)
        );
    }

    #[test]
    fn elapsed_never_exceeds_wall_clock() {
        let t0 = Utc::now();
        let now = t0 + Duration::minutes(60);
        let pauses = vec![closed(t0 + Duration::minutes(5), t0 + Duration::minutes(20))];

        assert!(elapsed(now, Some(t0), None, &pauses) <= now - t0);
        // Equality only without pauses.
        assert_eq!(elapsed(now, Some(t0), None, &[]), now - t0);
    }

    #[test]
    fn open_pause_counts_up_to_now() {
        let t0 = Utc::now();
        let pauses = vec![PauseInterval {
            from: t0 + Duration::minutes(10),
            to: None,
        }];
        let now = t0 + Duration::minutes(30);
        assert_eq!(total_paused(now, None, &pauses), Duration::minutes(20));
        assert_eq!(elapsed(now, Some(t0), None, &pauses), Duration::minutes(10));
    }

    #[test]
    fn open_pause_on_completed_round_stops_at_end() {
        let t0 = Utc::now();
        let end = t0 + Duration::minutes(30);
        let pauses = vec![PauseInterval {
            from: t0 + Duration::minutes(20),
            to: None,
        }];
        // Clock keeps moving after completion; the value must not.
        let much_later = t0 + Duration::hours(8);
        assert_eq!(
            total_paused(much_later, Some(end), &pauses),
            Duration::minutes(10)
        );
        assert_eq!(
            elapsed(much_later, Some(t0), Some(end), &pauses),
            Duration::minutes(20)
        );
    }

    #[test]
    fn elapsed_floors_at_zero_when_fully_paused() {
        let t0 = Utc::now();
        // Pause covers more than the whole window.
        let pauses = vec![closed(t0, t0 + Duration::minutes(50))];
        assert_eq!(
            elapsed(t0 + Duration::minutes(40), Some(t0), None, &pauses),
            Duration::zero()
        );
    }

    #[test]
    fn recomputation_from_persisted_state_is_idempotent() {
        let t0 = Utc::now();
        let pauses = vec![
            closed(t0 + Duration::minutes(5), t0 + Duration::minutes(10)),
            closed(t0 + Duration::minutes(20), t0 + Duration::minutes(22)),
        ];
        let end = Some(t0 + Duration::minutes(60));
        let first = elapsed(t0 + Duration::minutes(60), Some(t0), end, &pauses);
        let again = elapsed(t0 + Duration::hours(99), Some(t0), end, &pauses);
        assert_eq!(first, again);
        assert_eq!(first, Duration::minutes(53));
    }

    #[test]
    fn two_open_intervals_are_rejected() {
        let t0 = Utc::now();
        let pauses = vec![
            PauseInterval { from: t0, to: None },
            PauseInterval {
                from: t0 + Duration::minutes(1),
                to: None,
            },
        ];
        assert!(matches!(
            validate_pause_sequence(&pauses),
            Err(EngineError::MalformedPauseSequence { .. })
        ));
    }

    #[test]
    fn open_interval_must_be_last() {
        let t0 = Utc::now();
        let pauses = vec![
            PauseInterval { from: t0, to: None },
            closed(t0 + Duration::minutes(1), t0 + Duration::minutes(2)),
        ];
        assert!(matches!(
            validate_pause_sequence(&pauses),
            Err(EngineError::MalformedPauseSequence { .. })
        ));
    }

    #[test]
    fn closed_sequence_with_trailing_open_is_valid() {
        let t0 = Utc::now();
        let pauses = vec![
            closed(t0, t0 + Duration::minutes(1)),
            PauseInterval {
                from: t0 + Duration::minutes(2),
                to: None,
            },
        ];
        assert!(validate_pause_sequence(&pauses).is_ok());
        assert!(validate_pause_sequence(&[]).is_ok());
    }
}
