//! Per-channel de-duplication of trigger events.
//!
//! Native trigger sources can deliver the same logical tick more than once
//! (a live delivery plus a deferred one). Trigger periods are at least a
//! minute, so any second delivery on the same channel inside the window is
//! a duplicate.

use std::collections::HashMap;
use std::time::Duration;

use stockpulse_types::TriggerEvent;

pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(30);

/// What the gate decided for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Live trigger, forwarded and recorded.
    Accept,
    /// Replayed background trigger, forwarded without touching the bookkeeping.
    Replay,
    /// Duplicate inside the window; `since_last_ms` is the gap to the accepted one.
    Suppress { since_last_ms: i64 },
}

/// Remembers when each interval channel last let a live trigger through.
#[derive(Debug)]
pub struct TriggerGate {
    window_ms: i64,
    last_accepted: HashMap<String, i64>,
}

impl TriggerGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window_ms: i64::try_from(window.as_millis()).unwrap_or(i64::MAX),
            last_accepted: HashMap::new(),
        }
    }

    /// Decide whether `event`, received at process time `now_ms`, is processed.
    pub fn admit(&mut self, event: &TriggerEvent, now_ms: i64) -> GateDecision {
        if event.is_replay() {
            return GateDecision::Replay;
        }

        if let Some(&last) = self.last_accepted.get(&event.interval) {
            let since_last_ms = now_ms.saturating_sub(last);
            if since_last_ms < self.window_ms {
                return GateDecision::Suppress { since_last_ms };
            }
        }

        self.last_accepted.insert(event.interval.clone(), now_ms);
        GateDecision::Accept
    }

    /// Process time of the last accepted live trigger on a channel.
    pub fn last_accepted(&self, interval: &str) -> Option<i64> {
        self.last_accepted.get(interval).copied()
    }
}

impl Default for TriggerGate {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockpulse_types::{BACKGROUND_SOURCE, IntervalClass};

    const T0: i64 = 1_700_000_000_000;

    fn live(class: IntervalClass) -> TriggerEvent {
        TriggerEvent::live(class, 1, 1, T0)
    }

    fn replay(class: IntervalClass) -> TriggerEvent {
        TriggerEvent {
            source: Some(BACKGROUND_SOURCE.into()),
            stored_at: Some(T0),
            ..live(class)
        }
    }

    #[test]
    fn test_first_trigger_is_accepted() {
        let mut gate = TriggerGate::default();
        assert_eq!(gate.admit(&live(IntervalClass::OneMinute), T0), GateDecision::Accept);
        assert_eq!(gate.last_accepted("1min"), Some(T0));
    }

    #[test]
    fn test_duplicate_within_window_is_suppressed() {
        let mut gate = TriggerGate::default();
        let event = live(IntervalClass::OneMinute);
        gate.admit(&event, T0);
        assert_eq!(
            gate.admit(&event, T0 + 10_000),
            GateDecision::Suppress { since_last_ms: 10_000 }
        );
        assert_eq!(
            gate.admit(&event, T0 + 29_999),
            GateDecision::Suppress { since_last_ms: 29_999 }
        );
        // Suppressed events do not move the window.
        assert_eq!(gate.last_accepted("1min"), Some(T0));
        assert_eq!(gate.admit(&event, T0 + 30_000), GateDecision::Accept);
    }

    #[test]
    fn test_channels_are_independent() {
        let mut gate = TriggerGate::default();
        gate.admit(&live(IntervalClass::OneMinute), T0);
        assert_eq!(
            gate.admit(&live(IntervalClass::FiveMinutes), T0 + 1_000),
            GateDecision::Accept
        );
    }

    #[test]
    fn test_replay_bypasses_window() {
        let mut gate = TriggerGate::default();
        gate.admit(&live(IntervalClass::FifteenMinutes), T0);
        assert_eq!(
            gate.admit(&replay(IntervalClass::FifteenMinutes), T0 + 1_000),
            GateDecision::Replay
        );
        assert_eq!(gate.last_accepted("15min"), Some(T0));
    }

    #[test]
    fn test_custom_window() {
        let mut gate = TriggerGate::new(Duration::from_secs(5));
        let event = live(IntervalClass::OneMinute);
        gate.admit(&event, T0);
        assert_eq!(gate.admit(&event, T0 + 5_000), GateDecision::Accept);
    }
}
