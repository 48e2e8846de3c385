//! Per-connection circuit breaker.
//!
//! Pure deterministic logic: no IO, no wall-clock reads. `now` is always
//! passed in by the caller (the Worker), which makes the transition table
//! directly unit-testable without mocking time.

use chrono::{DateTime, Duration, Utc};
use osb_schemas::BreakerState;

/// Consecutive hard failures tolerated before the breaker opens.
pub const FAILURE_THRESHOLD: i64 = 5;
/// How long the breaker stays OPEN before allowing a HALF_OPEN probe.
pub const OPEN_COOLDOWN_SECS: i64 = 120;
/// Consecutive HALF_OPEN successes required to fully close the breaker.
pub const HALF_OPEN_CLOSE_THRESHOLD: i64 = 2;

/// The breaker fields as they sit on a `Connection` row. `Breaker` is a
/// pure, owned snapshot — callers read it from the Store, transition it,
/// and write the result back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breaker {
    pub state: BreakerState,
    pub failure_count: i64,
    pub half_open_successes: i64,
    pub earliest_retry_at: Option<DateTime<Utc>>,
}

impl Breaker {
    pub fn closed() -> Self {
        Breaker {
            state: BreakerState::Closed,
            failure_count: 0,
            half_open_successes: 0,
            earliest_retry_at: None,
        }
    }

    /// Decide whether a cycle may proceed right now, applying the
    /// OPEN → HALF_OPEN transition if the cooldown has elapsed.
    ///
    /// Returns the (possibly updated) breaker and whether the Worker may
    /// proceed with this cycle.
    pub fn allow(self, now: DateTime<Utc>) -> (Self, bool) {
        match self.state {
            BreakerState::Closed => (self, true),
            BreakerState::HalfOpen => (self, true),
            BreakerState::Open => {
                let due = self.earliest_retry_at.map(|t| now >= t).unwrap_or(false);
                if due {
                    (
                        Breaker {
                            state: BreakerState::HalfOpen,
                            failure_count: self.failure_count,
                            half_open_successes: 0,
                            earliest_retry_at: self.earliest_retry_at,
                        },
                        true,
                    )
                } else {
                    (self, false)
                }
            }
        }
    }

    /// Record a successful cycle (steps 2–7 completed without a
    /// transport/auth failure).
    pub fn success(self) -> Self {
        match self.state {
            BreakerState::Closed => Breaker {
                failure_count: 0,
                ..self
            },
            BreakerState::HalfOpen => {
                let successes = self.half_open_successes + 1;
                if successes >= HALF_OPEN_CLOSE_THRESHOLD {
                    Breaker::closed()
                } else {
                    Breaker {
                        half_open_successes: successes,
                        ..self
                    }
                }
            }
            BreakerState::Open => self,
        }
    }

    /// Record a hard upstream failure (transport, auth, or malformed reply).
    pub fn failure(self, now: DateTime<Utc>) -> Self {
        match self.state {
            BreakerState::Closed => {
                let failures = self.failure_count + 1;
                if failures >= FAILURE_THRESHOLD {
                    Breaker {
                        state: BreakerState::Open,
                        failure_count: failures,
                        half_open_successes: 0,
                        earliest_retry_at: Some(now + Duration::seconds(OPEN_COOLDOWN_SECS)),
                    }
                } else {
                    Breaker {
                        failure_count: failures,
                        ..self
                    }
                }
            }
            BreakerState::HalfOpen => Breaker {
                state: BreakerState::Open,
                failure_count: self.failure_count,
                half_open_successes: 0,
                earliest_retry_at: Some(now + Duration::seconds(OPEN_COOLDOWN_SECS)),
            },
            BreakerState::Open => self,
        }
    }

    /// Operator `reset` — unconditionally returns to CLOSED with counters
    /// cleared, from any state.
    pub fn reset(self) -> Self {
        Breaker::closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn closed_stays_closed_below_threshold() {
        let mut b = Breaker::closed();
        for _ in 0..4 {
            b = b.failure(t(0));
        }
        assert_eq!(b.state, BreakerState::Closed);
        assert_eq!(b.failure_count, 4);
    }

    #[test]
    fn fifth_failure_opens_breaker_with_cooldown() {
        let mut b = Breaker::closed();
        for _ in 0..5 {
            b = b.failure(t(0));
        }
        assert_eq!(b.state, BreakerState::Open);
        assert_eq!(b.earliest_retry_at, Some(t(OPEN_COOLDOWN_SECS)));
    }

    #[test]
    fn success_resets_failure_count_when_closed() {
        let mut b = Breaker::closed();
        b = b.failure(t(0));
        b = b.failure(t(0));
        b = b.success();
        assert_eq!(b.state, BreakerState::Closed);
        assert_eq!(b.failure_count, 0);
    }

    #[test]
    fn open_denies_before_cooldown_elapses() {
        let mut b = Breaker::closed();
        for _ in 0..5 {
            b = b.failure(t(0));
        }
        let (b2, allowed) = b.allow(t(OPEN_COOLDOWN_SECS - 1));
        assert!(!allowed);
        assert_eq!(b2.state, BreakerState::Open);
    }

    #[test]
    fn open_transitions_to_half_open_at_cooldown() {
        let mut b = Breaker::closed();
        for _ in 0..5 {
            b = b.failure(t(0));
        }
        let (b2, allowed) = b.allow(t(OPEN_COOLDOWN_SECS));
        assert!(allowed);
        assert_eq!(b2.state, BreakerState::HalfOpen);
        assert_eq!(b2.half_open_successes, 0);
    }

    #[test]
    fn half_open_needs_two_successes_to_close() {
        let mut b = Breaker::closed();
        for _ in 0..5 {
            b = b.failure(t(0));
        }
        let (mut b, _) = b.allow(t(OPEN_COOLDOWN_SECS));
        b = b.success();
        assert_eq!(b.state, BreakerState::HalfOpen);
        assert_eq!(b.half_open_successes, 1);
        b = b.success();
        assert_eq!(b.state, BreakerState::Closed);
        assert_eq!(b.failure_count, 0);
    }

    #[test]
    fn half_open_failure_reopens_with_fresh_cooldown() {
        let mut b = Breaker::closed();
        for _ in 0..5 {
            b = b.failure(t(0));
        }
        let (b, _) = b.allow(t(OPEN_COOLDOWN_SECS));
        let b = b.failure(t(OPEN_COOLDOWN_SECS + 10));
        assert_eq!(b.state, BreakerState::Open);
        assert_eq!(
            b.earliest_retry_at,
            Some(t(OPEN_COOLDOWN_SECS + 10 + OPEN_COOLDOWN_SECS))
        );
    }

    #[test]
    fn reset_clears_from_any_state() {
        let mut b = Breaker::closed();
        for _ in 0..5 {
            b = b.failure(t(0));
        }
        assert_eq!(b.state, BreakerState::Open);
        let b = b.reset();
        assert_eq!(b.state, BreakerState::Closed);
        assert_eq!(b.failure_count, 0);
    }

    #[test]
    fn half_open_allows_probe_cycle_immediately() {
        let b = Breaker {
            state: BreakerState::HalfOpen,
            failure_count: 5,
            half_open_successes: 0,
            earliest_retry_at: None,
        };
        let (_, allowed) = b.allow(t(0));
        assert!(allowed);
    }
}
