//! Reconnect decisions for callers driving the realtime session.
//!
//! The session never reconnects on its own. A caller feeds the terminal event
//! kind and its running attempt count to [`ReconnectPolicy::decide`] and acts
//! on the answer: sleep and call `Client::start_realtime` again, wait for new
//! credentials, or give up.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::realtime::events::EventKind;

/// Exponential backoff with jitter for realtime reconnects.
#[derive(Clone, Debug)]
pub struct ReconnectPolicy {
    /// Attempts allowed after consecutive failures; `0` means unlimited.
    pub max_attempts: usize,
    /// Delay used before the first reconnect.
    pub initial_backoff: Duration,
    /// Upper bound for exponential backoff delay growth.
    pub max_backoff: Duration,
    /// Maximum random jitter added to each delay.
    pub jitter: Duration,
    /// Whether an unclassified failure is worth retrying at all.
    pub retry_unknown_errors: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReconnectDecision {
    /// Reconnect after the delay.
    After(Duration),
    /// The session was rejected; refresh cookies before reconnecting.
    AwaitCredentials,
    GiveUp,
}

impl ReconnectPolicy {
    /// Computes the delay before reconnect attempt `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let mut delay = self.initial_backoff;
        for _ in 1..attempt {
            if delay >= self.max_backoff {
                break;
            }
            delay = std::cmp::min(delay.saturating_mul(2), self.max_backoff);
        }
        delay.saturating_add(jitter_duration(self.jitter, attempt))
    }

    /// Decides what to do after a terminal realtime event.
    ///
    /// `attempt` counts consecutive reconnects, starting at 1; reset it once a
    /// session reaches the streaming state.
    pub fn decide(&self, kind: EventKind, attempt: usize) -> ReconnectDecision {
        let decision = match kind {
            EventKind::BadCredentials => ReconnectDecision::AwaitCredentials,
            EventKind::UnknownError if !self.retry_unknown_errors => ReconnectDecision::GiveUp,
            EventKind::TransientDisconnect | EventKind::UnknownError => {
                if self.max_attempts != 0 && attempt > self.max_attempts {
                    ReconnectDecision::GiveUp
                } else {
                    ReconnectDecision::After(self.delay_for_attempt(attempt))
                }
            }
            // Non-terminal events never end a session.
            EventKind::Heartbeat | EventKind::ClientConnection | EventKind::DecoratedEvent => {
                ReconnectDecision::GiveUp
            }
        };
        debug!(event = "realtime_reconnect_decision", ?kind, attempt, ?decision);
        decision
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            jitter: Duration::from_millis(500),
            retry_unknown_errors: true,
        }
    }
}

fn jitter_duration(max_jitter: Duration, attempt: usize) -> Duration {
    let limit_nanos = max_jitter.as_nanos().min(u64::MAX as u128) as u64;
    if limit_nanos == 0 {
        return Duration::ZERO;
    }

    let now_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as u64;
    let mixed = now_nanos ^ ((attempt as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    Duration::from_nanos(mixed % limit_nanos.saturating_add(1))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{ReconnectDecision, ReconnectPolicy};
    use crate::realtime::events::EventKind;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(250),
            jitter: Duration::ZERO,
            retry_unknown_errors: true,
        }
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let policy = policy();
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(250));
    }

    #[test]
    fn jitter_stays_within_bound() {
        let policy = ReconnectPolicy {
            jitter: Duration::from_millis(10),
            ..policy()
        };
        for attempt in 1..20 {
            let delay = policy.delay_for_attempt(attempt);
            let base = without_jitter(&policy).delay_for_attempt(attempt);
            assert!(delay >= base && delay <= base + Duration::from_millis(10));
        }
    }

    #[test]
    fn transient_disconnects_retry_until_exhausted() {
        let policy = policy();
        assert_eq!(
            policy.decide(EventKind::TransientDisconnect, 1),
            ReconnectDecision::After(Duration::from_millis(100))
        );
        assert_eq!(
            policy.decide(EventKind::TransientDisconnect, 4),
            ReconnectDecision::GiveUp
        );
    }

    #[test]
    fn bad_credentials_wait_for_refresh() {
        assert_eq!(
            policy().decide(EventKind::BadCredentials, 1),
            ReconnectDecision::AwaitCredentials
        );
    }

    #[test]
    fn unknown_errors_follow_configuration() {
        let strict = ReconnectPolicy {
            retry_unknown_errors: false,
            ..policy()
        };
        assert_eq!(
            strict.decide(EventKind::UnknownError, 1),
            ReconnectDecision::GiveUp
        );
        assert!(matches!(
            policy().decide(EventKind::UnknownError, 2),
            ReconnectDecision::After(_)
        ));
    }

    #[test]
    fn unlimited_attempts_never_give_up() {
        let policy = ReconnectPolicy {
            max_attempts: 0,
            ..policy()
        };
        assert!(matches!(
            policy.decide(EventKind::TransientDisconnect, 10_000),
            ReconnectDecision::After(_)
        ));
    }

    #[test]
    fn huge_backoff_saturates_instead_of_overflowing() {
        let policy = ReconnectPolicy {
            initial_backoff: Duration::MAX,
            max_backoff: Duration::MAX,
            jitter: Duration::from_secs(1),
            ..policy()
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::MAX);
        assert_eq!(policy.delay_for_attempt(5), Duration::MAX);
    }

    fn without_jitter(policy: &ReconnectPolicy) -> ReconnectPolicy {
        ReconnectPolicy {
            jitter: Duration::ZERO,
            ..policy.clone()
        }
    }
}
