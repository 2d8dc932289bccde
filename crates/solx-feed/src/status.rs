/*
[INPUT]:  Connection lifecycle transitions from the worker
[OUTPUT]: Consumer-visible connectivity state and backoff schedule
[POS]:    State layer - reconnection policy vocabulary
[UPDATE]: When reconnection states or the delay formula change
*/

use std::time::Duration;

const MAX_BACKOFF: Duration = Duration::from_secs(30);
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Connectivity state surfaced to consumers.
///
/// `Exhausted` is terminal: the policy stops retrying until an explicit
/// restart. It is the only persistent-failure signal consumers ever see;
/// read accessors keep returning zero/empty defaults throughout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    Idle,
    Connecting,
    Connected,
    Backoff { attempt: u32 },
    Exhausted,
}

impl FeedStatus {
    pub fn is_connected(self) -> bool {
        matches!(self, FeedStatus::Connected)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, FeedStatus::Exhausted)
    }
}

/// Delay before retry cycle `attempt` (0-based): `base * 2^attempt`,
/// clamped at 30 seconds.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = attempt.min(MAX_BACKOFF_EXPONENT);
    base.saturating_mul(1u32 << exp).min(MAX_BACKOFF)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0, 1)]
    #[case(1, 2)]
    #[case(2, 4)]
    #[case(3, 8)]
    #[case(4, 16)]
    fn backoff_doubles_per_failed_cycle(#[case] attempt: u32, #[case] expected_secs: u64) {
        assert_eq!(
            backoff_delay(Duration::from_secs(1), attempt),
            Duration::from_secs(expected_secs)
        );
    }

    #[test]
    fn backoff_clamps_at_30s() {
        assert_eq!(
            backoff_delay(Duration::from_secs(1), 5),
            Duration::from_secs(30)
        );
        assert_eq!(
            backoff_delay(Duration::from_secs(5), 40),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn status_predicates() {
        assert!(FeedStatus::Connected.is_connected());
        assert!(!FeedStatus::Backoff { attempt: 2 }.is_connected());
        assert!(FeedStatus::Exhausted.is_terminal());
        assert!(!FeedStatus::Idle.is_terminal());
    }
}
