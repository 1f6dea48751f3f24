//! Exponential backoff

use std::time::Duration;

/// Delay before the next retry of a failed attempt (1-based).
///
/// Doubles per attempt: base, 2*base, 4*base, ... Saturates instead of
/// overflowing for absurd attempt counts.
pub fn backoff_delay(base_delay_ms: u64, attempt: u32) -> Duration {
    Duration::from_millis(
        base_delay_ms.saturating_mul(2_u64.saturating_pow(attempt.saturating_sub(1))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delay_doubles() {
        assert_eq!(backoff_delay(100, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(100, 2), Duration::from_millis(200));
        assert_eq!(backoff_delay(100, 3), Duration::from_millis(400));
        assert_eq!(backoff_delay(1000, 1), Duration::from_millis(1000));
    }

    #[test]
    fn test_backoff_delay_zero_attempt_treated_as_first() {
        assert_eq!(backoff_delay(100, 0), Duration::from_millis(100));
    }

    #[test]
    fn test_backoff_delay_saturates() {
        // Does not panic or wrap for huge attempt counts
        let delay = backoff_delay(1000, 200);
        assert!(delay >= Duration::from_millis(1000));
    }
}
