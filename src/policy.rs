//! Flush trigger policy.
//!
//! A flush is due when shutdown is in progress, when enough entries have
//! accumulated, or when the flush interval has passed since the last attempt.
//! Time is compared in whole seconds; the monitor polls once per second so
//! finer resolution would not be observable anyway.

use std::time::Duration;

/// Why a flush was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// Shutdown requested; drain regardless of size or time
    Shutdown,

    /// Buffered entries reached the flush capacity
    Size,

    /// The flush interval elapsed since the last flush
    Interval,
}

impl std::fmt::Display for FlushReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlushReason::Shutdown => write!(f, "shutdown"),
            FlushReason::Size => write!(f, "size"),
            FlushReason::Interval => write!(f, "interval"),
        }
    }
}

/// Pure decision function over buffer state and elapsed time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerPolicy {
    /// Entries that trigger a size-based flush
    pub flush_capacity: usize,

    /// Maximum time between flushes
    pub flush_interval: Duration,
}

impl TriggerPolicy {
    pub fn new(flush_capacity: usize, flush_interval: Duration) -> Self {
        Self {
            flush_capacity,
            flush_interval,
        }
    }

    /// Decide whether to flush now, and why.
    ///
    /// When several conditions hold, shutdown wins over size, and size over
    /// interval.
    pub fn evaluate(
        &self,
        stopping: bool,
        buffered: usize,
        since_last_flush: Duration,
    ) -> Option<FlushReason> {
        if stopping {
            Some(FlushReason::Shutdown)
        } else if buffered >= self.flush_capacity {
            Some(FlushReason::Size)
        } else if since_last_flush.as_secs() >= self.flush_interval.as_secs() {
            Some(FlushReason::Interval)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> TriggerPolicy {
        TriggerPolicy::new(5, Duration::from_secs(10))
    }

    #[test]
    fn test_nothing_due() {
        assert_eq!(policy().evaluate(false, 4, Duration::from_secs(9)), None);
        assert_eq!(policy().evaluate(false, 0, Duration::ZERO), None);
    }

    #[test]
    fn test_stopping_forces_flush() {
        assert_eq!(
            policy().evaluate(true, 0, Duration::ZERO),
            Some(FlushReason::Shutdown)
        );
    }

    #[test]
    fn test_size_threshold_is_inclusive() {
        assert_eq!(
            policy().evaluate(false, 5, Duration::ZERO),
            Some(FlushReason::Size)
        );
        assert_eq!(
            policy().evaluate(false, 50, Duration::ZERO),
            Some(FlushReason::Size)
        );
    }

    #[test]
    fn test_interval_threshold_is_inclusive() {
        assert_eq!(
            policy().evaluate(false, 1, Duration::from_secs(10)),
            Some(FlushReason::Interval)
        );
    }

    #[test]
    fn test_interval_uses_whole_seconds() {
        // 9.999s still counts as 9 seconds
        assert_eq!(policy().evaluate(false, 1, Duration::from_millis(9_999)), None);
        assert_eq!(
            policy().evaluate(false, 1, Duration::from_millis(10_001)),
            Some(FlushReason::Interval)
        );
    }

    #[test]
    fn test_interval_fires_with_empty_buffer() {
        assert_eq!(
            policy().evaluate(false, 0, Duration::from_secs(30)),
            Some(FlushReason::Interval)
        );
    }

    #[test]
    fn test_reason_precedence() {
        let p = policy();
        assert_eq!(
            p.evaluate(true, 10, Duration::from_secs(60)),
            Some(FlushReason::Shutdown)
        );
        assert_eq!(
            p.evaluate(false, 10, Duration::from_secs(60)),
            Some(FlushReason::Size)
        );
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(FlushReason::Shutdown.to_string(), "shutdown");
        assert_eq!(FlushReason::Size.to_string(), "size");
        assert_eq!(FlushReason::Interval.to_string(), "interval");
    }
}
