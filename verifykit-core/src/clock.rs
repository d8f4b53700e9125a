//! Injectable time source.
//!
//! Lockout windows, token expiry, and QR expiry checks all compare
//! against "now". Components take a [`Clock`] so tests can advance
//! time without sleeping.

use std::time::{SystemTime, UNIX_EPOCH};

/// A source of the current Unix time, in whole seconds.
pub trait Clock: Send + Sync {
    /// Returns seconds since the Unix epoch.
    fn now_unix(&self) -> u64;
}

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> u64 {
        // A system clock before the epoch is a device misconfiguration;
        // treating it as t=0 makes every token and QR payload expired,
        // which fails closed.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_after_2020() {
        let now = SystemClock.now_unix();
        assert!(now > 1_577_836_800); // 2020-01-01
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = test_support::ManualClock::at(1_000);
        assert_eq!(clock.now_unix(), 1_000);
        clock.advance(900);
        assert_eq!(clock.now_unix(), 1_900);
    }
}
