//! Per-period call ceiling applied to free accounts after admission.

use crate::common::CallCounter;

/// Counts calls per free-account owner against a fixed ceiling. Premium
/// accounts never reach this check; a ceiling of zero disables it. The
/// counters are cleared on a fixed period, which starts the next window.
pub struct FreeAccountThrottle {
    max_calls: u64,
    counter: CallCounter,
}

impl FreeAccountThrottle {
    #[must_use]
    pub fn new(max_calls: u64) -> Self {
        Self {
            max_calls,
            counter: CallCounter::new(),
        }
    }

    /// Records one call for `username`. Past the ceiling the counter value
    /// comes back as the error.
    pub fn check(&self, username: &str) -> Result<(), u64> {
        if self.max_calls == 0 {
            return Ok(());
        }

        let current = self.counter.increment_returning_current(username);
        if current <= self.max_calls {
            Ok(())
        } else {
            Err(current)
        }
    }

    #[must_use]
    pub const fn max_calls(&self) -> u64 {
        self.max_calls
    }

    /// Starts a new accounting period.
    pub fn clear(&self) {
        self.counter.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_the_ceiling_then_rejects() {
        let throttle = FreeAccountThrottle::new(3);
        throttle.check("alice").unwrap();
        throttle.check("alice").unwrap();
        throttle.check("alice").unwrap();
        assert_eq!(throttle.check("alice"), Err(4));

        // Other owners keep their own budget.
        throttle.check("bob").unwrap();
    }

    #[test]
    fn clear_opens_a_fresh_period() {
        let throttle = FreeAccountThrottle::new(1);
        throttle.check("alice").unwrap();
        assert!(throttle.check("alice").is_err());

        throttle.clear();
        throttle.check("alice").unwrap();
    }

    #[test]
    fn zero_ceiling_disables_the_throttle() {
        let throttle = FreeAccountThrottle::new(0);
        for _ in 0..100 {
            throttle.check("alice").unwrap();
        }
    }
}
