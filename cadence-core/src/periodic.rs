//! Slow periodic tick derived from the multiplexer firing rate

use crate::shared::MaintenanceFlag;

/// Divides the fast firing rate down to the maintenance tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodicTicker {
    count: u16,
    threshold: u16,
}

impl PeriodicTicker {
    /// Raise the flag every `threshold` firings (at least one)
    pub const fn new(threshold: u16) -> Self {
        Self {
            count: 0,
            threshold: if threshold == 0 { 1 } else { threshold },
        }
    }

    /// Ticker raising the flag at roughly `slow_hz` from `fast_hz` firings
    ///
    /// The threshold is rounded down, so the slow tick runs slightly fast
    /// rather than slow.
    pub fn from_rates(fast_hz: u32, slow_hz: u32) -> Self {
        let threshold = fast_hz / slow_hz.max(1);
        Self::new(u16::try_from(threshold).unwrap_or(u16::MAX))
    }

    /// Count one firing; returns `true` when the flag was raised
    #[inline]
    pub fn tick(&mut self, flag: &MaintenanceFlag) -> bool {
        self.count += 1;
        if self.count >= self.threshold {
            self.count = 0;
            flag.raise();
            return true;
        }
        false
    }

    pub fn threshold(&self) -> u16 {
        self.threshold
    }
}
