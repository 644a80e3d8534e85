//! Prescaler and reload search

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Smallest reload accepted by [`find_divisor`]
///
/// A reload of 1 would fire on every counter tick and starve every other
/// handler.
pub const MIN_RELOAD: u32 = 2;

/// Errors from timer configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerError {
    /// No prescaler yields a reload within the counter's range
    Unrepresentable {
        /// Requested firing frequency in Hz
        target_hz: u32,
    },
    /// Divisor is not one of the channel's prescalers
    InvalidDivisor {
        /// Requested divisor
        divisor: u32,
    },
    /// Explicit reload outside `[1, max_reload]`
    ReloadOutOfRange {
        /// Requested reload
        reload: u32,
    },
}

/// Programmed prescaler and reload of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TimerSetup {
    /// Clock divisor
    pub prescaler: u32,
    /// Compare value
    pub reload: u32,
}

impl TimerSetup {
    /// Firing frequency this setup produces, in Hz (rounded down)
    pub fn realized_hz(&self, base_clock_hz: u32) -> u32 {
        let ticks = u64::from(self.prescaler) * u64::from(self.reload);
        if ticks == 0 {
            return 0;
        }
        (u64::from(base_clock_hz) / ticks) as u32
    }

    /// Firing period in nanoseconds (rounded down)
    pub fn period_ns(&self, base_clock_hz: u32) -> u64 {
        if base_clock_hz == 0 {
            return 0;
        }
        u64::from(self.prescaler) * u64::from(self.reload) * 1_000_000_000
            / u64::from(base_clock_hz)
    }
}

/// Search a prescaler and reload for `target_hz`
///
/// Prescalers are tried in the given (ascending) order so the finest
/// resolution that fits wins. The reload is rounded to the nearest integer
/// and must lie in `[MIN_RELOAD, max_reload]`.
pub fn find_divisor(
    base_clock_hz: u32,
    prescalers: &[u32],
    max_reload: u32,
    target_hz: u32,
) -> Result<TimerSetup, TimerError> {
    let unrepresentable = TimerError::Unrepresentable { target_hz };
    if target_hz == 0 {
        return Err(unrepresentable);
    }

    let base = u64::from(base_clock_hz);
    for &prescaler in prescalers {
        if prescaler == 0 {
            continue;
        }

        let ticks = u64::from(prescaler) * u64::from(target_hz);
        let reload = (base + ticks / 2) / ticks;

        // Coarser prescalers only make the reload smaller
        if reload < u64::from(MIN_RELOAD) {
            return Err(unrepresentable);
        }
        if reload <= u64::from(max_reload) {
            return Ok(TimerSetup {
                prescaler,
                reload: reload as u32,
            });
        }
    }

    Err(unrepresentable)
}

/// Reload firing at `target_hz` with a fixed divisor (rounded down)
///
/// Fails instead of clamping: the reload must lie in
/// `[MIN_RELOAD, max_reload]`.
pub fn reload_for(
    base_clock_hz: u32,
    divisor: u32,
    max_reload: u32,
    target_hz: u32,
) -> Result<u32, TimerError> {
    let ticks = u64::from(divisor) * u64::from(target_hz);
    if ticks == 0 {
        return Err(TimerError::Unrepresentable { target_hz });
    }

    let reload = u64::from(base_clock_hz) / ticks;
    if reload < u64::from(MIN_RELOAD) {
        return Err(TimerError::Unrepresentable { target_hz });
    }
    match u32::try_from(reload) {
        Ok(reload) if reload <= max_reload => Ok(reload),
        _ => Err(TimerError::ReloadOutOfRange {
            reload: u32::try_from(reload).unwrap_or(u32::MAX),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::SAM3X_PRESCALERS;
    use proptest::prelude::*;

    const MCK: u32 = 84_000_000;

    #[test]
    fn test_pwm_rate_uses_finest_prescaler() {
        let setup = find_divisor(MCK, SAM3X_PRESCALERS, u32::MAX, 3906).unwrap();
        assert_eq!(setup.prescaler, 2);
        // 84 MHz / (2 * 3906) = 10752.7
        assert_eq!(setup.reload, 10753);
        assert_eq!(setup.realized_hz(MCK), 3905);
    }

    #[test]
    fn test_narrow_counter_falls_back_to_coarser_prescaler() {
        // 16-bit counter: 84 MHz / (2 * 244) does not fit, / (8 * 244) does
        let setup = find_divisor(MCK, SAM3X_PRESCALERS, 0xFFFF, 244).unwrap();
        assert_eq!(setup.prescaler, 8);
        assert_eq!(setup.reload, 43033);
    }

    #[test]
    fn test_unrepresentable_targets() {
        let err = |hz| find_divisor(MCK, SAM3X_PRESCALERS, 0xFFFF, hz);

        assert_eq!(err(0), Err(TimerError::Unrepresentable { target_hz: 0 }));
        // Faster than half the finest tick rate
        assert_eq!(
            err(30_000_000),
            Err(TimerError::Unrepresentable {
                target_hz: 30_000_000
            })
        );
        // Slower than the coarsest prescaler can reach with 16 bits
        assert_eq!(err(5), Err(TimerError::Unrepresentable { target_hz: 5 }));
    }

    #[test]
    fn test_fixed_divisor_reload_never_clamps() {
        // Stepper idle rate: 84 MHz / (2 * 244) = 172131.1
        assert_eq!(reload_for(MCK, 2, u32::MAX, 244), Ok(172_131));
        assert_eq!(
            reload_for(MCK, 2, 0xFFFF, 244),
            Err(TimerError::ReloadOutOfRange { reload: 172_131 })
        );
        assert_eq!(
            reload_for(MCK, 2, u32::MAX, 0),
            Err(TimerError::Unrepresentable { target_hz: 0 })
        );
        assert_eq!(
            reload_for(MCK, 2, u32::MAX, 30_000_000),
            Err(TimerError::Unrepresentable {
                target_hz: 30_000_000
            })
        );
        assert_eq!(
            reload_for(u32::MAX, 1, u32::MAX, 1),
            Ok(u32::MAX)
        );
    }

    #[test]
    fn test_period_ns() {
        let setup = TimerSetup {
            prescaler: 2,
            reload: 1000,
        };
        assert_eq!(setup.period_ns(MCK), 23_809);
        assert_eq!(setup.realized_hz(MCK), 42_000);
    }

    proptest! {
        #[test]
        fn prop_reload_nearest_ideal(target in 1u32..2_000_000) {
            if let Ok(setup) = find_divisor(MCK, SAM3X_PRESCALERS, 0xFFFF, target) {
                prop_assert!(setup.reload >= MIN_RELOAD);
                prop_assert!(setup.reload <= 0xFFFF);

                // |reload * p * t - base| <= p * t / 2
                let ticks = u64::from(setup.prescaler) * u64::from(target);
                let programmed = u64::from(setup.reload) * ticks;
                let diff = programmed.abs_diff(u64::from(MCK));
                prop_assert!(diff * 2 <= ticks);
            }
        }

        #[test]
        fn prop_finest_fitting_prescaler(target in 1u32..2_000_000) {
            if let Ok(setup) = find_divisor(MCK, SAM3X_PRESCALERS, 0xFFFF, target) {
                for &finer in SAM3X_PRESCALERS.iter().filter(|&&p| p < setup.prescaler) {
                    let ticks = u64::from(finer) * u64::from(target);
                    let reload = (u64::from(MCK) + ticks / 2) / ticks;
                    prop_assert!(reload > 0xFFFF);
                }
            }
        }
    }
}
