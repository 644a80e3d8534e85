//! Timer configuration
//!
//! Derives prescaler and reload values from a base clock and a target
//! frequency, and wraps a [`HardwareTimer`](cadence_hal::HardwareTimer) in a
//! [`TimerChannel`] that the handlers use to acknowledge and re-arm their
//! counter.

mod divisor;
mod manager;

pub use divisor::{find_divisor, reload_for, TimerError, TimerSetup, MIN_RELOAD};
pub use manager::{priorities, TimerChannel};
