//! Beeper tone generator

use cadence_hal::{HardwareTimer, OutputPin};

use crate::timer::{TimerChannel, TimerError};

/// Square wave on a beeper pin, one edge per firing
pub struct ToneGenerator<T: HardwareTimer, P: OutputPin> {
    timer: TimerChannel<T>,
    pin: P,
    running: bool,
}

impl<T: HardwareTimer, P: OutputPin> ToneGenerator<T, P> {
    /// Create a silent generator on an already configured timer channel
    pub fn new(timer: TimerChannel<T>, mut pin: P) -> Self {
        pin.set_low();
        Self {
            timer,
            pin,
            running: false,
        }
    }

    /// Play a tone at `frequency_hz`
    pub fn start(&mut self, frequency_hz: u32) -> Result<(), TimerError> {
        self.timer.retune(frequency_hz.saturating_mul(2))?;
        self.running = true;
        Ok(())
    }

    /// Silence the beeper, leaving the pin low
    pub fn stop(&mut self) {
        self.running = false;
        self.pin.set_low();
    }

    /// Handle one timer firing
    #[inline]
    pub fn fire(&mut self) {
        self.timer.acknowledge();
        if self.running {
            self.pin.toggle();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn pin(&self) -> &P {
        &self.pin
    }

    pub fn timer(&self) -> &TimerChannel<T> {
        &self.timer
    }
}
