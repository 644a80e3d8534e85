//! Servo pulse generator
//!
//! Four servo channels share one timer. Each channel owns a fixed 5 ms slot
//! split into a high part (the pulse) and a low part (the rest of the slot),
//! giving eight phases and a 20 ms frame for all four servos. A disabled
//! channel, or one without a pin, still consumes its slot so the frame
//! length never changes.

use cadence_hal::{HardwareTimer, OutputPin};

use crate::shared::{ServoTargets, SERVO_CHANNELS};
use crate::timer::{TimerChannel, TimerError};

/// Shortest pulse a servo accepts, in µs
pub const SERVO_MIN_US: u16 = 500;
/// Longest pulse, in µs
pub const SERVO_MAX_US: u16 = 2500;
/// Slot length per channel, in µs
pub const SLOT_US: u32 = 5000;
/// High part of a disabled channel's slot, in µs
pub const HALF_SLOT_US: u32 = 2500;

const PHASES: u8 = 2 * SERVO_CHANNELS as u8;

/// Clamp a requested pulse width; `None` disables the channel
///
/// Only 0 disables. Widths from 1 to 499 µs are raised to the shortest
/// pulse, so a small non-zero width still holds the servo at one end.
pub fn clamp_pulse_us(width_us: u16) -> Option<u16> {
    match width_us {
        0 => None,
        us => Some(us.clamp(SERVO_MIN_US, SERVO_MAX_US)),
    }
}

/// Errors when wiring servo pins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ServoError {
    /// Channel index beyond the supported channels
    NoSuchChannel(usize),
}

/// Servo timer handler state
pub struct ServoPulseGenerator<'a, T: HardwareTimer, P: OutputPin> {
    timer: TimerChannel<T>,
    pins: [Option<P>; SERVO_CHANNELS],
    targets: &'a ServoTargets,
    phase: u8,
    last_high: u32,
    slot_ticks: u32,
    half_slot_ticks: u32,
}

impl<'a, T: HardwareTimer, P: OutputPin> ServoPulseGenerator<'a, T, P> {
    /// Create a generator on an already configured timer channel
    ///
    /// The channel must resolve at least one tick per microsecond and hold a
    /// whole slot in one reload; otherwise pulses could not be timed to the
    /// microsecond, or the frame would be cut short.
    pub fn new(timer: TimerChannel<T>, targets: &'a ServoTargets) -> Result<Self, TimerError> {
        if timer.ticks_for_us(1) == 0 {
            return Err(TimerError::Unrepresentable {
                target_hz: 1_000_000,
            });
        }
        let slot_ticks = timer.ticks_for_us(SLOT_US);
        if slot_ticks > timer.timer().max_reload() {
            return Err(TimerError::ReloadOutOfRange { reload: slot_ticks });
        }

        Ok(Self {
            half_slot_ticks: timer.ticks_for_us(HALF_SLOT_US),
            timer,
            pins: core::array::from_fn(|_| None),
            targets,
            phase: 0,
            last_high: 0,
            slot_ticks,
        })
    }

    /// Wire a channel's signal pin, driving it low
    pub fn set_pin(&mut self, channel: usize, mut pin: P) -> Result<(), ServoError> {
        let slot = self
            .pins
            .get_mut(channel)
            .ok_or(ServoError::NoSuchChannel(channel))?;
        pin.set_low();
        *slot = Some(pin);
        Ok(())
    }

    /// Handle one timer firing
    ///
    /// Returns the number of ticks programmed until the next firing.
    pub fn fire(&mut self) -> u32 {
        self.timer.acknowledge();

        let channel = usize::from(self.phase / 2);
        let pin = self.pins[channel].as_mut();

        let ticks = if self.phase % 2 == 0 {
            self.last_high = match clamp_pulse_us(self.targets.get_us(channel)) {
                Some(width_us) => {
                    if let Some(pin) = pin {
                        pin.set_high();
                    }
                    self.timer.ticks_for_us(u32::from(width_us))
                }
                None => self.half_slot_ticks,
            };
            self.last_high
        } else {
            if let Some(pin) = pin {
                pin.set_low();
            }
            self.slot_ticks - self.last_high
        };

        self.phase = (self.phase + 1) % PHASES;
        self.timer.rearm(ticks)
    }

    /// Phase the next firing handles (0..8)
    pub fn phase(&self) -> u8 {
        self.phase
    }

    /// Slot length in timer ticks
    pub fn slot_ticks(&self) -> u32 {
        self.slot_ticks
    }

    pub fn pin(&self, channel: usize) -> Option<&P> {
        self.pins.get(channel)?.as_ref()
    }

    pub fn timer(&self) -> &TimerChannel<T> {
        &self.timer
    }
}
