//! Software PWM
//!
//! Every output runs on a shared 8-bit cycle counter advanced once per
//! multiplexer firing. A cycle is 256 firings long. At counter 0 each
//! channel latches its duty target and switches on if the duty is non-zero;
//! it switches off when the counter reaches the latched duty. A duty of 255
//! never switches off, so the output stays on across cycles.

use cadence_hal::OutputPin;
use heapless::Vec;

use crate::shared::{DutyTargets, OutputId};

/// Duty that keeps an output permanently on
pub const ALWAYS_ON: u8 = 255;

/// Maximum number of software PWM channels
pub const MAX_PWM_CHANNELS: usize = 16;

/// Errors when building the channel set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PwmError {
    /// Channel set is full
    Full,
    /// Output already has a channel
    Duplicate(OutputId),
    /// Output cannot be addressed in the duty targets
    UnknownOutput(OutputId),
}

/// One software PWM output
pub struct PwmChannel<P: OutputPin> {
    id: OutputId,
    pin: P,
    latched: u8,
    active_low: bool,
}

impl<P: OutputPin> PwmChannel<P> {
    fn new(id: OutputId, pin: P, active_low: bool) -> Self {
        let mut channel = Self {
            id,
            pin,
            latched: 0,
            active_low,
        };
        channel.drive(false);
        channel
    }

    #[inline]
    fn drive(&mut self, on: bool) {
        self.pin.set_state(on != self.active_low);
    }

    #[inline]
    fn begin_cycle(&mut self, duty: u8) {
        self.latched = duty;
        if duty > 0 {
            self.drive(true);
        }
    }

    #[inline]
    fn tick(&mut self, counter: u8) {
        if self.latched == counter && self.latched != ALWAYS_ON {
            self.drive(false);
        }
    }

    /// Output this channel drives
    pub fn id(&self) -> OutputId {
        self.id
    }

    /// Duty latched at the start of the current cycle
    pub fn latched(&self) -> u8 {
        self.latched
    }

    /// Check whether the output is currently on
    pub fn is_on(&self) -> bool {
        self.pin.is_set_high() != self.active_low
    }

    pub fn pin(&self) -> &P {
        &self.pin
    }
}

/// Set of software PWM channels sharing one cycle counter
pub struct SoftPwm<P: OutputPin> {
    channels: Vec<PwmChannel<P>, MAX_PWM_CHANNELS>,
    counter: u8,
}

impl<P: OutputPin> SoftPwm<P> {
    pub const fn new() -> Self {
        Self {
            channels: Vec::new(),
            counter: 0,
        }
    }

    /// Add a wired output
    ///
    /// The pin is switched off immediately. Outputs without a pin are simply
    /// never added.
    pub fn add(&mut self, id: OutputId, pin: P, active_low: bool) -> Result<(), PwmError> {
        if self.channels.iter().any(|ch| ch.id == id) {
            return Err(PwmError::Duplicate(id));
        }
        if !id.is_addressable() {
            return Err(PwmError::UnknownOutput(id));
        }
        self.channels
            .push(PwmChannel::new(id, pin, active_low))
            .map_err(|_| PwmError::Full)
    }

    /// Advance one firing
    ///
    /// Latches duties at the start of a cycle, switches off every channel
    /// whose duty the counter has reached, then advances the counter.
    pub fn step(&mut self, duties: &DutyTargets) {
        let counter = self.counter;
        if counter == 0 {
            for channel in self.channels.iter_mut() {
                channel.begin_cycle(duties.get(channel.id));
            }
        }
        for channel in self.channels.iter_mut() {
            channel.tick(counter);
        }
        self.counter = counter.wrapping_add(1);
    }

    /// Cycle position of the next firing
    pub fn counter(&self) -> u8 {
        self.counter
    }

    pub fn channels(&self) -> &[PwmChannel<P>] {
        &self.channels
    }

    pub fn channel(&self, id: OutputId) -> Option<&PwmChannel<P>> {
        self.channels.iter().find(|ch| ch.id == id)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl<P: OutputPin> Default for SoftPwm<P> {
    fn default() -> Self {
        Self::new()
    }
}
