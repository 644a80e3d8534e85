//! State shared between handlers and the main program
//!
//! Every cell is built from machine-word atomics and every field has exactly
//! one writing context, noted on the type. Readers may observe a value that
//! is one update old but never a torn one.

use portable_atomic::{AtomicBool, AtomicI32, AtomicU16, AtomicU32, AtomicU8, Ordering};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Extruders with heater and cooler outputs
pub const MAX_EXTRUDERS: usize = 6;

/// Analog result slots
pub const MAX_ANALOG_INPUTS: usize = 8;

/// Servo channels multiplexed on the servo timer
pub const SERVO_CHANNELS: usize = 4;

/// Physical output driven by a software PWM channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OutputId {
    /// Hot end heater of extruder `n`
    ExtruderHeater(u8),
    /// Hot end cooling fan of extruder `n`
    ExtruderCooler(u8),
    /// Heated bed
    Bed,
    /// Electronics cooling fan
    BoardFan,
    /// Part cooling fan
    PartFan,
}

impl OutputId {
    /// Check whether the output has a duty slot
    pub fn is_addressable(&self) -> bool {
        match *self {
            OutputId::ExtruderHeater(n) | OutputId::ExtruderCooler(n) => {
                usize::from(n) < MAX_EXTRUDERS
            }
            OutputId::Bed | OutputId::BoardFan | OutputId::PartFan => true,
        }
    }
}

/// PWM duty targets
///
/// Written by the controller, read by the multiplexer once per PWM cycle.
pub struct DutyTargets {
    heaters: [AtomicU8; MAX_EXTRUDERS],
    coolers: [AtomicU8; MAX_EXTRUDERS],
    bed: AtomicU8,
    board_fan: AtomicU8,
    part_fan: AtomicU8,
}

impl DutyTargets {
    /// All outputs off
    pub const fn new() -> Self {
        Self {
            heaters: [const { AtomicU8::new(0) }; MAX_EXTRUDERS],
            coolers: [const { AtomicU8::new(0) }; MAX_EXTRUDERS],
            bed: AtomicU8::new(0),
            board_fan: AtomicU8::new(0),
            part_fan: AtomicU8::new(0),
        }
    }

    fn slot(&self, id: OutputId) -> Option<&AtomicU8> {
        match id {
            OutputId::ExtruderHeater(n) => self.heaters.get(usize::from(n)),
            OutputId::ExtruderCooler(n) => self.coolers.get(usize::from(n)),
            OutputId::Bed => Some(&self.bed),
            OutputId::BoardFan => Some(&self.board_fan),
            OutputId::PartFan => Some(&self.part_fan),
        }
    }

    /// Set the duty of an output (0 = off, 255 = fully on)
    ///
    /// Extruder indices beyond [`MAX_EXTRUDERS`] are ignored.
    pub fn set(&self, id: OutputId, duty: u8) {
        if let Some(slot) = self.slot(id) {
            slot.store(duty, Ordering::Relaxed);
        }
    }

    /// Current duty of an output
    pub fn get(&self, id: OutputId) -> u8 {
        self.slot(id)
            .map(|slot| slot.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

impl Default for DutyTargets {
    fn default() -> Self {
        Self::new()
    }
}

/// Oversampled analog results
///
/// Written by the multiplexer, read by the controller.
pub struct AnalogReadings {
    values: [AtomicU16; MAX_ANALOG_INPUTS],
}

impl AnalogReadings {
    pub const fn new() -> Self {
        Self {
            values: [const { AtomicU16::new(0) }; MAX_ANALOG_INPUTS],
        }
    }

    /// Latest result of slot `index`, or 0 if never published
    pub fn get(&self, index: usize) -> u16 {
        self.values
            .get(index)
            .map(|v| v.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub(crate) fn publish(&self, index: usize, value: u16) {
        if let Some(slot) = self.values.get(index) {
            slot.store(value, Ordering::Relaxed);
        }
    }
}

impl Default for AnalogReadings {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot maintenance-due flag
///
/// Two epochs: the multiplexer advances `raised`, the main program catches
/// `consumed` up to it. A tick raised while the previous one is still
/// pending is merged with it.
pub struct MaintenanceFlag {
    raised: AtomicU32,
    consumed: AtomicU32,
}

impl MaintenanceFlag {
    pub const fn new() -> Self {
        Self {
            raised: AtomicU32::new(0),
            consumed: AtomicU32::new(0),
        }
    }

    pub(crate) fn raise(&self) {
        self.raised.fetch_add(1, Ordering::Release);
    }

    /// Check without clearing
    pub fn is_due(&self) -> bool {
        self.raised.load(Ordering::Acquire) != self.consumed.load(Ordering::Relaxed)
    }

    /// Report and clear the flag
    pub fn take(&self) -> bool {
        let raised = self.raised.load(Ordering::Acquire);
        if raised == self.consumed.load(Ordering::Relaxed) {
            return false;
        }
        self.consumed.store(raised, Ordering::Relaxed);
        true
    }
}

impl Default for MaintenanceFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Servo pulse widths in microseconds (0 = disabled)
///
/// Written by the main program, read by the servo handler.
pub struct ServoTargets {
    widths: [AtomicU16; SERVO_CHANNELS],
}

impl ServoTargets {
    pub const fn new() -> Self {
        Self {
            widths: [const { AtomicU16::new(0) }; SERVO_CHANNELS],
        }
    }

    /// Set the pulse width of a channel; out-of-range channels are ignored
    ///
    /// The handler clamps the width to the servo range when it frames the
    /// pulse.
    pub fn set_us(&self, channel: usize, width_us: u16) {
        if let Some(slot) = self.widths.get(channel) {
            slot.store(width_us, Ordering::Relaxed);
        }
    }

    pub fn get_us(&self, channel: usize) -> u16 {
        self.widths
            .get(channel)
            .map(|w| w.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

impl Default for ServoTargets {
    fn default() -> Self {
        Self::new()
    }
}

/// Extruder advance bookkeeping
///
/// | Field | Writer |
/// |---|---|
/// | `active` | main program |
/// | `requested`, `advance_set` | stepper context |
/// | `issued` | advance handler |
///
/// Steps still owed are `requested - issued`, computed with wrapping
/// arithmetic so either counter may overflow freely.
pub struct AdvanceState {
    active: AtomicBool,
    requested: AtomicI32,
    issued: AtomicI32,
    advance_set: AtomicI32,
}

impl AdvanceState {
    pub const fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            requested: AtomicI32::new(0),
            issued: AtomicI32::new(0),
            advance_set: AtomicI32::new(0),
        }
    }

    /// Enable or disable the advance handler
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Queue extruder steps (negative = retract); stepper context only
    pub fn request_steps(&self, steps: i32) {
        let requested = self.requested.load(Ordering::Relaxed);
        self.requested
            .store(requested.wrapping_add(steps), Ordering::Release);
    }

    /// Move the extruder to hold `steps` of advance; stepper context only
    ///
    /// Only the difference to the currently applied advance is queued.
    pub fn set_advance(&self, steps: i32) {
        let applied = self.advance_set.load(Ordering::Relaxed);
        self.request_steps(steps.wrapping_sub(applied));
        self.advance_set.store(steps, Ordering::Relaxed);
    }

    /// Advance currently applied, in steps
    pub fn advance_applied(&self) -> i32 {
        self.advance_set.load(Ordering::Relaxed)
    }

    /// Take back the applied advance; stepper context only
    ///
    /// Called when motion stops. Returns the number of steps queued.
    pub fn fold_advance(&self) -> i32 {
        let applied = self.advance_set.load(Ordering::Relaxed);
        if applied == 0 {
            return 0;
        }
        self.request_steps(applied.wrapping_neg());
        self.advance_set.store(0, Ordering::Relaxed);
        applied.wrapping_neg()
    }

    /// Steps requested but not yet issued (negative = reverse)
    pub fn owed(&self) -> i32 {
        let requested = self.requested.load(Ordering::Acquire);
        let issued = self.issued.load(Ordering::Acquire);
        requested.wrapping_sub(issued)
    }

    /// Account one issued step; advance handler only
    pub(crate) fn record_step(&self, forward: bool) {
        let issued = self.issued.load(Ordering::Relaxed);
        let next = if forward {
            issued.wrapping_add(1)
        } else {
            issued.wrapping_sub(1)
        };
        self.issued.store(next, Ordering::Release);
    }
}

impl Default for AdvanceState {
    fn default() -> Self {
        Self::new()
    }
}
