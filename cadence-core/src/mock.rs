//! Test doubles for the hardware traits

use core::cell::Cell;

use cadence_hal::{
    AdcSequencer, FreeRunningCounter, HardwareTimer, InterruptGate, InterruptPriority, OutputPin,
};
use heapless::Vec;

/// Timer/counter channel prescalers of the reference board
pub const SAM3X_PRESCALERS: &[u32] = &[2, 8, 32, 128];

/// Mock timer channel recording every reload written
pub struct MockTimer {
    pub base_clock_hz: u32,
    pub prescalers: &'static [u32],
    pub max_reload: u32,
    pub prescaler: u32,
    pub reload: u32,
    pub started: bool,
    pub priority: Option<InterruptPriority>,
    pub acks: u32,
    pub reloads: Vec<u32, 64>,
}

impl MockTimer {
    pub fn new(base_clock_hz: u32) -> Self {
        Self::with_limits(base_clock_hz, SAM3X_PRESCALERS, u32::MAX)
    }

    pub fn with_limits(base_clock_hz: u32, prescalers: &'static [u32], max_reload: u32) -> Self {
        Self {
            base_clock_hz,
            prescalers,
            max_reload,
            prescaler: 1,
            reload: 0,
            started: false,
            priority: None,
            acks: 0,
            reloads: Vec::new(),
        }
    }
}

impl HardwareTimer for MockTimer {
    fn base_clock_hz(&self) -> u32 {
        self.base_clock_hz
    }

    fn prescalers(&self) -> &[u32] {
        self.prescalers
    }

    fn max_reload(&self) -> u32 {
        self.max_reload
    }

    fn set_prescaler(&mut self, prescaler: u32) {
        self.prescaler = prescaler;
    }

    fn prescaler(&self) -> u32 {
        self.prescaler
    }

    fn set_reload(&mut self, reload: u32) {
        self.reload = reload;
        let _ = self.reloads.push(reload);
    }

    fn reload(&self) -> u32 {
        self.reload
    }

    fn start(&mut self) {
        self.started = true;
    }

    fn enable_interrupt(&mut self, priority: InterruptPriority) {
        self.priority = Some(priority);
    }

    fn acknowledge(&mut self) {
        self.acks += 1;
    }
}

/// Mock output pin counting edges
#[derive(Debug, Default)]
pub struct MockPin {
    pub high: bool,
    pub rising: u32,
    pub falling: u32,
}

impl OutputPin for MockPin {
    fn set_high(&mut self) {
        if !self.high {
            self.rising += 1;
        }
        self.high = true;
    }

    fn set_low(&mut self) {
        if self.high {
            self.falling += 1;
        }
        self.high = false;
    }

    fn is_set_high(&self) -> bool {
        self.high
    }
}

/// Mock ADC returning a fixed value per hardware channel
pub struct MockAdc {
    pub values: [u16; 16],
    pub ready: bool,
    pub conversions_started: u32,
    pub reads: u32,
}

impl MockAdc {
    pub fn constant(value: u16) -> Self {
        Self {
            values: [value; 16],
            ready: true,
            conversions_started: 0,
            reads: 0,
        }
    }
}

impl AdcSequencer for MockAdc {
    fn is_ready(&self, _channel: u8) -> bool {
        self.ready
    }

    fn read(&mut self, channel: u8) -> u16 {
        self.reads += 1;
        self.values[usize::from(channel)]
    }

    fn start_conversion(&mut self) {
        self.conversions_started += 1;
    }
}

/// Gate counting holds and releases, checking they alternate
#[derive(Debug, Default)]
pub struct CountingGate {
    pub held: u32,
    pub allowed: u32,
    pub masked: bool,
}

impl InterruptGate for CountingGate {
    fn hold(&mut self) {
        assert!(!self.masked, "hold while already held");
        self.masked = true;
        self.held += 1;
    }

    fn allow(&mut self) {
        assert!(self.masked, "allow without a hold");
        self.masked = false;
        self.allowed += 1;
    }
}

/// Free-running counter advancing by a fixed amount on every read
pub struct SteppingCounter {
    pub value: Cell<u32>,
    pub step: u32,
    pub bits: u32,
    pub reads: Cell<u32>,
    pub last: Cell<Option<u32>>,
    pub wrapped: Cell<bool>,
}

impl SteppingCounter {
    pub fn new(start: u32, step: u32, bits: u32) -> Self {
        Self {
            value: Cell::new(start),
            step,
            bits,
            reads: Cell::new(0),
            last: Cell::new(None),
            wrapped: Cell::new(false),
        }
    }

    fn mask(&self) -> u32 {
        if self.bits >= 32 {
            u32::MAX
        } else {
            (1 << self.bits) - 1
        }
    }
}

impl FreeRunningCounter for SteppingCounter {
    fn now(&self) -> u32 {
        let current = self.value.get();
        if self.last.get().is_some_and(|last| current < last) {
            self.wrapped.set(true);
        }
        self.last.set(Some(current));
        self.value.set(current.wrapping_add(self.step) & self.mask());
        self.reads.set(self.reads.get() + 1);
        current
    }

    fn bits(&self) -> u32 {
        self.bits
    }
}
