//! Cortex-M interrupt gate
//!
//! Exception entry does not touch PRIMASK, so a handler runs preemptible by
//! every higher group priority. [`CortexMGate::hold`] sets PRIMASK for the
//! handler's critical part; [`CortexMGate::allow`] clears it again unless
//! it was already set when the hold began.

#![allow(unsafe_code)]

use cortex_m::interrupt;
use cortex_m::register::primask;

use crate::timer::InterruptGate;

/// Gate that masks preemption through PRIMASK
#[derive(Debug, Default, Clone, Copy)]
pub struct CortexMGate {
    restore: bool,
}

impl CortexMGate {
    pub const fn new() -> Self {
        Self { restore: false }
    }
}

impl InterruptGate for CortexMGate {
    fn hold(&mut self) {
        self.restore = primask::read().is_active();
        interrupt::disable();
    }

    fn allow(&mut self) {
        if self.restore {
            self.restore = false;
            // SAFETY: only re-enables interrupts that were enabled when the
            // matching hold began; handlers using the gate hold no
            // critical-section tokens across the call.
            unsafe { interrupt::enable() };
        }
    }
}
