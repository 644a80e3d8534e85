//! Stepper pacing
//!
//! The stepper handler executes one motion step per firing and re-arms its
//! timer with the interval the motion engine returns. When the motion queue
//! is empty it counts down a relax period, then releases the extruder.
//!
//! The handler ends its critical region right after re-arming, so a slow
//! step computation can be overtaken by the next firing. Wrap the pacer in a
//! [`ReentrancyGuard`] and enter through [`on_stepper_interrupt`] so that the
//! overtaking firing returns without doing anything.

use cadence_hal::{HardwareTimer, InterruptGate};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::guard::{CriticalRegion, ReentrancyGuard};
use crate::timer::{reload_for, TimerChannel, TimerError};

#[cfg(feature = "advance")]
use crate::shared::AdvanceState;

/// Source of motion steps
pub trait MotionEngine {
    /// Check whether a move is queued
    fn has_pending_move(&self) -> bool;

    /// Execute one step of the current move
    ///
    /// Returns the number of stepper timer ticks until the next step.
    fn step(&mut self) -> u32;
}

/// Extruder motor driver
pub trait ExtruderDriver {
    /// Remove holding current from the extruder motor
    fn disable(&mut self);
}

/// Pacer state after a firing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StepperState {
    /// No motion and the relax period has run out
    Idle,
    /// A step was executed this firing
    Stepping,
    /// No motion, counting down before going idle
    Relaxing,
}

/// Stepper pacer configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StepperConfig {
    /// Fixed timer divisor; step intervals are counted in these ticks
    pub divisor: u32,
    /// Firing rate while no move is queued, in Hz
    pub idle_hz: u32,
    /// Idle firings to wait after the last step before going idle
    pub relax_firings: u16,
    /// Disable the extruder motor once idle
    pub disable_extruder: bool,
}

impl Default for StepperConfig {
    fn default() -> Self {
        Self {
            divisor: 2,
            idle_hz: 244,
            relax_firings: 0,
            disable_extruder: true,
        }
    }
}

/// Stepper timer handler state
pub struct StepperPacer<T: HardwareTimer> {
    timer: TimerChannel<T>,
    config: StepperConfig,
    state: StepperState,
    idle_ticks: u32,
    relax_remaining: u16,
    extruder_released: bool,
    steps: u32,
    #[cfg(feature = "advance")]
    advance: Option<&'static AdvanceState>,
}

impl<T: HardwareTimer> StepperPacer<T> {
    /// Create a pacer on an already configured timer channel
    ///
    /// Fails if the idle rate does not fit the channel's reload range.
    pub fn new(timer: TimerChannel<T>, config: StepperConfig) -> Result<Self, TimerError> {
        let idle_ticks = reload_for(
            timer.timer().base_clock_hz(),
            timer.setup().prescaler,
            timer.timer().max_reload(),
            config.idle_hz,
        )?;

        Ok(Self {
            timer,
            config,
            state: StepperState::Idle,
            idle_ticks,
            relax_remaining: 0,
            extruder_released: true,
            steps: 0,
            #[cfg(feature = "advance")]
            advance: None,
        })
    }

    /// Fold advance back into the owed extruder steps when going idle
    #[cfg(feature = "advance")]
    pub fn with_advance(mut self, advance: &'static AdvanceState) -> Self {
        self.advance = Some(advance);
        self
    }

    /// Handle one timer firing
    pub fn fire<M, E, G>(&mut self, motion: &mut M, extruder: &mut E, gate: &mut G) -> StepperState
    where
        M: MotionEngine,
        E: ExtruderDriver,
        G: InterruptGate,
    {
        self.timer.acknowledge();
        self.run(motion, extruder, gate)
    }

    /// Handle a firing whose compare event was already acknowledged
    pub fn run<M, E, G>(&mut self, motion: &mut M, extruder: &mut E, gate: &mut G) -> StepperState
    where
        M: MotionEngine,
        E: ExtruderDriver,
        G: InterruptGate,
    {
        if motion.has_pending_move() {
            let mut region = CriticalRegion::enter(gate);
            let interval = motion.step();
            self.timer.rearm(interval);
            region.end();

            self.steps = self.steps.wrapping_add(1);
            self.relax_remaining = self.config.relax_firings;
            self.extruder_released = false;
            self.state = StepperState::Stepping;
            return self.state;
        }

        if self.state == StepperState::Stepping {
            self.timer.rearm(self.idle_ticks);
        }

        if self.relax_remaining > 0 {
            self.relax_remaining -= 1;
            self.state = StepperState::Relaxing;
        } else {
            self.state = StepperState::Idle;
            if !self.extruder_released {
                self.release_extruder(extruder);
            }
        }
        self.state
    }

    #[cfg(feature = "advance")]
    fn release_extruder<E: ExtruderDriver>(&mut self, extruder: &mut E) {
        let owed = match self.advance {
            Some(advance) => {
                advance.fold_advance();
                advance.owed()
            }
            None => 0,
        };

        // The advance handler still has steps to issue; check again next
        // firing.
        if owed != 0 {
            return;
        }
        if self.config.disable_extruder {
            extruder.disable();
        }
        self.extruder_released = true;
    }

    #[cfg(not(feature = "advance"))]
    fn release_extruder<E: ExtruderDriver>(&mut self, extruder: &mut E) {
        if self.config.disable_extruder {
            extruder.disable();
        }
        self.extruder_released = true;
    }

    /// State after the latest firing
    pub fn state(&self) -> StepperState {
        self.state
    }

    /// Steps executed since creation (wrapping)
    pub fn steps(&self) -> u32 {
        self.steps
    }

    /// Reload programmed while no move is queued
    pub fn idle_ticks(&self) -> u32 {
        self.idle_ticks
    }

    pub fn timer(&self) -> &TimerChannel<T> {
        &self.timer
    }
}

/// Stepper interrupt entry point
///
/// `acknowledge` clears the timer's compare status. It runs before the
/// guard is checked, so a firing that overtakes an unfinished one still
/// clears its own event instead of re-pending forever.
///
/// Returns `None` if the firing overtook a previous one that has not
/// finished yet; the pacer is not touched in that case.
pub fn on_stepper_interrupt<T, A, M, E, G>(
    pacer: &ReentrancyGuard<StepperPacer<T>>,
    acknowledge: A,
    motion: &mut M,
    extruder: &mut E,
    gate: &mut G,
) -> Option<StepperState>
where
    T: HardwareTimer,
    A: FnOnce(),
    M: MotionEngine,
    E: ExtruderDriver,
    G: InterruptGate,
{
    acknowledge();
    pacer.try_enter(|pacer| pacer.run(motion, extruder, gate))
}
