//! Extruder advance pacer
//!
//! Issues the extruder steps queued in [`AdvanceState`] one per firing, at
//! the fixed rate of its own timer. A direction change costs one firing
//! without a step plus a settle penalty so the driver sees the new direction
//! well before the next step edge.
//!
//! The penalty stretches only the firing after the direction change. Every
//! other firing re-arms at the base interval the channel was configured
//! with, so the step rate does not drift with repeated reversals.

use cadence_hal::HardwareTimer;
use embedded_hal::delay::DelayNs;

use crate::config::AdvanceConfig;
use crate::shared::AdvanceState;
use crate::stepper::ExtruderDriver;
use crate::timer::TimerChannel;

/// Extruder motor with direct step and direction lines
pub trait ExtruderStepper: ExtruderDriver {
    /// Set the direction line (`true` = extrude)
    fn set_direction(&mut self, forward: bool);

    /// Raise the step line
    fn step(&mut self);

    /// Lower the step line
    fn unstep(&mut self);
}

/// Extruder direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StepDirection {
    Forward,
    Reverse,
}

/// Outcome of one firing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdvanceAction {
    /// Advance is switched off; timer left alone
    Inactive,
    /// No steps owed
    Idle,
    /// Direction changed, no step this firing
    Settling(StepDirection),
    /// One step issued
    Stepped(StepDirection),
}

/// Extruder advance timer handler state
pub struct ExtruderAdvancePacer<'a, T: HardwareTimer> {
    timer: TimerChannel<T>,
    state: &'a AdvanceState,
    last_direction: Option<StepDirection>,
    interval: u32,
    settle_ticks: u32,
    pulse_high_us: u32,
}

impl<'a, T: HardwareTimer> ExtruderAdvancePacer<'a, T> {
    /// Create a pacer on an already configured timer channel
    ///
    /// The channel's current reload becomes the base step interval.
    pub fn new(timer: TimerChannel<T>, state: &'a AdvanceState, config: &AdvanceConfig) -> Self {
        let interval = timer.reload();
        Self {
            timer,
            state,
            last_direction: None,
            interval,
            settle_ticks: config.settle_ticks,
            pulse_high_us: config.pulse_high_us,
        }
    }

    /// Handle one timer firing
    pub fn fire<S, D>(&mut self, stepper: &mut S, delay: &mut D) -> AdvanceAction
    where
        S: ExtruderStepper,
        D: DelayNs,
    {
        self.timer.acknowledge();

        if !self.state.is_active() {
            return AdvanceAction::Inactive;
        }

        let owed = self.state.owed();
        let (action, ticks) = if owed > 0 && self.last_direction != Some(StepDirection::Forward) {
            self.turn(stepper, StepDirection::Forward)
        } else if owed < 0 && self.last_direction != Some(StepDirection::Reverse) {
            self.turn(stepper, StepDirection::Reverse)
        } else {
            match self.last_direction {
                Some(direction) if owed != 0 => {
                    stepper.step();
                    self.state
                        .record_step(direction == StepDirection::Forward);
                    delay.delay_us(self.pulse_high_us);
                    stepper.unstep();
                    (AdvanceAction::Stepped(direction), self.interval)
                }
                _ => (AdvanceAction::Idle, self.interval),
            }
        };

        self.timer.rearm(ticks);
        action
    }

    fn turn<S: ExtruderStepper>(
        &mut self,
        stepper: &mut S,
        direction: StepDirection,
    ) -> (AdvanceAction, u32) {
        stepper.set_direction(direction == StepDirection::Forward);
        self.last_direction = Some(direction);
        (
            AdvanceAction::Settling(direction),
            self.interval.saturating_add(self.settle_ticks),
        )
    }

    /// Direction the extruder was last set to
    pub fn last_direction(&self) -> Option<StepDirection> {
        self.last_direction
    }

    /// Base step interval in ticks
    pub fn interval(&self) -> u32 {
        self.interval
    }

    pub fn timer(&self) -> &TimerChannel<T> {
        &self.timer
    }
}
