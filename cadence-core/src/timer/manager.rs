//! Timer channel management

use cadence_hal::{HardwareTimer, InterruptPriority};

use super::divisor::{find_divisor, TimerError, TimerSetup};

/// Default handler priorities
///
/// Lower group numbers preempt higher ones. The stepper and advance handlers
/// share a group so neither interrupts the other; the sub-priority only
/// decides which of two pending firings runs first.
pub mod priorities {
    use cadence_hal::InterruptPriority;

    /// Priority grouping programmed into the interrupt controller
    pub const PRIORITY_GROUPING: u8 = 4;
    /// Implemented priority bits of the reference controller
    pub const PRIO_BITS: u8 = 4;

    pub const STEPPER: InterruptPriority = InterruptPriority::new(1, 0);
    pub const ADVANCE: InterruptPriority = InterruptPriority::new(1, 1);
    pub const PWM: InterruptPriority = InterruptPriority::new(2, 0);
    pub const SERVO: InterruptPriority = InterruptPriority::new(3, 0);
    pub const TONE: InterruptPriority = InterruptPriority::new(4, 0);
}

/// A hardware timer channel owned by one handler
pub struct TimerChannel<T: HardwareTimer> {
    timer: T,
}

impl<T: HardwareTimer> TimerChannel<T> {
    /// Wrap a timer channel; nothing is programmed yet
    pub fn new(timer: T) -> Self {
        Self { timer }
    }

    /// Program the channel to fire at `target_hz` and enable its interrupt
    pub fn configure(
        &mut self,
        target_hz: u32,
        priority: InterruptPriority,
    ) -> Result<TimerSetup, TimerError> {
        let setup = find_divisor(
            self.timer.base_clock_hz(),
            self.timer.prescalers(),
            self.timer.max_reload(),
            target_hz,
        )?;
        self.program(setup, priority);
        Ok(setup)
    }

    /// Program an explicit divisor and initial reload
    ///
    /// Used for dynamically paced channels whose tick length is part of the
    /// motion engine's contract.
    pub fn configure_with_divisor(
        &mut self,
        divisor: u32,
        reload: u32,
        priority: InterruptPriority,
    ) -> Result<TimerSetup, TimerError> {
        if !self.timer.prescalers().contains(&divisor) {
            return Err(TimerError::InvalidDivisor { divisor });
        }
        if reload == 0 || reload > self.timer.max_reload() {
            return Err(TimerError::ReloadOutOfRange { reload });
        }

        let setup = TimerSetup {
            prescaler: divisor,
            reload,
        };
        self.program(setup, priority);
        Ok(setup)
    }

    fn program(&mut self, setup: TimerSetup, priority: InterruptPriority) {
        self.timer.set_prescaler(setup.prescaler);
        self.timer.set_reload(setup.reload);
        self.timer.start();
        self.timer.enable_interrupt(priority);
    }

    /// Change the firing frequency of a running channel
    ///
    /// The interrupt priority is left as configured.
    pub fn retune(&mut self, target_hz: u32) -> Result<TimerSetup, TimerError> {
        let setup = find_divisor(
            self.timer.base_clock_hz(),
            self.timer.prescalers(),
            self.timer.max_reload(),
            target_hz,
        )?;
        self.timer.set_prescaler(setup.prescaler);
        self.timer.set_reload(setup.reload);
        self.timer.start();
        Ok(setup)
    }

    /// Set the number of ticks until the next firing
    ///
    /// The counter keeps running. The value is clamped to
    /// `[1, max_reload]`; the clamped value is returned.
    #[inline]
    pub fn rearm(&mut self, ticks: u32) -> u32 {
        let ticks = ticks.clamp(1, self.timer.max_reload().max(1));
        self.timer.set_reload(ticks);
        ticks
    }

    /// Acknowledge the compare event
    #[inline]
    pub fn acknowledge(&mut self) {
        self.timer.acknowledge();
    }

    /// Current reload value
    pub fn reload(&self) -> u32 {
        self.timer.reload()
    }

    /// Currently programmed prescaler and reload
    pub fn setup(&self) -> TimerSetup {
        TimerSetup {
            prescaler: self.timer.prescaler(),
            reload: self.timer.reload(),
        }
    }

    /// Firing frequency of the current setup, in Hz
    pub fn realized_hz(&self) -> u32 {
        self.setup().realized_hz(self.timer.base_clock_hz())
    }

    /// Firing period of the current setup, in nanoseconds
    pub fn period_ns(&self) -> u64 {
        self.setup().period_ns(self.timer.base_clock_hz())
    }

    /// Convert microseconds to counter ticks at the current prescaler
    ///
    /// Saturates at `u32::MAX`.
    pub fn ticks_for_us(&self, us: u32) -> u32 {
        let prescaler = u64::from(self.timer.prescaler().max(1));
        let ticks = u64::from(self.timer.base_clock_hz()) * u64::from(us) / prescaler / 1_000_000;
        u32::try_from(ticks).unwrap_or(u32::MAX)
    }

    /// Underlying timer
    pub fn timer(&self) -> &T {
        &self.timer
    }

    /// Underlying timer, mutably
    pub fn timer_mut(&mut self) -> &mut T {
        &mut self.timer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockTimer, SAM3X_PRESCALERS};

    #[test]
    fn test_configure_programs_and_enables() {
        let mut channel = TimerChannel::new(MockTimer::new(84_000_000));
        let setup = channel.configure(3906, priorities::PWM).unwrap();

        let timer = channel.timer();
        assert_eq!(timer.prescaler, setup.prescaler);
        assert_eq!(timer.reload, setup.reload);
        assert!(timer.started);
        assert_eq!(timer.priority, Some(priorities::PWM));
    }

    #[test]
    fn test_configure_failure_leaves_timer_untouched() {
        let mut channel =
            TimerChannel::new(MockTimer::with_limits(84_000_000, SAM3X_PRESCALERS, 0xFFFF));
        assert_eq!(
            channel.configure(0, priorities::TONE),
            Err(TimerError::Unrepresentable { target_hz: 0 })
        );
        assert!(!channel.timer().started);
        assert_eq!(channel.timer().priority, None);
    }

    #[test]
    fn test_configure_with_divisor() {
        let mut channel = TimerChannel::new(MockTimer::new(84_000_000));
        channel
            .configure_with_divisor(2, 1000, priorities::STEPPER)
            .unwrap();
        assert_eq!(channel.period_ns(), 23_809);

        assert_eq!(
            channel.configure_with_divisor(3, 1000, priorities::STEPPER),
            Err(TimerError::InvalidDivisor { divisor: 3 })
        );
        assert_eq!(
            channel.configure_with_divisor(2, 0, priorities::STEPPER),
            Err(TimerError::ReloadOutOfRange { reload: 0 })
        );
    }

    #[test]
    fn test_rearm_clamps() {
        let mut channel =
            TimerChannel::new(MockTimer::with_limits(84_000_000, SAM3X_PRESCALERS, 0xFFFF));
        assert_eq!(channel.rearm(0), 1);
        assert_eq!(channel.rearm(500), 500);
        assert_eq!(channel.rearm(1_000_000), 0xFFFF);
        assert_eq!(channel.timer().reloads.as_slice(), &[1, 500, 0xFFFF]);
        // Re-arming never restarts the counter
        assert!(!channel.timer().started);
    }

    #[test]
    fn test_retune_keeps_priority() {
        let mut channel = TimerChannel::new(MockTimer::new(84_000_000));
        channel.configure(1000, priorities::TONE).unwrap();
        channel.retune(4000).unwrap();
        assert_eq!(channel.realized_hz(), 4000);
        assert_eq!(channel.timer().priority, Some(priorities::TONE));
    }

    #[test]
    fn test_ticks_for_us() {
        let mut channel = TimerChannel::new(MockTimer::new(84_000_000));
        channel.configure_with_divisor(2, 100, priorities::SERVO).unwrap();
        // 42 ticks per microsecond
        assert_eq!(channel.ticks_for_us(1500), 63_000);
        assert_eq!(channel.ticks_for_us(5000), 210_000);
    }

    #[test]
    fn test_priority_order() {
        use priorities::*;
        assert!(STEPPER.preempts(&PWM));
        assert!(ADVANCE.preempts(&PWM));
        assert!(PWM.preempts(&SERVO));
        assert!(SERVO.preempts(&TONE));
        assert!(!STEPPER.preempts(&ADVANCE));
        assert_eq!(STEPPER.encode(PRIORITY_GROUPING, PRIO_BITS), 2);
        assert_eq!(ADVANCE.encode(PRIORITY_GROUPING, PRIO_BITS), 3);
    }
}
