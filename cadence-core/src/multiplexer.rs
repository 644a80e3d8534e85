//! Heater PWM and sampling multiplexer
//!
//! One fixed-frequency handler carries every slow-moving output duty:
//!
//! 1. software PWM edges for heaters and fans ([`pwm`](crate::pwm))
//! 2. end of the critical region
//! 3. the maintenance tick ([`periodic`](crate::periodic))
//! 4. one analog conversion ([`sampling`](crate::sampling))
//! 5. a short user-interface hook
//!
//! Only the PWM edges run with interrupts held off, so their jitter stays
//! within one firing while the tail may be preempted.

use cadence_hal::{AdcSequencer, HardwareTimer, InterruptGate, OutputPin};

use crate::guard::CriticalRegion;
use crate::periodic::PeriodicTicker;
use crate::pwm::{PwmError, SoftPwm};
use crate::sampling::{AnalogSampler, SamplingError};
use crate::shared::{AnalogReadings, DutyTargets, MaintenanceFlag, OutputId};
use crate::timer::TimerChannel;

/// Short action run at the end of every multiplexer firing
///
/// Must complete well within one firing period.
pub trait FastHook {
    fn run(&mut self);
}

/// Hook that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHook;

impl FastHook for NoHook {
    fn run(&mut self) {}
}

impl<F: FnMut()> FastHook for F {
    fn run(&mut self) {
        self()
    }
}

/// Shared cells the multiplexer reads and writes
#[derive(Clone, Copy)]
pub struct MultiplexerCells<'a> {
    /// Duty targets, read at each PWM cycle start
    pub duties: &'a DutyTargets,
    /// Oversampled results, published here
    pub readings: &'a AnalogReadings,
    /// Maintenance tick
    pub maintenance: &'a MaintenanceFlag,
}

/// What happened during one firing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Firing {
    /// Maintenance flag was raised
    pub maintenance_raised: bool,
    /// Result slot and value published
    pub published: Option<(usize, u16)>,
}

/// Fixed-frequency heater PWM and sampling handler
pub struct PwmMultiplexer<'a, T: HardwareTimer, P: OutputPin> {
    timer: TimerChannel<T>,
    pwm: SoftPwm<P>,
    sampler: AnalogSampler,
    ticker: PeriodicTicker,
    cells: MultiplexerCells<'a>,
}

impl<'a, T: HardwareTimer, P: OutputPin> PwmMultiplexer<'a, T, P> {
    /// Create a multiplexer on an already configured timer channel
    pub fn new(
        timer: TimerChannel<T>,
        sampler: AnalogSampler,
        ticker: PeriodicTicker,
        cells: MultiplexerCells<'a>,
    ) -> Self {
        Self {
            timer,
            pwm: SoftPwm::new(),
            sampler,
            ticker,
            cells,
        }
    }

    /// Wire a PWM output
    pub fn add_output(&mut self, id: OutputId, pin: P, active_low: bool) -> Result<(), PwmError> {
        self.pwm.add(id, pin, active_low)
    }

    /// Sample an analog input, returning its result slot
    pub fn add_analog_input(&mut self, hw_channel: u8) -> Result<usize, SamplingError> {
        self.sampler.add_channel(hw_channel)
    }

    /// Trigger the first conversion sweep
    pub fn start<A: AdcSequencer>(&mut self, adc: &mut A) {
        self.sampler.start(adc);
    }

    /// Handle one timer firing
    pub fn fire<A, G, H>(&mut self, adc: &mut A, gate: &mut G, hook: &mut H) -> Firing
    where
        A: AdcSequencer,
        G: InterruptGate,
        H: FastHook,
    {
        self.timer.acknowledge();

        let mut region = CriticalRegion::enter(gate);
        self.pwm.step(self.cells.duties);
        region.end();

        let maintenance_raised = self.ticker.tick(self.cells.maintenance);
        let published = self.sampler.step(adc, self.cells.readings);
        hook.run();

        Firing {
            maintenance_raised,
            published,
        }
    }

    pub fn pwm(&self) -> &SoftPwm<P> {
        &self.pwm
    }

    pub fn sampler(&self) -> &AnalogSampler {
        &self.sampler
    }

    pub fn timer(&self) -> &TimerChannel<T> {
        &self.timer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{CountingGate, MockAdc, MockPin, MockTimer};
    use crate::sampling::SamplingConfig;
    use crate::timer::priorities;

    struct Cells {
        duties: DutyTargets,
        readings: AnalogReadings,
        maintenance: MaintenanceFlag,
    }

    impl Cells {
        fn new() -> Self {
            Self {
                duties: DutyTargets::new(),
                readings: AnalogReadings::new(),
                maintenance: MaintenanceFlag::new(),
            }
        }

        fn refs(&self) -> MultiplexerCells<'_> {
            MultiplexerCells {
                duties: &self.duties,
                readings: &self.readings,
                maintenance: &self.maintenance,
            }
        }
    }

    fn multiplexer(cells: &Cells) -> PwmMultiplexer<'_, MockTimer, MockPin> {
        let mut timer = TimerChannel::new(MockTimer::new(84_000_000));
        timer.configure(3906, priorities::PWM).unwrap();
        let ticker = PeriodicTicker::from_rates(3906, 10);

        let mut mux = PwmMultiplexer::new(
            timer,
            AnalogSampler::new(SamplingConfig::default()),
            ticker,
            cells.refs(),
        );
        mux.add_output(OutputId::ExtruderHeater(0), MockPin::default(), false)
            .unwrap();
        mux.add_output(OutputId::Bed, MockPin::default(), false)
            .unwrap();
        mux.add_analog_input(1).unwrap();
        mux
    }

    #[test]
    fn test_one_second_of_firings() {
        let cells = Cells::new();
        cells.duties.set(OutputId::ExtruderHeater(0), 64);
        cells.duties.set(OutputId::Bed, 255);

        let mut mux = multiplexer(&cells);
        let mut adc = MockAdc::constant(512);
        let mut gate = CountingGate::default();
        let mut hook_runs = 0u32;
        let mut hook = || hook_runs += 1;

        mux.start(&mut adc);
        let mut raised = 0;
        let mut published = 0;
        for _ in 0..3906 {
            let firing = mux.fire(&mut adc, &mut gate, &mut hook);
            raised += u32::from(firing.maintenance_raised);
            published += u32::from(firing.published.is_some());
        }

        assert_eq!(raised, 10);
        assert_eq!(published, 3906 / 32);
        assert_eq!(cells.readings.get(0), 2048);
        assert_eq!((gate.held, gate.allowed), (3906, 3906));
        assert!(!gate.masked);
        assert_eq!(mux.timer().timer().acks, 3906);
        drop(hook);
        assert_eq!(hook_runs, 3906);

        let bed = mux.pwm().channel(OutputId::Bed).unwrap();
        assert!(bed.is_on());
        assert_eq!(bed.pin().falling, 0);
    }

    #[test]
    fn test_pwm_edges_before_region_end() {
        use core::cell::Cell;
        use std::rc::Rc;

        struct SharedPin(Rc<Cell<bool>>);

        impl OutputPin for SharedPin {
            fn set_high(&mut self) {
                self.0.set(true);
            }
            fn set_low(&mut self) {
                self.0.set(false);
            }
            fn is_set_high(&self) -> bool {
                self.0.get()
            }
        }

        struct SnapshotGate {
            level: Rc<Cell<bool>>,
            seen: Option<bool>,
        }

        impl InterruptGate for SnapshotGate {
            fn hold(&mut self) {}

            fn allow(&mut self) {
                self.seen = Some(self.level.get());
            }
        }

        let cells = Cells::new();
        cells.duties.set(OutputId::PartFan, 3);

        let level = Rc::new(Cell::new(false));
        let mut timer = TimerChannel::new(MockTimer::new(84_000_000));
        timer.configure(3906, priorities::PWM).unwrap();
        let mut mux = PwmMultiplexer::new(
            timer,
            AnalogSampler::new(SamplingConfig::default()),
            PeriodicTicker::new(390),
            cells.refs(),
        );
        mux.add_output(OutputId::PartFan, SharedPin(level.clone()), false)
            .unwrap();

        let mut gate = SnapshotGate { level, seen: None };
        mux.fire(&mut MockAdc::constant(0), &mut gate, &mut NoHook);

        // Output already switched on when interrupts were re-admitted
        assert_eq!(gate.seen, Some(true));
    }

    #[test]
    fn test_adc_not_ready_does_not_block_pwm() {
        let cells = Cells::new();
        cells.duties.set(OutputId::Bed, 1);
        let mut mux = multiplexer(&cells);
        let mut adc = MockAdc::constant(0);
        adc.ready = false;

        let firing = mux.fire(&mut adc, &mut CountingGate::default(), &mut NoHook);
        assert_eq!(firing.published, None);
        assert!(mux.pwm().channel(OutputId::Bed).unwrap().is_on());
        assert_eq!(adc.reads, 0);
    }
}
