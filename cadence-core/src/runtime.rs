//! Start-up assembly
//!
//! [`TimingCore::setup`] validates a [`TimingConfig`], programs every timer
//! the board provides at its handler's frequency and priority, and builds
//! the handlers around them. A frequency a timer cannot produce is fatal:
//! setup fails and nothing is silently clamped.

use cadence_hal::{AdcSequencer, HardwareTimer, OutputPin};

use crate::config::{ConfigError, PinConfig, TimingConfig};
use crate::multiplexer::{MultiplexerCells, PwmMultiplexer};
use crate::periodic::PeriodicTicker;
use crate::pwm::PwmError;
use crate::sampling::{AnalogSampler, SamplingError};
use crate::shared::{AdvanceState, AnalogReadings, DutyTargets, MaintenanceFlag, ServoTargets};
use crate::stepper::StepperPacer;
use crate::timer::{priorities, reload_for, TimerChannel, TimerError, TimerSetup};
use crate::tone::ToneGenerator;

#[cfg(feature = "advance")]
use crate::advance::ExtruderAdvancePacer;
#[cfg(feature = "servo")]
use crate::servo::{ServoError, ServoPulseGenerator, HALF_SLOT_US};

/// Handler a timer channel is assigned to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerRole {
    Stepper,
    Pwm,
    Servo,
    Advance,
    Tone,
}

/// Errors during start-up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SetupError {
    /// Configuration failed validation
    Config(ConfigError),
    /// A timer cannot be programmed as requested
    Timer { role: TimerRole, error: TimerError },
    /// PWM channel set rejected an output
    Pwm(PwmError),
    /// Sampler rejected an analog input
    Sampling(SamplingError),
    /// Servo pin could not be wired
    #[cfg(feature = "servo")]
    Servo(ServoError),
}

impl From<ConfigError> for SetupError {
    fn from(e: ConfigError) -> Self {
        SetupError::Config(e)
    }
}

impl From<PwmError> for SetupError {
    fn from(e: PwmError) -> Self {
        SetupError::Pwm(e)
    }
}

impl From<SamplingError> for SetupError {
    fn from(e: SamplingError) -> Self {
        SetupError::Sampling(e)
    }
}

#[cfg(feature = "servo")]
impl From<ServoError> for SetupError {
    fn from(e: ServoError) -> Self {
        SetupError::Servo(e)
    }
}

/// Every cell shared between the handlers and the main program
pub struct SharedCells {
    pub duties: DutyTargets,
    pub readings: AnalogReadings,
    pub maintenance: MaintenanceFlag,
    pub servo: ServoTargets,
    pub advance: AdvanceState,
}

impl SharedCells {
    pub const fn new() -> Self {
        Self {
            duties: DutyTargets::new(),
            readings: AnalogReadings::new(),
            maintenance: MaintenanceFlag::new(),
            servo: ServoTargets::new(),
            advance: AdvanceState::new(),
        }
    }
}

impl Default for SharedCells {
    fn default() -> Self {
        Self::new()
    }
}

/// Timer channels the board hands to the timing core
///
/// The stepper and PWM handlers are mandatory; the others are only built
/// when their timer is present.
pub struct Timers<T> {
    pub stepper: T,
    pub pwm: T,
    pub servo: Option<T>,
    pub advance: Option<T>,
    pub tone: Option<T>,
}

/// All handlers, armed and ready to be called from their interrupt vectors
pub struct TimingCore<T: HardwareTimer, P: OutputPin> {
    pub stepper: StepperPacer<T>,
    pub multiplexer: PwmMultiplexer<'static, T, P>,
    #[cfg(feature = "servo")]
    pub servo: Option<ServoPulseGenerator<'static, T, P>>,
    #[cfg(feature = "advance")]
    pub advance: Option<ExtruderAdvancePacer<'static, T>>,
    pub tone: Option<ToneGenerator<T, P>>,
}

fn rejected(role: TimerRole, error: TimerError) -> SetupError {
    error!("{} timer: {}", role, error);
    SetupError::Timer { role, error }
}

fn armed<T: HardwareTimer>(
    role: TimerRole,
    channel: &TimerChannel<T>,
    result: Result<TimerSetup, TimerError>,
) -> Result<(), SetupError> {
    let setup = result.map_err(|error| rejected(role, error))?;
    info!(
        "{} timer: prescaler {}, reload {}, {} Hz",
        role,
        setup.prescaler,
        setup.reload,
        channel.realized_hz()
    );
    Ok(())
}

/// Reload firing at `hz` with the given divisor
fn fixed_reload<T: HardwareTimer>(
    role: TimerRole,
    timer: &T,
    divisor: u32,
    hz: u32,
) -> Result<u32, SetupError> {
    reload_for(timer.base_clock_hz(), divisor, timer.max_reload(), hz)
        .map_err(|error| rejected(role, error))
}

impl<T: HardwareTimer, P: OutputPin> TimingCore<T, P> {
    /// Validate `config`, program the timers and build the handlers
    ///
    /// `make_pin` turns a configured board pin into an output pin; it is
    /// called once per wired output.
    pub fn setup<F>(
        config: &TimingConfig,
        timers: Timers<T>,
        cells: &'static SharedCells,
        mut make_pin: F,
    ) -> Result<Self, SetupError>
    where
        F: FnMut(PinConfig) -> P,
    {
        if let Err(e) = config.validate() {
            error!("timing config rejected: {}", e);
            return Err(e.into());
        }
        if timers.stepper.base_clock_hz() != config.base_clock_hz {
            warn!(
                "timer clock {} Hz differs from configured {} Hz",
                timers.stepper.base_clock_hz(),
                config.base_clock_hz
            );
        }

        // Stepper: fixed divisor, starts at the idle rate
        let idle_reload = fixed_reload(
            TimerRole::Stepper,
            &timers.stepper,
            config.stepper.divisor,
            config.stepper.idle_hz,
        )?;
        let mut stepper_timer = TimerChannel::new(timers.stepper);
        let result = stepper_timer.configure_with_divisor(
            config.stepper.divisor,
            idle_reload,
            priorities::STEPPER,
        );
        armed(TimerRole::Stepper, &stepper_timer, result)?;
        #[allow(unused_mut)]
        let mut stepper = StepperPacer::new(stepper_timer, config.stepper)
            .map_err(|error| rejected(TimerRole::Stepper, error))?;

        // Heater PWM and sampling
        let mut pwm_timer = TimerChannel::new(timers.pwm);
        let result = pwm_timer.configure(config.pwm.frequency_hz, priorities::PWM);
        armed(TimerRole::Pwm, &pwm_timer, result)?;

        let ticker = PeriodicTicker::from_rates(config.pwm.frequency_hz, config.pwm.slow_tick_hz);
        let mut multiplexer = PwmMultiplexer::new(
            pwm_timer,
            AnalogSampler::new(config.sampling),
            ticker,
            MultiplexerCells {
                duties: &cells.duties,
                readings: &cells.readings,
                maintenance: &cells.maintenance,
            },
        );
        for output in &config.outputs {
            multiplexer.add_output(output.id, make_pin(output.pin), output.pin.inverted)?;
        }
        for &channel in &config.analog_inputs {
            multiplexer.add_analog_input(channel)?;
        }

        #[cfg(feature = "servo")]
        let servo = match timers.servo {
            Some(timer) => {
                let reload = fixed_reload(
                    TimerRole::Servo,
                    &timer,
                    config.servo.divisor,
                    1_000_000 / HALF_SLOT_US,
                )?;
                let mut channel = TimerChannel::new(timer);
                let result =
                    channel.configure_with_divisor(config.servo.divisor, reload, priorities::SERVO);
                armed(TimerRole::Servo, &channel, result)?;

                let mut servo = ServoPulseGenerator::new(channel, &cells.servo)
                    .map_err(|error| rejected(TimerRole::Servo, error))?;
                for wired in &config.servo_pins {
                    servo.set_pin(usize::from(wired.channel), make_pin(wired.pin))?;
                }
                Some(servo)
            }
            None => {
                if !config.servo_pins.is_empty() {
                    warn!("servo pins configured without a servo timer");
                }
                None
            }
        };
        #[cfg(not(feature = "servo"))]
        {
            if timers.servo.is_some() {
                warn!("servo timer given but servo support is not built in");
            }
        }

        #[cfg(feature = "advance")]
        let advance = match timers.advance {
            Some(timer) => {
                let mut channel = TimerChannel::new(timer);
                let result = channel.configure(config.advance.timer_hz, priorities::ADVANCE);
                armed(TimerRole::Advance, &channel, result)?;

                stepper = stepper.with_advance(&cells.advance);
                Some(ExtruderAdvancePacer::new(
                    channel,
                    &cells.advance,
                    &config.advance,
                ))
            }
            None => None,
        };
        #[cfg(not(feature = "advance"))]
        {
            if timers.advance.is_some() {
                warn!("advance timer given but advance support is not built in");
            }
        }

        let tone = match (timers.tone, config.tone) {
            (Some(timer), Some(tone)) => {
                let mut channel = TimerChannel::new(timer);
                let result =
                    channel.configure(tone.default_hz.saturating_mul(2), priorities::TONE);
                armed(TimerRole::Tone, &channel, result)?;
                Some(ToneGenerator::new(channel, make_pin(tone.pin)))
            }
            (None, Some(_)) => {
                warn!("beeper configured without a tone timer");
                None
            }
            _ => None,
        };

        info!(
            "timing core armed: {} PWM outputs, {} analog inputs",
            multiplexer.pwm().len(),
            multiplexer.sampler().channels().len()
        );

        Ok(Self {
            stepper,
            multiplexer,
            #[cfg(feature = "servo")]
            servo,
            #[cfg(feature = "advance")]
            advance,
            tone,
        })
    }

    /// Start the first analog conversion sweep
    pub fn start<A: AdcSequencer>(&mut self, adc: &mut A) {
        self.multiplexer.start(adc);
    }

    /// Channel-enable mask for the ADC
    pub fn adc_enable_mask(&self) -> u32 {
        self.multiplexer.sampler().enable_mask()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OutputConfig, ServoPinConfig, ToneConfig};
    use crate::mock::{MockAdc, MockPin, MockTimer, SAM3X_PRESCALERS};
    use crate::shared::OutputId;
    use heapless::Vec;

    fn board_config() -> TimingConfig {
        let mut config = TimingConfig::sam3x8e();
        config.outputs = Vec::from_slice(&[
            OutputConfig {
                id: OutputId::ExtruderHeater(0),
                pin: PinConfig::new(13),
            },
            OutputConfig {
                id: OutputId::Bed,
                pin: PinConfig::new(7),
            },
        ])
        .unwrap();
        config.analog_inputs = Vec::from_slice(&[7, 6]).unwrap();
        config.servo_pins = Vec::from_slice(&[ServoPinConfig {
            channel: 1,
            pin: PinConfig::new(5),
        }])
        .unwrap();
        config.tone = Some(ToneConfig {
            pin: PinConfig::new(41),
            default_hz: 2000,
        });
        config
    }

    fn all_timers() -> Timers<MockTimer> {
        Timers {
            stepper: MockTimer::new(84_000_000),
            pwm: MockTimer::new(84_000_000),
            servo: Some(MockTimer::new(84_000_000)),
            advance: Some(MockTimer::new(84_000_000)),
            tone: Some(MockTimer::new(84_000_000)),
        }
    }

    #[test]
    fn test_setup_arms_every_timer() {
        static CELLS: SharedCells = SharedCells::new();
        let mut pins = 0;
        let mut core = TimingCore::setup(&board_config(), all_timers(), &CELLS, |_| {
            pins += 1;
            MockPin::default()
        })
        .unwrap();

        let stepper = core.stepper.timer().timer();
        assert_eq!((stepper.prescaler, stepper.reload), (2, 172_131));
        assert_eq!(stepper.priority, Some(priorities::STEPPER));

        let pwm = core.multiplexer.timer().timer();
        assert_eq!((pwm.prescaler, pwm.reload), (2, 10_753));
        assert_eq!(pwm.priority, Some(priorities::PWM));

        #[cfg(feature = "servo")]
        {
            let servo = core.servo.as_ref().unwrap();
            assert_eq!(servo.timer().reload(), 105_000);
            assert!(servo.pin(1).is_some());
            assert!(servo.pin(0).is_none());
        }
        #[cfg(feature = "advance")]
        assert_eq!(core.advance.as_ref().unwrap().interval(), 700);

        let tone = core.tone.as_ref().unwrap();
        assert_eq!(tone.timer().realized_hz(), 4000);

        assert_eq!(core.multiplexer.pwm().len(), 2);
        assert_eq!(core.adc_enable_mask(), (1 << 7) | (1 << 6));

        let mut adc = MockAdc::constant(0);
        core.start(&mut adc);
        assert_eq!(adc.conversions_started, 1);

        // Two PWM outputs, one servo, one beeper
        let expected_pins = if cfg!(feature = "servo") { 4 } else { 3 };
        assert_eq!(pins, expected_pins);
    }

    #[test]
    fn test_optional_timers_absent() {
        static CELLS: SharedCells = SharedCells::new();
        let mut config = board_config();
        config.servo_pins.clear();
        config.tone = None;

        let timers = Timers {
            stepper: MockTimer::new(84_000_000),
            pwm: MockTimer::new(84_000_000),
            servo: None,
            advance: None,
            tone: None,
        };
        let core = TimingCore::setup(&config, timers, &CELLS, |_| MockPin::default()).unwrap();

        #[cfg(feature = "servo")]
        assert!(core.servo.is_none());
        #[cfg(feature = "advance")]
        assert!(core.advance.is_none());
        assert!(core.tone.is_none());
    }

    #[test]
    fn test_invalid_config_is_fatal() {
        static CELLS: SharedCells = SharedCells::new();
        let mut config = board_config();
        config.pwm.frequency_hz = 0;

        let result = TimingCore::setup(&config, all_timers(), &CELLS, |_| MockPin::default());
        assert!(matches!(
            result,
            Err(SetupError::Config(ConfigError::ZeroRate))
        ));
    }

    #[test]
    fn test_unrepresentable_frequency_is_fatal() {
        static CELLS: SharedCells = SharedCells::new();
        let mut config = board_config();
        config.pwm.frequency_hz = 1_000_000;
        config.pwm.slow_tick_hz = 10;

        // 16-bit PWM timer with a single coarse prescaler
        let mut timers = all_timers();
        timers.pwm = MockTimer::with_limits(84_000_000, &[128], 0xFFFF);

        let result = TimingCore::setup(&config, timers, &CELLS, |_| MockPin::default());
        assert!(matches!(
            result,
            Err(SetupError::Timer {
                role: TimerRole::Pwm,
                error: TimerError::Unrepresentable {
                    target_hz: 1_000_000
                },
            })
        ));
    }

    #[test]
    fn test_narrow_stepper_timer_is_fatal() {
        static CELLS: SharedCells = SharedCells::new();
        let mut timers = all_timers();
        timers.stepper = MockTimer::with_limits(84_000_000, SAM3X_PRESCALERS, 0xFFFF);

        let result = TimingCore::setup(&board_config(), timers, &CELLS, |_| MockPin::default());
        assert!(matches!(
            result,
            Err(SetupError::Timer {
                role: TimerRole::Stepper,
                error: TimerError::ReloadOutOfRange { reload: 172_131 },
            })
        ));
    }

    #[cfg(feature = "servo")]
    #[test]
    fn test_narrow_servo_timer_is_fatal() {
        static CELLS: SharedCells = SharedCells::new();

        // 16 bits hold neither the half slot nor the slot
        let mut timers = all_timers();
        timers.servo = Some(MockTimer::with_limits(84_000_000, SAM3X_PRESCALERS, 0xFFFF));
        let result = TimingCore::setup(&board_config(), timers, &CELLS, |_| MockPin::default());
        assert!(matches!(
            result,
            Err(SetupError::Timer {
                role: TimerRole::Servo,
                error: TimerError::ReloadOutOfRange { reload: 105_000 },
            })
        ));

        // Half a slot fits, the low phase after a short pulse would not
        let mut timers = all_timers();
        timers.servo = Some(MockTimer::with_limits(84_000_000, SAM3X_PRESCALERS, 150_000));
        let result = TimingCore::setup(&board_config(), timers, &CELLS, |_| MockPin::default());
        assert!(matches!(
            result,
            Err(SetupError::Timer {
                role: TimerRole::Servo,
                error: TimerError::ReloadOutOfRange { reload: 210_000 },
            })
        ));
    }

    #[cfg(feature = "advance")]
    #[test]
    fn test_stepper_folds_advance_when_idle() {
        use crate::mock::CountingGate;
        use crate::stepper::{ExtruderDriver, MotionEngine};

        struct NoMotion;

        impl MotionEngine for NoMotion {
            fn has_pending_move(&self) -> bool {
                false
            }

            fn step(&mut self) -> u32 {
                0
            }
        }

        struct Extruder;

        impl ExtruderDriver for Extruder {
            fn disable(&mut self) {}
        }

        static CELLS: SharedCells = SharedCells::new();
        let mut core =
            TimingCore::setup(&board_config(), all_timers(), &CELLS, |_| MockPin::default())
                .unwrap();

        struct OneStep(bool);

        impl MotionEngine for OneStep {
            fn has_pending_move(&self) -> bool {
                !self.0
            }

            fn step(&mut self) -> u32 {
                self.0 = true;
                100
            }
        }

        core.stepper
            .fire(&mut OneStep(false), &mut Extruder, &mut CountingGate::default());
        CELLS.advance.set_advance(3);
        core.stepper
            .fire(&mut NoMotion, &mut Extruder, &mut CountingGate::default());

        // Advance taken back as soon as motion stopped
        assert_eq!(CELLS.advance.advance_applied(), 0);
        assert_eq!(CELLS.advance.owed(), 0);
    }
}
