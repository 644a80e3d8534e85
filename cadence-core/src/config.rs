//! Timing configuration
//!
//! Everything the timing core needs to know about a board: clock rates,
//! handler frequencies and the channel sets each handler drives. A board
//! file in TOML deserializes into [`TimingConfig`] with the `serde`
//! feature; [`TimingConfig::sam3x8e`] carries the reference board's
//! timing constants with empty channel sets.

use heapless::Vec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::pwm::MAX_PWM_CHANNELS;
use crate::sampling::SamplingConfig;
use crate::shared::{OutputId, MAX_ANALOG_INPUTS, SERVO_CHANNELS};
use crate::stepper::StepperConfig;

/// Pin configuration with optional inversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PinConfig {
    /// Board pin number
    pub pin: u8,
    /// Pin is active-low (inverted)
    #[cfg_attr(feature = "serde", serde(default))]
    pub inverted: bool,
}

impl PinConfig {
    /// Create a new pin config
    pub const fn new(pin: u8) -> Self {
        Self {
            pin,
            inverted: false,
        }
    }

    /// Create an inverted (active-low) pin
    pub const fn inverted(pin: u8) -> Self {
        Self {
            pin,
            inverted: true,
        }
    }
}

/// A wired software PWM output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OutputConfig {
    pub id: OutputId,
    pub pin: PinConfig,
}

/// A wired servo channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ServoPinConfig {
    /// Servo channel (0..4)
    pub channel: u8,
    pub pin: PinConfig,
}

/// Heater PWM and sampling handler rates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PwmConfig {
    /// Handler firing rate, in Hz
    pub frequency_hz: u32,
    /// Maintenance tick rate, in Hz
    pub slow_tick_hz: u32,
}

impl Default for PwmConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 3906,
            slow_tick_hz: 10,
        }
    }
}

/// Servo timer setup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ServoConfig {
    /// Fixed timer divisor
    pub divisor: u32,
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self { divisor: 2 }
    }
}

/// Extruder advance pacer setup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AdvanceConfig {
    /// Firing rate, in Hz
    pub timer_hz: u32,
    /// Extra ticks after a direction change
    pub settle_ticks: u32,
    /// Step pulse high time, in µs
    pub pulse_high_us: u32,
}

impl Default for AdvanceConfig {
    fn default() -> Self {
        Self {
            timer_hz: 60_000,
            settle_ticks: 40,
            pulse_high_us: 1,
        }
    }
}

/// Beeper output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ToneConfig {
    pub pin: PinConfig,
    /// Tone programmed at start-up (the beeper stays silent), in Hz
    pub default_hz: u32,
}

/// Complete timing core configuration
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TimingConfig {
    /// Timer input clock, in Hz
    pub base_clock_hz: u32,
    /// Free-running counter rate used for busy waits, in Hz
    pub delay_counter_hz: u32,
    pub stepper: StepperConfig,
    pub pwm: PwmConfig,
    pub sampling: SamplingConfig,
    pub servo: ServoConfig,
    pub advance: AdvanceConfig,
    /// Wired PWM outputs; unwired outputs are simply absent
    pub outputs: Vec<OutputConfig, MAX_PWM_CHANNELS>,
    /// ADC channels sampled, in result slot order
    pub analog_inputs: Vec<u8, MAX_ANALOG_INPUTS>,
    pub servo_pins: Vec<ServoPinConfig, SERVO_CHANNELS>,
    pub tone: Option<ToneConfig>,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self::sam3x8e()
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// A clock or handler rate is zero
    ZeroRate,
    /// Maintenance tick faster than the PWM handler
    SlowTickTooFast,
    /// Oversampling parameters out of range
    InvalidSampling,
    /// Delay counter too slow to resolve 10 µs
    DelayCounterTooSlow,
    /// Output listed twice
    DuplicateOutput(OutputId),
    /// Output index beyond the supported extruders
    UnknownOutput(OutputId),
    /// ADC channel listed twice
    DuplicateAnalogInput(u8),
    /// ADC channel beyond the sequencer's 32 channels
    AnalogInputOutOfRange(u8),
    /// Servo channel listed twice or out of range
    InvalidServoChannel(u8),
    /// Board pin used by more than one output
    PinConflict(u8),
    /// Tone frequency zero
    InvalidTone,
}

impl TimingConfig {
    /// Timing constants of the reference SAM3X8E board
    pub fn sam3x8e() -> Self {
        Self {
            base_clock_hz: 84_000_000,
            delay_counter_hz: 42_000_000,
            stepper: StepperConfig::default(),
            pwm: PwmConfig::default(),
            sampling: SamplingConfig::default(),
            servo: ServoConfig::default(),
            advance: AdvanceConfig::default(),
            outputs: Vec::new(),
            analog_inputs: Vec::new(),
            servo_pins: Vec::new(),
            tone: None,
        }
    }

    /// Check the configuration for consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        let rates = [
            self.base_clock_hz,
            self.delay_counter_hz,
            self.stepper.divisor,
            self.stepper.idle_hz,
            self.pwm.frequency_hz,
            self.pwm.slow_tick_hz,
            self.servo.divisor,
            self.advance.timer_hz,
        ];
        if rates.contains(&0) {
            return Err(ConfigError::ZeroRate);
        }
        if self.pwm.slow_tick_hz > self.pwm.frequency_hz {
            return Err(ConfigError::SlowTickTooFast);
        }

        let sampling = &self.sampling;
        let bits_ok = |bits: u8| (1..=16).contains(&bits);
        if !bits_ok(sampling.input_bits)
            || !bits_ok(sampling.output_bits)
            || sampling.oversample_shift > 15
            || u32::from(sampling.input_bits) + u32::from(sampling.oversample_shift) > 32
        {
            return Err(ConfigError::InvalidSampling);
        }

        if self.delay_counter_hz < 100_000 {
            return Err(ConfigError::DelayCounterTooSlow);
        }

        for (i, output) in self.outputs.iter().enumerate() {
            if !output.id.is_addressable() {
                return Err(ConfigError::UnknownOutput(output.id));
            }
            if self.outputs[..i].iter().any(|o| o.id == output.id) {
                return Err(ConfigError::DuplicateOutput(output.id));
            }
        }

        for (i, &channel) in self.analog_inputs.iter().enumerate() {
            if channel >= 32 {
                return Err(ConfigError::AnalogInputOutOfRange(channel));
            }
            if self.analog_inputs[..i].contains(&channel) {
                return Err(ConfigError::DuplicateAnalogInput(channel));
            }
        }

        for (i, servo) in self.servo_pins.iter().enumerate() {
            let duplicate = self.servo_pins[..i]
                .iter()
                .any(|s| s.channel == servo.channel);
            if usize::from(servo.channel) >= SERVO_CHANNELS || duplicate {
                return Err(ConfigError::InvalidServoChannel(servo.channel));
            }
        }

        if let Some(tone) = &self.tone {
            if tone.default_hz == 0 {
                return Err(ConfigError::InvalidTone);
            }
        }

        self.check_pin_conflicts()
    }

    fn check_pin_conflicts(&self) -> Result<(), ConfigError> {
        let pins = self
            .outputs
            .iter()
            .map(|o| o.pin.pin)
            .chain(self.servo_pins.iter().map(|s| s.pin.pin))
            .chain(self.tone.iter().map(|t| t.pin.pin));

        let mut seen = [false; 256];
        for pin in pins {
            let slot = &mut seen[usize::from(pin)];
            if *slot {
                return Err(ConfigError::PinConflict(pin));
            }
            *slot = true;
        }
        Ok(())
    }

    /// Firings per maintenance tick
    pub fn slow_tick_threshold(&self) -> u32 {
        self.pwm.frequency_hz / self.pwm.slow_tick_hz.max(1)
    }
}
