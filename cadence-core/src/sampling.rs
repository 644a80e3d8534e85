//! Analog oversampling
//!
//! One conversion result is collected per multiplexer firing. Each channel
//! accumulates `2^k` samples, then publishes the sum rescaled to the output
//! resolution and starts over. After every read the sampler moves on to the
//! next channel; once every channel has been read a new conversion sweep is
//! triggered.

use cadence_hal::adc::{enable_mask, AdcSequencer};
use heapless::Vec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::shared::{AnalogReadings, MAX_ANALOG_INPUTS};

/// Oversampling parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SamplingConfig {
    /// `k`: each result sums `2^k` conversions
    pub oversample_shift: u8,
    /// ADC resolution in bits
    pub input_bits: u8,
    /// Published resolution in bits
    pub output_bits: u8,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            oversample_shift: 5,
            input_bits: 10,
            output_bits: 12,
        }
    }
}

impl SamplingConfig {
    /// Samples per published result
    pub fn samples_per_result(&self) -> u32 {
        1 << self.oversample_shift
    }

    /// Rescale an accumulated sum to the output resolution
    pub fn normalize(&self, sum: u32) -> u16 {
        let summed_bits = u32::from(self.input_bits) + u32::from(self.oversample_shift);
        let output_bits = u32::from(self.output_bits);
        let value = if summed_bits < output_bits {
            sum << (output_bits - summed_bits)
        } else {
            sum >> (summed_bits - output_bits)
        };
        value as u16
    }
}

/// Errors when building the channel set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SamplingError {
    /// All result slots are in use
    Full,
    /// Hardware channel already sampled
    Duplicate(u8),
}

/// Accumulator for one analog input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalogChannel {
    hw_channel: u8,
    accumulator: u32,
    count: u16,
}

impl AnalogChannel {
    /// ADC channel this input is converted on
    pub fn hw_channel(&self) -> u8 {
        self.hw_channel
    }

    /// Sum of samples in the current window
    pub fn accumulator(&self) -> u32 {
        self.accumulator
    }

    /// Samples in the current window
    pub fn count(&self) -> u16 {
        self.count
    }
}

/// Round-robin oversampler over a fixed channel set
///
/// Result slot `i` in [`AnalogReadings`] belongs to the `i`-th channel
/// added.
pub struct AnalogSampler {
    channels: Vec<AnalogChannel, MAX_ANALOG_INPUTS>,
    position: usize,
    config: SamplingConfig,
}

impl AnalogSampler {
    pub const fn new(config: SamplingConfig) -> Self {
        Self {
            channels: Vec::new(),
            position: 0,
            config,
        }
    }

    /// Add a hardware channel, returning its result slot
    pub fn add_channel(&mut self, hw_channel: u8) -> Result<usize, SamplingError> {
        if self.channels.iter().any(|ch| ch.hw_channel == hw_channel) {
            return Err(SamplingError::Duplicate(hw_channel));
        }
        self.channels
            .push(AnalogChannel {
                hw_channel,
                accumulator: 0,
                count: 0,
            })
            .map_err(|_| SamplingError::Full)?;
        Ok(self.channels.len() - 1)
    }

    /// ADC channel-enable mask for the configured channels
    pub fn enable_mask(&self) -> u32 {
        enable_mask(self.channels.iter().map(|ch| ch.hw_channel))
    }

    /// Trigger the first conversion sweep
    pub fn start<A: AdcSequencer>(&mut self, adc: &mut A) {
        self.position = 0;
        if !self.channels.is_empty() {
            adc.start_conversion();
        }
    }

    /// Collect at most one conversion result
    ///
    /// Returns the result slot and value when a window completed. A channel
    /// whose conversion is not ready yet is retried on the next call.
    pub fn step<A: AdcSequencer>(
        &mut self,
        adc: &mut A,
        readings: &AnalogReadings,
    ) -> Option<(usize, u16)> {
        let position = self.position;
        let channel = self.channels.get_mut(position)?;
        if !adc.is_ready(channel.hw_channel) {
            return None;
        }

        channel.accumulator += u32::from(adc.read(channel.hw_channel));
        channel.count += 1;

        let mut published = None;
        if u32::from(channel.count) >= self.config.samples_per_result() {
            let value = self.config.normalize(channel.accumulator);
            readings.publish(position, value);
            channel.accumulator = 0;
            channel.count = 0;
            published = Some((position, value));
        }

        self.position += 1;
        if self.position >= self.channels.len() {
            self.position = 0;
            adc.start_conversion();
        }
        published
    }

    pub fn channels(&self) -> &[AnalogChannel] {
        &self.channels
    }

    /// Slot of the channel read next
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn config(&self) -> &SamplingConfig {
        &self.config
    }
}
