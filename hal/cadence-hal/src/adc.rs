//! ADC abstractions
//!
//! The timing core samples analog inputs from the PWM handler: one
//! conversion result is collected per firing, and a new scan of all enabled
//! channels is triggered once every channel has been read.

/// Multi-channel ADC with per-channel end-of-conversion flags
pub trait AdcSequencer {
    /// Check whether the latest conversion of `channel` is complete
    fn is_ready(&self, channel: u8) -> bool;

    /// Read the converted value of `channel`
    ///
    /// Reading clears the channel's end-of-conversion flag.
    fn read(&mut self, channel: u8) -> u16;

    /// Trigger a conversion of every enabled channel
    fn start_conversion(&mut self);
}

/// Channel-enable bitmask for a set of hardware channels
///
/// Channel numbers at or above 32 are ignored.
pub fn enable_mask(channels: impl IntoIterator<Item = u8>) -> u32 {
    channels
        .into_iter()
        .filter(|&ch| ch < 32)
        .fold(0, |mask, ch| mask | (1 << ch))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enable_mask() {
        assert_eq!(enable_mask([0u8, 7]), 0b1000_0001);
        assert_eq!(enable_mask([5u8, 5]), 0b10_0000);
        assert_eq!(enable_mask(core::iter::empty()), 0);
    }

    #[test]
    fn test_enable_mask_ignores_out_of_range() {
        assert_eq!(enable_mask([1u8, 32, 200]), 0b10);
    }
}
