//! Two-wire bus primitives
//!
//! Byte-level master operations. Sequencing these into device transactions
//! (EEPROM pages, display controllers) happens above the timing core.

/// Direction bit carried in the low bit of an address byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Master writes to the device
    Write,
    /// Master reads from the device
    Read,
}

impl Direction {
    /// Split an 8-bit address byte into 7-bit address and direction
    pub fn split(address_and_direction: u8) -> (u8, Direction) {
        let dir = if address_and_direction & 1 == 1 {
            Direction::Read
        } else {
            Direction::Write
        };
        (address_and_direction >> 1, dir)
    }
}

/// Device did not acknowledge a byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Nack;

/// Two-wire bus master, byte-level
pub trait TwoWireBus {
    /// Address a device; returns `false` while a previous transfer is still
    /// completing
    fn start(&mut self, address_and_direction: u8) -> bool;

    /// Address a device after waiting for the bus to be idle
    fn start_wait(&mut self, address_and_direction: u8);

    /// Address a device with an internal (register/memory) address
    fn start_addr(&mut self, address_and_direction: u8, pos: u16);

    /// Emit the start condition
    fn start_bit(&mut self);

    /// Send one byte and terminate the transfer
    fn write(&mut self, data: u8) -> Result<(), Nack>;

    /// Send one byte, leaving the transfer open
    fn writing(&mut self, data: u8);

    /// Read one byte and request more
    fn read_ack(&mut self) -> u8;

    /// Read the final byte and stop
    fn read_nak(&mut self) -> u8;

    /// Release the bus
    fn stop(&mut self);
}

/// Two-wire configuration
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct I2cConfig {
    /// Clock frequency in Hz
    pub frequency: u32,
}

impl Default for I2cConfig {
    fn default() -> Self {
        Self::STANDARD
    }
}

impl I2cConfig {
    /// Standard mode (100 kHz)
    pub const STANDARD: Self = Self { frequency: 100_000 };

    /// Fast mode (400 kHz)
    pub const FAST: Self = Self { frequency: 400_000 };
}

/// Clock waveform divider settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockDividers {
    /// Power-of-two exponent applied to both half periods
    pub ckdiv: u8,
    /// High and low half-period divider
    pub cldiv: u8,
}

/// Largest `ckdiv` exponent the waveform generator supports
pub const MAX_CKDIV: u8 = 7;

/// Compute waveform dividers for the requested bus clock
///
/// Each half period lasts `cldiv * 2^ckdiv + 4` master clock cycles. The
/// smallest `ckdiv` that brings `cldiv` into 8 bits is chosen. Returns
/// `None` if the bus clock is too fast for the master clock or too slow for
/// the largest exponent.
pub fn clock_dividers(master_clock_hz: u32, bus_hz: u32) -> Option<ClockDividers> {
    if bus_hz == 0 {
        return None;
    }

    let half_period = master_clock_hz / bus_hz.saturating_mul(2);
    let cycles = half_period.checked_sub(4)?;
    if cycles == 0 {
        return None;
    }

    (0..=MAX_CKDIV).find_map(|ckdiv| {
        let cldiv = cycles >> ckdiv;
        (cldiv <= 255).then_some(ClockDividers {
            ckdiv,
            cldiv: cldiv as u8,
        })
    })
}
