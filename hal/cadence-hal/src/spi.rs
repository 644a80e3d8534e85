//! Synchronous serial bus primitives
//!
//! Byte-level master operations used by SD card and display drivers above
//! the timing core.

/// Block size used by [`SerialBus::send_block`]
pub const BLOCK_LEN: usize = 512;

/// Serial clock dividers for rate indices 0..=6
///
/// Indices mirror the classic 8-bit divider ladder (2, 4, 8 ... 128); the
/// slowest entries saturate at the largest divider the peripheral accepts.
pub const RATE_DIVIDERS: [u8; 7] = [10, 21, 42, 84, 168, 255, 255];

/// Serial clock divider for a rate index
///
/// Indices above 4 are rejected by the peripheral's minimum clock and fall
/// back to index 1.
pub fn divider_for_rate(rate_index: u8) -> u8 {
    let index = if rate_index > 4 { 1 } else { rate_index };
    RATE_DIVIDERS[usize::from(index)]
}

/// Synchronous serial bus master, byte-level
///
/// Every transfer is full duplex: a byte is clocked out while one is
/// clocked in. The block helpers are built on the single-byte primitives.
pub trait SerialBus {
    /// Configure clock rate (see [`divider_for_rate`])
    fn init(&mut self, rate_index: u8);

    /// Send one byte and discard the byte received
    fn send(&mut self, byte: u8);

    /// Clock in one byte, sending `0xFF`
    fn receive(&mut self) -> u8;

    /// Send a buffer
    fn send_all(&mut self, buf: &[u8]) {
        for &byte in buf {
            self.send(byte);
        }
    }

    /// Fill a buffer with received bytes
    fn read_block(&mut self, buf: &mut [u8]) {
        for byte in buf.iter_mut() {
            *byte = self.receive();
        }
    }

    /// Send a start token followed by one data block
    fn send_block(&mut self, token: u8, block: &[u8; BLOCK_LEN]) {
        self.send(token);
        self.send_all(block);
    }
}
