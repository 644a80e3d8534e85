//! Microsecond busy-wait
//!
//! Waits are measured on a free-running counter that wraps after `2^bits`
//! ticks. A wait computes its goal once and compares against the live
//! counter, so it keeps no state between calls and may be used from any
//! handler, including one that preempted another wait.

use cadence_hal::FreeRunningCounter;
use embedded_hal::delay::DelayNs;

/// Longest single wait issued by the [`DelayNs`] implementation, in µs
const DELAY_CHUNK_US: u32 = 1000;

/// Busy-wait clock on a free-running counter
pub struct MicrosecondClock<C: FreeRunningCounter> {
    counter: C,
    ticks_per_10us: u32,
}

impl<C: FreeRunningCounter> MicrosecondClock<C> {
    /// Create a clock on a counter running at `counter_hz`
    ///
    /// Counters slower than 100 kHz cannot resolve 10 µs and make every
    /// wait return immediately.
    pub fn new(counter: C, counter_hz: u32) -> Self {
        Self {
            counter,
            ticks_per_10us: counter_hz / 100_000,
        }
    }

    fn mask(&self) -> u32 {
        match self.counter.bits() {
            bits if bits >= 32 => u32::MAX,
            bits => (1 << bits) - 1,
        }
    }

    /// Counter ticks for `us` microseconds
    ///
    /// Limited to one counter period less one tick.
    pub fn scaled(&self, us: u32) -> u32 {
        let ticks = u64::from(self.ticks_per_10us) * u64::from(us) / 10;
        ticks.min(u64::from(self.mask())) as u32
    }

    /// Goal for a wait of `us` starting at `start`
    ///
    /// The second value is `true` when the goal lies beyond the counter's
    /// next wrap.
    pub fn goal(&self, start: u32, us: u32) -> (u32, bool) {
        let mask = u64::from(self.mask());
        let end = u64::from(start) + u64::from(self.scaled(us));
        ((end & mask) as u32, end > mask)
    }

    /// Spin for at least `us` microseconds
    pub fn wait_us(&self, us: u32) {
        let start = self.counter.now();
        let (goal, wrapped) = self.goal(start, us);

        if wrapped {
            while self.counter.now() >= start {
                core::hint::spin_loop();
            }
            while self.counter.now() < goal {
                core::hint::spin_loop();
            }
            return;
        }

        // A counter seen below `start` has wrapped past a goal near the top
        // of its range between two reads.
        loop {
            let now = self.counter.now();
            if now >= goal || now < start {
                break;
            }
            core::hint::spin_loop();
        }
    }

    pub fn counter(&self) -> &C {
        &self.counter
    }
}

impl<C: FreeRunningCounter> DelayNs for MicrosecondClock<C> {
    fn delay_ns(&mut self, ns: u32) {
        self.delay_us(ns.div_ceil(1000));
    }

    fn delay_us(&mut self, mut us: u32) {
        while us > DELAY_CHUNK_US {
            self.wait_us(DELAY_CHUNK_US);
            us -= DELAY_CHUNK_US;
        }
        self.wait_us(us);
    }
}
