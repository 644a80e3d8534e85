//! Timer/counter abstractions
//!
//! A [`HardwareTimer`] is one counter channel counting up from zero at
//! `base_clock / prescaler` and firing its interrupt when it matches the
//! reload (compare) register, then restarting from zero.

/// Interrupt priority in grouped (preempt, sub) form
///
/// Lower numbers win. Only the `group` field decides whether one handler may
/// preempt another; `sub` orders pending interrupts of the same group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InterruptPriority {
    /// Preemption priority
    pub group: u8,
    /// Sub-priority within the group
    pub sub: u8,
}

impl InterruptPriority {
    /// Create a priority
    pub const fn new(group: u8, sub: u8) -> Self {
        Self { group, sub }
    }

    /// Check whether a handler at this priority can preempt one at `other`
    pub fn preempts(&self, other: &InterruptPriority) -> bool {
        self.group < other.group
    }

    /// Encode into the controller's priority number
    ///
    /// `priority_grouping` is the split point programmed into the interrupt
    /// controller (0..=7) and `prio_bits` the number of implemented priority
    /// bits. Fields wider than their share of bits are truncated.
    pub fn encode(&self, priority_grouping: u8, prio_bits: u8) -> u8 {
        let grouping = u32::from(priority_grouping & 0x07);
        let prio_bits = u32::from(prio_bits);

        let preempt_bits = (7 - grouping).min(prio_bits);
        let sub_bits = if grouping + prio_bits < 7 {
            0
        } else {
            grouping + prio_bits - 7
        };

        let preempt = u32::from(self.group) & ((1 << preempt_bits) - 1);
        let sub = u32::from(self.sub) & ((1 << sub_bits) - 1);

        ((preempt << sub_bits) | sub) as u8
    }
}

/// Compare-match timer channel
///
/// The timing core programs prescaler and reload once at start-up for
/// fixed-frequency handlers, and rewrites the reload from inside the
/// handler for dynamically paced ones.
pub trait HardwareTimer {
    /// Counter input clock before prescaling, in Hz
    fn base_clock_hz(&self) -> u32;

    /// Prescalers (clock divisors) this channel can select, ascending
    fn prescalers(&self) -> &[u32];

    /// Largest reload value the counter accepts
    fn max_reload(&self) -> u32;

    /// Select the clock divisor
    fn set_prescaler(&mut self, prescaler: u32);

    /// Currently selected clock divisor
    fn prescaler(&self) -> u32;

    /// Write the reload (compare) register
    ///
    /// Takes effect for the next period.
    fn set_reload(&mut self, reload: u32);

    /// Read back the reload register
    fn reload(&self) -> u32;

    /// Start (or restart) counting
    fn start(&mut self);

    /// Enable the compare interrupt at the given priority
    fn enable_interrupt(&mut self, priority: InterruptPriority);

    /// Acknowledge the compare event
    ///
    /// Most counters latch their status until it is read; the handler does
    /// this first thing on every firing.
    fn acknowledge(&mut self);
}

/// Free-running counter used as a time base for short busy waits
pub trait FreeRunningCounter {
    /// Current counter value
    fn now(&self) -> u32;

    /// Counter width in bits (the value wraps after `2^bits - 1`)
    fn bits(&self) -> u32 {
        32
    }
}

/// Preemption bracket around a handler's timing-critical part
///
/// [`hold`](InterruptGate::hold) masks preemption and remembers whether it
/// was admitted before; [`allow`](InterruptGate::allow) restores that state
/// so other handlers are not held off by the caller's bookkeeping tail.
/// Calls are always paired, `hold` first.
pub trait InterruptGate {
    /// Mask preemption
    fn hold(&mut self);

    /// Restore preemption to its state before [`hold`](InterruptGate::hold)
    fn allow(&mut self);
}

/// Gate for contexts where interrupts are never masked
///
/// Used on the host and for handlers running at the lowest priority.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenGate;

impl InterruptGate for OpenGate {
    fn hold(&mut self) {}

    fn allow(&mut self) {}
}
