//! Cadence Hardware Abstraction Layer
//!
//! This crate defines the hardware abstraction traits the timing core is
//! written against. Chip-specific code implements them for its timer/counter
//! channels, GPIO, ADC and bus peripherals, so the interrupt handlers in
//! `cadence-core` stay board-agnostic and can be exercised on the host.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Interrupt vectors (board firmware)     │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  cadence-core (handlers, shared cells)  │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  cadence-hal (this crate - traits)      │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Traits
//!
//! - [`gpio::OutputPin`] - Digital outputs (heaters, fans, servos, step pins)
//! - [`timer::HardwareTimer`] - Compare-match timer/counter channels
//! - [`timer::FreeRunningCounter`] - Counter used for busy-wait delays
//! - [`timer::InterruptGate`] - Masks preemption for a handler's critical part
//! - [`adc::AdcSequencer`] - Multi-channel ADC with per-channel ready flags
//! - [`i2c::TwoWireBus`], [`spi::SerialBus`] - Byte-level bus primitives

#![no_std]
#![deny(unsafe_code)]

pub mod adc;
pub mod gpio;
pub mod i2c;
pub mod spi;
pub mod timer;

#[cfg(feature = "cortex-m")]
pub mod cortex_m_gate;

// Re-export key traits at crate root for convenience
pub use adc::AdcSequencer;
pub use gpio::OutputPin;
pub use i2c::TwoWireBus;
pub use spi::SerialBus;
pub use timer::{FreeRunningCounter, HardwareTimer, InterruptGate, InterruptPriority};
