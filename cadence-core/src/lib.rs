//! Board-agnostic interrupt-driven timing core
//!
//! This crate contains the handlers that multiplex the time-critical output
//! duties of a motion controller onto a few hardware timer channels:
//!
//! - Timer configuration (prescaler search, dynamic re-arm, priorities)
//! - Stepper pacing driven by the motion engine's step intervals
//! - Software PWM for heaters and fans, analog oversampling and the slow
//!   maintenance tick, all from one fixed-frequency handler
//! - Servo pulse framing for up to four channels on one timer
//! - Extruder advance stepping with direction hysteresis
//! - Reentrant microsecond busy-wait on a free-running counter
//!
//! Handlers never block and never take locks. State shared with the main
//! program lives in the atomics of [`shared`], each written from exactly one
//! context.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

#[macro_use]
mod fmt;

#[cfg(feature = "advance")]
pub mod advance;
pub mod clock;
pub mod config;
pub mod guard;
pub mod multiplexer;
pub mod periodic;
pub mod pwm;
pub mod runtime;
pub mod sampling;
#[cfg(feature = "servo")]
pub mod servo;
pub mod shared;
pub mod stepper;
pub mod timer;
pub mod tone;

#[cfg(test)]
mod mock;
