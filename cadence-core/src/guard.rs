//! Reentrancy guard and critical regions
//!
//! A handler that re-enables interrupts before it returns can be entered
//! again by its own next firing. [`ReentrancyGuard`] owns the handler's
//! state and hands out exclusive access only while its flag is held, so a
//! nested firing finds the flag set and returns without touching anything.

#![allow(unsafe_code)]

use core::cell::UnsafeCell;

use cadence_hal::InterruptGate;
use portable_atomic::{AtomicBool, Ordering};

/// Single-bit reentrancy guard owning handler state
pub struct ReentrancyGuard<T> {
    held: AtomicBool,
    state: UnsafeCell<T>,
}

// SAFETY: access to `state` is only granted while `held` is set, and `held`
// is claimed with an atomic swap, so at most one context holds `&mut T`.
unsafe impl<T: Send> Sync for ReentrancyGuard<T> {}

impl<T> ReentrancyGuard<T> {
    /// Create a released guard around `state`
    pub const fn new(state: T) -> Self {
        Self {
            held: AtomicBool::new(false),
            state: UnsafeCell::new(state),
        }
    }

    /// Run `f` with exclusive access to the state
    ///
    /// Returns `None` without calling `f` if the guard is already held.
    /// The flag is released when `f` returns, including on unwind.
    pub fn try_enter<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        if self.held.swap(true, Ordering::Acquire) {
            return None;
        }
        let _release = Release(&self.held);

        // SAFETY: the swap above observed `false`, so no other reference to
        // the state exists until `_release` drops.
        let state = unsafe { &mut *self.state.get() };
        Some(f(state))
    }

    /// Check whether a context is currently inside the guard
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Relaxed)
    }

    /// Exclusive access through a unique borrow of the guard
    pub fn get_mut(&mut self) -> &mut T {
        self.state.get_mut()
    }

    /// Consume the guard, returning the state
    pub fn into_inner(self) -> T {
        self.state.into_inner()
    }
}

struct Release<'a>(&'a AtomicBool);

impl Drop for Release<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Masked part of a handler
///
/// Preemption is held off from [`enter`] until [`end`] is called or the
/// region is dropped, whichever comes first. Ending restores the state the
/// gate saw on entry; ending a region twice is a no-op.
///
/// [`enter`]: CriticalRegion::enter
/// [`end`]: CriticalRegion::end
pub struct CriticalRegion<'a, G: InterruptGate> {
    gate: &'a mut G,
    open: bool,
}

impl<'a, G: InterruptGate> CriticalRegion<'a, G> {
    /// Mask preemption and start a region
    pub fn enter(gate: &'a mut G) -> Self {
        gate.hold();
        Self { gate, open: true }
    }

    /// Re-admit pending interrupts
    pub fn end(&mut self) {
        if self.open {
            self.open = false;
            self.gate.allow();
        }
    }

    /// Whether interrupts are still held off
    pub fn is_open(&self) -> bool {
        self.open
    }
}

impl<G: InterruptGate> Drop for CriticalRegion<'_, G> {
    fn drop(&mut self) {
        self.end();
    }
}
