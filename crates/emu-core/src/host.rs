//! Host time sources.
//!
//! Only two places in the machine look at host time: wall-clock scheduled
//! events and idle throttling while the CPU sits in STOP. Both go through
//! [`HostClock`] so tests can drive them deterministically.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Monotonic microsecond clock plus a sleep primitive.
pub trait HostClock {
    /// Microseconds since an arbitrary fixed origin. Never goes backwards.
    fn now_micros(&self) -> u64;

    /// Give the host CPU away for roughly `micros` microseconds.
    fn sleep_micros(&self, micros: u64);
}

impl<T: HostClock + ?Sized> HostClock for Rc<T> {
    fn now_micros(&self) -> u64 {
        (**self).now_micros()
    }

    fn sleep_micros(&self, micros: u64) {
        (**self).sleep_micros(micros);
    }
}

/// Host clock backed by [`Instant`] and [`std::thread::sleep`].
#[derive(Debug, Clone, Copy)]
pub struct StdHostClock {
    origin: Instant,
}

impl StdHostClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for StdHostClock {
    fn default() -> Self {
        Self::new()
    }
}

impl HostClock for StdHostClock {
    fn now_micros(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_micros()).unwrap_or(u64::MAX)
    }

    fn sleep_micros(&self, micros: u64) {
        std::thread::sleep(Duration::from_micros(micros));
    }
}

/// Deterministic clock for tests: time only moves when told to.
///
/// `sleep_micros` advances the clock instead of blocking, so STOP-state
/// throttling makes forward progress in wall-clock mode.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<u64>,
    slept: Cell<u64>,
}

impl ManualClock {
    #[must_use]
    pub const fn new(start_micros: u64) -> Self {
        Self {
            now: Cell::new(start_micros),
            slept: Cell::new(0),
        }
    }

    pub fn advance(&self, micros: u64) {
        self.now.set(self.now.get().saturating_add(micros));
    }

    /// Total microseconds requested through `sleep_micros`.
    #[must_use]
    pub fn slept_micros(&self) -> u64 {
        self.slept.get()
    }
}

impl HostClock for ManualClock {
    fn now_micros(&self) -> u64 {
        self.now.get()
    }

    fn sleep_micros(&self, micros: u64) {
        self.slept.set(self.slept.get().saturating_add(micros));
        self.advance(micros);
    }
}
