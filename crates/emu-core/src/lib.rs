//! Shared time and observability primitives.
//!
//! The CPU counts time in its own clock cycles. Everything else (device
//! timers, wall-clock scheduling, coprocessor stepping) is expressed in, or
//! converted to, those cycles through [`MasterClock`].

mod clock;
mod host;
mod observable;
mod tickable;
mod ticks;

pub use clock::MasterClock;
pub use host::{HostClock, ManualClock, StdHostClock};
pub use observable::{Observable, Value};
pub use tickable::Tickable;
pub use ticks::Ticks;
