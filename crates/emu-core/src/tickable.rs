//! Trait for components stepped alongside the CPU.

use crate::Ticks;

/// A component that runs in lock-step batches with the CPU.
///
/// After every instruction the run loop hands each attached component the
/// number of CPU cycles that instruction consumed. Components are free to run
/// ahead internally as long as they stay within that budget on average.
pub trait Tickable {
    /// Advance by `cycles` CPU cycles.
    fn step(&mut self, cycles: Ticks);

    /// Short name used in diagnostics.
    fn name(&self) -> &'static str {
        "coprocessor"
    }
}
