//! CPU clock configuration.

use crate::Ticks;

/// Clock configuration for a system.
///
/// The machine runs off the CPU clock; device timers that are specified in
/// microseconds are converted into cycles of this clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterClock {
    /// CPU frequency in Hz (e.g., `25_000_000` for a 25 MHz 68030).
    pub frequency_hz: u64,
}

impl MasterClock {
    #[must_use]
    pub const fn new(frequency_hz: u64) -> Self {
        Self { frequency_hz }
    }

    /// Cycles that elapse in `micros` microseconds (rounded down).
    #[must_use]
    pub const fn micros_to_ticks(&self, micros: u64) -> Ticks {
        let cycles = (micros as u128 * self.frequency_hz as u128) / 1_000_000;
        if cycles > u64::MAX as u128 {
            Ticks::new(u64::MAX)
        } else {
            Ticks::new(cycles as u64)
        }
    }

    /// Whole microseconds covered by `ticks` cycles.
    #[must_use]
    pub const fn ticks_to_micros(&self, ticks: Ticks) -> u64 {
        if self.frequency_hz == 0 {
            return 0;
        }
        ((ticks.get() as u128 * 1_000_000) / self.frequency_hz as u128) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::MasterClock;
    use crate::Ticks;

    #[test]
    fn converts_microseconds_at_25_mhz() {
        let clock = MasterClock::new(25_000_000);
        assert_eq!(clock.micros_to_ticks(1), Ticks::new(25));
        assert_eq!(clock.micros_to_ticks(1_000), Ticks::new(25_000));
        assert_eq!(clock.ticks_to_micros(Ticks::new(50)), 2);
    }

    #[test]
    fn zero_frequency_never_divides() {
        let clock = MasterClock::new(0);
        assert_eq!(clock.ticks_to_micros(Ticks::new(100)), 0);
        assert_eq!(clock.micros_to_ticks(100), Ticks::ZERO);
    }
}
