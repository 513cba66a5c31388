//! NeXT model configuration and presets.
//!
//! Every field has a default from the model preset. Individual fields can be
//! overridden for non-standard setups (e.g. a 68040 board in a cube).

use motorola_68040::{CpuModel, FpuModel};
use serde::{Deserialize, Serialize};

const MIB: usize = 1024 * 1024;

/// NeXT model presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NextModel {
    /// Original NeXT Computer (68030 @ 25 MHz, 68882).
    Cube030,
    /// NeXTstation (68040 @ 25 MHz).
    Station040,
    /// NeXTstation Turbo (68040 @ 33 MHz).
    Turbo040,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextConfig {
    pub model: NextModel,
    pub cpu_model: CpuModel,
    pub fpu_model: FpuModel,
    /// CPU clock in Hz. Microsecond timers are converted with this.
    pub cpu_hz: u64,
    /// Main memory in bytes (whole MiB, at most 64 MiB).
    pub ram_bytes: usize,
    /// Schedule microsecond events against the host clock instead of
    /// emulated cycles.
    pub realtime: bool,
    /// Sleep on the host while the CPU is stopped and only wall-clock
    /// events are pending.
    pub idle_throttle: bool,
    pub idle_sleep_us: u64,
}

impl NextConfig {
    #[must_use]
    pub fn for_model(model: NextModel) -> Self {
        let (cpu_model, fpu_model, cpu_hz, ram_bytes) = match model {
            NextModel::Cube030 => (CpuModel::M68030, FpuModel::M68882, 25_000_000, 16 * MIB),
            NextModel::Station040 => (CpuModel::M68040, FpuModel::Internal, 25_000_000, 16 * MIB),
            NextModel::Turbo040 => (CpuModel::M68040, FpuModel::Internal, 33_000_000, 32 * MIB),
        };
        Self {
            model,
            cpu_model,
            fpu_model,
            cpu_hz,
            ram_bytes,
            realtime: false,
            idle_throttle: true,
            idle_sleep_us: 1_000,
        }
    }
}

impl Default for NextConfig {
    fn default() -> Self {
        Self::for_model(NextModel::Cube030)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_preset_is_a_030_with_882() {
        let config = NextConfig::default();
        assert_eq!(config.model, NextModel::Cube030);
        assert_eq!(config.cpu_model, CpuModel::M68030);
        assert_eq!(config.fpu_model, FpuModel::M68882);
        assert_eq!(config.cpu_hz, 25_000_000);
    }

    #[test]
    fn turbo_preset_runs_faster() {
        let config = NextConfig::for_model(NextModel::Turbo040);
        assert_eq!(config.cpu_model, CpuModel::M68040);
        assert_eq!(config.fpu_model, FpuModel::Internal);
        assert_eq!(config.cpu_hz, 33_000_000);
        assert_eq!(config.ram_bytes, 32 * MIB);
    }
}
