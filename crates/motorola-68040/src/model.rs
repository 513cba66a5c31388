//! CPU and FPU model definitions.
//!
//! The dispatch table, the MMU register front end and the exception frame
//! layouts are all keyed off the configured model, so the model is the one
//! place where "what does this chip have" is answered.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Selected Motorola CPU model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CpuModel {
    /// Motorola MC68030 (on-chip PMMU, external FPU).
    M68030,
    /// Motorola MC68040 (on-chip MMU, on-chip FPU unless an LC/EC part).
    M68040,
}

/// Floating-point unit attached to the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FpuModel {
    /// No FPU; F-line FPU opcodes take the line 1111 emulator exception.
    None,
    /// MC68881 coprocessor.
    M68881,
    /// MC68882 coprocessor.
    M68882,
    /// The 68040's on-chip FPU.
    Internal,
}

/// Capability flags for a specific CPU model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuCapabilities {
    /// Instruction-set level used to filter the descriptor table
    /// (0 = 68000 ... 4 = 68040).
    pub level: u8,
    /// Separate master stack pointer (M bit in SR).
    pub master_stack: bool,
    /// MMU registers are reached through MOVEC (68040) rather than PMOVE.
    pub movec_mmu: bool,
    /// Cache Address Register (`CAAR`) is present.
    pub caar: bool,
    /// `MOVE16` and `CINV`/`CPUSH` exist.
    pub move16: bool,
    /// Clocks charged per operand bus access.
    pub bus_cycles: u8,
}

impl CpuModel {
    /// Static capability set for this CPU model.
    #[must_use]
    pub const fn capabilities(self) -> CpuCapabilities {
        match self {
            Self::M68030 => CpuCapabilities {
                level: 3,
                master_stack: true,
                movec_mmu: false,
                caar: true,
                move16: false,
                bus_cycles: 4,
            },
            Self::M68040 => CpuCapabilities {
                level: 4,
                master_stack: true,
                movec_mmu: true,
                caar: false,
                move16: true,
                bus_cycles: 2,
            },
        }
    }

    /// Instruction-set level (3 for the 68030, 4 for the 68040).
    #[must_use]
    pub const fn level(self) -> u8 {
        self.capabilities().level
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::M68030 => "68030",
            Self::M68040 => "68040",
        }
    }
}

impl FpuModel {
    #[must_use]
    pub const fn is_present(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Check that a CPU/FPU pairing exists in hardware.
///
/// The 68040's FPU is on-chip, so it cannot be paired with an external
/// 68881/68882, and the 68030 has no internal FPU.
pub fn validate(cpu: CpuModel, fpu: FpuModel) -> Result<(), ConfigError> {
    match (cpu, fpu) {
        (CpuModel::M68030, FpuModel::None | FpuModel::M68881 | FpuModel::M68882)
        | (CpuModel::M68040, FpuModel::None | FpuModel::Internal) => Ok(()),
        _ => Err(ConfigError::UnsupportedModel { cpu, fpu }),
    }
}

#[cfg(test)]
mod tests {
    use super::{validate, CpuModel, FpuModel};

    #[test]
    fn levels_match_the_instruction_set_generation() {
        assert_eq!(CpuModel::M68030.level(), 3);
        assert_eq!(CpuModel::M68040.level(), 4);
        assert!(CpuModel::M68040.capabilities().movec_mmu);
        assert!(!CpuModel::M68030.capabilities().movec_mmu);
    }

    #[test]
    fn rejects_pairings_that_do_not_exist() {
        assert!(validate(CpuModel::M68030, FpuModel::M68882).is_ok());
        assert!(validate(CpuModel::M68040, FpuModel::Internal).is_ok());
        assert!(validate(CpuModel::M68040, FpuModel::None).is_ok());
        assert!(validate(CpuModel::M68030, FpuModel::Internal).is_err());
        assert!(validate(CpuModel::M68040, FpuModel::M68881).is_err());
    }
}
