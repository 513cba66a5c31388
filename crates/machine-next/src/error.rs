//! Machine-level errors.

use motorola_68040::CpuError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MachineError {
    /// The CPU double faulted or could not be configured. On a double fault
    /// the machine has already been hard reset when this is returned.
    #[error(transparent)]
    Cpu(#[from] CpuError),
    #[error("ROM image is {len} bytes, the ROM window holds at most {max}")]
    RomTooLarge { len: usize, max: usize },
    #[error("RAM size {0:#X} is not a whole number of megabytes between 1 and 64 MiB")]
    InvalidRamSize(usize),
}
