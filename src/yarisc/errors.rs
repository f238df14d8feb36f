use std::fmt;

use thiserror::Error;

use crate::yarisc::types::{Address, Word};

pub type Result<T> = std::result::Result<T, Error>;

/// Kind of memory access that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Read => write!(f, "read"),
            Access::Write => write!(f, "write"),
        }
    }
}

/// Clause of the strict reserved-bits audit that rejected an instruction.
///
/// The numeric code is part of the diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReservedBitsReason {
    NonZeroNoOperands = 0,
    NonZeroOneOperand = 1,
    NonZeroRegTwoOperands = 2,
    NonZeroShortTwoOperands = 3,
    NonZeroUnassignedThreeOperands = 4,
    NonZeroUnassignedCondOperands = 5,
    NonZeroJumpAddrOperands = 6,
    AssignmentTwoOperands = 7,
}

impl ReservedBitsReason {
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ReservedBitsReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors surfaced by the emulator.
#[derive(Error, Debug)]
pub enum Error {
    /// Opcode does not name a supported instruction at the active feature level.
    #[error("Invalid instruction 0x{instr:04x} at memory location 0x{address:04x}")]
    InvalidOpcode { instr: Word, address: Address },

    /// Strict-mode audit rejected an instruction with non-zero reserved bits.
    #[error("Invalid non-zero bits in instruction 0x{instr:04x} (reason: {reason})")]
    ReservedBits {
        instr: Word,
        reason: ReservedBitsReason,
    },

    /// Load or store at an odd address under strict execution.
    #[error("Misaligned {access} access to address 0x{address:04x}")]
    MisalignedAccess { access: Access, address: Address },

    /// Load or store outside the memory buffer under strict execution.
    #[error("Invalid {access} access to address 0x{address:04x}")]
    OutOfRangeAccess { access: Access, address: Address },

    /// A constant does not fit the signed range of a short immediate field.
    #[error("Immediate constant 0x{value:04x} too large (mask: 0x{mask:04x})")]
    ImmediateOutOfRange { value: Word, mask: Word },

    /// An image larger than main memory was loaded.
    #[error("Image of {size} bytes does not fit into {memory} bytes of memory")]
    ImageTooLarge { size: usize, memory: usize },

    /// The image file could not be read.
    #[error("could not read image: {0}")]
    Io(#[from] std::io::Error),

    /// A feature-level name or number outside the enumeration.
    #[error("Invalid feature level {0}")]
    InvalidFeatureLevel(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_the_relevant_values() {
        let err = Error::InvalidOpcode {
            instr: 0x0007,
            address: 0x002a,
        };
        assert_eq!(
            err.to_string(),
            "Invalid instruction 0x0007 at memory location 0x002a"
        );

        let err = Error::ReservedBits {
            instr: 0xffff,
            reason: ReservedBitsReason::AssignmentTwoOperands,
        };
        assert_eq!(
            err.to_string(),
            "Invalid non-zero bits in instruction 0xffff (reason: 7)"
        );

        let err = Error::MisalignedAccess {
            access: Access::Write,
            address: 0x0101,
        };
        assert_eq!(err.to_string(), "Misaligned write access to address 0x0101");
    }

    #[test]
    fn reason_codes_match_the_audit_clauses() {
        assert_eq!(ReservedBitsReason::NonZeroNoOperands.code(), 0);
        assert_eq!(ReservedBitsReason::NonZeroShortTwoOperands.code(), 3);
        assert_eq!(ReservedBitsReason::AssignmentTwoOperands.code(), 7);
    }
}
