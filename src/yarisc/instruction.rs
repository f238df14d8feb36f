//! Instruction encoding model: opcodes, operand field layout, feature levels.
//!
//! Every instruction is one 16-bit word; long-form variants append one more
//! immediate word in the following memory slot. All instructions other than
//! jumps share this layout:
//!
//! ```text
//! [15] [14-9] [8-6] [5-0]
//! sel   ops    op0  opcode
//! ```
//!
//! With `sel == 0` the fields `op2` (bits 14-12) and `op1` (bits 11-9) name
//! registers. With `sel == 1` the `ops` field becomes `loc` (bit 14), `as`
//! (bit 13) and the short immediate `st` (bits 12-9): `loc` selects between
//! the sign-extended 4-bit `st` constant and the word following the
//! instruction, `as` selects which ALU operand the constant is assigned to.
//!
//! Jump instructions store an address instead:
//!
//! ```text
//! [15] [14-6] [5-0]        [15] [14] [13-9] [8-6] [5-0]
//! aloc  addr  opcode       aloc cneg caddr  cflag opcode
//! ```
//!
//! Short addresses are counted in words and sign-extend from the top bit of
//! the shifted field; long addresses come from the following word in bytes.

use std::fmt;
use std::str::FromStr;

use crate::yarisc::errors::Error;
use crate::yarisc::types::{sign_extend, Address, Word};

pub const OPCODE_MASK: Word = 0b0000000000111111;

pub const OPERAND_MASK: Word = 0b1111111111000000;

pub const OPERAND_OP0_MASK: Word = 0b0000000111000000;
pub const OPERAND_OP1_MASK: Word = 0b0000111000000000;
pub const OPERAND_OP2_MASK: Word = 0b0111000000000000;

pub const OPERAND_SEL_MASK: Word = 0b1000000000000000;
pub const OPERAND_LOC_MASK: Word = 0b0100000000000000;
pub const OPERAND_AS_MASK: Word = 0b0010000000000000;
pub const OPERAND_ST_MASK: Word = 0b0001111000000000;

/// Bitmask for an immediate constant stored in the next word.
pub const OPERAND_IMM_MASK: Word = OPERAND_LOC_MASK | OPERAND_SEL_MASK;

/// Bit that has no meaning when the immediate constant is in the next word.
pub const OPERAND_IMM_UNASSIGNED_MASK: Word = 0b0001000000000000;

/// Combination of bits that, when all set, forms an invalid instruction word.
pub const OPERAND_IMM_INVALID_MASK: Word = OPERAND_IMM_MASK | OPERAND_IMM_UNASSIGNED_MASK;

pub const OPERAND_OP0_OFFSET: u32 = 6;
pub const OPERAND_OP1_OFFSET: u32 = 9;
pub const OPERAND_OP2_OFFSET: u32 = 12;
pub const OPERAND_ST_OFFSET: u32 = 9;
pub const OPERAND_AS_OFFSET: u32 = 13;

pub const OPERAND_ADDR_MASK: Word = 0b0111111111000000;
pub const OPERAND_ADDR_LOC_MASK: Word = 0b1000000000000000;

pub const OPERAND_COND_FLAG_MASK: Word = 0b0000000011000000;
pub const OPERAND_COND_FLAG_CARRY_MASK: Word = 0b0000000001000000;
pub const OPERAND_COND_FLAG_ZERO_MASK: Word = 0b0000000010000000;

/// Currently unassigned conditional jump bit.
pub const OPERAND_COND_UNASSIGNED_MASK: Word = 0b0000000100000000;
pub const OPERAND_COND_INVALID_MASK: Word = OPERAND_COND_UNASSIGNED_MASK;

pub const OPERAND_COND_ADDR_MASK: Word = 0b0011111000000000;
pub const OPERAND_COND_NEG_MASK: Word = 0b0100000000000000;

pub const OPERAND_ADDR_OFFSET: u32 = 6;
pub const OPERAND_COND_FLAG_OFFSET: u32 = 6;
pub const OPERAND_COND_ADDR_OFFSET: u32 = 9;

/// Shift used for `addr`, adjusted for word-counted addresses.
///
/// Used together with `OPERAND_ADDR_MASK` so that the lowest address bit is
/// always zero.
pub const OPERAND_ADDR_WORD_OFFSET: u32 = OPERAND_ADDR_OFFSET - 1;

/// Shift used for `caddr`, adjusted for word-counted addresses.
pub const OPERAND_COND_ADDR_WORD_OFFSET: u32 = OPERAND_COND_ADDR_OFFSET - 1;

/// Sign bit of the decoded short immediate value.
pub const SHORT_IMMEDIATE_SIGN_MASK: Word = 0x0008;

/// Sign bit of the decoded short jump byte address.
pub const SHORT_JUMP_SIGN_MASK: Word = 0x0200;

/// Sign bit of the decoded short conditional jump byte address.
pub const SHORT_COND_JUMP_SIGN_MASK: Word = 0x0020;

/// Feature level of the machine.
///
/// Levels are totally ordered; an instruction exists from its introducing
/// level onwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FeatureLevel {
    /// Minimalistic feature set that is simple to build in hardware (YaRISC-min).
    Min,
    /// The first very basic version (YaRISC-1).
    V1,
}

/// The latest feature level.
pub const FEATURE_LEVEL_LATEST: FeatureLevel = FeatureLevel::V1;

impl FeatureLevel {
    /// Numeric value of the level as used in machine descriptions.
    pub const fn number(self) -> u16 {
        match self {
            FeatureLevel::Min => 10,
            FeatureLevel::V1 => 100,
        }
    }
}

impl fmt::Display for FeatureLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureLevel::Min => write!(f, "min"),
            FeatureLevel::V1 => write!(f, "v1"),
        }
    }
}

impl FromStr for FeatureLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "min" | "10" => Ok(FeatureLevel::Min),
            "v1" | "100" => Ok(FeatureLevel::V1),
            other => Err(Error::InvalidFeatureLevel(other.to_string())),
        }
    }
}

/// Type of instruction, i.e. the instruction format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpType {
    /// Instruction without operands.
    Basic,
    /// Instruction with one operand.
    Op0,
    /// Instruction with two operands.
    Op0Op1,
    /// Instruction with three operands.
    Op0Op1Op2,
    /// Jump instruction.
    Jump,
    /// Conditional jump instruction.
    CondJump,
}

/// Instruction opcodes.
///
/// Opcodes `0x03`, `0x05`, `0x2b` and `0x2d` are reserved for instruction
/// pointer relative addressing and currently not implemented; they decode as
/// invalid instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// MOV: moves `op1` or an immediate constant into `op0`; updates the zero flag.
    Move,
    /// LDR: loads from address `op1` into `op0`; updates the zero flag.
    Load,
    /// STR: stores `op0` to address `op1`.
    Store,
    /// ADD: `op0 = op1 + op2`; updates the zero and carry flags.
    Add,
    /// ADC: `op0 = op1 + op2 + carry`; updates the zero and carry flags.
    AddWithCarry,
    /// JMP: unconditional jump to an immediate address.
    Jump,
    /// JMC/JNC/JMZ/JNZ: conditional jump with a status bitmask and negate flag.
    CondJump,
    /// NOP.
    Noop,
    /// HLT: halts the processor.
    Halt,
}

impl Opcode {
    /// Decodes the opcode field of an instruction word.
    pub fn from_word(instr: Word) -> Option<Opcode> {
        match instr & OPCODE_MASK {
            0x01 => Some(Opcode::Move),
            0x02 => Some(Opcode::Load),
            0x04 => Some(Opcode::Store),
            0x10 => Some(Opcode::Add),
            0x11 => Some(Opcode::AddWithCarry),
            0x2a => Some(Opcode::Jump),
            0x2c => Some(Opcode::CondJump),
            0x3e => Some(Opcode::Noop),
            0x3f => Some(Opcode::Halt),
            _ => None,
        }
    }

    /// Opcode field value.
    pub const fn word(self) -> Word {
        match self {
            Opcode::Move => 0x01,
            Opcode::Load => 0x02,
            Opcode::Store => 0x04,
            Opcode::Add => 0x10,
            Opcode::AddWithCarry => 0x11,
            Opcode::Jump => 0x2a,
            Opcode::CondJump => 0x2c,
            Opcode::Noop => 0x3e,
            Opcode::Halt => 0x3f,
        }
    }

    /// Mnemonic of the instruction.
    ///
    /// For conditional jumps this is just the prefix of the full mnemonic.
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Move => "MOV",
            Opcode::Load => "LDR",
            Opcode::Store => "STR",
            Opcode::Add => "ADD",
            Opcode::AddWithCarry => "ADC",
            Opcode::Jump => "JMP",
            Opcode::CondJump => "J",
            Opcode::Noop => "NOP",
            Opcode::Halt => "HLT",
        }
    }

    /// Earliest feature level at which the instruction exists.
    pub const fn level(self) -> FeatureLevel {
        match self {
            Opcode::Jump | Opcode::Noop => FeatureLevel::V1,
            _ => FeatureLevel::Min,
        }
    }

    /// Instruction format.
    pub const fn optype(self) -> OpType {
        match self {
            Opcode::Move | Opcode::Load | Opcode::Store => OpType::Op0Op1,
            Opcode::Add | Opcode::AddWithCarry => OpType::Op0Op1Op2,
            Opcode::Jump => OpType::Jump,
            Opcode::CondJump => OpType::CondJump,
            Opcode::Noop | Opcode::Halt => OpType::Basic,
        }
    }

    /// Returns whether the instruction is supported at the given level.
    pub fn supported(self, level: FeatureLevel) -> bool {
        self.level() <= level
    }
}

// ---------- Field decoding ----------

/// Register index of the first operand `op0`.
#[inline]
pub fn op0_index(instr: Word) -> usize {
    ((instr & OPERAND_OP0_MASK) >> OPERAND_OP0_OFFSET) as usize
}

/// Register index of the second operand `op1`.
#[inline]
pub fn op1_index(instr: Word) -> usize {
    ((instr & OPERAND_OP1_MASK) >> OPERAND_OP1_OFFSET) as usize
}

/// Register index of the third operand `op2`.
#[inline]
pub fn op2_index(instr: Word) -> usize {
    ((instr & OPERAND_OP2_MASK) >> OPERAND_OP2_OFFSET) as usize
}

/// Sign-extended short immediate constant stored in the `st` field.
#[inline]
pub fn short_immediate(instr: Word) -> Word {
    sign_extend(
        (instr & OPERAND_ST_MASK) >> OPERAND_ST_OFFSET,
        SHORT_IMMEDIATE_SIGN_MASK,
    )
}

/// Sign-extended short jump byte address stored in the `addr` field.
#[inline]
pub fn short_jump_address(instr: Word) -> Address {
    sign_extend(
        (instr & OPERAND_ADDR_MASK) >> OPERAND_ADDR_WORD_OFFSET,
        SHORT_JUMP_SIGN_MASK,
    )
}

/// Sign-extended short conditional jump byte address stored in `caddr`.
#[inline]
pub fn short_cond_jump_address(instr: Word) -> Address {
    sign_extend(
        (instr & OPERAND_COND_ADDR_MASK) >> OPERAND_COND_ADDR_WORD_OFFSET,
        SHORT_COND_JUMP_SIGN_MASK,
    )
}
