//! Emulator for the YaRISC 16-bit processor.
//!
//! The [`yarisc`] module holds the machine model: the instruction encoding
//! tables, assembler and disassembler, the policy-parameterised execution
//! core, and the diff renderer for register and memory views. The [`ui`]
//! module drives it interactively on a terminal.

pub mod ui;
pub mod yarisc;
