//! Disassembler for single instructions.

use std::fmt::Write;

use crate::yarisc::instruction::*;
use crate::yarisc::registers::REG_NAMES;
use crate::yarisc::types::{Address, Word};

const MNEMONIC_SEP: &str = " ";
const ARGUMENT_SEP: &str = ", ";

/// Result of disassembling an instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disassembly {
    /// Number of words consumed (0 if there was an error).
    pub words: usize,
    /// Textual representation of the instruction or the error.
    pub text: String,
}

impl Disassembly {
    fn error(text: String) -> Self {
        Self { words: 0, text }
    }
}

fn invalid_opcode_error(instr: Word) -> Disassembly {
    Disassembly::error(format!("Invalid instruction 0x{instr:04x}"))
}

fn invalid_bits_error(instr: Word) -> Disassembly {
    Disassembly::error(format!("Invalid non-zero bits in instruction 0x{instr:04x}"))
}

// ---------- Reserved bit checks ----------

fn check_no_operands(instr: Word) -> bool {
    (instr & OPERAND_MASK) == 0
}

fn check_one_operand(instr: Word) -> bool {
    (instr & (OPERAND_OP1_MASK | OPERAND_OP2_MASK)) == 0
}

fn check_two_operands(instr: Word) -> bool {
    if (instr & OPERAND_SEL_MASK) != 0 {
        (instr & OPERAND_AS_MASK) == 0
            && !(((instr & OPERAND_LOC_MASK) != 0) && ((instr & OPERAND_ST_MASK) != 0))
    } else {
        (instr & OPERAND_OP2_MASK) == 0
    }
}

fn check_three_operands(instr: Word) -> bool {
    (instr & OPERAND_IMM_INVALID_MASK) != OPERAND_IMM_INVALID_MASK
}

fn check_jump(instr: Word) -> bool {
    !(((instr & OPERAND_ADDR_LOC_MASK) != 0) && ((instr & OPERAND_ADDR_MASK) != 0))
}

fn check_cond_jump(instr: Word) -> bool {
    !(((instr & OPERAND_ADDR_LOC_MASK) != 0) && ((instr & OPERAND_COND_ADDR_MASK) != 0))
        && (instr & OPERAND_COND_INVALID_MASK) != OPERAND_COND_INVALID_MASK
}

// ---------- Operand formatting ----------

/// Writes an immediate constant: small values in decimal, everything else
/// in hex with the width of its effective operand size.
fn push_immediate(out: &mut String, imm: Word) {
    if imm < 10 {
        let _ = write!(out, "{imm}");
    } else {
        let width = if imm < 0x10 {
            1
        } else if imm < 0x100 {
            2
        } else {
            4
        };
        let _ = write!(out, "0x{imm:0width$x}");
    }
}

fn push_address(out: &mut String, address: Address) {
    let _ = write!(out, "0x{address:04x}");
}

fn first_reg_name(instr: Word) -> &'static str {
    REG_NAMES[op0_index(instr)]
}

fn second_reg_name(instr: Word) -> &'static str {
    REG_NAMES[op1_index(instr)]
}

fn third_reg_name(instr: Word) -> &'static str {
    REG_NAMES[op2_index(instr)]
}

// ---------- Conversion per format ----------

fn convert_basic(mnemonic: &str, _instr: Word) -> Disassembly {
    Disassembly {
        words: 1,
        text: mnemonic.to_string(),
    }
}

fn convert_one_operand(mnemonic: &str, instr: Word) -> Disassembly {
    Disassembly {
        words: 1,
        text: format!("{mnemonic}{MNEMONIC_SEP}{}", first_reg_name(instr)),
    }
}

fn convert_two_operands(mnemonic: &str, instr: Word, arg: Word) -> Disassembly {
    let mut words = 1;
    let mut text = String::new();

    text.push_str(mnemonic);
    text.push_str(MNEMONIC_SEP);
    text.push_str(first_reg_name(instr));
    text.push_str(ARGUMENT_SEP);

    if (instr & OPERAND_SEL_MASK) != 0 {
        if (instr & OPERAND_LOC_MASK) != 0 {
            words += 1;
            push_immediate(&mut text, arg);
        } else {
            push_immediate(&mut text, short_immediate(instr));
        }
    } else {
        text.push_str(second_reg_name(instr));
    }

    Disassembly { words, text }
}

fn convert_three_operands(mnemonic: &str, instr: Word, arg: Word) -> Disassembly {
    let mut words = 1;
    let mut text = String::new();

    text.push_str(mnemonic);
    text.push_str(MNEMONIC_SEP);
    text.push_str(first_reg_name(instr));
    text.push_str(ARGUMENT_SEP);

    if (instr & OPERAND_SEL_MASK) != 0 {
        let (immediate, reg_name) = if (instr & OPERAND_LOC_MASK) != 0 {
            words += 1;
            (arg, second_reg_name(instr))
        } else {
            // Short immediates pair with the accumulator, i.e. op0 itself.
            (short_immediate(instr), first_reg_name(instr))
        };

        let mut immediate_text = String::new();
        push_immediate(&mut immediate_text, immediate);

        let operands = [immediate_text.as_str(), reg_name];
        let assignment = ((instr & OPERAND_AS_MASK) >> OPERAND_AS_OFFSET) as usize;

        text.push_str(operands[assignment]);
        text.push_str(ARGUMENT_SEP);
        text.push_str(operands[1 - assignment]);
    } else {
        text.push_str(second_reg_name(instr));
        text.push_str(ARGUMENT_SEP);
        text.push_str(third_reg_name(instr));
    }

    Disassembly { words, text }
}

fn convert_jump(mnemonic: &str, instr: Word, arg: Word) -> Disassembly {
    let mut words = 1;
    let mut text = String::new();

    text.push_str(mnemonic);
    text.push_str(MNEMONIC_SEP);

    if (instr & OPERAND_ADDR_LOC_MASK) != 0 {
        words += 1;
        push_immediate(&mut text, arg);
    } else {
        push_address(&mut text, short_jump_address(instr));
    }

    Disassembly { words, text }
}

fn convert_cond_jump(mnemonic: &str, instr: Word, arg: Word) -> Disassembly {
    let mut words = 1;
    let mut text = String::new();

    text.push_str(mnemonic);
    text.push(if (instr & OPERAND_COND_NEG_MASK) != 0 {
        'N'
    } else {
        'M'
    });

    if (instr & OPERAND_COND_FLAG_CARRY_MASK) != 0 {
        text.push('C');
    }
    if (instr & OPERAND_COND_FLAG_ZERO_MASK) != 0 {
        text.push('Z');
    }

    text.push_str(MNEMONIC_SEP);

    if (instr & OPERAND_ADDR_LOC_MASK) != 0 {
        words += 1;
        push_immediate(&mut text, arg);
    } else {
        push_address(&mut text, short_cond_jump_address(instr));
    }

    Disassembly { words, text }
}

/// Disassembles an instruction.
///
/// `arg` is the word following the instruction word; it is only consumed by
/// long-form variants. On failure zero words are consumed and the text
/// describes the error.
pub fn disassemble(instr: Word, arg: Word, level: FeatureLevel) -> Disassembly {
    let Some(op) = Opcode::from_word(instr) else {
        return invalid_opcode_error(instr);
    };

    if !op.supported(level) {
        return invalid_opcode_error(instr);
    }

    let mnemonic = op.mnemonic();

    match op.optype() {
        OpType::Basic => {
            if check_no_operands(instr) {
                convert_basic(mnemonic, instr)
            } else {
                invalid_bits_error(instr)
            }
        }
        OpType::Op0 => {
            if check_one_operand(instr) {
                convert_one_operand(mnemonic, instr)
            } else {
                invalid_bits_error(instr)
            }
        }
        OpType::Op0Op1 => {
            if check_two_operands(instr) {
                convert_two_operands(mnemonic, instr, arg)
            } else {
                invalid_bits_error(instr)
            }
        }
        OpType::Op0Op1Op2 => {
            if check_three_operands(instr) {
                convert_three_operands(mnemonic, instr, arg)
            } else {
                invalid_bits_error(instr)
            }
        }
        OpType::Jump => {
            if check_jump(instr) {
                convert_jump(mnemonic, instr, arg)
            } else {
                invalid_bits_error(instr)
            }
        }
        OpType::CondJump => {
            if check_cond_jump(instr) {
                convert_cond_jump(mnemonic, instr, arg)
            } else {
                invalid_bits_error(instr)
            }
        }
    }
}
