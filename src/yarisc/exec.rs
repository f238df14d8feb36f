//! The execution core: one primitive that fetches, decodes and executes a
//! single instruction under a pair of orthogonal policies.
//!
//! The debug policy observes execution (breakpoints, panic storage), the
//! strict policy adds checks (alignment, bounds, reserved-bit audit). Both
//! carry a `const ENABLED` flag and are resolved to concrete types once per
//! run, so the checks compile out of the disabled variants.
//!
//! A panic is a logical trap, not a process abort: with a debug policy the
//! diagnostic is stored in the debugger and the step reports a breakpoint;
//! without one the error propagates to the caller.

use crate::yarisc::debugger::DebuggerHandle;
use crate::yarisc::errors::{Access, Error, ReservedBitsReason, Result};
use crate::yarisc::instruction::*;
use crate::yarisc::machine::{MachineMemory, MachineRegisters};
use crate::yarisc::registers::StatusRegister;
use crate::yarisc::types::{is_aligned, Address, DoubleWord, Word, WORD_SIZE};

/// Outcome of executing one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteResult {
    pub keep_going: bool,
    pub breakpoint: bool,
}

impl ExecuteResult {
    /// Continue with the next instruction.
    pub const CONTINUE: Self = Self {
        keep_going: true,
        breakpoint: false,
    };

    /// The machine halted cleanly.
    pub const HALT: Self = Self {
        keep_going: false,
        breakpoint: false,
    };

    /// The debug policy asserted a breakpoint or stored a panic.
    pub const BREAKPOINT: Self = Self {
        keep_going: false,
        breakpoint: true,
    };
}

impl Default for ExecuteResult {
    fn default() -> Self {
        Self::CONTINUE
    }
}

/// Debug side of the execution policy.
pub trait DebugPolicy {
    const ENABLED: bool;

    /// Returns whether a panic has already been recorded.
    fn has_panic(&self) -> bool {
        false
    }

    /// Reports a panic: either records it and turns the step into a
    /// breakpoint, or propagates the error.
    fn panic(&mut self, error: Error) -> Result<ExecuteResult>;

    /// Code breakpoint at the given instruction address.
    fn breakpoint(&self, _address: Address) -> bool {
        false
    }

    /// Data breakpoint on a load from the given address.
    fn load_breakpoint(&self, _address: Address) -> bool {
        false
    }

    /// Data breakpoint on a store of `value` to the given address.
    fn data_breakpoint(&self, _address: Address, _value: Word) -> bool {
        false
    }
}

/// Debug policy backed by a shared debugger.
pub struct DebugExecution {
    debugger: DebuggerHandle,
}

impl DebugExecution {
    pub fn new(debugger: DebuggerHandle) -> Self {
        Self { debugger }
    }
}

impl DebugPolicy for DebugExecution {
    const ENABLED: bool = true;

    fn has_panic(&self) -> bool {
        self.debugger.borrow().panic()
    }

    fn panic(&mut self, error: Error) -> Result<ExecuteResult> {
        self.debugger.borrow_mut().store_panic(error.to_string());

        Ok(ExecuteResult::BREAKPOINT)
    }

    fn breakpoint(&self, address: Address) -> bool {
        self.debugger.borrow().has_code_breakpoint(address)
    }

    fn load_breakpoint(&self, address: Address) -> bool {
        self.debugger.borrow().has_data_breakpoint(address, 0)
    }

    fn data_breakpoint(&self, address: Address, value: Word) -> bool {
        self.debugger.borrow().has_data_breakpoint(address, value)
    }
}

/// Debug policy that observes nothing; panics become fatal errors.
pub struct NoopDebug;

impl DebugPolicy for NoopDebug {
    const ENABLED: bool = false;

    fn panic(&mut self, error: Error) -> Result<ExecuteResult> {
        Err(error)
    }
}

/// Strict side of the execution policy.
pub trait StrictPolicy {
    const ENABLED: bool;
}

/// Enforces word alignment, in-range memory accesses and the reserved-bits
/// audit.
pub struct StrictExecution;

impl StrictPolicy for StrictExecution {
    const ENABLED: bool = true;
}

/// No additional checks.
pub struct NoopStrict;

impl StrictPolicy for NoopStrict {
    const ENABLED: bool = false;
}

/// Execution policy passed by reference through every decode and handler.
pub struct ExecutionPolicy<D: DebugPolicy, S: StrictPolicy> {
    pub debug: D,
    pub strict: S,
    pub level: FeatureLevel,
}

impl<D: DebugPolicy, S: StrictPolicy> ExecutionPolicy<D, S> {
    pub fn new(debug: D, strict: S, level: FeatureLevel) -> Self {
        Self {
            debug,
            strict,
            level,
        }
    }

    fn check_address(
        &self,
        mem: &MachineMemory,
        address: Address,
        access: Access,
    ) -> Option<Error> {
        if !is_aligned(address as usize) {
            Some(Error::MisalignedAccess { access, address })
        } else if !mem.main.in_range(address) {
            Some(Error::OutOfRangeAccess { access, address })
        } else {
            None
        }
    }

    /// Loads a word under the policy checks.
    fn load(&mut self, mem: &MachineMemory, address: Address, dst: &mut Word) -> Result<ExecuteResult> {
        if S::ENABLED {
            if let Some(error) = self.check_address(mem, address, Access::Read) {
                return self.panic(error);
            }
        }

        if D::ENABLED && self.debug.load_breakpoint(address) {
            return Ok(ExecuteResult::BREAKPOINT);
        }

        *dst = mem.main.load(address);

        Ok(ExecuteResult::CONTINUE)
    }

    /// Stores a word under the policy checks.
    fn store(&mut self, mem: &mut MachineMemory, address: Address, value: Word) -> Result<ExecuteResult> {
        if S::ENABLED {
            if let Some(error) = self.check_address(mem, address, Access::Write) {
                return self.panic(error);
            }
        }

        if D::ENABLED && self.debug.data_breakpoint(address, value) {
            return Ok(ExecuteResult::BREAKPOINT);
        }

        mem.main.store(address, value);

        Ok(ExecuteResult::CONTINUE)
    }

    /// Runs the post-decode reserved-bits audit.
    fn check(&mut self, result: ExecuteResult, optype: OpType, instr: Word) -> Result<ExecuteResult> {
        if S::ENABLED && !self.debug.has_panic() {
            if let Err(reason) = audit_operand_bits(instr, optype) {
                return self.panic(Error::ReservedBits { instr, reason });
            }
        }

        Ok(result)
    }

    fn panic(&mut self, error: Error) -> Result<ExecuteResult> {
        self.debug.panic(error)
    }
}

/// Checks that all bits an instruction format leaves unassigned are zero.
///
/// Returns the audit clause on violation; the clause code is part of the
/// diagnostic message.
pub fn audit_operand_bits(instr: Word, optype: OpType) -> std::result::Result<(), ReservedBitsReason> {
    match optype {
        OpType::Basic => {
            if (instr & OPERAND_MASK) != 0 {
                return Err(ReservedBitsReason::NonZeroNoOperands);
            }
        }
        OpType::Op0 => {
            if (instr & (OPERAND_OP1_MASK | OPERAND_OP2_MASK)) != 0 {
                return Err(ReservedBitsReason::NonZeroOneOperand);
            }
        }
        OpType::Op0Op1 => {
            if (instr & OPERAND_SEL_MASK) != 0 {
                if (instr & OPERAND_AS_MASK) != 0 {
                    return Err(ReservedBitsReason::AssignmentTwoOperands);
                } else if ((instr & OPERAND_LOC_MASK) != 0) && ((instr & OPERAND_ST_MASK) != 0) {
                    return Err(ReservedBitsReason::NonZeroShortTwoOperands);
                }
            } else if (instr & OPERAND_OP2_MASK) != 0 {
                return Err(ReservedBitsReason::NonZeroRegTwoOperands);
            }
        }
        OpType::Op0Op1Op2 => {
            if (instr & OPERAND_IMM_INVALID_MASK) == OPERAND_IMM_INVALID_MASK {
                return Err(ReservedBitsReason::NonZeroUnassignedThreeOperands);
            }
        }
        OpType::Jump => {
            if ((instr & OPERAND_ADDR_LOC_MASK) != 0) && ((instr & OPERAND_ADDR_MASK) != 0) {
                return Err(ReservedBitsReason::NonZeroJumpAddrOperands);
            }
        }
        OpType::CondJump => {
            if ((instr & OPERAND_ADDR_LOC_MASK) != 0) && ((instr & OPERAND_COND_ADDR_MASK) != 0) {
                return Err(ReservedBitsReason::NonZeroJumpAddrOperands);
            }
            if (instr & OPERAND_COND_INVALID_MASK) == OPERAND_COND_INVALID_MASK {
                return Err(ReservedBitsReason::NonZeroUnassignedCondOperands);
            }
        }
    }

    Ok(())
}

// ---------- Operand decoding ----------

/// Fetches the word at `ip` and advances `ip` past it.
fn load_instruction<D: DebugPolicy, S: StrictPolicy>(
    policy: &mut ExecutionPolicy<D, S>,
    reg: &mut MachineRegisters,
    mem: &MachineMemory,
) -> Result<(Word, ExecuteResult)> {
    let ip = reg.named.ip();
    reg.named.set_ip(ip.wrapping_add(WORD_SIZE as Word));

    let mut instr = 0x0;
    let result = policy.load(mem, ip, &mut instr)?;

    Ok((instr, result))
}

/// Decodes the second operand of a two-operand instruction, fetching the
/// immediate word if necessary.
fn second_operand<D: DebugPolicy, S: StrictPolicy>(
    policy: &mut ExecutionPolicy<D, S>,
    instr: Word,
    reg: &mut MachineRegisters,
    mem: &MachineMemory,
) -> Result<(Word, ExecuteResult)> {
    if (instr & OPERAND_SEL_MASK) != 0 {
        if (instr & OPERAND_LOC_MASK) != 0 {
            load_instruction(policy, reg, mem)
        } else {
            Ok((short_immediate(instr), ExecuteResult::CONTINUE))
        }
    } else {
        Ok((reg.named.r[op1_index(instr)], ExecuteResult::CONTINUE))
    }
}

/// Decodes the second and third operands of a three-operand instruction.
///
/// In immediate mode the `as` flag selects which side the constant lands
/// on; the short-immediate form pairs the constant with the value of the
/// first operand register (`op0`, the accumulator).
fn second_third_operands<D: DebugPolicy, S: StrictPolicy>(
    policy: &mut ExecutionPolicy<D, S>,
    instr: Word,
    reg: &mut MachineRegisters,
    mem: &MachineMemory,
    op0: Word,
) -> Result<((Word, Word), ExecuteResult)> {
    if (instr & OPERAND_SEL_MASK) != 0 {
        let (operands, result) = if (instr & OPERAND_LOC_MASK) != 0 {
            let (imm, result) = load_instruction(policy, reg, mem)?;

            ([imm, reg.named.r[op1_index(instr)]], result)
        } else {
            ([short_immediate(instr), op0], ExecuteResult::CONTINUE)
        };

        let assignment = ((instr & OPERAND_AS_MASK) >> OPERAND_AS_OFFSET) as usize;

        Ok(((operands[assignment], operands[1 - assignment]), result))
    } else {
        Ok((
            (reg.named.r[op1_index(instr)], reg.named.r[op2_index(instr)]),
            ExecuteResult::CONTINUE,
        ))
    }
}

fn jump_address_operand<D: DebugPolicy, S: StrictPolicy>(
    policy: &mut ExecutionPolicy<D, S>,
    instr: Word,
    reg: &mut MachineRegisters,
    mem: &MachineMemory,
) -> Result<(Address, ExecuteResult)> {
    if (instr & OPERAND_ADDR_LOC_MASK) != 0 {
        load_instruction(policy, reg, mem)
    } else {
        Ok((short_jump_address(instr), ExecuteResult::CONTINUE))
    }
}

fn cond_jump_address_operand<D: DebugPolicy, S: StrictPolicy>(
    policy: &mut ExecutionPolicy<D, S>,
    instr: Word,
    reg: &mut MachineRegisters,
    mem: &MachineMemory,
) -> Result<(Address, ExecuteResult)> {
    if (instr & OPERAND_ADDR_LOC_MASK) != 0 {
        load_instruction(policy, reg, mem)
    } else {
        Ok((short_cond_jump_address(instr), ExecuteResult::CONTINUE))
    }
}

// ---------- Handlers ----------

fn exec_move<D: DebugPolicy, S: StrictPolicy>(
    policy: &mut ExecutionPolicy<D, S>,
    instr: Word,
    reg: &mut MachineRegisters,
    mem: &MachineMemory,
) -> Result<ExecuteResult> {
    let (op1, result) = second_operand(policy, instr, reg, mem)?;
    if D::ENABLED && result.breakpoint {
        return Ok(result);
    }

    reg.status.set_zero(op1 == 0x0);
    reg.named.r[op0_index(instr)] = op1;

    Ok(ExecuteResult::CONTINUE)
}

fn exec_load<D: DebugPolicy, S: StrictPolicy>(
    policy: &mut ExecutionPolicy<D, S>,
    instr: Word,
    reg: &mut MachineRegisters,
    mem: &MachineMemory,
) -> Result<ExecuteResult> {
    let (address, result) = second_operand(policy, instr, reg, mem)?;
    if D::ENABLED && result.breakpoint {
        return Ok(result);
    }

    let mut value = 0x0;
    let result = policy.load(mem, address, &mut value)?;
    if result.breakpoint {
        return Ok(result);
    }

    reg.status.set_zero(value == 0x0);
    reg.named.r[op0_index(instr)] = value;

    Ok(ExecuteResult::CONTINUE)
}

fn exec_store<D: DebugPolicy, S: StrictPolicy>(
    policy: &mut ExecutionPolicy<D, S>,
    instr: Word,
    reg: &mut MachineRegisters,
    mem: &mut MachineMemory,
) -> Result<ExecuteResult> {
    let (address, result) = second_operand(policy, instr, reg, mem)?;
    if D::ENABLED && result.breakpoint {
        return Ok(result);
    }

    let value = reg.named.r[op0_index(instr)];

    policy.store(mem, address, value)
}

fn exec_alu<D: DebugPolicy, S: StrictPolicy>(
    policy: &mut ExecutionPolicy<D, S>,
    instr: Word,
    reg: &mut MachineRegisters,
    mem: &MachineMemory,
    with_carry: bool,
) -> Result<ExecuteResult> {
    let op0 = op0_index(instr);
    let accumulator = reg.named.r[op0];

    let ((op1, op2), result) = second_third_operands(policy, instr, reg, mem, accumulator)?;
    if D::ENABLED && result.breakpoint {
        return Ok(result);
    }

    let carry_in = if with_carry {
        (reg.status.s & StatusRegister::CARRY_FLAG) as DoubleWord
    } else {
        0
    };

    let sum = op1 as DoubleWord + op2 as DoubleWord + carry_in;
    let word = sum as Word;

    // Z from the truncated result, C from bit 16 of the wide sum; all other
    // status bits are cleared.
    reg.status.s = if word == 0x0 {
        StatusRegister::ZERO_FLAG
    } else {
        0x0
    };
    reg.status.s |= ((sum >> (8 * WORD_SIZE as u32)) & 0x1) as Word;

    reg.named.r[op0] = word;

    Ok(ExecuteResult::CONTINUE)
}

fn exec_jump<D: DebugPolicy, S: StrictPolicy>(
    policy: &mut ExecutionPolicy<D, S>,
    instr: Word,
    reg: &mut MachineRegisters,
    mem: &MachineMemory,
) -> Result<ExecuteResult> {
    let (address, result) = jump_address_operand(policy, instr, reg, mem)?;
    if D::ENABLED && result.breakpoint {
        return Ok(result);
    }

    reg.named.set_ip(address);

    Ok(ExecuteResult::CONTINUE)
}

fn exec_cond_jump<D: DebugPolicy, S: StrictPolicy>(
    policy: &mut ExecutionPolicy<D, S>,
    instr: Word,
    reg: &mut MachineRegisters,
    mem: &MachineMemory,
) -> Result<ExecuteResult> {
    let (address, result) = cond_jump_address_operand(policy, instr, reg, mem)?;
    if D::ENABLED && result.breakpoint {
        return Ok(result);
    }

    let flags = (instr & OPERAND_COND_FLAG_MASK) >> OPERAND_COND_FLAG_OFFSET;
    let negate = (instr & OPERAND_COND_NEG_MASK) != 0;

    if ((reg.status.s & flags) != 0x0) != negate {
        reg.named.set_ip(address);
    }

    Ok(ExecuteResult::CONTINUE)
}

/// Executes one instruction at `ip`.
pub fn execute_instruction<D: DebugPolicy, S: StrictPolicy>(
    policy: &mut ExecutionPolicy<D, S>,
    reg: &mut MachineRegisters,
    mem: &mut MachineMemory,
) -> Result<ExecuteResult> {
    if D::ENABLED && policy.debug.breakpoint(reg.named.ip()) {
        return Ok(ExecuteResult::BREAKPOINT);
    }

    let (instr, fetch) = load_instruction(policy, reg, mem)?;
    if D::ENABLED && fetch.breakpoint {
        return Ok(fetch);
    }

    let op = match Opcode::from_word(instr) {
        Some(op) if op.supported(policy.level) => op,
        _ => {
            let address = reg.named.ip().wrapping_sub(WORD_SIZE as Word);

            return policy.panic(Error::InvalidOpcode { instr, address });
        }
    };

    let result = match op {
        Opcode::Move => exec_move(policy, instr, reg, mem)?,
        Opcode::Load => exec_load(policy, instr, reg, mem)?,
        Opcode::Store => exec_store(policy, instr, reg, mem)?,
        Opcode::Add => exec_alu(policy, instr, reg, mem, false)?,
        Opcode::AddWithCarry => exec_alu(policy, instr, reg, mem, true)?,
        Opcode::Jump => exec_jump(policy, instr, reg, mem)?,
        Opcode::CondJump => exec_cond_jump(policy, instr, reg, mem)?,
        Opcode::Noop => ExecuteResult::CONTINUE,
        Opcode::Halt => ExecuteResult::HALT,
    };

    if S::ENABLED {
        policy.check(result, op.optype(), instr)
    } else {
        Ok(result)
    }
}
