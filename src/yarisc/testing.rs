//! Shared test machine for instruction-level tests.

use std::fmt;

use crate::yarisc::debugger::{Debugger, DebuggerHandle};
use crate::yarisc::disasm::disassemble;
use crate::yarisc::exec::{
    execute_instruction, DebugExecution, ExecuteResult, ExecutionPolicy, StrictExecution,
};
use crate::yarisc::instruction::FEATURE_LEVEL_LATEST;
use crate::yarisc::machine::{MachineMemory, MachineRegisters};
use crate::yarisc::memory::Memory;
use crate::yarisc::registers::StatusRegister;
use crate::yarisc::types::{Address, Word, WORD_SIZE};

pub const STATUS_C: Word = StatusRegister::CARRY_FLAG;
pub const STATUS_Z: Word = StatusRegister::ZERO_FLAG;
pub const STATUS_ZC: Word = StatusRegister::ZERO_FLAG | StatusRegister::CARRY_FLAG;

const DEFAULT_MEMORY_SIZE: usize = 0x100;

/// Machine fixture with a recognisable register and memory pattern.
///
/// Instructions execute under the strict policy with a debugger attached;
/// panics and breakpoints fail the test unless explicitly expected.
#[derive(Clone)]
pub struct TestMachine {
    pub registers: MachineRegisters,
    pub memory: MachineMemory,

    debugger: DebuggerHandle,
}

impl TestMachine {
    pub const INITIAL_SP: Word = 0x5f;
    pub const INITIAL_IP: Word = 0x2a;

    pub fn new() -> Self {
        Self::with_memory_size(DEFAULT_MEMORY_SIZE)
    }

    pub fn max_memory() -> Self {
        Self::with_memory_size(crate::yarisc::memory::MAX_MEMORY)
    }

    fn with_memory_size(size: usize) -> Self {
        let mut named = crate::yarisc::registers::Registers::default();
        named.set_r0(0xa9b4);
        named.set_r1(0x1172);
        named.set_r2(0x30cc);
        named.set_r3(0x6ce5);
        named.set_r4(0x8bd3);
        named.set_r5(0xf196);
        named.set_sp(Self::INITIAL_SP);
        named.set_ip(Self::INITIAL_IP);

        let mut main = Memory::with_size(size);
        for (i, byte) in main.data_mut().iter_mut().enumerate() {
            *byte = i as u8;
        }

        Self {
            registers: MachineRegisters {
                named,
                status: StatusRegister::default(),
            },
            memory: MachineMemory { main },
            debugger: Debugger::handle(),
        }
    }

    pub fn with_instruction(word: Word) -> Self {
        let mut machine = Self::new();
        machine.store_instruction(&[word]);
        machine
    }

    pub fn with_instruction_pair(word0: Word, word1: Word) -> Self {
        let mut machine = Self::new();
        machine.store_instruction(&[word0, word1]);
        machine
    }

    pub fn max_with_instruction(word: Word) -> Self {
        let mut machine = Self::max_memory();
        machine.store_instruction(&[word]);
        machine
    }

    pub fn max_with_instruction_pair(word0: Word, word1: Word) -> Self {
        let mut machine = Self::max_memory();
        machine.store_instruction(&[word0, word1]);
        machine
    }

    fn store_instruction(&mut self, words: &[Word]) {
        let ip = self.registers.named.ip() as usize;
        for (i, &word) in words.iter().enumerate() {
            assert!(self.store(ip + i * WORD_SIZE, word));
        }
    }

    pub fn debugger(&self) -> &DebuggerHandle {
        &self.debugger
    }

    /// Loads the word at `off`; out-of-range reads as `0xffff` so that
    /// comparisons against stale expectations fail loudly.
    pub fn load(&self, off: usize) -> Word {
        if off + WORD_SIZE <= self.memory.main.len() {
            self.memory.main.load(off as Address)
        } else {
            0xffff
        }
    }

    pub fn store(&mut self, off: usize, word: Word) -> bool {
        if off + WORD_SIZE > self.memory.main.len() {
            return false;
        }

        self.memory.main.store(off as Address, word);

        true
    }

    pub fn set_status(&mut self, word: Word) {
        self.registers.status.s = word;
    }

    pub fn clear_status(&mut self) {
        self.registers.status.s = 0x0;
    }

    pub fn set_r0(&mut self, word: Word) {
        self.registers.named.set_r0(word);
    }

    pub fn set_r1(&mut self, word: Word) {
        self.registers.named.set_r1(word);
    }

    pub fn set_r2(&mut self, word: Word) {
        self.registers.named.set_r2(word);
    }

    pub fn set_r3(&mut self, word: Word) {
        self.registers.named.set_r3(word);
    }

    pub fn set_r4(&mut self, word: Word) {
        self.registers.named.set_r4(word);
    }

    pub fn set_r5(&mut self, word: Word) {
        self.registers.named.set_r5(word);
    }

    pub fn set_sp(&mut self, word: Word) {
        self.registers.named.set_sp(word);
    }

    pub fn set_ip(&mut self, word: Word) {
        self.registers.named.set_ip(word);
    }

    pub fn advance_ip(&mut self, num_words: Word) {
        let ip = self.registers.named.ip();
        self.registers
            .named
            .set_ip(ip.wrapping_add(num_words * WORD_SIZE as Word));
    }

    /// Executes one instruction, returning the raw result.
    pub fn execute_raw(&mut self) -> ExecuteResult {
        let mut policy = ExecutionPolicy::new(
            DebugExecution::new(self.debugger.clone()),
            StrictExecution,
            FEATURE_LEVEL_LATEST,
        );

        execute_instruction(&mut policy, &mut self.registers, &mut self.memory)
            .expect("the debug policy reports panics as breakpoints")
    }

    /// Executes one instruction; panics and breakpoints fail the test.
    pub fn execute_instruction(&mut self) -> bool {
        let result = self.execute_raw();

        let message = {
            let debugger = self.debugger.borrow();
            debugger.panic().then(|| debugger.message().to_string())
        };
        if let Some(message) = message {
            panic!("{message}");
        }
        if result.breakpoint {
            panic!("breakpoint");
        }

        result.keep_going
    }

    /// Executes one instruction that is expected to panic; returns the
    /// stored diagnostic.
    pub fn execute_expect_panic(&mut self) -> String {
        let result = self.execute_raw();
        assert!(result.breakpoint, "expected a breakpoint result");

        let debugger = self.debugger.borrow();
        assert!(debugger.panic(), "expected a stored panic");
        debugger.message().to_string()
    }

    pub fn disassemble_instruction(&self, expected_words: usize) -> String {
        let ip = self.registers.named.ip() as usize;

        let result = disassemble(self.load(ip), self.load(ip + WORD_SIZE), FEATURE_LEVEL_LATEST);

        assert_ne!(result.words, 0, "{}", result.text);
        assert_eq!(result.words, expected_words, "wrong number of instruction words");

        result.text
    }
}

impl Default for TestMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for TestMachine {
    fn eq(&self, other: &Self) -> bool {
        self.registers == other.registers && self.memory == other.memory
    }
}

impl fmt::Debug for TestMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestMachine")
            .field("registers", &self.registers.named)
            .field("status", &self.registers.status)
            .field("memory_len", &self.memory.main.len())
            .finish()
    }
}
