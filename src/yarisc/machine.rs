//! The machine model: state, memory, snapshots and the step controller.

use std::path::Path;

use crate::yarisc::debugger::DebuggerHandle;
use crate::yarisc::errors::Result;
use crate::yarisc::exec::{
    execute_instruction, DebugExecution, DebugPolicy, ExecuteResult, ExecutionPolicy, NoopDebug,
    NoopStrict, StrictExecution, StrictPolicy,
};
use crate::yarisc::instruction::{FeatureLevel, FEATURE_LEVEL_LATEST};
use crate::yarisc::memory::{Memory, MemoryView};
use crate::yarisc::registers::{Registers, StatusRegister};
use crate::yarisc::types::{is_aligned, Address, Word, WORD_SIZE};

/// Execution mode of the step drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// No additional checks.
    Normal,
    /// Adds runtime checks: unassigned instruction bits must be zero and
    /// loads and stores must be word-aligned and in range.
    Strict,
}

/// All CPU internal registers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MachineRegisters {
    /// Named registers `r0`..`r5`, `sp`, `ip`.
    pub named: Registers,
    /// Status register.
    pub status: StatusRegister,
}

/// All CPU external memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MachineMemory {
    /// Main memory.
    pub main: Memory,
}

/// Machine state that is copied from one step to another in single-step
/// debugging.
///
/// The debugger handle is the only reference-semantics part of the machine:
/// copies of the state share it, and it must outlive every copy that keeps
/// the back-reference.
#[derive(Debug, Clone, Default)]
pub struct MachineState {
    pub reg: MachineRegisters,
    pub debug: Option<DebuggerHandle>,
}

/// A registers view is used to output the registers.
///
/// The copy of the current instruction words is read with modular
/// addressing so that taking a snapshot never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistersView {
    /// Copy of the named registers.
    pub named: Registers,
    /// Copy of the status register.
    pub status: StatusRegister,
    /// Current instruction words, if they could be fetched.
    pub instruction: Option<[Word; 2]>,
}

impl RegistersView {
    /// Creates a view from a copy of the given machine registers.
    pub fn new(reg: &MachineRegisters) -> Self {
        Self {
            named: reg.named,
            status: reg.status,
            instruction: None,
        }
    }

    /// Creates a view that also captures the two instruction words at `ip`.
    pub fn with_instruction(reg: &MachineRegisters, mem: &MachineMemory) -> Self {
        let mut view = Self::new(reg);

        if !mem.main.is_empty() && is_aligned(reg.named.ip() as usize) {
            let size = mem.main.len();
            let address = reg.named.ip() as usize;

            view.instruction = Some([
                mem.main.load((address % size) as Address),
                mem.main.load(((address + WORD_SIZE) % size) as Address),
            ]);
        }

        view
    }
}

/// Full description of the machine: CPU internal state plus main memory.
///
/// The machine latches a clean halt: once a HLT instruction has been
/// executed, further driver calls are no-ops until [`Machine::reset`].
#[derive(Debug)]
pub struct Machine {
    state: MachineState,
    mem: MachineMemory,
    halted: bool,

    level: FeatureLevel,
    debugger: Option<DebuggerHandle>,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new(FEATURE_LEVEL_LATEST)
    }
}

impl Machine {
    /// Creates a machine in the initial state.
    pub fn new(level: FeatureLevel) -> Self {
        Self {
            state: MachineState::default(),
            mem: MachineMemory::default(),
            halted: false,
            level,
            debugger: None,
        }
    }

    /// Creates a machine in the initial state with a debugger attached.
    pub fn with_debugger(debugger: DebuggerHandle, level: FeatureLevel) -> Self {
        let mut machine = Self::new(level);
        machine.state.debug = Some(debugger.clone());
        machine.debugger = Some(debugger);
        machine
    }

    pub fn level(&self) -> FeatureLevel {
        self.level
    }

    /// Returns the state of the machine.
    pub fn state(&self) -> &MachineState {
        &self.state
    }

    /// Returns the state of the machine for output.
    pub fn state_view(&self) -> RegistersView {
        RegistersView::with_instruction(&self.state.reg, &self.mem)
    }

    pub fn registers_mut(&mut self) -> &mut MachineRegisters {
        &mut self.state.reg
    }

    /// Returns the main memory of the machine.
    pub fn main_memory(&self) -> &Memory {
        &self.mem.main
    }

    pub fn main_memory_mut(&mut self) -> &mut Memory {
        &mut self.mem.main
    }

    /// Returns a view into main memory with a state back-reference for
    /// register-address highlighting.
    pub fn memory_view(&self, off: usize, size: usize) -> MemoryView<'_> {
        self.mem.main.sub(off, size, Some(&self.state))
    }

    /// Returns whether the machine has executed a halt instruction.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Loads an image file into main memory.
    ///
    /// If the image is smaller than main memory only the bytes of the image
    /// are written; reset the machine first for a clean load.
    pub fn load_image(&mut self, image: &Path) -> Result<()> {
        let bytes = std::fs::read(image)?;

        self.load_image_bytes(&bytes)
    }

    /// Copies a flat byte image into main memory starting at address zero.
    pub fn load_image_bytes(&mut self, image: &[u8]) -> Result<()> {
        self.mem.main.load_image(image)
    }

    /// Executes until a halt instruction is executed or a debugger
    /// breakpoint is hit.
    ///
    /// Returns true if halted, false on a breakpoint.
    pub fn execute(&mut self, mode: ExecutionMode) -> Result<bool> {
        if self.halted {
            return Ok(true);
        }

        let (result, _) = self.run(mode, None)?;

        let halted = !result.breakpoint;
        if halted {
            self.halted = true;
        }

        Ok(halted)
    }

    /// Executes up to `steps` instructions.
    ///
    /// Returns whether the machine halted cleanly and the number of
    /// executed steps.
    pub fn execute_steps(&mut self, steps: u64, mode: ExecutionMode) -> Result<(bool, u64)> {
        if steps == 0 {
            return Ok((false, 0));
        }
        if self.halted {
            return Ok((true, 0));
        }

        let (result, executed) = self.run(mode, Some(steps))?;

        let halted = !result.keep_going && !result.breakpoint;
        if halted {
            self.halted = true;
        }

        Ok((halted, executed))
    }

    /// Resets the machine to the initial state, keeping the debugger.
    pub fn reset(&mut self) {
        self.state.reg = MachineRegisters::default();
        self.mem.main.clear();
        self.halted = false;
    }

    /// Resolves the four (debug × strict) policy combinations once per run.
    fn run(&mut self, mode: ExecutionMode, steps: Option<u64>) -> Result<(ExecuteResult, u64)> {
        let debugger = self.debugger.clone();

        match (mode, debugger) {
            (ExecutionMode::Strict, Some(dbg)) => self.run_policy(
                ExecutionPolicy::new(DebugExecution::new(dbg), StrictExecution, self.level),
                steps,
            ),
            (ExecutionMode::Strict, None) => self.run_policy(
                ExecutionPolicy::new(NoopDebug, StrictExecution, self.level),
                steps,
            ),
            (ExecutionMode::Normal, Some(dbg)) => self.run_policy(
                ExecutionPolicy::new(DebugExecution::new(dbg), NoopStrict, self.level),
                steps,
            ),
            (ExecutionMode::Normal, None) => self.run_policy(
                ExecutionPolicy::new(NoopDebug, NoopStrict, self.level),
                steps,
            ),
        }
    }

    fn run_policy<D: DebugPolicy, S: StrictPolicy>(
        &mut self,
        mut policy: ExecutionPolicy<D, S>,
        steps: Option<u64>,
    ) -> Result<(ExecuteResult, u64)> {
        let limit = steps.unwrap_or(u64::MAX);

        let mut result = ExecuteResult::CONTINUE;
        let mut executed = 0;

        while executed < limit {
            result = execute_instruction(&mut policy, &mut self.state.reg, &mut self.mem)?;
            executed += 1;

            if !result.keep_going {
                break;
            }
        }

        Ok((result, executed))
    }
}
