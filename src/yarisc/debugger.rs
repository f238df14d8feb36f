use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use crate::yarisc::machine::RegistersView;
use crate::yarisc::memory::MemoryView;
use crate::yarisc::types::{Address, Word};

/// Shared handle to the debugger.
///
/// Execution and rendering never run concurrently, so the debugger is
/// shared with plain interior mutability. The handle must outlive every
/// machine state that keeps a back-reference to it.
pub type DebuggerHandle = Rc<RefCell<Debugger>>;

/// Debugger state used by the machine.
///
/// The execution core writes the diagnostic message and the sticky panic
/// flag through the debug policy; the front-end reads them between steps.
/// Code breakpoints fire before an instruction at the address is fetched,
/// data breakpoints veto loads and stores that touch the address.
#[derive(Debug, Default)]
pub struct Debugger {
    panic: bool,
    message: String,

    code_breakpoints: BTreeSet<Address>,
    data_breakpoints: BTreeSet<Address>,
}

impl Debugger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a debugger behind a shared handle.
    pub fn handle() -> DebuggerHandle {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Returns whether there was a panic.
    pub fn panic(&self) -> bool {
        self.panic
    }

    /// Returns the current message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Resets the current message.
    pub fn reset_message(&mut self) {
        self.message.clear();
    }

    /// Resets the current message and the panic flag.
    pub fn reset_panic(&mut self) {
        self.reset_message();
        self.panic = false;
    }

    /// Stores a debug message.
    pub fn store_message(&mut self, msg: String) {
        self.message = msg;
    }

    /// Stores a panic message and sets the sticky panic flag.
    pub fn store_panic(&mut self, msg: String) {
        self.panic = true;
        self.message = msg;
    }

    pub fn set_code_breakpoint(&mut self, address: Address) {
        self.code_breakpoints.insert(address);
    }

    pub fn clear_code_breakpoint(&mut self, address: Address) {
        self.code_breakpoints.remove(&address);
    }

    pub fn has_code_breakpoint(&self, address: Address) -> bool {
        self.code_breakpoints.contains(&address)
    }

    pub fn set_data_breakpoint(&mut self, address: Address) {
        self.data_breakpoints.insert(address);
    }

    pub fn clear_data_breakpoint(&mut self, address: Address) {
        self.data_breakpoints.remove(&address);
    }

    pub fn has_data_breakpoint(&self, address: Address, _value: Word) -> bool {
        self.data_breakpoints.contains(&address)
    }
}

/// A debugger view is used to output the debug state of the machine.
///
/// The current and previous register/memory pairs drive the diff
/// highlighting; `info` and `error` feed the message line.
#[derive(Debug, Clone, Copy)]
pub struct DebuggerView<'a> {
    pub current_registers: RegistersView,
    pub current_memory: MemoryView<'a>,

    pub previous_registers: RegistersView,
    pub previous_memory: MemoryView<'a>,

    pub info: &'a str,
    pub error: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_flag_is_sticky_until_reset() {
        let mut dbg = Debugger::new();
        assert!(!dbg.panic());

        dbg.store_panic("boom".to_string());
        assert!(dbg.panic());
        assert_eq!(dbg.message(), "boom");

        dbg.reset_message();
        assert!(dbg.panic());
        assert_eq!(dbg.message(), "");

        dbg.reset_panic();
        assert!(!dbg.panic());
    }

    #[test]
    fn breakpoints_are_per_address() {
        let mut dbg = Debugger::new();
        dbg.set_code_breakpoint(0x10);
        dbg.set_data_breakpoint(0x20);

        assert!(dbg.has_code_breakpoint(0x10));
        assert!(!dbg.has_code_breakpoint(0x20));
        assert!(dbg.has_data_breakpoint(0x20, 0));
        assert!(!dbg.has_data_breakpoint(0x10, 0));

        dbg.clear_code_breakpoint(0x10);
        assert!(!dbg.has_code_breakpoint(0x10));
    }
}
