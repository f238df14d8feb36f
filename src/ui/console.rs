//! Interactive debugger session on the terminal.
//!
//! Drives the machine with single-character commands, redrawing a full
//! debugger frame (register diff, memory window diff, message line) after
//! every command. Panic diagnostics stay on screen until the machine is
//! reset or a new image is loaded; other messages are cleared by the next
//! command.

use std::fmt::Write as _;
use std::io::{self, Write as _};
use std::path::Path;

use crossterm::cursor::{MoveTo, MoveUp};
use crossterm::terminal::{Clear, ClearType};

use crate::yarisc::color::{ColorContext, OutputFormat};
use crate::yarisc::debugger::{DebuggerHandle, DebuggerView};
use crate::yarisc::machine::{ExecutionMode, Machine, MachineState, RegistersView};
use crate::yarisc::memory::MemoryView;
use crate::yarisc::render::render_debugger_view;
use crate::yarisc::types::Address;

const INFO_MESSAGE: &str = "Type 'h' for a list of commands";
const HELP_MESSAGE: &str =
    "Commands: h: help, hh: more help, e: exit, r: reset, l <path>: load image";
const MORE_HELP_MESSAGE: &str = "Commands: s: single step, x: execute";

const FINISHED_MESSAGE: &str = "Program has finished";

/// Base address of the observed memory window.
const MEMORY_DEBUG_BASE: Address = 0;
/// Size of the observed memory window in bytes.
const MEMORY_DEBUG_SIZE: usize = 256;

/// One debugging session: messages plus the previous-step snapshot the
/// renderer diffs against.
struct Session {
    finished: bool,
    clear_display: bool,
    message_displayed: bool,

    info_message: String,
    error_message: String,

    previous_state: MachineState,
    previous_memory: Vec<u8>,
}

impl Session {
    fn new() -> Self {
        Self {
            finished: false,
            clear_display: false,
            message_displayed: false,
            info_message: String::new(),
            error_message: String::new(),
            previous_state: MachineState::default(),
            previous_memory: vec![0; MEMORY_DEBUG_SIZE],
        }
    }

    fn display(&mut self, machine: &Machine, ctx: &mut ColorContext) -> io::Result<()> {
        let current_registers = machine.state_view();
        let current_memory = machine.memory_view(MEMORY_DEBUG_BASE as usize, MEMORY_DEBUG_SIZE);

        let previous_registers = RegistersView::new(&self.previous_state.reg);
        let previous_memory = MemoryView::new(
            &self.previous_memory,
            MEMORY_DEBUG_BASE,
            Some(&self.previous_state),
        );

        let info = if self.info_message.is_empty() && self.error_message.is_empty() {
            INFO_MESSAGE
        } else {
            self.info_message.as_str()
        };

        let view = DebuggerView {
            current_registers,
            current_memory,
            previous_registers,
            previous_memory,
            info,
            error: &self.error_message,
        };

        // Accumulate the whole frame and write it in one go; this keeps
        // the redraw flicker-free.
        let mut out = String::new();

        if ctx.enabled() {
            let _ = write!(out, "{}", MoveTo(0, 0));
            if self.clear_display {
                let _ = write!(out, "{}", Clear(ClearType::All));
            }
        }

        render_debugger_view(&mut out, &view, ctx);

        let mut stdout = io::stdout();
        stdout.write_all(out.as_bytes())?;
        stdout.flush()?;

        self.clear_display = false;
        self.message_displayed = true;

        Ok(())
    }

    fn execute(
        &mut self,
        machine: &mut Machine,
        mode: ExecutionMode,
        debugger: &DebuggerHandle,
    ) -> crate::yarisc::Result<()> {
        if self.check_execute(machine) {
            let halted = machine.execute(mode)?;

            self.finished = halted || debugger.borrow().panic();
        }

        Ok(())
    }

    fn execute_steps(
        &mut self,
        machine: &mut Machine,
        mode: ExecutionMode,
        debugger: &DebuggerHandle,
        steps: u64,
    ) -> crate::yarisc::Result<()> {
        if steps > 0 && self.check_execute(machine) {
            let (halted, _executed) = machine.execute_steps(steps, mode)?;

            self.finished = halted || debugger.borrow().panic();
        }

        Ok(())
    }

    fn check_execute(&mut self, machine: &Machine) -> bool {
        if self.finished {
            self.error_message = FINISHED_MESSAGE.to_string();

            return false;
        }

        self.reset_messages();
        self.update_state(machine);

        true
    }

    fn update_state(&mut self, machine: &Machine) {
        self.previous_state = machine.state().clone();

        let data = machine.main_memory().data();
        let base = MEMORY_DEBUG_BASE as usize;
        let end = (base + MEMORY_DEBUG_SIZE).min(data.len());

        self.previous_memory.fill(0);
        self.previous_memory[..end.saturating_sub(base)].copy_from_slice(&data[base..end]);
    }

    fn update_messages(&mut self, debugger: &DebuggerHandle) {
        if self.message_displayed || (self.info_message.is_empty() && self.error_message.is_empty())
        {
            let mut debugger = debugger.borrow_mut();

            if debugger.panic() {
                // The panic message is sticky; don't reset it here.
                self.error_message = debugger.message().to_string();
            } else if self.info_message.is_empty() {
                self.info_message = debugger.message().to_string();
                debugger.reset_message();
            }

            if self.finished && self.info_message.is_empty() && self.error_message.is_empty() {
                self.info_message = FINISHED_MESSAGE.to_string();
            }
        }
    }

    fn set_info_message(&mut self, msg: String) {
        self.info_message = msg;
        self.message_displayed = false;
    }

    fn set_error_message(&mut self, msg: String) {
        self.error_message = msg;
        self.message_displayed = false;
    }

    fn reset_messages(&mut self) {
        self.info_message.clear();
        self.error_message.clear();
    }
}

/// Runs the interactive session until the user exits.
///
/// Always reports true: any breakpoint was seen and handled by the user.
pub fn run(
    machine: &mut Machine,
    debugger: &DebuggerHandle,
    mode: ExecutionMode,
) -> anyhow::Result<bool> {
    let mut session = Session::new();
    let mut already_clear = true;

    session.clear_display = true;

    loop {
        let mut ctx = ColorContext::new(OutputFormat::Console);

        session.display(machine, &mut ctx)?;

        let (exit, steps) = user_prompt(machine, debugger, &mut session, &ctx, &mut already_clear)?;

        if exit {
            session.display(machine, &mut ctx)?;
            break;
        }

        match steps {
            None => session.execute(machine, mode, debugger)?,
            Some(steps) => session.execute_steps(machine, mode, debugger, steps)?,
        }

        session.update_messages(debugger);
    }

    Ok(true)
}

fn user_prompt(
    machine: &mut Machine,
    debugger: &DebuggerHandle,
    session: &mut Session,
    ctx: &ColorContext,
    already_clear: &mut bool,
) -> io::Result<(bool, Option<u64>)> {
    let mut stdout = io::stdout();
    write!(stdout, "\n$ ")?;
    stdout.flush()?;

    let mut line = String::new();
    if io::stdin().read_line(&mut line)? == 0 {
        // End of input: leave the session.
        return Ok((true, Some(0)));
    }
    let command = line.trim_end_matches(['\r', '\n']);

    session.reset_messages();

    let mut exit = false;
    let mut steps = Some(0);

    if command.is_empty() {
        if !*already_clear {
            session.clear_display = true;
            *already_clear = true;
        }
    } else {
        // Go up one line and blank out the typed command when that is safe.
        // We don't know how to backtrack over a wrapped input line, so long
        // commands redraw the whole display instead.
        if ctx.enabled() && command.len() < 60 {
            writeln!(stdout, "{}$ {}", MoveUp(1), " ".repeat(command.len()))?;
            *already_clear = false;
        } else {
            session.clear_display = true;
            *already_clear = true;
        }

        match command {
            "h" => session.set_info_message(HELP_MESSAGE.to_string()),
            "hh" => session.set_info_message(MORE_HELP_MESSAGE.to_string()),
            "e" => exit = true,
            "s" => steps = Some(1),
            "x" => steps = None,
            "r" => reset_machine(machine, debugger, session, None),
            "l" => session.set_error_message(
                "Load command expects an image file path: l path/to/image".to_string(),
            ),
            _ if command.starts_with("l ") => {
                let path = command[2..].to_string();
                reset_machine(machine, debugger, session, Some(&path));
            }
            _ => session.set_error_message(format!("Unknown command: {command}")),
        }
    }

    Ok((exit, steps))
}

fn reset_machine(
    machine: &mut Machine,
    debugger: &DebuggerHandle,
    session: &mut Session,
    image: Option<&str>,
) {
    *session = Session::new();

    machine.reset();
    debugger.borrow_mut().reset_panic();

    match image {
        Some(path) if !path.is_empty() => match machine.load_image(Path::new(path)) {
            Ok(()) => {
                log::info!("loaded image {path}");

                session.update_state(machine);
                session.set_info_message(format!("Image {path} loaded successfully"));
            }
            Err(err) => {
                session.update_state(machine);
                session.set_error_message(format!("Error: {err}"));
            }
        },
        Some(_) => session.set_error_message("No image file given".to_string()),
        None => session.set_info_message("Reset to initial state".to_string()),
    }
}
