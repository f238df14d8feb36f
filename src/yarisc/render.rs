//! Diff renderer for the registers view, the memory window and the full
//! debugger frame.
//!
//! Rendering is a pure function of (current view, previous view, colour
//! context) into a string buffer. Fields render in one of three modes:
//! unchanged values use the normal colours, changed values get a
//! per-character diff (matching characters muted, differing characters
//! bright), and values with no previous counterpart render entirely in the
//! diff colour. Rendering a view against itself is byte-identical to
//! rendering the view alone.

use std::fmt::Write;

use crate::yarisc::color::{
    ColorContext, DIFF_COLOR, DIFF_MUTED_COLOR, REGISTER_BACKGROUNDS, TEXT_MUTED_COLOR,
    VALUE_COLOR,
};
use crate::yarisc::debugger::DebuggerView;
use crate::yarisc::disasm::disassemble;
use crate::yarisc::instruction::FEATURE_LEVEL_LATEST;
use crate::yarisc::machine::{MachineState, RegistersView};
use crate::yarisc::memory::MemoryView;
use crate::yarisc::registers::{StatusRegister, REG_NAMES};
use crate::yarisc::types::{Address, Word, NUM_REGISTERS, WORD_SIZE};

/// Words per memory line.
const LINE_WORDS: usize = 8;
const LINE_BYTES: usize = LINE_WORDS * WORD_SIZE;

const REGISTERS_PREAMBLE: &str = "Register: ";
const INSTRUCTION_PREAMBLE: &str = "Next:     ";
const INSTRUCTION_FIELD_WIDTH: usize = 30;

const ARGUMENT_SEP: &str = ", ";

const MESSAGE_WIDTH: usize = 80;

fn push_printable(out: &mut String, byte: u8) {
    out.push(if (32..=126).contains(&byte) {
        byte as char
    } else {
        '.'
    });
}

fn push_filtered(out: &mut String, bytes: &[u8]) {
    for &byte in bytes {
        push_printable(out, byte);
    }
}

/// Writes a per-character diff of `current` against `previous`.
///
/// Matching characters use the muted colour (white for text-only fields,
/// red for numeric ones), differing characters the bright diff colour. With
/// an empty previous rendering the whole field is bright.
fn put_diff(out: &mut String, current: &[u8], previous: &[u8], ctx: &mut ColorContext, diff_only: bool) {
    if current.is_empty() {
        return;
    }

    let diff_len = current.len().min(previous.len());

    if diff_len == 0 {
        ctx.foreground(out, DIFF_COLOR);
        push_filtered(out, current);
        ctx.reset(out);
        return;
    }

    let muted = if diff_only {
        TEXT_MUTED_COLOR
    } else {
        DIFF_MUTED_COLOR
    };

    let mut previous_diff = None;

    for i in 0..diff_len {
        let differs = current[i] != previous[i];

        if previous_diff != Some(differs) {
            ctx.foreground(out, if differs { DIFF_COLOR } else { muted });
            previous_diff = Some(differs);
        }

        push_printable(out, current[i]);
    }

    ctx.reset(out);

    if diff_len < current.len() {
        push_filtered(out, &current[diff_len..]);
    }
}

// ---------- Registers ----------

fn put_hex_word(out: &mut String, value: Word, ctx: &mut ColorContext) {
    ctx.foreground(out, VALUE_COLOR);
    let _ = write!(out, "0x{value:04x}");
    ctx.reset(out);
}

fn put_hex_word_diff(out: &mut String, current: Word, previous: Word, ctx: &mut ColorContext) {
    if current == previous || !ctx.enabled() {
        put_hex_word(out, current, ctx);
    } else {
        let current = format!("0x{current:04x}");
        let previous = format!("0x{previous:04x}");

        put_diff(out, current.as_bytes(), previous.as_bytes(), ctx, false);
    }
}

fn put_register_field(
    out: &mut String,
    index: usize,
    current: Word,
    previous: Option<Word>,
    ctx: &mut ColorContext,
) {
    let (color, enabled) = REGISTER_BACKGROUNDS[index];
    if enabled {
        ctx.background(out, color);
    }

    match previous {
        Some(previous) => put_hex_word_diff(out, current, previous, ctx),
        None => put_hex_word(out, current, ctx),
    }
}

/// Full status text as used for diffing.
fn status_string(status: Word) -> String {
    let mut text = String::new();

    if (status & !StatusRegister::MASK) != 0 {
        // Stray bits: render the whole register in binary with the carry
        // and zero positions substituted by their letters.
        text.push_str("status: 0b");
        push_status_bits(&mut text, status);
    } else {
        text.push_str("                status: ");
        push_status_letters(&mut text, status);
    }

    text
}

fn push_status_bits(out: &mut String, status: Word) {
    for i in (0u32..16).rev() {
        let set = (status >> i) & 0x1 != 0;

        out.push(match i {
            i if i == StatusRegister::CARRY_POS => if set { 'C' } else { '0' },
            i if i == StatusRegister::ZERO_POS => if set { 'Z' } else { '0' },
            _ => if set { '1' } else { '0' },
        });
    }
}

fn push_status_letters(out: &mut String, status: Word) {
    out.push(if (status & StatusRegister::ZERO_FLAG) != 0 { 'Z' } else { '0' });
    out.push(if (status & StatusRegister::CARRY_FLAG) != 0 { 'C' } else { '0' });
}

fn put_status(out: &mut String, status: Word, ctx: &mut ColorContext) {
    if (status & !StatusRegister::MASK) != 0 {
        out.push_str("status: ");
        ctx.foreground(out, VALUE_COLOR);
        out.push_str("0b");
        push_status_bits(out, status);
        ctx.reset(out);
    } else {
        out.push_str("                status: ");
        ctx.foreground(out, VALUE_COLOR);
        push_status_letters(out, status);
        ctx.reset(out);
    }
}

fn put_status_diff(out: &mut String, current: Word, previous: Word, ctx: &mut ColorContext) {
    if current == previous || !ctx.enabled() {
        put_status(out, current, ctx);
    } else {
        // The status letters are a text field: only differing characters
        // are highlighted.
        put_diff(
            out,
            status_string(current).as_bytes(),
            status_string(previous).as_bytes(),
            ctx,
            true,
        );
    }
}

fn render_registers_impl(
    out: &mut String,
    current: &RegistersView,
    previous: Option<&RegistersView>,
    ctx: &mut ColorContext,
) {
    out.push_str(REGISTERS_PREAMBLE);

    for i in 0..6 {
        let _ = write!(out, "{}: ", REG_NAMES[i]);
        put_register_field(out, i, current.named.r[i], previous.map(|p| p.named.r[i]), ctx);

        if i < 5 {
            out.push_str(ARGUMENT_SEP);
        }
    }

    out.push('\n');

    // The disassembled next instruction lives in a fixed-width field so
    // that the status and pointer columns stay aligned.
    let mut field = String::new();

    if let Some(words) = current.instruction {
        let result = disassemble(words[0], words[1], FEATURE_LEVEL_LATEST);

        if result.words > 0 {
            field.push_str(INSTRUCTION_PREAMBLE);
            field.push_str(&result.text);
        }
    }

    field.truncate(INSTRUCTION_FIELD_WIDTH);
    while field.len() < INSTRUCTION_FIELD_WIDTH {
        field.push(' ');
    }

    out.push_str(&field);

    match previous {
        Some(p) => put_status_diff(out, current.status.s, p.status.s, ctx),
        None => put_status(out, current.status.s, ctx),
    }

    out.push_str(ARGUMENT_SEP);
    out.push_str("sp: ");
    put_register_field(out, 6, current.named.sp(), previous.map(|p| p.named.sp()), ctx);
    out.push_str(ARGUMENT_SEP);
    out.push_str("ip: ");
    put_register_field(out, 7, current.named.ip(), previous.map(|p| p.named.ip()), ctx);

    out.push('\n');
}

/// Renders the registers view.
pub fn render_registers(out: &mut String, view: &RegistersView, ctx: &mut ColorContext) {
    render_registers_impl(out, view, None, ctx);
}

/// Renders the registers view, highlighting changes against `previous`.
pub fn render_registers_diff(
    out: &mut String,
    current: &RegistersView,
    previous: &RegistersView,
    ctx: &mut ColorContext,
) {
    if ctx.enabled() {
        render_registers_impl(out, current, Some(previous), ctx);
    } else {
        render_registers_impl(out, current, None, ctx);
    }
}

// ---------- Memory ----------

/// Trims `previous` to its overlap with `current`.
///
/// Returns `None` if the views do not overlap or the overlapping bytes are
/// equal, in which case no diff highlighting is needed.
fn adjust_previous<'a>(current: &MemoryView<'a>, previous: &MemoryView<'a>) -> Option<MemoryView<'a>> {
    let current_first = current.base() as usize;
    let current_last = current_first + current.len();

    let previous_first = previous.base() as usize;
    let previous_last = previous_first + previous.len();

    let overlap_first = current_first.max(previous_first);
    let overlap_last = current_last.min(previous_last);

    if overlap_first < overlap_last {
        let size = overlap_last - overlap_first;

        let current_off = overlap_first - current_first;
        let previous_off = overlap_first - previous_first;

        if current.data()[current_off..current_off + size]
            != previous.data()[previous_off..previous_off + size]
        {
            return Some(previous.sub(previous_off, size));
        }
    }

    None
}

fn put_address_background(
    out: &mut String,
    ctx: &mut ColorContext,
    address: Address,
    state: &MachineState,
) {
    // The instruction pointer takes precedence over all other registers.
    const ORDER: [usize; NUM_REGISTERS] = [7, 0, 1, 2, 3, 4, 5, 6];

    for index in ORDER {
        let (color, enabled) = REGISTER_BACKGROUNDS[index];

        if enabled && state.reg.named.r[index] == address {
            ctx.background(out, color);
            return;
        }
    }
}

fn put_word_bytes(out: &mut String, b0: u8, b1: u8, ctx: &mut ColorContext) {
    ctx.foreground(out, VALUE_COLOR);
    let _ = write!(out, "{b0:02x}");
    out.push(' ');
    ctx.foreground(out, TEXT_MUTED_COLOR);
    let _ = write!(out, "{b1:02x}");
    ctx.reset(out);
}

fn put_line(
    out: &mut String,
    line: &MemoryView<'_>,
    previous: Option<&MemoryView<'_>>,
    ctx: &mut ColorContext,
) {
    let _ = write!(out, "0x{:04x}: ", line.base());

    let overlap = previous.and_then(|p| adjust_previous(line, p));
    let state = line.state();

    let mut current_chars: Vec<u8> = Vec::with_capacity(line.len());
    let mut previous_chars: Vec<u8> = Vec::with_capacity(line.len());

    for i in (0..line.len()).step_by(WORD_SIZE) {
        let address = line.base().wrapping_add(i as Address);

        let b0 = line.byte(i);
        let b1 = line.byte(i + 1);
        current_chars.push(b0);
        current_chars.push(b1);

        let previous_word = overlap.as_ref().and_then(|p| {
            let start = p.base() as usize;
            let addr = address as usize;

            if addr >= start && addr + WORD_SIZE <= start + p.len() {
                Some((p.byte(addr - start), p.byte(addr - start + 1)))
            } else {
                None
            }
        });

        match previous_word {
            Some((p0, p1)) => {
                previous_chars.push(p0);
                previous_chars.push(p1);
            }
            None => {
                previous_chars.push(b0);
                previous_chars.push(b1);
            }
        }

        if let Some(state) = state {
            put_address_background(out, ctx, address, state);
        }

        match previous_word {
            Some((p0, p1)) if (p0, p1) != (b0, b1) => {
                let current_text = format!("{b0:02x} {b1:02x}");
                let previous_text = format!("{p0:02x} {p1:02x}");

                put_diff(
                    out,
                    current_text.as_bytes(),
                    previous_text.as_bytes(),
                    ctx,
                    false,
                );
            }
            _ => put_word_bytes(out, b0, b1, ctx),
        }

        out.push_str("  ");
    }

    if overlap.is_some() && current_chars != previous_chars {
        put_diff(out, &current_chars, &previous_chars, ctx, true);
    } else {
        push_filtered(out, &current_chars);
    }

    out.push('\n');
}

/// Renders a memory window, eight words per line with an ASCII column.
pub fn render_memory(out: &mut String, view: &MemoryView<'_>, ctx: &mut ColorContext) {
    let mut rest = *view;

    while !rest.is_empty() {
        let line = rest.sub(0, LINE_BYTES);
        put_line(out, &line, None, ctx);

        rest = rest.sub(line.len(), usize::MAX);
    }
}

/// Renders a memory window, highlighting changes against `previous`.
pub fn render_memory_diff(
    out: &mut String,
    current: &MemoryView<'_>,
    previous: &MemoryView<'_>,
    ctx: &mut ColorContext,
) {
    if !ctx.enabled() {
        render_memory(out, current, ctx);
        return;
    }

    match adjust_previous(current, previous) {
        None => render_memory(out, current, ctx),
        Some(previous) => {
            let mut rest = *current;

            while !rest.is_empty() {
                let line = rest.sub(0, LINE_BYTES);
                put_line(out, &line, Some(&previous), ctx);

                rest = rest.sub(line.len(), usize::MAX);
            }
        }
    }
}

// ---------- Debugger frame ----------

fn put_message(out: &mut String, msg: &str) {
    let mut width = 0;

    for ch in msg.chars().take(MESSAGE_WIDTH) {
        out.push(ch);
        width += 1;
    }
    for _ in width..MESSAGE_WIDTH {
        out.push(' ');
    }

    out.push('\n');
}

/// Renders a full debugger frame: register diff, memory diff and the
/// message line.
pub fn render_debugger_view(out: &mut String, view: &DebuggerView<'_>, ctx: &mut ColorContext) {
    // The instruction pointer changes with almost every step; diffing it
    // would highlight it permanently.
    let mut previous_registers = view.previous_registers;
    previous_registers.named.set_ip(view.current_registers.named.ip());

    render_registers_diff(out, &view.current_registers, &previous_registers, ctx);
    out.push('\n');

    render_memory_diff(out, &view.current_memory, &view.previous_memory, ctx);
    out.push('\n');

    // Always write a message line so stale messages get overwritten.
    if !view.error.is_empty() {
        ctx.foreground(out, DIFF_COLOR);
        put_message(out, view.error);
        ctx.reset(out);
    } else {
        put_message(out, view.info);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::yarisc::asm::{self, Operand, RegAddr};
    use crate::yarisc::machine::{MachineRegisters, RegistersView};
    use crate::yarisc::types::store_word;
    use crossterm::style::{Color, SetBackgroundColor, SetForegroundColor};

    fn registers_fixture() -> RegistersView {
        let mut reg = MachineRegisters::default();
        reg.named.set_r0(0x0001);
        reg.named.set_r1(0x0002);
        reg.named.set_r2(0x0003);
        reg.named.set_r3(0x0004);
        reg.named.set_r4(0x0005);
        reg.named.set_r5(0x0006);
        reg.named.set_sp(0x0040);
        reg.named.set_ip(0x0010);
        reg.status.set_carry(true);

        let mut view = RegistersView::new(&reg);
        view.instruction = Some([asm::mov(RegAddr::R0, Operand::Reg(RegAddr::R1)), 0x0000]);
        view
    }

    #[test]
    fn plain_registers_layout() {
        let mut out = String::new();
        render_registers(&mut out, &registers_fixture(), &mut ColorContext::plain());

        let expected = format!(
            "Register: r0: 0x0001, r1: 0x0002, r2: 0x0003, r3: 0x0004, \
             r4: 0x0005, r5: 0x0006\n\
             {:<30}                status: 0C, sp: 0x0040, ip: 0x0010\n",
            "Next:     MOV r0, r1"
        );
        assert_eq!(out, expected);
    }

    #[test]
    fn unknown_instructions_leave_the_field_blank() {
        let mut view = registers_fixture();
        view.instruction = Some([0x0000, 0x0000]);
        view.status.s = 0;

        let mut out = String::new();
        render_registers(&mut out, &view, &mut ColorContext::plain());

        let second_line = out.lines().nth(1).unwrap();
        assert!(second_line.starts_with(&" ".repeat(INSTRUCTION_FIELD_WIDTH)));
        assert!(second_line.contains("status: 00"));
    }

    #[test]
    fn stray_status_bits_render_in_binary() {
        let mut view = registers_fixture();
        view.status.s = 0x8003;

        let mut out = String::new();
        render_registers(&mut out, &view, &mut ColorContext::plain());

        assert!(out.contains("status: 0b10000000000000ZC"));
    }

    #[test]
    fn plain_diff_matches_plain_rendering() {
        let view = registers_fixture();

        let mut plain = String::new();
        render_registers(&mut plain, &view, &mut ColorContext::plain());

        let mut changed = view;
        changed.named.set_r3(0xbeef);

        // without colour there is nothing to highlight
        let mut diff = String::new();
        render_registers_diff(&mut diff, &view, &changed, &mut ColorContext::plain());

        assert_eq!(plain, diff);
    }

    #[test]
    fn rendering_against_an_identical_snapshot_is_stable() {
        let view = registers_fixture();

        let mut single = String::new();
        render_registers(&mut single, &view, &mut ColorContext::colored());

        let mut diff = String::new();
        render_registers_diff(&mut diff, &view, &view, &mut ColorContext::colored());

        assert_eq!(single, diff);
    }

    #[test]
    fn changed_registers_are_highlighted() {
        let current = registers_fixture();
        let mut previous = current;
        previous.named.set_r1(0x0072);

        let mut out = String::new();
        render_registers_diff(&mut out, &current, &previous, &mut ColorContext::colored());

        assert!(out.contains(&SetForegroundColor(DIFF_COLOR).to_string()));
        assert!(out.contains(&SetForegroundColor(DIFF_MUTED_COLOR).to_string()));
    }

    #[test]
    fn status_diff_highlights_only_the_changed_letters() {
        let current = registers_fixture();
        let mut previous = current;
        previous.status.set_carry(false);
        previous.status.set_zero(true);

        let mut out = String::new();
        render_registers_diff(&mut out, &current, &previous, &mut ColorContext::colored());

        // text fields mute matching characters in white, not red
        assert!(out.contains(&SetForegroundColor(TEXT_MUTED_COLOR).to_string()));
        assert!(out.contains(&SetForegroundColor(DIFF_COLOR).to_string()));
    }

    #[test]
    fn pointer_rows_carry_background_colours() {
        let mut out = String::new();
        render_registers(&mut out, &registers_fixture(), &mut ColorContext::colored());

        assert!(out.contains(&SetBackgroundColor(Color::DarkYellow).to_string()));
        assert!(out.contains(&SetBackgroundColor(Color::DarkGreen).to_string()));
    }

    #[test]
    fn plain_memory_layout() {
        let bytes = [0x48, 0x69, 0x00, 0x7f];
        let view = MemoryView::new(&bytes, 0, None);

        let mut out = String::new();
        render_memory(&mut out, &view, &mut ColorContext::plain());

        assert_eq!(out, "0x0000: 48 69  00 7f  Hi..\n");
    }

    #[test]
    fn memory_lines_wrap_at_eight_words() {
        let bytes = [0u8; LINE_BYTES + WORD_SIZE];
        let view = MemoryView::new(&bytes, 0x0100, None);

        let mut out = String::new();
        render_memory(&mut out, &view, &mut ColorContext::plain());

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("0x0100: "));
        assert!(lines[1].starts_with("0x0110: "));
    }

    #[test]
    fn memory_diff_against_identical_bytes_is_stable() {
        let bytes = [0x11, 0x22, 0x33, 0x44];
        let current = MemoryView::new(&bytes, 0x20, None);
        let previous = MemoryView::new(&bytes, 0x20, None);

        let mut single = String::new();
        render_memory(&mut single, &current, &mut ColorContext::colored());

        let mut diff = String::new();
        render_memory_diff(&mut diff, &current, &previous, &mut ColorContext::colored());

        assert_eq!(single, diff);
    }

    #[test]
    fn changed_memory_words_are_highlighted() {
        let current_bytes = [0x11, 0x22, 0x33, 0x44];
        let mut previous_bytes = current_bytes;
        previous_bytes[2] = 0xff;

        let current = MemoryView::new(&current_bytes, 0x20, None);
        let previous = MemoryView::new(&previous_bytes, 0x20, None);

        let mut out = String::new();
        render_memory_diff(&mut out, &current, &previous, &mut ColorContext::colored());

        assert!(out.contains(&SetForegroundColor(DIFF_COLOR).to_string()));
    }

    #[test]
    fn non_overlapping_previous_views_render_plain() {
        let current_bytes = [0x11, 0x22];
        let previous_bytes = [0xff, 0xff];

        let current = MemoryView::new(&current_bytes, 0x20, None);
        let previous = MemoryView::new(&previous_bytes, 0x80, None);

        let mut single = String::new();
        render_memory(&mut single, &current, &mut ColorContext::colored());

        let mut diff = String::new();
        render_memory_diff(&mut diff, &current, &previous, &mut ColorContext::colored());

        assert_eq!(single, diff);
    }

    #[test]
    fn the_instruction_pointer_address_is_marked() {
        let mut state = crate::yarisc::machine::MachineState::default();
        state.reg.named.set_ip(0x0002);
        state.reg.named.set_sp(0x0000);

        let bytes = [0u8; 4];
        let view = MemoryView::new(&bytes, 0, Some(&state));

        let mut out = String::new();
        render_memory(&mut out, &view, &mut ColorContext::colored());

        // sp marks the first word, ip the second
        assert!(out.contains(&SetBackgroundColor(Color::DarkYellow).to_string()));
        assert!(out.contains(&SetBackgroundColor(Color::DarkGreen).to_string()));
    }

    #[test]
    fn ip_wins_address_highlight_ties() {
        let mut state = crate::yarisc::machine::MachineState::default();
        state.reg.named.set_ip(0x0000);
        state.reg.named.set_sp(0x0000);

        let bytes = [0u8; 2];
        let view = MemoryView::new(&bytes, 0, Some(&state));

        let mut out = String::new();
        render_memory(&mut out, &view, &mut ColorContext::colored());

        assert!(out.contains(&SetBackgroundColor(Color::DarkGreen).to_string()));
        assert!(!out.contains(&SetBackgroundColor(Color::DarkYellow).to_string()));
    }

    #[test]
    fn debugger_frames_pad_the_message_line() {
        let current = registers_fixture();
        let previous = current;

        let bytes = [0u8; 4];
        let view = DebuggerView {
            current_registers: current,
            current_memory: MemoryView::new(&bytes, 0, None),
            previous_registers: previous,
            previous_memory: MemoryView::new(&bytes, 0, None),
            info: "ready",
            error: "",
        };

        let mut out = String::new();
        render_debugger_view(&mut out, &view, &mut ColorContext::plain());

        let message_line = out.lines().last().unwrap();
        assert_eq!(message_line.len(), MESSAGE_WIDTH);
        assert!(message_line.starts_with("ready"));
    }

    #[test]
    fn debugger_frames_do_not_diff_the_instruction_pointer() {
        let current = registers_fixture();
        let mut previous = current;
        previous.named.set_ip(0x0000);

        let bytes = [0u8; 4];
        let view = DebuggerView {
            current_registers: current,
            current_memory: MemoryView::new(&bytes, 0, None),
            previous_registers: previous,
            previous_memory: MemoryView::new(&bytes, 0, None),
            info: "",
            error: "",
        };

        let mut out = String::new();
        render_debugger_view(&mut out, &view, &mut ColorContext::colored());

        assert!(!out.contains(&SetForegroundColor(DIFF_COLOR).to_string()));
    }

    #[test]
    fn errors_render_in_the_diff_colour() {
        let current = registers_fixture();

        let bytes = [0u8; 4];
        let view = DebuggerView {
            current_registers: current,
            current_memory: MemoryView::new(&bytes, 0, None),
            previous_registers: current,
            previous_memory: MemoryView::new(&bytes, 0, None),
            info: "",
            error: "Invalid instruction 0x0000",
        };

        let mut out = String::new();
        render_debugger_view(&mut out, &view, &mut ColorContext::colored());

        assert!(out.contains(&SetForegroundColor(DIFF_COLOR).to_string()));
    }

    #[test]
    fn snapshot_program_bytes_render_as_stored(){
        // two instruction words in little-endian order
        let mut bytes = [0u8; 4];
        store_word(&mut bytes, 0x1234);
        store_word(&mut bytes[2..], 0xabcd);

        let view = MemoryView::new(&bytes, 0, None);

        let mut out = String::new();
        render_memory(&mut out, &view, &mut ColorContext::plain());

        assert!(out.starts_with("0x0000: 34 12  cd ab  "));
    }
}
