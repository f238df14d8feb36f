//! Colour output context for the renderer.
//!
//! The renderer never talks to the terminal directly: it appends text and
//! ANSI sequences (via `crossterm`) to a string buffer through a
//! [`ColorContext`]. The context knows whether colour is enabled and tracks
//! a dirty bit so that a reset sequence is emitted exactly when colour
//! state has actually been changed.

use std::fmt::Write;
use std::io::stdout;
use std::sync::OnceLock;

use crossterm::style::{Color, ResetColor, SetBackgroundColor, SetForegroundColor};
use crossterm::tty::IsTty;

use crate::yarisc::types::NUM_REGISTERS;

/// Colored text output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Checks if the console supports colour.
    Console,
    /// Disable colour output.
    Plain,
    /// Enable colour output.
    Colored,
}

/// Returns whether console colours are supported.
pub fn supported() -> bool {
    static SUPPORTED: OnceLock<bool> = OnceLock::new();

    *SUPPORTED.get_or_init(|| stdout().is_tty())
}

/// Colour state carried through one render.
#[derive(Debug)]
pub struct ColorContext {
    enabled: bool,
    dirty: bool,
}

impl ColorContext {
    /// Resolves the output format once for this render.
    pub fn new(format: OutputFormat) -> Self {
        let enabled = match format {
            OutputFormat::Console => supported(),
            OutputFormat::Plain => false,
            OutputFormat::Colored => true,
        };

        Self {
            enabled,
            dirty: false,
        }
    }

    pub fn plain() -> Self {
        Self::new(OutputFormat::Plain)
    }

    pub fn colored() -> Self {
        Self::new(OutputFormat::Colored)
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Returns whether colour needs to be reset.
    pub fn dirty(&self) -> bool {
        self.dirty
    }

    /// Switches the foreground colour if colour is enabled.
    pub fn foreground(&mut self, out: &mut String, color: Color) {
        if self.enabled {
            let _ = write!(out, "{}", SetForegroundColor(color));
            self.dirty = true;
        }
    }

    /// Switches the background colour if colour is enabled.
    pub fn background(&mut self, out: &mut String, color: Color) {
        if self.enabled {
            let _ = write!(out, "{}", SetBackgroundColor(color));
            self.dirty = true;
        }
    }

    /// Emits a reset sequence if the colour state is dirty.
    pub fn reset(&mut self, out: &mut String) {
        if self.dirty {
            let _ = write!(out, "{}", ResetColor);
            self.dirty = false;
        }
    }
}

/// Foreground for values and the first byte of a memory word.
pub const VALUE_COLOR: Color = Color::White;

/// Muted foreground for the second byte of a memory word and for matching
/// characters of a text diff.
pub const TEXT_MUTED_COLOR: Color = Color::Grey;

/// Foreground of characters that differ from the previous rendering.
pub const DIFF_COLOR: Color = Color::Red;

/// Muted foreground for the unchanged characters of a changed value.
pub const DIFF_MUTED_COLOR: Color = Color::DarkRed;

/// Background colours used to mark register addresses in the memory view,
/// indexed by register. Disabled entries are not rendered.
pub const REGISTER_BACKGROUNDS: [(Color, bool); NUM_REGISTERS] = [
    (Color::DarkBlue, false),    // r0
    (Color::DarkMagenta, false), // r1
    (Color::DarkCyan, false),    // r2
    (Color::Blue, false),        // r3
    (Color::Magenta, false),     // r4
    (Color::Cyan, false),        // r5
    (Color::DarkYellow, true),   // sp
    (Color::DarkGreen, true),    // ip
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_context_emits_nothing() {
        let mut ctx = ColorContext::plain();
        let mut out = String::new();

        ctx.foreground(&mut out, DIFF_COLOR);
        ctx.background(&mut out, Color::DarkGreen);
        ctx.reset(&mut out);

        assert!(out.is_empty());
        assert!(!ctx.dirty());
    }

    #[test]
    fn reset_is_emitted_exactly_when_dirty() {
        let mut ctx = ColorContext::colored();
        let mut out = String::new();

        ctx.reset(&mut out);
        assert!(out.is_empty());

        ctx.foreground(&mut out, DIFF_COLOR);
        assert!(ctx.dirty());
        assert!(!out.is_empty());

        let len = out.len();
        ctx.reset(&mut out);
        assert!(out.len() > len);
        assert!(!ctx.dirty());

        let len = out.len();
        ctx.reset(&mut out);
        assert_eq!(out.len(), len);
    }

    #[test]
    fn colored_sequences_are_ansi() {
        let mut ctx = ColorContext::colored();
        let mut out = String::new();

        ctx.foreground(&mut out, DIFF_COLOR);
        ctx.reset(&mut out);

        assert!(out.starts_with('\u{1b}'));
        assert!(out.contains('m'));
    }
}
