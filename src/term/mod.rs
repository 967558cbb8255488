//! VT100/VT220-style terminal emulation for container sessions.
//!
//! The emulator is the receiving end of the session pipeline: the output
//! pump writes raw bytes into a pipe, [`TerminalEmulator::parse`] drains the
//! pipe through the `vte` state machine, and the session view reads atomic
//! [`ScreenSnapshot`]s for painting. Scrollback is deliberately absent; a
//! session shows one screen, like the terminal it emulates.

mod cell;
mod emulator;
mod screen;

pub use cell::{Cell, CellStyle, Color, Cursor};
pub use emulator::TerminalEmulator;
pub use screen::ScreenSnapshot;
