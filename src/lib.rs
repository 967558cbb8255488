//! Stevedore: an interactive container-session TUI.
//!
//! The pieces, in data-flow order: an [`engine::EngineClient`] writes
//! container output into a [`services::session::ByteRing`]; the
//! [`services::session::SessionController`] pumps it through a VT pipe into
//! the [`term::TerminalEmulator`]; the [`view::SessionView`] paints emulator
//! snapshots and feeds key events back through the controller into the
//! engine's stdin, with the detach sequence intercepted on the way.

pub mod app;
pub mod engine;
pub mod input;
pub mod services;
pub mod term;
pub mod view;
