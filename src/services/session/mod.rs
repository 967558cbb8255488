//! The interactive container-session subsystem.
//!
//! One [`SessionController`] owns one attach-or-exec session end to end:
//! the [`ByteRing`] the engine writes output into, the stdin pipe keyboard
//! bytes flow out of, the pump and parser tasks in between, and the
//! [`DetachMatcher`] guarding the outbound stream. See the controller for
//! the data-flow picture.

mod controller;
mod detach;
mod ring;

pub use controller::{
    RunningFlag, SessionConfig, SessionController, SessionError, SessionMode,
};
pub use detach::{DetachEvent, DetachKeysError, DetachMatcher, DEFAULT_DETACH_KEYS};
pub use ring::{ByteRing, RingError, DEFAULT_RING_CAPACITY, MIN_RING_CAPACITY};
