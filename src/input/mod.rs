//! Keyboard input translation.

pub mod keys;

pub use keys::encode_key;
