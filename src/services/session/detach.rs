//! Detach-key sequence matching on the outbound byte stream.
//!
//! The matcher watches the bytes the user types and holds back anything that
//! could be a prefix of the configured detach sequence. Held bytes are only
//! released to the engine once the match is broken; a completed match
//! discards them entirely, so no byte of a successful detach ever reaches
//! the container. The matcher is authoritative on the client side — whether
//! the engine also honors the `detach_keys` string is best-effort only.

use thiserror::Error;

/// Default detach sequence, same convention as docker/podman:
/// Ctrl-P, Ctrl-Q, Ctrl-P.
pub const DEFAULT_DETACH_KEYS: &str = "ctrl-p,ctrl-q,ctrl-p";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DetachKeysError {
    #[error("detach key spec is empty")]
    Empty,
    #[error("unrecognized detach key token `{0}`")]
    BadToken(String),
}

/// Outcome of feeding one byte to the matcher.
#[derive(Debug, PartialEq, Eq)]
pub enum DetachEvent {
    /// Byte may be part of the detach sequence; it is held, send nothing.
    Held,
    /// Sequence completed. Held bytes are discarded; tear the session down.
    Detach,
    /// Match broken. These bytes (the dead prefix, plus the current byte if
    /// it did not start a fresh match) must be forwarded to the engine.
    Release(Vec<u8>),
}

#[derive(Debug, PartialEq, Eq)]
pub struct DetachMatcher {
    sequence: Vec<u8>,
    index: usize,
    held: Vec<u8>,
}

impl DetachMatcher {
    pub fn new(sequence: Vec<u8>) -> Self {
        debug_assert!(!sequence.is_empty());
        Self {
            sequence,
            index: 0,
            held: Vec::new(),
        }
    }

    /// Parse a docker-style key spec such as `ctrl-p,ctrl-q,ctrl-p`.
    /// Tokens are either `ctrl-<letter>` or a single literal character.
    pub fn parse(spec: &str) -> Result<Self, DetachKeysError> {
        let mut sequence = Vec::new();
        for token in spec.split(',') {
            let token = token.trim();
            if token.is_empty() {
                return Err(DetachKeysError::Empty);
            }
            if let Some(rest) = token
                .strip_prefix("ctrl-")
                .or_else(|| token.strip_prefix("Ctrl-"))
            {
                let mut chars = rest.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if c.is_ascii_lowercase() => {
                        sequence.push(c as u8 - b'a' + 1);
                    }
                    (Some(c), None) if c.is_ascii_uppercase() => {
                        sequence.push(c.to_ascii_lowercase() as u8 - b'a' + 1);
                    }
                    _ => return Err(DetachKeysError::BadToken(token.to_string())),
                }
            } else {
                let mut chars = token.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if c.is_ascii() => sequence.push(c as u8),
                    _ => return Err(DetachKeysError::BadToken(token.to_string())),
                }
            }
        }
        if sequence.is_empty() {
            return Err(DetachKeysError::Empty);
        }
        Ok(Self::new(sequence))
    }

    /// The configured sequence as raw bytes (sent to the engine on teardown
    /// to unblock a pending engine-side read).
    pub fn sequence(&self) -> &[u8] {
        &self.sequence
    }

    /// Feed one outbound byte and decide its fate.
    pub fn feed(&mut self, byte: u8) -> DetachEvent {
        if byte == self.sequence[self.index] {
            self.index += 1;
            self.held.push(byte);
            if self.index == self.sequence.len() {
                self.reset();
                return DetachEvent::Detach;
            }
            return DetachEvent::Held;
        }

        // Broken match: everything held so far is dead and must be forwarded.
        let mut release = std::mem::take(&mut self.held);
        if byte == self.sequence[0] {
            // Single-byte re-match: this byte starts a fresh attempt.
            self.index = 1;
            self.held.push(byte);
            if self.sequence.len() == 1 {
                self.reset();
                return DetachEvent::Detach;
            }
        } else {
            self.index = 0;
            release.push(byte);
        }
        DetachEvent::Release(release)
    }

    /// Forget any partial match. Called once per session start.
    pub fn reset(&mut self) {
        self.index = 0;
        self.held.clear();
    }
}

impl Default for DetachMatcher {
    fn default() -> Self {
        Self::parse(DEFAULT_DETACH_KEYS).expect("default detach keys parse")
    }
}
