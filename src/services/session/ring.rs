//! Bounded writer-to-channel adapter for engine output.
//!
//! The engine client wants a synchronous-looking sink it can write container
//! output into; the session pump wants a channel it can `select!` on together
//! with cancellation. `ByteRing` bridges the two: every `write` copies the
//! caller's buffer (engine clients recycle a shared buffer between calls) and
//! becomes exactly one message on a bounded queue, delivered in write order.
//! When the queue is full the write blocks until the pump drains a slot;
//! messages are never dropped.

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::mpsc;

/// Capacity used when a caller does not specify one. The session controller
/// never allocates rings smaller than [`MIN_RING_CAPACITY`].
pub const DEFAULT_RING_CAPACITY: usize = 128;

/// Lower bound on ring capacity; smaller values stall engine reads on bursts.
pub const MIN_RING_CAPACITY: usize = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RingError {
    /// Write on a default-constructed ring that was never given a channel.
    #[error("byte ring is not initialized")]
    NotInitialized,
    /// Write after the owner closed the ring (or the reader went away).
    #[error("byte ring is closed")]
    Closed,
}

enum RingState {
    Uninitialized,
    Open(mpsc::Sender<Vec<u8>>),
    Closed,
}

/// Writer half of the ring. Cheap to clone; the session controller keeps one
/// handle for closing and hands another to the engine client as its stdout.
#[derive(Clone)]
pub struct ByteRing {
    state: Arc<Mutex<RingState>>,
}

impl Default for ByteRing {
    /// An uninitialized ring. All writes fail with [`RingError::NotInitialized`].
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(RingState::Uninitialized)),
        }
    }
}

impl ByteRing {
    /// Create an open ring and the single receiver for its messages.
    pub fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let ring = Self {
            state: Arc::new(Mutex::new(RingState::Open(tx))),
        };
        (ring, rx)
    }

    /// Copy `buf` and enqueue it as one message, blocking while the queue is
    /// full. Returns the number of bytes accepted (always `buf.len()`).
    pub async fn write(&self, buf: &[u8]) -> Result<usize, RingError> {
        let tx = {
            let state = self.state.lock().expect("ring lock poisoned");
            match &*state {
                RingState::Uninitialized => return Err(RingError::NotInitialized),
                RingState::Closed => return Err(RingError::Closed),
                RingState::Open(tx) => tx.clone(),
            }
        };
        tx.send(buf.to_vec())
            .await
            .map_err(|_| RingError::Closed)?;
        Ok(buf.len())
    }

    /// Blocking variant for producers that live on plain threads (the local
    /// PTY engine reads its pseudoterminal with blocking I/O).
    pub fn blocking_write(&self, buf: &[u8]) -> Result<usize, RingError> {
        let tx = {
            let state = self.state.lock().expect("ring lock poisoned");
            match &*state {
                RingState::Uninitialized => return Err(RingError::NotInitialized),
                RingState::Closed => return Err(RingError::Closed),
                RingState::Open(tx) => tx.clone(),
            }
        };
        tx.blocking_send(buf.to_vec())
            .map_err(|_| RingError::Closed)?;
        Ok(buf.len())
    }

    /// Close the ring. Subsequent writes on any handle fail with
    /// [`RingError::Closed`]; the receiver drains whatever was already queued
    /// and then sees end-of-stream. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.lock().expect("ring lock poisoned");
        *state = RingState::Closed;
    }

    /// Whether writes can currently succeed.
    pub fn is_open(&self) -> bool {
        matches!(
            &*self.state.lock().expect("ring lock poisoned"),
            RingState::Open(_)
        )
    }
}
