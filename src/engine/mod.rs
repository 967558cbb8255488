//! The engine-client seam.
//!
//! The session core never talks a container protocol itself; it consumes an
//! already-connected client through [`EngineClient`]. The trait is written
//! around byte streams rather than protocol types so the integration tests
//! can substitute a scripted double and the binary can run against
//! [`LocalPtyEngine`], which fakes a container with a local shell.

mod local;
mod types;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;

use crate::services::session::ByteRing;

pub use local::LocalPtyEngine;
pub use types::{ExecOptions, SessionDescriptor, StatReport};

/// Reader handed to the engine as the session's stdin. The engine reads
/// keyboard bytes from it until EOF.
pub type StdinStream = Box<dyn AsyncRead + Send + Unpin>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no such container: {0}")]
    NoSuchContainer(String),
    #[error("no such exec session: {0}")]
    NoSuchSession(String),
    #[error("engine stream error: {0}")]
    Stream(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Operations the session core consumes from a container engine.
///
/// `attach` and `exec_start` block until the remote process exits or the
/// stream is torn down; callers run them on their own task. Output is
/// written into the [`ByteRing`] the controller allocated; a
/// [`RingError::Closed`](crate::services::session::RingError::Closed) write
/// result is the engine's signal that the UI side has gone away.
#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Bind streams to the main process of a running container.
    async fn attach(
        &self,
        container_id: &str,
        stdin: StdinStream,
        stdout: ByteRing,
        detach_keys: &str,
    ) -> Result<(), EngineError>;

    /// Create an exec session; returns its id.
    async fn exec_create(
        &self,
        container_id: &str,
        options: ExecOptions,
    ) -> Result<String, EngineError>;

    /// Run an exec session to completion with the given streams.
    async fn exec_start(
        &self,
        session_id: &str,
        stdin: StdinStream,
        stdout: ByteRing,
    ) -> Result<(), EngineError>;

    /// Tell the engine the attach TTY changed size.
    async fn resize_container_tty(
        &self,
        container_id: &str,
        width: u16,
        height: u16,
    ) -> Result<(), EngineError>;

    /// Tell the engine the exec TTY changed size. Height first; that is the
    /// parameter order container engines use for exec resize.
    async fn resize_exec_tty(
        &self,
        session_id: &str,
        height: u16,
        width: u16,
    ) -> Result<(), EngineError>;

    /// Stream resource statistics for a container. With `stream == false`
    /// the channel yields a single report and closes.
    async fn stats(
        &self,
        container_id: &str,
        stream: bool,
    ) -> Result<mpsc::Receiver<StatReport>, EngineError>;
}
