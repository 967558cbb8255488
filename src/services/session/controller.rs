//! Lifecycle owner for one attach-or-exec container session.
//!
//! The controller wires four parties together: the engine client (which
//! writes container output into the byte ring and reads keyboard bytes from
//! the stdin pipe), the output pump (ring → VT pipe, with the attach-mode
//! CRLF rewrite), the parser task (VT pipe → emulator grid), and the session
//! view (snapshots out, key events in). Teardown is driven entirely by
//! `hide`: it signals the done channel, closes the exec sink, and lets the
//! pipe closures cascade — the pump drops the VT write half, the parser's
//! read wakes with EOF, and every task unwinds without a timeout.
//!
//! Bytes travel one linear path in each direction, so ordering is free:
//! engine → ring → pump → VT pipe → parser → grid, and view → `write_key` →
//! stdin pipe → engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossterm::event::KeyEvent;
use thiserror::Error;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::engine::{EngineClient, SessionDescriptor};
use crate::input::encode_key;
use crate::term::TerminalEmulator;

use super::detach::{DetachEvent, DetachMatcher, DEFAULT_DETACH_KEYS};
use super::ring::{ByteRing, DEFAULT_RING_CAPACITY, MIN_RING_CAPACITY};

/// In-process pipe buffer sizes. Small enough to apply backpressure, large
/// enough that a busy shell never stalls on a single chunk.
const STDIN_PIPE_SIZE: usize = 4096;
const VT_PIPE_SIZE: usize = 16 * 1024;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session is not initialized")]
    NotInitialized,
    #[error("invalid detach keys: {0}")]
    DetachKeys(#[from] super::detach::DetachKeysError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Which engine operations the session uses for open, resize and teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionMode {
    #[default]
    None,
    Attach,
    Exec,
}

/// Whether the session is between `display` and `hide`. Transitions
/// `false → true` only in `display`, `true → false` only in `hide`.
#[derive(Debug, Default)]
pub struct RunningFlag(AtomicBool);

impl RunningFlag {
    pub fn start(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        !self.0.load(Ordering::SeqCst)
    }
}

/// Constructor parameters. Nothing here is global state.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Docker-style detach spec, e.g. `ctrl-p,ctrl-q,ctrl-p`.
    pub detach_keys: String,
    /// Byte-ring capacity in messages; clamped to at least 100.
    pub ring_capacity: usize,
    /// Initial TTY size before the view reports its real geometry.
    pub tty_width: u16,
    pub tty_height: u16,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            detach_keys: DEFAULT_DETACH_KEYS.to_string(),
            ring_capacity: DEFAULT_RING_CAPACITY,
            tty_width: 80,
            tty_height: 24,
        }
    }
}

type Handler = Arc<dyn Fn() + Send + Sync>;

/// Mutable plumbing, all behind one async lock. Pipe halves live here
/// between `init_*` and `display`, at which point the pump and parser tasks
/// take them.
#[derive(Default)]
struct Inner {
    initialized: bool,
    mode: SessionMode,
    descriptor: SessionDescriptor,
    detach: DetachMatcher,
    tty_size: (u16, u16),
    ring: ByteRing,
    ring_rx: Option<mpsc::Receiver<Vec<u8>>>,
    stdin_writer: Option<DuplexStream>,
    vt_writer: Option<DuplexStream>,
    vt_reader: Option<DuplexStream>,
    done_tx: Option<mpsc::Sender<()>>,
    done_rx: Option<mpsc::Receiver<()>>,
    /// Supervisor handles for the pump and parser; awaited in `hide` so the
    /// teardown only returns once no task can touch an owned pipe.
    tasks: Vec<tokio::task::JoinHandle<()>>,
    cancel_handler: Option<Handler>,
    fast_refresh_handler: Option<Handler>,
}

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inner")
            .field("initialized", &self.initialized)
            .field("mode", &self.mode)
            .field("descriptor", &self.descriptor)
            .field("tty_size", &self.tty_size)
            .finish_non_exhaustive()
    }
}

pub struct SessionController {
    engine: Arc<dyn EngineClient>,
    config: SessionConfig,
    emulator: Arc<TerminalEmulator>,
    running: Arc<RunningFlag>,
    inner: tokio::sync::Mutex<Inner>,
}

impl SessionController {
    pub fn new(engine: Arc<dyn EngineClient>, config: SessionConfig) -> Result<Self, SessionError> {
        let detach = DetachMatcher::parse(&config.detach_keys)?;
        let emulator = Arc::new(TerminalEmulator::new(config.tty_width, config.tty_height));
        let inner = Inner {
            detach,
            tty_size: (config.tty_width, config.tty_height),
            ..Inner::default()
        };
        Ok(Self {
            engine,
            config,
            emulator,
            running: Arc::new(RunningFlag::default()),
            inner: tokio::sync::Mutex::new(inner),
        })
    }

    /// The emulator, for views that paint snapshots.
    pub fn emulator(&self) -> Arc<TerminalEmulator> {
        self.emulator.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.running.is_stopped()
    }

    /// The configured detach sequence, in the spelling the engine expects.
    pub fn detach_keys(&self) -> &str {
        &self.config.detach_keys
    }

    pub async fn set_container_info(
        &self,
        id: impl Into<String>,
        name: impl Into<String>,
    ) {
        let mut inner = self.inner.lock().await;
        inner.descriptor.container_id = id.into();
        inner.descriptor.container_name = name.into();
    }

    pub async fn set_session_id(&self, id: impl Into<String>) {
        self.inner.lock().await.descriptor.exec_session_id = Some(id.into());
    }

    pub async fn descriptor(&self) -> SessionDescriptor {
        self.inner.lock().await.descriptor.clone()
    }

    /// Called when a detach match or the Close button asks the host to tear
    /// the session down. The host's handler is expected to call `hide`.
    pub async fn set_cancel_handler(&self, handler: Handler) {
        self.inner.lock().await.cancel_handler = Some(handler);
    }

    /// Poked on every output chunk so the host can redraw ahead of its
    /// normal tick.
    pub async fn set_fast_refresh_handler(&self, handler: Handler) {
        self.inner.lock().await.fast_refresh_handler = Some(handler);
    }

    /// Allocate the session plumbing for an attach session and return the
    /// engine-facing ends: the stdin reader and the stdout sink.
    pub async fn init_attach(&self) -> Result<(DuplexStream, ByteRing), SessionError> {
        self.init(SessionMode::Attach).await
    }

    /// Same as [`init_attach`](Self::init_attach) for an exec session. The
    /// returned ring is the closable variant the exec teardown path closes;
    /// it is the same type, `hide` just treats it differently.
    pub async fn init_exec(&self) -> Result<(DuplexStream, ByteRing), SessionError> {
        self.init(SessionMode::Exec).await
    }

    async fn init(&self, mode: SessionMode) -> Result<(DuplexStream, ByteRing), SessionError> {
        let mut inner = self.inner.lock().await;
        let (ring, ring_rx) =
            ByteRing::with_capacity(self.config.ring_capacity.max(MIN_RING_CAPACITY));
        let (stdin_writer, stdin_reader) = tokio::io::duplex(STDIN_PIPE_SIZE);
        let (vt_writer, vt_reader) = tokio::io::duplex(VT_PIPE_SIZE);
        let (done_tx, done_rx) = mpsc::channel(1);

        inner.mode = mode;
        inner.initialized = true;
        inner.detach.reset();
        inner.ring = ring.clone();
        inner.ring_rx = Some(ring_rx);
        inner.stdin_writer = Some(stdin_writer);
        inner.vt_writer = Some(vt_writer);
        inner.vt_reader = Some(vt_reader);
        inner.done_tx = Some(done_tx);
        inner.done_rx = Some(done_rx);
        self.emulator.reset();
        debug!(?mode, "session initialized");
        Ok((stdin_reader, ring))
    }

    /// Start the session: spawn the output pump and the parser task, mark
    /// the session running, request a first paint.
    pub async fn display(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        if !inner.initialized {
            return Err(SessionError::NotInitialized);
        }
        let ring_rx = inner.ring_rx.take().ok_or(SessionError::NotInitialized)?;
        let vt_writer = inner.vt_writer.take().ok_or(SessionError::NotInitialized)?;
        let vt_reader = inner.vt_reader.take().ok_or(SessionError::NotInitialized)?;
        let done_rx = inner.done_rx.take().ok_or(SessionError::NotInitialized)?;

        // Attach streams are line-buffered on the engine side; the emulator
        // expects CRLF. Exec streams carry raw PTY output.
        let rewrite_crlf = inner.mode == SessionMode::Attach;
        // The flag flips before the pump exists, so the pump can never see a
        // chunk while the session reads as stopped.
        self.running.start();
        let pump = spawn_output_pump(
            ring_rx,
            vt_writer,
            done_rx,
            rewrite_crlf,
            self.running.clone(),
            inner.fast_refresh_handler.clone(),
        );

        let emulator = self.emulator.clone();
        let parser = tokio::spawn(async move {
            match emulator.parse(vt_reader).await {
                Ok(()) => debug!("vt parser finished at end-of-stream"),
                Err(e) => debug!(error = %e, "vt parser stopped on pipe error"),
            }
        });

        inner.tasks.push(supervise("output pump", pump));
        inner.tasks.push(supervise("vt parser", parser));

        if let Some(refresh) = &inner.fast_refresh_handler {
            refresh();
        }
        debug!(mode = ?inner.mode, "session displayed");
        Ok(())
    }

    /// Tear the session down. Strict order: done signal first (unblocks the
    /// pump), then the exec sink, then the mode reset, then a best-effort
    /// detach-sequence write to unblock any engine-side stdin read, then the
    /// pipes, then the running flag. Idempotent once complete.
    pub async fn hide(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(done) = inner.done_tx.take() {
            let _ = done.try_send(());
        }
        if inner.mode == SessionMode::Exec {
            inner.ring.close();
        }
        inner.mode = SessionMode::None;

        let detach_sequence = inner.detach.sequence().to_vec();
        if let Some(stdin) = inner.stdin_writer.as_mut() {
            // Best effort: the engine may already be gone.
            let _ = stdin.write_all(&detach_sequence).await;
            let _ = stdin.flush().await;
        }
        inner.stdin_writer = None;

        // Dropping whichever halves never reached the tasks closes them; the
        // halves the tasks own close as the done signal unwinds the pump,
        // whose dropped write end in turn wakes the parser with EOF.
        inner.vt_writer = None;
        inner.vt_reader = None;
        inner.ring_rx = None;
        inner.done_rx = None;

        // Wait for the pump and parser to unwind. Bounded: the done signal
        // and the pipe closures above unblock both.
        for task in inner.tasks.drain(..) {
            let _ = task.await;
        }

        inner.initialized = false;
        inner.detach.reset();

        self.running.stop();
        debug!("session hidden");
    }

    /// Translate a key event and forward it to the engine, unless it
    /// completes the detach sequence — then the cancel handler runs and the
    /// engine sees none of the matched bytes.
    pub async fn write_key(&self, event: &KeyEvent) -> Result<(), SessionError> {
        let Some(bytes) = encode_key(event) else {
            return Ok(());
        };
        let mut inner = self.inner.lock().await;
        if inner.mode == SessionMode::None {
            return Ok(());
        }

        let mut outbound = Vec::with_capacity(bytes.len());
        let mut detached = false;
        for &b in &bytes {
            match inner.detach.feed(b) {
                DetachEvent::Held => {}
                DetachEvent::Release(mut released) => outbound.append(&mut released),
                DetachEvent::Detach => {
                    detached = true;
                    break;
                }
            }
        }

        if detached {
            let cancel = inner.cancel_handler.clone();
            drop(inner);
            debug!("detach sequence matched, cancelling session");
            if let Some(cancel) = cancel {
                cancel();
            }
            return Ok(());
        }

        if outbound.is_empty() {
            return Ok(());
        }
        if let Some(stdin) = inner.stdin_writer.as_mut() {
            // A torn-down engine side shows up as a broken pipe; the session
            // is ending anyway, so the keystroke is simply lost.
            if let Err(e) = stdin.write_all(&outbound).await {
                debug!(error = %e, "dropping keystroke, engine stdin closed");
                return Ok(());
            }
            if let Err(e) = stdin.flush().await {
                debug!(error = %e, "dropping keystroke, engine stdin closed");
            }
        }
        Ok(())
    }

    /// Record a new TTY size, resize the emulator, and notify the engine in
    /// the background. Zero-sized requests are ignored.
    pub async fn set_tty_size(&self, width: u16, height: u16) {
        if width == 0 || height == 0 {
            return;
        }
        let mut inner = self.inner.lock().await;
        if inner.tty_size == (width, height) {
            return;
        }
        inner.tty_size = (width, height);
        self.emulator.resize(width, height);

        let engine = self.engine.clone();
        let descriptor = inner.descriptor.clone();
        let mode = inner.mode;
        drop(inner);
        tokio::spawn(async move {
            let result = match mode {
                SessionMode::Attach => {
                    engine
                        .resize_container_tty(&descriptor.container_id, width, height)
                        .await
                }
                SessionMode::Exec => match &descriptor.exec_session_id {
                    Some(id) => engine.resize_exec_tty(id, height, width).await,
                    None => Ok(()),
                },
                SessionMode::None => Ok(()),
            };
            if let Err(e) = result {
                // Local resize already took effect; the engine will catch up
                // on the next report.
                warn!(error = %e, "tty resize propagation failed");
            }
        });
    }

    pub async fn tty_size(&self) -> (u16, u16) {
        self.inner.lock().await.tty_size
    }
}

/// Ring → VT pipe. Exits on the done signal, on ring end-of-stream, or when
/// the parser side of the pipe goes away.
fn spawn_output_pump(
    mut ring_rx: mpsc::Receiver<Vec<u8>>,
    mut vt_writer: DuplexStream,
    mut done_rx: mpsc::Receiver<()>,
    rewrite_crlf: bool,
    running: Arc<RunningFlag>,
    fast_refresh: Option<Handler>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = done_rx.recv() => {
                    debug!("output pump received done signal");
                    break;
                }
                chunk = ring_rx.recv() => {
                    let Some(chunk) = chunk else {
                        debug!("output pump: ring closed");
                        break;
                    };
                    if running.is_stopped() {
                        // hide() is mid-teardown; stop touching the pipes.
                        break;
                    }
                    let bytes = if rewrite_crlf {
                        expand_newlines(&chunk)
                    } else {
                        chunk
                    };
                    if vt_writer.write_all(&bytes).await.is_err() {
                        debug!("output pump: vt pipe closed");
                        break;
                    }
                    if let Some(refresh) = &fast_refresh {
                        refresh();
                    }
                }
            }
        }
        // Dropping vt_writer here is what wakes the parser with EOF.
    })
}

/// Log a pump panic instead of letting it vanish with the task. The task
/// boundary already contains the unwind; the UI never sees it. The returned
/// handle resolves once the supervised task is fully finished.
fn supervise(name: &'static str, handle: tokio::task::JoinHandle<()>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = handle.await {
            if e.is_panic() {
                error!(task = name, error = %e, "session task panicked");
            }
        }
    })
}

/// Replace every bare `\n` with `\r\n`.
fn expand_newlines(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() + input.len() / 8);
    for &b in input {
        if b == b'\n' {
            out.push(b'\r');
        }
        out.push(b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_newlines_rewrites_every_linefeed() {
        assert_eq!(expand_newlines(b"a\nb\n"), b"a\r\nb\r\n");
        assert_eq!(expand_newlines(b"no newline"), b"no newline");
        assert_eq!(expand_newlines(b""), b"");
        // Already-CRLF input gains a second CR; attach streams never carry
        // CR, which is why the rewrite is unconditional.
        assert_eq!(expand_newlines(b"\r\n"), b"\r\r\n");
    }

    #[test]
    fn running_flag_transitions() {
        let flag = RunningFlag::default();
        assert!(flag.is_stopped());
        flag.start();
        assert!(!flag.is_stopped());
        flag.stop();
        assert!(flag.is_stopped());
    }
}
