//! A scripted engine double for driving sessions end to end.
//!
//! Tests feed output chunks through a channel as if a container were
//! producing them, and read back everything the session wrote to the
//! engine's stdin. Resize calls are recorded verbatim.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, Mutex};

use stevedore::engine::{EngineClient, EngineError, ExecOptions, StatReport, StdinStream};
use stevedore::services::session::ByteRing;

pub struct ScriptedEngine {
    output_rx: Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
    stdin_capture: Arc<StdMutex<Vec<u8>>>,
    container_resizes: Arc<StdMutex<Vec<(u16, u16)>>>,
    /// Recorded in call order: (height, width), as the trait passes them.
    exec_resizes: Arc<StdMutex<Vec<(u16, u16)>>>,
    next_exec_id: AtomicU64,
}

impl ScriptedEngine {
    /// Returns the engine and the sender the test scripts output through.
    /// Dropping the sender ends the container stream.
    pub fn new() -> (Arc<Self>, mpsc::Sender<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(32);
        let engine = Arc::new(Self {
            output_rx: Mutex::new(Some(rx)),
            stdin_capture: Arc::new(StdMutex::new(Vec::new())),
            container_resizes: Arc::new(StdMutex::new(Vec::new())),
            exec_resizes: Arc::new(StdMutex::new(Vec::new())),
            next_exec_id: AtomicU64::new(1),
        });
        (engine, tx)
    }

    /// Everything the session has written to the engine's stdin so far.
    pub fn stdin_bytes(&self) -> Vec<u8> {
        self.stdin_capture.lock().expect("capture lock").clone()
    }

    pub fn container_resizes(&self) -> Vec<(u16, u16)> {
        self.container_resizes.lock().expect("resize lock").clone()
    }

    pub fn exec_resizes(&self) -> Vec<(u16, u16)> {
        self.exec_resizes.lock().expect("resize lock").clone()
    }

    /// Pump scripted chunks into the ring while capturing stdin. Returns
    /// when the script sender is dropped or the stdin pipe closes, like a
    /// real stream ending from either side.
    async fn run_stream(&self, mut stdin: StdinStream, stdout: ByteRing) -> Result<(), EngineError> {
        let mut rx = self
            .output_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| EngineError::Stream("script already consumed".to_string()))?;
        let capture = self.stdin_capture.clone();
        let mut buf = [0u8; 1024];
        loop {
            tokio::select! {
                chunk = rx.recv() => {
                    let Some(chunk) = chunk else { break };
                    if stdout.write(&chunk).await.is_err() {
                        break;
                    }
                }
                read = stdin.read(&mut buf) => {
                    match read {
                        Ok(0) | Err(_) => break,
                        Ok(n) => capture
                            .lock()
                            .expect("capture lock")
                            .extend_from_slice(&buf[..n]),
                    }
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EngineClient for ScriptedEngine {
    async fn attach(
        &self,
        _container_id: &str,
        stdin: StdinStream,
        stdout: ByteRing,
        _detach_keys: &str,
    ) -> Result<(), EngineError> {
        self.run_stream(stdin, stdout).await
    }

    async fn exec_create(
        &self,
        container_id: &str,
        _options: ExecOptions,
    ) -> Result<String, EngineError> {
        let n = self.next_exec_id.fetch_add(1, Ordering::Relaxed);
        Ok(format!("{container_id}-exec-{n}"))
    }

    async fn exec_start(
        &self,
        _session_id: &str,
        stdin: StdinStream,
        stdout: ByteRing,
    ) -> Result<(), EngineError> {
        self.run_stream(stdin, stdout).await
    }

    async fn resize_container_tty(
        &self,
        _container_id: &str,
        width: u16,
        height: u16,
    ) -> Result<(), EngineError> {
        self.container_resizes
            .lock()
            .expect("resize lock")
            .push((width, height));
        Ok(())
    }

    async fn resize_exec_tty(
        &self,
        _session_id: &str,
        height: u16,
        width: u16,
    ) -> Result<(), EngineError> {
        self.exec_resizes
            .lock()
            .expect("resize lock")
            .push((height, width));
        Ok(())
    }

    async fn stats(
        &self,
        _container_id: &str,
        _stream: bool,
    ) -> Result<mpsc::Receiver<StatReport>, EngineError> {
        let (tx, rx) = mpsc::channel(1);
        let _ = tx.send(StatReport::default()).await;
        Ok(rx)
    }
}

/// Poll until `check` passes or two seconds elapse. Parsing happens on
/// background tasks, so assertions on the grid need a settling loop.
pub async fn wait_for(mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !check() {
        assert!(Instant::now() < deadline, "condition not met within 2s");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// The text of one grid row, trailing blanks trimmed.
pub fn row_text(snapshot: &stevedore::term::ScreenSnapshot, y: usize) -> String {
    snapshot.cells[y]
        .iter()
        .map(|c| c.ch)
        .collect::<String>()
        .trim_end()
        .to_string()
}
