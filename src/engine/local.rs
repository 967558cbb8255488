//! A demonstration engine backed by local pseudoterminals.
//!
//! Stands in for a real container daemon so the binary runs end to end:
//! "attaching" to a container spawns a shell in a PTY, exec sessions spawn
//! their command the same way, and resize maps straight onto the PTY ioctl.
//! Stats are synthetic. PTY I/O is blocking, so each session runs a reader
//! thread and a writer thread bridged to the async side with channels.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use portable_pty::{native_pty_system, CommandBuilder, MasterPty, PtySize};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing::debug;

use super::{EngineClient, EngineError, ExecOptions, StatReport, StdinStream};
use crate::services::session::ByteRing;

pub struct LocalPtyEngine {
    shell: String,
    /// Live PTY masters, keyed by container id or exec session id, kept for
    /// resize.
    masters: Mutex<HashMap<String, Box<dyn MasterPty + Send>>>,
    pending_execs: Mutex<HashMap<String, ExecOptions>>,
    next_exec_id: AtomicU64,
}

impl LocalPtyEngine {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            masters: Mutex::new(HashMap::new()),
            pending_execs: Mutex::new(HashMap::new()),
            next_exec_id: AtomicU64::new(1),
        }
    }

    fn stream_err(e: impl std::fmt::Display) -> EngineError {
        EngineError::Stream(e.to_string())
    }

    /// Spawn `cmd` in a fresh PTY and pump bytes both ways until the process
    /// exits or stdin reaches EOF (which counts as "stream closed" and kills
    /// the process — a local shell has nothing to stay alive for).
    async fn run_in_pty(
        &self,
        key: &str,
        cmd: CommandBuilder,
        size: PtySize,
        mut stdin: StdinStream,
        stdout: ByteRing,
    ) -> Result<(), EngineError> {
        let pair = native_pty_system()
            .openpty(size)
            .map_err(Self::stream_err)?;
        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(Self::stream_err)?;
        drop(pair.slave);

        let mut reader = pair.master.try_clone_reader().map_err(Self::stream_err)?;
        let mut writer = pair.master.take_writer().map_err(Self::stream_err)?;
        self.masters
            .lock()
            .expect("masters lock poisoned")
            .insert(key.to_string(), pair.master);

        // PTY output → byte ring, on a plain thread (the read blocks).
        std::thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if stdout.blocking_write(&buf[..n]).is_err() {
                            // UI side went away; stop producing.
                            break;
                        }
                    }
                }
            }
        });

        // Session stdin → PTY, bridged through a channel to a writer thread.
        let (write_tx, write_rx) = std::sync::mpsc::channel::<Vec<u8>>();
        std::thread::spawn(move || {
            for chunk in write_rx {
                if writer.write_all(&chunk).is_err() || writer.flush().is_err() {
                    break;
                }
            }
        });
        let mut stdin_pump = tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            loop {
                match stdin.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if write_tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let mut killer = child.clone_killer();
        let mut waiter = tokio::task::spawn_blocking(move || child.wait());
        tokio::select! {
            _ = &mut waiter => {}
            _ = &mut stdin_pump => {
                debug!(key, "session stdin closed, terminating pty child");
                let _ = killer.kill();
                let _ = waiter.await;
            }
        }
        stdin_pump.abort();
        self.masters
            .lock()
            .expect("masters lock poisoned")
            .remove(key);
        Ok(())
    }

    fn resize_pty(&self, key: &str, rows: u16, cols: u16) -> Result<(), EngineError> {
        let masters = self.masters.lock().expect("masters lock poisoned");
        let master = masters
            .get(key)
            .ok_or_else(|| EngineError::NoSuchSession(key.to_string()))?;
        master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(Self::stream_err)
    }
}

impl Default for LocalPtyEngine {
    fn default() -> Self {
        let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
        Self::new(shell)
    }
}

#[async_trait]
impl EngineClient for LocalPtyEngine {
    async fn attach(
        &self,
        container_id: &str,
        stdin: StdinStream,
        stdout: ByteRing,
        _detach_keys: &str,
    ) -> Result<(), EngineError> {
        let cmd = CommandBuilder::new(&self.shell);
        let size = PtySize {
            rows: 24,
            cols: 80,
            pixel_width: 0,
            pixel_height: 0,
        };
        self.run_in_pty(container_id, cmd, size, stdin, stdout).await
    }

    async fn exec_create(
        &self,
        container_id: &str,
        options: ExecOptions,
    ) -> Result<String, EngineError> {
        if options.cmd.is_empty() {
            return Err(EngineError::Stream("exec command is empty".to_string()));
        }
        let id = format!(
            "{container_id}-exec-{}",
            self.next_exec_id.fetch_add(1, Ordering::Relaxed)
        );
        self.pending_execs
            .lock()
            .expect("execs lock poisoned")
            .insert(id.clone(), options);
        Ok(id)
    }

    async fn exec_start(
        &self,
        session_id: &str,
        stdin: StdinStream,
        stdout: ByteRing,
    ) -> Result<(), EngineError> {
        let options = self
            .pending_execs
            .lock()
            .expect("execs lock poisoned")
            .remove(session_id)
            .ok_or_else(|| EngineError::NoSuchSession(session_id.to_string()))?;

        let mut cmd = CommandBuilder::new(&options.cmd[0]);
        cmd.args(&options.cmd[1..]);
        if let Some(dir) = &options.work_dir {
            cmd.cwd(dir);
        }
        for pair in &options.env_vars {
            if let Some((k, v)) = pair.split_once('=') {
                cmd.env(k, v);
            }
        }
        for file in &options.env_file {
            let Ok(contents) = std::fs::read_to_string(file) else {
                debug!(path = %file.display(), "skipping unreadable env file");
                continue;
            };
            for line in contents.lines() {
                if let Some((k, v)) = line.split_once('=') {
                    cmd.env(k, v);
                }
            }
        }
        let size = PtySize {
            rows: options.tty_height.max(1),
            cols: options.tty_width.max(1),
            pixel_width: 0,
            pixel_height: 0,
        };
        self.run_in_pty(session_id, cmd, size, stdin, stdout).await
    }

    async fn resize_container_tty(
        &self,
        container_id: &str,
        width: u16,
        height: u16,
    ) -> Result<(), EngineError> {
        self.resize_pty(container_id, height, width)
    }

    async fn resize_exec_tty(
        &self,
        session_id: &str,
        height: u16,
        width: u16,
    ) -> Result<(), EngineError> {
        self.resize_pty(session_id, height, width)
    }

    async fn stats(
        &self,
        _container_id: &str,
        stream: bool,
    ) -> Result<mpsc::Receiver<StatReport>, EngineError> {
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            loop {
                if tx.send(StatReport::default()).await.is_err() {
                    break;
                }
                if !stream {
                    break;
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        });
        Ok(rx)
    }
}
