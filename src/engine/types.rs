//! Plain data carried across the engine-client seam.

use std::path::PathBuf;

use crate::services::session::DEFAULT_DETACH_KEYS;

/// Identity of the session's target, as the UI knows it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionDescriptor {
    pub container_id: String,
    pub container_name: String,
    /// Set for exec sessions once `exec_create` has returned.
    pub exec_session_id: Option<String>,
}

/// Options for creating an exec session inside a running container.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    pub cmd: Vec<String>,
    pub tty: bool,
    pub interactive: bool,
    pub privileged: bool,
    pub detach: bool,
    pub work_dir: Option<String>,
    pub env_vars: Vec<String>,
    pub env_file: Vec<PathBuf>,
    pub user: Option<String>,
    pub detach_keys: String,
    pub tty_width: u16,
    pub tty_height: u16,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            cmd: Vec::new(),
            tty: true,
            interactive: true,
            privileged: false,
            detach: false,
            work_dir: None,
            env_vars: Vec::new(),
            env_file: Vec::new(),
            user: None,
            detach_keys: DEFAULT_DETACH_KEYS.to_string(),
            tty_width: 80,
            tty_height: 24,
        }
    }
}

/// One sample from the engine's stats stream. Consumed by the stats dialog.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatReport {
    pub pids: u64,
    pub cpu_percent: f64,
    pub mem_percent: f64,
    pub mem_usage: u64,
    pub mem_limit: u64,
    pub block_input: u64,
    pub block_output: u64,
    pub net_input: u64,
    pub net_output: u64,
}
