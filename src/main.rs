use std::io;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::warn;

use stevedore::app::App;
use stevedore::engine::{EngineClient, ExecOptions, LocalPtyEngine};
use stevedore::services::session::{SessionConfig, SessionController, DEFAULT_DETACH_KEYS};
use stevedore::services::tracing_setup;

#[derive(Parser, Debug)]
#[command(name = "stevedore", about = "Interactive terminal sessions for containers")]
struct Args {
    /// Container to attach to. The bundled local engine stands a shell in
    /// for a real container.
    #[arg(default_value = "local")]
    container: String,

    /// Run a command in an exec session instead of attaching.
    #[arg(long = "exec", num_args = 1.., value_name = "CMD")]
    exec: Vec<String>,

    /// Detach sequence, docker spelling.
    #[arg(long, value_name = "KEYS", default_value = DEFAULT_DETACH_KEYS)]
    detach_keys: String,

    /// Log file path. Defaults to stevedore.log in the temp directory.
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Shell the local engine spawns; defaults to $SHELL.
    #[arg(long)]
    shell: Option<String>,
}

/// Raw mode and the alternate screen, restored on drop so panics and early
/// returns leave the terminal usable.
struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> Result<Self> {
        enable_raw_mode()?;
        io::stdout().execute(EnterAlternateScreen)?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = io::stdout().execute(LeaveAlternateScreen);
        let _ = disable_raw_mode();
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_path = args
        .log_file
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("stevedore.log"));
    if !tracing_setup::init_global(&log_path) {
        eprintln!("warning: could not open log file {}", log_path.display());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let engine: Arc<LocalPtyEngine> = Arc::new(match &args.shell {
        Some(shell) => LocalPtyEngine::new(shell),
        None => LocalPtyEngine::default(),
    });
    let config = SessionConfig {
        detach_keys: args.detach_keys.clone(),
        ..SessionConfig::default()
    };
    let controller = Arc::new(SessionController::new(engine.clone(), config)?);

    let mut app = runtime.block_on(async {
        controller
            .set_container_info(&args.container, &args.container)
            .await;
        App::new(controller.clone(), args.container.clone()).await
    });
    let stop = app.stop_flag();

    runtime.block_on(start_session(
        engine,
        controller.clone(),
        &args,
        stop.clone(),
    ))?;

    let guard = TerminalGuard::enter()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
    let result = app.run(&mut terminal, runtime.handle());
    drop(guard);

    // app.run already hid the session; a second hide is a no-op but covers
    // the error path out of the loop.
    runtime.block_on(controller.hide());
    result
}

/// Initialize the session plumbing, hand the engine its stream ends on a
/// background task, and start the pumps. The spawned task pokes `stop` when
/// the engine stream ends so the UI exits on EOF.
async fn start_session(
    engine: Arc<LocalPtyEngine>,
    controller: Arc<SessionController>,
    args: &Args,
    stop: Arc<std::sync::atomic::AtomicBool>,
) -> Result<()> {
    if args.exec.is_empty() {
        let (stdin, ring) = controller.init_attach().await?;
        let container = args.container.clone();
        let detach_keys = args.detach_keys.clone();
        tokio::spawn(async move {
            if let Err(e) = engine
                .attach(&container, Box::new(stdin), ring, &detach_keys)
                .await
            {
                warn!(error = %e, "attach stream ended with error");
            }
            stop.store(true, Ordering::Relaxed);
        });
    } else {
        let (tty_width, tty_height) = controller.tty_size().await;
        let options = ExecOptions {
            cmd: args.exec.clone(),
            detach_keys: args.detach_keys.clone(),
            tty_width,
            tty_height,
            ..ExecOptions::default()
        };
        let session_id = engine.exec_create(&args.container, options).await?;
        controller.set_session_id(&session_id).await;
        let (stdin, ring) = controller.init_exec().await?;
        tokio::spawn(async move {
            if let Err(e) = engine.exec_start(&session_id, Box::new(stdin), ring).await {
                warn!(error = %e, "exec stream ended with error");
            }
            stop.store(true, Ordering::Relaxed);
        });
    }
    controller.display().await?;
    Ok(())
}
