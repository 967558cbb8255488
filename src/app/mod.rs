//! The host event loop.
//!
//! A synchronous poll-driven loop on the main thread, with the async session
//! machinery reaching back through two atomic flags: fast-refresh sets
//! `needs_render` so container output paints ahead of the normal tick, and
//! the cancel handler sets `stop_requested` so a detach match, the Close
//! button, and engine end-of-stream all funnel into the same exit path.
//! Controller calls are short lock-and-go operations, so `Handle::block_on`
//! from the loop thread is cheap.

use std::io::Stdout;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{self, Event, KeyEventKind};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::{debug, warn};

use crate::services::session::SessionController;
use crate::view::{ActivityGauge, SessionKeyAction, SessionView};

const FRAME_DURATION: Duration = Duration::from_millis(16);
const IDLE_POLL: Duration = Duration::from_millis(50);
const GAUGE_INTERVAL: Duration = Duration::from_millis(250);

pub struct App {
    controller: Arc<SessionController>,
    view: SessionView,
    needs_render: Arc<AtomicBool>,
    stop_requested: Arc<AtomicBool>,
}

impl App {
    /// Wire the controller's handlers to the loop flags. Call before the
    /// session is displayed so no refresh poke is lost.
    pub async fn new(controller: Arc<SessionController>, title: impl Into<String>) -> Self {
        let view = SessionView::new(title, controller.detach_keys());
        let needs_render = Arc::new(AtomicBool::new(true));
        let stop_requested = Arc::new(AtomicBool::new(false));

        let refresh = needs_render.clone();
        controller
            .set_fast_refresh_handler(Arc::new(move || {
                refresh.store(true, Ordering::Relaxed);
            }))
            .await;

        let stop = stop_requested.clone();
        let repaint = needs_render.clone();
        controller
            .set_cancel_handler(Arc::new(move || {
                stop.store(true, Ordering::Relaxed);
                repaint.store(true, Ordering::Relaxed);
            }))
            .await;

        Self {
            controller,
            view,
            needs_render,
            stop_requested,
        }
    }

    /// A handle the caller can poke to end the loop, e.g. when the engine
    /// stream reaches EOF.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop_requested.clone()
    }

    /// Run until stop is requested. Tears the session down via `hide` before
    /// returning, so the caller gets back a quiescent controller.
    pub fn run(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<Stdout>>,
        handle: &tokio::runtime::Handle,
    ) -> Result<()> {
        // The gauge task needs a runtime context to spawn; the guard must
        // not outlive this block or block_on below would panic.
        let gauge = {
            let _guard = handle.enter();
            ActivityGauge::start(GAUGE_INTERVAL)
        };

        let mut last_render: Option<Instant> = None;
        let mut needs_render = true;

        loop {
            if self.stop_requested.load(Ordering::Relaxed) {
                debug!("stop requested, leaving event loop");
                break;
            }
            if self.needs_render.swap(false, Ordering::Relaxed) {
                needs_render = true;
                gauge.pulse();
            }

            let frame_due = last_render.map_or(true, |t| t.elapsed() >= FRAME_DURATION);
            if needs_render && frame_due {
                let snapshot = self.controller.emulator().snapshot();
                let view = &mut self.view;
                let symbol = gauge.symbol();
                terminal.draw(|frame| {
                    let area = frame.area();
                    view.render(frame, area, &snapshot);
                    // Pulse glyph in the top-right corner of the border.
                    if area.width >= 3 {
                        if let Some(cell) =
                            frame.buffer_mut().cell_mut((area.right() - 2, area.y))
                        {
                            cell.set_char(symbol);
                        }
                    }
                })?;
                last_render = Some(Instant::now());
                needs_render = false;

                if let Some((w, h)) = self.view.take_pending_resize() {
                    handle.block_on(self.controller.set_tty_size(w, h));
                    needs_render = true;
                }
            }

            let timeout = match last_render {
                Some(t) if needs_render => FRAME_DURATION.saturating_sub(t.elapsed()),
                _ => IDLE_POLL,
            };
            if !event::poll(timeout)? {
                continue;
            }
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    match self.view.handle_key(key) {
                        SessionKeyAction::Forward(key) => {
                            if let Err(e) = handle.block_on(self.controller.write_key(&key)) {
                                warn!(error = %e, "failed to forward key");
                            }
                        }
                        SessionKeyAction::Cancel => {
                            self.stop_requested.store(true, Ordering::Relaxed);
                        }
                        SessionKeyAction::Consumed => {
                            needs_render = true;
                        }
                    }
                }
                Event::Resize(_, _) => {
                    needs_render = true;
                }
                _ => {}
            }
        }

        handle.block_on(self.controller.hide());
        Ok(())
    }
}
