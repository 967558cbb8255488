//! A small pulse indicator for long-running work.
//!
//! The pulse advances on a timer tick or on an explicit event, whichever
//! comes first, so a chatty stream animates faster than an idle one. The
//! driving task stops through a done channel, same shape as the session
//! pumps.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

const FRAMES: &[char] = &['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

pub struct ActivityGauge {
    position: Arc<AtomicUsize>,
    event_tx: mpsc::Sender<()>,
    done_tx: Option<mpsc::Sender<()>>,
}

impl ActivityGauge {
    /// Spawn the driving task. `interval` is the idle animation rate.
    pub fn start(interval: Duration) -> Self {
        let position = Arc::new(AtomicUsize::new(0));
        let (event_tx, mut event_rx) = mpsc::channel::<()>(16);
        let (done_tx, mut done_rx) = mpsc::channel::<()>(1);

        let pos = position.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = done_rx.recv() => break,
                    _ = event_rx.recv() => {
                        pos.fetch_add(1, Ordering::Relaxed);
                    }
                    _ = tokio::time::sleep(interval) => {
                        pos.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            debug!("activity gauge stopped");
        });

        Self {
            position,
            event_tx,
            done_tx: Some(done_tx),
        }
    }

    /// Advance the pulse ahead of the timer. Lossy under burst, which is
    /// fine for an indicator.
    pub fn pulse(&self) {
        let _ = self.event_tx.try_send(());
    }

    /// The glyph for the current pulse position.
    pub fn symbol(&self) -> char {
        FRAMES[self.position.load(Ordering::Relaxed) % FRAMES.len()]
    }

    pub fn stop(&mut self) {
        if let Some(done) = self.done_tx.take() {
            let _ = done.try_send(());
        }
    }
}

impl Drop for ActivityGauge {
    fn drop(&mut self) {
        self.stop();
    }
}
