//! The shared terminal emulator.
//!
//! One lock serializes the parser task (which mutates the grid) and the view
//! (which takes snapshots). The `vte` parser itself lives with the `parse`
//! call, so the lock is only held while a chunk of bytes is dispatched, never
//! across a pipe read.

use std::io;
use std::sync::{Mutex, MutexGuard};

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use super::cell::Cursor;
use super::screen::{Screen, ScreenSnapshot};

const PARSE_BUF_SIZE: usize = 4096;

#[derive(Debug)]
pub struct TerminalEmulator {
    screen: Mutex<Screen>,
}

impl TerminalEmulator {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            screen: Mutex::new(Screen::new(width, height)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Screen> {
        self.screen.lock().expect("emulator lock poisoned")
    }

    /// Atomic copy of the grid and cursor.
    pub fn snapshot(&self) -> ScreenSnapshot {
        self.lock().snapshot()
    }

    pub fn cursor(&self) -> Cursor {
        self.lock().cursor()
    }

    pub fn size(&self) -> (u16, u16) {
        let screen = self.lock();
        (screen.width() as u16, screen.height() as u16)
    }

    /// Resize the grid, keeping in-range content and clamping the cursor.
    /// Safe to call while a `parse` is mid-stream.
    pub fn resize(&self, width: u16, height: u16) {
        self.lock().resize(width, height);
    }

    /// Clear the grid for a fresh session.
    pub fn reset(&self) {
        self.lock().reset();
    }

    /// Drain `reader` through the ECMA-48 state machine until end-of-stream.
    /// Malformed and unsupported sequences are consumed without effect; the
    /// only exits are EOF (`Ok`) and a read error on the pipe.
    pub async fn parse<R>(&self, mut reader: R) -> io::Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut parser = vte::Parser::new();
        let mut buf = [0u8; PARSE_BUF_SIZE];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                debug!("vt stream reached end-of-file");
                return Ok(());
            }
            let mut screen = self.lock();
            parser.advance(&mut *screen, &buf[..n]);
        }
    }

    /// Feed a byte slice directly. Parser continuation state does not carry
    /// over between calls; use `parse` for streamed input.
    pub fn process(&self, bytes: &[u8]) {
        let mut parser = vte::Parser::new();
        let mut screen = self.lock();
        parser.advance(&mut *screen, bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::cell::Color;

    fn row_text(snapshot: &ScreenSnapshot, y: usize) -> String {
        snapshot.cells[y].iter().map(|c| c.ch).collect::<String>()
    }

    #[tokio::test]
    async fn plain_echo_lands_on_row_zero() {
        let term = TerminalEmulator::new(80, 24);
        term.parse(&b"hello\r\n"[..]).await.expect("parse");
        let snap = term.snapshot();
        assert_eq!(&row_text(&snap, 0)[..5], "hello");
        assert_eq!(snap.cursor, Cursor { x: 0, y: 1 });
    }

    #[tokio::test]
    async fn sgr_color_applies_and_reverts() {
        let term = TerminalEmulator::new(80, 24);
        term.parse(&b"\x1b[31mERR\x1b[0m ok"[..]).await.expect("parse");
        let snap = term.snapshot();
        for (i, ch) in "ERR".chars().enumerate() {
            assert_eq!(snap.cells[0][i].ch, ch);
            assert_eq!(snap.cells[0][i].style.fg, Color::Indexed(1));
        }
        assert_eq!(snap.cells[0][4].ch, 'o');
        assert_eq!(snap.cells[0][4].style.fg, Color::Default);
    }

    #[tokio::test]
    async fn resize_mid_stream_keeps_dimensions_honest() {
        let term = TerminalEmulator::new(80, 24);
        term.parse(&[b'A'; 100][..]).await.expect("parse");
        term.resize(40, 10);
        let snap = term.snapshot();
        assert_eq!((snap.width, snap.height), (40, 10));
        assert!(snap.cursor.x < 40 && snap.cursor.y < 10);

        // More output after the resize must stay in the new bounds.
        term.parse(&[b'B'; 500][..]).await.expect("parse");
        let snap = term.snapshot();
        assert_eq!((snap.width, snap.height), (40, 10));
        assert!(snap.cursor.x < 40 && snap.cursor.y < 10);
    }

    #[tokio::test]
    async fn resize_preserves_in_range_content() {
        let term = TerminalEmulator::new(80, 24);
        term.parse(&b"keep me"[..]).await.expect("parse");
        term.resize(40, 10);
        assert_eq!(&row_text(&term.snapshot(), 0)[..7], "keep me");
        term.resize(4, 2);
        assert_eq!(row_text(&term.snapshot(), 0), "keep");
    }

    #[tokio::test]
    async fn wrap_and_scroll_at_bottom() {
        let term = TerminalEmulator::new(5, 2);
        term.parse(&b"aaaaabbbbbccccc"[..]).await.expect("parse");
        let snap = term.snapshot();
        // First row scrolled away; last two visible. The cursor parks on the
        // last column with the wrap deferred.
        assert_eq!(row_text(&snap, 0), "bbbbb");
        assert_eq!(row_text(&snap, 1), "ccccc");
        assert_eq!(snap.cursor, Cursor { x: 4, y: 1 });
    }

    #[tokio::test]
    async fn cursor_movement_and_erase() {
        let term = TerminalEmulator::new(10, 4);
        term.parse(&b"abcdef\x1b[2;1Hxy\x1b[1;3H\x1b[K"[..])
            .await
            .expect("parse");
        let snap = term.snapshot();
        assert_eq!(row_text(&snap, 0), "ab        ");
        assert_eq!(&row_text(&snap, 1)[..2], "xy");
    }

    #[tokio::test]
    async fn save_and_restore_cursor() {
        let term = TerminalEmulator::new(20, 5);
        term.parse(&b"\x1b[2;4H\x1b[sMOVED\x1b[u*"[..]).await.expect("parse");
        let snap = term.snapshot();
        // '*' printed at the saved spot overwrites the 'M'.
        assert_eq!(snap.cells[1][3].ch, '*');
    }

    #[tokio::test]
    async fn scroll_region_confines_linefeeds() {
        let term = TerminalEmulator::new(10, 4);
        // Region rows 1..=2 (1-based 2..3); push three lines through it.
        term.parse(&b"\x1b[4;1Hbottom\x1b[1;1Htop\x1b[2;3r\x1b[2;1H1\r\n2\r\n3"[..])
            .await
            .expect("parse");
        let snap = term.snapshot();
        // Rows outside the region are untouched by the scroll.
        assert_eq!(&row_text(&snap, 0)[..3], "top");
        assert_eq!(&row_text(&snap, 3)[..6], "bottom");
        assert_eq!(snap.cells[1][0].ch, '2');
        assert_eq!(snap.cells[2][0].ch, '3');
    }

    #[tokio::test]
    async fn private_modes_are_harmless() {
        let term = TerminalEmulator::new(20, 5);
        term.parse(&b"before\x1b[?1049h\x1b[?25l\x1b[?1049lafter"[..])
            .await
            .expect("parse");
        let snap = term.snapshot();
        // Alternate-screen toggles clear the grid; nothing crashes.
        assert_eq!(snap.cells[0][0].ch, ' ');
        assert_eq!(snap.cells[0][6].ch, 'a');
    }

    #[tokio::test]
    async fn tabs_and_backspace() {
        let term = TerminalEmulator::new(20, 3);
        term.parse(&b"a\tb\x08c"[..]).await.expect("parse");
        let snap = term.snapshot();
        assert_eq!(snap.cells[0][0].ch, 'a');
        assert_eq!(snap.cells[0][8].ch, 'c');
    }

    #[tokio::test]
    async fn reset_then_same_input_is_idempotent() {
        let term = TerminalEmulator::new(30, 6);
        term.parse(&b"hello"[..]).await.expect("parse");
        let once = term.snapshot();
        term.reset();
        term.parse(&b"hello"[..]).await.expect("parse");
        term.reset();
        term.parse(&b"hello"[..]).await.expect("parse");
        let twice = term.snapshot();
        assert_eq!(once.cells, twice.cells);
        assert_eq!(once.cursor, twice.cursor);
    }

    #[tokio::test]
    async fn wide_characters_occupy_two_cells() {
        let term = TerminalEmulator::new(10, 2);
        term.parse("日x".as_bytes()).await.expect("parse");
        let snap = term.snapshot();
        assert_eq!(snap.cells[0][0].ch, '日');
        assert_eq!(snap.cells[0][2].ch, 'x');
    }

    /// Cross-check a mixed stream against an independent emulator.
    #[tokio::test]
    async fn agrees_with_reference_emulator_on_text_layout() {
        let input: &[u8] = b"one\r\ntwo\x1b[1;2Hz\x1b[2;4H!\x1b[31mred\x1b[m.";
        let term = TerminalEmulator::new(20, 5);
        term.parse(input).await.expect("parse");
        let snap = term.snapshot();

        let mut reference = vt100::Parser::new(5, 20, 0);
        reference.process(input);
        for row in 0..5 {
            for col in 0..20 {
                let ours = snap.cells[row][col].ch;
                let theirs = reference
                    .screen()
                    .cell(row as u16, col as u16)
                    .map(|c| c.contents())
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| " ".to_string());
                assert_eq!(
                    ours.to_string(),
                    theirs,
                    "cell ({row},{col}) disagrees with reference"
                );
            }
        }
        let (ref_row, ref_col) = reference.screen().cursor_position();
        assert_eq!((snap.cursor.y, snap.cursor.x), (ref_row as usize, ref_col as usize));
    }
}
