//! Full-screen terminal view for an interactive container session.
//!
//! The view is deliberately thin: it paints whatever snapshot the emulator
//! holds and turns key events into actions for the host. It never talks to
//! the engine itself, and because `render` runs inside the synchronous draw
//! closure it cannot await the controller either — a size mismatch is
//! recorded as a pending resize the host applies afterwards.

use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

use crate::term::{CellStyle, ScreenSnapshot, Color as TermColor};

/// Which widget receives key events; Tab toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionFocus {
    #[default]
    Terminal,
    CloseButton,
}

/// What the host should do with a key event the view handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionKeyAction {
    /// Send the event to the session's stdin.
    Forward(KeyEvent),
    /// The Close button was activated; cancel the session.
    Cancel,
    /// The view consumed the event (focus change).
    Consumed,
}

#[derive(Debug, Default)]
pub struct SessionView {
    focus: SessionFocus,
    title: String,
    detach_hint: String,
    /// Set during `render` when the drawable region disagrees with the
    /// snapshot size; the host drains it and calls the controller.
    pending_resize: Option<(u16, u16)>,
}

impl SessionView {
    pub fn new(title: impl Into<String>, detach_keys: &str) -> Self {
        Self {
            title: title.into(),
            detach_hint: format!("detach: {detach_keys}"),
            ..Self::default()
        }
    }

    pub fn focus(&self) -> SessionFocus {
        self.focus
    }

    /// The resize recorded by the last `render`, if any. Draining resets it
    /// so the host only issues one resize per geometry change.
    pub fn take_pending_resize(&mut self) -> Option<(u16, u16)> {
        self.pending_resize.take()
    }

    /// Route a key event. Terminal focus forwards everything except Tab;
    /// button focus answers to Enter and Tab only, swallowing the rest so
    /// stray keystrokes cannot reach the container.
    pub fn handle_key(&mut self, event: KeyEvent) -> SessionKeyAction {
        match (self.focus, event.code) {
            (_, KeyCode::Tab) => {
                self.focus = match self.focus {
                    SessionFocus::Terminal => SessionFocus::CloseButton,
                    SessionFocus::CloseButton => SessionFocus::Terminal,
                };
                SessionKeyAction::Consumed
            }
            (SessionFocus::CloseButton, KeyCode::Enter) => SessionKeyAction::Cancel,
            (SessionFocus::CloseButton, _) => SessionKeyAction::Consumed,
            (SessionFocus::Terminal, _) => SessionKeyAction::Forward(event),
        }
    }

    /// Paint the snapshot into `area`: bordered terminal region on top, a
    /// one-line footer with the Close button and the detach hint below.
    pub fn render(&mut self, frame: &mut Frame, area: Rect, snapshot: &ScreenSnapshot) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(3), Constraint::Length(1)])
            .split(area);

        frame.render_widget(Clear, area);
        self.render_terminal(frame, chunks[0], snapshot);
        self.render_footer(frame, chunks[1]);
    }

    fn render_terminal(&mut self, frame: &mut Frame, area: Rect, snapshot: &ScreenSnapshot) {
        let border_style = if self.focus == SessionFocus::Terminal {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        let block = Block::default()
            .title(self.title.as_str())
            .borders(Borders::ALL)
            .border_style(border_style);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        if inner.width == 0 || inner.height == 0 {
            return;
        }

        if (inner.width, inner.height) != (snapshot.width as u16, snapshot.height as u16) {
            self.pending_resize = Some((inner.width, inner.height));
        }

        let buf = frame.buffer_mut();
        let rows = snapshot.height.min(inner.height as usize);
        let cols = snapshot.width.min(inner.width as usize);
        for y in 0..rows {
            for x in 0..cols {
                let cell = snapshot.cells[y][x];
                if let Some(target) = buf.cell_mut((inner.x + x as u16, inner.y + y as u16)) {
                    target.set_char(cell.ch);
                    target.set_style(convert_style(&cell.style));
                }
            }
        }

        // Cursor as a reverse-video overlay. A just-resized emulator can
        // report a cursor outside the drawable region for one frame.
        let cursor = snapshot.cursor;
        if self.focus == SessionFocus::Terminal && cursor.x < cols && cursor.y < rows {
            if let Some(target) =
                buf.cell_mut((inner.x + cursor.x as u16, inner.y + cursor.y as u16))
            {
                let style = target.style().add_modifier(Modifier::REVERSED);
                target.set_style(style);
            }
        }
    }

    fn render_footer(&self, frame: &mut Frame, area: Rect) {
        let button_style = if self.focus == SessionFocus::CloseButton {
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Cyan)
        };
        let line = Line::from(vec![
            Span::styled(" [ Close ] ", button_style),
            Span::raw("  Tab: focus  "),
            Span::styled(&self.detach_hint, Style::default().fg(Color::DarkGray)),
        ]);
        frame.render_widget(Paragraph::new(line), area);
    }
}

/// Emulator attributes → ratatui style. Default colors stay unset so the
/// surrounding theme shows through.
fn convert_style(style: &CellStyle) -> Style {
    let mut out = Style::default();
    if let Some(fg) = convert_color(style.fg) {
        out = out.fg(fg);
    }
    if let Some(bg) = convert_color(style.bg) {
        out = out.bg(bg);
    }
    if style.bold {
        out = out.add_modifier(Modifier::BOLD);
    }
    if style.dim {
        out = out.add_modifier(Modifier::DIM);
    }
    if style.italic {
        out = out.add_modifier(Modifier::ITALIC);
    }
    if style.underline {
        out = out.add_modifier(Modifier::UNDERLINED);
    }
    if style.blink {
        out = out.add_modifier(Modifier::SLOW_BLINK);
    }
    if style.reverse {
        out = out.add_modifier(Modifier::REVERSED);
    }
    if style.hidden {
        out = out.add_modifier(Modifier::HIDDEN);
    }
    if style.strikethrough {
        out = out.add_modifier(Modifier::CROSSED_OUT);
    }
    out
}

fn convert_color(color: TermColor) -> Option<Color> {
    match color {
        TermColor::Default => None,
        TermColor::Indexed(i) => Some(Color::Indexed(i)),
        TermColor::Rgb(r, g, b) => Some(Color::Rgb(r, g, b)),
    }
}
