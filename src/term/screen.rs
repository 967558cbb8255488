//! The display grid and its ECMA-48 dispatch.
//!
//! `Screen` is the mutable state behind the emulator lock: a `width × height`
//! grid of styled cells, a cursor, the current SGR attributes, a saved-cursor
//! slot and a scroll region. It implements [`vte::Perform`], so the `vte`
//! parser drives it directly; everything it does not understand is consumed
//! and ignored, never a panic. Container processes emit arbitrary bytes and
//! the grid has to survive all of them.

use tracing::trace;
use unicode_width::UnicodeWidthChar;
use vte::{Params, Perform};

use super::cell::{Cell, CellStyle, Color, Cursor};

/// Point-in-time copy of the grid, handed to the view.
#[derive(Debug, Clone)]
pub struct ScreenSnapshot {
    pub width: usize,
    pub height: usize,
    pub cells: Vec<Vec<Cell>>,
    pub cursor: Cursor,
}

#[derive(Debug)]
pub struct Screen {
    width: usize,
    height: usize,
    cells: Vec<Vec<Cell>>,
    cursor: Cursor,
    style: CellStyle,
    saved_cursor: Option<Cursor>,
    /// Inclusive scroll region rows, always `top <= bottom < height`.
    scroll_top: usize,
    scroll_bottom: usize,
    /// Deferred autowrap: set when a print filled the last column, consumed
    /// by the next print. The cursor itself never leaves the grid.
    wrap_pending: bool,
}

impl Screen {
    pub fn new(width: u16, height: u16) -> Self {
        let width = width.max(1) as usize;
        let height = height.max(1) as usize;
        Self {
            width,
            height,
            cells: vec![vec![Cell::blank(); width]; height],
            cursor: Cursor::default(),
            style: CellStyle::default(),
            saved_cursor: None,
            scroll_top: 0,
            scroll_bottom: height - 1,
            wrap_pending: false,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn snapshot(&self) -> ScreenSnapshot {
        ScreenSnapshot {
            width: self.width,
            height: self.height,
            cells: self.cells.clone(),
            cursor: self.cursor,
        }
    }

    /// Reallocate the grid to `w × h`, keeping the content that stays in
    /// range. The cursor is clamped and the scroll region reset to the full
    /// screen; new cells are blank.
    pub fn resize(&mut self, w: u16, h: u16) {
        let w = w.max(1) as usize;
        let h = h.max(1) as usize;
        if w == self.width && h == self.height {
            return;
        }
        let mut cells = vec![vec![Cell::blank(); w]; h];
        for (row, new_row) in self.cells.iter().zip(cells.iter_mut()) {
            let n = row.len().min(w);
            new_row[..n].copy_from_slice(&row[..n]);
        }
        self.cells = cells;
        self.width = w;
        self.height = h;
        self.cursor.x = self.cursor.x.min(w - 1);
        self.cursor.y = self.cursor.y.min(h - 1);
        if let Some(saved) = self.saved_cursor.as_mut() {
            saved.x = saved.x.min(w - 1);
            saved.y = saved.y.min(h - 1);
        }
        self.scroll_top = 0;
        self.scroll_bottom = h - 1;
        self.wrap_pending = false;
    }

    /// Clear everything and home the cursor. Used at session start.
    pub fn reset(&mut self) {
        for row in &mut self.cells {
            row.fill(Cell::blank());
        }
        self.cursor = Cursor::default();
        self.style = CellStyle::default();
        self.saved_cursor = None;
        self.scroll_top = 0;
        self.scroll_bottom = self.height - 1;
        self.wrap_pending = false;
    }

    fn clear_all(&mut self) {
        for row in &mut self.cells {
            row.fill(Cell::blank());
        }
    }

    /// Shift the scroll region up by `n`, blanking the rows that open at the
    /// bottom.
    fn scroll_up(&mut self, n: usize) {
        let region = self.scroll_bottom - self.scroll_top + 1;
        let n = n.min(region);
        for _ in 0..n {
            self.cells[self.scroll_top..=self.scroll_bottom].rotate_left(1);
            self.cells[self.scroll_bottom].fill(Cell::blank());
        }
    }

    fn scroll_down(&mut self, n: usize) {
        let region = self.scroll_bottom - self.scroll_top + 1;
        let n = n.min(region);
        for _ in 0..n {
            self.cells[self.scroll_top..=self.scroll_bottom].rotate_right(1);
            self.cells[self.scroll_top].fill(Cell::blank());
        }
    }

    /// Move down one line, scrolling when the cursor sits on the bottom of
    /// the scroll region.
    fn linefeed(&mut self) {
        if self.cursor.y == self.scroll_bottom {
            self.scroll_up(1);
        } else if self.cursor.y + 1 < self.height {
            self.cursor.y += 1;
        }
    }

    fn reverse_linefeed(&mut self) {
        if self.cursor.y == self.scroll_top {
            self.scroll_down(1);
        } else if self.cursor.y > 0 {
            self.cursor.y -= 1;
        }
    }

    fn erase_display(&mut self, mode: u16) {
        match mode {
            0 => {
                self.erase_line(0);
                for row in &mut self.cells[(self.cursor.y + 1).min(self.height)..] {
                    row.fill(Cell::blank());
                }
            }
            1 => {
                self.erase_line(1);
                for row in &mut self.cells[..self.cursor.y] {
                    row.fill(Cell::blank());
                }
            }
            2 | 3 => self.clear_all(),
            _ => {}
        }
    }

    fn erase_line(&mut self, mode: u16) {
        let row = &mut self.cells[self.cursor.y];
        match mode {
            0 => row[self.cursor.x..].fill(Cell::blank()),
            1 => row[..=self.cursor.x.min(self.width - 1)].fill(Cell::blank()),
            2 => row.fill(Cell::blank()),
            _ => {}
        }
    }

    fn set_scroll_region(&mut self, params: &Params) {
        let mut iter = params.iter();
        let top = iter.next().and_then(|p| p.first()).copied().unwrap_or(0);
        let bottom = iter.next().and_then(|p| p.first()).copied().unwrap_or(0);
        let top = if top == 0 { 1 } else { top } as usize - 1;
        let bottom = if bottom == 0 {
            self.height
        } else {
            (bottom as usize).min(self.height)
        } - 1;
        if top < bottom {
            self.scroll_top = top;
            self.scroll_bottom = bottom;
            self.cursor = Cursor::default();
        }
    }

    fn sgr(&mut self, params: &Params) {
        // An empty parameter list means reset.
        if params.is_empty() {
            self.style = CellStyle::default();
            return;
        }
        let mut iter = params.iter();
        while let Some(param) = iter.next() {
            match param.first().copied().unwrap_or(0) {
                0 => self.style = CellStyle::default(),
                1 => self.style.bold = true,
                2 => self.style.dim = true,
                3 => self.style.italic = true,
                4 => self.style.underline = true,
                5 | 6 => self.style.blink = true,
                7 => self.style.reverse = true,
                8 => self.style.hidden = true,
                9 => self.style.strikethrough = true,
                22 => {
                    self.style.bold = false;
                    self.style.dim = false;
                }
                23 => self.style.italic = false,
                24 => self.style.underline = false,
                25 => self.style.blink = false,
                27 => self.style.reverse = false,
                28 => self.style.hidden = false,
                29 => self.style.strikethrough = false,
                n @ 30..=37 => self.style.fg = Color::Indexed((n - 30) as u8),
                38 => {
                    if let Some(color) = Self::extended_color(param, &mut iter) {
                        self.style.fg = color;
                    }
                }
                39 => self.style.fg = Color::Default,
                n @ 40..=47 => self.style.bg = Color::Indexed((n - 40) as u8),
                48 => {
                    if let Some(color) = Self::extended_color(param, &mut iter) {
                        self.style.bg = color;
                    }
                }
                49 => self.style.bg = Color::Default,
                n @ 90..=97 => self.style.fg = Color::Indexed((n - 90 + 8) as u8),
                n @ 100..=107 => self.style.bg = Color::Indexed((n - 100 + 8) as u8),
                other => trace!(sgr = other, "ignoring unsupported SGR parameter"),
            }
        }
    }

    /// Decode `38;5;n` / `38;2;r;g;b` (and the `48` equivalents), in both
    /// the semicolon-separated and colon-subparameter encodings.
    fn extended_color<'a>(
        param: &[u16],
        iter: &mut impl Iterator<Item = &'a [u16]>,
    ) -> Option<Color> {
        // Colon form: the whole spec arrives as one subparameter slice.
        if param.len() > 1 {
            return match param.get(1)? {
                5 => Some(Color::Indexed(*param.get(2)? as u8)),
                2 => Some(Color::Rgb(
                    *param.get(2)? as u8,
                    *param.get(3)? as u8,
                    *param.get(4)? as u8,
                )),
                _ => None,
            };
        }
        // Semicolon form: the mode and channels are separate parameters.
        match iter.next()?.first()? {
            5 => Some(Color::Indexed(*iter.next()?.first()? as u8)),
            2 => Some(Color::Rgb(
                *iter.next()?.first()? as u8,
                *iter.next()?.first()? as u8,
                *iter.next()?.first()? as u8,
            )),
            _ => None,
        }
    }

    fn first_param(params: &Params, default: u16) -> u16 {
        let n = params
            .iter()
            .next()
            .and_then(|p| p.first())
            .copied()
            .unwrap_or(default);
        if n == 0 {
            default
        } else {
            n
        }
    }

    fn private_mode(&mut self, params: &Params, _enable: bool) {
        for param in params.iter() {
            match param.first().copied().unwrap_or(0) {
                // Alternate screen (with or without saved cursor). A real
                // alternate screen buffer is out of scope; clearing keeps
                // full-screen programs from painting over stale content.
                47 | 1047 | 1049 => self.clear_all(),
                mode => trace!(mode, "ignoring private mode"),
            }
        }
    }
}

impl Perform for Screen {
    fn print(&mut self, c: char) {
        let w = c.width().unwrap_or(0);
        if w == 0 {
            return;
        }
        if self.wrap_pending {
            self.wrap_pending = false;
            self.cursor.x = 0;
            self.linefeed();
        }
        self.cells[self.cursor.y][self.cursor.x] = Cell {
            ch: c,
            style: self.style,
        };
        // A wide character occupies its cell and the one after it.
        if w == 2 && self.cursor.x + 1 < self.width {
            self.cells[self.cursor.y][self.cursor.x + 1] = Cell {
                ch: ' ',
                style: self.style,
            };
        }
        if self.cursor.x + w >= self.width {
            self.cursor.x = self.width - 1;
            self.wrap_pending = true;
        } else {
            self.cursor.x += w;
        }
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            0x08 => {
                self.wrap_pending = false;
                self.cursor.x = self.cursor.x.saturating_sub(1);
            }
            0x09 => {
                let next_stop = (self.cursor.x / 8 + 1) * 8;
                self.cursor.x = next_stop.min(self.width - 1);
            }
            0x0A | 0x0B | 0x0C => {
                self.wrap_pending = false;
                self.linefeed();
            }
            0x0D => {
                self.wrap_pending = false;
                self.cursor.x = 0;
            }
            0x07 => {} // BEL
            _ => {}
        }
    }

    fn csi_dispatch(&mut self, params: &Params, intermediates: &[u8], _ignore: bool, action: char) {
        // Any explicit cursor motion cancels a deferred wrap.
        if matches!(action, 'A' | 'B' | 'C' | 'D' | 'G' | 'H' | 'f' | 'u') {
            self.wrap_pending = false;
        }
        if intermediates.first() == Some(&b'?') {
            match action {
                'h' => self.private_mode(params, true),
                'l' => self.private_mode(params, false),
                _ => trace!(?action, "ignoring private CSI sequence"),
            }
            return;
        }
        match action {
            'A' => {
                let n = Self::first_param(params, 1) as usize;
                self.cursor.y = self.cursor.y.saturating_sub(n);
            }
            'B' => {
                let n = Self::first_param(params, 1) as usize;
                self.cursor.y = (self.cursor.y + n).min(self.height - 1);
            }
            'C' => {
                let n = Self::first_param(params, 1) as usize;
                self.cursor.x = (self.cursor.x + n).min(self.width - 1);
            }
            'D' => {
                let n = Self::first_param(params, 1) as usize;
                self.cursor.x = self.cursor.x.saturating_sub(n);
            }
            'G' => {
                let col = Self::first_param(params, 1) as usize - 1;
                self.cursor.x = col.min(self.width - 1);
            }
            'H' | 'f' => {
                let mut iter = params.iter();
                let row = iter.next().and_then(|p| p.first()).copied().unwrap_or(1);
                let col = iter.next().and_then(|p| p.first()).copied().unwrap_or(1);
                let row = row.max(1) as usize - 1;
                let col = col.max(1) as usize - 1;
                self.cursor.y = row.min(self.height - 1);
                self.cursor.x = col.min(self.width - 1);
            }
            'J' => {
                let mode = params
                    .iter()
                    .next()
                    .and_then(|p| p.first())
                    .copied()
                    .unwrap_or(0);
                self.erase_display(mode);
            }
            'K' => {
                let mode = params
                    .iter()
                    .next()
                    .and_then(|p| p.first())
                    .copied()
                    .unwrap_or(0);
                self.erase_line(mode);
            }
            'S' => self.scroll_up(Self::first_param(params, 1) as usize),
            'T' => self.scroll_down(Self::first_param(params, 1) as usize),
            'm' => self.sgr(params),
            'r' => self.set_scroll_region(params),
            's' => self.saved_cursor = Some(self.cursor),
            'u' => {
                if let Some(saved) = self.saved_cursor {
                    self.cursor.x = saved.x.min(self.width - 1);
                    self.cursor.y = saved.y.min(self.height - 1);
                }
            }
            other => trace!(action = ?other, "ignoring unsupported CSI sequence"),
        }
    }

    fn esc_dispatch(&mut self, _intermediates: &[u8], _ignore: bool, byte: u8) {
        match byte {
            b'7' => self.saved_cursor = Some(self.cursor),
            b'8' => {
                if let Some(saved) = self.saved_cursor {
                    self.cursor.x = saved.x.min(self.width - 1);
                    self.cursor.y = saved.y.min(self.height - 1);
                }
            }
            b'D' => self.linefeed(),
            b'E' => {
                self.cursor.x = 0;
                self.linefeed();
            }
            b'M' => self.reverse_linefeed(),
            b'c' => self.reset(),
            _ => {}
        }
    }

    fn osc_dispatch(&mut self, _params: &[&[u8]], _bell_terminated: bool) {
        // Window titles and friends have no place on the grid.
    }

    fn hook(&mut self, _params: &Params, _intermediates: &[u8], _ignore: bool, _action: char) {}

    fn put(&mut self, _byte: u8) {}

    fn unhook(&mut self) {}
}
