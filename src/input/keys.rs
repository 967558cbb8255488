//! Key events to PTY byte sequences.
//!
//! The session forwards raw bytes to the container's terminal, so every key
//! the view does not handle itself has to become the byte sequence a real
//! terminal would send: C0 control characters for Ctrl combinations, ESC
//! prefixes for Alt, CSI sequences for navigation keys, UTF-8 for everything
//! printable.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

const ESC: u8 = 0x1b;

/// CSI sequence with an optional `1;<mod>` modifier parameter, e.g.
/// `ESC [ A` for Up and `ESC [ 1;5 A` for Ctrl-Up.
fn csi_cursor(final_byte: u8, modifiers: KeyModifiers) -> Vec<u8> {
    match modifier_param(modifiers) {
        None => vec![ESC, b'[', final_byte],
        Some(m) => vec![ESC, b'[', b'1', b';', m, final_byte],
    }
}

/// xterm modifier parameter: shift=2, alt=3, ctrl=5.
fn modifier_param(modifiers: KeyModifiers) -> Option<u8> {
    if modifiers.contains(KeyModifiers::CONTROL) {
        Some(b'5')
    } else if modifiers.contains(KeyModifiers::ALT) {
        Some(b'3')
    } else if modifiers.contains(KeyModifiers::SHIFT) {
        Some(b'2')
    } else {
        None
    }
}

/// Tilde-form CSI sequence, e.g. `ESC [ 3 ~` for Delete.
fn csi_tilde(code: &[u8], modifiers: KeyModifiers) -> Vec<u8> {
    let mut bytes = vec![ESC, b'['];
    bytes.extend_from_slice(code);
    if let Some(m) = modifier_param(modifiers) {
        bytes.extend_from_slice(&[b';', m]);
    }
    bytes.push(b'~');
    bytes
}

fn ctrl_byte(c: char) -> Option<u8> {
    let c = c.to_ascii_lowercase();
    if c.is_ascii_lowercase() {
        return Some(c as u8 - b'a' + 1);
    }
    match c {
        '@' | '2' | ' ' => Some(0x00),
        '[' | '3' => Some(0x1b),
        '\\' | '4' => Some(0x1c),
        ']' | '5' => Some(0x1d),
        '^' | '6' => Some(0x1e),
        '_' | '7' => Some(0x1f),
        '?' => Some(0x7f),
        _ => None,
    }
}

fn utf8_bytes(c: char) -> Vec<u8> {
    let mut buf = [0u8; 4];
    c.encode_utf8(&mut buf).as_bytes().to_vec()
}

/// Translate a key event into the bytes a terminal would transmit.
/// Returns `None` for keys that have no byte representation (media keys,
/// bare modifiers and the like); those are simply not forwarded.
pub fn encode_key(event: &KeyEvent) -> Option<Vec<u8>> {
    let mods = event.modifiers;
    let ctrl = mods.contains(KeyModifiers::CONTROL);
    let alt = mods.contains(KeyModifiers::ALT);

    if let KeyCode::Char(c) = event.code {
        if ctrl && !alt {
            return ctrl_byte(c).map(|b| vec![b]);
        }
        if alt && !ctrl && c.is_ascii() {
            return Some(vec![ESC, c as u8]);
        }
        return Some(utf8_bytes(c));
    }

    match event.code {
        KeyCode::Enter => Some(vec![b'\r']),
        KeyCode::Esc => Some(vec![ESC]),
        KeyCode::Backspace => {
            if ctrl {
                Some(vec![0x17]) // delete word
            } else {
                Some(vec![0x7f])
            }
        }
        KeyCode::Tab => Some(vec![b'\t']),
        KeyCode::BackTab => Some(vec![ESC, b'[', b'Z']),
        KeyCode::Up => Some(csi_cursor(b'A', mods)),
        KeyCode::Down => Some(csi_cursor(b'B', mods)),
        KeyCode::Right => Some(csi_cursor(b'C', mods)),
        KeyCode::Left => Some(csi_cursor(b'D', mods)),
        KeyCode::Home => Some(csi_cursor(b'H', mods)),
        KeyCode::End => Some(csi_cursor(b'F', mods)),
        KeyCode::Insert => Some(csi_tilde(b"2", mods)),
        KeyCode::Delete => Some(csi_tilde(b"3", mods)),
        KeyCode::PageUp => Some(csi_tilde(b"5", mods)),
        KeyCode::PageDown => Some(csi_tilde(b"6", mods)),
        KeyCode::F(n) => function_key(n),
        _ => None,
    }
}

fn function_key(n: u8) -> Option<Vec<u8>> {
    match n {
        1..=4 => Some(vec![ESC, b'O', b'P' + (n - 1)]),
        5 => Some(vec![ESC, b'[', b'1', b'5', b'~']),
        6..=8 => Some(vec![ESC, b'[', b'1', b'7' + (n - 6), b'~']),
        9..=10 => Some(vec![ESC, b'[', b'2', b'0' + (n - 9), b'~']),
        11..=12 => Some(vec![ESC, b'[', b'2', b'3' + (n - 11), b'~']),
        _ => None,
    }
}
