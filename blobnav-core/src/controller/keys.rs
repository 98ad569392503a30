//! src/controller/keys.rs
//! Key event constructors and classification helpers.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

pub fn key(c: char) -> KeyEvent {
    KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)
}

pub fn shift(c: char) -> KeyEvent {
    KeyEvent::new(KeyCode::Char(c), KeyModifiers::SHIFT)
}

pub fn ctrl(c: char) -> KeyEvent {
    KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
}

pub fn arrow_key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
}

pub fn enter_key() -> KeyEvent {
    KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE)
}

pub fn escape_key() -> KeyEvent {
    KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE)
}

/// Keys whose hold is emulated as repeated selection moves.
#[must_use]
pub const fn is_repeatable(code: KeyCode) -> bool {
    matches!(code, KeyCode::Up | KeyCode::Down)
}

/// Terminals report letters inconsistently: some send `'G'` + SHIFT, others
/// `'g'` + SHIFT. Letters follow the shift flag; other characters pass as-is.
#[must_use]
pub fn normalize_char(c: char, modifiers: KeyModifiers) -> char {
    if !c.is_alphabetic() {
        return c;
    }

    if modifiers.contains(KeyModifiers::SHIFT) {
        c.to_uppercase().next().unwrap_or(c)
    } else {
        c.to_lowercase().next().unwrap_or(c)
    }
}

/// Short printable name for a non-character key, used as the binding label.
#[must_use]
pub fn key_name(code: KeyCode) -> &'static str {
    match code {
        KeyCode::Enter => "<Enter>",
        KeyCode::Esc => "<Esc>",
        KeyCode::Up => "<Up>",
        KeyCode::Down => "<Down>",
        KeyCode::Left => "<Left>",
        KeyCode::Right => "<Right>",
        KeyCode::Backspace => "<BS>",
        KeyCode::PageUp => "<PageUp>",
        KeyCode::PageDown => "<PageDown>",
        KeyCode::Home => "<Home>",
        KeyCode::End => "<End>",
        _ => "<Key>",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_letters_follow_shift() {
        assert_eq!(normalize_char('G', KeyModifiers::SHIFT), 'G');
        assert_eq!(normalize_char('g', KeyModifiers::SHIFT), 'G');
        assert_eq!(normalize_char('G', KeyModifiers::NONE), 'g');
        assert_eq!(normalize_char('j', KeyModifiers::NONE), 'j');
    }

    #[test]
    fn test_normalize_leaves_symbols_alone() {
        assert_eq!(normalize_char('/', KeyModifiers::NONE), '/');
        assert_eq!(normalize_char(':', KeyModifiers::SHIFT), ':');
        assert_eq!(normalize_char(']', KeyModifiers::NONE), ']');
    }
}
