//! Key bindings for the terminal notebook.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    NextPage,
    PrevPage,
    LinkUp,
    LinkDown,
    ScrollUp,
    ScrollDown,
    ActivateLink,
    CloseTab,
    Refresh,
    Quit,
}

/// Map a terminal key to a notebook command. Releases are ignored.
#[must_use]
pub fn command_for_key(key: &KeyEvent) -> Option<Command> {
    if !matches!(key.kind, KeyEventKind::Press | KeyEventKind::Repeat) {
        return None;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('c') => Some(Command::Quit),
            _ => None,
        };
    }
    let command = match key.code {
        KeyCode::Right | KeyCode::Tab => Command::NextPage,
        KeyCode::Left | KeyCode::BackTab => Command::PrevPage,
        KeyCode::Up => Command::LinkUp,
        KeyCode::Down => Command::LinkDown,
        KeyCode::PageUp => Command::ScrollUp,
        KeyCode::PageDown => Command::ScrollDown,
        KeyCode::Enter => Command::ActivateLink,
        KeyCode::Char('w') => Command::CloseTab,
        KeyCode::Char('r') => Command::Refresh,
        KeyCode::Char('q') | KeyCode::Esc => Command::Quit,
        _ => return None,
    };
    Some(command)
}
