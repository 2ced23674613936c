//! Local key and mouse events to host key names.
//!
//! Names follow the editor's notation: printable characters go as-is,
//! everything else is wrapped in angle brackets with modifier prefixes,
//! e.g. `<C-A-Left>`, `<S-Tab>`, `<LeftMouse><12,3>`, `<ScrollWheelUp>`.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};

use crate::screen::PointerActivity;

/// Modifier prefixes in the order they appear in a key name.
fn modifier_prefix(modifiers: KeyModifiers, shift: bool) -> String {
    let mut prefix = String::new();
    if modifiers.contains(KeyModifiers::CONTROL) {
        prefix.push_str("C-");
    }
    if modifiers.contains(KeyModifiers::ALT) {
        prefix.push_str("A-");
    }
    if modifiers.intersects(KeyModifiers::SUPER | KeyModifiers::META) {
        prefix.push_str("D-");
    }
    if shift && modifiers.contains(KeyModifiers::SHIFT) {
        prefix.push_str("S-");
    }
    prefix
}

fn wrap(prefix: &str, name: &str) -> String {
    let name = format!("{prefix}{name}");
    if name.chars().count() > 1 {
        format!("<{name}>")
    } else {
        name
    }
}

/// Characters the host only understands by name.
fn char_name(ch: char) -> Option<&'static str> {
    Some(match ch {
        ' ' => "Space",
        '<' => "lt",
        '\\' => "Bslash",
        '|' => "Bar",
        _ => return None,
    })
}

pub fn resolve_key(event: &KeyEvent) -> Option<String> {
    if event.kind == KeyEventKind::Release {
        return None;
    }
    let modifiers = event.modifiers;
    let (name, shift_counts): (String, bool) = match event.code {
        KeyCode::Char(ch) => {
            let plain = !modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER);
            match char_name(ch) {
                Some(name) => (name.to_string(), false),
                None if plain => return Some(ch.to_string()),
                // Shift is already reflected in the character itself.
                None => (ch.to_string(), false),
            }
        }
        KeyCode::Enter => ("CR".into(), true),
        KeyCode::Tab => ("Tab".into(), true),
        KeyCode::BackTab => ("S-Tab".into(), false),
        KeyCode::Backspace => ("BS".into(), true),
        KeyCode::Esc => ("Esc".into(), true),
        KeyCode::Delete => ("Del".into(), true),
        KeyCode::Insert => ("Insert".into(), true),
        KeyCode::Left => ("Left".into(), true),
        KeyCode::Right => ("Right".into(), true),
        KeyCode::Up => ("Up".into(), true),
        KeyCode::Down => ("Down".into(), true),
        KeyCode::Home => ("Home".into(), true),
        KeyCode::End => ("End".into(), true),
        KeyCode::PageUp => ("PageUp".into(), true),
        KeyCode::PageDown => ("PageDown".into(), true),
        KeyCode::F(n) => (format!("F{n}"), true),
        _ => return None,
    };
    Some(wrap(&modifier_prefix(modifiers, shift_counts), &name))
}

/// Pointer state needed to drop repeated events at the same cell.
#[derive(Debug, Default)]
pub struct MouseTracker {
    last: Option<(MouseEventKind, u16, u16)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedMouse {
    pub key: String,
    pub activity: PointerActivity,
}

fn button_name(button: MouseButton) -> &'static str {
    match button {
        MouseButton::Left => "Left",
        MouseButton::Right => "Right",
        MouseButton::Middle => "Middle",
    }
}

impl MouseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&mut self, event: &MouseEvent) -> Option<ResolvedMouse> {
        let (x, y) = (event.column, event.row);
        let position = format!("<{x},{y}>");
        let (name, activity, with_position) = match event.kind {
            MouseEventKind::Down(button) => (format!("{}Mouse", button_name(button)), PointerActivity::Pressed, true),
            MouseEventKind::Drag(button) => (format!("{}Drag", button_name(button)), PointerActivity::Dragging, true),
            MouseEventKind::Up(button) => (format!("{}Release", button_name(button)), PointerActivity::Released, true),
            MouseEventKind::ScrollUp => ("ScrollWheelUp".to_string(), PointerActivity::Wheel, false),
            MouseEventKind::ScrollDown => ("ScrollWheelDown".to_string(), PointerActivity::Wheel, false),
            MouseEventKind::ScrollLeft => ("ScrollWheelLeft".to_string(), PointerActivity::Wheel, false),
            MouseEventKind::ScrollRight => ("ScrollWheelRight".to_string(), PointerActivity::Wheel, false),
            MouseEventKind::Moved => return None,
        };
        let current = (event.kind, x, y);
        if with_position && self.last == Some(current) {
            return None;
        }
        self.last = Some(current);

        let mut key = format!("<{}{name}>", modifier_prefix(event.modifiers, true));
        if with_position {
            key.push_str(&position);
        }
        Some(ResolvedMouse { key, activity })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    fn mouse(kind: MouseEventKind, column: u16, row: u16) -> MouseEvent {
        MouseEvent {
            kind,
            column,
            row,
            modifiers: KeyModifiers::NONE,
        }
    }

    #[test_timeout::timeout]
    fn printable_characters_pass_through() {
        assert_eq!(resolve_key(&key(KeyCode::Char('a'), KeyModifiers::NONE)).as_deref(), Some("a"));
        assert_eq!(resolve_key(&key(KeyCode::Char('A'), KeyModifiers::SHIFT)).as_deref(), Some("A"));
        assert_eq!(resolve_key(&key(KeyCode::Char('?'), KeyModifiers::SHIFT)).as_deref(), Some("?"));
        assert_eq!(resolve_key(&key(KeyCode::Char('é'), KeyModifiers::NONE)).as_deref(), Some("é"));
    }

    #[test_timeout::timeout]
    fn special_characters_use_names() {
        assert_eq!(resolve_key(&key(KeyCode::Char(' '), KeyModifiers::NONE)).as_deref(), Some("<Space>"));
        assert_eq!(resolve_key(&key(KeyCode::Char('<'), KeyModifiers::SHIFT)).as_deref(), Some("<lt>"));
        assert_eq!(resolve_key(&key(KeyCode::Char('|'), KeyModifiers::SHIFT)).as_deref(), Some("<Bar>"));
        assert_eq!(resolve_key(&key(KeyCode::Char('\\'), KeyModifiers::NONE)).as_deref(), Some("<Bslash>"));
    }

    #[test_timeout::timeout]
    fn modifiers_prefix_names() {
        assert_eq!(
            resolve_key(&key(KeyCode::Left, KeyModifiers::CONTROL | KeyModifiers::ALT)).as_deref(),
            Some("<C-A-Left>")
        );
        assert_eq!(resolve_key(&key(KeyCode::Char('w'), KeyModifiers::CONTROL)).as_deref(), Some("<C-w>"));
        assert_eq!(resolve_key(&key(KeyCode::Up, KeyModifiers::SHIFT)).as_deref(), Some("<S-Up>"));
        assert_eq!(resolve_key(&key(KeyCode::BackTab, KeyModifiers::SHIFT)).as_deref(), Some("<S-Tab>"));
        assert_eq!(resolve_key(&key(KeyCode::Enter, KeyModifiers::NONE)).as_deref(), Some("<CR>"));
        assert_eq!(resolve_key(&key(KeyCode::F(5), KeyModifiers::SUPER)).as_deref(), Some("<D-F5>"));
    }

    #[test_timeout::timeout]
    fn releases_and_unmapped_keys_are_dropped() {
        let mut release = key(KeyCode::Char('a'), KeyModifiers::NONE);
        release.kind = KeyEventKind::Release;
        assert_eq!(resolve_key(&release), None);
        assert_eq!(resolve_key(&key(KeyCode::CapsLock, KeyModifiers::NONE)), None);
    }

    #[test_timeout::timeout]
    fn mouse_buttons_carry_positions() {
        let mut tracker = MouseTracker::new();
        let down = tracker
            .resolve(&mouse(MouseEventKind::Down(MouseButton::Left), 12, 3))
            .expect("press");
        assert_eq!(down.key, "<LeftMouse><12,3>");
        assert_eq!(down.activity, PointerActivity::Pressed);

        let drag = tracker
            .resolve(&mouse(MouseEventKind::Drag(MouseButton::Left), 13, 3))
            .expect("drag");
        assert_eq!(drag.key, "<LeftDrag><13,3>");
        assert!(tracker.resolve(&mouse(MouseEventKind::Drag(MouseButton::Left), 13, 3)).is_none());

        let up = tracker
            .resolve(&mouse(MouseEventKind::Up(MouseButton::Left), 13, 3))
            .expect("release");
        assert_eq!(up.key, "<LeftRelease><13,3>");
        assert_eq!(up.activity, PointerActivity::Released);
    }

    #[test_timeout::timeout]
    fn wheel_events_repeat_and_take_modifiers() {
        let mut tracker = MouseTracker::new();
        let mut event = mouse(MouseEventKind::ScrollUp, 1, 1);
        assert_eq!(tracker.resolve(&event).map(|m| m.key).as_deref(), Some("<ScrollWheelUp>"));
        assert_eq!(tracker.resolve(&event).map(|m| m.key).as_deref(), Some("<ScrollWheelUp>"));
        event.modifiers = KeyModifiers::SHIFT;
        assert_eq!(tracker.resolve(&event).map(|m| m.key).as_deref(), Some("<S-ScrollWheelUp>"));
        assert!(tracker.resolve(&mouse(MouseEventKind::Moved, 4, 4)).is_none());
    }
}
