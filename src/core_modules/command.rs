// THEORY:
// Keyboard input arrives as raw symbols from whatever hosts the window. The
// `KeyMap` turns a symbol into a `Command` through a lookup table, so bindings
// live in one place and an unbound key is simply absent from the table.

use crate::core_modules::table::SwingDirection;
use crate::core_modules::warp::CornerId;
use std::collections::HashMap;

/// A key as delivered by the input host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Char(char),
    Left,
    Right,
    Up,
    Down,
}

impl Key {
    /// Parses a script token: a single character, or `left`/`right`/`up`/`down`/`space`.
    pub fn parse(token: &str) -> Option<Key> {
        match token {
            "left" => Some(Key::Left),
            "right" => Some(Key::Right),
            "up" => Some(Key::Up),
            "down" => Some(Key::Down),
            "space" => Some(Key::Char(' ')),
            _ => {
                let mut chars = token.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(Key::Char(c)),
                    _ => None,
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    ToggleWarpUi,
    ToggleCameraOverlay,
    ReloadCalibration,
    SaveCalibration,
    SwingRacket(SwingDirection),
    ToggleHelp,
    ResetServe,
    RearmBaseline,
    SnapCorner(CornerId),
    /// Unit step; the stage scales it when shift is held.
    NudgeCorner { dx: f64, dy: f64 },
}

#[derive(Debug, Clone)]
pub struct KeyMap {
    bindings: HashMap<Key, Command>,
}

impl Default for KeyMap {
    fn default() -> Self {
        let mut map = Self {
            bindings: HashMap::new(),
        };
        map.bind_letter('s', Command::ToggleWarpUi);
        map.bind_letter('c', Command::ToggleCameraOverlay);
        map.bind_letter('l', Command::ReloadCalibration);
        map.bind_letter('h', Command::SaveCalibration);
        map.bind_letter('f', Command::SwingRacket(SwingDirection::Positive));
        map.bind_letter('j', Command::SwingRacket(SwingDirection::Negative));
        map.bind(Key::Char('/'), Command::ToggleHelp);
        map.bind(Key::Char('?'), Command::ToggleHelp);
        map.bind(Key::Char(' '), Command::ResetServe);
        map.bind_letter('b', Command::RearmBaseline);
        for (digit, corner) in ['1', '2', '3', '4'].into_iter().zip(CornerId::ALL) {
            map.bind(Key::Char(digit), Command::SnapCorner(corner));
        }
        map.bind(Key::Left, Command::NudgeCorner { dx: -1.0, dy: 0.0 });
        map.bind(Key::Right, Command::NudgeCorner { dx: 1.0, dy: 0.0 });
        map.bind(Key::Up, Command::NudgeCorner { dx: 0.0, dy: -1.0 });
        map.bind(Key::Down, Command::NudgeCorner { dx: 0.0, dy: 1.0 });
        map
    }
}

impl KeyMap {
    pub fn bind(&mut self, key: Key, command: Command) {
        self.bindings.insert(key, command);
    }

    fn bind_letter(&mut self, letter: char, command: Command) {
        self.bind(Key::Char(letter.to_ascii_lowercase()), command);
        self.bind(Key::Char(letter.to_ascii_uppercase()), command);
    }

    pub fn lookup(&self, key: Key) -> Option<Command> {
        self.bindings.get(&key).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letters_bind_both_cases() {
        let map = KeyMap::default();
        assert_eq!(map.lookup(Key::Char('s')), Some(Command::ToggleWarpUi));
        assert_eq!(map.lookup(Key::Char('S')), Some(Command::ToggleWarpUi));
        assert_eq!(
            map.lookup(Key::Char('J')),
            Some(Command::SwingRacket(SwingDirection::Negative))
        );
    }

    #[test]
    fn digits_snap_corners_in_ring_order() {
        let map = KeyMap::default();
        assert_eq!(map.lookup(Key::Char('3')), Some(Command::SnapCorner(CornerId::BottomRight)));
        assert_eq!(map.lookup(Key::Char('4')), Some(Command::SnapCorner(CornerId::BottomLeft)));
    }

    #[test]
    fn unbound_key_maps_to_nothing() {
        assert_eq!(KeyMap::default().lookup(Key::Char('z')), None);
    }

    #[test]
    fn script_tokens_parse() {
        assert_eq!(Key::parse("space"), Some(Key::Char(' ')));
        assert_eq!(Key::parse("left"), Some(Key::Left));
        assert_eq!(Key::parse("f"), Some(Key::Char('f')));
        assert_eq!(Key::parse("ff"), None);
    }
}
