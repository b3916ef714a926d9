//! Keyboard capture feeding the local input channel

use macroquad::prelude::{is_key_down, is_key_pressed, is_key_released, KeyCode};
use shared::input::{KEY_DOWN, KEY_LEFT, KEY_RIGHT, KEY_UP};
use shared::InputChannel;

/// Maps a window key to the numeric code the simulation understands.
/// Arrow keys and WASD drive the same four directions.
pub fn sync_code(key: KeyCode) -> Option<shared::KeyCode> {
    match key {
        KeyCode::Left | KeyCode::A => Some(KEY_LEFT),
        KeyCode::Up | KeyCode::W => Some(KEY_UP),
        KeyCode::Right | KeyCode::D => Some(KEY_RIGHT),
        KeyCode::Down | KeyCode::S => Some(KEY_DOWN),
        _ => None,
    }
}

/// Forwards key press and release events of the bound keys to a channel
pub struct KeyCapture {
    keys: Vec<KeyCode>,
}

impl KeyCapture {
    pub fn new() -> Self {
        Self {
            keys: vec![
                KeyCode::Left,
                KeyCode::Up,
                KeyCode::Right,
                KeyCode::Down,
                KeyCode::A,
                KeyCode::W,
                KeyCode::D,
                KeyCode::S,
            ],
        }
    }

    /// Applies this frame's key events. Must run once per macroquad frame.
    pub fn poll(&self, channel: &mut InputChannel) {
        for key in &self.keys {
            let Some(code) = sync_code(*key) else {
                continue;
            };
            if is_key_pressed(*key) {
                channel.set_key_down(code);
            }
            if is_key_released(*key) && !self.code_still_held(code, *key, is_key_down) {
                channel.set_key_up(code);
            }
        }
    }

    /// Whether a key other than `released` that maps to `code` is down
    pub fn code_still_held(
        &self,
        code: shared::KeyCode,
        released: KeyCode,
        is_down: impl Fn(KeyCode) -> bool,
    ) -> bool {
        self.keys
            .iter()
            .filter(|key| **key != released)
            .any(|key| sync_code(*key) == Some(code) && is_down(*key))
    }

    pub fn bound_keys(&self) -> &[KeyCode] {
        &self.keys
    }
}

impl Default for KeyCapture {
    fn default() -> Self {
        Self::new()
    }
}
