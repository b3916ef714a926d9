//! Edge-triggered key state tracking

use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Numeric key code as delivered by the input-capture collaborator
pub type KeyCode = u32;

pub const KEY_LEFT: KeyCode = 37;
pub const KEY_UP: KeyCode = 38;
pub const KEY_RIGHT: KeyCode = 39;
pub const KEY_DOWN: KeyCode = 40;

/// Key transitions since the previous report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDelta {
    pub down: Vec<KeyCode>,
    pub up: Vec<KeyCode>,
}

impl InputDelta {
    pub fn is_empty(&self) -> bool {
        self.down.is_empty() && self.up.is_empty()
    }
}

/// Input as recorded for replay: the reported delta plus the keys held
/// once that delta was applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputFrame {
    pub delta: InputDelta,
    pub held: BTreeSet<KeyCode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct KeySnapshot {
    current: BTreeSet<KeyCode>,
    last: BTreeSet<KeyCode>,
}

/// Named set of pressed keys that reports only transitions.
///
/// `report` returns what changed since the previous report. Releasing a key
/// removes it from the pressed set immediately, so a press and release that
/// both happen between two reports produce no transition at all.
#[derive(Debug, Clone)]
pub struct InputChannel {
    id: String,
    current: BTreeSet<KeyCode>,
    last: BTreeSet<KeyCode>,
    saved: Option<KeySnapshot>,
}

impl InputChannel {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            current: BTreeSet::new(),
            last: BTreeSet::new(),
            saved: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_key_down(&mut self, code: KeyCode) {
        self.current.insert(code);
    }

    pub fn set_key_up(&mut self, code: KeyCode) {
        self.current.remove(&code);
    }

    pub fn is_key_pressed(&self, code: KeyCode) -> bool {
        self.current.contains(&code)
    }

    pub fn pressed_keys(&self) -> &BTreeSet<KeyCode> {
        &self.current
    }

    /// Computes the delta a report would return, without consuming it
    pub fn peek_delta(&self) -> InputDelta {
        InputDelta {
            down: self.current.difference(&self.last).copied().collect(),
            up: self.last.difference(&self.current).copied().collect(),
        }
    }

    /// Returns transitions since the previous report and marks them reported
    pub fn report(&mut self) -> InputDelta {
        let delta = self.peek_delta();
        self.last = self.current.clone();
        delta
    }

    /// Applies a delta received from a remote peer.
    ///
    /// The delta counts as reported, so the next local `report` is empty.
    pub fn apply_delta(&mut self, delta: &InputDelta) {
        for code in &delta.down {
            self.current.insert(*code);
        }
        for code in &delta.up {
            self.current.remove(code);
        }
        self.last = self.current.clone();
    }

    /// Puts the channel into the exact state a recorded frame was captured in
    pub fn inject(&mut self, frame: &InputFrame) {
        self.current = frame.held.clone();
        self.last = frame.held.clone();
    }

    /// Captures the current key state for a later [`InputChannel::restore`].
    ///
    /// Only one level is kept; saving twice overwrites the first snapshot.
    pub fn save(&mut self) {
        if self.saved.is_some() {
            warn!(
                "Input channel '{}' saved twice without restore, overwriting snapshot",
                self.id
            );
        }
        self.saved = Some(KeySnapshot {
            current: self.current.clone(),
            last: self.last.clone(),
        });
    }

    /// Restores the state captured by the last `save`, returns false if none
    pub fn restore(&mut self) -> bool {
        match self.saved.take() {
            Some(snapshot) => {
                self.current = snapshot.current;
                self.last = snapshot.last;
                true
            }
            None => {
                warn!("Input channel '{}' restored without a saved state", self.id);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(codes: &[KeyCode]) -> BTreeSet<KeyCode> {
        codes.iter().copied().collect()
    }

    #[test]
    fn test_channel_creation() {
        let channel = InputChannel::new("player-1");
        assert_eq!(channel.id(), "player-1");
        assert!(channel.pressed_keys().is_empty());
        assert!(channel.peek_delta().is_empty());
    }

    #[test]
    fn test_report_computes_set_differences() {
        let mut channel = InputChannel::new("c");
        channel.set_key_down(KEY_LEFT);
        channel.set_key_down(KEY_UP);

        let delta = channel.report();
        assert_eq!(delta.down, vec![KEY_LEFT, KEY_UP]);
        assert!(delta.up.is_empty());

        channel.set_key_up(KEY_LEFT);
        channel.set_key_down(KEY_RIGHT);

        let delta = channel.report();
        assert_eq!(delta.down, vec![KEY_RIGHT]);
        assert_eq!(delta.up, vec![KEY_LEFT]);
    }

    #[test]
    fn test_second_report_without_events_is_empty() {
        let sequences: Vec<Vec<(bool, KeyCode)>> = vec![
            vec![],
            vec![(true, KEY_LEFT)],
            vec![(true, KEY_LEFT), (false, KEY_LEFT)],
            vec![(true, KEY_UP), (true, KEY_DOWN), (false, KEY_UP)],
            vec![(false, KEY_RIGHT), (true, KEY_RIGHT), (true, KEY_RIGHT)],
        ];

        for events in sequences {
            let mut channel = InputChannel::new("c");
            for (down, code) in &events {
                if *down {
                    channel.set_key_down(*code);
                } else {
                    channel.set_key_up(*code);
                }
            }
            channel.report();
            assert!(
                channel.report().is_empty(),
                "second report not empty for {:?}",
                events
            );
        }
    }

    #[test]
    fn test_repeated_key_down_is_idempotent() {
        let mut channel = InputChannel::new("c");
        channel.set_key_down(KEY_UP);
        channel.set_key_down(KEY_UP);
        assert_eq!(channel.report().down, vec![KEY_UP]);
        channel.set_key_down(KEY_UP);
        assert!(channel.report().is_empty());
    }

    #[test]
    fn test_apply_delta() {
        let mut server_side = InputChannel::new("c");
        server_side.apply_delta(&InputDelta {
            down: vec![KEY_LEFT, KEY_DOWN],
            up: vec![],
        });
        assert!(server_side.is_key_pressed(KEY_LEFT));
        assert!(server_side.is_key_pressed(KEY_DOWN));
        assert!(server_side.report().is_empty());

        server_side.apply_delta(&InputDelta {
            down: vec![],
            up: vec![KEY_LEFT],
        });
        assert!(!server_side.is_key_pressed(KEY_LEFT));
        assert!(server_side.is_key_pressed(KEY_DOWN));
    }

    #[test]
    fn test_save_mutate_restore() {
        let mut channel = InputChannel::new("c");
        channel.set_key_down(KEY_LEFT);
        channel.report();
        channel.set_key_down(KEY_UP);

        let before_keys = channel.pressed_keys().clone();
        let before_delta = channel.peek_delta();

        channel.save();
        channel.set_key_up(KEY_LEFT);
        channel.set_key_down(KEY_DOWN);
        channel.report();
        channel.inject(&InputFrame {
            delta: InputDelta::default(),
            held: keys(&[KEY_RIGHT]),
        });
        assert!(channel.restore());

        assert_eq!(channel.pressed_keys(), &before_keys);
        assert_eq!(channel.peek_delta(), before_delta);
    }

    #[test]
    fn test_restore_without_save() {
        let mut channel = InputChannel::new("c");
        channel.set_key_down(KEY_UP);
        assert!(!channel.restore());
        assert!(channel.is_key_pressed(KEY_UP));
    }

    #[test]
    fn test_inject_sets_held_keys() {
        let mut channel = InputChannel::new("c");
        channel.set_key_down(KEY_LEFT);
        channel.inject(&InputFrame {
            delta: InputDelta {
                down: vec![KEY_UP],
                up: vec![],
            },
            held: keys(&[KEY_UP, KEY_RIGHT]),
        });

        assert!(!channel.is_key_pressed(KEY_LEFT));
        assert!(channel.is_key_pressed(KEY_UP));
        assert!(channel.is_key_pressed(KEY_RIGHT));
        assert!(channel.peek_delta().is_empty());
    }
}
