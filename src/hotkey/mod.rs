//! Push-to-talk key handling.
//!
//! [`KeyHoldTrigger`] turns raw key-down / key-up events into at most one
//! [`KeyIntent::StartListening`] per physical press and one
//! [`KeyIntent::SendIfHeld`] per release.  It is generic over the key type
//! so the chord logic is independent of the input backend.
//!
//! With the `global-hotkey` feature, [`KeyListener`] feeds the trigger from
//! a system-wide `rdev` hook and forwards intents to the coordinator.  How
//! long the key was held is judged by the arbiter, not here.
//!
//! # Usage
//!
//! ```
//! use voice_intake::hotkey::{KeyHoldTrigger, KeyIntent};
//!
//! #[derive(Clone, Copy, PartialEq, Debug)]
//! enum K { Alt, Space }
//!
//! let mut trigger = KeyHoldTrigger::new(K::Space, vec![K::Alt]);
//! assert_eq!(trigger.on_press(K::Space), None); // modifier not held
//! trigger.on_press(K::Alt);
//! assert_eq!(trigger.on_press(K::Space), Some(KeyIntent::StartListening));
//! assert_eq!(trigger.on_release(K::Space), Some(KeyIntent::SendIfHeld));
//! ```

#[cfg(feature = "global-hotkey")]
pub mod listener;

#[cfg(feature = "global-hotkey")]
pub use listener::{HotkeyError, KeyListener};

// ---------------------------------------------------------------------------
// KeyIntent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyIntent {
    /// The push-to-talk chord went down.
    StartListening,
    /// The push-to-talk key went up; send the transcript if the hold was
    /// long enough.
    SendIfHeld,
}

// ---------------------------------------------------------------------------
// KeyHoldTrigger
// ---------------------------------------------------------------------------

/// Push-to-talk chord tracker.
///
/// `modifiers` lists interchangeable keys (e.g. left and right Alt); any one
/// of them satisfies the chord.  An empty list means the key works alone.
#[derive(Debug, Clone)]
pub struct KeyHoldTrigger<K> {
    key: K,
    modifiers: Vec<K>,
    held_modifiers: Vec<K>,
    active: bool,
}

impl<K: PartialEq + Copy> KeyHoldTrigger<K> {
    pub fn new(key: K, modifiers: Vec<K>) -> Self {
        Self {
            key,
            modifiers,
            held_modifiers: Vec::new(),
            active: false,
        }
    }

    /// `true` between the chord going down and the key going up.
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn on_press(&mut self, key: K) -> Option<KeyIntent> {
        if self.modifiers.contains(&key) {
            if !self.held_modifiers.contains(&key) {
                self.held_modifiers.push(key);
            }
            return None;
        }
        if key != self.key || self.active {
            // Auto-repeat delivers further presses while the key stays down.
            return None;
        }
        if !self.modifiers.is_empty() && self.held_modifiers.is_empty() {
            return None;
        }
        self.active = true;
        Some(KeyIntent::StartListening)
    }

    pub fn on_release(&mut self, key: K) -> Option<KeyIntent> {
        if self.modifiers.contains(&key) {
            self.held_modifiers.retain(|k| *k != key);
            return None;
        }
        if key != self.key || !self.active {
            return None;
        }
        self.active = false;
        Some(KeyIntent::SendIfHeld)
    }
}

// ---------------------------------------------------------------------------
// Key names
// ---------------------------------------------------------------------------

/// Parse a key name from the config into an [`rdev::Key`].
///
/// Supports F1–F12, common named keys and single ASCII letters in either
/// case.
///
/// ```
/// use voice_intake::hotkey::parse_key;
///
/// assert_eq!(parse_key("Space"), Some(rdev::Key::Space));
/// assert_eq!(parse_key("q"),     Some(rdev::Key::KeyQ));
/// assert_eq!(parse_key("xyz"),   None);
/// ```
#[cfg(feature = "global-hotkey")]
pub fn parse_key(name: &str) -> Option<rdev::Key> {
    use rdev::Key;

    let key = match name {
        "F1" => Key::F1,
        "F2" => Key::F2,
        "F3" => Key::F3,
        "F4" => Key::F4,
        "F5" => Key::F5,
        "F6" => Key::F6,
        "F7" => Key::F7,
        "F8" => Key::F8,
        "F9" => Key::F9,
        "F10" => Key::F10,
        "F11" => Key::F11,
        "F12" => Key::F12,

        "Space" => Key::Space,
        "Escape" | "Esc" => Key::Escape,
        "Return" | "Enter" => Key::Return,
        "Tab" => Key::Tab,
        "CapsLock" => Key::CapsLock,
        "ScrollLock" => Key::ScrollLock,
        "Pause" => Key::Pause,

        letter if letter.len() == 1 => return parse_letter(letter),
        _ => return None,
    };
    Some(key)
}

#[cfg(feature = "global-hotkey")]
fn parse_letter(letter: &str) -> Option<rdev::Key> {
    use rdev::Key;

    const LETTERS: [Key; 26] = [
        Key::KeyA,
        Key::KeyB,
        Key::KeyC,
        Key::KeyD,
        Key::KeyE,
        Key::KeyF,
        Key::KeyG,
        Key::KeyH,
        Key::KeyI,
        Key::KeyJ,
        Key::KeyK,
        Key::KeyL,
        Key::KeyM,
        Key::KeyN,
        Key::KeyO,
        Key::KeyP,
        Key::KeyQ,
        Key::KeyR,
        Key::KeyS,
        Key::KeyT,
        Key::KeyU,
        Key::KeyV,
        Key::KeyW,
        Key::KeyX,
        Key::KeyY,
        Key::KeyZ,
    ];

    let c = letter.chars().next()?.to_ascii_uppercase();
    if !c.is_ascii_uppercase() {
        return None;
    }
    LETTERS.get((c as u8 - b'A') as usize).copied()
}

/// Parse a modifier name into the physical keys that satisfy it.  An empty
/// name or `"None"` means no modifier.
#[cfg(feature = "global-hotkey")]
pub fn parse_modifier(name: &str) -> Option<Vec<rdev::Key>> {
    use rdev::Key;

    let keys = match name.trim() {
        "" | "None" => vec![],
        "Alt" | "Option" => vec![Key::Alt, Key::AltGr],
        "Ctrl" | "Control" => vec![Key::ControlLeft, Key::ControlRight],
        "Shift" => vec![Key::ShiftLeft, Key::ShiftRight],
        "Meta" | "Super" | "Cmd" => vec![Key::MetaLeft, Key::MetaRight],
        _ => return None,
    };
    Some(keys)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum K {
        AltLeft,
        AltRight,
        Space,
        Other,
    }

    fn alt_space() -> KeyHoldTrigger<K> {
        KeyHoldTrigger::new(K::Space, vec![K::AltLeft, K::AltRight])
    }

    #[test]
    fn chord_starts_and_release_sends() {
        let mut t = alt_space();
        assert_eq!(t.on_press(K::AltLeft), None);
        assert_eq!(t.on_press(K::Space), Some(KeyIntent::StartListening));
        assert!(t.is_active());
        assert_eq!(t.on_release(K::Space), Some(KeyIntent::SendIfHeld));
        assert!(!t.is_active());
    }

    #[test]
    fn key_without_modifier_is_ignored() {
        let mut t = alt_space();
        assert_eq!(t.on_press(K::Space), None);
        assert_eq!(t.on_release(K::Space), None);
    }

    #[test]
    fn either_modifier_variant_counts() {
        let mut t = alt_space();
        t.on_press(K::AltRight);
        assert_eq!(t.on_press(K::Space), Some(KeyIntent::StartListening));
    }

    #[test]
    fn auto_repeat_is_suppressed() {
        let mut t = alt_space();
        t.on_press(K::AltLeft);
        assert_eq!(t.on_press(K::Space), Some(KeyIntent::StartListening));
        for _ in 0..5 {
            assert_eq!(t.on_press(K::Space), None);
            assert_eq!(t.on_press(K::AltLeft), None);
        }
        assert_eq!(t.on_release(K::Space), Some(KeyIntent::SendIfHeld));
        assert_eq!(t.on_release(K::Space), None);
    }

    #[test]
    fn releasing_modifier_first_still_ends_the_hold() {
        let mut t = alt_space();
        t.on_press(K::AltLeft);
        t.on_press(K::Space);
        assert_eq!(t.on_release(K::AltLeft), None);
        assert_eq!(t.on_release(K::Space), Some(KeyIntent::SendIfHeld));

        // Modifier is up now; a bare key press does not start.
        assert_eq!(t.on_press(K::Space), None);
    }

    #[test]
    fn no_modifier_configured() {
        let mut t = KeyHoldTrigger::new(K::Space, vec![]);
        assert_eq!(t.on_press(K::Other), None);
        assert_eq!(t.on_press(K::Space), Some(KeyIntent::StartListening));
        assert_eq!(t.on_release(K::Other), None);
        assert_eq!(t.on_release(K::Space), Some(KeyIntent::SendIfHeld));
    }

    #[cfg(feature = "global-hotkey")]
    #[test]
    fn parse_keys_and_modifiers() {
        assert_eq!(parse_key("F9"), Some(rdev::Key::F9));
        assert_eq!(parse_key("Esc"), Some(rdev::Key::Escape));
        assert_eq!(parse_key("a"), Some(rdev::Key::KeyA));
        assert_eq!(parse_key("Z"), Some(rdev::Key::KeyZ));
        assert_eq!(parse_key("1"), None);
        assert_eq!(parse_key(""), None);

        assert_eq!(parse_modifier("Alt"), Some(vec![rdev::Key::Alt, rdev::Key::AltGr]));
        assert_eq!(parse_modifier(""), Some(vec![]));
        assert_eq!(parse_modifier("Hyper"), None);
    }
}
