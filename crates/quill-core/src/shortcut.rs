//! Global shortcut accelerators (`CommandOrControl+Shift+G`) and the matcher
//! that turns raw key events into rewrite actions.

use crate::action::RewriteAction;
use crate::error::{QuillError, Result};
use crate::settings::Settings;
use rdev::{EventType, Key};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub control: bool,
    pub shift: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    pub fn is_empty(&self) -> bool {
        !(self.control || self.shift || self.alt || self.meta)
    }
}

/// A parsed accelerator: a set of modifiers plus exactly one key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hotkey {
    pub modifiers: Modifiers,
    pub key: Key,
}

impl Hotkey {
    /// Parse an accelerator for the current OS (`CommandOrControl` is
    /// Command on macOS and Control elsewhere).
    pub fn parse(accelerator: &str) -> Result<Self> {
        Self::parse_with(accelerator, cfg!(target_os = "macos"))
    }

    pub fn parse_with(accelerator: &str, command_is_meta: bool) -> Result<Self> {
        let trimmed = accelerator.trim();
        if trimmed.is_empty() {
            return Err(QuillError::InvalidShortcut(
                "Shortcut cannot be empty".to_string(),
            ));
        }

        let parts: Vec<&str> = trimmed.split('+').map(|s| s.trim()).collect();
        if parts.len() < 2 {
            return Err(QuillError::InvalidShortcut(format!(
                "'{}' must include at least one modifier (e.g., Ctrl, Shift, Alt)",
                trimmed
            )));
        }

        let (key_part, modifier_parts) = match parts.split_last() {
            Some(split) => split,
            None => {
                return Err(QuillError::InvalidShortcut(format!(
                    "'{}' has no key",
                    trimmed
                )))
            }
        };

        let mut modifiers = Modifiers::default();
        for part in modifier_parts {
            match part.to_lowercase().as_str() {
                "commandorcontrol" | "cmdorctrl" => {
                    if command_is_meta {
                        modifiers.meta = true;
                    } else {
                        modifiers.control = true;
                    }
                }
                "command" | "cmd" | "super" | "meta" => modifiers.meta = true,
                "control" | "ctrl" => modifiers.control = true,
                "alt" | "option" => modifiers.alt = true,
                "shift" => modifiers.shift = true,
                other => {
                    return Err(QuillError::InvalidShortcut(format!(
                        "Invalid modifier '{}' in '{}'",
                        other, trimmed
                    )))
                }
            }
        }

        let key = parse_key(key_part).ok_or_else(|| {
            QuillError::InvalidShortcut(format!("Unsupported key '{}' in '{}'", key_part, trimmed))
        })?;

        Ok(Hotkey { modifiers, key })
    }
}

impl fmt::Display for Hotkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        if self.modifiers.control {
            parts.push("Ctrl".to_string());
        }
        if self.modifiers.meta {
            parts.push("Command".to_string());
        }
        if self.modifiers.alt {
            parts.push("Alt".to_string());
        }
        if self.modifiers.shift {
            parts.push("Shift".to_string());
        }
        parts.push(key_name(self.key));
        f.write_str(&parts.join("+"))
    }
}

fn parse_key(name: &str) -> Option<Key> {
    let upper = name.to_uppercase();
    let key = match upper.as_str() {
        "A" => Key::KeyA,
        "B" => Key::KeyB,
        "C" => Key::KeyC,
        "D" => Key::KeyD,
        "E" => Key::KeyE,
        "F" => Key::KeyF,
        "G" => Key::KeyG,
        "H" => Key::KeyH,
        "I" => Key::KeyI,
        "J" => Key::KeyJ,
        "K" => Key::KeyK,
        "L" => Key::KeyL,
        "M" => Key::KeyM,
        "N" => Key::KeyN,
        "O" => Key::KeyO,
        "P" => Key::KeyP,
        "Q" => Key::KeyQ,
        "R" => Key::KeyR,
        "S" => Key::KeyS,
        "T" => Key::KeyT,
        "U" => Key::KeyU,
        "V" => Key::KeyV,
        "W" => Key::KeyW,
        "X" => Key::KeyX,
        "Y" => Key::KeyY,
        "Z" => Key::KeyZ,
        "0" => Key::Num0,
        "1" => Key::Num1,
        "2" => Key::Num2,
        "3" => Key::Num3,
        "4" => Key::Num4,
        "5" => Key::Num5,
        "6" => Key::Num6,
        "7" => Key::Num7,
        "8" => Key::Num8,
        "9" => Key::Num9,
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
        "SPACE" => Key::Space,
        "ENTER" | "RETURN" => Key::Return,
        "TAB" => Key::Tab,
        "ESC" | "ESCAPE" => Key::Escape,
        _ => return None,
    };
    Some(key)
}

fn key_name(key: Key) -> String {
    match key {
        Key::Space => "Space".to_string(),
        Key::Return => "Enter".to_string(),
        Key::Tab => "Tab".to_string(),
        Key::Escape => "Escape".to_string(),
        other => {
            // KeyA -> A, Num1 -> 1, F5 -> F5
            let debug = format!("{:?}", other);
            debug
                .strip_prefix("Key")
                .or_else(|| debug.strip_prefix("Num"))
                .map(|s| s.to_string())
                .unwrap_or(debug)
        }
    }
}

/// Parse every enabled shortcut in `settings` and reject duplicate bindings.
pub fn bindings_from_settings(settings: &Settings) -> Result<Vec<(Hotkey, RewriteAction)>> {
    let mut bindings: Vec<(Hotkey, RewriteAction)> = Vec::new();

    for action in RewriteAction::ALL {
        if !settings.features.is_enabled(action) {
            continue;
        }
        let accelerator = settings.shortcuts.get(action);
        let hotkey = Hotkey::parse(accelerator)?;

        if let Some((_, existing)) = bindings.iter().find(|(bound, _)| *bound == hotkey) {
            return Err(QuillError::InvalidShortcut(format!(
                "'{}' is bound to both {} and {}",
                accelerator, existing, action
            )));
        }
        bindings.push((hotkey, action));
    }

    Ok(bindings)
}

/// Tracks held modifier keys from a raw event stream and reports which
/// binding, if any, a key press completes.
pub struct HotkeyMatcher {
    bindings: Vec<(Hotkey, RewriteAction)>,
    held: Vec<Key>,
    // Suppresses OS auto-repeat until the trigger key is released
    fired: Option<Key>,
}

impl HotkeyMatcher {
    pub fn new(bindings: Vec<(Hotkey, RewriteAction)>) -> Self {
        Self {
            bindings,
            held: Vec::new(),
            fired: None,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(bindings_from_settings(settings)?))
    }

    pub fn bindings(&self) -> &[(Hotkey, RewriteAction)] {
        &self.bindings
    }

    pub fn held_modifiers(&self) -> Modifiers {
        let mut modifiers = Modifiers::default();
        for key in &self.held {
            match key {
                Key::ControlLeft | Key::ControlRight => modifiers.control = true,
                Key::ShiftLeft | Key::ShiftRight => modifiers.shift = true,
                Key::Alt | Key::AltGr => modifiers.alt = true,
                Key::MetaLeft | Key::MetaRight => modifiers.meta = true,
                _ => {}
            }
        }
        modifiers
    }

    pub fn handle(&mut self, event: &EventType) -> Option<RewriteAction> {
        match event {
            EventType::KeyPress(key) => {
                if is_modifier(*key) {
                    if !self.held.contains(key) {
                        self.held.push(*key);
                    }
                    return None;
                }
                if self.fired == Some(*key) {
                    return None;
                }

                let held = self.held_modifiers();
                let action = self
                    .bindings
                    .iter()
                    .find(|(hotkey, _)| hotkey.key == *key && hotkey.modifiers == held)
                    .map(|(_, action)| *action);
                if action.is_some() {
                    self.fired = Some(*key);
                }
                action
            }
            EventType::KeyRelease(key) => {
                self.held.retain(|held| held != key);
                if self.fired == Some(*key) {
                    self.fired = None;
                }
                None
            }
            _ => None,
        }
    }
}

fn is_modifier(key: Key) -> bool {
    matches!(
        key,
        Key::ControlLeft
            | Key::ControlRight
            | Key::ShiftLeft
            | Key::ShiftRight
            | Key::Alt
            | Key::AltGr
            | Key::MetaLeft
            | Key::MetaRight
    )
}
