//! Persisted user settings.
//!
//! The store is an explicit object handed to each component; nothing reads
//! settings from ambient global state. Readers get a cloned [`Settings`]
//! snapshot and only [`SettingsStore::save`] / [`SettingsStore::reset`]
//! change what is on disk.

use crate::action::RewriteAction;
use crate::error::{QuillError, Result};
use crate::shortcut::bindings_from_settings;
use crate::storage::{load_json_or_default, save_json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Selects the Azure deployment profile instead of the direct API-key profile
    pub use_azure: bool,
    pub azure_endpoint: String,
    pub azure_api_key: String,
    pub azure_deployment: String,
    pub azure_api_version: String,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,
    pub shortcuts: Shortcuts,
    pub features: Features,
    pub show_notifications: bool,
    pub start_minimized: bool,
    pub translate_language: String,
    pub translate_fallback_language: String,
    pub request_timeout_secs: u64,
    pub input_backend: InputBackend,
    pub timings: SettleTimings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            use_azure: true,
            azure_endpoint: "init.openai.azure.com".to_string(),
            azure_api_key: String::new(),
            azure_deployment: "gpt-4o".to_string(),
            azure_api_version: "2025-01-01-preview".to_string(),
            openai_api_key: String::new(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_model: "gpt-3.5-turbo".to_string(),
            shortcuts: Shortcuts::default(),
            features: Features::default(),
            show_notifications: true,
            start_minimized: false,
            translate_language: "English".to_string(),
            translate_fallback_language: "Spanish".to_string(),
            request_timeout_secs: 15,
            input_backend: InputBackend::default(),
            timings: SettleTimings::default(),
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Copy with credentials masked, for display and logs
    pub fn redacted(&self) -> Settings {
        let mut copy = self.clone();
        copy.azure_api_key = mask_secret(&copy.azure_api_key);
        copy.openai_api_key = mask_secret(&copy.openai_api_key);
        copy
    }

    /// Undo [`Settings::redacted`] for keys a client sent back unchanged.
    ///
    /// A stored key only follows its own endpoint: when the endpoint or base
    /// URL changes, a masked key is cleared and a new key must be supplied.
    pub fn with_secrets_from(mut self, current: &Settings) -> Settings {
        if self.azure_api_key == mask_secret(&current.azure_api_key) {
            self.azure_api_key = if self.azure_endpoint == current.azure_endpoint {
                current.azure_api_key.clone()
            } else {
                String::new()
            };
        }
        if self.openai_api_key == mask_secret(&current.openai_api_key) {
            self.openai_api_key = if self.openai_base_url == current.openai_base_url {
                current.openai_api_key.clone()
            } else {
                String::new()
            };
        }
        self
    }
}

/// Keep only the last four characters of a credential visible
pub fn mask_secret(secret: &str) -> String {
    if secret.is_empty() {
        return String::new();
    }
    let visible: String = secret
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if secret.chars().count() <= 8 {
        "****".to_string()
    } else {
        format!("****{}", visible)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Shortcuts {
    pub grammar: String,
    pub rephrase: String,
    pub summarize: String,
    pub translate: String,
}

impl Default for Shortcuts {
    fn default() -> Self {
        Self {
            grammar: "CommandOrControl+Shift+G".to_string(),
            rephrase: "CommandOrControl+Shift+R".to_string(),
            summarize: "CommandOrControl+Shift+S".to_string(),
            translate: "CommandOrControl+Shift+T".to_string(),
        }
    }
}

impl Shortcuts {
    pub fn get(&self, action: RewriteAction) -> &str {
        match action {
            RewriteAction::Grammar => &self.grammar,
            RewriteAction::Rephrase => &self.rephrase,
            RewriteAction::Summarize => &self.summarize,
            RewriteAction::Translate => &self.translate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Features {
    pub grammar: bool,
    pub rephrase: bool,
    pub summarize: bool,
    pub translate: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            grammar: true,
            rephrase: true,
            summarize: true,
            translate: true,
        }
    }
}

impl Features {
    pub fn is_enabled(&self, action: RewriteAction) -> bool {
        match action {
            RewriteAction::Grammar => self.grammar,
            RewriteAction::Rephrase => self.rephrase,
            RewriteAction::Summarize => self.summarize,
            RewriteAction::Translate => self.translate,
        }
    }
}

/// How keystrokes and clipboard access are performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputBackend {
    /// The platform's scripting tools (osascript, PowerShell, xdotool/xclip)
    #[default]
    Script,
    /// In-process input simulation through enigo and arboard
    Native,
}

/// Fixed waits around clipboard operations. There is no notification when a
/// foreground application finishes handling a copy or paste, so these are
/// heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettleTimings {
    /// Wait after the copy keystroke before reading the clipboard
    pub copy_settle_ms: u64,
    /// Wait after a successful capture before restoring the clipboard
    pub restore_delay_ms: u64,
    /// Wait after writing replacement text before the paste keystroke
    pub paste_prepare_ms: u64,
    /// Wait after the paste keystroke before restoring the clipboard
    pub paste_settle_ms: u64,
}

impl Default for SettleTimings {
    fn default() -> Self {
        Self {
            copy_settle_ms: 200,
            restore_delay_ms: 100,
            paste_prepare_ms: 100,
            paste_settle_ms: 200,
        }
    }
}

impl SettleTimings {
    /// All waits set to zero, for tests against in-memory primitives
    pub fn immediate() -> Self {
        Self {
            copy_settle_ms: 0,
            restore_delay_ms: 0,
            paste_prepare_ms: 0,
            paste_settle_ms: 0,
        }
    }

    pub fn copy_settle(&self) -> Duration {
        Duration::from_millis(self.copy_settle_ms)
    }

    pub fn restore_delay(&self) -> Duration {
        Duration::from_millis(self.restore_delay_ms)
    }

    pub fn paste_prepare(&self) -> Duration {
        Duration::from_millis(self.paste_prepare_ms)
    }

    pub fn paste_settle(&self) -> Duration {
        Duration::from_millis(self.paste_settle_ms)
    }
}

/// File-backed owner of [`Settings`].
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings, filling every missing key with its default
    pub fn load(&self) -> Result<Settings> {
        let settings: Settings = load_json_or_default(&self.path)?;
        debug!(path = %self.path.display(), "loaded settings");
        Ok(settings)
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        bindings_from_settings(settings)?;
        save_json(&self.path, settings)?;
        info!(path = %self.path.display(), "settings saved");
        Ok(())
    }

    /// Clear every key; the next load yields defaults
    pub fn reset(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        info!(path = %self.path.display(), "settings reset to defaults");
        Ok(())
    }

    /// Read one setting by dotted key, e.g. `shortcuts.grammar`
    pub fn get_value(&self, key: &str) -> Result<Value> {
        let document = serde_json::to_value(self.load()?)?;
        lookup(&document, key)
            .cloned()
            .ok_or_else(|| QuillError::InvalidConfig(format!("Unknown setting '{}'", key)))
    }

    /// Write one setting by dotted key. The value must keep the document
    /// deserializable as [`Settings`].
    pub fn set_value(&self, key: &str, value: Value) -> Result<Settings> {
        let mut document = serde_json::to_value(self.load()?)?;
        let slot = lookup_mut(&mut document, key)
            .ok_or_else(|| QuillError::InvalidConfig(format!("Unknown setting '{}'", key)))?;

        if slot.is_object() {
            return Err(QuillError::InvalidConfig(format!(
                "'{}' is a section; set one of its keys instead",
                key
            )));
        }
        *slot = value;

        let updated: Settings = serde_json::from_value(document).map_err(|e| {
            QuillError::InvalidConfig(format!("Invalid value for '{}': {}", key, e))
        })?;
        self.save(&updated)?;
        Ok(updated)
    }
}

fn lookup<'a>(document: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.')
        .try_fold(document, |node, part| node.as_object()?.get(part))
}

fn lookup_mut<'a>(document: &'a mut Value, key: &str) -> Option<&'a mut Value> {
    let mut node = document;
    for part in key.split('.') {
        node = node.as_object_mut()?.get_mut(part)?;
    }
    Some(node)
}

/// Interpret a CLI string as a JSON value: `true`, `15` and `"x"` keep their
/// JSON types, anything else becomes a string.
pub fn parse_setting_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, SettingsStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json"));
        (dir, store)
    }

    #[test]
    fn missing_keys_take_defaults() {
        let (_dir, store) = store();
        fs::write(
            store.path(),
            r#"{"use_azure": false, "shortcuts": {"grammar": "Alt+G"}}"#,
        )
        .unwrap();

        let settings = store.load().unwrap();
        assert!(!settings.use_azure);
        assert_eq!(settings.shortcuts.grammar, "Alt+G");
        assert_eq!(settings.shortcuts.rephrase, "CommandOrControl+Shift+R");
        assert!(settings.show_notifications);
        assert_eq!(settings.azure_deployment, "gpt-4o");
    }

    #[test]
    fn save_then_reset_round_trips_to_defaults() {
        let (_dir, store) = store();
        let mut settings = Settings::default();
        settings.openai_api_key = "sk-test-key-1234".to_string();
        settings.start_minimized = true;
        store.save(&settings).unwrap();
        assert_eq!(store.load().unwrap(), settings);

        store.reset().unwrap();
        assert_eq!(store.load().unwrap(), Settings::default());
    }

    #[test]
    fn save_rejects_conflicting_shortcuts() {
        let (_dir, store) = store();
        let mut settings = Settings::default();
        settings.shortcuts.summarize = "ctrl+shift+r".to_string();
        settings.shortcuts.rephrase = "Ctrl+Shift+R".to_string();
        assert!(matches!(
            store.save(&settings),
            Err(QuillError::InvalidShortcut(_))
        ));
        assert!(!store.path().exists());
    }

    #[test]
    fn dotted_keys_get_and_set() {
        let (_dir, store) = store();
        assert_eq!(
            store.get_value("features.translate").unwrap(),
            Value::Bool(true)
        );

        let updated = store
            .set_value("features.translate", parse_setting_value("false"))
            .unwrap();
        assert!(!updated.features.translate);
        assert!(!store.load().unwrap().features.translate);

        store
            .set_value("azure_deployment", parse_setting_value("gpt-4o-mini"))
            .unwrap();
        assert_eq!(store.load().unwrap().azure_deployment, "gpt-4o-mini");
    }

    #[test]
    fn set_rejects_unknown_keys_and_bad_types() {
        let (_dir, store) = store();
        assert!(store.set_value("no_such_key", Value::Bool(true)).is_err());
        assert!(store
            .set_value("show_notifications", Value::String("loud".to_string()))
            .is_err());
        assert!(store.set_value("shortcuts", Value::Bool(true)).is_err());
    }

    #[test]
    fn redacted_masks_keys() {
        let mut settings = Settings::default();
        settings.azure_api_key = "abcdefghijklmnop".to_string();
        settings.openai_api_key = "short".to_string();
        let redacted = settings.redacted();
        assert_eq!(redacted.azure_api_key, "****mnop");
        assert_eq!(redacted.openai_api_key, "****");
        assert_eq!(settings.redacted().azure_deployment, "gpt-4o");
    }

    #[test]
    fn masked_keys_sent_back_keep_the_stored_secret() {
        let mut current = Settings::default();
        current.azure_api_key = "abcdefghijklmnop".to_string();

        let echoed = current.redacted().with_secrets_from(&current);
        assert_eq!(echoed.azure_api_key, "abcdefghijklmnop");

        let mut replaced = current.redacted();
        replaced.azure_api_key = "new-key-value-1234".to_string();
        assert_eq!(
            replaced.with_secrets_from(&current).azure_api_key,
            "new-key-value-1234"
        );
    }

    #[test]
    fn masked_keys_do_not_follow_a_new_endpoint() {
        let mut current = Settings::default();
        current.azure_api_key = "abcdefghijklmnop".to_string();
        current.openai_api_key = "sk-0123456789abcdef".to_string();

        let mut moved = current.redacted();
        moved.azure_endpoint = "elsewhere.example".to_string();
        moved.openai_base_url = "https://elsewhere.example/v1".to_string();
        let merged = moved.with_secrets_from(&current);
        assert_eq!(merged.azure_api_key, "");
        assert_eq!(merged.openai_api_key, "");

        // A fresh key for the new endpoint is kept as given
        let mut moved = current.redacted();
        moved.azure_endpoint = "elsewhere.example".to_string();
        moved.azure_api_key = "key-for-elsewhere-99".to_string();
        assert_eq!(
            moved.with_secrets_from(&current).azure_api_key,
            "key-for-elsewhere-99"
        );
    }
}
