//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across tasks.
//! Missing keys fall back to their defaults, so a partial `settings.toml`
//! written by hand is accepted.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// RecognitionConfig
// ---------------------------------------------------------------------------

/// Settings read once when a recognition session is constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// BCP-47 language tag handed to the engine (e.g. `"ja-JP"`).
    pub language: String,
    /// Ask the engine for partial results while speech continues.
    pub interim_results: bool,
    /// Keep the engine running across utterances.  Off by default: one
    /// utterance closes the turn and auto mode restarts it.
    pub continuous: bool,
    /// Settle delay before auto mode restarts listening after a turn ends.
    pub restart_delay_ms: u64,
}

impl RecognitionConfig {
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            language: "ja-JP".into(),
            interim_results: true,
            continuous: false,
            restart_delay_ms: 500,
        }
    }
}

// ---------------------------------------------------------------------------
// HotkeyConfig
// ---------------------------------------------------------------------------

/// Push-to-talk bindings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotkeyConfig {
    /// Push-to-talk key name (e.g. `"Space"`).
    pub push_to_talk_key: String,
    /// Modifier that must be held together with the key (e.g. `"Alt"`).
    pub modifier: String,
    /// Minimum hold time for a keyboard transcript to be sent.  Shorter
    /// presses are treated as accidental.
    pub min_hold_ms: u64,
}

impl HotkeyConfig {
    pub fn min_hold(&self) -> Duration {
        Duration::from_millis(self.min_hold_ms)
    }
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            push_to_talk_key: "Space".into(),
            modifier: "Alt".into(),
            min_hold_ms: 1000,
        }
    }
}

// ---------------------------------------------------------------------------
// BrokerConfig
// ---------------------------------------------------------------------------

/// Message broker subscription settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Whether the broker bridge connects at all.
    pub enabled: bool,
    /// Broker URL, e.g. `ws://localhost:8080/mqtt`.
    pub url: String,
    /// Comma-separated topic list.
    pub topic: String,
    /// Interval between keep-alive pings, in seconds.
    pub keepalive_secs: u64,
    /// Wait before the transport reconnects on its own, in milliseconds.
    pub reconnect_period_ms: u64,
}

impl BrokerConfig {
    /// Split [`topic`](Self::topic) on commas, trimming whitespace and
    /// dropping empty entries.
    ///
    /// ```
    /// use voice_intake::config::BrokerConfig;
    ///
    /// let cfg = BrokerConfig { topic: " chat, ,control ,".into(), ..Default::default() };
    /// assert_eq!(cfg.topics(), vec!["chat".to_string(), "control".to_string()]);
    /// ```
    pub fn topics(&self) -> Vec<String> {
        self.topic
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect()
    }

    /// `true` when the bridge should hold a connection: enabled and a URL
    /// is set.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.url.trim().is_empty()
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            topic: String::new(),
            keepalive_secs: 30,
            reconnect_period_ms: 1000,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use voice_intake::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Speech recognition engine settings.
    pub recognition: RecognitionConfig,
    /// Push-to-talk bindings.
    pub hotkey: HotkeyConfig,
    /// Broker subscription settings.
    pub broker: BrokerConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
