//! Configuration module for the voice intake coordinator.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for recognition,
//! push-to-talk and the message broker, `AppPaths` for the platform config
//! directory, and TOML persistence via `AppConfig::load` / `AppConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{AppConfig, BrokerConfig, HotkeyConfig, RecognitionConfig};
