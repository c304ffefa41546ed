//! Configuration for the event layer
//!
//! Loads configuration from TOML file at `~/.config/area/events.toml`
//! Auto-generates default config file on first run if missing.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::probe::Extension;

/// Environment variable that overrides `debug.events`
pub const DEBUG_EVENTS_ENV: &str = "AREA_X11_DEBUG_EVENTS";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub debug: DebugConfig,
    pub extensions: ExtensionsConfig,
    pub trace: TraceConfig,
}

impl Config {
    /// Load configuration from file, or use defaults if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            info!("Config file not found at {:?}, using defaults", config_path);
            // Auto-generate default config file
            if let Err(e) = Self::save_default(&config_path) {
                warn!("Failed to create default config file: {}", e);
            }
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path).context("Failed to read config file")?;
        let config = Self::parse(&content)?;

        info!("Configuration loaded from {:?}", config_path);
        debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Parse configuration text. Missing sections and keys take their defaults.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Debug filter string, with the environment taking precedence.
    pub fn debug_events(&self) -> String {
        self.debug.resolve_events(std::env::var(DEBUG_EVENTS_ENV).ok())
    }

    /// Get the path to the config file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("area");

        Ok(config_dir.join("events.toml"))
    }

    /// Save default configuration to file
    fn save_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(&Self::default())
            .context("Failed to serialize default config")?;

        fs::write(path, toml_string).context("Failed to write default config file")?;

        info!("Created default config file at {:?}", path);
        Ok(())
    }
}

/// Verbose event logging
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Comma-separated event names, `-Name` to exclude, `*` or `all` for everything
    pub events: String,
}

impl DebugConfig {
    fn resolve_events(&self, env: Option<String>) -> String {
        match env {
            Some(events) => {
                debug!("Debug event filter from {}: {:?}", DEBUG_EVENTS_ENV, events);
                events
            }
            None => self.events.clone(),
        }
    }
}

/// Which optional extensions to probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionsConfig {
    pub xkb: bool,
    pub xfixes: bool,
    pub damage: bool,
    pub shape: bool,
    pub xinput: bool,
    pub randr: bool,
}

impl ExtensionsConfig {
    pub fn is_enabled(&self, extension: Extension) -> bool {
        match extension {
            Extension::Xkb => self.xkb,
            Extension::XFixes => self.xfixes,
            Extension::Damage => self.damage,
            Extension::Shape => self.shape,
            Extension::XInput => self.xinput,
            Extension::RandR => self.randr,
        }
    }
}

impl Default for ExtensionsConfig {
    fn default() -> Self {
        Self {
            xkb: true,
            xfixes: true,
            damage: true,
            shape: true,
            xinput: true,
            randr: true,
        }
    }
}

/// Output of the `area-events` tool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    pub format: TraceFormat,
    /// Select substructure, property and focus events on the root window
    pub root_events: bool,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            format: TraceFormat::Text,
            root_events: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_take_defaults() {
        let config = Config::parse("[extensions]\ndamage = false\n").unwrap();
        assert!(!config.extensions.is_enabled(Extension::Damage));
        assert!(config.extensions.is_enabled(Extension::XInput));
        assert_eq!(config.trace, TraceConfig::default());
        assert_eq!(config.debug.events, "");

        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn full_file() {
        let config = Config::parse(
            r#"
            [debug]
            events = "*,-MotionNotify"

            [trace]
            format = "json"
            root_events = false
            "#,
        )
        .unwrap();
        assert_eq!(config.debug.events, "*,-MotionNotify");
        assert_eq!(config.trace.format, TraceFormat::Json);
        assert!(!config.trace.root_events);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(Config::parse("[trace]\nformat = \"xml\"\n").is_err());
        assert!(Config::parse("[extensions]\nxkb = \"yes\"\n").is_err());
    }

    #[test]
    fn environment_overrides_file() {
        let debug = DebugConfig {
            events: "MapNotify".to_string(),
        };
        assert_eq!(debug.resolve_events(None), "MapNotify");
        assert_eq!(debug.resolve_events(Some("-FocusIn".to_string())), "-FocusIn");
        // Set but empty still wins: it turns logging off
        assert_eq!(debug.resolve_events(Some(String::new())), "");
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        assert_eq!(Config::parse(&text).unwrap(), Config::default());
    }
}
