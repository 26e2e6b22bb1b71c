//! Monitor configuration management

use anyhow::{Context, Result, anyhow};
use hotplug::{EventMask, Filter, MatchValue};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub monitor: MonitorSettings,
    /// One hotplug registration per entry
    #[serde(default)]
    pub watch: Vec<WatchConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSettings {
    pub log_level: String,
    /// Timeout handed to each `handle_events` call on the event thread
    #[serde(default = "MonitorSettings::default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl MonitorSettings {
    fn default_poll_interval() -> u64 {
        100
    }
}

/// A single watched device pattern
///
/// # Example Configuration
/// ```toml
/// [[watch]]
/// name = "keyboards"
/// filter = "0x046d:*:0x03"  # Logitech HID devices
/// events = ["arrived", "left"]
/// enumerate = true
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Label used in log lines
    pub name: String,
    /// VID:PID[:CLASS], each field `*` or a `0x` hex value
    #[serde(default = "WatchConfig::default_filter")]
    pub filter: String,
    #[serde(default = "WatchConfig::default_events")]
    pub events: Vec<WatchEvent>,
    /// Report devices already present at startup
    #[serde(default)]
    pub enumerate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchEvent {
    Arrived,
    Left,
}

impl WatchConfig {
    fn default_filter() -> String {
        "*:*".to_string()
    }

    fn default_events() -> Vec<WatchEvent> {
        vec![WatchEvent::Arrived, WatchEvent::Left]
    }

    /// Event mask built from the `events` list
    pub fn event_mask(&self) -> EventMask {
        self.events
            .iter()
            .fold(EventMask::empty(), |mask, event| match event {
                WatchEvent::Arrived => mask | EventMask::ARRIVED,
                WatchEvent::Left => mask | EventMask::LEFT,
            })
    }

    /// Parse the filter pattern into a registry filter
    pub fn to_filter(&self) -> Result<Filter> {
        let parts: Vec<&str> = self.filter.split(':').collect();
        if parts.len() != 2 && parts.len() != 3 {
            return Err(anyhow!(
                "Invalid filter '{}' in watch '{}', expected VID:PID[:CLASS] (e.g., '0x1234:*' or '*:*:0x03')",
                self.filter,
                self.name
            ));
        }

        let field = |value: &str, label: &str| -> Result<MatchValue> {
            value.parse::<MatchValue>().with_context(|| {
                format!("Invalid {} in watch '{}'", label, self.name)
            })
        };

        let filter = Filter {
            vendor_id: field(parts[0], "VID")?,
            product_id: field(parts[1], "PID")?,
            class_code: match parts.get(2) {
                Some(class) => field(class, "CLASS")?,
                None => MatchValue::Any,
            },
            events: self.event_mask(),
            enumerate: self.enumerate,
        };

        filter
            .validate()
            .with_context(|| format!("Invalid filter '{}' in watch '{}'", self.filter, self.name))?;

        Ok(filter)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            monitor: MonitorSettings {
                log_level: "info".to_string(),
                poll_interval_ms: MonitorSettings::default_poll_interval(),
            },
            watch: vec![WatchConfig {
                name: "all".to_string(),
                filter: WatchConfig::default_filter(),
                events: WatchConfig::default_events(),
                enumerate: true,
            }],
        }
    }
}

impl MonitorConfig {
    /// Load configuration from the specified path
    ///
    /// A leading `~` in the path is expanded to the home directory.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            PathBuf::from(shellexpand::tilde(&p.to_string_lossy()).as_ref())
        } else {
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/usb-hotplug/monitor.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: MonitorConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("usb-hotplug").join("monitor.toml")
        } else {
            PathBuf::from(".config/usb-hotplug/monitor.toml")
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.monitor.poll_interval_ms)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.monitor.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.monitor.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.monitor.poll_interval_ms == 0 {
            return Err(anyhow!("poll_interval_ms must be greater than 0"));
        }

        for watch in &self.watch {
            if watch.name.is_empty() {
                return Err(anyhow!("Empty name in [[watch]] entry"));
            }
            if watch.events.is_empty() {
                return Err(anyhow!("Watch '{}' has an empty events list", watch.name));
            }
            watch.to_filter()?;
        }

        Ok(())
    }
}
