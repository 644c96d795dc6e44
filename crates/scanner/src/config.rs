//! Scanner configuration management

use crate::interpreter::{PollLimit, TransferTimeouts};
use crate::usb::ConnectionSettings;
use anyhow::{Context, Result, anyhow};
use common::DeviceFilter;
use protocol::ScanMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Bytes requested per read unless configured otherwise
pub const DEFAULT_CHUNK_SIZE: usize = 3000;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScannerConfig {
    #[serde(default)]
    pub scanner: ScannerSettings,
    #[serde(default)]
    pub usb: UsbSettings,
    #[serde(default)]
    pub timeouts: TimeoutSettings,
    #[serde(default)]
    pub poll: PollSettings,
    #[serde(default)]
    pub scripts: ScriptSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannerSettings {
    #[serde(default = "ScannerSettings::default_log_level")]
    pub log_level: String,
    /// Scan mode used when none is given on the command line
    #[serde(default)]
    pub mode: ScanMode,
    /// Bytes requested from the session per read
    #[serde(default = "ScannerSettings::default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
            mode: ScanMode::default(),
            chunk_size: Self::default_chunk_size(),
        }
    }
}

impl ScannerSettings {
    fn default_log_level() -> String {
        "info".to_string()
    }

    fn default_chunk_size() -> usize {
        DEFAULT_CHUNK_SIZE
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsbSettings {
    /// Device to open, as `VID:PID` (e.g., "0x0461:0x0346")
    #[serde(default)]
    pub device: DeviceFilter,
    #[serde(default = "UsbSettings::default_configuration")]
    pub configuration: u8,
    #[serde(default)]
    pub interface: u8,
    #[serde(default)]
    pub alt_setting: u8,
}

impl Default for UsbSettings {
    fn default() -> Self {
        Self {
            device: DeviceFilter::default(),
            configuration: Self::default_configuration(),
            interface: 0,
            alt_setting: 0,
        }
    }
}

impl UsbSettings {
    fn default_configuration() -> u8 {
        1
    }

    pub fn connection(&self) -> ConnectionSettings {
        ConnectionSettings {
            configuration: self.configuration,
            interface: self.interface,
            alt_setting: self.alt_setting,
        }
    }
}

/// Per-transfer timeouts in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutSettings {
    #[serde(default = "TimeoutSettings::default_control")]
    pub control_ms: u64,
    #[serde(default = "TimeoutSettings::default_bulk_read")]
    pub bulk_read_ms: u64,
    #[serde(default = "TimeoutSettings::default_bulk_write")]
    pub bulk_write_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            control_ms: Self::default_control(),
            bulk_read_ms: Self::default_bulk_read(),
            bulk_write_ms: Self::default_bulk_write(),
        }
    }
}

impl TimeoutSettings {
    fn default_control() -> u64 {
        300
    }

    fn default_bulk_read() -> u64 {
        3000
    }

    fn default_bulk_write() -> u64 {
        100
    }

    pub fn to_timeouts(&self) -> TransferTimeouts {
        TransferTimeouts {
            control: Duration::from_millis(self.control_ms),
            bulk_read: Duration::from_millis(self.bulk_read_ms),
            bulk_write: Duration::from_millis(self.bulk_write_ms),
        }
    }
}

/// Bound on status polling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollSettings {
    #[serde(default = "PollSettings::default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "PollSettings::default_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "PollSettings::default_interval")]
    pub interval_ms: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            max_attempts: Self::default_max_attempts(),
            timeout_ms: Self::default_timeout(),
            interval_ms: Self::default_interval(),
        }
    }
}

impl PollSettings {
    fn default_max_attempts() -> u32 {
        2000
    }

    fn default_timeout() -> u64 {
        30_000
    }

    fn default_interval() -> u64 {
        5
    }

    pub fn to_limit(&self) -> PollLimit {
        PollLimit {
            max_attempts: self.max_attempts,
            timeout: Duration::from_millis(self.timeout_ms),
            interval: Duration::from_millis(self.interval_ms),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptSettings {
    /// Script bundle file; `~` is expanded.
    /// If None, uses <config_dir>/primascan/colorado-2400u.toml
    #[serde(default)]
    pub path: Option<String>,
}

impl ScriptSettings {
    /// Resolved location of the script bundle
    pub fn resolved_path(&self) -> PathBuf {
        match &self.path {
            Some(p) => PathBuf::from(shellexpand::tilde(p).as_ref()),
            None => ScannerConfig::config_dir().join("colorado-2400u.toml"),
        }
    }
}

impl ScannerConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/primascan/scanner.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: ScannerConfig = toml::from_str(&content)
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
        Self::config_dir().join("scanner.toml")
    }

    fn config_dir() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("primascan")
        } else {
            PathBuf::from(".config/primascan")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.scanner.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.scanner.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.scanner.chunk_size == 0 {
            return Err(anyhow!("chunk_size must be greater than 0"));
        }

        if self.poll.max_attempts == 0 {
            return Err(anyhow!("poll.max_attempts must be greater than 0"));
        }

        if self.poll.timeout_ms == 0 {
            return Err(anyhow!("poll.timeout_ms must be greater than 0"));
        }

        let timeouts = [
            ("control_ms", self.timeouts.control_ms),
            ("bulk_read_ms", self.timeouts.bulk_read_ms),
            ("bulk_write_ms", self.timeouts.bulk_write_ms),
        ];
        for (name, value) in timeouts {
            // libusb treats a zero timeout as "wait forever"
            if value == 0 {
                return Err(anyhow!("timeouts.{} must be greater than 0", name));
            }
        }

        Ok(())
    }
}
