//! Configuration management for receipt retrieval.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides. Registry credentials are expected to come
//! from the environment.

use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Main application configuration.
///
/// This is loaded from `~/.config/receipt-tracker/config.toml` (or platform
/// equivalent). If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Official registry API settings
    pub registry: RegistryConfig,
    /// Platforma OFD operator site settings
    pub platforma_ofd: OperatorConfig,
    /// Taxcom operator site settings
    pub taxcom: OperatorConfig,
    /// Source ordering and HTTP behaviour
    pub retrieval: RetrievalConfig,
}

impl AppConfig {
    /// Load configuration from disk, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit path, falling back to defaults if
    /// the file doesn't exist.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            tracing::debug!("Loading config from {}", path.display());
            let contents = fs::read_to_string(path)?;
            let config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `RECEIPT_CHECKER_LOGIN`: Registry login
    /// - `RECEIPT_CHECKER_PASSWORD`: Registry password
    /// - `RECEIPT_CHECKER_DEVICE_ID`: Value of the `Device-Id` header
    /// - `RECEIPT_CHECKER_DEVICE_OS`: Value of the `Device-OS` header
    /// - `RECEIPT_SOURCES`: Comma-separated source order, e.g. `taxcom,official-registry`
    pub fn load_with_env() -> ConfigResult<Self> {
        let mut config = Self::load()?;
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production).
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> ConfigResult<()> {
        if let Some(login) = var("RECEIPT_CHECKER_LOGIN") {
            tracing::debug!("Override registry.login from env");
            self.registry.login = login;
        }

        if let Some(password) = var("RECEIPT_CHECKER_PASSWORD") {
            self.registry.password = Some(password);
        }

        if let Some(device_id) = var("RECEIPT_CHECKER_DEVICE_ID") {
            tracing::debug!("Override registry.device_id from env: {}", device_id);
            self.registry.device_id = device_id;
        }

        if let Some(device_os) = var("RECEIPT_CHECKER_DEVICE_OS") {
            tracing::debug!("Override registry.device_os from env: {}", device_os);
            self.registry.device_os = device_os;
        }

        if let Some(sources) = var("RECEIPT_SOURCES") {
            self.retrieval.sources = parse_source_list(&sources)?;
            tracing::debug!("Override retrieval.sources from env: {:?}", self.retrieval.sources);
        }

        Ok(())
    }

    /// Save configuration to disk.
    ///
    /// Creates the config directory if it doesn't exist.
    pub fn save(&self) -> ConfigResult<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to an explicit path.
    pub fn save_to(&self, config_path: &Path) -> ConfigResult<()> {
        let config_dir = config_path
            .parent()
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "config_path".to_string(),
                reason: "no parent directory".to_string(),
            })?;

        fs::create_dir_all(config_dir)?;
        tracing::debug!("Saving config to {}", config_path.display());

        let contents = toml::to_string_pretty(self)?;
        fs::write(config_path, contents)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/receipt-tracker/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs = ProjectDirs::from("com", "receipt-tracker", "receipt-tracker")
            .ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }
}

/// Official registry API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Base URL of the registry API
    pub base_url: String,
    /// Basic auth login
    pub login: String,
    /// Basic auth password (environment only, never written to disk)
    #[serde(skip)]
    pub password: Option<String>,
    /// Value of the `Device-Id` header
    pub device_id: String,
    /// Value of the `Device-OS` header
    pub device_os: String,
    /// Detail fetch attempts before giving up
    pub max_tries: u32,
    /// Delay between detail fetch attempts in seconds
    pub retry_delay_secs: u64,
    /// Hours subtracted from the registry's local timestamps
    pub timezone_offset_hours: i64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://proverkacheka.nalog.ru:9999".to_string(),
            login: String::new(),
            password: None,
            device_id: String::new(),
            device_os: "Android 5.1".to_string(),
            max_tries: 5,
            retry_delay_secs: 5,
            timezone_offset_hours: 0,
        }
    }
}

/// Operator site settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    /// Base URL of the operator portal; empty means the built-in default
    pub base_url: String,
    /// Hours subtracted from the portal's local wall-clock timestamps
    pub timezone_offset_hours: i64,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timezone_offset_hours: 7,
        }
    }
}

/// Source ordering and HTTP behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Sources tried in order; the first one that finds the receipt wins
    pub sources: Vec<SourceKind>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// User agent string
    pub user_agent: String,
    /// Delay before a lookup that found nothing is attempted again, in seconds
    pub reschedule_after_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            sources: vec![
                SourceKind::OfficialRegistry,
                SourceKind::PlatformaOfd,
                SourceKind::Taxcom,
            ],
            timeout_secs: 30,
            user_agent: "receipt-tracker/0.1.0".to_string(),
            reschedule_after_secs: 3600,
        }
    }
}

/// Known receipt sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// Official government registry API
    OfficialRegistry,
    /// Platforma OFD operator portal
    PlatformaOfd,
    /// Taxcom operator portal
    Taxcom,
}

impl SourceKind {
    /// Every known source, in the default order.
    pub const ALL: [SourceKind; 3] = [Self::OfficialRegistry, Self::PlatformaOfd, Self::Taxcom];

    /// Stable identifier used in config files and on the command line.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OfficialRegistry => "official-registry",
            Self::PlatformaOfd => "platforma-ofd",
            Self::Taxcom => "taxcom",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "sources".to_string(),
                reason: format!("unknown source '{s}'"),
            })
    }
}

fn parse_source_list(value: &str) -> ConfigResult<Vec<SourceKind>> {
    value
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(str::parse)
        .collect()
}
