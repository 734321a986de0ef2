//! Configuration management for the docchat bot.
//!
//! The bot reads an optional JSON file at `~/.docchat/config.json` (or the
//! path in `DOCCHAT_CONFIG`), then applies environment overrides. A `.env`
//! file in the working directory is loaded first so its values count as
//! environment variables.
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `TELEGRAM_BOT_TOKEN` → telegram.bot_token
//! - `CHATPDF_API_KEY` → chatpdf.api_key
//! - `CHATPDF_BASE_URL` → chatpdf.base_url
//! - `DOCCHAT_LOG_LEVEL` → observability.log_level
//! - `DOCCHAT_LOG_FORMAT` → observability.log_format

use crate::error::{Error, Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable holding an explicit config file path.
pub const CONFIG_PATH_ENV: &str = "DOCCHAT_CONFIG";

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".docchat"),
        |dirs| dirs.home_dir().join(".docchat"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    std::env::var(CONFIG_PATH_ENV)
        .map(|p| PathBuf::from(shellexpand::tilde(&p).into_owned()))
        .unwrap_or_else(|_| config_dir().join("config.json"))
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Telegram transport configuration
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// ChatPDF document-QA service configuration
    #[serde(default)]
    pub chatpdf: ChatPdfConfig,

    /// Accepted documents and local staging
    #[serde(default)]
    pub documents: DocumentsConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Files this configuration was read from
    #[serde(skip)]
    pub sources: ConfigSources,
}

/// Files consulted while loading, kept so they can be logged once logging is up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSources {
    /// `.env` file loaded into the environment
    pub env_file: Option<PathBuf>,
    /// JSON config file, `None` when defaults were used
    pub config_file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config from {}", path.display()))?;

        let mut config: Self = serde_json::from_str(&content)
            .context(format!("Failed to parse config from {}", path.display()))?;
        config.sources.config_file = Some(path.to_path_buf());
        Ok(config)
    }

    /// Load `.env`, the config file, and environment overrides, then validate.
    ///
    /// Missing credentials are a fatal startup error.
    pub fn load_with_env() -> Result<Self> {
        let env_file = match dotenvy::dotenv() {
            Ok(path) => Some(path),
            Err(e) if e.not_found() => None,
            Err(e) => return Err(Error::Config(format!("Failed to load .env file: {e}"))),
        };

        let mut config = Self::load()?;
        config.sources.env_file = env_file;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides using an arbitrary lookup (environment, test fixtures).
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = non_empty("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = Some(token);
        }
        if let Some(key) = non_empty("CHATPDF_API_KEY") {
            self.chatpdf.api_key = Some(key);
        }
        if let Some(url) = non_empty("CHATPDF_BASE_URL") {
            self.chatpdf.base_url = url;
        }
        if let Some(level) = non_empty("DOCCHAT_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = non_empty("DOCCHAT_LOG_FORMAT") {
            self.observability.log_format = format;
        }
    }

    /// Check that both required credentials are present.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.telegram_bot_token().is_none() {
            missing.push("TELEGRAM_BOT_TOKEN");
        }
        if self.chatpdf_api_key().is_none() {
            missing.push("CHATPDF_API_KEY");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(format!(
                "{} not set. Please check your .env file or {}",
                missing.join(", "),
                config_path().display()
            )))
        }
    }

    /// Report where the configuration came from. Call after logging is initialized.
    pub fn log_sources(&self) {
        if let Some(path) = &self.sources.env_file {
            tracing::debug!("Loaded environment from {}", path.display());
        }
        match &self.sources.config_file {
            Some(path) => tracing::info!("Loaded config from {}", path.display()),
            None => tracing::info!("Config file not found, using defaults"),
        }
    }

    /// Telegram bot token, if configured and non-empty.
    pub fn telegram_bot_token(&self) -> Option<&str> {
        self.telegram
            .bot_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
    }

    /// ChatPDF API key, if configured and non-empty.
    pub fn chatpdf_api_key(&self) -> Option<&str> {
        self.chatpdf
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
    }
}

// ============================================================================
// Telegram
// ============================================================================

/// Telegram channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token issued by BotFather
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Long-poll timeout for getUpdates in seconds
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,

    /// Bot API base URL
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            poll_timeout_secs: default_poll_timeout(),
            api_base: default_telegram_api_base(),
        }
    }
}

fn default_poll_timeout() -> u64 {
    30
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".into()
}

// ============================================================================
// ChatPDF
// ============================================================================

/// ChatPDF service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatPdfConfig {
    /// API key sent in the `x-api-key` header
    #[serde(default)]
    pub api_key: Option<String>,

    /// API base URL (without trailing slash)
    #[serde(default = "default_chatpdf_base_url")]
    pub base_url: String,

    /// Total request timeout in seconds
    #[serde(default = "default_chatpdf_timeout")]
    pub timeout_secs: u64,

    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for ChatPdfConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_chatpdf_base_url(),
            timeout_secs: default_chatpdf_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_chatpdf_base_url() -> String {
    "https://api.chatpdf.com/v1".into()
}

fn default_chatpdf_timeout() -> u64 {
    120
}

fn default_connect_timeout() -> u64 {
    10
}

// ============================================================================
// Documents
// ============================================================================

/// Accepted document types and local staging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentsConfig {
    /// Accepted file extensions (lowercase, without dot)
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    /// Largest file the bot will download (Telegram caps bot downloads at 20 MB)
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    /// Directory for staged uploads; system temp dir when unset
    #[serde(default)]
    pub staging_dir: Option<String>,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: default_allowed_extensions(),
            max_file_bytes: default_max_file_bytes(),
            staging_dir: None,
        }
    }
}

impl DocumentsConfig {
    /// Resolved staging directory.
    pub fn staging_path(&self) -> PathBuf {
        self.staging_dir
            .as_deref()
            .map(|d| PathBuf::from(shellexpand::tilde(d).into_owned()))
            .unwrap_or_else(std::env::temp_dir)
    }
}

fn default_allowed_extensions() -> Vec<String> {
    vec!["pdf".into()]
}

fn default_max_file_bytes() -> u64 {
    20 * 1024 * 1024
}

// ============================================================================
// Observability
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}
