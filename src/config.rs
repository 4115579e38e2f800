//! Configuration loading for stockhand.
//!
//! TOML file with per-section defaults, plus `STOCKHAND_*` environment
//! variable overrides for the values that change between deployments.

use crate::defaults;
use crate::error::{Result, StockhandError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub recognition: RecognitionConfig,
    pub interpreter: InterpreterConfig,
    pub actions: ActionsConfig,
    pub credentials: CredentialsConfig,
    pub session: SessionConfig,
}

/// WebSocket server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

/// Streaming recognition backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecognitionConfig {
    /// WebSocket endpoint of the streaming recognition backend.
    pub url: String,
    pub sample_rate: u32,
}

/// Text-generation service configuration (command interpretation)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Base URL of an OpenAI-compatible chat-completions API.
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

/// Action executor endpoints (email, spreadsheet)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ActionsConfig {
    pub email_endpoint: String,
    /// Default recipient for `email` and `alert` notifications.
    pub email_to: String,
    pub sheet_endpoint: String,
    /// Spreadsheet range inventory mutations are appended to.
    pub inventory_range: String,
}

/// Bearer credential refresh configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CredentialsConfig {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

/// Per-session behavior
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Confirmation wait window as a humantime string, e.g. "30s", "1m".
    pub confirmation_window: String,
    /// Bounded wait for the backend's final flush on stop, e.g. "5s".
    pub flush_timeout: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: defaults::BIND_ADDR.to_string(),
        }
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:9090/stream".to_string(),
            sample_rate: defaults::SAMPLE_RATE,
        }
    }
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: defaults::LLM_MODEL.to_string(),
        }
    }
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            email_endpoint: String::new(),
            email_to: String::new(),
            sheet_endpoint: String::new(),
            inventory_range: "Inventory!A:E".to_string(),
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            token_url: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            refresh_token: String::new(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            confirmation_window: humantime::format_duration(defaults::CONFIRMATION_WINDOW)
                .to_string(),
            flush_timeout: humantime::format_duration(defaults::FLUSH_TIMEOUT).to_string(),
        }
    }
}

impl SessionConfig {
    /// Parsed confirmation window.
    pub fn confirmation_window(&self) -> Result<Duration> {
        parse_duration("session.confirmation_window", &self.confirmation_window)
    }

    /// Parsed flush timeout.
    pub fn flush_timeout(&self) -> Result<Duration> {
        parse_duration("session.flush_timeout", &self.flush_timeout)
    }
}

/// Parse a humantime duration string, also accepting bare seconds.
fn parse_duration(key: &str, value: &str) -> Result<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(value).map_err(|e| StockhandError::ConfigInvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Missing fields use default values; invalid TOML is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StockhandError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                StockhandError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, or defaults if the file is missing.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(StockhandError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Check values that cannot be validated by serde alone.
    pub fn validate(&self) -> Result<()> {
        self.session.confirmation_window()?;
        self.session.flush_timeout()?;
        if self.recognition.sample_rate == 0 {
            return Err(StockhandError::ConfigInvalidValue {
                key: "recognition.sample_rate".to_string(),
                message: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Apply environment variable overrides.
    ///
    /// Supported environment variables:
    /// - STOCKHAND_BIND → server.bind
    /// - STOCKHAND_RECOGNITION_URL → recognition.url
    /// - STOCKHAND_LLM_API_KEY → interpreter.api_key
    /// - STOCKHAND_LLM_MODEL → interpreter.model
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(bind) = std::env::var("STOCKHAND_BIND")
            && !bind.is_empty()
        {
            self.server.bind = bind;
        }

        if let Ok(url) = std::env::var("STOCKHAND_RECOGNITION_URL")
            && !url.is_empty()
        {
            self.recognition.url = url;
        }

        if let Ok(key) = std::env::var("STOCKHAND_LLM_API_KEY")
            && !key.is_empty()
        {
            self.interpreter.api_key = key;
        }

        if let Ok(model) = std::env::var("STOCKHAND_LLM_MODEL")
            && !model.is_empty()
        {
            self.interpreter.model = model;
        }

        self
    }

    /// Get the default configuration file path.
    ///
    /// Returns ~/.config/stockhand/config.toml on Linux.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("stockhand").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.bind, defaults::BIND_ADDR);
        assert_eq!(config.recognition.sample_rate, 16000);
        assert_eq!(config.session.confirmation_window, "30s");
        assert_eq!(config.actions.inventory_range, "Inventory!A:E");
    }

    #[test]
    fn test_load_partial_file_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[recognition]
url = "wss://asr.example.com/v1/stream"
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.recognition.url, "wss://asr.example.com/v1/stream");
        // Untouched sections keep defaults
        assert_eq!(config.recognition.sample_rate, 16000);
        assert_eq!(config.server.bind, defaults::BIND_ADDR);
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let result = Config::load(Path::new("/nonexistent/stockhand.toml"));
        assert!(matches!(
            result,
            Err(StockhandError::ConfigFileNotFound { .. })
        ));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = Config::load_or_default(Path::new("/nonexistent/stockhand.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_invalid_toml_is_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "this is not toml =").unwrap();

        let result = Config::load(file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_confirmation_window_parses_humantime() {
        let mut config = Config::default();
        config.session.confirmation_window = "1m30s".to_string();
        assert_eq!(
            config.session.confirmation_window().unwrap(),
            Duration::from_secs(90)
        );
    }

    #[test]
    fn test_confirmation_window_accepts_bare_seconds() {
        let mut config = Config::default();
        config.session.confirmation_window = "45".to_string();
        assert_eq!(
            config.session.confirmation_window().unwrap(),
            Duration::from_secs(45)
        );
    }

    #[test]
    fn test_invalid_duration_is_config_error() {
        let mut config = Config::default();
        config.session.confirmation_window = "soon".to_string();
        let result = config.validate();
        assert!(matches!(
            result,
            Err(StockhandError::ConfigInvalidValue { key, .. })
                if key == "session.confirmation_window"
        ));
    }

    #[test]
    fn test_zero_sample_rate_rejected() {
        let mut config = Config::default();
        config.recognition.sample_rate = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        // Env vars are process-global; use names unlikely to collide and
        // clean up afterwards.
        unsafe {
            std::env::set_var("STOCKHAND_RECOGNITION_URL", "wss://override.example/ws");
            std::env::set_var("STOCKHAND_LLM_MODEL", "test-model");
        }

        let config = Config::default().with_env_overrides();
        assert_eq!(config.recognition.url, "wss://override.example/ws");
        assert_eq!(config.interpreter.model, "test-model");

        unsafe {
            std::env::remove_var("STOCKHAND_RECOGNITION_URL");
            std::env::remove_var("STOCKHAND_LLM_MODEL");
        }
    }
}
