//! # Configuration
//!
//! Centralizes all settings with a clear override hierarchy:
//! defaults → config file → env vars → CLI flags.
//!
//! Config lives at `~/.lmbridge/config.toml`. If missing on first run, a
//! commented-out default is generated so users can discover all options.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::http::{
    DEFAULT_ATTEMPTS, DEFAULT_BACKOFF_FACTOR, DEFAULT_STATUS_FORCELIST, DEFAULT_TIMEOUT,
};
use crate::api::{DEFAULT_BASE_URL, HttpOptions, LmStudioClient, RetryPolicy};
use crate::inference::{LmStudioProvider, ModelSettings, ProviderError};

// ============================================================================
// Config Structs (all fields Option<T> for sparse TOML)
// ============================================================================

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ServerConfig {
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RetryConfig {
    pub attempts: Option<u32>,
    pub backoff_factor: Option<f64>,
    pub status_forcelist: Option<Vec<u16>>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ModelConfig {
    pub name: Option<String>,
}

/// Default sampling settings handed to the provider.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SettingsConfig {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub stop_sequences: Option<Vec<String>>,
}

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_MODEL_NAME: &str = "phi-4";

// ============================================================================
// Resolved Config (concrete values, no Options)
// ============================================================================

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub base_url: String,
    pub model_name: String,
    pub http: HttpOptions,
    pub default_settings: ModelSettings,
}

impl ResolvedConfig {
    pub fn client(&self) -> Result<LmStudioClient, ProviderError> {
        LmStudioClient::new(&self.base_url, self.http.clone())
            .map_err(|e| ProviderError::Config(e.to_string()))
    }

    /// Builds the provider with the `[settings]` table as its defaults.
    pub fn provider(&self) -> Result<LmStudioProvider, ProviderError> {
        Ok(LmStudioProvider::new(self.client()?, self.model_name.clone())?
            .with_defaults(self.default_settings.clone()))
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config I/O error: {e}"),
            ConfigError::Parse(e) => write!(f, "config parse error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Loading
// ============================================================================

/// Returns the path to `~/.lmbridge/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".lmbridge").join("config.toml"))
}

/// Load config from `~/.lmbridge/config.toml`.
///
/// If the file doesn't exist, generates a commented-out default and
/// returns `BridgeConfig::default()`. If it exists but is malformed,
/// returns `ConfigError::Parse`.
pub fn load_config() -> Result<BridgeConfig, ConfigError> {
    let path = match config_path() {
        Some(p) => p,
        None => {
            warn!("Could not determine home directory, using default config");
            return Ok(BridgeConfig::default());
        }
    };

    if !path.exists() {
        info!("No config file found, generating default at {}", path.display());
        generate_default_config(&path);
        return Ok(BridgeConfig::default());
    }

    load_config_from(&path)
}

/// Load config from an explicit path. The file must exist.
pub fn load_config_from(path: &Path) -> Result<BridgeConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config: BridgeConfig = toml::from_str(&contents).map_err(ConfigError::Parse)?;
    info!("Loaded config from {}", path.display());
    debug!("Config: {:?}", config);
    Ok(config)
}

/// Generates a commented-out default config file at the given path.
fn generate_default_config(path: &Path) {
    let default_content = r#"# lmbridge configuration
# All settings are optional; defaults are used for anything not specified.
# Override hierarchy: defaults → this file → env vars → CLI flags.

# [server]
# base_url = "http://127.0.0.1:1234"   # Or set LM_STUDIO_BASE_URL
# timeout_secs = 60

# [retry]
# attempts = 3                         # Total attempts, including the first
# backoff_factor = 0.3                 # Seconds; doubles after each retry
# status_forcelist = [500, 502, 504]

# [model]
# name = "phi-4"                       # Or set LMBRIDGE_MODEL

# [settings]
# max_tokens = 384
# temperature = 0.6
# stop_sequences = ["END"]             # Only the first is sent to the server
"#;

    if let Some(parent) = path.parent()
        && let Err(e) = fs::create_dir_all(parent)
    {
        warn!("Failed to create config directory: {}", e);
        return;
    }
    if let Err(e) = fs::write(path, default_content) {
        warn!("Failed to write default config: {}", e);
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Resolve the final config by collapsing: defaults → config file → env vars → CLI.
///
/// `cli_base_url` and `cli_model` are from CLI flags (None = not specified).
pub fn resolve(
    config: &BridgeConfig,
    cli_base_url: Option<&str>,
    cli_model: Option<&str>,
) -> ResolvedConfig {
    // Base URL: CLI → env → config → default
    let base_url = cli_base_url
        .map(|s| s.to_string())
        .or_else(|| std::env::var("LM_STUDIO_BASE_URL").ok())
        .or_else(|| config.server.base_url.clone())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

    // Model: CLI → env → config → default
    let model_name = cli_model
        .map(|s| s.to_string())
        .or_else(|| std::env::var("LMBRIDGE_MODEL").ok())
        .or_else(|| config.model.name.clone())
        .unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string());

    let retry = RetryPolicy {
        attempts: config.retry.attempts.unwrap_or(DEFAULT_ATTEMPTS),
        backoff_factor: config.retry.backoff_factor.unwrap_or(DEFAULT_BACKOFF_FACTOR),
        status_forcelist: config
            .retry
            .status_forcelist
            .clone()
            .unwrap_or_else(|| DEFAULT_STATUS_FORCELIST.to_vec()),
        ..RetryPolicy::default()
    };

    let timeout = config
        .server
        .timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_TIMEOUT);

    ResolvedConfig {
        base_url,
        model_name,
        http: HttpOptions { timeout, retry },
        default_settings: settings_from_config(&config.settings),
    }
}

/// Only keys present in the file end up in the settings bag.
fn settings_from_config(settings: &SettingsConfig) -> ModelSettings {
    let mut bag = ModelSettings::new();
    if let Some(max_tokens) = settings.max_tokens {
        bag = bag.set("max_tokens", max_tokens);
    }
    if let Some(temperature) = settings.temperature {
        bag = bag.set("temperature", temperature);
    }
    if let Some(ref stop) = settings.stop_sequences {
        bag = bag.set("stop_sequences", stop.clone());
    }
    bag
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config = BridgeConfig::default();
        assert!(config.server.base_url.is_none());
        assert!(config.settings.max_tokens.is_none());
    }

    #[test]
    fn test_resolve_uses_defaults_when_empty() {
        let config = BridgeConfig::default();
        let resolved = resolve(&config, Some(DEFAULT_BASE_URL), Some(DEFAULT_MODEL_NAME));
        assert_eq!(resolved.http.timeout, DEFAULT_TIMEOUT);
        assert_eq!(resolved.http.retry.attempts, 3);
        assert_eq!(resolved.http.retry.status_forcelist, vec![500, 502, 504]);
        assert!(resolved.default_settings.is_empty());
    }

    #[test]
    fn test_resolve_config_values_override_defaults() {
        let config = BridgeConfig {
            retry: RetryConfig {
                attempts: Some(5),
                backoff_factor: Some(1.0),
                status_forcelist: Some(vec![503]),
            },
            server: ServerConfig {
                base_url: None,
                timeout_secs: Some(10),
            },
            settings: SettingsConfig {
                max_tokens: Some(384),
                temperature: Some(0.6),
                stop_sequences: Some(vec!["END".to_string()]),
            },
            ..Default::default()
        };
        let resolved = resolve(&config, Some("http://10.0.0.2:1234"), Some("qwen"));
        assert_eq!(resolved.http.retry.attempts, 5);
        assert_eq!(resolved.http.retry.status_forcelist, vec![503]);
        assert_eq!(resolved.http.timeout, Duration::from_secs(10));
        assert_eq!(resolved.default_settings.max_tokens(), Some(384));
        assert_eq!(resolved.default_settings.temperature(), Some(0.6));
        assert_eq!(
            resolved.default_settings.stop_sequences(),
            Some(vec!["END".to_string()])
        );
    }

    #[test]
    fn test_resolve_cli_wins() {
        let config = BridgeConfig {
            server: ServerConfig {
                base_url: Some("http://from-file:1234".to_string()),
                timeout_secs: None,
            },
            model: ModelConfig {
                name: Some("from-file".to_string()),
            },
            ..Default::default()
        };
        let resolved = resolve(&config, Some("http://from-cli:1234"), Some("from-cli"));
        assert_eq!(resolved.base_url, "http://from-cli:1234");
        assert_eq!(resolved.model_name, "from-cli");
    }

    #[test]
    fn test_resolved_config_builds_provider() {
        let config = BridgeConfig {
            settings: SettingsConfig {
                max_tokens: Some(64),
                ..Default::default()
            },
            ..Default::default()
        };
        let resolved = resolve(&config, Some("http://127.0.0.1:4321"), Some("phi-4"));
        let provider = resolved.provider().unwrap();
        assert_eq!(provider.model_name(), "phi-4");
        assert_eq!(provider.client().base_url(), "http://127.0.0.1:4321");
        assert_eq!(provider.defaults().max_tokens(), Some(64));
    }

    #[test]
    fn test_bad_base_url_is_config_error() {
        let resolved = resolve(&BridgeConfig::default(), Some("::nope::"), Some("phi-4"));
        assert!(matches!(resolved.provider(), Err(ProviderError::Config(_))));
    }

    #[test]
    fn test_toml_round_trip() {
        let toml_str = r#"
[server]
base_url = "http://192.168.1.100:1234"
timeout_secs = 30

[retry]
attempts = 4
status_forcelist = [500, 503]

[model]
name = "phi-4"

[settings]
max_tokens = 384
temperature = 0.6
stop_sequences = ["\n\n", "END"]
"#;
        let config: BridgeConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(
            config.server.base_url.as_deref(),
            Some("http://192.168.1.100:1234")
        );
        assert_eq!(config.retry.attempts, Some(4));
        assert_eq!(config.retry.backoff_factor, None);
        assert_eq!(config.model.name.as_deref(), Some("phi-4"));
        assert_eq!(config.settings.stop_sequences.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn test_sparse_toml_parses() {
        // Only override one thing; everything else stays default
        let toml_str = r#"
[model]
name = "my-model"
"#;
        let config: BridgeConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.model.name.as_deref(), Some("my-model"));
        assert!(config.server.base_url.is_none());
        assert!(config.retry.attempts.is_none());
    }

    #[test]
    fn test_load_config_from_reports_parse_errors() {
        let path = std::env::temp_dir().join(format!("lmbridge-bad-{}.toml", std::process::id()));
        fs::write(&path, "[retry]\nattempts = \"many\"\n").unwrap();
        let result = load_config_from(&path);
        let _ = fs::remove_file(&path);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
