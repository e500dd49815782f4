//! Configuration loading, validation, and management for Lotline.
//!
//! Loads configuration from `./lotline.toml` (falling back to
//! `~/.lotline/config.toml`) with environment variable overrides for
//! credentials. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `lotline.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where the dataset lives and how to read it
    #[serde(default)]
    pub dataset: DatasetConfig,

    /// Chat backend connection settings
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Context assembly settings
    #[serde(default)]
    pub context: ContextConfig,
}

/// Dataset source, cache, and column mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Path to the delimited master table.
    #[serde(default = "default_data_path")]
    pub path: PathBuf,

    /// Path to the analyst instruction text.
    #[serde(default = "default_instruction_path")]
    pub instruction_path: PathBuf,

    /// Whether to keep a parsed-row cache next to the source.
    #[serde(default = "default_true")]
    pub cache: bool,

    /// Cache location override. Defaults to `<path>.cache.jsonl`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<PathBuf>,

    /// Field delimiter override. When absent the loader sniffs it from
    /// the file itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<char>,

    /// What to do with rows that fail to parse.
    #[serde(default)]
    pub on_bad_row: BadRowPolicy,

    /// Header-name mapping for the columns the pipeline understands.
    #[serde(default)]
    pub columns: ColumnMap,
}

fn default_data_path() -> PathBuf {
    PathBuf::from("artifacts/master_table.csv")
}
fn default_instruction_path() -> PathBuf {
    PathBuf::from("artifacts/preprompt.txt")
}
fn default_true() -> bool {
    true
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: default_data_path(),
            instruction_path: default_instruction_path(),
            cache: true,
            cache_path: None,
            delimiter: None,
            on_bad_row: BadRowPolicy::default(),
            columns: ColumnMap::default(),
        }
    }
}

impl DatasetConfig {
    /// Effective cache file location.
    pub fn cache_file(&self) -> PathBuf {
        match &self.cache_path {
            Some(p) => p.clone(),
            None => {
                let mut name = self.path.as_os_str().to_os_string();
                name.push(".cache.jsonl");
                PathBuf::from(name)
            }
        }
    }
}

/// Policy for rows the loader cannot parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BadRowPolicy {
    /// Fail the whole load on the first bad row.
    #[default]
    Abort,
    /// Discard bad rows, keep the rest, report how many were dropped.
    Drop,
}

/// Which source column feeds each field the pipeline understands.
///
/// Columns not named here are still loaded and carried through to the
/// payload verbatim. The categorical columns are optional in the source:
/// a mapping that does not match any header simply yields no value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMap {
    /// Order processing start timestamp. Required in the source.
    #[serde(default = "default_timestamp_column")]
    pub timestamp: String,

    /// Final produced volume. Required in the source.
    #[serde(default = "default_volume_column")]
    pub volume: String,

    #[serde(default = "default_substance_column")]
    pub substance: String,

    #[serde(default = "default_presentation_column")]
    pub presentation: String,

    #[serde(default = "default_line_column")]
    pub line: String,

    #[serde(default = "default_family_column")]
    pub family: String,
}

fn default_timestamp_column() -> String {
    "order_process_start_dt".into()
}
fn default_volume_column() -> String {
    "volumen_final".into()
}
fn default_substance_column() -> String {
    "sustancia".into()
}
fn default_presentation_column() -> String {
    "presentacion_comercial".into()
}
fn default_line_column() -> String {
    "linea".into()
}
fn default_family_column() -> String {
    "familia".into()
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            timestamp: default_timestamp_column(),
            volume: default_volume_column(),
            substance: default_substance_column(),
            presentation: default_presentation_column(),
            line: default_line_column(),
            family: default_family_column(),
        }
    }
}

/// Chat backend connection settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Which backend flavor to talk to.
    #[serde(default)]
    pub backend: GatewayBackend,

    /// API key. Usually supplied via environment instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base endpoint. Required for `azure` and `custom` backends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Azure deployment name. Defaults to the model name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<String>,

    /// Azure API version query parameter.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Model to request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens per answer.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-attempt request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// How many extra attempts after a transient failure.
    #[serde(default = "default_retries")]
    pub retries: u32,
}

/// Supported chat backend flavors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayBackend {
    /// Azure OpenAI deployment (`api-key` header, api-version query).
    #[default]
    Azure,
    /// api.openai.com with a bearer token.
    Openai,
    /// Any OpenAI-compatible endpoint given in `endpoint`.
    Custom,
}

fn default_api_version() -> String {
    "2024-06-01".into()
}
fn default_model() -> String {
    "gpt-4.1".into()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_retries() -> u32 {
    1
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            backend: GatewayBackend::default(),
            api_key: None,
            endpoint: None,
            deployment: None,
            api_version: default_api_version(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            retries: default_retries(),
        }
    }
}

impl GatewayConfig {
    /// Azure deployment to address, falling back to the model name.
    pub fn effective_deployment(&self) -> &str {
        self.deployment.as_deref().unwrap_or(&self.model)
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("backend", &self.backend)
            .field("api_key", &redact(&self.api_key))
            .field("endpoint", &self.endpoint)
            .field("deployment", &self.deployment)
            .field("api_version", &self.api_version)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .field("retries", &self.retries)
            .finish()
    }
}

/// Context assembly settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// How many trailing conversation turns to carry per request.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// How the dataset is packed into the system message.
    #[serde(default)]
    pub payload_mode: PayloadModeConfig,

    /// Row cap for `head` mode.
    #[serde(default = "default_head_rows")]
    pub head_rows: usize,

    /// Restrict `by-year` payloads to these years. All years when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub years: Option<Vec<i32>>,
}

/// Payload packing flavor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PayloadModeConfig {
    /// JSON records grouped per year.
    #[default]
    ByYear,
    /// A CSV block of the first rows of the table.
    Head,
}

fn default_history_limit() -> usize {
    20
}
fn default_head_rows() -> usize {
    50
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            payload_mode: PayloadModeConfig::default(),
            head_rows: default_head_rows(),
            years: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default locations.
    ///
    /// `./lotline.toml` wins over `~/.lotline/config.toml`; defaults
    /// apply when neither exists. Environment variables override the
    /// file for credentials and model selection:
    /// - `LOTLINE_API_KEY` (highest priority), `AZURE_OPENAI_API_KEY`,
    ///   `OPENAI_API_KEY`
    /// - `LOTLINE_ENDPOINT`, `AZURE_OPENAI_ENDPOINT`
    /// - `LOTLINE_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::resolve_path() {
            Some(path) => Self::load_from(&path)?,
            None => {
                tracing::info!("No config file found, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// The config file that `load()` would read, if any exists.
    pub fn resolve_path() -> Option<PathBuf> {
        let local = PathBuf::from("lotline.toml");
        if local.exists() {
            return Some(local);
        }
        let home = Self::config_dir().join("config.toml");
        if home.exists() {
            return Some(home);
        }
        None
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".lotline")
    }

    fn apply_env_overrides(&mut self) {
        if self.gateway.api_key.is_none() {
            self.gateway.api_key = std::env::var("LOTLINE_API_KEY")
                .ok()
                .or_else(|| std::env::var("AZURE_OPENAI_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if self.gateway.endpoint.is_none() {
            self.gateway.endpoint = std::env::var("LOTLINE_ENDPOINT")
                .ok()
                .or_else(|| std::env::var("AZURE_OPENAI_ENDPOINT").ok());
        }

        if let Ok(model) = std::env::var("LOTLINE_MODEL") {
            self.gateway.model = model;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.temperature < 0.0 || self.gateway.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "gateway.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.gateway.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "gateway.max_tokens must be greater than 0".into(),
            ));
        }

        if self.gateway.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "gateway.timeout_secs must be greater than 0".into(),
            ));
        }

        if self.gateway.retries > 10 {
            return Err(ConfigError::ValidationError(
                "gateway.retries must be 10 or fewer".into(),
            ));
        }

        if self.context.history_limit == 0 {
            return Err(ConfigError::ValidationError(
                "context.history_limit must be greater than 0".into(),
            ));
        }

        if self.context.head_rows == 0 {
            return Err(ConfigError::ValidationError(
                "context.head_rows must be greater than 0".into(),
            ));
        }

        if let Some(d) = self.dataset.delimiter {
            if !d.is_ascii() {
                return Err(ConfigError::ValidationError(
                    "dataset.delimiter must be a single ASCII character".into(),
                ));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.gateway.api_key.is_some()
    }

    /// Generate a default config TOML string (for `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gateway.model, "gpt-4.1");
        assert_eq!(config.context.history_limit, 20);
        assert_eq!(config.dataset.on_bad_row, BadRowPolicy::Abort);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.gateway.model, config.gateway.model);
        assert_eq!(parsed.context.head_rows, config.context.head_rows);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let toml_str = r#"
[dataset]
path = "data/tabla.csv"
delimiter = ";"
on_bad_row = "drop"

[dataset.columns]
volume = "volumen_total"

[gateway]
backend = "openai"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.dataset.path, PathBuf::from("data/tabla.csv"));
        assert_eq!(config.dataset.delimiter, Some(';'));
        assert_eq!(config.dataset.on_bad_row, BadRowPolicy::Drop);
        assert_eq!(config.dataset.columns.volume, "volumen_total");
        // unmapped column names keep their defaults
        assert_eq!(config.dataset.columns.timestamp, "order_process_start_dt");
        assert_eq!(config.gateway.backend, GatewayBackend::Openai);
        assert_eq!(config.gateway.max_tokens, 1000);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.gateway.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_history_limit_rejected() {
        let mut config = AppConfig::default();
        config.context.history_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn excessive_retries_rejected() {
        let mut config = AppConfig::default();
        config.gateway.retries = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/lotline.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().gateway.model, "gpt-4.1");
    }

    #[test]
    fn load_from_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[context]\nhistory_limit = 6\npayload_mode = \"head\"").unwrap();
        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.context.history_limit, 6);
        assert_eq!(config.context.payload_mode, PayloadModeConfig::Head);
    }

    #[test]
    fn cache_file_defaults_next_to_source() {
        let config = DatasetConfig::default();
        assert_eq!(
            config.cache_file(),
            PathBuf::from("artifacts/master_table.csv.cache.jsonl")
        );

        let with_override = DatasetConfig {
            cache_path: Some(PathBuf::from("/tmp/rows.jsonl")),
            ..DatasetConfig::default()
        };
        assert_eq!(with_override.cache_file(), PathBuf::from("/tmp/rows.jsonl"));
    }

    #[test]
    fn effective_deployment_falls_back_to_model() {
        let mut gw = GatewayConfig::default();
        assert_eq!(gw.effective_deployment(), "gpt-4.1");
        gw.deployment = Some("analyst-prod".into());
        assert_eq!(gw.effective_deployment(), "analyst-prod");
    }

    #[test]
    fn debug_never_prints_the_key() {
        let gw = GatewayConfig {
            api_key: Some("sk-secret-value".into()),
            ..GatewayConfig::default()
        };
        let debug = format!("{gw:?}");
        assert!(!debug.contains("sk-secret-value"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gpt-4.1"));
        assert!(toml_str.contains("history_limit"));
        // must parse back
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert!(parsed.validate().is_ok());
    }
}
