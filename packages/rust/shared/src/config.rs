//! Application configuration for Feedloom.
//!
//! User config lives at `~/.feedloom/feedloom.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FeedloomError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "feedloom.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".feedloom";

// ---------------------------------------------------------------------------
// Config structs (matching feedloom.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Stage interval settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Text-service gateway settings.
    #[serde(default)]
    pub textgen: TextgenConfig,

    /// Speech synthesis settings.
    #[serde(default)]
    pub speech: SpeechConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Path to the corpus database.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Max items fetched per fetch tick.
    #[serde(default = "default_fetch_batch")]
    pub fetch_batch: usize,

    /// Max items enriched per enrichment tick.
    #[serde(default = "default_enrich_batch")]
    pub enrich_batch: usize,

    /// Max aggregates narrated per narration tick.
    #[serde(default = "default_narrate_batch")]
    pub narrate_batch: usize,

    /// Fetch failures tolerated before an item is dead-lettered.
    #[serde(default = "default_max_attempts")]
    pub max_fetch_attempts: u32,

    /// Narration failures tolerated before an item is dead-lettered.
    #[serde(default = "default_max_attempts")]
    pub max_narrate_attempts: u32,

    /// Minimum seconds between resolutions of the same feed.
    #[serde(default = "default_resolve_cooldown")]
    pub resolve_cooldown_secs: u64,

    /// Recency window for aggregation and narration selection.
    #[serde(default = "default_aggregation_window")]
    pub aggregation_window_secs: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            fetch_batch: default_fetch_batch(),
            enrich_batch: default_enrich_batch(),
            narrate_batch: default_narrate_batch(),
            max_fetch_attempts: default_max_attempts(),
            max_narrate_attempts: default_max_attempts(),
            resolve_cooldown_secs: default_resolve_cooldown(),
            aggregation_window_secs: default_aggregation_window(),
        }
    }
}

fn default_db_path() -> String {
    "~/.feedloom/feedloom.db".into()
}
fn default_fetch_batch() -> usize {
    1
}
fn default_enrich_batch() -> usize {
    1
}
fn default_narrate_batch() -> usize {
    10
}
fn default_max_attempts() -> u32 {
    5
}
fn default_resolve_cooldown() -> u64 {
    3600
}
fn default_aggregation_window() -> u64 {
    3600
}

/// `[scheduler]` section. One interval per pipeline job, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_resolve_interval")]
    pub resolve_interval_secs: u64,

    #[serde(default = "default_fetch_interval")]
    pub fetch_interval_secs: u64,

    #[serde(default = "default_enrich_interval")]
    pub enrich_interval_secs: u64,

    #[serde(default = "default_aggregate_interval")]
    pub aggregate_interval_secs: u64,

    #[serde(default = "default_narrate_interval")]
    pub narrate_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            resolve_interval_secs: default_resolve_interval(),
            fetch_interval_secs: default_fetch_interval(),
            enrich_interval_secs: default_enrich_interval(),
            aggregate_interval_secs: default_aggregate_interval(),
            narrate_interval_secs: default_narrate_interval(),
        }
    }
}

fn default_resolve_interval() -> u64 {
    10
}
fn default_fetch_interval() -> u64 {
    20
}
fn default_enrich_interval() -> u64 {
    30
}
fn default_aggregate_interval() -> u64 {
    40
}
fn default_narrate_interval() -> u64 {
    50
}

/// `[textgen]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextgenConfig {
    /// OpenAI-compatible API base, e.g. `https://api.example.com/v1`.
    #[serde(default = "default_textgen_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model id used for enrichment and aggregation.
    #[serde(default = "default_model")]
    pub model: String,

    /// Attempts per completion call, including the first.
    #[serde(default = "default_textgen_attempts")]
    pub max_attempts: u32,

    /// Base delay for exponential backoff between attempts.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl Default for TextgenConfig {
    fn default() -> Self {
        Self {
            base_url: default_textgen_base_url(),
            api_key_env: default_api_key_env(),
            model: default_model(),
            max_attempts: default_textgen_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

fn default_textgen_base_url() -> String {
    "http://127.0.0.1:3000/v1".into()
}
fn default_api_key_env() -> String {
    "FEEDLOOM_API_KEY".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_textgen_attempts() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    1000
}

/// `[speech]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Speech synthesis service endpoint.
    #[serde(default = "default_speech_endpoint")]
    pub endpoint: String,

    /// Default voice token (see the speech crate for accepted values).
    #[serde(default = "default_voice")]
    pub voice: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            endpoint: default_speech_endpoint(),
            voice: default_voice(),
        }
    }
}

fn default_speech_endpoint() -> String {
    "http://127.0.0.1:7860".into()
}
fn default_voice() -> String {
    "zh-female".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.feedloom/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| FeedloomError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.feedloom/feedloom.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| FeedloomError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| FeedloomError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| FeedloomError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| FeedloomError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| FeedloomError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the text-service API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    let var_name = &config.textgen.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(()),
        _ => Err(FeedloomError::config(format!(
            "text-service API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("db_path"));
        assert!(toml_str.contains("FEEDLOOM_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.max_fetch_attempts, 5);
        assert_eq!(parsed.scheduler.fetch_interval_secs, 20);
        assert_eq!(parsed.textgen.api_key_env, "FEEDLOOM_API_KEY");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[scheduler]
fetch_interval_secs = 5

[speech]
voice = "en-female"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.scheduler.fetch_interval_secs, 5);
        assert_eq!(config.scheduler.enrich_interval_secs, 30);
        assert_eq!(config.speech.voice, "en-female");
        assert_eq!(config.defaults.resolve_cooldown_secs, 3600);
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.textgen.api_key_env = "FL_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }

    #[test]
    fn expand_home_passthrough() {
        assert_eq!(expand_home("/tmp/x.db"), PathBuf::from("/tmp/x.db"));
    }
}
