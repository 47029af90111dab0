//! Application configuration for StudyKit.
//!
//! User config lives at `~/.studykit/studykit.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StudyKitError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "studykit.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".studykit";

// ---------------------------------------------------------------------------
// Config structs (matching studykit.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Input acquisition limits.
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Structuring heuristics tuning.
    #[serde(default)]
    pub parser: ParserConfig,

    /// AI-session context settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Where processed books are written.
    #[serde(default)]
    pub library: LibraryConfig,
}

/// `[ingest]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Inputs larger than this are rejected before parsing.
    #[serde(default = "default_max_input_bytes")]
    pub max_input_bytes: u64,

    /// Maximum pages extracted concurrently.
    #[serde(default = "default_page_concurrency")]
    pub page_concurrency: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_input_bytes: default_max_input_bytes(),
            page_concurrency: default_page_concurrency(),
        }
    }
}

fn default_max_input_bytes() -> u64 {
    50 * 1024 * 1024
}
fn default_page_concurrency() -> usize {
    4
}

/// `[parser]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Upper bound on assessment questions extracted from one document.
    #[serde(default = "default_max_assessment_questions")]
    pub max_assessment_questions: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_assessment_questions: default_max_assessment_questions(),
        }
    }
}

fn default_max_assessment_questions() -> usize {
    40
}

/// `[session]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Name of the env var holding the model API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Character ceiling for the book text handed to the model.
    #[serde(default = "default_context_char_limit")]
    pub context_char_limit: usize,

    /// How far back from the ceiling to look for a clean cut.
    #[serde(default = "default_breakpoint_lookback")]
    pub breakpoint_lookback: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            context_char_limit: default_context_char_limit(),
            breakpoint_lookback: default_breakpoint_lookback(),
        }
    }
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".into()
}
fn default_context_char_limit() -> usize {
    800_000
}
fn default_breakpoint_lookback() -> usize {
    20_000
}

/// `[library]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Root directory for persisted books.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Library database file.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            db_path: default_db_path(),
        }
    }
}

fn default_output_dir() -> String {
    "~/studykit-books".into()
}
fn default_db_path() -> String {
    "~/.studykit/library.db".into()
}

impl LibraryConfig {
    /// Resolved output directory (`~` expanded).
    pub fn output_dir_path(&self) -> PathBuf {
        expand_home(&self.output_dir)
    }

    /// Resolved database path (`~` expanded).
    pub fn db_file_path(&self) -> PathBuf {
        expand_home(&self.db_path)
    }
}

/// Expand a leading `~/` against the user's home directory.
fn expand_home(raw: &str) -> PathBuf {
    match (raw.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(raw),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.studykit/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| StudyKitError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.studykit/studykit.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| StudyKitError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        StudyKitError::config(format!("failed to parse {}: {e}", path.display()))
    })?;

    if config.ingest.page_concurrency == 0 {
        return Err(StudyKitError::config("ingest.page_concurrency must be at least 1"));
    }

    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| StudyKitError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| StudyKitError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| StudyKitError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the model API key named by the config, failing if unset or empty.
pub fn validate_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.session.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(StudyKitError::config(format!(
            "model API key not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("max_input_bytes"));
        assert!(toml_str.contains("GEMINI_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.ingest.max_input_bytes, 50 * 1024 * 1024);
        assert_eq!(parsed.parser.max_assessment_questions, 40);
        assert_eq!(parsed.session.context_char_limit, 800_000);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let toml_str = r#"
[parser]
max_assessment_questions = 10

[library]
output_dir = "/tmp/books"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.parser.max_assessment_questions, 10);
        assert_eq!(config.library.output_dir_path(), PathBuf::from("/tmp/books"));
        assert_eq!(config.ingest.page_concurrency, 4);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let path = std::env::temp_dir().join(format!("sk_cfg_{}.toml", uuid::Uuid::now_v7()));
        std::fs::write(&path, "[ingest]\npage_concurrency = 0\n").unwrap();
        let err = load_config_from(&path).unwrap_err();
        assert!(err.to_string().contains("page_concurrency"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.session.api_key_env = "SK_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
