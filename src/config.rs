//! Application settings and model catalogs.
//!
//! Settings come from the environment (a `.env` file is loaded by `main`
//! before this runs). Model catalogs are maintained in code, not fetched
//! from any registry.

use std::path::PathBuf;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "requiscan";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default directory scanned for requisition PDFs.
pub const DEFAULT_INPUT_DIR: &str = "input";

/// Default cap on concurrent in-flight extractions.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Default per-request timeout. Large scans can take minutes on the
/// provider side, so this is generous.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 600;

/// Numbered GenAI model catalog (menu key, model id).
pub const GENAI_MODELS: &[(&str, &str)] = &[
    ("1", "gemini-3-pro-preview"),
    ("2", "gemini-flash-latest"),
];

/// Numbered Requesty model catalog (menu key, model id).
pub const REQUESTY_MODELS: &[(&str, &str)] = &[
    ("1", "vertex/gemini-3-pro-preview"),
    ("2", "azure/gpt-5.1"),
    ("3", "bedrock/claude-opus-4-5"),
    ("4", "bedrock/claude-sonnet-4@eu-west-1"),
    ("5", "coding/gemini-2.5-flash@europe-west1"),
    ("6", "google/gemini-2.5-pro"),
    ("7", "google/gemini-3-pro-preview"),
    ("8", "vertex/gemini-2.5-flash@europe-west1"),
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {name}: '{value}' is not a positive integer")]
    InvalidNumber { name: &'static str, value: String },
}

/// Runtime settings resolved from the environment.
///
/// API keys stay optional here; each processor validates the keys it
/// actually needs at construction time, so a missing Requesty key never
/// blocks a GenAI run.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory scanned for `*.pdf` inputs.
    pub input_dir: PathBuf,
    /// Google GenAI API key (`GENAI_API_KEY`).
    pub genai_api_key: Option<String>,
    /// Requesty API key (`REQUESTY_API_KEY`).
    pub requesty_api_key: Option<String>,
    /// Requesty OpenAI-compatible base url (`REQUESTY_BASE_URL`).
    pub requesty_base_url: Option<String>,
    /// Upper bound on concurrent in-flight extractions, always >= 1.
    pub max_workers: usize,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Settings {
    /// Load settings from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load settings through an injectable lookup. Tests use this to avoid
    /// mutating process-global environment state.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let input_dir = lookup("INPUT_DIRECTORY")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_INPUT_DIR));

        let max_workers = match lookup("MAX_WORKERS").filter(|v| !v.is_empty()) {
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|n| *n >= 1)
                .ok_or(ConfigError::InvalidNumber {
                    name: "MAX_WORKERS",
                    value: raw,
                })?,
            None => DEFAULT_MAX_WORKERS,
        };

        let request_timeout_secs = match lookup("REQUEST_TIMEOUT_SECS").filter(|v| !v.is_empty()) {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|n| *n >= 1)
                .ok_or(ConfigError::InvalidNumber {
                    name: "REQUEST_TIMEOUT_SECS",
                    value: raw,
                })?,
            None => DEFAULT_REQUEST_TIMEOUT_SECS,
        };

        Ok(Self {
            input_dir,
            genai_api_key: lookup("GENAI_API_KEY").filter(|v| !v.is_empty()),
            requesty_api_key: lookup("REQUESTY_API_KEY").filter(|v| !v.is_empty()),
            requesty_base_url: lookup("REQUESTY_BASE_URL")
                .filter(|v| !v.is_empty())
                .map(|v| v.trim_end_matches('/').to_string()),
            max_workers,
            request_timeout_secs,
        })
    }
}

/// Directory holding daily-rotated log files.
pub fn log_dir() -> PathBuf {
    PathBuf::from("logs")
}

/// Default `RUST_LOG`-style filter when the environment sets none.
pub fn default_log_filter() -> String {
    format!("{APP_NAME}=debug,info")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_env(_name: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_when_env_is_empty() {
        let settings = Settings::from_lookup(empty_env).unwrap();
        assert_eq!(settings.input_dir, PathBuf::from("input"));
        assert_eq!(settings.max_workers, DEFAULT_MAX_WORKERS);
        assert_eq!(settings.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
        assert!(settings.genai_api_key.is_none());
        assert!(settings.requesty_api_key.is_none());
        assert!(settings.requesty_base_url.is_none());
    }

    #[test]
    fn reads_configured_values() {
        let settings = Settings::from_lookup(|name| match name {
            "INPUT_DIRECTORY" => Some("/data/peticiones".into()),
            "GENAI_API_KEY" => Some("g-key".into()),
            "REQUESTY_API_KEY" => Some("r-key".into()),
            "REQUESTY_BASE_URL" => Some("https://router.requesty.ai/v1/".into()),
            "MAX_WORKERS" => Some("8".into()),
            "REQUEST_TIMEOUT_SECS" => Some("120".into()),
            _ => None,
        })
        .unwrap();

        assert_eq!(settings.input_dir, PathBuf::from("/data/peticiones"));
        assert_eq!(settings.genai_api_key.as_deref(), Some("g-key"));
        assert_eq!(settings.max_workers, 8);
        assert_eq!(settings.request_timeout_secs, 120);
        // Trailing slash trimmed so url joins stay predictable
        assert_eq!(
            settings.requesty_base_url.as_deref(),
            Some("https://router.requesty.ai/v1"),
        );
    }

    #[test]
    fn empty_strings_count_as_unset() {
        let settings = Settings::from_lookup(|name| match name {
            "GENAI_API_KEY" | "INPUT_DIRECTORY" => Some(String::new()),
            _ => None,
        })
        .unwrap();
        assert!(settings.genai_api_key.is_none());
        assert_eq!(settings.input_dir, PathBuf::from("input"));
    }

    #[test]
    fn zero_workers_rejected() {
        let result = Settings::from_lookup(|name| match name {
            "MAX_WORKERS" => Some("0".into()),
            _ => None,
        });
        assert!(matches!(
            result,
            Err(ConfigError::InvalidNumber { name: "MAX_WORKERS", .. })
        ));
    }

    #[test]
    fn garbage_timeout_rejected() {
        let result = Settings::from_lookup(|name| match name {
            "REQUEST_TIMEOUT_SECS" => Some("soon".into()),
            _ => None,
        });
        assert!(result.is_err());
    }

    #[test]
    fn model_catalogs_have_unique_menu_keys() {
        for catalog in [GENAI_MODELS, REQUESTY_MODELS] {
            let mut keys: Vec<&str> = catalog.iter().map(|(k, _)| *k).collect();
            keys.sort_unstable();
            keys.dedup();
            assert_eq!(keys.len(), catalog.len());
        }
    }

    #[test]
    fn default_filter_names_this_crate() {
        assert!(default_log_filter().contains(APP_NAME));
    }
}
