//! Runtime configuration for the linker table engine.
//!
//! Values come from built-in defaults, optionally overlaid by a TOML file and
//! then by `LINKER__*` environment variables.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AppError;
use crate::salesforce::LoggingMode;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Prefix for environment variable overrides.
const ENV_PREFIX: &str = "LINKER__";

/// Default Apex REST resource prefix.
pub const DEFAULT_APEX_PREFIX: &str = "/services/apexrest/accountLinker/v1";

// ─────────────────────────────────────────────────────────────────────────────
// LinkerConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Tunables for polling, paging, submission and account search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkerConfig {
    /// Period between batch status checks. Default: 5 seconds.
    pub poll_interval_ms: u64,
    /// Pause after a batch completes before the load is re-issued, giving the
    /// backend time to populate its cache. Default: 1 second.
    pub reload_delay_ms: u64,
    /// Rows per page on a fresh table. Default: 10.
    pub default_page_size: usize,
    /// Reject submissions containing records with neither distributor nor customer.
    pub require_identifying_fields: bool,
    /// Mode string sent with the start-batch request.
    pub batch_mode: String,
    /// Apex REST resource prefix, relative to the instance URL.
    pub apex_prefix: String,
    /// Search terms shorter than this never reach the backend.
    pub min_search_chars: usize,
    /// Maximum number of account suggestions returned.
    pub max_search_results: usize,
    /// HTTP request timeout.
    pub request_timeout_secs: u64,
    /// Include query strings (sensitive values redacted) in request logs.
    /// Default: path only.
    pub log_query_params: bool,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            reload_delay_ms: 1_000,
            default_page_size: 10,
            require_identifying_fields: true,
            batch_mode: "unlinked".to_string(),
            apex_prefix: DEFAULT_APEX_PREFIX.to_string(),
            min_search_chars: 2,
            max_search_results: 10,
            request_timeout_secs: 300,
            log_query_params: false,
        }
    }
}

impl LinkerConfig {
    /// Loads configuration from an optional TOML file, then applies
    /// environment overrides, then validates.
    ///
    /// A missing file is not an error; an unreadable or malformed one is.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let raw = std::fs::read_to_string(p).map_err(|e| {
                    AppError::Config(format!("Failed to read {}: {}", p.display(), e))
                })?;
                Self::from_toml_str(&raw)?
            }
            _ => Self::default(),
        };

        config.apply_overrides(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML document. Absent keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, AppError> {
        toml::from_str(raw).map_err(|e| AppError::Config(format!("Invalid TOML: {}", e)))
    }

    /// Applies `LINKER__<FIELD>` overrides from the given variables.
    ///
    /// Taking the variables as an iterator keeps this testable without
    /// touching the process environment.
    pub fn apply_overrides<I>(&mut self, vars: I) -> Result<(), AppError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(field) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };

            debug!("[CONFIG] Override {}", field);

            match field.to_ascii_lowercase().as_str() {
                "poll_interval_ms" => self.poll_interval_ms = parse_var(&key, &value)?,
                "reload_delay_ms" => self.reload_delay_ms = parse_var(&key, &value)?,
                "default_page_size" => self.default_page_size = parse_var(&key, &value)?,
                "require_identifying_fields" => {
                    self.require_identifying_fields = parse_var(&key, &value)?
                }
                "batch_mode" => self.batch_mode = value,
                "apex_prefix" => self.apex_prefix = value,
                "min_search_chars" => self.min_search_chars = parse_var(&key, &value)?,
                "max_search_results" => self.max_search_results = parse_var(&key, &value)?,
                "request_timeout_secs" => self.request_timeout_secs = parse_var(&key, &value)?,
                "log_query_params" => self.log_query_params = parse_var(&key, &value)?,
                _ => debug!("[CONFIG] Ignoring unknown override {}", key),
            }
        }
        Ok(())
    }

    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.poll_interval_ms == 0 {
            return Err(AppError::Config("poll_interval_ms must be positive".into()));
        }
        if self.default_page_size == 0 {
            return Err(AppError::Config("default_page_size must be positive".into()));
        }
        if self.batch_mode.trim().is_empty() {
            return Err(AppError::Config("batch_mode must not be empty".into()));
        }
        if !self.apex_prefix.starts_with('/') {
            return Err(AppError::Config("apex_prefix must start with '/'".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn reload_delay(&self) -> Duration {
        Duration::from_millis(self.reload_delay_ms)
    }

    /// URL logging mode for the HTTP client.
    pub fn logging_mode(&self) -> LoggingMode {
        if self.log_query_params {
            LoggingMode::PathAndQueryRedacted
        } else {
            LoggingMode::PathOnly
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, AppError> {
    value
        .trim()
        .parse()
        .map_err(|_| AppError::Config(format!("Cannot parse {}={}", key, value)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
