//! Runtime settings read from the environment.
//!
//! `main` loads `.env` with dotenvy first, so every key can live there too.
//! Values that fail to parse are reported and replaced by the default.

use std::str::FromStr;

use crate::api::logs::log_warning;
use crate::service::DEFAULT_LARGE_VALUE_THRESHOLD;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MAX_UPLOAD_MB: usize = 50;
pub const DEFAULT_PREVIEW_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    /// `n` above this on take/skip produces a validation warning.
    pub large_value_threshold: u64,
    pub max_upload_mb: usize,
    /// Rows returned by previews and by preview executions.
    pub preview_limit: usize,
    /// Allowed CORS origins. Empty means any origin.
    pub cors_origins: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            large_value_threshold: DEFAULT_LARGE_VALUE_THRESHOLD,
            max_upload_mb: DEFAULT_MAX_UPLOAD_MB,
            preview_limit: DEFAULT_PREVIEW_LIMIT,
            cors_origins: Vec::new(),
        }
    }
}

impl Settings {
    /// Settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_reader(|key| std::env::var(key).ok())
    }

    /// Settings from any key lookup, defaults for absent keys.
    pub fn from_reader<F>(env_reader: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        // TABLEPIPE_HOST
        if let Some(val) = env_reader("TABLEPIPE_HOST").filter(|v| !v.trim().is_empty()) {
            settings.host = val.trim().to_string();
        }

        // TABLEPIPE_PORT
        if let Some(port) = parse_key(&env_reader, "TABLEPIPE_PORT") {
            settings.port = port;
        }

        // TABLEPIPE_LARGE_VALUE_THRESHOLD
        if let Some(threshold) = parse_key(&env_reader, "TABLEPIPE_LARGE_VALUE_THRESHOLD") {
            settings.large_value_threshold = threshold;
        }

        // TABLEPIPE_MAX_UPLOAD_MB
        if let Some(mb) = parse_key::<usize, _>(&env_reader, "TABLEPIPE_MAX_UPLOAD_MB") {
            if mb == 0 {
                log_warning("TABLEPIPE_MAX_UPLOAD_MB must be at least 1, using default");
            } else {
                settings.max_upload_mb = mb;
            }
        }

        // TABLEPIPE_PREVIEW_LIMIT
        if let Some(limit) = parse_key::<usize, _>(&env_reader, "TABLEPIPE_PREVIEW_LIMIT") {
            if limit == 0 {
                log_warning("TABLEPIPE_PREVIEW_LIMIT must be at least 1, using default");
            } else {
                settings.preview_limit = limit;
            }
        }

        // TABLEPIPE_CORS_ORIGINS
        if let Some(val) = env_reader("TABLEPIPE_CORS_ORIGINS") {
            settings.cors_origins = val
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty() && *o != "*")
                .map(String::from)
                .collect();
        }

        settings
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_key<T, F>(env_reader: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = env_reader(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log_warning(format!("{key}='{raw}' is not valid, using default"));
            None
        }
    }
}
