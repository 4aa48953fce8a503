use secrecy::SecretString;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

/// Gemini REST endpoint base.
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// 100 MiB. Gemini rejects inline requests well above this anyway.
const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct VideoAnalysisConfig {
    pub common: core_config::Config,
    pub gemini: GeminiSettings,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone)]
pub struct GeminiSettings {
    /// Provider credential. Never defaulted.
    pub api_key: SecretString,
    /// Model name (e.g., gemini-2.0-flash)
    pub model: String,
    pub api_base: String,
    /// Upper bound on a single generateContent call
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Directory holding per-request scratch files
    pub scratch_dir: String,
    pub max_bytes: usize,
}

impl GeminiSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl VideoAnalysisConfig {
    pub fn load() -> Result<Self, AppError> {
        // Load common config (handles .env and APP__ prefix)
        let mut common_config = core_config::Config::load()?;
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        // Plain HOST/PORT win over APP__HOST/APP__PORT.
        if let Ok(host) = env::var("HOST") {
            common_config.host = host;
        }
        if let Ok(port) = env::var("PORT") {
            common_config.port = parse_value("PORT", &port)?;
        }

        Ok(VideoAnalysisConfig {
            common: common_config,
            gemini: GeminiSettings {
                api_key: SecretString::new(get_env("GEMINI_API_KEY", None, is_prod)?),
                model: get_env("GEMINI_MODEL", Some("gemini-2.0-flash"), is_prod)?,
                api_base: get_env("GEMINI_API_BASE", Some(DEFAULT_GEMINI_API_BASE), is_prod)?,
                timeout_secs: parse_timeout_secs(&get_env(
                    "PROVIDER_TIMEOUT_SECS",
                    Some(&DEFAULT_PROVIDER_TIMEOUT_SECS.to_string()),
                    is_prod,
                )?)?,
            },
            upload: UploadConfig {
                scratch_dir: get_env("SCRATCH_DIR", Some("temp"), is_prod)?,
                max_bytes: parse_value(
                    "MAX_UPLOAD_BYTES",
                    &get_env(
                        "MAX_UPLOAD_BYTES",
                        Some(&DEFAULT_MAX_UPLOAD_BYTES.to_string()),
                        is_prod,
                    )?,
                )?,
            },
        })
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| {
        AppError::ConfigError(anyhow::anyhow!("{} has invalid value '{}': {}", key, raw, e))
    })
}

/// A zero timeout would fail every provider call immediately.
fn parse_timeout_secs(raw: &str) -> Result<u64, AppError> {
    match parse_value("PROVIDER_TIMEOUT_SECS", raw)? {
        0 => Err(AppError::ConfigError(anyhow::anyhow!(
            "PROVIDER_TIMEOUT_SECS must be at least 1"
        ))),
        secs => Ok(secs),
    }
}
