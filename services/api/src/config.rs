//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// The OpenAI-compatible endpoint Gemini exposes.
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// Without a database the service keeps every workspace in memory.
    pub database_url: Option<String>,
    pub log_level: Level,
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub ai_api_base: String,
    pub ai_model: String,
    pub preferences_dir: PathBuf,
    pub cors_origin: String,
    /// How long an untouched workspace stays in memory.
    pub workspace_idle: Duration,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        // --- Server and Database Settings ---
        let bind_address_str = var("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = var("DATABASE_URL");

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- API Keys (as optional) ---
        let openai_api_key = var("OPENAI_API_KEY");
        let gemini_api_key = var("GEMINI_API_KEY");

        // --- Assistant Settings ---
        // Gemini is the default provider; a lone OpenAI key switches the defaults over.
        let use_openai = gemini_api_key.is_none() && openai_api_key.is_some();
        let ai_api_base = var("AI_API_BASE").unwrap_or_else(|| {
            let base = if use_openai { OPENAI_API_BASE } else { GEMINI_API_BASE };
            base.to_string()
        });
        let ai_model = var("AI_MODEL").unwrap_or_else(|| {
            let model = if use_openai { "gpt-4o-mini" } else { "gemini-2.5-flash" };
            model.to_string()
        });

        let preferences_dir = var("PREFERENCES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./.lumina"));
        let cors_origin = var("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());

        let workspace_idle_str = var("WORKSPACE_IDLE_SECS").unwrap_or_else(|| "1800".to_string());
        let workspace_idle = workspace_idle_str
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::InvalidValue("WORKSPACE_IDLE_SECS".to_string(), e.to_string()))?;

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            openai_api_key,
            gemini_api_key,
            ai_api_base,
            ai_model,
            preferences_dir,
            cors_origin,
            workspace_idle,
        })
    }

    /// The key for the configured assistant provider, Gemini first.
    pub fn ai_api_key(&self) -> Result<&str, ConfigError> {
        self.gemini_api_key
            .as_deref()
            .or(self.openai_api_key.as_deref())
            .ok_or_else(|| ConfigError::MissingVar("GEMINI_API_KEY".to_string()))
    }
}
