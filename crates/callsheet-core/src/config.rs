use std::str::FromStr;

use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let database_url = require("DATABASE_URL")?;
    let x_bearer_token = require("X_BEARER_TOKEN")?;
    let openai_api_key = require("OPENAI_API_KEY")?;

    let env = parse_environment(&or_default("CALLSHEET_ENV", "development"));
    let bind_addr = parse_var(&lookup, "CALLSHEET_BIND_ADDR", "0.0.0.0:8000")?;
    let log_level = or_default("CALLSHEET_LOG_LEVEL", "info");
    let allowed_origins = or_default("CALLSHEET_ALLOWED_ORIGINS", "")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect();

    let db_max_connections = parse_var(&lookup, "CALLSHEET_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections: u32 = parse_var(&lookup, "CALLSHEET_DB_MIN_CONNECTIONS", "1")?;
    if db_min_connections > db_max_connections {
        return Err(ConfigError::InvalidEnvVar {
            var: "CALLSHEET_DB_MIN_CONNECTIONS".to_string(),
            reason: format!(
                "min connections ({db_min_connections}) exceeds max connections ({db_max_connections})"
            ),
        });
    }
    let db_acquire_timeout_secs = parse_var(&lookup, "CALLSHEET_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let openai_base_url = or_default("OPENAI_BASE_URL", "https://api.openai.com/v1");
    let openai_model = or_default("OPENAI_MODEL", "gpt-4o-mini");
    let llm_timeout_secs = parse_var(&lookup, "CALLSHEET_LLM_TIMEOUT_SECS", "60")?;

    let x_api_base_url = or_default("X_API_BASE_URL", "https://api.x.com/2");
    let social_timeout_secs = parse_var(&lookup, "CALLSHEET_SOCIAL_TIMEOUT_SECS", "10")?;
    let quote_timeout_secs = parse_var(&lookup, "CALLSHEET_QUOTE_TIMEOUT_SECS", "5")?;

    let ingest_interval_secs = parse_var(&lookup, "CALLSHEET_INGEST_INTERVAL_SECS", "3600")?;
    let ingest_batch_size: usize = parse_var(&lookup, "CALLSHEET_INGEST_BATCH_SIZE", "10")?;
    if ingest_batch_size == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "CALLSHEET_INGEST_BATCH_SIZE".to_string(),
            reason: "batch size must be at least 1".to_string(),
        });
    }
    let ingest_batch_cooldown_secs =
        parse_var(&lookup, "CALLSHEET_INGEST_BATCH_COOLDOWN_SECS", "900")?;
    let ingest_max_posts = parse_var(&lookup, "CALLSHEET_INGEST_MAX_POSTS", "5")?;
    let rate_limit_fallback_secs =
        parse_var(&lookup, "CALLSHEET_RATE_LIMIT_FALLBACK_SECS", "900")?;

    let aggregate_interval_secs =
        parse_var(&lookup, "CALLSHEET_AGGREGATE_INTERVAL_SECS", "43200")?;
    let aggregate_window_hours = parse_var(&lookup, "CALLSHEET_AGGREGATE_WINDOW_HOURS", "24")?;
    let combined_retention_days =
        parse_var(&lookup, "CALLSHEET_COMBINED_RETENTION_DAYS", "30")?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        allowed_origins,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        openai_api_key,
        openai_base_url,
        openai_model,
        llm_timeout_secs,
        x_bearer_token,
        x_api_base_url,
        social_timeout_secs,
        quote_timeout_secs,
        ingest_interval_secs,
        ingest_batch_size,
        ingest_batch_cooldown_secs,
        ingest_max_posts,
        rate_limit_fallback_secs,
        aggregate_interval_secs,
        aggregate_window_hours,
        combined_retention_days,
    })
}

fn parse_var<F, T>(lookup: &F, var: &str, default: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = lookup(var).unwrap_or_else(|_| default.to_string());
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}
