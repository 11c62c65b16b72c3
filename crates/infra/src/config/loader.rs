//! Configuration loader
//!
//! ## Loading Strategy
//! 1. Build the config from `TIDEMARK_*` environment variables when the
//!    required ones are present
//! 2. Otherwise load the first config file found by [`probe_config_paths`]
//! 3. Secrets set in the environment always override file values, so a
//!    checked-in file never needs to carry keys
//!
//! ## Environment Variables
//! Required for env-only configuration:
//! - `TIDEMARK_DB_PATH`
//! - `TIDEMARK_PROXY_URL`
//!
//! Optional:
//! - `TIDEMARK_DB_POOL_SIZE`, `TIDEMARK_DB_ENCRYPTION_KEY`
//! - `TIDEMARK_PROXY_API_KEY`
//! - `TIDEMARK_DLP_SCANNER_URL`, `TIDEMARK_DLP_SCANNER_KEY`
//! - `TIDEMARK_DLP_VAULT_URL`, `TIDEMARK_DLP_VAULT_KEY`
//! - `TIDEMARK_DLP_BULK_POLICY`, `TIDEMARK_DLP_CREATE_POLICY`
//!   (`fail_open` / `fail_closed`)
//! - `TIDEMARK_SYNC_INTERVAL` (seconds), `TIDEMARK_SCHEDULER_ENABLED`
//! - `TIDEMARK_LOG_JSON`, `TIDEMARK_LOG_LEVEL`

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tidemark_domain::{AppConfig, FailurePolicy, Result, TidemarkError};

const CONFIG_FILE_NAMES: [&str; 4] =
    ["tidemark.toml", "tidemark.json", "config.toml", "config.json"];

/// Load configuration from the environment, falling back to a config file
///
/// # Errors
/// Returns `TidemarkError::Config` when neither source yields a valid
/// configuration.
pub fn load() -> Result<AppConfig> {
    let mut config = match load_from_env() {
        Ok(config) => {
            tracing::info!("configuration loaded from environment variables");
            config
        }
        Err(err) => {
            tracing::debug!(error = %err, "environment incomplete, trying config file");
            load_from_file(None)?
        }
    };
    apply_secret_overrides(&mut config);
    Ok(config)
}

/// Build configuration from `TIDEMARK_*` variables on top of the defaults
///
/// # Errors
/// Returns `TidemarkError::Config` if a required variable is missing or a
/// value does not parse.
pub fn load_from_env() -> Result<AppConfig> {
    let mut config = AppConfig::default();

    config.database.path = env_var("TIDEMARK_DB_PATH")?;
    config.proxy.base_url = env_var("TIDEMARK_PROXY_URL")?;

    if let Some(pool_size) = env_parse::<u32>("TIDEMARK_DB_POOL_SIZE")? {
        config.database.pool_size = pool_size;
    }
    if let Some(policy) = env_parse::<FailurePolicy>("TIDEMARK_DLP_BULK_POLICY")? {
        config.dlp.bulk_sync_policy = policy;
    }
    if let Some(policy) = env_parse::<FailurePolicy>("TIDEMARK_DLP_CREATE_POLICY")? {
        config.dlp.single_create_policy = policy;
    }
    if let Some(interval) = env_parse::<u64>("TIDEMARK_SYNC_INTERVAL")? {
        config.sync.schedule_interval_secs = interval;
    }
    config.dlp.scanner_url = env_optional("TIDEMARK_DLP_SCANNER_URL");
    config.dlp.vault_url = env_optional("TIDEMARK_DLP_VAULT_URL");
    config.sync.scheduler_enabled =
        env_bool("TIDEMARK_SCHEDULER_ENABLED", config.sync.scheduler_enabled);
    config.logging.json = env_bool("TIDEMARK_LOG_JSON", config.logging.json);
    if let Some(level) = env_optional("TIDEMARK_LOG_LEVEL") {
        config.logging.level = level;
    }

    Ok(config)
}

/// Load configuration from a TOML or JSON file
///
/// When `path` is `None` the standard locations are probed.
///
/// # Errors
/// Returns `TidemarkError::Config` if the file is missing, unreadable or
/// malformed.
pub fn load_from_file(path: Option<PathBuf>) -> Result<AppConfig> {
    let config_path = match path {
        Some(path) if path.exists() => path,
        Some(path) => {
            return Err(TidemarkError::Config(format!(
                "config file not found: {}",
                path.display()
            )))
        }
        None => probe_config_paths().ok_or_else(|| {
            TidemarkError::Config("no config file found in any of the standard locations".into())
        })?,
    };

    tracing::info!(path = %config_path.display(), "loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| TidemarkError::Config(format!("failed to read config file: {e}")))?;
    parse_config(&contents, &config_path)
}

fn parse_config(contents: &str, path: &Path) -> Result<AppConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| TidemarkError::Config(format!("invalid TOML config: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| TidemarkError::Config(format!("invalid JSON config: {e}"))),
        other => Err(TidemarkError::Config(format!("unsupported config format: {other}"))),
    }
}

/// First existing config file in the working directory, its two parents,
/// or next to the executable
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut roots = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        roots.extend(cwd.ancestors().take(3).map(Path::to_path_buf));
    }
    if let Some(exe_dir) = std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf)) {
        roots.push(exe_dir);
    }

    roots
        .iter()
        .flat_map(|root| CONFIG_FILE_NAMES.iter().map(move |name| root.join(name)))
        .find(|candidate| candidate.is_file())
}

fn apply_secret_overrides(config: &mut AppConfig) {
    if let Some(key) = env_optional("TIDEMARK_DB_ENCRYPTION_KEY") {
        config.database.encryption_key = Some(key);
    }
    if let Some(key) = env_optional("TIDEMARK_PROXY_API_KEY") {
        config.proxy.api_key = Some(key);
    }
    if let Some(key) = env_optional("TIDEMARK_DLP_SCANNER_KEY") {
        config.dlp.scanner_key = Some(key);
    }
    if let Some(key) = env_optional("TIDEMARK_DLP_VAULT_KEY") {
        config.dlp.vault_key = Some(key);
    }
}

fn env_var(key: &str) -> Result<String> {
    env_optional(key).ok_or_else(|| {
        TidemarkError::Config(format!("missing required environment variable: {key}"))
    })
}

fn env_optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    env_optional(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| TidemarkError::Config(format!("invalid value for {key}: {e}")))
        })
        .transpose()
}

/// Accepts `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map_or(default, |s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}
