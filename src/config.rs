#![forbid(unsafe_code)]

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_DB_PATH: &str = "content_feed.db";
pub const DEFAULT_CHANNELS_FILE: &str = "channels.toml";
pub const DEFAULT_MAX_RESULTS: u32 = 20;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/youtube/v3";
pub const DEFAULT_VIEWER_HOST: &str = "127.0.0.1";
pub const DEFAULT_VIEWER_PORT: u16 = 8080;

/// Where the `content` table lives. A remote location points at a libsql
/// server (sqld / Turso) instead of a local SQLite file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    Local(PathBuf),
    Remote { url: String, auth_token: String },
}

/// Everything a collection run needs, resolved once at process start.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub api_key: String,
    pub api_base: String,
    pub store: StoreLocation,
    pub channels_file: PathBuf,
    pub max_results: u32,
    pub http_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ViewerConfig {
    pub store: StoreLocation,
    pub host: String,
    pub port: u16,
}

/// Values passed on the command line. They take precedence over the process
/// environment, which in turn takes precedence over the `.env` file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub env_path: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub channels_file: Option<PathBuf>,
    pub max_results: Option<u32>,
    pub viewer_host: Option<String>,
    pub viewer_port: Option<u16>,
}

/// One entry of the channels file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChannelConfig {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct ChannelsFile {
    #[serde(default)]
    channels: Vec<ChannelConfig>,
}

pub fn resolve_collector_config(overrides: ConfigOverrides) -> Result<CollectorConfig> {
    let file_vars = read_env_file(env_path(&overrides))?;
    build_collector_config(&file_vars, env_var_string, overrides)
}

pub fn resolve_viewer_config(overrides: ConfigOverrides) -> Result<ViewerConfig> {
    let file_vars = read_env_file(env_path(&overrides))?;
    build_viewer_config(&file_vars, env_var_string, overrides)
}

fn env_path(overrides: &ConfigOverrides) -> &Path {
    overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH))
}

fn build_collector_config(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: ConfigOverrides,
) -> Result<CollectorConfig> {
    let api_key = lookup_value("YOUTUBE_API_KEY", file_vars, &env_lookup)
        .ok_or_else(|| anyhow!("YOUTUBE_API_KEY not set"))?;
    let api_base = lookup_value("YOUTUBE_API_BASE", file_vars, &env_lookup)
        .map(|value| value.trim_end_matches('/').to_string())
        .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
    let store = build_store_location(file_vars, &env_lookup, overrides.db_path);
    let channels_file = overrides
        .channels_file
        .or_else(|| lookup_value("CHANNELS_FILE", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CHANNELS_FILE));
    let max_results = overrides
        .max_results
        .or_else(|| {
            lookup_value("MAX_RESULTS", file_vars, &env_lookup)
                .and_then(|value| value.parse::<u32>().ok())
        })
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_MAX_RESULTS);
    let http_timeout_secs = lookup_value("HTTP_TIMEOUT_SECS", file_vars, &env_lookup)
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS);

    Ok(CollectorConfig {
        api_key,
        api_base,
        store,
        channels_file,
        max_results,
        http_timeout: Duration::from_secs(http_timeout_secs),
    })
}

fn build_viewer_config(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: ConfigOverrides,
) -> Result<ViewerConfig> {
    let store = build_store_location(file_vars, &env_lookup, overrides.db_path);
    let port = overrides
        .viewer_port
        .or_else(|| {
            lookup_value("VIEWER_PORT", file_vars, &env_lookup)
                .and_then(|value| value.parse::<u16>().ok())
        })
        .unwrap_or(DEFAULT_VIEWER_PORT);
    let host = overrides
        .viewer_host
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| lookup_value("VIEWER_HOST", file_vars, &env_lookup))
        .unwrap_or_else(|| DEFAULT_VIEWER_HOST.to_string());
    Ok(ViewerConfig { store, host, port })
}

/// An explicit `--db-path` always selects a local file, even when a remote
/// URL is configured in the environment.
fn build_store_location(
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
    db_path_override: Option<PathBuf>,
) -> StoreLocation {
    if let Some(path) = db_path_override {
        return StoreLocation::Local(path);
    }
    if let Some(url) = lookup_value("CONTENT_DB_URL", file_vars, env_lookup) {
        let auth_token =
            lookup_value("CONTENT_DB_AUTH_TOKEN", file_vars, env_lookup).unwrap_or_default();
        return StoreLocation::Remote { url, auth_token };
    }
    let path = lookup_value("CONTENT_DB_PATH", file_vars, env_lookup)
        .unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
    StoreLocation::Local(PathBuf::from(path))
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| non_blank(&value))
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| file_vars.get(key).and_then(|value| non_blank(value)))
}

/// Reads `KEY=value` pairs from a dotenv-style file. A missing file yields an
/// empty map so deployments can rely on the process environment alone.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}

/// Loads the ordered channel list. Unlike the `.env` file, a missing channels
/// file is an error: a run without it has nothing to do.
pub fn load_channels(path: &Path) -> Result<Vec<ChannelConfig>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading channels file {}", path.display()))?;
    parse_channels(&raw).with_context(|| format!("parsing channels file {}", path.display()))
}

fn parse_channels(raw: &str) -> Result<Vec<ChannelConfig>> {
    let parsed: ChannelsFile = toml::from_str(raw)?;
    for (index, channel) in parsed.channels.iter().enumerate() {
        if channel.id.trim().is_empty() {
            bail!("channel #{} has an empty id", index + 1);
        }
        if channel.name.trim().is_empty() {
            bail!("channel {} has an empty name", channel.id);
        }
    }
    Ok(parsed.channels)
}
