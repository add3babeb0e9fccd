use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Queue names are embedded in Redis keys.
static QUEUE_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.:-]+$").expect("queue name regex"));

/// Queue name used when neither the file nor the environment provides one.
pub const DEFAULT_QUEUE_NAME: &str = "default";

#[derive(Debug, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub redis: Option<RedisSection>,
    #[serde(default)]
    pub worker: Option<WorkerSection>,
    #[serde(default)]
    pub logging: Option<LoggingSection>,
    #[serde(default)]
    pub status_log: Option<StatusLogSection>,
    #[serde(default)]
    pub webhook: Option<WebhookSection>,
    #[serde(default)]
    pub build_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RedisSection {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub key_prefix: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WorkerSection {
    #[serde(default)]
    pub queue_name: Option<String>,
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    #[serde(default)]
    pub burst: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub json: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct StatusLogSection {
    #[serde(default)]
    pub directory: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookSection {
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Load a RawConfigFile from a path. The format is inferred from the extension: .toml, .yaml/.yml, .json
pub fn load_raw_from_file<P: AsRef<Path>>(path: P) -> Result<RawConfigFile, ConfigError> {
    let path = path.as_ref();
    let s = fs::read_to_string(path)?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase());
    parse_config_str(&s, ext.as_deref())
}

#[inline]
fn parse_config_str(s: &str, ext: Option<&str>) -> Result<RawConfigFile, ConfigError> {
    match ext {
        #[cfg(feature = "toml")]
        Some("toml") => toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string())),
        #[cfg(feature = "yaml")]
        Some("yaml" | "yml") => {
            serde_yaml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
        }
        #[cfg(feature = "json")]
        Some("json") => serde_json::from_str(s).map_err(|e| ConfigError::Parse(e.to_string())),
        _ => parse_config_auto(s),
    }
}

/// Try each enabled format in turn.
#[inline]
fn parse_config_auto(s: &str) -> Result<RawConfigFile, ConfigError> {
    #[cfg(feature = "json")]
    if let Ok(cfg) = serde_json::from_str(s) {
        return Ok(cfg);
    }

    #[cfg(feature = "toml")]
    if let Ok(cfg) = toml::from_str(s) {
        return Ok(cfg);
    }

    #[cfg(feature = "yaml")]
    if let Ok(cfg) = serde_yaml::from_str(s) {
        return Ok(cfg);
    }

    #[cfg(any(feature = "yaml", feature = "toml", feature = "json"))]
    {
        Err(ConfigError::Parse(
            "failed to parse config as any supported format".into(),
        ))
    }

    #[cfg(not(any(feature = "yaml", feature = "toml", feature = "json")))]
    {
        let _ = s;
        Err(ConfigError::Parse("no config format enabled".into()))
    }
}

/// Concrete worker configuration with defaults.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    pub redis: RedisConfig,
    pub worker: WorkerConfig,
    pub logging: LoggingConfig,
    pub status_log: StatusLogConfig,
    pub webhook: WebhookConfig,
    pub build_number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RedisConfig {
    pub url: String,
    pub key_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerConfig {
    pub queue_name: String,
    pub poll_interval_ms: u64,
    /// Exit once the queue is drained instead of polling forever.
    pub burst: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusLogConfig {
    /// Directory receiving one JSON status file per job. `None` logs statuses through tracing.
    pub directory: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookConfig {
    pub timeout_secs: u64,
    pub user_agent: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis: RedisConfig {
                url: "redis://127.0.0.1:6379".to_string(),
                key_prefix: "karpix".to_string(),
            },
            worker: WorkerConfig {
                queue_name: DEFAULT_QUEUE_NAME.to_string(),
                poll_interval_ms: 1000,
                burst: false,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                json: false,
            },
            status_log: StatusLogConfig { directory: None },
            webhook: WebhookConfig {
                timeout_secs: 10,
                user_agent: None,
            },
            build_number: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[inline]
fn parse_bool(s: &str) -> Result<bool, ()> {
    match s.as_bytes() {
        b"1" | b"true" | b"TRUE" | b"True" | b"yes" | b"YES" | b"Yes" | b"y" | b"Y" => Ok(true),
        b"0" | b"false" | b"FALSE" | b"False" | b"no" | b"NO" | b"No" | b"n" | b"N" => Ok(false),
        _ => match s.to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" => Ok(true),
            "false" | "no" | "n" => Ok(false),
            _ => Err(()),
        },
    }
}

/// Helper macro to apply optional value if present
macro_rules! apply_opt {
    ($target:expr, $source:expr) => {
        if let Some(v) = $source {
            $target = v;
        }
    };
    ($target:expr, $source:expr, wrap) => {
        if let Some(v) = $source {
            $target = Some(v);
        }
    };
}

/// Load concrete `Config` from optional file and environment variables.
/// Environment variables take precedence over file values and defaults.
pub fn load_config<P: AsRef<Path>>(path: Option<P>) -> Result<Config, ConfigError> {
    let mut cfg = Config::default();

    if let Some(p) = path {
        let raw = load_raw_from_file(p)?;
        apply_raw(&mut cfg, raw);
    }

    apply_env_overrides(&mut cfg)?;

    Ok(cfg)
}

fn apply_raw(cfg: &mut Config, raw: RawConfigFile) {
    if let Some(redis) = raw.redis {
        apply_opt!(cfg.redis.url, redis.url);
        apply_opt!(cfg.redis.key_prefix, redis.key_prefix);
    }
    if let Some(worker) = raw.worker {
        apply_opt!(cfg.worker.queue_name, worker.queue_name);
        apply_opt!(cfg.worker.poll_interval_ms, worker.poll_interval_ms);
        apply_opt!(cfg.worker.burst, worker.burst);
    }
    if let Some(logging) = raw.logging {
        apply_opt!(cfg.logging.level, logging.level);
        apply_opt!(cfg.logging.json, logging.json);
    }
    if let Some(status_log) = raw.status_log {
        apply_opt!(cfg.status_log.directory, status_log.directory, wrap);
    }
    if let Some(webhook) = raw.webhook {
        apply_opt!(cfg.webhook.timeout_secs, webhook.timeout_secs);
        apply_opt!(cfg.webhook.user_agent, webhook.user_agent, wrap);
    }
    apply_opt!(cfg.build_number, raw.build_number);
}

#[inline]
fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(v) => v
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Parse(format!("invalid {}: {}", key, e))),
        Err(_) => Ok(None),
    }
}

#[inline]
fn env_bool(key: &str) -> Result<Option<bool>, ConfigError> {
    match env::var(key) {
        Ok(v) => parse_bool(&v)
            .map(Some)
            .map_err(|_| ConfigError::Parse(format!("invalid {}", key))),
        Err(_) => Ok(None),
    }
}

#[inline]
fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

/// First variable that is set wins.
#[inline]
fn env_str_any(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| env_str(k))
}

fn apply_env_overrides(cfg: &mut Config) -> Result<(), ConfigError> {
    // Redis; the bare names are kept for deployments that predate the prefix
    if let Some(v) = env_str_any(&["KARPIX_REDIS_URL", "REDIS_URL"]) {
        cfg.redis.url = v;
    }
    if let Some(v) = env_str("KARPIX_REDIS_KEY_PREFIX") {
        cfg.redis.key_prefix = v;
    }

    // Worker
    if let Some(v) = env_str_any(&["KARPIX_QUEUE_NAME", "RQ_QUEUE_NAME"]) {
        cfg.worker.queue_name = v;
    }
    if let Some(v) = env_parse::<u64>("KARPIX_POLL_INTERVAL_MS")? {
        cfg.worker.poll_interval_ms = v;
    }
    if let Some(v) = env_bool("KARPIX_BURST")? {
        cfg.worker.burst = v;
    }

    // Logging
    if let Some(v) = env_str("KARPIX_LOG_LEVEL") {
        cfg.logging.level = v;
    }
    if let Some(v) = env_bool("KARPIX_LOG_JSON")? {
        cfg.logging.json = v;
    }

    // Status log
    if let Some(v) = env_str("KARPIX_STATUS_LOG_DIR") {
        cfg.status_log.directory = Some(v);
    }

    // Webhook
    if let Some(v) = env_parse::<u64>("KARPIX_WEBHOOK_TIMEOUT_SECS")? {
        cfg.webhook.timeout_secs = v;
    }
    if let Some(v) = env_str("KARPIX_WEBHOOK_USER_AGENT") {
        cfg.webhook.user_agent = Some(v);
    }

    if let Some(v) = env_str_any(&["KARPIX_BUILD_NUMBER", "BUILD_NUMBER"]) {
        cfg.build_number = v;
    }

    Ok(())
}

/// Validate higher-level constraints on the resolved configuration.
pub fn validate_config(cfg: &Config) -> Result<(), ConfigError> {
    match url::Url::parse(&cfg.redis.url) {
        Ok(u) => match u.scheme() {
            "redis" | "rediss" | "unix" | "redis+unix" => {}
            other => {
                return Err(ConfigError::Validation(format!(
                    "unsupported redis url scheme: {}",
                    other
                )))
            }
        },
        Err(_) => {
            return Err(ConfigError::Validation(format!(
                "invalid redis url: {}",
                cfg.redis.url
            )))
        }
    }

    if cfg.redis.key_prefix.is_empty() {
        return Err(ConfigError::Validation(
            "redis.key_prefix must not be empty".into(),
        ));
    }

    if !QUEUE_NAME_REGEX.is_match(&cfg.worker.queue_name) {
        return Err(ConfigError::Validation(format!(
            "invalid worker.queue_name: {:?}",
            cfg.worker.queue_name
        )));
    }

    if cfg.worker.poll_interval_ms == 0 {
        return Err(ConfigError::Validation(
            "worker.poll_interval_ms must be > 0".into(),
        ));
    }

    if cfg.webhook.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "webhook.timeout_secs must be > 0".into(),
        ));
    }

    Ok(())
}
