//! Environment-backed runtime configuration for `chat-cli`.

use std::{env, error::Error, fmt, path::PathBuf, str::FromStr, time::Duration};

use chat_client::{ChatClientConfig, DEFAULT_SERVER_URL};
use chat_core::RetryPolicy;

const DEFAULT_DATA_DIR: &str = "./.chat-cli-store";
const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;
const DEFAULT_RECONNECT_DELAY_MS: u64 = 1_000;
const DEFAULT_RECONNECT_DELAY_MAX_MS: u64 = 5_000;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 20_000;
const DEFAULT_LOGOUT_GRACE_MS: u64 = 100;

/// Runtime configuration used by the terminal client.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Client runtime settings including the server endpoint.
    pub client: ChatClientConfig,
    /// Root directory for persisted identity and history.
    pub data_dir: PathBuf,
    /// Display name to use when none was saved.
    pub username: Option<String>,
    /// Avatar reference announced with the display name.
    pub avatar: Option<String>,
}

impl CliConfig {
    /// Parse configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let server_url = optional_trimmed_env("CHAT_SERVER_URL", &mut lookup)
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_owned());
        let mut client =
            ChatClientConfig::parse(&server_url).map_err(|err| ConfigError::InvalidValue {
                key: "CHAT_SERVER_URL",
                value: server_url.clone(),
                reason: err.message,
            })?;

        let data_dir = optional_trimmed_env("CHAT_DATA_DIR", &mut lookup)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        let username = optional_trimmed_env("CHAT_USERNAME", &mut lookup);
        let avatar = optional_trimmed_env("CHAT_AVATAR", &mut lookup);

        let max_attempts = parse_or_default(
            "CHAT_RECONNECT_ATTEMPTS",
            DEFAULT_RECONNECT_ATTEMPTS,
            &mut lookup,
        )?;
        let base_delay_ms = parse_or_default(
            "CHAT_RECONNECT_DELAY_MS",
            DEFAULT_RECONNECT_DELAY_MS,
            &mut lookup,
        )?;
        let max_delay_ms = parse_or_default(
            "CHAT_RECONNECT_DELAY_MAX_MS",
            DEFAULT_RECONNECT_DELAY_MAX_MS,
            &mut lookup,
        )?;
        let connect_timeout_ms = parse_or_default(
            "CHAT_CONNECT_TIMEOUT_MS",
            DEFAULT_CONNECT_TIMEOUT_MS,
            &mut lookup,
        )?;
        let logout_grace_ms =
            parse_or_default("CHAT_LOGOUT_GRACE_MS", DEFAULT_LOGOUT_GRACE_MS, &mut lookup)?;

        if max_delay_ms < base_delay_ms {
            return Err(ConfigError::InvalidValue {
                key: "CHAT_RECONNECT_DELAY_MAX_MS",
                value: max_delay_ms.to_string(),
                reason: format!("must be at least CHAT_RECONNECT_DELAY_MS ({base_delay_ms})"),
            });
        }
        if connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "CHAT_CONNECT_TIMEOUT_MS",
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }

        client.retry = RetryPolicy::new(base_delay_ms, max_delay_ms, max_attempts);
        client.connect_timeout = Duration::from_millis(connect_timeout_ms);
        client.logout_grace = Duration::from_millis(logout_grace_ms);

        Ok(Self {
            client,
            data_dir,
            username,
            avatar,
        })
    }
}

/// Errors produced while parsing runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable could not be parsed.
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue { key, value, reason } => {
                write!(f, "invalid {key}='{value}': {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

fn optional_trimmed_env<F>(key: &'static str, lookup: &mut F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_or_default<T, F>(key: &'static str, default: T, lookup: &mut F) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(default);
    };
    value.parse::<T>().map_err(|err| ConfigError::InvalidValue {
        key,
        value,
        reason: err.to_string(),
    })
}
