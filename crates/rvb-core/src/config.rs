use std::{env, path::PathBuf, time::Duration};

use crate::{domain::UserId, errors::Error, Result};

pub const DEFAULT_API_URL: &str = "https://api.revolt.chat";
pub const DEFAULT_WS_URL: &str = "wss://ws.revolt.chat?version=1&format=json";

/// How the bot authenticates against Revolt.
///
/// Bots use `x-bot-token`; self-bots run on a user account and use the session
/// token (`x-session-token`).
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Bot(String),
    Session(String),
}

impl Credentials {
    /// The secret itself, whichever mode is active.
    pub fn secret(&self) -> &str {
        match self {
            Self::Bot(t) | Self::Session(t) => t,
        }
    }

    /// REST header carrying the secret.
    pub fn header_name(&self) -> &'static str {
        match self {
            Self::Bot(_) => "x-bot-token",
            Self::Session(_) => "x-session-token",
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Self::Session(_))
    }
}

// Never print the token, not even in debug output.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bot(_) => f.write_str("Credentials::Bot(..)"),
            Self::Session(_) => f.write_str("Credentials::Session(..)"),
        }
    }
}

/// Typed configuration loaded from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub prefix: String,
    pub credentials: Credentials,
    pub owner_override: Option<UserId>,

    // Endpoints
    pub api_url: String,
    pub ws_url: String,

    // Limits / timing
    pub message_limit: usize,
    pub heartbeat_interval: Duration,
    pub shutdown_grace: Duration,

    // Logging
    pub log_file: PathBuf,
}

impl Config {
    /// Load `.env` and `.env.user` (without overriding the real environment),
    /// then build the config from process env vars.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::from_filename(".env");
        let _ = dotenvy::from_filename(".env.user");

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (tests use a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let prefix = lookup("REVOLTBOT_PREFIX").ok_or_else(|| {
            Error::Config("REVOLTBOT_PREFIX environment variable is required".to_string())
        })?;
        validate_prefix(&prefix)?;

        let token = lookup("REVOLTBOT_TOKEN").unwrap_or_default();
        if token.trim().is_empty() {
            return Err(Error::Config(
                "REVOLTBOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let is_user = match lookup("REVOLTBOT_IS_USER").and_then(non_empty) {
            None => false,
            Some(raw) => {
                let n = raw.trim().parse::<i64>().map_err(|_| {
                    Error::Config(format!("REVOLTBOT_IS_USER must be an integer, got {raw:?}"))
                })?;
                n != 0
            }
        };
        let credentials = if is_user {
            Credentials::Session(token)
        } else {
            Credentials::Bot(token)
        };

        let owner_override = lookup("REVOLTBOT_OWNER_ID")
            .and_then(non_empty)
            .map(|s| UserId(s.trim().to_string()));

        let api_url = lookup("REVOLTBOT_API_URL")
            .and_then(non_empty)
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let ws_url = lookup("REVOLTBOT_WS_URL")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_WS_URL.to_string());

        let message_limit =
            parse_num::<usize>(&lookup, "REVOLTBOT_MESSAGE_LIMIT")?.unwrap_or(2000);
        if message_limit <= 100 {
            return Err(Error::Config(format!(
                "REVOLTBOT_MESSAGE_LIMIT is too small: {message_limit}"
            )));
        }
        let heartbeat_interval = Duration::from_secs(
            parse_num::<u64>(&lookup, "REVOLTBOT_HEARTBEAT_SECS")?
                .unwrap_or(20)
                .max(1),
        );
        let shutdown_grace = Duration::from_secs(
            parse_num::<u64>(&lookup, "REVOLTBOT_SHUTDOWN_GRACE_SECS")?.unwrap_or(5),
        );

        let log_file = PathBuf::from(
            lookup("REVOLTBOT_LOG_FILE")
                .and_then(non_empty)
                .unwrap_or_else(|| "latest.log".to_string()),
        );

        Ok(Self {
            prefix,
            credentials,
            owner_override,
            api_url,
            ws_url,
            message_limit,
            heartbeat_interval,
            shutdown_grace,
            log_file,
        })
    }
}

/// The prefix must be a single word: non-empty and free of whitespace.
pub fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() || prefix.chars().any(char::is_whitespace) {
        return Err(Error::Config(format!(
            "can't have prefix with spaces: {prefix:?}"
        )));
    }
    Ok(())
}

fn parse_num<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    let Some(raw) = lookup(key).and_then(non_empty) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|_| Error::Config(format!("{key} must be a number, got {raw:?}")))
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
