//! Client configuration, loadable from the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use pennywise_monitor::MonitorConfig;
use pennywise_session::{AuthSession, JsonFileSideChannel, SessionConfig};
use pennywise_transport::HttpAuthTransport;
use tracing::debug;

use crate::PennywiseError;

pub const ENV_API_URL: &str = "PENNYWISE_API_URL";
pub const ENV_REFRESH_LEAD_SECS: &str = "PENNYWISE_REFRESH_LEAD_SECS";
pub const ENV_MONITOR_INTERVAL_SECS: &str = "PENNYWISE_MONITOR_INTERVAL_SECS";
pub const ENV_BREAKER_THRESHOLD: &str = "PENNYWISE_BREAKER_THRESHOLD";
pub const ENV_BREAKER_COOLDOWN_SECS: &str = "PENNYWISE_BREAKER_COOLDOWN_SECS";
pub const ENV_REFRESH_TIMEOUT_SECS: &str = "PENNYWISE_REFRESH_TIMEOUT_SECS";
pub const ENV_TOKEN_FILE: &str = "PENNYWISE_TOKEN_FILE";

/// A configuration value that couldn't be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}={value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Everything needed to build a session, its monitor and an API client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Base URL of the backend, without a trailing slash.
    pub api_url: String,
    pub session: SessionConfig,
    pub monitor: MonitorConfig,
    /// Where to mirror the access token. `None` keeps it in memory only.
    pub token_file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:3000".into(),
            session: SessionConfig::default(),
            monitor: MonitorConfig::default(),
            token_file: None,
        }
    }
}

impl ClientConfig {
    /// Reads `PENNYWISE_*` variables; unset ones keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_API_URL) {
            let trimmed = url.trim().trim_end_matches('/');
            if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
                return Err(ConfigError::Invalid {
                    var: ENV_API_URL,
                    value: url,
                    reason: "expected an http:// or https:// URL".into(),
                });
            }
            config.api_url = trimmed.to_string();
        }
        if let Some(secs) = parse::<u64>(&lookup, ENV_REFRESH_LEAD_SECS)? {
            config.session.lead_time = Duration::from_secs(secs);
        }
        if let Some(secs) = parse::<u64>(&lookup, ENV_MONITOR_INTERVAL_SECS)? {
            config.monitor.interval = Duration::from_secs(secs);
        }
        if let Some(threshold) = parse::<u32>(&lookup, ENV_BREAKER_THRESHOLD)? {
            config.session.failure_threshold = threshold;
        }
        if let Some(secs) = parse::<u64>(&lookup, ENV_BREAKER_COOLDOWN_SECS)? {
            config.session.cooldown = Duration::from_secs(secs);
        }
        if let Some(secs) = parse::<u64>(&lookup, ENV_REFRESH_TIMEOUT_SECS)? {
            config.session.refresh_timeout = Duration::from_secs(secs);
        }
        if let Some(path) = lookup(ENV_TOKEN_FILE).filter(|p| !p.trim().is_empty()) {
            config.token_file = Some(PathBuf::from(path));
        }

        Ok(config.validated())
    }

    /// Clamps out-of-range values in the nested configs.
    pub fn validated(mut self) -> Self {
        self.session = self.session.validated();
        self.monitor = self.monitor.validated();
        self
    }

    /// Builds a session talking HTTP to [`api_url`](Self::api_url).
    pub fn build_session(&self) -> Result<AuthSession<HttpAuthTransport>, PennywiseError> {
        let transport = HttpAuthTransport::new(&self.api_url)?;
        let mut builder = AuthSession::builder(transport).config(self.session.clone());
        if let Some(path) = &self.token_file {
            debug!(path = %path.display(), "mirroring access token to file");
            builder = builder.side_channel(JsonFileSideChannel::new(path));
        }
        Ok(builder.build())
    }
}

fn parse<V: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<V>, ConfigError>
where
    V::Err: std::fmt::Display,
{
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|e: V::Err| ConfigError::Invalid {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        })
}
