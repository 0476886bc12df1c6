use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use chainlog_ledger::{LedgerConfig, RetryPolicy};
use chainlog_types::MAX_COLUMN_LEN;
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Server configuration, usually loaded from a TOML file.
///
/// Every field has a default, so an empty file is a valid configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Create the table and genesis record before accepting requests.
    pub provision_on_start: bool,
    pub ledger: LedgerSettings,
    pub log: LogSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            provision_on_start: false,
            ledger: LedgerSettings::default(),
            log: LogSettings::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    pub max_payload_len: usize,
    pub append_deadline_ms: u64,
    pub retry: RetrySettings,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        let defaults = LedgerConfig::default();
        Self {
            max_payload_len: defaults.max_payload_len,
            append_deadline_ms: defaults.append_deadline.as_millis() as u64,
            retry: RetrySettings::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let defaults = RetryPolicy::default();
        Self {
            max_attempts: defaults.max_attempts,
            initial_backoff_ms: defaults.initial_backoff.as_millis() as u64,
            max_backoff_ms: defaults.max_backoff.as_millis() as u64,
            jitter: defaults.jitter,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `tracing` filter directive, e.g. `info` or `chainlog_ledger=debug`.
    pub level: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl ServerConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> ServerResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML file.
    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn to_toml_string(&self) -> ServerResult<String> {
        toml::to_string_pretty(self).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn validate(&self) -> ServerResult<()> {
        let max = self.ledger.max_payload_len;
        if max == 0 || max > MAX_COLUMN_LEN {
            return Err(ServerError::Config(format!(
                "ledger.max_payload_len must be within 1..={MAX_COLUMN_LEN}, got {max}"
            )));
        }
        if self.ledger.append_deadline_ms == 0 {
            return Err(ServerError::Config(
                "ledger.append_deadline_ms must be positive".into(),
            ));
        }
        let retry = &self.ledger.retry;
        if retry.max_attempts == 0 {
            return Err(ServerError::Config(
                "ledger.retry.max_attempts must be at least 1".into(),
            ));
        }
        if retry.initial_backoff_ms > retry.max_backoff_ms {
            return Err(ServerError::Config(format!(
                "ledger.retry.initial_backoff_ms ({}) exceeds max_backoff_ms ({})",
                retry.initial_backoff_ms, retry.max_backoff_ms
            )));
        }
        Ok(())
    }

    /// The ledger tuning described by this configuration.
    pub fn ledger_config(&self) -> LedgerConfig {
        let retry = &self.ledger.retry;
        LedgerConfig {
            max_payload_len: self.ledger.max_payload_len,
            append_deadline: Duration::from_millis(self.ledger.append_deadline_ms),
            retry: RetryPolicy {
                max_attempts: retry.max_attempts,
                initial_backoff: Duration::from_millis(retry.initial_backoff_ms),
                max_backoff: Duration::from_millis(retry.max_backoff_ms),
                jitter: retry.jitter,
            },
        }
    }
}
