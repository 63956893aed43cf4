//! Engine configuration with environment overrides.

use std::time::Duration;

use log::warn;

/// Default remote API base URL used when `FIELDKIT_API_URL` is not set.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000";

/// Quiet period after the last block edit before a save goes out.
pub const DEFAULT_SAVE_DEBOUNCE_MS: u64 = 1_000;

/// Reachability probe cadence in seconds.
pub const DEFAULT_PROBE_INTERVAL_SECS: u64 = 15;

/// Base delay for the while-online retry after a halted drain.
pub const DEFAULT_RETRY_BASE_DELAY_SECS: i64 = 5;

pub const ENV_API_URL: &str = "FIELDKIT_API_URL";
pub const ENV_DEBOUNCE_MS: &str = "FIELDKIT_DEBOUNCE_MS";
pub const ENV_PROBE_INTERVAL_SECS: &str = "FIELDKIT_PROBE_INTERVAL_SECS";
pub const ENV_RETRY_WHILE_ONLINE: &str = "FIELDKIT_RETRY_WHILE_ONLINE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub api_base_url: String,
    pub save_debounce: Duration,
    pub probe_interval: Duration,
    /// Retry a halted drain with backoff while the device stays online,
    /// instead of waiting for the next connectivity transition.
    pub retry_while_online: bool,
    pub retry_base_delay_secs: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            save_debounce: Duration::from_millis(DEFAULT_SAVE_DEBOUNCE_MS),
            probe_interval: Duration::from_secs(DEFAULT_PROBE_INTERVAL_SECS),
            retry_while_online: true,
            retry_base_delay_secs: DEFAULT_RETRY_BASE_DELAY_SECS,
        }
    }
}

impl SyncConfig {
    /// Defaults overridden by `FIELDKIT_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`SyncConfig::from_env`] with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_API_URL)
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
        {
            config.api_base_url = url;
        }
        if let Some(ms) = parse_number::<u64>(&lookup, ENV_DEBOUNCE_MS) {
            config.save_debounce = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_number::<u64>(&lookup, ENV_PROBE_INTERVAL_SECS) {
            config.probe_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(raw) = lookup(ENV_RETRY_WHILE_ONLINE) {
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => config.retry_while_online = true,
                "0" | "false" | "no" | "off" => config.retry_while_online = false,
                other => warn!(
                    "[OfflineSync] Ignoring invalid {} value '{}'",
                    ENV_RETRY_WHILE_ONLINE, other
                ),
            }
        }

        config
    }
}

fn parse_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("[OfflineSync] Ignoring invalid {} value '{}'", key, raw);
            None
        }
    }
}
