//! Bridge configuration.

use std::env;
use std::time::Duration;

use crate::resolver::{OsFamily, SearchPaths};

/// Environment variable overriding the base poll interval, in milliseconds.
pub const POLL_INTERVAL_ENV: &str = "GOBRIDGE_POLL_INTERVAL_MS";
/// Environment variable overriding the idle backoff ceiling, in milliseconds.
pub const MAX_POLL_INTERVAL_ENV: &str = "GOBRIDGE_MAX_POLL_INTERVAL_MS";

/// Configuration for the cooperative event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventLoopConfig {
    /// Delay before the first idle re-poll. Defaults to 16 ms.
    pub poll_interval: Duration,
    /// Upper bound of the idle delay. Defaults to 250 ms.
    pub max_poll_interval: Duration,
    /// Growth factor of the idle delay between consecutive idle polls.
    pub backoff_factor: u32,
}

impl Default for EventLoopConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(16),
            max_poll_interval: Duration::from_millis(250),
            backoff_factor: 2,
        }
    }
}

impl EventLoopConfig {
    /// Set the base poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self.max_poll_interval = self.max_poll_interval.max(interval);
        self
    }

    /// Set the idle delay ceiling. Values below the base interval are raised
    /// to it.
    pub fn with_max_poll_interval(mut self, interval: Duration) -> Self {
        self.max_poll_interval = interval.max(self.poll_interval);
        self
    }

    /// Set the backoff factor. A factor of 1 disables backoff.
    pub fn with_backoff_factor(mut self, factor: u32) -> Self {
        self.backoff_factor = factor.max(1);
        self
    }

    /// A config that polls at a fixed interval.
    pub fn fixed(interval: Duration) -> Self {
        Self::default()
            .with_poll_interval(interval)
            .with_max_poll_interval(interval)
            .with_backoff_factor(1)
    }

    /// The ceiling, never below the base interval.
    pub fn effective_max(&self) -> Duration {
        self.max_poll_interval.max(self.poll_interval)
    }

    /// The factor, never below 1.
    pub fn effective_factor(&self) -> u32 {
        self.backoff_factor.max(1)
    }

    /// Applies the poll interval overrides from the environment.
    pub fn apply_env(mut self) -> Self {
        if let Some(ms) = read_millis(POLL_INTERVAL_ENV) {
            self = self.with_poll_interval(ms);
        }
        if let Some(ms) = read_millis(MAX_POLL_INTERVAL_ENV) {
            self = self.with_max_poll_interval(ms);
        }
        self
    }
}

fn read_millis(var: &str) -> Option<Duration> {
    let raw = env::var(var).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(err) => {
            tracing::warn!(
                target: "gobridge_core",
                variable = var,
                value = %raw,
                error = %err,
                "ignoring malformed duration"
            );
            None
        }
    }
}

/// Top-level configuration: where to find libraries and how to run the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub search_paths: SearchPaths,
    pub os: OsFamily,
    pub event_loop: EventLoopConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let os = OsFamily::current();
        Self {
            search_paths: SearchPaths::default_for(os),
            os,
            event_loop: EventLoopConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Defaults with `GOBRIDGE_LIBRARY_PATH`, `GOBRIDGE_POLL_INTERVAL_MS` and
    /// `GOBRIDGE_MAX_POLL_INTERVAL_MS` applied.
    pub fn from_env() -> Self {
        Self {
            search_paths: SearchPaths::from_env(),
            os: OsFamily::current(),
            event_loop: EventLoopConfig::default().apply_env(),
        }
    }

    pub fn with_search_paths(mut self, search_paths: SearchPaths) -> Self {
        self.search_paths = search_paths;
        self
    }

    pub fn with_os(mut self, os: OsFamily) -> Self {
        self.os = os;
        self
    }

    pub fn with_event_loop(mut self, event_loop: EventLoopConfig) -> Self {
        self.event_loop = event_loop;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_loop_defaults() {
        let config = EventLoopConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(16));
        assert_eq!(config.max_poll_interval, Duration::from_millis(250));
        assert_eq!(config.backoff_factor, 2);
    }

    #[test]
    fn test_event_loop_clamping() {
        let config = EventLoopConfig::default()
            .with_max_poll_interval(Duration::from_millis(5))
            .with_backoff_factor(0);
        assert_eq!(config.max_poll_interval, Duration::from_millis(16));
        assert_eq!(config.backoff_factor, 1);

        let config = EventLoopConfig::default().with_poll_interval(Duration::from_millis(500));
        assert_eq!(config.effective_max(), Duration::from_millis(500));
    }

    #[test]
    fn test_fixed_interval() {
        let config = EventLoopConfig::fixed(Duration::from_millis(10));
        assert_eq!(config.poll_interval, config.max_poll_interval);
        assert_eq!(config.effective_factor(), 1);
    }

    #[test]
    fn test_bridge_config_builders() {
        let config = BridgeConfig::default()
            .with_os(OsFamily::Darwin)
            .with_search_paths(SearchPaths::new(["/custom"]))
            .with_event_loop(EventLoopConfig::fixed(Duration::from_millis(1)));
        assert_eq!(config.os, OsFamily::Darwin);
        assert_eq!(config.search_paths.dirs().len(), 1);
        assert_eq!(config.event_loop.poll_interval, Duration::from_millis(1));
    }
}
