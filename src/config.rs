use std::time::Duration;

use crate::errors::WarnError;
use crate::services::dwd::{FeedClient, DWD_WARNINGS_URL};
use crate::services::matcher::LocationMatcher;
use crate::services::poller::{WarningPoller, DEFAULT_POLL_INTERVAL_SECS};

/// Application configuration, parsed from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Location patterns, in evaluation order.
    pub locations: Vec<String>,
    pub proxy: Option<String>,
    pub feed_url: String,
    pub poll_interval_secs: u64,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, WarnError> {
        let locations = std::env::var("WARN_LOCATIONS")
            .map(|v| split_locations(&v))
            .map_err(|_| WarnError::Config("WARN_LOCATIONS must be set".to_string()))?;

        let poll_interval_secs = match std::env::var("WARN_POLL_INTERVAL_SECS") {
            Ok(v) => v.parse().map_err(|e| {
                WarnError::Config(format!("WARN_POLL_INTERVAL_SECS must be a number: {}", e))
            })?,
            Err(_) => DEFAULT_POLL_INTERVAL_SECS,
        };

        let port = match std::env::var("PORT") {
            Ok(v) => v
                .parse()
                .map_err(|e| WarnError::Config(format!("PORT must be a valid u16: {}", e)))?,
            Err(_) => 8080,
        };

        Ok(Self {
            locations,
            proxy: std::env::var("WARN_PROXY").ok().filter(|p| !p.trim().is_empty()),
            feed_url: std::env::var("WARN_FEED_URL")
                .unwrap_or_else(|_| DWD_WARNINGS_URL.to_string()),
            poll_interval_secs,
            port,
        })
    }

    /// Build an idle poller from this configuration.
    ///
    /// Fails on a malformed proxy URL or location pattern.
    pub fn build_poller(&self) -> Result<WarningPoller, WarnError> {
        let feed = FeedClient::with_url(&self.feed_url, self.proxy.as_deref())?;
        let matcher = LocationMatcher::new(self.locations.as_slice())?;
        WarningPoller::new(
            feed,
            matcher,
            Duration::from_secs(self.poll_interval_secs),
        )
    }
}

/// Split a `;`-separated pattern list, dropping blank segments.
fn split_locations(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
