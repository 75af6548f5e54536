//! DWD warning feed client.
//!
//! Fetches the warnings document published by the Deutscher Wetterdienst.
//! The body is JSONP: `warnWetter.loadWarnings({...});`. The envelope is
//! stripped with an anchored pattern and the payload decoded into
//! [`WeatherInfo`].

use regex::bytes::Regex;
use std::sync::LazyLock;
use std::time::Duration;

use crate::errors::WarnError;
use crate::helpers::excerpt;
use crate::models::WeatherInfo;

pub const DWD_WARNINGS_URL: &str = "https://www.dwd.de/DWD/warnungen/warnapp/json/warnings.json";

/// Upper bound for one feed request, connect through body.
const FETCH_TIMEOUT_SECS: u64 = 90;

/// Anchored match for `warnWetter.loadWarnings(<json>);`.
static ENVELOPE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)\AwarnWetter\.loadWarnings\((.*)\);\s*\z").ok());

/// Client for the DWD warnings feed.
#[derive(Debug, Clone)]
pub struct FeedClient {
    client: reqwest::Client,
    url: String,
}

impl FeedClient {
    /// Client for the public DWD endpoint, optionally through `proxy`.
    pub fn new(proxy: Option<&str>) -> Result<Self, WarnError> {
        Self::with_url(DWD_WARNINGS_URL, proxy)
    }

    /// Client for an alternative feed URL (mirrors, tests).
    pub fn with_url(url: &str, proxy: Option<&str>) -> Result<Self, WarnError> {
        reqwest::Url::parse(url)
            .map_err(|e| WarnError::Config(format!("Invalid feed URL {:?}: {}", url, e)))?;

        let mut builder =
            reqwest::Client::builder().timeout(Duration::from_secs(FETCH_TIMEOUT_SECS));

        if let Some(proxy) = proxy {
            let proxy_url = reqwest::Url::parse(proxy).map_err(|e| {
                tracing::error!("Cannot parse proxy URL {:?}: {}", proxy, e);
                WarnError::Config(format!("Invalid proxy URL {:?}: {}", proxy, e))
            })?;
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| WarnError::Config(format!("Unusable proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| WarnError::Config(format!("Cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Perform one GET against the feed and return the raw body.
    ///
    /// Anything but HTTP 200 is a `Fetch` error carrying the status.
    pub async fn fetch(&self) -> Result<Vec<u8>, WarnError> {
        let response = self.client.get(&self.url).send().await.map_err(|e| {
            tracing::error!("Failed to fetch {}: {}", self.url, e);
            WarnError::Fetch {
                status: None,
                message: e.to_string(),
            }
        })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            tracing::debug!("Response for {}: {}", self.url, status);
            return Err(WarnError::Fetch {
                status: Some(status.as_u16()),
                message: format!("DWD returned HTTP {}", status),
            });
        }

        let body = response.bytes().await.map_err(|e| {
            tracing::error!("Cannot read response body for {}: {}", self.url, e);
            WarnError::Fetch {
                status: Some(status.as_u16()),
                message: format!("Cannot read response body: {}", e),
            }
        })?;

        Ok(body.to_vec())
    }

    /// Fetch, unwrap and parse the current document.
    pub async fn fetch_info(&self) -> Result<WeatherInfo, WarnError> {
        let body = self.fetch().await?;
        parse_feed_body(&body)
    }
}

/// Strip the JSONP envelope and return the embedded JSON payload.
pub fn unwrap_response(body: &[u8]) -> Result<&[u8], WarnError> {
    let envelope = ENVELOPE
        .as_ref()
        .ok_or_else(|| WarnError::Config("Envelope pattern failed to compile".to_string()))?;

    match envelope.captures(body).and_then(|c| c.get(1)) {
        Some(payload) => Ok(payload.as_bytes()),
        None => {
            let body = excerpt(body);
            tracing::error!("Cannot unwrap warning feed response: {:?}", body);
            Err(WarnError::ProtocolMismatch { body })
        }
    }
}

/// Decode an unwrapped JSON payload into a [`WeatherInfo`].
pub fn parse_weather_info(payload: &[u8]) -> Result<WeatherInfo, WarnError> {
    serde_json::from_slice(payload).map_err(|e| {
        let payload = excerpt(payload);
        tracing::error!("Cannot parse JSON data: {}\n{}", e, payload);
        WarnError::Parse {
            message: e.to_string(),
            payload,
        }
    })
}

/// Unwrap and parse a raw response body.
pub fn parse_feed_body(body: &[u8]) -> Result<WeatherInfo, WarnError> {
    parse_weather_info(unwrap_response(body)?)
}
