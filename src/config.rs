//! Client configuration.

use std::time::Duration;

use url::Url;

use crate::error::Error;

/// Default REST base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.fish.audio";

/// Path of the live (bidirectional) TTS endpoint.
pub const LIVE_TTS_PATH: &str = "/v1/tts/live";

/// How long the WebSocket open handshake may take.
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_millis(5000);

/// How long a close may wait for the peer before the socket is released.
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Inbound frames buffered per connection before the socket is backpressured.
pub const DEFAULT_INBOUND_BUFFER: usize = 64;

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "FISH_AUDIO_API_KEY";

/// Environment variable overriding the base URL.
pub const BASE_URL_ENV: &str = "FISH_AUDIO_BASE_URL";

/// Configuration shared by the HTTP and WebSocket sessions.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API key sent as a bearer token.
    pub api_key: String,
    /// Base URL, `https://` or `http://`.
    pub base_url: String,
    /// Open handshake deadline.
    pub open_timeout: Duration,
    /// Close grace period.
    pub close_grace: Duration,
    /// Inbound FIFO capacity.
    pub inbound_buffer: usize,
}

impl ClientConfig {
    /// Creates a configuration with the default endpoint and timeouts.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            open_timeout: DEFAULT_OPEN_TIMEOUT,
            close_grace: DEFAULT_CLOSE_GRACE,
            inbound_buffer: DEFAULT_INBOUND_BUFFER,
        }
    }

    /// Reads the API key (and optionally the base URL) from the environment.
    pub fn from_env() -> Result<Self, Error> {
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or(Error::MissingApiKey)?;
        let mut config = Self::new(api_key);
        if let Ok(base_url) = std::env::var(BASE_URL_ENV) {
            config = config.with_base_url(base_url);
        }
        Ok(config)
    }

    /// Sets the REST base URL; the live URL is derived from it.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim().trim_end_matches('/').to_string();
        self
    }

    /// Sets the open handshake deadline.
    pub fn with_open_timeout(mut self, open_timeout: Duration) -> Self {
        self.open_timeout = open_timeout;
        self
    }

    /// Sets how long a close waits for the peer.
    pub fn with_close_grace(mut self, close_grace: Duration) -> Self {
        self.close_grace = close_grace;
        self
    }

    /// Sets the inbound FIFO capacity. Zero is raised to one.
    pub fn with_inbound_buffer(mut self, inbound_buffer: usize) -> Self {
        self.inbound_buffer = inbound_buffer.max(1);
        self
    }

    /// Returns the WebSocket URL of the live TTS endpoint.
    ///
    /// `https` maps to `wss` and `http` to `ws`; a path prefix on the base URL
    /// is kept.
    pub fn live_url(&self) -> Result<String, Error> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| Error::InvalidEndpoint(format!("{}: {e}", self.base_url)))?;
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => {
                return Err(Error::InvalidEndpoint(format!(
                    "unsupported scheme {other}"
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| Error::InvalidEndpoint(self.base_url.clone()))?;
        Ok(format!(
            "{}{}",
            url.as_str().trim_end_matches('/'),
            LIVE_TTS_PATH
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_url_default() {
        let config = ClientConfig::new("key");
        assert_eq!(
            config.live_url().unwrap(),
            "wss://api.fish.audio/v1/tts/live"
        );
    }

    #[test]
    fn test_live_url_plain_http_with_prefix() {
        let config = ClientConfig::new("key").with_base_url("http://127.0.0.1:8080/proxy/");
        assert_eq!(
            config.live_url().unwrap(),
            "ws://127.0.0.1:8080/proxy/v1/tts/live"
        );
    }

    #[test]
    fn test_live_url_rejects_unknown_scheme() {
        let config = ClientConfig::new("key").with_base_url("ftp://example.com");
        assert!(matches!(config.live_url(), Err(Error::InvalidEndpoint(_))));
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::new("key").with_inbound_buffer(0);
        assert_eq!(config.open_timeout, Duration::from_millis(5000));
        assert_eq!(config.inbound_buffer, 1);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }
}
