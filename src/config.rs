use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use prysm_core::InjectedHeaders;
use reqwest::header::HeaderValue;
use reqwest::Url;

use crate::ConfigError;

/// Every Prysm API key starts with this.
pub const API_KEY_PREFIX: &str = "sk-prysm-";
pub const API_KEY_ENV: &str = "PRYSM_API_KEY";
pub const BASE_URL_ENV: &str = "PRYSM_BASE_URL";
pub const DEFAULT_BASE_URL: &str = "https://prysmai.io/api/v1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

// Characters of a rejected key that may appear in an error message
const KEY_PREVIEW_LEN: usize = 12;

/// Configuration for a monitored client, before validation
#[derive(Clone)]
pub struct PrysmConfig {
    /// Prysm API key (`sk-prysm-...`), falls back to `PRYSM_API_KEY`
    pub api_key: Option<String>,
    /// Proxy URL, falls back to `PRYSM_BASE_URL` then [`DEFAULT_BASE_URL`]
    pub base_url: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// Provider key forwarded to the proxy in place of the project's stored key
    pub upstream_api_key: Option<String>,
    /// Headers the proxy re-applies to the upstream request
    pub forward_headers: Option<BTreeMap<String, String>>,
}

impl Default for PrysmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            upstream_api_key: None,
            forward_headers: None,
        }
    }
}

impl fmt::Debug for PrysmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrysmConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field(
                "upstream_api_key",
                &self.upstream_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("forward_headers", &self.forward_headers)
            .finish()
    }
}

impl PrysmConfig {
    pub fn builder() -> PrysmConfigBuilder {
        PrysmConfigBuilder::new()
    }

    /// Validates the configuration, filling gaps from the process environment.
    pub fn resolve(self) -> Result<ResolvedConfig, ConfigError> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Validates the configuration, filling gaps from `env`.
    pub fn resolve_with<F>(self, env: F) -> Result<ResolvedConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = non_empty(self.api_key)
            .or_else(|| non_empty(env(API_KEY_ENV)))
            .ok_or(ConfigError::MissingApiKey)?;

        let invalid_key = || ConfigError::InvalidApiKeyFormat {
            prefix: api_key.chars().take(KEY_PREVIEW_LEN).collect(),
        };
        if !api_key.starts_with(API_KEY_PREFIX) {
            return Err(invalid_key());
        }
        let mut authorization =
            HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|_| invalid_key())?;
        authorization.set_sensitive(true);

        let base_url = non_empty(self.base_url)
            .or_else(|| non_empty(env(BASE_URL_ENV)))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = base_url.trim_end_matches('/').to_string();
        match Url::parse(&base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {}
            _ => return Err(ConfigError::InvalidBaseUrl(base_url)),
        }

        Ok(ResolvedConfig {
            api_key,
            authorization,
            base_url,
            timeout: self.timeout,
            upstream_api_key: non_empty(self.upstream_api_key),
            forward_headers: self.forward_headers.filter(|headers| !headers.is_empty()),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}

/// Builder for [`PrysmConfig`]
#[derive(Debug, Default)]
pub struct PrysmConfigBuilder {
    config: PrysmConfig,
}

impl PrysmConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: PrysmConfig::default(),
        }
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config.api_key = Some(api_key.into());
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = Some(base_url.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn timeout_secs(mut self, seconds: u64) -> Self {
        self.config.timeout = Duration::from_secs(seconds);
        self
    }

    pub fn upstream_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.upstream_api_key = Some(key.into());
        self
    }

    pub fn forward_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.config.forward_headers = Some(headers);
        self
    }

    pub fn forward_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config
            .forward_headers
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn build(self) -> PrysmConfig {
        self.config
    }
}

/// Validated, immutable client configuration.
#[derive(Clone)]
pub struct ResolvedConfig {
    api_key: String,
    authorization: HeaderValue,
    base_url: String,
    timeout: Duration,
    upstream_api_key: Option<String>,
    forward_headers: Option<BTreeMap<String, String>>,
}

impl ResolvedConfig {
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// `Bearer <api key>`, marked sensitive.
    pub fn authorization(&self) -> &HeaderValue {
        &self.authorization
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn upstream_api_key(&self) -> Option<&str> {
        self.upstream_api_key.as_deref()
    }

    pub fn forward_headers(&self) -> Option<&BTreeMap<String, String>> {
        self.forward_headers.as_ref()
    }

    /// The static headers the injecting transport adds to every request.
    pub fn injected_headers(&self) -> InjectedHeaders {
        let mut headers = InjectedHeaders::new();
        if let Some(key) = &self.upstream_api_key {
            headers = headers.with_upstream_api_key(key.clone());
        }
        if let Some(forward) = &self.forward_headers {
            headers = headers.with_forward_headers(forward.clone());
        }
        headers
    }
}

impl fmt::Debug for ResolvedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field(
                "upstream_api_key",
                &self.upstream_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("forward_headers", &self.forward_headers)
            .finish()
    }
}
