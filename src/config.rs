//! Interceptor configuration.
//!
//! `InterceptorConfig` controls how an [`Interceptor`](crate::Interceptor)
//! starts up and how its default transport talks to the network. It provides
//! sensible defaults via [`Default`], a fluent [`InterceptorConfig::builder()`]
//! with validation, and JSON loading via [`InterceptorConfig::from_json`].
//!
//! # Examples
//!
//! ## Use defaults
//! ```rust
//! use gosub_net_hooks::config::InterceptorConfig;
//! let cfg = InterceptorConfig::default();
//! assert!(cfg.enabled);
//! assert_eq!(cfg.success_status, 200);
//! ```
//!
//! ## Customize with the builder
//! ```rust
//! use gosub_net_hooks::config::InterceptorConfig;
//! use std::time::Duration;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = InterceptorConfig::builder()
//!     .enabled(false)
//!     .user_agent("Gosub/0.1")
//!     .base_url("https://example.com/")
//!     .request_timeout(Duration::from_secs(10))
//!     .max_redirects(5)
//!     .build()?; // returns Result<InterceptorConfig, ConfigError>
//! # Ok(()) }
//! ```
//!
//! # Fields (summary)
//! - `enabled`: Hooks are active from construction on (default: true).
//! - `user_agent`: UA string sent by the default transport.
//! - `base_url`: Base for resolving relative request URLs before they reach the transport.
//! - `request_timeout`: Transport-wide timeout; per-call timeouts override it.
//! - `max_redirects`: Redirect limit of the default transport (default: 10).
//! - `success_status` / `success_status_text`: Status given to short-circuit
//!   responses that do not set one (default: `200 OK`).
//!
//! # Errors
//!
//! Builder validation can return [`ConfigError`] if values are invalid
//! (e.g. a zero timeout, more than `MAX_REDIRECTS` redirects, a base URL that
//! does not parse, or a success status outside `100..=599`).

use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use url::Url;

pub const DEFAULT_USER_AGENT: &str = "Gosub/1.0 (X11; Linux x86_64) Gecko/20250802 GosubBrowser/1.0";

/// Upper bound for `max_redirects`.
pub const MAX_REDIRECTS: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct InterceptorConfig {
    pub enabled: bool,
    pub user_agent: Option<String>,
    pub base_url: Option<Url>,
    pub request_timeout: Option<Duration>,
    pub max_redirects: usize,
    pub success_status: u16,
    pub success_status_text: String,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            base_url: None,
            request_timeout: None,
            max_redirects: 10,
            success_status: 200,
            success_status_text: "OK".to_string(),
        }
    }
}

impl InterceptorConfig {
    pub fn builder() -> InterceptorConfigBuilder {
        InterceptorConfigBuilder::default()
    }

    /// Loads a configuration from JSON. Missing fields take their default value.
    ///
    /// ```json
    /// { "enabled": true, "user_agent": "Gosub/0.1", "request_timeout_ms": 5000 }
    /// ```
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let defaults = InterceptorConfig::default();

        let mut builder = InterceptorConfig::builder()
            .enabled(file.enabled.unwrap_or(defaults.enabled))
            .max_redirects(file.max_redirects.unwrap_or(defaults.max_redirects))
            .success_status(file.success_status.unwrap_or(defaults.success_status));
        if let Some(ua) = file.user_agent {
            builder = builder.user_agent(ua);
        }
        if let Some(base) = file.base_url {
            builder = builder.base_url(base);
        }
        if let Some(ms) = file.request_timeout_ms {
            builder = builder.request_timeout(Duration::from_millis(ms));
        }
        if let Some(text) = file.success_status_text {
            builder = builder.success_status_text(text);
        }
        builder.build()
    }

    /// Resolves `url` against `base_url` when it is relative.
    pub fn resolve_url(&self, url: &str) -> Result<Url, url::ParseError> {
        match Url::parse(url) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => match &self.base_url {
                Some(base) => base.join(url),
                None => Err(url::ParseError::RelativeUrlWithoutBase),
            },
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    enabled: Option<bool>,
    user_agent: Option<String>,
    base_url: Option<String>,
    request_timeout_ms: Option<u64>,
    max_redirects: Option<usize>,
    success_status: Option<u16>,
    success_status_text: Option<String>,
}

/// Builder for [`InterceptorConfig`].
#[derive(Debug, Clone, Default)]
pub struct InterceptorConfigBuilder {
    inner: InterceptorConfig,
    base_url: Option<String>,
}

impl InterceptorConfigBuilder {
    #[inline]
    fn map(mut self, f: impl FnOnce(&mut InterceptorConfig)) -> Self {
        f(&mut self.inner);
        self
    }

    pub fn enabled(self, on: bool) -> Self { self.map(|c| c.enabled = on) }
    pub fn user_agent<S: Into<String>>(self, ua: S) -> Self { self.map(|c| c.user_agent = Some(ua.into())) }
    pub fn no_user_agent(self) -> Self { self.map(|c| c.user_agent = None) }
    pub fn request_timeout(self, timeout: Duration) -> Self { self.map(|c| c.request_timeout = Some(timeout)) }
    pub fn max_redirects(self, n: usize) -> Self { self.map(|c| c.max_redirects = n) }
    pub fn success_status(self, status: u16) -> Self { self.map(|c| c.success_status = status) }
    pub fn success_status_text<S: Into<String>>(self, text: S) -> Self { self.map(|c| c.success_status_text = text.into()) }

    pub fn base_url<S: Into<String>>(mut self, base: S) -> Self {
        self.base_url = Some(base.into());
        self
    }

    /// Apply multiple changes in one go.
    pub fn with(self, f: impl FnOnce(&mut InterceptorConfig)) -> Self { self.map(f) }

    /// Validate and build the final config.
    pub fn build(mut self) -> Result<InterceptorConfig, ConfigError> {
        if let Some(base) = self.base_url.take() {
            let url = Url::parse(&base).map_err(|_| ConfigError::InvalidBaseUrl(base.clone()))?;
            self.inner.base_url = Some(url);
        }
        validate(&self.inner)?;
        Ok(self.inner)
    }
}

// ---------- Validation ----------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    ZeroTimeout,
    TooManyRedirects(usize),
    InvalidBaseUrl(String),
    InvalidStatus(u16),
    Parse(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroTimeout =>
                write!(f, "request_timeout must be larger than zero"),
            ConfigError::TooManyRedirects(n) =>
                write!(f, "max_redirects {n} is out of range (expected 0..={MAX_REDIRECTS})"),
            ConfigError::InvalidBaseUrl(s) =>
                write!(f, "base_url {s:?} is not an absolute URL"),
            ConfigError::InvalidStatus(s) =>
                write!(f, "success_status {s} is out of range (expected 100..=599)"),
            ConfigError::Parse(e) =>
                write!(f, "cannot parse configuration: {e}"),
        }
    }
}
impl std::error::Error for ConfigError {}

fn validate(c: &InterceptorConfig) -> Result<(), ConfigError> {
    if c.request_timeout.is_some_and(|t| t.is_zero()) {
        return Err(ConfigError::ZeroTimeout);
    }
    if c.max_redirects > MAX_REDIRECTS {
        return Err(ConfigError::TooManyRedirects(c.max_redirects));
    }
    if !(100..=599).contains(&c.success_status) {
        return Err(ConfigError::InvalidStatus(c.success_status));
    }
    Ok(())
}
