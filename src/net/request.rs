//! Canonical request model shared by both call styles.
//!
//! One [`Request`] exists per call attempt. The stateful facade fills it from
//! `open()`, `setRequestHeader()` and `send()`, the fetch adapter fills it from
//! its input and option bag. Hooks see and may change every field.
use crate::events::EventEmitter;
use crate::net::body::Body;
use crate::net::headers::Headers;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Which call style produced a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallStyle {
    /// `XMLHttpRequest`-like facade
    #[default]
    Stateful,
    /// `fetch`-like single-shot call
    Deferred,
}

/// How the stateful facade exposes the body of a completed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseType {
    /// `""` or `"text"`: body is exposed as text, data and xml
    #[default]
    Text,
    ArrayBuffer,
    Blob,
    Document,
    Json,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Text => "text",
            ResponseType::ArrayBuffer => "arraybuffer",
            ResponseType::Blob => "blob",
            ResponseType::Document => "document",
            ResponseType::Json => "json",
        }
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ResponseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "text" => Ok(ResponseType::Text),
            "arraybuffer" => Ok(ResponseType::ArrayBuffer),
            "blob" => Ok(ResponseType::Blob),
            "document" => Ok(ResponseType::Document),
            "json" => Ok(ResponseType::Json),
            other => Err(format!("unknown response type: {other}")),
        }
    }
}

/// Option bag of the deferred call style. The transport is free to ignore
/// options it has no equivalent for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOptions {
    pub mode: Option<String>,
    pub credentials: Option<String>,
    pub cache: Option<String>,
    pub redirect: Option<String>,
    pub referrer: Option<String>,
    pub referrer_policy: Option<String>,
    pub integrity: Option<String>,
    pub keepalive: Option<bool>,
}

#[derive(Debug)]
pub struct Request {
    pub method: String,
    pub url: String,
    /// `false` only for synchronous stateful calls
    pub is_async: bool,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub headers: Headers,
    pub body: Body,
    pub response_type: ResponseType,
    pub timeout: Option<Duration>,
    pub with_credentials: bool,
    pub mime_override: Option<String>,
    pub style: CallStyle,
    pub fetch: FetchOptions,
    /// Upload progress channel of the stateful facade
    pub upload: Option<EventEmitter>,
}

impl Default for Request {
    fn default() -> Self {
        Self {
            method: "GET".to_string(),
            url: String::new(),
            is_async: true,
            user: None,
            pass: None,
            headers: Headers::new(),
            body: Body::Empty,
            response_type: ResponseType::default(),
            timeout: None,
            with_credentials: false,
            mime_override: None,
            style: CallStyle::default(),
            fetch: FetchOptions::default(),
            upload: None,
        }
    }
}

impl Request {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    /// Sets a request header the way `setRequestHeader()` does: the first spelling of a
    /// name is kept and repeated names accumulate with `", "`.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.append(name, value);
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_async_get() {
        let req = Request::default();
        assert!(req.is_async);
        assert_eq!(req.method, "GET");
        assert_eq!(req.style, CallStyle::Stateful);
        assert!(req.upload.is_none());
    }

    #[test]
    fn set_header_accumulates_under_first_spelling() {
        let mut req = Request::new("POST", "/submit");
        req.set_header("X-Token", "a");
        req.set_header("x-token", "b");

        assert_eq!(req.header("X-TOKEN"), Some("a, b"));
        assert_eq!(req.headers.canonical_name("x-token"), Some("X-Token"));
    }

    #[test]
    fn response_type_parsing() {
        assert_eq!("".parse::<ResponseType>(), Ok(ResponseType::Text));
        assert_eq!("JSON".parse::<ResponseType>(), Ok(ResponseType::Json));
        assert_eq!("document".parse::<ResponseType>(), Ok(ResponseType::Document));
        assert!("xml".parse::<ResponseType>().is_err());
        assert_eq!(ResponseType::ArrayBuffer.to_string(), "arraybuffer");
    }
}
