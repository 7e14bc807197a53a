//! Response model shared by both call styles.
//!
//! A [`Response`] is created empty when a request is opened and filled from
//! three possible sources: a hook short-circuit ([`ResponsePatch`]), the
//! transport, or both when a hook asks for the transport to still run
//! (`need_send`).
//!
//! ## Notes
//! - The body is kept **redundantly**: `text`, `data` and `xml` are filled
//!   depending on which call style and response type produced the response. A
//!   hook may supply only one of them; nothing normalizes them afterwards.
//! - `headers` is a [`Headers`] map, which is **case-insensitive** for names.
//! - `final_url` is only set when the transport resolved the call to a URL other
//!   than the requested one (redirects).
//!
use crate::errors::InterceptError;
use crate::net::body::Body;
use crate::net::headers::Headers;
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use url::Url;

#[derive(Debug, Default)]
pub struct Response {
    /// Numeric status code (e.g., `200`, `404`). `0` while unknown or after an abort.
    pub status: u16,

    /// Reason phrase (e.g., `"OK"`).
    pub status_text: String,

    /// Response headers as a case-insensitive map.
    pub headers: Headers,

    /// Body as text (`responseText`).
    pub text: Option<String>,

    /// Body in the form requested by the caller (`response`).
    pub data: Option<Body>,

    /// Body as a document (`responseXML`). Documents are kept as their source text.
    pub xml: Option<String>,

    /// URL of the response after redirects, if different from the request URL.
    pub final_url: Option<Url>,

    /// When set by a hook, the transport is still called after the short-circuit.
    pub need_send: bool,

    /// Transport failure routed through the after-chain.
    pub error: Option<String>,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// Error-shaped response handed to after-hooks when the transport failed.
    pub fn from_error(error: &InterceptError) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::default()
        }
    }

    /// True for 2xx status codes.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Text of the body, preferring `text` over `data`.
    pub fn body_text(&self) -> Option<Cow<'_, str>> {
        if let Some(text) = &self.text {
            return Some(Cow::Borrowed(text));
        }
        self.data.as_ref().and_then(|d| d.to_text())
    }

    /// Parses the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, InterceptError> {
        if let Some(Body::Json(v)) = &self.data {
            return serde_json::from_value(v.clone()).map_err(|e| InterceptError::Body(e.to_string()));
        }
        let text = self
            .body_text()
            .ok_or_else(|| InterceptError::Body("response has no body".to_string()))?;
        serde_json::from_str(&text).map_err(|e| InterceptError::Body(e.to_string()))
    }

    /// Merges a hook supplied patch. Fields the patch leaves unset are kept.
    pub fn merge(&mut self, patch: ResponsePatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(status_text) = patch.status_text {
            self.status_text = status_text;
        }
        if let Some(headers) = patch.headers {
            self.headers.merge(&headers);
        }
        if let Some(text) = patch.text {
            self.text = Some(text);
        }
        if let Some(data) = patch.data {
            self.data = Some(data);
        }
        if let Some(xml) = patch.xml {
            self.xml = Some(xml);
        }
        if let Some(final_url) = patch.final_url {
            self.final_url = Some(final_url);
        }
        self.need_send = patch.need_send;
    }
}

/// Response-shaped value supplied by a hook.
#[derive(Debug, Default)]
pub struct ResponsePatch {
    pub status: Option<u16>,
    pub status_text: Option<String>,
    pub headers: Option<Headers>,
    pub text: Option<String>,
    pub data: Option<Body>,
    pub xml: Option<String>,
    pub final_url: Option<Url>,
    pub need_send: bool,
}

impl ResponsePatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plain text response: every body-bearing field carries `text`.
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            data: Some(Body::Text(text.clone())),
            text: Some(text),
            ..Self::default()
        }
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn status_text(mut self, status_text: impl Into<String>) -> Self {
        self.status_text = Some(status_text.into());
        self
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.get_or_insert_with(Headers::new).insert(name, value);
        self
    }

    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn data(mut self, data: impl Into<Body>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn xml(mut self, xml: impl Into<String>) -> Self {
        self.xml = Some(xml.into());
        self
    }

    pub fn final_url(mut self, url: Url) -> Self {
        self.final_url = Some(url);
        self
    }

    pub fn need_send(mut self, need_send: bool) -> Self {
        self.need_send = need_send;
        self
    }

    /// A patch without `data` exposes its text as data too.
    pub(crate) fn with_data_from_text(mut self) -> Self {
        if self.data.is_none() {
            if let Some(text) = &self.text {
                self.data = Some(Body::Text(text.clone()));
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_keeps_unset_fields() {
        let mut res = Response::new();
        res.status = 404;
        res.status_text = "Not Found".into();
        res.headers.insert("server", "gosub");

        res.merge(ResponsePatch::new().text("hi").header("X-Hooked", "1"));

        assert_eq!(res.status, 404);
        assert_eq!(res.status_text, "Not Found");
        assert_eq!(res.text.as_deref(), Some("hi"));
        assert_eq!(res.headers.get("x-hooked"), Some("1"));
        assert_eq!(res.headers.get("server"), Some("gosub"));
        assert!(!res.need_send);
    }

    #[test]
    fn text_patch_fills_text_and_data() {
        let patch = ResponsePatch::from_text("ok");
        assert_eq!(patch.text.as_deref(), Some("ok"));
        assert_eq!(patch.data.as_ref().and_then(|d| d.as_str()), Some("ok"));

        let patch = ResponsePatch::new().text("only text").with_data_from_text();
        assert_eq!(patch.data.as_ref().and_then(|d| d.as_str()), Some("only text"));
    }

    #[test]
    fn json_from_text_and_structured_data() {
        let mut res = Response::new();
        res.text = Some(r#"{"n": 3}"#.into());
        let v: serde_json::Value = res.json().unwrap();
        assert_eq!(v["n"], 3);

        let mut res = Response::new();
        res.data = Some(Body::Json(json!({"n": 4})));
        let v: serde_json::Value = res.json().unwrap();
        assert_eq!(v["n"], 4);

        assert!(Response::new().json::<serde_json::Value>().is_err());
    }

    #[test]
    fn error_shaped_response() {
        let res = Response::from_error(&InterceptError::Transport("connection refused".into()));
        assert!(res.is_error());
        assert_eq!(res.status, 0);
        assert!(!res.ok());
        assert!(res.error.unwrap().contains("connection refused"));
    }
}
