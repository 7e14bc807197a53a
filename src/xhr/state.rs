//! Ready states and per-attempt bookkeeping of the stateful facade.
use crate::net::body::Body;
use crate::net::headers::Headers;
use crate::net::request::{Request, ResponseType};
use crate::net::response::Response;
use bytes::Bytes;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Ready state of a stateful call. States only move forward within one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum ReadyState {
    #[default]
    Unsent = 0,
    Opened = 1,
    HeadersReceived = 2,
    Loading = 3,
    Done = 4,
}

impl ReadyState {
    pub const UNSENT: u8 = 0;
    pub const OPENED: u8 = 1;
    pub const HEADERS_RECEIVED: u8 = 2;
    pub const LOADING: u8 = 3;
    pub const DONE: u8 = 4;

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Following state. `Done` stays `Done`.
    pub fn next(self) -> ReadyState {
        match self {
            ReadyState::Unsent => ReadyState::Opened,
            ReadyState::Opened => ReadyState::HeadersReceived,
            ReadyState::HeadersReceived => ReadyState::Loading,
            ReadyState::Loading | ReadyState::Done => ReadyState::Done,
        }
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReadyState::Unsent => "UNSENT",
            ReadyState::Opened => "OPENED",
            ReadyState::HeadersReceived => "HEADERS_RECEIVED",
            ReadyState::Loading => "LOADING",
            ReadyState::Done => "DONE",
        };
        write!(f, "{}", name)
    }
}

/// Settings made on the facade and copied into the request on `send()`.
#[derive(Debug, Clone, Default)]
pub(crate) struct Settings {
    pub response_type: ResponseType,
    pub timeout: Option<Duration>,
    pub with_credentials: bool,
    pub mime_override: Option<String>,
}

impl Settings {
    pub fn apply_to(&self, request: &mut Request) {
        request.response_type = self.response_type;
        request.timeout = self.timeout;
        request.with_credentials = self.with_credentials;
        request.mime_override = self.mime_override.clone();
    }
}

/// What the facade exposes to callers. Only written while replaying
/// `HEADERS_RECEIVED` (head) and `DONE` (head and body).
#[derive(Debug)]
pub(crate) struct View {
    pub status: u16,
    pub status_text: String,
    pub text: String,
    pub data: Option<Body>,
    pub xml: Option<String>,
    pub url: String,
}

impl Default for View {
    fn default() -> Self {
        Self {
            status: 0,
            status_text: String::new(),
            text: String::new(),
            data: Some(Body::Text(String::new())),
            xml: None,
            url: String::new(),
        }
    }
}

/// Mutable state of one facade. Guarded by a mutex that is never held while
/// listeners or hooks run.
#[derive(Debug, Default)]
pub(crate) struct CallState {
    /// Bumped by `open()` and by a synthesized abort. Work of an older attempt is discarded.
    pub generation: u64,
    pub ready_state: ReadyState,
    /// Request being prepared between `open()` and `send()`
    pub request: Option<Request>,
    pub settings: Settings,
    pub response: Response,
    pub view: View,
    pub has_error: bool,
    /// Aborted sentinel: status reads as 0, status text and headers are not read
    pub aborted: bool,
    pub send_flag: bool,
    /// Cancels the hook chains of the pending `send()`
    pub cancel: Option<CancellationToken>,
    /// Cancels the transport call while it is engaged
    pub transport_cancel: Option<CancellationToken>,
}

impl CallState {
    /// Starts a new attempt and returns its generation.
    pub fn reset(&mut self, request: Request) -> u64 {
        self.cancel_pending();
        self.generation += 1;
        self.ready_state = ReadyState::Unsent;
        self.request = Some(request);
        self.response = Response::new();
        self.view = View::default();
        self.has_error = false;
        self.aborted = false;
        self.send_flag = false;
        self.generation
    }

    pub fn cancel_pending(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        if let Some(token) = self.transport_cancel.take() {
            token.cancel();
        }
    }

    /// Ends a failed attempt: nothing is pending any more and the call has to be
    /// opened again.
    pub fn end_attempt(&mut self) {
        self.cancel_pending();
        self.send_flag = false;
        self.request = None;
        self.has_error = true;
        self.ready_state = ReadyState::Unsent;
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    /// Reads status line and headers reported by the transport into the response.
    /// Headers already present in the response are kept.
    pub fn read_head(&mut self, status: u16, status_text: &str, headers: &Headers) {
        if self.aborted {
            self.response.status = 0;
            return;
        }
        self.response.status = status;
        self.response.status_text = status_text.to_string();
        self.response.headers.extend_missing(headers);
    }

    /// Reads the transport body into the response, in the form the response type asks for.
    pub fn read_body(&mut self, body: Bytes, response_type: ResponseType, mime_override: Option<&str>) {
        let response = &mut self.response;
        match response_type {
            ResponseType::Text => {
                let text = String::from_utf8_lossy(&body).into_owned();
                let mime = mime_override.or_else(|| response.headers.get("content-type"));
                response.xml = mime.filter(|m| m.contains("xml")).map(|_| text.clone());
                response.data = Some(Body::Text(text.clone()));
                response.text = Some(text);
            }
            ResponseType::Document => {
                let text = String::from_utf8_lossy(&body).into_owned();
                response.data = Some(Body::Text(text.clone()));
                response.xml = Some(text);
            }
            ResponseType::Json => {
                response.data = serde_json::from_slice(&body).ok().map(Body::Json);
            }
            ResponseType::ArrayBuffer | ResponseType::Blob => {
                response.data = Some(Body::Bytes(body));
            }
        }
    }

    /// Records the URL the transport resolved to. Only a URL other than the
    /// request URL ends up in `final_url`.
    pub fn read_url(&mut self, requested: Option<&Url>, resolved: Url) {
        if requested != Some(&resolved) {
            self.response.final_url = Some(resolved.clone());
        }
        self.view.url = resolved.to_string();
    }

    pub fn write_head(&mut self) {
        self.view.status = if self.aborted { 0 } else { self.response.status };
        self.view.status_text = self.response.status_text.clone();
    }

    pub fn write_body(&mut self) {
        if let Some(text) = &self.response.text {
            self.view.text = text.clone();
        }
        if let Some(xml) = &self.response.xml {
            self.view.xml = Some(xml.clone());
        }
        if let Some(data) = &self.response.data {
            self.view.data = data.try_clone();
        }
        if let Some(url) = &self.response.final_url {
            self.view.url = url.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_state_order_and_numbers() {
        assert!(ReadyState::Unsent < ReadyState::Done);
        assert_eq!(ReadyState::Loading.as_u8(), ReadyState::LOADING);
        assert_eq!(ReadyState::Loading.next(), ReadyState::Done);
        assert_eq!(ReadyState::Done.next(), ReadyState::Done);
        assert_eq!(ReadyState::HeadersReceived.to_string(), "HEADERS_RECEIVED");
    }

    #[test]
    fn read_head_keeps_hook_headers_and_honours_abort() {
        let mut state = CallState::default();
        state.response.headers.insert("x-hooked", "1");

        let transport: Headers = [("X-Hooked", "transport"), ("Server", "gosub")]
            .into_iter()
            .collect();
        state.read_head(200, "OK", &transport);
        assert_eq!(state.response.status, 200);
        assert_eq!(state.response.headers.get("x-hooked"), Some("1"));
        assert_eq!(state.response.headers.get("server"), Some("gosub"));

        let mut aborted = CallState {
            aborted: true,
            ..Default::default()
        };
        aborted.read_head(200, "OK", &transport);
        assert_eq!(aborted.response.status, 0);
        assert_eq!(aborted.response.status_text, "");
        assert!(aborted.response.headers.is_empty());
    }

    #[test]
    fn read_body_by_response_type() {
        let mut state = CallState::default();
        state.response.headers.insert("content-type", "application/xml");
        state.read_body(Bytes::from_static(b"<a/>"), ResponseType::Text, None);
        assert_eq!(state.response.text.as_deref(), Some("<a/>"));
        assert_eq!(state.response.xml.as_deref(), Some("<a/>"));

        let mut state = CallState::default();
        state.read_body(Bytes::from_static(b"plain"), ResponseType::Text, None);
        assert!(state.response.xml.is_none());

        let mut state = CallState::default();
        state.read_body(Bytes::from_static(br#"{"a":1}"#), ResponseType::Json, None);
        assert!(matches!(&state.response.data, Some(Body::Json(v)) if v["a"] == 1));
        assert!(state.response.text.is_none());

        let mut state = CallState::default();
        state.read_body(Bytes::from_static(b"\x00\x01"), ResponseType::ArrayBuffer, None);
        assert!(matches!(&state.response.data, Some(Body::Bytes(b)) if b.len() == 2));
    }

    #[test]
    fn final_url_only_when_redirected() {
        let requested = Url::parse("https://example.com/a").unwrap();
        let mut state = CallState::default();
        state.read_url(Some(&requested), requested.clone());
        assert!(state.response.final_url.is_none());
        assert_eq!(state.view.url, "https://example.com/a");

        state.read_url(Some(&requested), Url::parse("https://example.com/b").unwrap());
        assert_eq!(state.response.final_url.as_ref().map(Url::as_str), Some("https://example.com/b"));
    }

    #[test]
    fn write_exposes_response() {
        let mut state = CallState::default();
        state.response.status = 201;
        state.response.status_text = "Created".into();
        state.response.text = Some("made".into());
        state.write_head();
        state.write_body();
        assert_eq!(state.view.status, 201);
        assert_eq!(state.view.text, "made");

        state.aborted = true;
        state.write_head();
        assert_eq!(state.view.status, 0);
    }
}
