//! The native transport capability.
//!
//! Both call styles hand their request to a [`Transport`] once the before-chain
//! did not answer it. A transport call reports its lifecycle as a stream of
//! [`TransportEvent`]s over an unbounded channel and can be cancelled through
//! the token in [`TransportCall`].
//!
//! A well-behaved transport emits, in order:
//!
//! 1. optionally upload notifications ([`TransportEvent::Upload`])
//! 2. [`TransportEvent::HeadersReceived`] once
//! 3. zero or more [`TransportEvent::Progress`]
//! 4. exactly one terminal event: [`TransportEvent::Done`] or [`TransportEvent::Failed`]
//!
//! A failure may arrive at any point and ends the call.
use crate::config::InterceptorConfig;
use crate::errors::InterceptError;
use crate::events::{Event, ABORT, ERROR, TIMEOUT};
use crate::net::headers::Headers;
use crate::net::request::{FetchOptions, Request, ResponseType};
use bytes::Bytes;
use http::{HeaderMap, Method};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

mod http_client;

#[cfg(test)]
pub(crate) mod testing;

pub use http_client::ReqwestTransport;

/// Request as handed to the transport. Built from a [`Request`] after the
/// before-chain ran, with the URL resolved and the body drained.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub timeout: Option<Duration>,
    pub with_credentials: bool,
    pub response_type: ResponseType,
    pub fetch: FetchOptions,
}

impl TransportRequest {
    pub fn from_request(request: &Request, config: &InterceptorConfig) -> Result<Self, InterceptError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| InterceptError::InvalidMethod(request.method.clone()))?;

        Ok(Self {
            method,
            url: config.resolve_url(&request.url)?,
            headers: request.headers.to_header_map()?,
            body: request.body.to_bytes()?,
            user: request.user.clone(),
            pass: request.pass.clone(),
            timeout: request.timeout,
            with_credentials: request.with_credentials,
            response_type: request.response_type,
            fetch: request.fetch.clone(),
        })
    }
}

/// Why a transport call ended without a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFailure {
    Error(String),
    Timeout,
    Abort,
}

impl TransportFailure {
    /// Name of the lifecycle event this failure is reported as.
    pub fn event_name(&self) -> &'static str {
        match self {
            TransportFailure::Error(_) => ERROR,
            TransportFailure::Timeout => TIMEOUT,
            TransportFailure::Abort => ABORT,
        }
    }
}

impl From<TransportFailure> for InterceptError {
    fn from(failure: TransportFailure) -> Self {
        match failure {
            TransportFailure::Error(e) => InterceptError::Transport(e),
            TransportFailure::Timeout => InterceptError::Timeout,
            TransportFailure::Abort => InterceptError::Aborted,
        }
    }
}

#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Notification for the upload channel (`loadstart`, `progress`, `load`, `loadend`)
    Upload(Event),
    /// Status line and headers are known
    HeadersReceived {
        status: u16,
        status_text: String,
        headers: Headers,
        /// URL the call resolved to after redirects
        url: Url,
    },
    /// Body bytes received so far
    Progress { loaded: u64, total: Option<u64> },
    /// Complete body
    Done { body: Bytes },
    Failed(TransportFailure),
}

/// Handle of a dispatched transport call.
#[derive(Debug)]
pub struct TransportCall {
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
    /// Cancelling the token makes the transport report [`TransportFailure::Abort`]
    pub cancel: CancellationToken,
}

/// The native network capability both call styles fall back to.
pub trait Transport: Send + Sync {
    /// Starts a call. Must not block; the call runs in the background and
    /// reports through [`TransportCall::events`].
    fn dispatch(&self, request: TransportRequest) -> TransportCall;
}
