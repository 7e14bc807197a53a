//! Deferred-result call style.
//!
//! A fetch call settles exactly once: with the final [`Response`] after the
//! after-chain ran, or with an error. Transport failures are shown to the
//! after-hooks as an error-shaped response before the call fails.
use crate::errors::InterceptError;
use crate::hooks::chain::{run_after, run_before, BeforeOutcome};
use crate::interceptor::{CallId, InterceptorContext};
use crate::net::body::Body;
use crate::net::headers::Headers;
use crate::net::request::{CallStyle, FetchOptions, Request};
use crate::net::response::Response;
use crate::net::transport::{TransportCall, TransportEvent, TransportFailure, TransportRequest};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Request descriptor, the equivalent of a native `Request` object.
#[derive(Debug, Default)]
pub struct FetchRequest {
    pub url: String,
    pub method: Option<String>,
    pub headers: Headers,
    pub body: Body,
    pub options: FetchOptions,
    pub signal: Option<CancellationToken>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

/// First argument of a fetch call.
#[derive(Debug)]
pub enum FetchInput {
    Url(String),
    Request(FetchRequest),
}

impl From<&str> for FetchInput {
    fn from(url: &str) -> Self {
        FetchInput::Url(url.to_string())
    }
}

impl From<String> for FetchInput {
    fn from(url: String) -> Self {
        FetchInput::Url(url)
    }
}

impl From<Url> for FetchInput {
    fn from(url: Url) -> Self {
        FetchInput::Url(url.into())
    }
}

impl From<FetchRequest> for FetchInput {
    fn from(request: FetchRequest) -> Self {
        FetchInput::Request(request)
    }
}

/// Option bag of a fetch call. Set fields override the request descriptor.
#[derive(Debug, Default)]
pub struct RequestInit {
    pub method: Option<String>,
    pub headers: Option<Headers>,
    pub body: Option<Body>,
    pub options: FetchOptions,
    /// Aborts the call when cancelled
    pub signal: Option<CancellationToken>,
}

impl RequestInit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.get_or_insert_with(Headers::new).append(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn options(mut self, options: FetchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }
}

fn overlay(base: FetchOptions, over: FetchOptions) -> FetchOptions {
    FetchOptions {
        mode: over.mode.or(base.mode),
        credentials: over.credentials.or(base.credentials),
        cache: over.cache.or(base.cache),
        redirect: over.redirect.or(base.redirect),
        referrer: over.referrer.or(base.referrer),
        referrer_policy: over.referrer_policy.or(base.referrer_policy),
        integrity: over.integrity.or(base.integrity),
        keepalive: over.keepalive.or(base.keepalive),
    }
}

/// Builds the request model of a fetch call. Streaming bodies are drained here.
async fn normalize(input: FetchInput, init: RequestInit) -> Result<(Request, Option<CancellationToken>), InterceptError> {
    let (mut request, signal) = match input {
        FetchInput::Url(url) => {
            let mut request = Request::new(init.method.unwrap_or_else(|| "GET".to_string()), url);
            request.headers = init.headers.unwrap_or_default();
            request.body = init.body.unwrap_or_default();
            request.fetch = init.options;
            (request, init.signal)
        }
        FetchInput::Request(desc) => {
            let method = init.method.or(desc.method).unwrap_or_else(|| "GET".to_string());
            let mut request = Request::new(method, desc.url);
            request.headers = desc.headers;
            if let Some(headers) = &init.headers {
                request.headers.merge(headers);
            }
            request.body = init.body.unwrap_or(desc.body);
            request.fetch = overlay(desc.options, init.options);
            (request, init.signal.or(desc.signal))
        }
    };

    request.style = CallStyle::Deferred;
    request.body = std::mem::take(&mut request.body).into_replayable().await?;
    Ok((request, signal))
}

/// Copies a transport response over a short-circuit response. Headers set by
/// the hook win over transport headers of the same name.
fn overlay_transport(response: &mut Response, net: Response) {
    response.status = net.status;
    response.status_text = net.status_text;
    response.headers.extend_missing(&net.headers);
    response.text = net.text;
    response.data = net.data;
    if net.final_url.is_some() {
        response.final_url = net.final_url;
    }
}

/// Runs one transport call to completion.
async fn round_trip(
    ctx: &InterceptorContext,
    id: CallId,
    treq: TransportRequest,
    signal: &CancellationToken,
) -> Result<Response, TransportFailure> {
    let requested = treq.url.clone();
    log::debug!("Call[{}]: {} {} handed to the transport", id, treq.method, requested);

    let TransportCall { mut events, cancel } = ctx.transport.dispatch(treq);
    // Dropping the fetch future cancels the transport call as well
    let _guard = cancel.drop_guard();

    let mut response = Response::new();
    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = signal.cancelled() => return Err(TransportFailure::Abort),
        };
        match event {
            Some(TransportEvent::HeadersReceived {
                status,
                status_text,
                headers,
                url,
            }) => {
                response.status = status;
                response.status_text = status_text;
                response.headers = headers;
                if url != requested {
                    response.final_url = Some(url);
                }
            }
            Some(TransportEvent::Done { body }) => {
                response.text = std::str::from_utf8(&body).ok().map(str::to_string);
                response.data = Some(Body::Bytes(body));
                return Ok(response);
            }
            Some(TransportEvent::Failed(failure)) => return Err(failure),
            Some(TransportEvent::Upload(_)) | Some(TransportEvent::Progress { .. }) => {}
            None => {
                return Err(TransportFailure::Error(
                    "transport closed the call without an answer".to_string(),
                ))
            }
        }
    }
}

/// Performs a fetch call through the hook chains of `ctx`.
pub(crate) async fn fetch(
    ctx: &InterceptorContext,
    input: FetchInput,
    init: RequestInit,
) -> Result<Response, InterceptError> {
    let id = CallId::new();
    let (request, signal) = normalize(input, init).await?;
    let signal = signal.unwrap_or_default();
    let hooked = ctx.is_enabled();
    log::debug!("Call[{}]: fetch {} {} (hooked: {})", id, request.method, request.url, hooked);

    let mut response = Response::new();
    let (request, need_transport) = if hooked {
        let outcome = run_before(ctx.hooks.before_snapshot(), request, &signal, |_stage, patch| {
            response.merge(patch)
        })
        .await?;

        match outcome {
            BeforeOutcome::Proceed(request) => (request, true),
            BeforeOutcome::Reply(request, patch) => {
                response.merge(patch);
                if response.status == 0 {
                    response.status = ctx.config.success_status;
                    response.status_text = ctx.config.success_status_text.clone();
                }
                (request, response.need_send)
            }
        }
    } else {
        (request, true)
    };

    if need_transport {
        let treq = TransportRequest::from_request(&request, &ctx.config)?;
        match round_trip(ctx, id, treq, &signal).await {
            Ok(net) => overlay_transport(&mut response, net),
            Err(failure) => {
                let error = InterceptError::from(failure);
                log::warn!("Call[{}]: fetch {} {} failed: {}", id, request.method, request.url, error);
                if hooked {
                    run_after(ctx.hooks.after_snapshot(), request, Response::from_error(&error)).await?;
                }
                return Err(error);
            }
        }
    }

    if !hooked {
        return Ok(response);
    }
    let (_, response) = run_after(ctx.hooks.after_snapshot(), request, response).await?;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InterceptorConfig;
    use crate::hooks::hook::{AfterHook, BeforeHook, Reply};
    use crate::interceptor::Interceptor;
    use crate::net::response::ResponsePatch;
    use crate::net::transport::testing::{response_events, Script, ScriptedTransport};
    use bytes::Bytes;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn harness() -> (Interceptor, Arc<ScriptedTransport>) {
        let transport = ScriptedTransport::new();
        let config = InterceptorConfig::builder()
            .base_url("http://test.local/")
            .build()
            .unwrap();
        (Interceptor::new(config, transport.clone()), transport)
    }

    #[tokio::test]
    async fn url_input_goes_through_both_chains() {
        let (ic, transport) = harness();
        transport.respond(200, vec![("Content-Type", "text/plain")], "net body");
        ic.after(
            AfterHook::sync(|_req, res| {
                res.headers.insert("x-hooked", "1");
                Ok(())
            }),
            None,
        );

        let res = ic.fetch("/x", RequestInit::new()).await.unwrap();
        assert_eq!(res.status, 200);
        assert_eq!(res.status_text, "OK");
        assert_eq!(res.body_text().as_deref(), Some("net body"));
        assert_eq!(res.headers.get("x-hooked"), Some("1"));
        assert!(res.final_url.is_none());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn text_short_circuit_skips_the_transport() {
        let (ic, transport) = harness();
        ic.before(BeforeHook::sync(|_req| Ok(Some(Reply::from("hello")))), None);

        let res = ic.fetch("/x", RequestInit::new()).await.unwrap();
        assert_eq!(res.status, 200);
        assert_eq!(res.text.as_deref(), Some("hello"));
        assert_eq!(res.data.as_ref().and_then(|d| d.as_str()), Some("hello"));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn descriptor_and_init_are_merged() {
        let (ic, transport) = harness();
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        ic.before(
            BeforeHook::sync(move |req| {
                *sink.lock().unwrap() = Some((req.style, req.method.clone(), req.fetch.clone()));
                Ok(None)
            }),
            None,
        );

        let mut desc = FetchRequest::new("/merge");
        desc.method = Some("PUT".into());
        desc.headers.append("Accept", "text/html");
        desc.headers.append("X-Mode", "descriptor");
        desc.options.mode = Some("cors".into());
        desc.options.cache = Some("no-store".into());

        let init = RequestInit::new()
            .method("POST")
            .header("x-mode", "init")
            .options(FetchOptions {
                cache: Some("reload".into()),
                ..FetchOptions::default()
            });
        ic.fetch(desc, init).await.unwrap();

        let (style, method, options) = seen.lock().unwrap().take().unwrap();
        assert_eq!(style, CallStyle::Deferred);
        assert_eq!(method, "POST");
        assert_eq!(options.mode.as_deref(), Some("cors"));
        assert_eq!(options.cache.as_deref(), Some("reload"));

        let sent = &transport.requests()[0];
        assert_eq!(sent.method, http::Method::POST);
        assert_eq!(sent.headers["accept"], "text/html");
        assert_eq!(sent.headers["x-mode"], "init");
    }

    #[tokio::test]
    async fn streaming_body_is_drained_before_hooks() {
        let (ic, transport) = harness();
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        ic.before(
            BeforeHook::sync(move |req| {
                *sink.lock().unwrap() = Some(req.body.to_bytes()?);
                Ok(None)
            }),
            None,
        );

        let chunks = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"ab")),
            Ok(Bytes::from_static(b"cd")),
        ]);
        let mut desc = FetchRequest::new("/upload");
        desc.method = Some("POST".into());
        desc.body = Body::stream(chunks);
        ic.fetch(desc, RequestInit::new()).await.unwrap();

        assert_eq!(seen.lock().unwrap().as_deref(), Some(&b"abcd"[..]));
        assert_eq!(&transport.requests()[0].body[..], b"abcd");
    }

    #[tokio::test]
    async fn need_send_merges_the_transport_response() {
        let (ic, transport) = harness();
        transport.respond(202, vec![("X-Source", "transport"), ("Server", "scripted")], "net");
        ic.before(
            BeforeHook::sync(|_req| {
                Ok(Some(Reply::from(
                    ResponsePatch::new()
                        .text("hook")
                        .header("X-Source", "hook")
                        .need_send(true),
                )))
            }),
            None,
        );
        let observed = Arc::new(Mutex::new(None));
        let sink = observed.clone();
        ic.after(
            AfterHook::sync(move |_req, res| {
                *sink.lock().unwrap() = Some(res.status);
                Ok(())
            }),
            None,
        );

        let res = ic.fetch("/both", RequestInit::new()).await.unwrap();
        assert_eq!(transport.calls(), 1);
        assert_eq!(*observed.lock().unwrap(), Some(202));
        assert_eq!(res.body_text().as_deref(), Some("net"));
        assert_eq!(res.headers.get("x-source"), Some("hook"));
        assert_eq!(res.headers.get("server"), Some("scripted"));
    }

    #[tokio::test]
    async fn transport_failure_reaches_after_hooks_then_fails() {
        let (ic, transport) = harness();
        transport.fail(TransportFailure::Error("connection refused".into()));
        let observed = Arc::new(Mutex::new(None));
        let sink = observed.clone();
        ic.after(
            AfterHook::sync(move |_req, res| {
                *sink.lock().unwrap() = res.error.clone();
                Ok(())
            }),
            None,
        );

        let res = ic.fetch("/down", RequestInit::new()).await;
        assert!(matches!(res, Err(InterceptError::Transport(e)) if e == "connection refused"));
        assert!(observed.lock().unwrap().as_deref().is_some_and(|e| e.contains("connection refused")));
    }

    #[tokio::test]
    async fn signal_aborts_the_call() {
        let (ic, transport) = harness();

        let signal = CancellationToken::new();
        signal.cancel();
        ic.before(BeforeHook::sync(|_req| Ok(None)), None);
        let res = ic.fetch("/never", RequestInit::new().signal(signal)).await;
        assert!(matches!(res, Err(InterceptError::Aborted)));
        assert_eq!(transport.calls(), 0);

        transport.hang();
        let signal = CancellationToken::new();
        let trigger = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let res = ic.fetch("/hang", RequestInit::new().signal(signal)).await;
        assert!(matches!(res, Err(InterceptError::Aborted)));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn redirect_sets_final_url() {
        let (ic, transport) = harness();
        let target = Url::parse("http://test.local/moved").unwrap();
        transport.push(Script::Events(response_events(200, "OK", Headers::new(), target.clone(), "here")));

        let res = ic.fetch("/old", RequestInit::new()).await.unwrap();
        assert_eq!(res.final_url, Some(target));
        assert_eq!(res.body_text().as_deref(), Some("here"));
    }

    #[tokio::test]
    async fn disabled_interceptor_calls_the_transport_directly() {
        let (ic, transport) = harness();
        ic.before(BeforeHook::sync(|_req| Ok(Some(Reply::from("hooked")))), None);
        ic.disable();

        let res = ic.fetch("/plain", RequestInit::new()).await.unwrap();
        assert_eq!(transport.calls(), 1);
        assert_eq!(res.body_text().as_deref(), Some(""));
    }
}
