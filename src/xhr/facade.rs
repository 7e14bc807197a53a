use crate::errors::InterceptError;
use crate::events::{
    Event, EventEmitter, Listener, ERROR_EVENTS, LOAD, LOAD_END, LOAD_START, PROGRESS, READY_STATE_CHANGE,
};
use crate::hooks::chain::{run_after, run_before, BeforeOutcome, Partial};
use crate::interceptor::{CallId, InterceptorContext};
use crate::net::body::Body;
use crate::net::headers::to_block;
use crate::net::request::{Request, ResponseType};
use crate::net::response::ResponsePatch;
use crate::net::transport::{TransportCall, TransportEvent, TransportFailure, TransportRequest};
use crate::xhr::state::{CallState, ReadyState};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct Inner {
    id: CallId,
    ctx: Arc<InterceptorContext>,
    /// Hooks were enabled when the facade was created
    hooked: bool,
    events: EventEmitter,
    upload: EventEmitter,
    state: Mutex<CallState>,
}

/// `XMLHttpRequest`-like call object whose calls run through the hook chains.
///
/// The facade is driven through [`open`](Self::open) and [`send`](Self::send).
/// `send()` resolves once the call has completed, failed or was aborted; the
/// ready state transitions and lifecycle notifications happen on the way, exactly
/// as a native object would emit them. Clones share the same call, so another
/// task can [`abort`](Self::abort) a pending `send()`.
#[derive(Clone)]
pub struct XmlHttpRequest {
    inner: Arc<Inner>,
}

impl fmt::Debug for XmlHttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XmlHttpRequest")
            .field("id", &self.inner.id)
            .field("ready_state", &self.ready_state())
            .field("hooked", &self.inner.hooked)
            .finish_non_exhaustive()
    }
}

impl XmlHttpRequest {
    pub const UNSENT: u8 = ReadyState::UNSENT;
    pub const OPENED: u8 = ReadyState::OPENED;
    pub const HEADERS_RECEIVED: u8 = ReadyState::HEADERS_RECEIVED;
    pub const LOADING: u8 = ReadyState::LOADING;
    pub const DONE: u8 = ReadyState::DONE;

    pub(crate) fn new(ctx: Arc<InterceptorContext>) -> Self {
        let hooked = ctx.is_enabled();
        Self {
            inner: Arc::new(Inner {
                id: CallId::new(),
                ctx,
                hooked,
                events: EventEmitter::new(),
                upload: EventEmitter::new(),
                state: Mutex::new(CallState::default()),
            }),
        }
    }

    pub fn id(&self) -> CallId {
        self.inner.id
    }

    fn lock(&self) -> MutexGuard<'_, CallState> {
        self.inner.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock().is_current(generation)
    }

    // ---------- Call lifecycle ----------

    /// Opens an asynchronous call.
    pub fn open(&self, method: &str, url: &str) -> Result<(), InterceptError> {
        self.open_with(method, url, true, None, None)
    }

    /// Opens a call. Opening again drops whatever the previous attempt was doing.
    pub fn open_with(
        &self,
        method: &str,
        url: &str,
        is_async: bool,
        user: Option<&str>,
        pass: Option<&str>,
    ) -> Result<(), InterceptError> {
        http::Method::from_bytes(method.as_bytes())
            .map_err(|_| InterceptError::InvalidMethod(method.to_string()))?;

        let mut request = Request::new(method, url);
        request.is_async = is_async;
        request.user = user.map(str::to_string);
        request.pass = pass.map(str::to_string);
        request.upload = Some(self.inner.upload.clone());

        let generation = self.lock().reset(request);
        log::debug!("Call[{}]: open {} {} (async: {})", self.inner.id, method, url, is_async);
        self.emit_ready_state(generation, ReadyState::Opened);
        Ok(())
    }

    /// Sends the call and waits until it completed.
    ///
    /// Transport failures are reported through the lifecycle notifications first
    /// and then returned as [`InterceptError::Transport`], [`InterceptError::Timeout`]
    /// or [`InterceptError::Aborted`]. Errors of inline hooks propagate unchanged.
    pub async fn send(&self, body: impl Into<Body>) -> Result<(), InterceptError> {
        let body = body.into().into_replayable().await?;

        let (generation, request, cancel) = {
            let mut st = self.lock();
            if st.ready_state != ReadyState::Opened || st.send_flag {
                return Err(InterceptError::InvalidState {
                    expected: ReadyState::Opened,
                    found: st.ready_state,
                });
            }
            let Some(mut request) = st.request.take() else {
                return Err(InterceptError::Internal);
            };
            st.settings.apply_to(&mut request);
            request.body = body;
            st.send_flag = true;

            let cancel = CancellationToken::new();
            st.cancel = Some(cancel.clone());
            (st.generation, request, cancel)
        };

        let result = self.run(generation, request, &cancel).await;
        if let Err(e) = &result {
            let mut st = self.lock();
            if st.is_current(generation) {
                st.end_attempt();
            }
            drop(st);
            match e {
                InterceptError::Aborted => log::debug!("Call[{}]: aborted", self.inner.id),
                e => log::error!("Call[{}]: send failed: {}", self.inner.id, e),
            }
        }
        result
    }

    async fn run(&self, generation: u64, request: Request, cancel: &CancellationToken) -> Result<(), InterceptError> {
        let request = if self.inner.hooked {
            let hooks = self.inner.ctx.hooks.before_snapshot();
            let outcome = run_before(hooks, request, cancel, |stage, patch| {
                self.apply_partial(generation, stage, patch)
            })
            .await?;

            match outcome {
                BeforeOutcome::Proceed(request) => request,
                BeforeOutcome::Reply(request, patch) => {
                    if !self.apply_reply(generation, patch)? {
                        return self.finish(generation, request, None).await;
                    }
                    log::debug!("Call[{}]: short-circuit asks for the transport as well", self.inner.id);
                    request
                }
            }
        } else {
            request
        };

        let treq = TransportRequest::from_request(&request, &self.inner.ctx.config)?;
        let failure = self
            .transmit(generation, treq, request.response_type, request.mime_override.clone())
            .await?;
        self.finish(generation, request, failure).await
    }

    /// Merges a short-circuit into the response. Returns `need_send`.
    fn apply_reply(&self, generation: u64, patch: ResponsePatch) -> Result<bool, InterceptError> {
        let mut st = self.lock();
        if !st.is_current(generation) {
            return Err(InterceptError::Aborted);
        }
        st.response.merge(patch);
        if st.response.status == 0 {
            st.response.status = self.inner.ctx.config.success_status;
            st.response.status_text = self.inner.ctx.config.success_status_text.clone();
        }
        Ok(st.response.need_send)
    }

    fn apply_partial(&self, generation: u64, stage: Partial, patch: ResponsePatch) {
        {
            let mut st = self.lock();
            if !st.is_current(generation) {
                return;
            }
            st.response.merge(patch);
        }
        let target = match stage {
            Partial::Head => ReadyState::HeadersReceived,
            Partial::Progress => ReadyState::Loading,
        };
        self.emit_ready_state(generation, target);
    }

    /// Hands the request to the transport and mirrors its lifecycle until it ends.
    /// Returns the failure the transport ended with, if any.
    async fn transmit(
        &self,
        generation: u64,
        treq: TransportRequest,
        response_type: ResponseType,
        mime_override: Option<String>,
    ) -> Result<Option<TransportFailure>, InterceptError> {
        let requested = treq.url.clone();
        log::debug!("Call[{}]: {} {} handed to the transport", self.inner.id, treq.method, requested);

        let TransportCall { mut events, cancel } = self.inner.ctx.transport.dispatch(treq);
        {
            let mut st = self.lock();
            if !st.is_current(generation) {
                cancel.cancel();
                return Err(InterceptError::Aborted);
            }
            st.transport_cancel = Some(cancel);
        }

        let failure = loop {
            let Some(event) = events.recv().await else {
                break Some(TransportFailure::Error("transport closed the call without an answer".to_string()));
            };
            if !self.is_current(generation) {
                return Err(InterceptError::Aborted);
            }

            match event {
                TransportEvent::Upload(ev) => self.inner.upload.dispatch_event(&ev),
                TransportEvent::HeadersReceived {
                    status,
                    status_text,
                    headers,
                    url,
                } => {
                    {
                        let mut st = self.lock();
                        st.read_head(status, &status_text, &headers);
                        st.read_url(Some(&requested), url);
                    }
                    self.emit_ready_state(generation, ReadyState::HeadersReceived);
                }
                TransportEvent::Progress { loaded, total } => {
                    self.dispatch_event(&Event::progress(PROGRESS, loaded, total));
                }
                TransportEvent::Done { body } => {
                    let mut st = self.lock();
                    st.read_body(body, response_type, mime_override.as_deref());
                    st.transport_cancel = None;
                    break None;
                }
                TransportEvent::Failed(failure) => {
                    let mut st = self.lock();
                    if st.aborted {
                        st.response.status = 0;
                    }
                    st.transport_cancel = None;
                    break Some(failure);
                }
            }
        };

        Ok(failure)
    }

    /// Runs the after-chain, replays up to `DONE` and emits the final notifications.
    async fn finish(
        &self,
        generation: u64,
        request: Request,
        failure: Option<TransportFailure>,
    ) -> Result<(), InterceptError> {
        let response = {
            let mut st = self.lock();
            if !st.is_current(generation) {
                return Err(InterceptError::Aborted);
            }
            std::mem::take(&mut st.response)
        };

        let (request, response) = if self.inner.hooked {
            run_after(self.inner.ctx.hooks.after_snapshot(), request, response).await?
        } else {
            (request, response)
        };

        {
            let mut st = self.lock();
            if !st.is_current(generation) {
                return Err(InterceptError::Aborted);
            }
            st.response = response;
        }

        self.emit_ready_state(generation, ReadyState::Done);
        if let Some(failure) = &failure {
            log::warn!("Call[{}]: {} {} ended with {:?}", self.inner.id, request.method, request.url, failure);
            self.dispatch_event(&Event::new(failure.event_name()));
        }
        if request.is_async {
            tokio::task::yield_now().await;
        }
        if !self.emit_final(generation) {
            return Err(InterceptError::Aborted);
        }

        match failure {
            Some(failure) => Err(failure.into()),
            None => Ok(()),
        }
    }

    /// Aborts the call.
    ///
    /// While the transport is engaged the abort is forwarded and the transport's
    /// abort notification completes the call. Otherwise `abort` and `loadend`
    /// are emitted right away, a pending `send()` returns
    /// [`InterceptError::Aborted`] and the call returns to `UNSENT`. An opened
    /// call that was never sent has to be opened again before it can be sent.
    pub fn abort(&self) {
        let synthesized = {
            let mut st = self.lock();
            st.aborted = true;
            st.response.status = 0;
            st.view.status = 0;

            if let Some(token) = st.transport_cancel.clone() {
                token.cancel();
                None
            } else if st.send_flag {
                if let Some(token) = st.cancel.take() {
                    token.cancel();
                }
                st.generation += 1;
                st.send_flag = false;
                Some(st.generation)
            } else if st.ready_state == ReadyState::Opened {
                st.request = None;
                Some(st.generation)
            } else {
                if st.ready_state == ReadyState::Done {
                    st.ready_state = ReadyState::Unsent;
                }
                None
            }
        };

        if let Some(generation) = synthesized {
            log::debug!("Call[{}]: aborted before reaching the transport", self.inner.id);
            self.dispatch_event(&Event::new(crate::events::ABORT));
            self.inner.events.fire(LOAD_END);
            let mut st = self.lock();
            if st.is_current(generation) {
                st.ready_state = ReadyState::Unsent;
            }
        }
    }

    // ---------- Ready state replay ----------

    /// Advances to `target`, replaying every state in between.
    fn emit_ready_state(&self, generation: u64, target: ReadyState) {
        loop {
            let entered = {
                let mut st = self.lock();
                if !st.is_current(generation) || st.ready_state >= target || st.ready_state == ReadyState::Done {
                    break;
                }
                let next = st.ready_state.next();
                st.ready_state = next;
                match next {
                    ReadyState::HeadersReceived => st.write_head(),
                    ReadyState::Done => {
                        st.write_head();
                        st.write_body();
                    }
                    _ => {}
                }
                next
            };

            if entered == ReadyState::Opened {
                self.inner.events.fire(LOAD_START);
            }
            self.inner.events.fire(READY_STATE_CHANGE);
        }
    }

    /// Emits `load` and `loadend`. Returns `false` when the attempt was
    /// superseded before that.
    fn emit_final(&self, generation: u64) -> bool {
        let has_error = {
            let st = self.lock();
            if !st.is_current(generation) {
                return false;
            }
            st.has_error
        };

        if !has_error {
            self.inner.events.fire(LOAD);
        }
        self.inner.events.fire(LOAD_END);

        let mut st = self.lock();
        if st.is_current(generation) {
            st.send_flag = false;
            st.cancel = None;
            if st.has_error {
                st.ready_state = ReadyState::Unsent;
            }
        }
        true
    }

    // ---------- Events ----------

    /// Dispatches an event on the facade. Error events mark the call as failed, a
    /// progress event moves the call to `LOADING` (or repeats `readystatechange`
    /// once it is there).
    pub fn dispatch_event(&self, event: &Event) {
        if ERROR_EVENTS.contains(&event.kind.as_str()) {
            self.lock().has_error = true;
        }
        if event.kind == PROGRESS {
            let (generation, current) = {
                let st = self.lock();
                (st.generation, st.ready_state)
            };
            if current < ReadyState::Loading {
                self.emit_ready_state(generation, ReadyState::Loading);
            } else if current < ReadyState::Done {
                self.inner.events.fire(READY_STATE_CHANGE);
            }
        }
        self.inner.events.dispatch_event(event);
    }

    pub fn add_event_listener(&self, event: &str, listener: Listener, position: Option<usize>) {
        self.inner.events.add_event_listener(event, listener, position);
    }

    pub fn remove_event_listener(&self, event: &str, listener: &Listener) -> bool {
        self.inner.events.remove_event_listener(event, listener)
    }

    /// Sets the `on<event>` handler slot, e.g. `set_handler("load", ..)` for `onload`.
    pub fn set_handler(&self, event: &str, handler: Option<Listener>) {
        self.inner.events.set_handler(event, handler);
    }

    pub fn events(&self) -> &EventEmitter {
        &self.inner.events
    }

    /// Upload progress channel.
    pub fn upload(&self) -> &EventEmitter {
        &self.inner.upload
    }

    // ---------- Request side ----------

    /// Sets a request header. Repeated names accumulate under the first spelling.
    pub fn set_request_header(&self, name: &str, value: &str) -> Result<(), InterceptError> {
        let mut st = self.lock();
        if st.ready_state != ReadyState::Opened || st.send_flag {
            return Err(InterceptError::InvalidState {
                expected: ReadyState::Opened,
                found: st.ready_state,
            });
        }
        let request = st.request.as_mut().ok_or(InterceptError::Internal)?;
        request.set_header(name, value);
        Ok(())
    }

    pub fn response_type(&self) -> ResponseType {
        self.lock().settings.response_type
    }

    pub fn set_response_type(&self, response_type: ResponseType) -> Result<(), InterceptError> {
        let mut st = self.lock();
        if st.ready_state >= ReadyState::Loading {
            return Err(InterceptError::InvalidState {
                expected: ReadyState::HeadersReceived,
                found: st.ready_state,
            });
        }
        st.settings.response_type = response_type;
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.lock().settings.timeout
    }

    pub fn set_timeout(&self, timeout: Option<Duration>) {
        self.lock().settings.timeout = timeout;
    }

    pub fn with_credentials(&self) -> bool {
        self.lock().settings.with_credentials
    }

    pub fn set_with_credentials(&self, on: bool) -> Result<(), InterceptError> {
        let mut st = self.lock();
        if st.ready_state > ReadyState::Opened || st.send_flag {
            return Err(InterceptError::InvalidState {
                expected: ReadyState::Opened,
                found: st.ready_state,
            });
        }
        st.settings.with_credentials = on;
        Ok(())
    }

    pub fn override_mime_type(&self, mime: &str) -> Result<(), InterceptError> {
        let mut st = self.lock();
        if st.ready_state >= ReadyState::Loading {
            return Err(InterceptError::InvalidState {
                expected: ReadyState::HeadersReceived,
                found: st.ready_state,
            });
        }
        st.settings.mime_override = Some(mime.to_string());
        Ok(())
    }

    // ---------- Response side ----------

    pub fn ready_state(&self) -> ReadyState {
        self.lock().ready_state
    }

    pub fn status(&self) -> u16 {
        self.lock().view.status
    }

    pub fn status_text(&self) -> String {
        self.lock().view.status_text.clone()
    }

    /// Body in the form the response type asked for.
    pub fn response(&self) -> Option<Body> {
        self.lock().view.data.as_ref().and_then(Body::try_clone)
    }

    pub fn response_text(&self) -> String {
        self.lock().view.text.clone()
    }

    pub fn response_xml(&self) -> Option<String> {
        self.lock().view.xml.clone()
    }

    pub fn response_url(&self) -> String {
        self.lock().view.url.clone()
    }

    pub fn get_response_header(&self, name: &str) -> Option<String> {
        self.lock().response.headers.get(name).map(str::to_string)
    }

    /// All response headers as a CRLF separated block with lower-cased names.
    pub fn get_all_response_headers(&self) -> String {
        to_block(&self.lock().response.headers)
    }
}
