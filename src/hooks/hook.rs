//! Hook values and the continuations handed to suspending hooks.
//!
//! Every hook is one of a fixed set of variants, picked when the hook is
//! built:
//!
//! | Variant | Receives | Runs |
//! |---|---|---|
//! | [`BeforeHook::Sync`] | `&mut Request` | inline, its return value may short-circuit |
//! | [`BeforeHook::Async`] | [`BeforeContinuation`] | until the continuation is resolved |
//! | [`AfterHook::Sync`] | `&Request, &mut Response` | inline |
//! | [`AfterHook::Async`] | [`AfterContinuation`] | until the continuation is resolved |
//!
//! Suspending hooks only run on asynchronous calls. On a synchronous call the
//! chain skips them.
//!
//! Hooks are shared behind an `Arc`. Two hooks are "the same" only when they
//! point at the same allocation, which is what registration de-duplication and
//! removal use.
use crate::net::request::Request;
use crate::net::response::{Response, ResponsePatch};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

pub type SyncBeforeFn = dyn Fn(&mut Request) -> anyhow::Result<Option<Reply>> + Send + Sync;
pub type AsyncBeforeFn = dyn Fn(BeforeContinuation) + Send + Sync;
pub type SyncAfterFn = dyn Fn(&Request, &mut Response) -> anyhow::Result<()> + Send + Sync;
pub type AsyncAfterFn = dyn Fn(AfterContinuation) + Send + Sync;

/// Hook list a hook is registered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Before,
    After,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Before => write!(f, "before"),
            Channel::After => write!(f, "after"),
        }
    }
}

/// Short-circuit value produced by a before-hook.
#[derive(Debug)]
pub enum Reply {
    /// Plain text body
    Text(String),
    /// Response fields merged into the response model
    Response(ResponsePatch),
}

impl Reply {
    pub(crate) fn into_patch(self) -> ResponsePatch {
        match self {
            Reply::Text(text) => ResponsePatch::from_text(text),
            Reply::Response(patch) => patch.with_data_from_text(),
        }
    }
}

impl From<&str> for Reply {
    fn from(s: &str) -> Self {
        Reply::Text(s.to_string())
    }
}

impl From<String> for Reply {
    fn from(s: String) -> Self {
        Reply::Text(s)
    }
}

impl From<ResponsePatch> for Reply {
    fn from(p: ResponsePatch) -> Self {
        Reply::Response(p)
    }
}

fn same_allocation<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Hook running before the transport is called.
#[derive(Clone)]
pub enum BeforeHook {
    Sync(Arc<SyncBeforeFn>),
    Async(Arc<AsyncBeforeFn>),
}

impl BeforeHook {
    /// Inline hook. Returning `Some(reply)` short-circuits the call.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&mut Request) -> anyhow::Result<Option<Reply>> + Send + Sync + 'static,
    {
        BeforeHook::Sync(Arc::new(f))
    }

    /// Suspending hook. The chain waits until the continuation is resolved.
    pub fn with_continuation<F>(f: F) -> Self
    where
        F: Fn(BeforeContinuation) + Send + Sync + 'static,
    {
        BeforeHook::Async(Arc::new(f))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, BeforeHook::Async(_))
    }

    /// True when both values refer to the same hook.
    pub fn same(&self, other: &BeforeHook) -> bool {
        match (self, other) {
            (BeforeHook::Sync(a), BeforeHook::Sync(b)) => same_allocation(a, b),
            (BeforeHook::Async(a), BeforeHook::Async(b)) => same_allocation(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for BeforeHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BeforeHook::Sync(h) => write!(f, "BeforeHook::Sync({:p})", Arc::as_ptr(h) as *const ()),
            BeforeHook::Async(h) => write!(f, "BeforeHook::Async({:p})", Arc::as_ptr(h) as *const ()),
        }
    }
}

/// Hook running once a response is available.
#[derive(Clone)]
pub enum AfterHook {
    Sync(Arc<SyncAfterFn>),
    Async(Arc<AsyncAfterFn>),
}

impl AfterHook {
    /// Inline hook that may change the response.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&Request, &mut Response) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        AfterHook::Sync(Arc::new(f))
    }

    /// Suspending hook. Skipped on synchronous calls.
    pub fn with_continuation<F>(f: F) -> Self
    where
        F: Fn(AfterContinuation) + Send + Sync + 'static,
    {
        AfterHook::Async(Arc::new(f))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, AfterHook::Async(_))
    }

    pub fn same(&self, other: &AfterHook) -> bool {
        match (self, other) {
            (AfterHook::Sync(a), AfterHook::Sync(b)) => same_allocation(a, b),
            (AfterHook::Async(a), AfterHook::Async(b)) => same_allocation(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for AfterHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AfterHook::Sync(h) => write!(f, "AfterHook::Sync({:p})", Arc::as_ptr(h) as *const ()),
            AfterHook::Async(h) => write!(f, "AfterHook::Async({:p})", Arc::as_ptr(h) as *const ()),
        }
    }
}

/// Either kind of hook, for registration through a [`Channel`].
#[derive(Debug, Clone)]
pub enum Hook {
    Before(BeforeHook),
    After(AfterHook),
}

impl Hook {
    /// Channel this hook can be registered on.
    pub fn channel(&self) -> Channel {
        match self {
            Hook::Before(_) => Channel::Before,
            Hook::After(_) => Channel::After,
        }
    }
}

impl From<BeforeHook> for Hook {
    fn from(h: BeforeHook) -> Self {
        Hook::Before(h)
    }
}

impl From<AfterHook> for Hook {
    fn from(h: AfterHook) -> Self {
        Hook::After(h)
    }
}

pub(crate) enum BeforeStep {
    Head(ResponsePatch),
    Progress(ResponsePatch),
    Next(Request),
    Respond(Request, Reply),
    Dropped(Request),
}

/// Handle given to a suspending before-hook.
///
/// The continuation owns the request while the hook is suspended. Resolve it
/// with [`next`](Self::next) or [`respond`](Self::respond); in between, the hook
/// may stream a response with [`head`](Self::head) and
/// [`progress`](Self::progress). Dropping an unresolved continuation continues
/// the chain.
pub struct BeforeContinuation {
    request: Request,
    tx: Option<mpsc::UnboundedSender<BeforeStep>>,
}

impl BeforeContinuation {
    pub(crate) fn new(request: Request, tx: mpsc::UnboundedSender<BeforeStep>) -> Self {
        Self {
            request,
            tx: Some(tx),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    /// Continues with the next hook (or the transport).
    pub fn next(mut self) {
        let request = std::mem::take(&mut self.request);
        self.resolve(BeforeStep::Next(request));
    }

    /// Short-circuits the call with a text body or response fields.
    pub fn respond(mut self, reply: impl Into<Reply>) {
        let request = std::mem::take(&mut self.request);
        self.resolve(BeforeStep::Respond(request, reply.into()));
    }

    /// Provides response headers. The call advances to `HEADERS_RECEIVED`.
    pub fn head(&self, patch: ResponsePatch) {
        self.send(BeforeStep::Head(patch));
    }

    /// Provides partial response data. The call advances to `LOADING`.
    pub fn progress(&self, patch: ResponsePatch) {
        self.send(BeforeStep::Progress(patch));
    }

    fn send(&self, step: BeforeStep) {
        if let Some(tx) = &self.tx {
            // The receiver is gone once the call was aborted; nothing left to tell.
            let _ = tx.send(step);
        }
    }

    fn resolve(&mut self, step: BeforeStep) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(step);
        }
    }
}

impl Drop for BeforeContinuation {
    fn drop(&mut self) {
        if self.tx.is_some() {
            let request = std::mem::take(&mut self.request);
            self.resolve(BeforeStep::Dropped(request));
        }
    }
}

impl fmt::Debug for BeforeContinuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeforeContinuation")
            .field("method", &self.request.method)
            .field("url", &self.request.url)
            .field("resolved", &self.tx.is_none())
            .finish()
    }
}

/// Handle given to a suspending after-hook. Owns request and response until
/// [`next`](Self::next) is called or the handle is dropped.
pub struct AfterContinuation {
    request: Request,
    response: Response,
    tx: Option<oneshot::Sender<(Request, Response)>>,
}

impl AfterContinuation {
    pub(crate) fn new(
        request: Request,
        response: Response,
        tx: oneshot::Sender<(Request, Response)>,
    ) -> Self {
        Self {
            request,
            response,
            tx: Some(tx),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    /// Hands the (possibly changed) response back to the chain.
    pub fn next(mut self) {
        self.resolve();
    }

    fn resolve(&mut self) {
        if let Some(tx) = self.tx.take() {
            let request = std::mem::take(&mut self.request);
            let response = std::mem::take(&mut self.response);
            let _ = tx.send((request, response));
        }
    }
}

impl Drop for AfterContinuation {
    fn drop(&mut self) {
        if self.tx.is_some() {
            log::warn!(
                "after-hook dropped its continuation for {} {}; continuing",
                self.request.method,
                self.request.url
            );
            self.resolve();
        }
    }
}

impl fmt::Debug for AfterContinuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AfterContinuation")
            .field("url", &self.request.url)
            .field("status", &self.response.status)
            .field("resolved", &self.tx.is_none())
            .finish()
    }
}
