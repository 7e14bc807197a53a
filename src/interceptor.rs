//! The interceptor: hook registration, enable/disable and the two call styles.
//!
//! An [`Interceptor`] owns a [`HookRegistry`], a [`Transport`] and its
//! configuration. Cloning it is cheap and every clone shares the same hooks.
//! Most programs only need the process-wide instance returned by [`global()`].
//!
//! ```no_run
//! # async fn demo() -> Result<(), gosub_net_hooks::InterceptError> {
//! use gosub_net_hooks::{global, BeforeHook, Reply, RequestInit};
//!
//! global().before(BeforeHook::sync(|req| {
//!     Ok(req.url.ends_with("/ping").then(|| Reply::from("pong")))
//! }), None);
//!
//! let res = global().fetch("https://example.com/ping", RequestInit::new()).await?;
//! assert_eq!(res.body_text().as_deref(), Some("pong"));
//! # Ok(()) }
//! ```
use crate::config::InterceptorConfig;
use crate::errors::InterceptError;
use crate::hooks::hook::{AfterHook, BeforeHook, Channel, Hook};
use crate::hooks::registry::HookRegistry;
use crate::net::fetch::{self, FetchInput, RequestInit};
use crate::net::response::Response;
use crate::net::transport::{ReqwestTransport, Transport};
use crate::xhr::XmlHttpRequest;
use lazy_static::lazy_static;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Identifier of a single call, used in log lines.
///
/// Internally a `CallId` wraps a [`Uuid`]; treat it as an opaque handle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(Uuid);

impl CallId {
    /// Create a new unique `CallId` using a random UUID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State shared by an interceptor and every call it created.
pub(crate) struct InterceptorContext {
    pub hooks: HookRegistry,
    pub transport: Arc<dyn Transport>,
    pub config: InterceptorConfig,
    enabled: AtomicBool,
}

impl InterceptorContext {
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct Interceptor {
    ctx: Arc<InterceptorContext>,
}

impl fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor")
            .field("enabled", &self.is_enabled())
            .field("hooks", &self.ctx.hooks)
            .finish_non_exhaustive()
    }
}

impl Interceptor {
    pub fn new(config: InterceptorConfig, transport: Arc<dyn Transport>) -> Self {
        let enabled = AtomicBool::new(config.enabled);
        Self {
            ctx: Arc::new(InterceptorContext {
                hooks: HookRegistry::new(),
                transport,
                config,
                enabled,
            }),
        }
    }

    /// Interceptor using a [`ReqwestTransport`] built from `config`.
    pub fn with_reqwest(config: InterceptorConfig) -> Result<Self, InterceptError> {
        let transport = ReqwestTransport::new(&config)?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    // ---------- Registration ----------

    /// Adds a before-hook at `position` (default: end).
    pub fn before(&self, hook: BeforeHook, position: Option<usize>) {
        self.ctx.hooks.register_before(hook, position);
    }

    /// Adds an after-hook at `position` (default: end).
    pub fn after(&self, hook: AfterHook, position: Option<usize>) {
        self.ctx.hooks.register_after(hook, position);
    }

    /// Adds a hook to a channel chosen at runtime. Fails with
    /// [`InterceptError::InvalidHook`] when the hook does not belong to `channel`.
    pub fn register(&self, channel: Channel, hook: impl Into<Hook>, position: Option<usize>) -> Result<(), InterceptError> {
        self.ctx.hooks.register(channel, hook, position)
    }

    /// Removes one before-hook, or all of them when `hook` is `None`.
    pub fn remove_before(&self, hook: Option<&BeforeHook>) -> usize {
        let hook = hook.cloned().map(Hook::Before);
        self.ctx.hooks.unregister(Some(Channel::Before), hook.as_ref())
    }

    /// Removes one after-hook, or all of them when `hook` is `None`.
    pub fn remove_after(&self, hook: Option<&AfterHook>) -> usize {
        let hook = hook.cloned().map(Hook::After);
        self.ctx.hooks.unregister(Some(Channel::After), hook.as_ref())
    }

    pub fn remove_all(&self) {
        self.ctx.hooks.clear();
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.ctx.hooks
    }

    // ---------- Enable / disable ----------

    pub fn enable(&self) {
        self.ctx.enabled.store(true, Ordering::SeqCst);
        log::debug!("interceptor enabled");
    }

    /// Calls started afterwards skip the hook chains. Registered hooks are kept.
    pub fn disable(&self) {
        self.ctx.enabled.store(false, Ordering::SeqCst);
        log::debug!("interceptor disabled");
    }

    pub fn is_enabled(&self) -> bool {
        self.ctx.is_enabled()
    }

    // ---------- Calls ----------

    /// Creates a stateful call object. Whether its calls are hooked is decided now.
    pub fn xhr(&self) -> XmlHttpRequest {
        XmlHttpRequest::new(self.ctx.clone())
    }

    /// Performs a deferred-result call.
    pub async fn fetch(&self, input: impl Into<FetchInput>, init: RequestInit) -> Result<Response, InterceptError> {
        fetch::fetch(&self.ctx, input.into(), init).await
    }

    /// The native transport, for calls that must bypass every hook.
    pub fn transport(&self) -> Arc<dyn Transport> {
        self.ctx.transport.clone()
    }

    pub fn config(&self) -> &InterceptorConfig {
        &self.ctx.config
    }
}

lazy_static! {
    static ref GLOBAL: Interceptor = {
        let config = InterceptorConfig::default();
        let transport = ReqwestTransport::new(&config).unwrap_or_else(|e| {
            log::error!("cannot configure the default transport, using a plain client: {}", e);
            ReqwestTransport::default()
        });
        Interceptor::new(config, Arc::new(transport))
    };
}

/// Process-wide interceptor backed by [`ReqwestTransport`].
pub fn global() -> &'static Interceptor {
    &GLOBAL
}
