pub mod config;
pub mod errors;
pub mod events;
pub mod hooks;
pub mod interceptor;
pub mod net;
pub mod xhr;

pub use config::InterceptorConfig;
pub use errors::InterceptError;
pub use events::{listener, Event, EventEmitter, Listener};
pub use hooks::{AfterContinuation, AfterHook, BeforeContinuation, BeforeHook, Channel, Hook, HookRegistry, Reply};
pub use interceptor::{global, CallId, Interceptor};
pub use net::{Body, FetchInput, FetchRequest, Headers, Request, RequestInit, Response, ResponsePatch, ResponseType};
pub use xhr::{ReadyState, XmlHttpRequest};
