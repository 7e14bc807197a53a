use crate::xhr::ReadyState;

#[derive(Debug, thiserror::Error)]
pub enum InterceptError {
    #[error("Invalid hook: {0}")]
    InvalidHook(String),

    #[error("Hook failed: {0}")]
    Hook(#[from] anyhow::Error),

    #[error("Hook dropped its continuation without handing back the call")]
    ContinuationLost,

    #[error("Invalid state: expected {expected:?}, found {found:?}")]
    InvalidState { expected: ReadyState, found: ReadyState },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid method: {0}")]
    InvalidMethod(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Body error: {0}")]
    Body(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Request aborted")]
    Aborted,

    #[error("Internal interceptor error")]
    Internal,
}
