//! Hooks and the machinery that runs them.
//!
//! - [`hook`]: hook variants and the continuations handed to suspending hooks
//! - [`registry`]: ordered before/after hook lists
//! - `chain`: runs a snapshot of hooks against one call
pub(crate) mod chain;
pub mod hook;
pub mod registry;

pub use hook::{AfterContinuation, AfterHook, BeforeContinuation, BeforeHook, Channel, Hook, Reply};
pub use registry::HookRegistry;
