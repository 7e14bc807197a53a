//! Stateful call style.
//!
//! [`XmlHttpRequest`] mirrors the native `XMLHttpRequest` object: it is opened,
//! configured and sent, moves through the [`ReadyState`]s and emits lifecycle
//! notifications. Every call runs through the interceptor's hook chains, and the
//! decisions of those chains (short-circuits, partial responses, need-send) are
//! replayed as ordinary ready-state transitions.
//!
//! ```no_run
//! # async fn demo() -> Result<(), gosub_net_hooks::InterceptError> {
//! use gosub_net_hooks::{global, Body};
//!
//! let xhr = global().xhr();
//! xhr.open("GET", "https://example.com/")?;
//! xhr.send(Body::Empty).await?;
//! println!("{} {}", xhr.status(), xhr.response_text());
//! # Ok(()) }
//! ```
mod facade;
pub mod state;

pub use facade::XmlHttpRequest;
pub use state::ReadyState;
