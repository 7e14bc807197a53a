//! Request/response models, the fetch adapter and the transport boundary.
pub mod body;
pub mod fetch;
pub mod headers;
pub mod request;
pub mod response;
pub mod transport;

pub use body::Body;
pub use fetch::{FetchInput, FetchRequest, RequestInit};
pub use headers::Headers;
pub use request::{CallStyle, FetchOptions, Request, ResponseType};
pub use response::{Response, ResponsePatch};
pub use transport::{ReqwestTransport, Transport, TransportCall, TransportEvent, TransportFailure, TransportRequest};
