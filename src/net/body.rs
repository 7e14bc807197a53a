//! Opaque payloads carried by requests and responses.
//!
//! A [`Body`] is either empty, text, structured JSON, raw bytes or a one-shot
//! stream. Hooks must be able to look at a body more than once, so streaming
//! bodies are drained with [`Body::into_replayable`] before they are handed to
//! a hook chain or the transport.
use crate::errors::InterceptError;
use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use std::borrow::Cow;
use std::fmt;

/// One-shot body stream.
pub type BodyStream = BoxStream<'static, Result<Bytes, std::io::Error>>;

#[derive(Default)]
pub enum Body {
    #[default]
    Empty,
    Text(String),
    Json(serde_json::Value),
    Bytes(Bytes),
    Stream(BodyStream),
}

impl Body {
    /// Wraps a byte stream as a body.
    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static,
    {
        Body::Stream(stream.boxed())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Body::Empty => true,
            Body::Text(s) => s.is_empty(),
            Body::Bytes(b) => b.is_empty(),
            Body::Json(_) | Body::Stream(_) => false,
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Body::Stream(_))
    }

    /// Returns the text of a [`Body::Text`] body.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Body::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Renders the body as text. Bytes are decoded lossily; streams have no text form.
    pub fn to_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Body::Empty => Some(Cow::Borrowed("")),
            Body::Text(s) => Some(Cow::Borrowed(s)),
            Body::Json(v) => Some(Cow::Owned(v.to_string())),
            Body::Bytes(b) => Some(String::from_utf8_lossy(b)),
            Body::Stream(_) => None,
        }
    }

    /// Returns the body as bytes. Streams must be drained first.
    pub fn to_bytes(&self) -> Result<Bytes, InterceptError> {
        match self {
            Body::Empty => Ok(Bytes::new()),
            Body::Text(s) => Ok(Bytes::copy_from_slice(s.as_bytes())),
            Body::Json(v) => serde_json::to_vec(v)
                .map(Bytes::from)
                .map_err(|e| InterceptError::Body(e.to_string())),
            Body::Bytes(b) => Ok(b.clone()),
            Body::Stream(_) => Err(InterceptError::Body(
                "streaming body has not been drained".to_string(),
            )),
        }
    }

    /// Clones every body except a stream.
    pub fn try_clone(&self) -> Option<Body> {
        match self {
            Body::Empty => Some(Body::Empty),
            Body::Text(s) => Some(Body::Text(s.clone())),
            Body::Json(v) => Some(Body::Json(v.clone())),
            Body::Bytes(b) => Some(Body::Bytes(b.clone())),
            Body::Stream(_) => None,
        }
    }

    /// Drains a streaming body into [`Body::Bytes`]. Other bodies are returned as-is.
    pub async fn into_replayable(self) -> Result<Body, InterceptError> {
        match self {
            Body::Stream(mut stream) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk.map_err(|e| InterceptError::Body(e.to_string()))?;
                    buf.extend_from_slice(&chunk);
                }
                Ok(Body::Bytes(buf.freeze()))
            }
            other => Ok(other),
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => write!(f, "Empty"),
            Body::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Body::Json(v) => f.debug_tuple("Json").field(v).finish(),
            Body::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            Body::Stream(_) => write!(f, "Stream(..)"),
        }
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Text(s)
    }
}

impl From<&str> for Body {
    fn from(s: &str) -> Self {
        Body::Text(s.to_string())
    }
}

impl From<Bytes> for Body {
    fn from(b: Bytes) -> Self {
        Body::Bytes(b)
    }
}

impl From<Vec<u8>> for Body {
    fn from(b: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(b))
    }
}

impl From<serde_json::Value> for Body {
    fn from(v: serde_json::Value) -> Self {
        Body::Json(v)
    }
}

impl From<Option<Body>> for Body {
    fn from(b: Option<Body>) -> Self {
        b.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn stream_is_drained_into_bytes() {
        let chunks = vec![
            Ok(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"world")),
        ];
        let body = Body::stream(futures::stream::iter(chunks));
        assert!(body.is_stream());
        assert!(body.to_bytes().is_err());

        let drained = body.into_replayable().await.unwrap();
        assert_eq!(drained.to_bytes().unwrap(), Bytes::from_static(b"hello world"));
        assert_eq!(drained.to_text().as_deref(), Some("hello world"));
    }

    #[tokio::test]
    async fn stream_error_is_reported() {
        let chunks = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::new(std::io::ErrorKind::Other, "broken pipe")),
        ];
        let body = Body::stream(futures::stream::iter(chunks));
        let res = body.into_replayable().await;
        assert!(matches!(res, Err(InterceptError::Body(msg)) if msg.contains("broken pipe")));
    }

    #[test]
    fn text_forms() {
        assert_eq!(Body::from("abc").as_str(), Some("abc"));
        assert_eq!(Body::Empty.to_text().as_deref(), Some(""));
        assert_eq!(
            Body::from(json!({"a": 1})).to_text().as_deref(),
            Some(r#"{"a":1}"#)
        );
        assert!(Body::Empty.is_empty());
        assert!(!Body::from("x").is_empty());
    }

    #[test]
    fn try_clone_refuses_streams() {
        let body = Body::stream(futures::stream::empty());
        assert!(body.try_clone().is_none());
        assert!(Body::from("x").try_clone().is_some());
    }
}
