use crate::config::InterceptorConfig;
use crate::errors::InterceptError;
use crate::events::{Event, LOAD, LOAD_END, LOAD_START, PROGRESS};
use crate::net::headers::Headers;
use crate::net::transport::{Transport, TransportCall, TransportEvent, TransportFailure, TransportRequest};
use bytes::BytesMut;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

/// [`Transport`] backed by a `reqwest` client.
///
/// Every dispatched call runs on its own tokio task. The body is read chunk by
/// chunk so progress can be reported while it arrives.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &InterceptorConfig) -> Result<Self, InterceptError> {
        let mut builder = reqwest::Client::builder()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects));
        if let Some(ua) = &config.user_agent {
            builder = builder.user_agent(ua.as_str());
        }
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| InterceptError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    /// Uses an already configured client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for ReqwestTransport {
    fn dispatch(&self, request: TransportRequest) -> TransportCall {
        let (tx, events) = tokio::sync::mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let client = self.client.clone();
        let token = cancel.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => Err(TransportFailure::Abort),
                res = perform(client, request, &tx) => res,
            };
            if let Err(failure) = result {
                log::debug!("transport call failed: {:?}", failure);
                let _ = tx.send(TransportEvent::Failed(failure));
            }
        });

        TransportCall { events, cancel }
    }
}

fn classify(e: reqwest::Error) -> TransportFailure {
    if e.is_timeout() {
        TransportFailure::Timeout
    } else {
        TransportFailure::Error(e.to_string())
    }
}

async fn perform(
    client: reqwest::Client,
    request: TransportRequest,
    tx: &UnboundedSender<TransportEvent>,
) -> Result<(), TransportFailure> {
    // Sends to a closed channel are fine: the caller stopped listening.
    let emit = |event: TransportEvent| {
        let _ = tx.send(event);
    };

    let upload_size = request.body.len() as u64;
    let mut builder = client
        .request(request.method, request.url)
        .headers(request.headers);
    if let Some(user) = request.user {
        builder = builder.basic_auth(user, request.pass);
    }
    if let Some(timeout) = request.timeout {
        builder = builder.timeout(timeout);
    }
    if upload_size > 0 {
        builder = builder.body(request.body);
        emit(TransportEvent::Upload(Event::progress(LOAD_START, 0, Some(upload_size))));
    }

    let mut res = builder.send().await.map_err(classify)?;

    if upload_size > 0 {
        for kind in [PROGRESS, LOAD, LOAD_END] {
            emit(TransportEvent::Upload(Event::progress(kind, upload_size, Some(upload_size))));
        }
    }

    let status = res.status();
    emit(TransportEvent::HeadersReceived {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or("Unknown").to_string(),
        headers: Headers::from_header_map(res.headers()),
        url: res.url().clone(),
    });

    let total = res.content_length();
    let mut body = BytesMut::new();
    while let Some(chunk) = res.chunk().await.map_err(classify)? {
        body.extend_from_slice(&chunk);
        emit(TransportEvent::Progress {
            loaded: body.len() as u64,
            total,
        });
    }

    emit(TransportEvent::Done { body: body.freeze() });
    Ok(())
}
