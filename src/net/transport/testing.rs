//! Scripted transport for tests. Records every dispatched request and answers
//! with queued event scripts instead of touching the network.
use crate::net::headers::Headers;
use crate::net::transport::{Transport, TransportCall, TransportEvent, TransportFailure, TransportRequest};
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use url::Url;

pub(crate) enum Script {
    /// Replayed as-is
    Events(Vec<TransportEvent>),
    /// Successful response; the resolved URL is the request URL
    Respond {
        status: u16,
        status_text: &'static str,
        headers: Vec<(&'static str, &'static str)>,
        body: &'static str,
    },
    /// Never answers until cancelled
    Hang,
}

#[derive(Default)]
pub(crate) struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    pub fn respond(&self, status: u16, headers: Vec<(&'static str, &'static str)>, body: &'static str) {
        self.push(Script::Respond {
            status,
            status_text: if status == 200 { "OK" } else { "Scripted" },
            headers,
            body,
        });
    }

    pub fn fail(&self, failure: TransportFailure) {
        self.push(Script::Events(vec![TransportEvent::Failed(failure)]));
    }

    pub fn hang(&self) {
        self.push(Script::Hang);
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }
}

pub(crate) fn response_events(status: u16, status_text: &str, headers: Headers, url: Url, body: &str) -> Vec<TransportEvent> {
    let total = body.len() as u64;
    vec![
        TransportEvent::HeadersReceived {
            status,
            status_text: status_text.to_string(),
            headers,
            url,
        },
        TransportEvent::Progress {
            loaded: total,
            total: Some(total),
        },
        TransportEvent::Done {
            body: Bytes::copy_from_slice(body.as_bytes()),
        },
    ]
}

impl Transport for ScriptedTransport {
    fn dispatch(&self, request: TransportRequest) -> TransportCall {
        let (tx, events) = tokio::sync::mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let url = request.url.clone();
        self.requests.lock().unwrap().push(request);

        let script = self.scripts.lock().unwrap().pop_front().unwrap_or(Script::Respond {
            status: 200,
            status_text: "OK",
            headers: Vec::new(),
            body: "",
        });

        match script {
            Script::Events(list) => {
                for event in list {
                    let _ = tx.send(event);
                }
            }
            Script::Respond {
                status,
                status_text,
                headers,
                body,
            } => {
                let headers: Headers = headers.into_iter().collect();
                for event in response_events(status, status_text, headers, url, body) {
                    let _ = tx.send(event);
                }
            }
            Script::Hang => {
                let token = cancel.clone();
                tokio::spawn(async move {
                    token.cancelled().await;
                    let _ = tx.send(TransportEvent::Failed(TransportFailure::Abort));
                });
            }
        }

        TransportCall { events, cancel }
    }
}
