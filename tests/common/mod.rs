//! Shared test transports.

#![allow(dead_code)]

use async_trait::async_trait;
use indexmap::IndexMap;
use routebind::transport::ChunkSink;
use routebind::{Response, ResponseHead, Transport, TransportError, TransportRequest};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// One step of a scripted exchange: a canned response or a transport
/// failure.
pub enum Step {
    Respond(Response),
    Fail(TransportError),
}

/// A transport that replays a fixed script of outcomes and records every
/// request it saw. Used where wiremock cannot produce the failure, e.g.
/// connection-reset sequences.
pub struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<TransportRequest>>,
}

impl ScriptedTransport {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_step(&self, request: TransportRequest) -> Step {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        self.steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Step::Respond(ok_json("{}")))
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn perform_request(&self, request: TransportRequest) -> routebind::Result<Response> {
        match self.next_step(request) {
            Step::Respond(response) => Ok(response),
            Step::Fail(error) => Err(error.into()),
        }
    }

    async fn perform_streaming_request(
        &self,
        request: TransportRequest,
        on_chunk: ChunkSink<'_>,
    ) -> routebind::Result<ResponseHead> {
        match self.next_step(request) {
            Step::Respond(response) => {
                let head = response.head();
                // Deliver the body in two chunks to exercise reassembly.
                let bytes = response.body.as_bytes();
                let mid = bytes.len() / 2;
                for chunk in [&bytes[..mid], &bytes[mid..]] {
                    if !chunk.is_empty() {
                        on_chunk(&head, chunk)?;
                    }
                }
                Ok(head)
            }
            Step::Fail(error) => Err(error.into()),
        }
    }
}

/// Opt-in log output for debugging a failing test: RUST_LOG=debug.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

pub fn ok_json(body: &str) -> Response {
    let mut headers = IndexMap::new();
    headers.insert("content-type".to_string(), "application/json".to_string());
    Response {
        status: 200,
        headers,
        body: body.to_string(),
    }
}

pub fn status_response(status: u16, body: &str) -> Response {
    Response {
        status,
        headers: IndexMap::new(),
        body: body.to_string(),
    }
}
