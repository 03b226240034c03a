//! In-memory transports for driving `HttpClient` without a network.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use shaped_http::{AttemptOutcome, HttpMethod, HttpResponse, RequestConfig, Transport};

/// Replays a fixed script of outcomes, one per call. Once the script runs
/// out the last outcome repeats.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<AttemptOutcome>>,
    last: Mutex<Option<AttemptOutcome>>,
    calls: AtomicUsize,
    methods: Mutex<Vec<HttpMethod>>,
}

impl ScriptedTransport {
    pub fn new(script: impl IntoIterator<Item = AttemptOutcome>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
            methods: Mutex::new(Vec::new()),
        }
    }

    /// Same outcome on every call.
    pub fn always(outcome: AttemptOutcome) -> Self {
        Self::new([outcome])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn methods(&self) -> Vec<HttpMethod> {
        self.methods.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &RequestConfig) -> AttemptOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.methods.lock().unwrap().push(request.method);
        let next = self.script.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        match next {
            Some(outcome) => {
                *last = Some(outcome.clone());
                outcome
            }
            None => last.clone().expect("script must not be empty"),
        }
    }
}

/// Counts calls and never completes.
#[derive(Default)]
pub struct HangingTransport {
    calls: AtomicUsize,
}

impl HangingTransport {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for HangingTransport {
    async fn send(&self, _request: &RequestConfig) -> AttemptOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

pub fn status(code: u16) -> AttemptOutcome {
    AttemptOutcome::Success(HttpResponse::new(code, ""))
}

pub fn json(code: u16, body: &str) -> AttemptOutcome {
    AttemptOutcome::Success(
        HttpResponse::new(code, body).with_header("content-type", "application/json"),
    )
}

pub fn network() -> AttemptOutcome {
    AttemptOutcome::network("connection refused")
}
