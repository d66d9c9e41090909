//! Test utilities for courier integration tests.
//!
//! Provides:
//! - A scripted in-process transport and a channel-fed streaming transport
//! - A worker and a bus subscriber that record what they receive
//! - A polling helper for asynchronous delivery

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use courier::http::{StatusCode, Url};
use courier::{
    EventDispatcher, Exchange, HttpRequest, HttpResponse, HttpToken, HttpWorker, TargetId,
    TextEncoding, Transport, TransportError, CHANNEL_HTTP_CACHE_DATA, CHANNEL_HTTP_ERROR,
    CHANNEL_HTTP_RESULT, KEY_CACHE_DATA, KEY_ERROR, KEY_RESPONSE, KEY_RESPONSE_DATA,
    KEY_USER_DATA,
};
use futures::channel::mpsc;
use futures::future::{BoxFuture, FutureExt};
use tokio::sync::Semaphore;

/// What the mock transport does when executed.
#[derive(Clone)]
pub enum Script {
    Respond { status: StatusCode, chunks: Vec<Bytes> },
    Fail(TransportError),
    FailMidBody { chunks: Vec<Bytes>, error: TransportError },
}

/// Transport that replays a [`Script`], optionally held behind a gate.
pub struct MockTransport {
    script: Script,
    gate: Option<Arc<Semaphore>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            gate: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Successful response with the given body chunks.
    pub fn ok(chunks: &[&'static [u8]]) -> Self {
        Self::new(Script::Respond {
            status: StatusCode::OK,
            chunks: chunks.iter().map(|c| Bytes::from_static(*c)).collect(),
        })
    }

    pub fn failing(error: TransportError) -> Self {
        Self::new(Script::Fail(error))
    }

    /// Hold every exchange until [`MockTransport::release`] is called.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<HttpRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

impl Transport for MockTransport {
    fn execute(&self, request: HttpRequest) -> BoxFuture<'static, Result<Exchange, TransportError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let script = self.script.clone();
        let gate = self.gate.clone();
        let url = request.url;

        async move {
            if let Some(gate) = gate {
                let _permit = gate.acquire().await.expect("gate closed");
            }
            match script {
                Script::Respond { status, chunks } => {
                    Ok(Exchange::from_chunks(HttpResponse::new(status, url), chunks))
                }
                Script::Fail(error) => Err(error),
                Script::FailMidBody { chunks, error } => {
                    let items = chunks
                        .into_iter()
                        .map(Ok)
                        .chain(std::iter::once(Err(error)));
                    Ok(Exchange::new(
                        HttpResponse::new(StatusCode::OK, url),
                        futures::stream::iter(items),
                    ))
                }
            }
        }
        .boxed()
    }
}

/// Sender side of a [`StreamingTransport`] body.
pub type ChunkSender = mpsc::UnboundedSender<Result<Bytes, TransportError>>;

/// Transport whose body chunks are pushed by the test as the exchange runs.
///
/// The response head is returned immediately; the body ends when the sender
/// is dropped.
pub struct StreamingTransport {
    body: Mutex<Option<mpsc::UnboundedReceiver<Result<Bytes, TransportError>>>>,
}

impl StreamingTransport {
    pub fn new() -> (Self, ChunkSender) {
        let (tx, rx) = mpsc::unbounded();
        let transport = Self {
            body: Mutex::new(Some(rx)),
        };
        (transport, tx)
    }
}

impl Transport for StreamingTransport {
    fn execute(&self, request: HttpRequest) -> BoxFuture<'static, Result<Exchange, TransportError>> {
        let body = self.body.lock().unwrap().take();
        async move {
            let body = body.ok_or_else(|| TransportError::Request("body already taken".into()))?;
            Ok(Exchange::new(
                HttpResponse::new(StatusCode::OK, request.url),
                body,
            ))
        }
        .boxed()
    }
}

/// A callback observed by [`RecordingWorker`].
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    ShouldUseCache,
    CacheData,
    Result { status: u16, body: String },
    CacheResult(String),
    Fault(TransportError),
}

/// Worker with a fixed cache policy that records every callback.
pub struct RecordingWorker {
    use_cache: bool,
    cached: Option<String>,
    cancel_during_policy: bool,
    events: Mutex<Vec<WorkerEvent>>,
}

impl RecordingWorker {
    pub fn new() -> Arc<Self> {
        Self::with_cache(false, None)
    }

    pub fn with_cache(use_cache: bool, cached: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            use_cache,
            cached: cached.map(str::to_string),
            cancel_during_policy: false,
            events: Mutex::new(Vec::new()),
        })
    }

    /// Worker that cancels the token from inside `should_use_cache`.
    pub fn cancelling() -> Arc<Self> {
        Arc::new(Self {
            use_cache: false,
            cached: None,
            cancel_during_policy: true,
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn events(&self) -> Vec<WorkerEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Events other than the cache policy queries.
    pub fn deliveries(&self) -> Vec<WorkerEvent> {
        self.events()
            .into_iter()
            .filter(|e| !matches!(e, WorkerEvent::ShouldUseCache | WorkerEvent::CacheData))
            .collect()
    }

    fn push(&self, event: WorkerEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl HttpWorker for RecordingWorker {
    fn on_result(&self, token: &HttpToken) {
        let status = token.response().map(|r| r.status.as_u16()).unwrap_or(0);
        let body = token
            .response_string(TextEncoding::Utf8Lossy)
            .unwrap_or_default();
        self.push(WorkerEvent::Result { status, body });
    }

    fn on_fault(&self, token: &HttpToken) {
        let error = token.error().expect("fault without error");
        self.push(WorkerEvent::Fault(error));
    }

    fn should_use_cache(&self, token: &HttpToken) -> bool {
        self.push(WorkerEvent::ShouldUseCache);
        if self.cancel_during_policy {
            token.cancel_request();
        }
        self.use_cache
    }

    fn cache_data(&self, _token: &HttpToken) -> Option<String> {
        self.push(WorkerEvent::CacheData);
        self.cached.clone()
    }

    fn on_cache_result(&self, _token: &HttpToken, cache_data: &str) {
        self.push(WorkerEvent::CacheResult(cache_data.to_string()));
    }
}

/// A notification observed by [`BusRecorder`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BusEvent {
    pub channel: String,
    pub status: Option<u16>,
    pub response_data: Option<Bytes>,
    pub error: Option<TransportError>,
    pub cache_data: Option<String>,
    pub user_data: Option<String>,
}

/// Subscribes to all three HTTP channels on a dispatcher.
pub struct BusRecorder {
    pub target: TargetId,
    events: Arc<Mutex<Vec<BusEvent>>>,
}

impl BusRecorder {
    pub fn attach(dispatcher: &EventDispatcher) -> Self {
        let target = TargetId::new();
        let events = Arc::new(Mutex::new(Vec::new()));

        for channel in [CHANNEL_HTTP_RESULT, CHANNEL_HTTP_ERROR, CHANNEL_HTTP_CACHE_DATA] {
            let sink = Arc::clone(&events);
            dispatcher.subscribe(channel, target, move |n| {
                sink.lock().unwrap().push(BusEvent {
                    channel: n.name().to_string(),
                    status: n
                        .get::<HttpResponse>(KEY_RESPONSE)
                        .map(|r| r.status.as_u16()),
                    response_data: n.get::<Bytes>(KEY_RESPONSE_DATA).cloned(),
                    error: n.get::<TransportError>(KEY_ERROR).cloned(),
                    cache_data: n.get::<String>(KEY_CACHE_DATA).cloned(),
                    user_data: n.get::<String>(KEY_USER_DATA).cloned(),
                });
            });
        }

        Self { target, events }
    }

    pub fn events(&self) -> Vec<BusEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

/// Install the error-level test subscriber.
pub fn init_tracing() {
    courier::observability::tracing::init_test_tracing();
}

pub fn url(path: &str) -> Url {
    Url::parse(&format!("https://example.com{}", path)).unwrap()
}

/// Wait for a condition to become true with timeout.
///
/// # Returns
///
/// `true` if condition was met, `false` if timeout expired
pub async fn wait_for<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Let spawned tasks run for a short while.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
