//! Request token: one HTTP request's lifecycle.
//!
//! ```text
//! Idle ──start──▶ CacheCheck ──hit──▶ CacheServed
//!   │                 │ denied / miss
//!   │ (no worker)     ▼
//!   └──────────▶ Requesting ──▶ Completed | Failed
//!                     │
//!              cancel_request ──▶ Cancelled
//! ```
//!
//! Every outcome is delivered exactly once, either to the bound
//! [`HttpWorker`] or, when none was bound, on the notification bus channels
//! [`CHANNEL_HTTP_RESULT`] and [`CHANNEL_HTTP_ERROR`]. Cancellation is
//! terminal and suppresses delivery, including results the transport has
//! already produced but the token has not yet delivered.

mod exchange;
pub mod worker;

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::encoding::TextEncoding;
use crate::error::{Result, TokenError, TransportError};
use crate::flow::dispatch::{EventDispatcher, NotificationData};
use crate::http::{HttpRequest, HttpResponse, ReqwestTransport, Transport, Url};
use crate::observability::metrics::{record_exchange, record_outcome, record_token_started};

pub use worker::HttpWorker;

/// Published on network success when no worker is bound.
pub const CHANNEL_HTTP_RESULT: &str = "httpResult";
/// Published on network failure when no worker is bound.
pub const CHANNEL_HTTP_ERROR: &str = "httpError";
/// Published on cache hits when [`TokenBuilder::broadcast_cache_hits`] is set.
pub const CHANNEL_HTTP_CACHE_DATA: &str = "httpCacheData";

/// [`HttpResponse`] metadata.
pub const KEY_RESPONSE: &str = "response";
/// Raw body as [`Bytes`].
pub const KEY_RESPONSE_DATA: &str = "responseData";
/// [`TransportError`] describing the failure.
pub const KEY_ERROR: &str = "error";
/// The token's user data, present only if the token carries any.
pub const KEY_USER_DATA: &str = "userData";
/// Cached content as [`String`].
pub const KEY_CACHE_DATA: &str = "cacheData";

/// Opaque caller payload carried through to the consumer.
pub type UserData = Arc<dyn Any + Send + Sync>;

/// Lifecycle phase of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenPhase {
    Idle,
    CacheCheck,
    Requesting,
    CacheServed,
    Completed,
    Failed,
    Cancelled,
}

impl TokenPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TokenPhase::CacheServed
                | TokenPhase::Completed
                | TokenPhase::Failed
                | TokenPhase::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TokenPhase::Idle => "idle",
            TokenPhase::CacheCheck => "cache_check",
            TokenPhase::Requesting => "requesting",
            TokenPhase::CacheServed => "cache_served",
            TokenPhase::Completed => "completed",
            TokenPhase::Failed => "failed",
            TokenPhase::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TokenPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time-sortable token identity (UUIDv7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(Uuid);

impl TokenId {
    fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Mutable token state, guarded by one lock so that every phase transition
/// and the data it publishes change together.
struct TokenState {
    phase: TokenPhase,
    request: HttpRequest,
    response: Option<HttpResponse>,
    /// Body bytes of the exchange currently streaming.
    buffer: Option<BytesMut>,
    /// Frozen body once the exchange completed.
    response_data: Option<Bytes>,
    error: Option<TransportError>,
    /// Handle of the in-flight exchange task.
    in_flight: Option<CancellationToken>,
    started_at: Option<Instant>,
}

struct TokenInner {
    id: TokenId,
    state: Mutex<TokenState>,
    user_data: Option<UserData>,
    worker: Option<Weak<dyn HttpWorker>>,
    transport: Arc<dyn Transport>,
    dispatcher: EventDispatcher,
    broadcast_cache_hits: bool,
}

/// Handle to a single HTTP request.
///
/// Clones share the same request; a token is started at most once.
#[derive(Clone)]
pub struct HttpToken {
    inner: Arc<TokenInner>,
}

impl HttpToken {
    /// Begin building a GET token for `url`.
    pub fn for_url_str(url: &str) -> Result<TokenBuilder> {
        Ok(TokenBuilder::new(HttpRequest::parse(url)?))
    }

    /// Begin building a GET token for an already parsed URL.
    pub fn for_url(url: Url) -> TokenBuilder {
        TokenBuilder::new(HttpRequest::get(url))
    }

    /// Begin building a token for a fully formed request.
    pub fn for_request(request: HttpRequest) -> TokenBuilder {
        TokenBuilder::new(request)
    }

    pub fn id(&self) -> TokenId {
        self.inner.id
    }

    pub fn phase(&self) -> TokenPhase {
        self.lock().phase
    }

    /// Snapshot of the outgoing request.
    pub fn request(&self) -> HttpRequest {
        self.lock().request.clone()
    }

    /// Mutate the request before the token is started.
    pub fn update_request<R>(&self, f: impl FnOnce(&mut HttpRequest) -> R) -> Result<R> {
        let mut state = self.lock();
        if state.phase != TokenPhase::Idle {
            return Err(TokenError::AlreadyStarted);
        }
        Ok(f(&mut state.request))
    }

    /// Response metadata; set only once the exchange completed.
    pub fn response(&self) -> Option<HttpResponse> {
        let state = self.lock();
        if state.phase == TokenPhase::Completed {
            state.response.clone()
        } else {
            None
        }
    }

    /// Body bytes received so far, or the full body after completion.
    ///
    /// `None` until a network response has started arriving.
    pub fn response_data(&self) -> Option<Bytes> {
        let state = self.lock();
        match (&state.response_data, &state.buffer) {
            (Some(data), _) => Some(data.clone()),
            (None, Some(buffer)) => Some(Bytes::copy_from_slice(buffer)),
            (None, None) => None,
        }
    }

    /// Decode the buffered body.
    ///
    /// `None` if no body was ever buffered or it is invalid in `encoding`.
    pub fn response_string(&self, encoding: TextEncoding) -> Option<String> {
        let state = self.lock();
        let bytes: &[u8] = match (&state.response_data, &state.buffer) {
            (Some(data), _) => data,
            (None, Some(buffer)) => buffer,
            (None, None) => return None,
        };
        encoding.decode(bytes)
    }

    /// Failure description; set only in [`TokenPhase::Failed`].
    pub fn error(&self) -> Option<TransportError> {
        self.lock().error.clone()
    }

    pub fn user_data(&self) -> Option<&UserData> {
        self.inner.user_data.as_ref()
    }

    /// Typed view of the user data.
    pub fn user_data_as<T: Any>(&self) -> Option<&T> {
        self.inner
            .user_data
            .as_ref()
            .and_then(|data| (**data).downcast_ref::<T>())
    }

    /// Whether a worker was bound at construction.
    pub fn has_worker(&self) -> bool {
        self.inner.worker.is_some()
    }

    /// Start the lifecycle.
    ///
    /// Never blocks on the network and never returns an error: failures are
    /// delivered through the fault path. Calling `start` on a token that is
    /// not idle does nothing.
    pub fn start(&self) {
        {
            let mut state = self.lock();
            if state.phase != TokenPhase::Idle {
                tracing::debug!(token_id = %self.id(), phase = %state.phase, "Start ignored");
                return;
            }
            state.phase = if self.has_worker() {
                TokenPhase::CacheCheck
            } else {
                TokenPhase::Requesting
            };
            state.started_at = Some(Instant::now());

            tracing::debug!(
                token_id = %self.id(),
                method = %state.request.method,
                url = %state.request.url,
                phase = %state.phase,
                "Token started"
            );
        }
        record_token_started();

        if self.has_worker() {
            // Nobody could receive the outcome, so skip the network entirely.
            let Some(worker) = self.worker() else {
                self.fail(TransportError::WorkerDropped);
                return;
            };
            if self.serve_from_cache(worker.as_ref()) {
                return;
            }
        }
        self.begin_exchange();
    }

    /// Cancel the in-flight request.
    ///
    /// Valid while checking the cache or requesting. Returns `true` if this
    /// call cancelled the token; cancelling an idle or finished token is a
    /// no-op returning `false`. After cancellation nothing is delivered.
    pub fn cancel_request(&self) -> bool {
        let in_flight = {
            let mut state = self.lock();
            if !matches!(state.phase, TokenPhase::CacheCheck | TokenPhase::Requesting) {
                return false;
            }
            state.phase = TokenPhase::Cancelled;
            state.response = None;
            state.buffer = None;
            state.in_flight.take()
        };

        if let Some(handle) = in_flight {
            handle.cancel();
        }
        record_outcome(TokenPhase::Cancelled);
        tracing::info!(token_id = %self.id(), "Token cancelled");
        true
    }

    fn lock(&self) -> MutexGuard<'_, TokenState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn worker(&self) -> Option<Arc<dyn HttpWorker>> {
        self.inner.worker.as_ref().and_then(Weak::upgrade)
    }

    /// Consult the worker's cache policy.
    ///
    /// Returns `true` when the network must not be used: the token was served
    /// from cache, or it was cancelled while the worker was being consulted.
    fn serve_from_cache(&self, worker: &dyn HttpWorker) -> bool {
        if !worker.should_use_cache(self) {
            tracing::debug!(token_id = %self.id(), "Cache declined by worker");
            return false;
        }

        let Some(cache_data) = worker.cache_data(self) else {
            tracing::debug!(token_id = %self.id(), "Cache miss, falling through to network");
            return false;
        };

        {
            let mut state = self.lock();
            if state.phase != TokenPhase::CacheCheck {
                return true;
            }
            state.phase = TokenPhase::CacheServed;
        }
        record_outcome(TokenPhase::CacheServed);
        tracing::debug!(token_id = %self.id(), bytes = cache_data.len(), "Served from cache");

        worker.on_cache_result(self, &cache_data);

        if self.inner.broadcast_cache_hits {
            let data = self.notification_data().with(KEY_CACHE_DATA, cache_data);
            self.inner.dispatcher.publish(CHANNEL_HTTP_CACHE_DATA, data);
        }
        true
    }

    /// Move to `Requesting` and spawn the exchange on the current runtime.
    fn begin_exchange(&self) {
        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!(token_id = %self.id(), "No tokio runtime to drive the exchange");
            self.fail(TransportError::NoRuntime);
            return;
        };

        let cancel = CancellationToken::new();
        let request = {
            let mut state = self.lock();
            match state.phase {
                TokenPhase::CacheCheck => state.phase = TokenPhase::Requesting,
                TokenPhase::Requesting => {}
                // Cancelled while the worker was being consulted.
                _ => return,
            }
            state.in_flight = Some(cancel.clone());
            state.request.clone()
        };

        runtime.spawn(exchange::drive(self.clone(), request, cancel));
    }

    /// Response head arrived; start a fresh body buffer.
    fn receive_response(&self, response: HttpResponse) {
        let mut state = self.lock();
        if state.phase != TokenPhase::Requesting {
            return;
        }
        state.response = Some(response);
        state.buffer = Some(BytesMut::new());
    }

    fn receive_data(&self, chunk: &[u8]) {
        let mut state = self.lock();
        if state.phase != TokenPhase::Requesting {
            return;
        }
        state
            .buffer
            .get_or_insert_with(BytesMut::new)
            .extend_from_slice(chunk);
    }

    /// Exchange completed: freeze the body and deliver.
    fn complete(&self) {
        let (response, body, started_at) = {
            let mut state = self.lock();
            if state.phase != TokenPhase::Requesting {
                return;
            }
            state.phase = TokenPhase::Completed;
            state.in_flight = None;

            let body = state.buffer.take().map(BytesMut::freeze).unwrap_or_default();
            state.response_data = Some(body.clone());
            (state.response.clone(), body, state.started_at)
        };

        record_outcome(TokenPhase::Completed);
        if let Some(started_at) = started_at {
            record_exchange(
                started_at.elapsed().as_secs_f64(),
                body.len() as u64,
            );
        }
        tracing::debug!(
            token_id = %self.id(),
            status = response.as_ref().map(|r| r.status.as_u16()),
            bytes = body.len(),
            "Exchange completed"
        );

        if self.has_worker() {
            match self.worker() {
                Some(worker) => worker.on_result(self),
                None => self.warn_worker_gone(TokenPhase::Completed),
            }
            return;
        }

        let mut data = self.notification_data().with(KEY_RESPONSE_DATA, body);
        if let Some(response) = response {
            data.insert(KEY_RESPONSE, response);
        }
        self.inner.dispatcher.publish(CHANNEL_HTTP_RESULT, data);
    }

    /// Exchange failed: record the error and deliver.
    fn fail(&self, error: TransportError) {
        {
            let mut state = self.lock();
            if !matches!(state.phase, TokenPhase::CacheCheck | TokenPhase::Requesting) {
                return;
            }
            state.phase = TokenPhase::Failed;
            state.in_flight = None;
            state.response = None;
            state.buffer = None;
            state.error = Some(error.clone());
        }

        record_outcome(TokenPhase::Failed);
        tracing::warn!(token_id = %self.id(), error = %error, "Exchange failed");

        if self.has_worker() {
            match self.worker() {
                Some(worker) => worker.on_fault(self),
                None => self.warn_worker_gone(TokenPhase::Failed),
            }
            return;
        }

        let data = self.notification_data().with(KEY_ERROR, error);
        self.inner.dispatcher.publish(CHANNEL_HTTP_ERROR, data);
    }

    fn warn_worker_gone(&self, outcome: TokenPhase) {
        tracing::warn!(
            token_id = %self.id(),
            outcome = %outcome,
            "Worker dropped before delivery; outcome discarded"
        );
    }

    /// Base payload shared by every notification: the user data, if any.
    fn notification_data(&self) -> NotificationData {
        let mut data = NotificationData::new();
        if let Some(user_data) = &self.inner.user_data {
            data.insert_shared(KEY_USER_DATA, Arc::clone(user_data));
        }
        data
    }
}

impl fmt::Debug for HttpToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("HttpToken")
            .field("id", &self.inner.id)
            .field("phase", &state.phase)
            .field("url", &state.request.url.as_str())
            .field("has_worker", &self.has_worker())
            .finish()
    }
}

/// Builder for [`HttpToken`]. The worker binding is fixed once built.
pub struct TokenBuilder {
    request: HttpRequest,
    user_data: Option<UserData>,
    worker: Option<Weak<dyn HttpWorker>>,
    transport: Option<Arc<dyn Transport>>,
    dispatcher: Option<EventDispatcher>,
    broadcast_cache_hits: bool,
}

impl TokenBuilder {
    fn new(request: HttpRequest) -> Self {
        Self {
            request,
            user_data: None,
            worker: None,
            transport: None,
            dispatcher: None,
            broadcast_cache_hits: false,
        }
    }

    /// Attach an opaque payload returned to the consumer untouched.
    #[must_use]
    pub fn user_data<T: Any + Send + Sync>(mut self, data: T) -> Self {
        self.user_data = Some(Arc::new(data));
        self
    }

    /// Attach an already shared payload.
    #[must_use]
    pub fn shared_user_data(mut self, data: UserData) -> Self {
        self.user_data = Some(data);
        self
    }

    /// Bind a dedicated worker. Only a weak reference is kept.
    #[must_use]
    pub fn worker<W: HttpWorker + 'static>(mut self, worker: &Arc<W>) -> Self {
        let weak: Weak<W> = Arc::downgrade(worker);
        self.worker = Some(weak);
        self
    }

    /// Use `transport` instead of the shared [`ReqwestTransport`].
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Publish on `dispatcher` instead of [`EventDispatcher::global`].
    #[must_use]
    pub fn dispatcher(mut self, dispatcher: EventDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Also publish cache hits on [`CHANNEL_HTTP_CACHE_DATA`], after the
    /// worker's `on_cache_result` ran. Off by default.
    #[must_use]
    pub fn broadcast_cache_hits(mut self, enabled: bool) -> Self {
        self.broadcast_cache_hits = enabled;
        self
    }

    pub fn build(self) -> Result<HttpToken> {
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => ReqwestTransport::shared()?,
        };
        let dispatcher = self
            .dispatcher
            .unwrap_or_else(|| EventDispatcher::global().clone());

        Ok(HttpToken {
            inner: Arc::new(TokenInner {
                id: TokenId::new(),
                state: Mutex::new(TokenState {
                    phase: TokenPhase::Idle,
                    request: self.request,
                    response: None,
                    buffer: None,
                    response_data: None,
                    error: None,
                    in_flight: None,
                    started_at: None,
                }),
                user_data: self.user_data,
                worker: self.worker,
                transport,
                dispatcher,
                broadcast_cache_hits: self.broadcast_cache_hits,
            }),
        })
    }
}
