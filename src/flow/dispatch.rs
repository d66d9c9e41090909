//! Notification bus for outcome fan-out.
//!
//! Channels are named by strings. Each channel holds an ordered list of
//! `(target, handler)` registrations; removal filters by target so a consumer
//! can drop every callback it owns in one call during teardown.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// A type-erased, shareable payload value.
pub type Value = Arc<dyn Any + Send + Sync>;

/// String-keyed payload carried by a [`Notification`].
#[derive(Clone, Default)]
pub struct NotificationData {
    entries: HashMap<String, Value>,
}

impl NotificationData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with<T: Any + Send + Sync>(mut self, key: impl Into<String>, value: T) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.entries.insert(key.into(), Arc::new(value));
    }

    /// Insert an already shared value without re-wrapping it.
    ///
    /// `get::<T>` still resolves against the concrete type behind the `Arc`.
    pub fn insert_shared(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    /// Typed lookup. Returns `None` when the key is absent or holds another type.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.entries
            .get(key)
            .and_then(|value| (**value).downcast_ref::<T>())
    }

    pub fn get_shared(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl fmt::Debug for NotificationData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.keys().collect();
        keys.sort_unstable();
        f.debug_struct("NotificationData")
            .field("keys", &keys)
            .finish()
    }
}

/// A published notification as seen by a handler.
#[derive(Debug, Clone)]
pub struct Notification {
    name: String,
    data: NotificationData,
}

impl Notification {
    /// Channel the notification was published on.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &NotificationData {
        &self.data
    }

    /// Shorthand for `self.data().get::<T>(key)`.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.data.get(key)
    }
}

static NEXT_TARGET_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a subscriber, used for bulk removal.
///
/// Every call to [`TargetId::new`] yields a value never handed out before in
/// this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    pub fn new() -> Self {
        Self(NEXT_TARGET_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for TargetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "target-{}", self.0)
    }
}

type Handler = Arc<dyn Fn(&Notification) + Send + Sync>;

struct Registration {
    target: TargetId,
    handler: Handler,
}

static GLOBAL: OnceLock<EventDispatcher> = OnceLock::new();

/// Publish/subscribe bus keyed by channel name.
///
/// Cloning is cheap; clones share the same registration table. Registration,
/// removal and publish may run concurrently from any thread.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    channels: Arc<RwLock<HashMap<String, Vec<Registration>>>>,
}

impl EventDispatcher {
    /// Create an isolated dispatcher with no registrations.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide dispatcher.
    pub fn global() -> &'static EventDispatcher {
        GLOBAL.get_or_init(EventDispatcher::new)
    }

    /// Register `handler` for `channel`, owned by `target`.
    ///
    /// The same target may register several handlers on one channel; each
    /// runs on every publish.
    pub fn subscribe<F>(&self, channel: impl Into<String>, target: TargetId, handler: F)
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        let channel = channel.into();
        tracing::trace!(channel = %channel, %target, "Subscribing handler");

        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        channels.entry(channel).or_default().push(Registration {
            target,
            handler: Arc::new(handler),
        });
    }

    /// Remove the registrations on `channel` owned by `target`.
    ///
    /// Returns the number of handlers removed (zero is not an error).
    pub fn unsubscribe(&self, channel: &str, target: TargetId) -> usize {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        let Some(registrations) = channels.get_mut(channel) else {
            return 0;
        };

        let before = registrations.len();
        registrations.retain(|r| r.target != target);
        let removed = before - registrations.len();

        if registrations.is_empty() {
            channels.remove(channel);
        }

        tracing::trace!(channel, %target, removed, "Unsubscribed handler");
        removed
    }

    /// Remove every registration owned by `target`, on every channel.
    pub fn unsubscribe_all(&self, target: TargetId) -> usize {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        let mut removed = 0;

        channels.retain(|_, registrations| {
            let before = registrations.len();
            registrations.retain(|r| r.target != target);
            removed += before - registrations.len();
            !registrations.is_empty()
        });

        tracing::trace!(%target, removed, "Unsubscribed target from all channels");
        removed
    }

    /// Synchronously run every handler registered on `channel`.
    ///
    /// The handler list is snapshotted first, so handlers may subscribe or
    /// unsubscribe from inside a callback. A panicking handler is logged and
    /// skipped; the remaining handlers still run.
    ///
    /// Returns the number of handlers that completed without panicking.
    pub fn publish(&self, channel: &str, data: NotificationData) -> usize {
        let handlers: Vec<(TargetId, Handler)> = {
            let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
            match channels.get(channel) {
                Some(registrations) => registrations
                    .iter()
                    .map(|r| (r.target, Arc::clone(&r.handler)))
                    .collect(),
                None => Vec::new(),
            }
        };

        if handlers.is_empty() {
            tracing::trace!(channel, "Publish with no subscribers");
            return 0;
        }

        let notification = Notification {
            name: channel.to_string(),
            data,
        };

        let mut delivered = 0;
        for (target, handler) in handlers {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(&notification))) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    tracing::warn!(channel, %target, "Notification handler panicked");
                }
            }
        }

        tracing::debug!(channel, delivered, "Notification published");
        delivered
    }

    /// Number of handlers currently registered on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        channels.get(channel).map_or(0, Vec::len)
    }

    /// Whether `target` owns at least one handler on `channel`.
    pub fn is_subscribed(&self, channel: &str, target: TargetId) -> bool {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        channels
            .get(channel)
            .is_some_and(|registrations| registrations.iter().any(|r| r.target == target))
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("EventDispatcher")
            .field("channels", &channels.len())
            .finish()
    }
}
