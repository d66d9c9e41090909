//! Worker capability: cache policy plus outcome sinks.

use super::HttpToken;

/// Dedicated handler for a token's outcome.
///
/// A token bound to a worker delivers every outcome here and never publishes
/// on the notification bus (except cache hits when broadcasting is enabled on
/// the builder). Callbacks for network outcomes run on a runtime worker thread;
/// cache outcomes run synchronously inside [`HttpToken::start`].
///
/// The token keeps only a weak reference: the caller must keep the worker
/// alive for as long as its tokens are in flight. A worker may own its tokens
/// without creating a reference cycle.
pub trait HttpWorker: Send + Sync {
    /// The network exchange completed. Status, headers and body are available
    /// through [`HttpToken::response`] and [`HttpToken::response_data`].
    fn on_result(&self, token: &HttpToken);

    /// The network exchange failed; see [`HttpToken::error`].
    fn on_fault(&self, token: &HttpToken);

    /// Whether a cached result is acceptable for `token`.
    ///
    /// Called at most once per start. The default always goes to the network.
    fn should_use_cache(&self, _token: &HttpToken) -> bool {
        false
    }

    /// Cached content for `token`, or `None` to fall through to the network.
    ///
    /// Called at most once, and only after [`should_use_cache`] returned true.
    ///
    /// [`should_use_cache`]: HttpWorker::should_use_cache
    fn cache_data(&self, _token: &HttpToken) -> Option<String> {
        None
    }

    /// The token completed from cache without touching the network.
    ///
    /// Implementors that override [`cache_data`] should override this too;
    /// the default discards the cached content.
    ///
    /// [`cache_data`]: HttpWorker::cache_data
    fn on_cache_result(&self, token: &HttpToken, cache_data: &str) {
        tracing::debug!(
            token_id = %token.id(),
            bytes = cache_data.len(),
            "Cache result ignored by worker"
        );
    }
}
