//! File-backed worker for `get --cache`.

use std::fs;
use std::path::PathBuf;

use courier::{HttpToken, HttpWorker};
use tokio::sync::mpsc::UnboundedSender;

use crate::outcome::Outcome;

/// Serves a token from a file when present and stores successful bodies.
pub struct FileCacheWorker {
    path: PathBuf,
    refresh: bool,
    outcomes: UnboundedSender<Outcome>,
}

impl FileCacheWorker {
    pub fn new(path: PathBuf, refresh: bool, outcomes: UnboundedSender<Outcome>) -> Self {
        Self {
            path,
            refresh,
            outcomes,
        }
    }

    fn send(&self, outcome: Outcome) {
        if self.outcomes.send(outcome).is_err() {
            tracing::debug!("Outcome receiver closed");
        }
    }
}

impl HttpWorker for FileCacheWorker {
    fn on_result(&self, token: &HttpToken) {
        let Some(response) = token.response() else {
            return;
        };
        let body = token.response_data().unwrap_or_default();

        if response.is_success() {
            match fs::write(&self.path, &body) {
                Ok(()) => tracing::debug!(
                    path = %self.path.display(),
                    bytes = body.len(),
                    "Cache file written"
                ),
                Err(e) => tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to write cache file"
                ),
            }
        }

        self.send(Outcome::Network { response, body });
    }

    fn on_fault(&self, token: &HttpToken) {
        if let Some(error) = token.error() {
            self.send(Outcome::Failed(error));
        }
    }

    fn should_use_cache(&self, _token: &HttpToken) -> bool {
        !self.refresh && self.path.is_file()
    }

    fn cache_data(&self, _token: &HttpToken) -> Option<String> {
        match fs::read_to_string(&self.path) {
            Ok(data) => Some(data),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Cache file unreadable, fetching"
                );
                None
            }
        }
    }

    fn on_cache_result(&self, _token: &HttpToken, cache_data: &str) {
        self.send(Outcome::Cache(cache_data.to_string()));
    }
}
