//! What a fetch ended with, as seen by the CLI.

use courier::http::Bytes;
use courier::{HttpResponse, TransportError};

#[derive(Debug, Clone)]
pub enum Outcome {
    /// Response from the network; the body may be empty.
    Network { response: HttpResponse, body: Bytes },
    /// Content served from the cache file.
    Cache(String),
    Failed(TransportError),
}
