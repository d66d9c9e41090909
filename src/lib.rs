//! Courier: asynchronous HTTP request tokens with cache-or-network dispatch.
//!
//! A [`HttpToken`] wraps a single HTTP request. Starting it either satisfies
//! the result from a caller-supplied cache or performs a network exchange, and
//! the outcome reaches exactly one consumer: the bound [`HttpWorker`], or the
//! [`EventDispatcher`] notification bus when no worker was supplied.
//!
//! # Modules
//!
//! - [`config`]: Transport configuration (CLI and environment)
//! - [`encoding`]: Text decoding of buffered response bodies
//! - [`error`]: Token and transport error types
//! - [`flow`]: Notification bus
//! - [`http`]: Request/response types and the transport seam
//! - [`observability`]: Metrics and tracing setup
//! - [`token`]: Request token lifecycle and the worker capability

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions, // token::worker::HttpWorker is fine
    clippy::must_use_candidate,      // Not all functions need #[must_use]
    clippy::missing_errors_doc,      // Error docs can be verbose
    clippy::missing_panics_doc       // Panic docs can be verbose
)]

pub mod config;
pub mod encoding;
pub mod error;
pub mod flow;
pub mod http;
pub mod observability;
pub mod token;

pub use config::ClientConfig;
pub use encoding::TextEncoding;
pub use error::{TokenError, TransportError};
pub use flow::dispatch::{EventDispatcher, Notification, NotificationData, TargetId};
pub use http::{Exchange, HttpRequest, HttpResponse, ReqwestTransport, Transport};
pub use token::worker::HttpWorker;
pub use token::{
    HttpToken, TokenBuilder, TokenId, TokenPhase, UserData, CHANNEL_HTTP_CACHE_DATA,
    CHANNEL_HTTP_ERROR, CHANNEL_HTTP_RESULT, KEY_CACHE_DATA, KEY_ERROR, KEY_RESPONSE,
    KEY_RESPONSE_DATA, KEY_USER_DATA,
};
