//! HTTP request/response types and the transport abstraction.
//!
//! The token never talks to a socket directly. It hands an [`HttpRequest`] to
//! a [`Transport`] and consumes the resulting [`Exchange`]: response metadata
//! plus a stream of body chunks. [`ReqwestTransport`] is the production
//! implementation; tests supply their own.

mod client;

use std::fmt;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{BoxStream, Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

pub use bytes::Bytes;
pub use client::ReqwestTransport;
pub use reqwest::header;
pub use reqwest::{Method, StatusCode, Url, Version};

use crate::error::{Result, TokenError, TransportError};

/// Outgoing request description.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    /// Per-request timeout, overriding the transport default.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Parse `url` and build a GET request for it.
    pub fn parse(url: &str) -> Result<Self> {
        let parsed = Url::parse(url).map_err(|e| TokenError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::get(parsed))
    }

    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Append a header from string parts, validating both.
    pub fn try_header(mut self, name: &str, value: &str) -> Result<Self> {
        let invalid = |reason: String| TokenError::InvalidHeader {
            name: name.to_string(),
            reason,
        };
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
        let header_value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
        self.headers.append(header_name, header_value);
        Ok(self)
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Protocol-level metadata of a completed exchange.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub version: Version,
    /// Final URL after any redirects the transport followed.
    pub url: Url,
    pub headers: HeaderMap,
    pub content_length: Option<u64>,
}

impl HttpResponse {
    /// Minimal response metadata, mostly useful for custom transports.
    pub fn new(status: StatusCode, url: Url) -> Self {
        Self {
            status,
            version: Version::HTTP_11,
            url,
            headers: HeaderMap::new(),
            content_length: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Stream of response body chunks in arrival order.
pub type BodyStream = BoxStream<'static, std::result::Result<Bytes, TransportError>>;

/// An in-flight exchange: response head received, body still streaming.
pub struct Exchange {
    pub response: HttpResponse,
    pub body: BodyStream,
}

impl Exchange {
    pub fn new<S>(response: HttpResponse, body: S) -> Self
    where
        S: Stream<Item = std::result::Result<Bytes, TransportError>> + Send + 'static,
    {
        Self {
            response,
            body: body.boxed(),
        }
    }

    /// Exchange whose body is already fully known.
    pub fn from_chunks<I>(response: HttpResponse, chunks: I) -> Self
    where
        I: IntoIterator<Item = Bytes>,
        I::IntoIter: Send + 'static,
    {
        Self::new(response, futures::stream::iter(chunks.into_iter().map(Ok)))
    }
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("response", &self.response)
            .finish_non_exhaustive()
    }
}

/// Asynchronous HTTP transport.
///
/// Implementations own connection handling, TLS and redirect policy. The
/// returned future must be `'static` so the token can drive it from a
/// spawned task; dropping it releases the underlying connection.
pub trait Transport: Send + Sync {
    fn execute(
        &self,
        request: HttpRequest,
    ) -> BoxFuture<'static, std::result::Result<Exchange, TransportError>>;
}
