//! Production transport backed by `reqwest`.

use std::sync::{Arc, OnceLock};

use futures::future::{BoxFuture, FutureExt};
use futures::stream::TryStreamExt;
use reqwest::Client;

use super::{Exchange, HttpRequest, HttpResponse, Transport};
use crate::config::ClientConfig;
use crate::error::TransportError;

static SHARED: OnceLock<Arc<ReqwestTransport>> = OnceLock::new();

/// [`Transport`] that performs real network exchanges with `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build a transport from `config`.
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let mut builder = Client::builder().user_agent(config.user_agent.clone());

        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = config.connect_timeout() {
            builder = builder.connect_timeout(timeout);
        }
        if config.no_proxy {
            builder = builder.no_proxy();
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::Setup(e.to_string()))?;
        Ok(Self { client })
    }

    /// Process-wide transport built from [`ClientConfig::default`].
    ///
    /// Used by tokens that were not given a transport explicitly.
    pub fn shared() -> Result<Arc<ReqwestTransport>, TransportError> {
        if let Some(transport) = SHARED.get() {
            return Ok(Arc::clone(transport));
        }
        let transport = Arc::new(Self::new(&ClientConfig::default())?);
        Ok(Arc::clone(SHARED.get_or_init(|| transport)))
    }
}

impl Transport for ReqwestTransport {
    fn execute(&self, request: HttpRequest) -> BoxFuture<'static, Result<Exchange, TransportError>> {
        let client = self.client.clone();

        async move {
            let mut builder = client
                .request(request.method, request.url)
                .headers(request.headers);
            if let Some(body) = request.body {
                builder = builder.body(body);
            }
            if let Some(timeout) = request.timeout {
                builder = builder.timeout(timeout);
            }

            let response = builder.send().await?;
            let head = HttpResponse {
                status: response.status(),
                version: response.version(),
                url: response.url().clone(),
                headers: response.headers().clone(),
                content_length: response.content_length(),
            };

            tracing::debug!(
                status = head.status.as_u16(),
                url = %head.url,
                content_length = ?head.content_length,
                "Response head received"
            );

            let body = response.bytes_stream().map_err(TransportError::from);
            Ok(Exchange::new(head, body))
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_with_default_config() {
        assert!(ReqwestTransport::new(&ClientConfig::default()).is_ok());
    }

    #[test]
    fn test_shared_returns_same_instance() {
        let a = ReqwestTransport::shared().unwrap();
        let b = ReqwestTransport::shared().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
