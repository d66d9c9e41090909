//! Task driving one network exchange for a token.

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::HttpToken;
use crate::error::TransportError;
use crate::http::{Exchange, HttpRequest};

/// Execute `request` and feed the response into `token`.
///
/// All callbacks for one token happen sequentially inside this task. Once
/// `cancel` fires the transport future is dropped, which releases the
/// connection, and nothing further reaches the token.
pub(super) async fn drive(token: HttpToken, request: HttpRequest, cancel: CancellationToken) {
    let span = tracing::debug_span!(
        "exchange",
        token_id = %token.id(),
        method = %request.method,
        url = %request.url,
    );

    async {
        let transport = &token.inner.transport;
        let exchange = async {
            let Exchange { response, mut body } = transport.execute(request).await?;
            token.receive_response(response);

            while let Some(chunk) = body.next().await {
                token.receive_data(&chunk?);
            }
            Ok::<(), TransportError>(())
        };

        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                tracing::debug!("Exchange abandoned after cancellation");
            }
            result = exchange => match result {
                Ok(()) => token.complete(),
                Err(error) => token.fail(error),
            },
        }
    }
    .instrument(span)
    .await;
}
