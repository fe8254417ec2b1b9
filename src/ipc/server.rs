//! In-process request server for the engine host.
//!
//! Consumers submit [`HostRequest`]s over a channel; each is handled on its
//! own task and answered through its oneshot reply.

use crate::ipc::protocol::{DestinationId, Request, Response};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Handler trait for processing consumer requests.
#[async_trait::async_trait]
pub trait RequestHandler: Send + Sync {
    /// Handle a request from `from` and return a response.
    async fn handle(&self, from: DestinationId, request: Request) -> Response;
}

/// A request in flight, with the channel for its reply.
#[derive(Debug)]
pub struct HostRequest {
    pub from: DestinationId,
    pub request: Request,
    pub reply: oneshot::Sender<Response>,
}

/// Serve requests until every sender is dropped.
pub async fn serve<H>(handler: H, mut requests: mpsc::Receiver<HostRequest>)
where
    H: RequestHandler + 'static,
{
    let handler = Arc::new(handler);

    while let Some(HostRequest {
        from,
        request,
        reply,
    }) = requests.recv().await
    {
        tracing::debug!(%from, ?request, "Host request");
        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            let response = handler.handle(from, request).await;
            if reply.send(response).is_err() {
                tracing::debug!(%from, "Requester went away before the reply");
            }
        });
    }
    tracing::debug!("Host request channel closed");
}
