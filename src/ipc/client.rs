//! Client used by a consumer to send requests to the engine host.

use crate::error::{Result, VoxError};
use crate::ipc::protocol::{DestinationId, Request, Response};
use crate::ipc::server::HostRequest;
use tokio::sync::{mpsc, oneshot};

/// Handle to the engine host, bound to one consumer identity.
#[derive(Debug, Clone)]
pub struct HostClient {
    destination: DestinationId,
    requests: mpsc::Sender<HostRequest>,
}

impl HostClient {
    pub fn new(destination: DestinationId, requests: mpsc::Sender<HostRequest>) -> Self {
        Self {
            destination,
            requests,
        }
    }

    /// Identity the host uses to route events back to this consumer.
    pub fn destination(&self) -> DestinationId {
        self.destination
    }

    /// Send a request and wait for its response.
    ///
    /// # Errors
    /// Returns `VoxError::Protocol` if the host is not running or drops the request
    pub async fn request(&self, request: Request) -> Result<Response> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(HostRequest {
                from: self.destination,
                request,
                reply,
            })
            .await
            .map_err(|_| VoxError::Protocol {
                message: "engine host is not running".to_string(),
            })?;

        response.await.map_err(|_| VoxError::Protocol {
            message: "engine host dropped the request".to_string(),
        })
    }
}
