//! Relay from the engine to consumers.
//!
//! Events are forwarded in the order the engine produced them. Session
//! events go to the consumer that requested the session, model lifecycle
//! events go to every known consumer, and session-less errors go to the most
//! recent requester. A delivery that finds no recipient gets one retry after
//! the consumer is re-established.

use crate::defaults::RELAY_RETRY_DELAY_MS;
use crate::error::{Result, VoxError};
use crate::ipc::protocol::{DestinationId, Event, SessionId};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Default)]
struct Routes {
    sessions: HashMap<SessionId, DestinationId>,
    known: BTreeSet<DestinationId>,
    last_requester: Option<DestinationId>,
}

/// Routing state shared by the host (writes) and the relay (reads).
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    inner: Arc<Mutex<Routes>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Routes> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Note a consumer that just sent a request.
    pub fn record_requester(&self, from: DestinationId) {
        let mut routes = self.lock();
        routes.known.insert(from);
        routes.last_requester = Some(from);
    }

    /// Route every event of `session` to `destination`.
    ///
    /// A consumer follows one session at a time, so older sessions bound to
    /// the same destination are forgotten.
    pub fn bind_session(&self, session: SessionId, destination: DestinationId) {
        let mut routes = self.lock();
        routes.sessions.retain(|_, bound| *bound != destination);
        routes.sessions.insert(session, destination);
    }

    pub fn release_session(&self, session: SessionId) {
        self.lock().sessions.remove(&session);
    }

    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn destination_for(&self, session: SessionId) -> Option<DestinationId> {
        self.lock().sessions.get(&session).copied()
    }

    pub fn known(&self) -> Vec<DestinationId> {
        self.lock().known.iter().copied().collect()
    }

    pub fn last_requester(&self) -> Option<DestinationId> {
        self.lock().last_requester
    }
}

/// Delivery of events to consumers.
#[async_trait::async_trait]
pub trait ConsumerTransport: Send + Sync {
    /// Deliver one event.
    ///
    /// # Errors
    /// `VoxError::RecipientNotFound` when no consumer is listening at `destination`
    async fn deliver(&self, destination: DestinationId, event: Event) -> Result<()>;

    /// Bring the consumer at `destination` back so a retry can succeed.
    async fn reestablish(&self, destination: DestinationId) -> Result<()>;
}

/// Receiver of per-chunk acknowledgements (the engine).
pub trait ChunkAcknowledger: Send + Sync {
    fn acknowledge(&self, session_id: SessionId);
}

pub struct Relay<T: ConsumerTransport> {
    transport: T,
    routes: RouteTable,
    acknowledger: Arc<dyn ChunkAcknowledger>,
    retry_delay: Duration,
}

impl<T: ConsumerTransport> Relay<T> {
    pub fn new(transport: T, routes: RouteTable, acknowledger: Arc<dyn ChunkAcknowledger>) -> Self {
        Self {
            transport,
            routes,
            acknowledger,
            retry_delay: Duration::from_millis(RELAY_RETRY_DELAY_MS),
        }
    }

    /// Settle delay between re-establishing a consumer and the retry.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Forward engine events until the engine's channel closes.
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<Event>) {
        while let Some(event) = events.recv().await {
            if let Err(e) = self.forward(event).await {
                tracing::error!("{}", e);
            }
        }
        tracing::debug!("Engine event channel closed, relay exiting");
    }

    /// Destinations an event should reach.
    pub fn targets(&self, event: &Event) -> Vec<DestinationId> {
        if event.is_broadcast() {
            return self.routes.known();
        }
        let destination = match event.session_id() {
            Some(session) => self.routes.destination_for(session),
            None => self.routes.last_requester(),
        };
        destination.into_iter().collect()
    }

    /// Forward one event to its destinations.
    ///
    /// # Errors
    /// `VoxError::Delivery` if a destination stays unreachable after the retry
    pub async fn forward(&self, event: Event) -> Result<()> {
        let targets = self.targets(&event);
        if targets.is_empty() {
            tracing::warn!(event = event.kind(), "No destination for event, dropping");
            return Ok(());
        }

        let acknowledge = match &event {
            Event::AudioChunk(chunk) => Some(chunk.session_id),
            _ => None,
        };

        let mut failure = None;
        for destination in targets {
            match self.deliver_with_retry(destination, event.clone()).await {
                Ok(()) => {
                    if let Some(session) = acknowledge {
                        self.acknowledger.acknowledge(session);
                    }
                }
                Err(e) => failure = Some(e),
            }
        }
        if event.ends_session()
            && let Some(session) = event.session_id()
        {
            self.routes.release_session(session);
        }
        failure.map_or(Ok(()), Err)
    }

    async fn deliver_with_retry(&self, destination: DestinationId, event: Event) -> Result<()> {
        let kind = event.kind();
        let delivery_error = |e: VoxError| VoxError::Delivery {
            destination: destination.to_string(),
            message: format!("{}: {}", kind, e),
        };

        match self.transport.deliver(destination, event.clone()).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_recipient_missing() => {
                tracing::warn!(%destination, event = kind, "Consumer not found, re-establishing");
                self.transport
                    .reestablish(destination)
                    .await
                    .map_err(delivery_error)?;
                tokio::time::sleep(self.retry_delay).await;
                self.transport
                    .deliver(destination, event)
                    .await
                    .map_err(delivery_error)
            }
            Err(e) => Err(delivery_error(e)),
        }
    }
}

/// Creates a fresh consumer inbox for a destination being re-established.
pub type Reconnect = Box<dyn Fn(DestinationId) -> Option<mpsc::Sender<Event>> + Send + Sync>;

/// Transport over bounded in-process channels, one inbox per consumer.
///
/// A full inbox makes delivery wait, so a slow consumer slows the relay.
#[derive(Default)]
pub struct ChannelTransport {
    inboxes: Mutex<HashMap<DestinationId, mpsc::Sender<Event>>>,
    reconnect: Option<Reconnect>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `reconnect` to replace inboxes whose consumer went away.
    pub fn with_reconnect(mut self, reconnect: Reconnect) -> Self {
        self.reconnect = Some(reconnect);
        self
    }

    pub fn register(&self, destination: DestinationId, inbox: mpsc::Sender<Event>) {
        if let Ok(mut inboxes) = self.inboxes.lock() {
            inboxes.insert(destination, inbox);
        }
    }

    fn inbox(&self, destination: DestinationId) -> Option<mpsc::Sender<Event>> {
        self.inboxes
            .lock()
            .ok()
            .and_then(|inboxes| inboxes.get(&destination).cloned())
    }
}

#[async_trait::async_trait]
impl ConsumerTransport for ChannelTransport {
    async fn deliver(&self, destination: DestinationId, event: Event) -> Result<()> {
        let missing = || VoxError::RecipientNotFound {
            destination: destination.to_string(),
        };
        let inbox = self.inbox(destination).ok_or_else(missing)?;
        inbox.send(event).await.map_err(|_| missing())
    }

    async fn reestablish(&self, destination: DestinationId) -> Result<()> {
        let inbox = self
            .reconnect
            .as_ref()
            .and_then(|reconnect| reconnect(destination))
            .ok_or_else(|| VoxError::RecipientNotFound {
                destination: destination.to_string(),
            })?;
        self.register(destination, inbox);
        Ok(())
    }
}
