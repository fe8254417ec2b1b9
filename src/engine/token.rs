//! Generation token: identity, cancellation and backpressure credits.
//!
//! Each generation gets one token. The engine holds the active token and
//! compares it against the one threaded through the generation loop; a
//! superseded or stopped token is cancelled, which also wakes any
//! backpressure wait on it.

use crate::ipc::protocol::SessionId;
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Debug, Clone)]
pub struct GenerationToken {
    id: SessionId,
    /// One permit per chunk that may still be emitted without an ack.
    credits: Arc<Semaphore>,
}

impl GenerationToken {
    pub fn new(id: SessionId, max_in_flight: usize) -> Self {
        Self {
            id,
            credits: Arc::new(Semaphore::new(max_in_flight)),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Cancel the generation. Idempotent.
    pub fn cancel(&self) {
        self.credits.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.credits.is_closed()
    }

    /// Wait until one more chunk may be produced.
    ///
    /// Returns `false` if the token was cancelled before or during the wait.
    pub async fn reserve(&self) -> bool {
        match self.credits.acquire().await {
            Ok(permit) => {
                permit.forget();
                true
            }
            Err(_) => false,
        }
    }

    /// Return one credit: after an acknowledgement, or when a reserved
    /// slot was not used.
    pub fn release(&self) {
        if !self.is_cancelled() {
            self.credits.add_permits(1);
        }
    }

    /// Credits currently available.
    pub fn available(&self) -> usize {
        self.credits.available_permits()
    }

    pub fn same_generation(&self, other: &GenerationToken) -> bool {
        self.id == other.id && Arc::ptr_eq(&self.credits, &other.credits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn reserve_consumes_credits() {
        let token = GenerationToken::new(1, 2);
        assert!(token.reserve().await);
        assert!(token.reserve().await);
        assert_eq!(token.available(), 0);

        let blocked = tokio::time::timeout(Duration::from_millis(20), token.reserve()).await;
        assert!(blocked.is_err(), "third reserve must wait");
    }

    #[tokio::test]
    async fn release_unblocks_waiter() {
        let token = GenerationToken::new(1, 1);
        assert!(token.reserve().await);

        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.reserve().await })
        };
        tokio::task::yield_now().await;
        token.release();

        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn cancel_aborts_waiting_reserve() {
        let token = GenerationToken::new(1, 1);
        assert!(token.reserve().await);

        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.reserve().await })
        };
        tokio::task::yield_now().await;
        token.cancel();

        assert!(!waiter.await.unwrap());
        assert!(token.is_cancelled());
    }

    #[test]
    fn release_after_cancel_is_ignored() {
        let token = GenerationToken::new(1, 1);
        token.cancel();
        token.release();
        assert!(token.is_cancelled());
    }

    #[test]
    fn tokens_with_equal_ids_are_distinct_generations() {
        let a = GenerationToken::new(5, 6);
        let b = GenerationToken::new(5, 6);
        assert!(a.same_generation(&a.clone()));
        assert!(!a.same_generation(&b));
    }
}
