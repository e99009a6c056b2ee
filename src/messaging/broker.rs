use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::utils::{retry_with_backoff, RetryConfig, RetryResult};

// ============================================================================
// Broker Abstraction
// ============================================================================
//
// One client instance per process, constructed by the composition root and
// passed by reference to everything that publishes or subscribes. Queues are
// durable, delivery is at-least-once, and a message is acknowledged only
// after its handler has succeeded. A delivery whose handler keeps failing is
// routed to `<queue>.dead_letter` instead of being retried forever or
// silently dropped.
//
// ============================================================================

pub const DEAD_LETTER_SUFFIX: &str = ".dead_letter";

pub fn dead_letter_queue(queue: &str) -> String {
    format!("{queue}{DEAD_LETTER_SUFFIX}")
}

pub type MessageHandler =
    Arc<dyn Fn(Vec<u8>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Adapt an async closure into a [`MessageHandler`].
pub fn handler<F, Fut>(f: F) -> MessageHandler
where
    F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |bytes| Box::pin(f(bytes)))
}

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    #[error("Publish to {queue} failed: {reason}")]
    Publish { queue: String, reason: String },

    #[error("Subscribe to {queue} failed: {reason}")]
    Subscribe { queue: String, reason: String },

    #[error("Broker client is closed")]
    Closed,
}

#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Declare `queue` (idempotent) and enqueue a persistent message.
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), BrokerError>;

    /// Declare `queue` (idempotent) and start consuming it. The returned
    /// handle owns the consumer task; dropping it detaches the consumer,
    /// [`Subscription::shutdown`] stops it and drains the in-flight handler.
    async fn subscribe(
        &self,
        queue: &str,
        handler: MessageHandler,
    ) -> Result<Subscription, BrokerError>;

    /// Release the underlying connection. Publishes after close fail.
    async fn close(&self);
}

/// Handle to a running consumer.
pub struct Subscription {
    queue: String,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl Subscription {
    pub(crate) fn new(queue: String, token: CancellationToken, task: JoinHandle<()>) -> Self {
        Self { queue, token, task }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Stop consuming and wait for the in-flight handler to finish.
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(err) = self.task.await {
            tracing::warn!(queue = %self.queue, error = %err, "Consumer task ended abnormally");
        }
    }
}

/// Run a handler for one delivery with bounded redelivery. An `Err` means
/// the attempt budget is spent and the message belongs on the dead-letter
/// queue.
pub(crate) async fn process_delivery(
    queue: &str,
    handler: &MessageHandler,
    payload: Vec<u8>,
    retry: &RetryConfig,
) -> anyhow::Result<()> {
    let result = retry_with_backoff(retry.clone(), queue, |_attempt| {
        let fut = handler(payload.clone());
        async move { fut.await }
    })
    .await;

    match result {
        RetryResult::Success(()) => Ok(()),
        RetryResult::Failed(err) => Err(err),
    }
}
