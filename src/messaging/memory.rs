use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use super::broker::{
    dead_letter_queue, process_delivery, BrokerError, MessageBroker, MessageHandler, Subscription,
};
use crate::utils::RetryConfig;

// ============================================================================
// In-Memory Broker
// ============================================================================
//
// Queue semantics without a running broker: messages published before any
// consumer exists are buffered and delivered once a consumer subscribes,
// mirroring a durable queue's backlog. Used by tests and local runs.
//
// ============================================================================

struct QueueState {
    backlog: VecDeque<Vec<u8>>,
    consumer: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

impl QueueState {
    fn new() -> Self {
        Self {
            backlog: VecDeque::new(),
            consumer: None,
        }
    }
}

#[derive(Clone)]
pub struct InMemoryBroker {
    queues: Arc<Mutex<HashMap<String, QueueState>>>,
    closed: Arc<Mutex<bool>>,
    delivery_retry: RetryConfig,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::with_delivery_retry(RetryConfig {
            max_attempts: 3,
            initial_delay: std::time::Duration::from_millis(10),
            max_delay: std::time::Duration::from_millis(100),
            multiplier: 2.0,
        })
    }

    pub fn with_delivery_retry(delivery_retry: RetryConfig) -> Self {
        Self {
            queues: Arc::new(Mutex::new(HashMap::new())),
            closed: Arc::new(Mutex::new(false)),
            delivery_retry,
        }
    }

    /// Number of undelivered messages sitting on `queue`.
    pub async fn backlog_len(&self, queue: &str) -> usize {
        let queues = self.queues.lock().await;
        queues.get(queue).map(|q| q.backlog.len()).unwrap_or(0)
    }

    async fn enqueue(&self, queue: &str, payload: Vec<u8>) {
        let mut queues = self.queues.lock().await;
        let state = queues
            .entry(queue.to_string())
            .or_insert_with(QueueState::new);

        if let Some(tx) = &state.consumer {
            if tx.send(payload.clone()).is_ok() {
                return;
            }
            // Consumer went away; fall through to the backlog
            state.consumer = None;
        }
        state.backlog.push_back(payload);
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), BrokerError> {
        if *self.closed.lock().await {
            return Err(BrokerError::Closed);
        }
        self.enqueue(queue, payload.to_vec()).await;
        tracing::debug!(queue = queue, bytes = payload.len(), "Message enqueued");
        Ok(())
    }

    async fn subscribe(
        &self,
        queue: &str,
        handler: MessageHandler,
    ) -> Result<Subscription, BrokerError> {
        if *self.closed.lock().await {
            return Err(BrokerError::Closed);
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

        {
            let mut queues = self.queues.lock().await;
            let state = queues
                .entry(queue.to_string())
                .or_insert_with(QueueState::new);

            // Replay the backlog in publish order before live messages
            while let Some(pending) = state.backlog.pop_front() {
                let _ = tx.send(pending);
            }
            state.consumer = Some(tx);
        }

        let token = CancellationToken::new();
        let task_token = token.clone();
        let broker = self.clone();
        let queue_name = queue.to_string();
        let retry = self.delivery_retry.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    received = rx.recv() => {
                        let Some(payload) = received else { break };

                        if let Err(err) =
                            process_delivery(&queue_name, &handler, payload.clone(), &retry).await
                        {
                            tracing::error!(
                                queue = %queue_name,
                                error = %err,
                                "Handler failed after all redelivery attempts, dead-lettering"
                            );
                            broker
                                .enqueue(&dead_letter_queue(&queue_name), payload)
                                .await;
                        }
                    }
                }
            }
            tracing::debug!(queue = %queue_name, "Consumer stopped");
        });

        tracing::info!(queue = queue, "Subscribed to queue");
        Ok(Subscription::new(queue.to_string(), token, task))
    }

    async fn close(&self) {
        *self.closed.lock().await = true;
        let mut queues = self.queues.lock().await;
        for state in queues.values_mut() {
            state.consumer = None;
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::handler;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc as tokio_mpsc;

    fn fast_broker() -> InMemoryBroker {
        InMemoryBroker::with_delivery_retry(RetryConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
        })
    }

    #[tokio::test]
    async fn test_messages_published_before_subscribe_are_buffered() {
        let broker = fast_broker();
        broker.publish("q", b"one").await.unwrap();
        broker.publish("q", b"two").await.unwrap();
        assert_eq!(broker.backlog_len("q").await, 2);

        let (tx, mut rx) = tokio_mpsc::unbounded_channel();
        let sub = broker
            .subscribe(
                "q",
                handler(move |bytes| {
                    let tx = tx.clone();
                    async move {
                        tx.send(bytes).unwrap();
                        Ok(())
                    }
                }),
            )
            .await
            .unwrap();

        // Backlog is replayed in publish order
        assert_eq!(rx.recv().await.unwrap(), b"one");
        assert_eq!(rx.recv().await.unwrap(), b"two");
        assert_eq!(broker.backlog_len("q").await, 0);

        sub.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_handler_routes_message_to_dead_letter_queue() {
        let broker = fast_broker();
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let sub = broker
            .subscribe(
                "q",
                handler(move |_bytes| {
                    let attempts = attempts_clone.clone();
                    async move {
                        attempts.fetch_add(1, Ordering::SeqCst);
                        anyhow::bail!("handler down")
                    }
                }),
            )
            .await
            .unwrap();

        broker.publish("q", b"poison").await.unwrap();

        // Wait for the bounded redelivery to give up
        for _ in 0..100 {
            if broker.backlog_len("q.dead_letter").await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(broker.backlog_len("q.dead_letter").await, 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);

        sub.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_delivery() {
        let broker = fast_broker();
        let delivered = Arc::new(AtomicU32::new(0));
        let delivered_clone = delivered.clone();

        let sub = broker
            .subscribe(
                "q",
                handler(move |_bytes| {
                    let delivered = delivered_clone.clone();
                    async move {
                        delivered.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                }),
            )
            .await
            .unwrap();

        sub.shutdown().await;

        // Published after shutdown: lands on the backlog, not the handler
        broker.publish("q", b"late").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(delivered.load(Ordering::SeqCst), 0);
        assert_eq!(broker.backlog_len("q").await, 1);
    }

    #[tokio::test]
    async fn test_closed_broker_rejects_publish() {
        let broker = fast_broker();
        broker.close().await;
        let err = broker.publish("q", b"x").await.unwrap_err();
        assert!(matches!(err, BrokerError::Closed));
    }
}
