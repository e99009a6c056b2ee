use std::future::Future;
use std::sync::Arc;

use super::broker::{handler, BrokerError, MessageBroker, Subscription};
use crate::events::{Event, EventError, RoutingKey};
use crate::metrics::Metrics;

// ============================================================================
// Typed publish / subscribe over the broker
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error(transparent)]
    Encode(#[from] EventError),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// Publishes typed events to their routing-key queue.
#[derive(Clone)]
pub struct EventPublisher {
    broker: Arc<dyn MessageBroker>,
    metrics: Arc<Metrics>,
}

impl EventPublisher {
    pub fn new(broker: Arc<dyn MessageBroker>, metrics: Arc<Metrics>) -> Self {
        Self { broker, metrics }
    }

    pub async fn publish(&self, event: &Event) -> Result<(), PublishError> {
        let key = event.routing_key();
        let bytes = event.encode()?;

        match self.broker.publish(key.as_str(), &bytes).await {
            Ok(()) => {
                self.metrics.record_publish(key.as_str(), true);
                tracing::info!(routing_key = %key, "Event published");
                Ok(())
            }
            Err(err) => {
                self.metrics.record_publish(key.as_str(), false);
                Err(err.into())
            }
        }
    }

    /// Subscribe to one routing key with a typed handler. Decode failures
    /// count as handler failures, so malformed messages end up on the
    /// dead-letter queue instead of wedging the consumer.
    pub async fn subscribe<F, Fut>(
        &self,
        key: RoutingKey,
        f: F,
    ) -> Result<Subscription, BrokerError>
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let f = Arc::new(f);
        let metrics = self.metrics.clone();

        self.broker
            .subscribe(
                key.as_str(),
                handler(move |bytes| {
                    let f = f.clone();
                    let metrics = metrics.clone();
                    async move {
                        let event = Event::decode(key, &bytes)?;
                        match f(event).await {
                            Ok(()) => {
                                metrics.record_consume(key.as_str(), true);
                                Ok(())
                            }
                            Err(err) => {
                                metrics.record_consume(key.as_str(), false);
                                Err(err)
                            }
                        }
                    }
                }),
            )
            .await
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{FullName, UserRegistered};
    use crate::messaging::InMemoryBroker;
    use tokio::sync::mpsc;

    fn sample_user() -> UserRegistered {
        UserRegistered {
            id: "u1".to_string(),
            username: "jdoe".to_string(),
            email: "jdoe@example.com".to_string(),
            full_name: FullName {
                first_name: "Jo".to_string(),
                last_name: Some("Doe".to_string()),
            },
            role: "user".to_string(),
        }
    }

    #[tokio::test]
    async fn test_publish_then_typed_subscribe_delivers_event() {
        let broker = Arc::new(InMemoryBroker::new());
        let metrics = Arc::new(Metrics::new().unwrap());
        let publisher = EventPublisher::new(broker, metrics);

        let event = Event::user_created_for_notification(sample_user());
        publisher.publish(&event).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = publisher
            .subscribe(RoutingKey::UserCreatedForNotification, move |event| {
                let tx = tx.clone();
                async move {
                    tx.send(event).unwrap();
                    Ok(())
                }
            })
            .await
            .unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);

        sub.shutdown().await;
    }
}
