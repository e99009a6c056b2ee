use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::Message;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::broker::{
    dead_letter_queue, process_delivery, BrokerError, MessageBroker, MessageHandler, Subscription,
};
use crate::utils::{
    retry_with_backoff, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, RetryConfig,
};

// ============================================================================
// Kafka-backed Broker Client
// ============================================================================
//
// One producer shared by the whole process, created lazily on first use.
// Connection attempts retry on a fixed 5s interval; a failed publish drops
// the cached producer so the next call reconnects. The circuit breaker
// stops us from hammering a broker that is down.
//
// ============================================================================

const CONNECT_BACKOFF: Duration = Duration::from_secs(5);
const CONNECT_ATTEMPTS: u32 = 6;
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

pub struct KafkaBroker {
    brokers: String,
    group_id: String,
    producer: Mutex<Option<FutureProducer>>,
    closed: Mutex<bool>,
    breaker: CircuitBreaker,
    delivery_retry: RetryConfig,
}

impl KafkaBroker {
    pub fn new(brokers: &str, group_id: &str) -> Self {
        Self {
            brokers: brokers.to_string(),
            group_id: group_id.to_string(),
            producer: Mutex::new(None),
            closed: Mutex::new(false),
            breaker: CircuitBreaker::new(CircuitBreakerConfig {
                failure_threshold: 5,
                timeout: Duration::from_secs(30),
                success_threshold: 3,
            }),
            delivery_retry: RetryConfig::default(),
        }
    }

    /// Idempotent: returns the cached producer when one exists, otherwise
    /// connects with fixed-interval retries.
    async fn connect(&self) -> Result<FutureProducer, BrokerError> {
        if *self.closed.lock().await {
            return Err(BrokerError::Closed);
        }

        let mut guard = self.producer.lock().await;
        if let Some(producer) = guard.as_ref() {
            return Ok(producer.clone());
        }

        let brokers = self.brokers.clone();
        let producer = retry_with_backoff(
            RetryConfig::fixed(CONNECT_ATTEMPTS, CONNECT_BACKOFF),
            "kafka_connect",
            |_attempt| {
                let brokers = brokers.clone();
                async move {
                    ClientConfig::new()
                        .set("bootstrap.servers", &brokers)
                        .set("message.timeout.ms", "5000")
                        .create::<FutureProducer>()
                }
            },
        )
        .await
        .into_result()
        .map_err(|e| BrokerError::Unavailable(e.to_string()))?;

        tracing::info!(brokers = %self.brokers, "Connected to broker");
        *guard = Some(producer.clone());
        Ok(producer)
    }

    /// Forget the cached producer so the next operation reconnects.
    async fn reset_connection(&self) {
        let mut guard = self.producer.lock().await;
        *guard = None;
        tracing::warn!("Broker connection reset, will reconnect on next use");
    }

    async fn send(&self, producer: &FutureProducer, queue: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let result = self
            .breaker
            .call(async {
                let record = FutureRecord::to(queue).key(queue).payload(payload);
                producer
                    .send(record, rdkafka::util::Timeout::After(SEND_TIMEOUT))
                    .await
                    .map_err(|(e, _)| e)
            })
            .await;

        match result {
            Ok(_) => {
                tracing::info!(queue = queue, "Published to broker");
                Ok(())
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::error!(queue = queue, "Circuit breaker open, broker unavailable");
                Err(BrokerError::Unavailable("circuit breaker open".to_string()))
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::error!(queue = queue, error = %e, "Publish failed");
                self.reset_connection().await;
                Err(BrokerError::Publish {
                    queue: queue.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    fn build_consumer(&self, queue: &str) -> Result<StreamConsumer, BrokerError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(|e| BrokerError::Subscribe {
                queue: queue.to_string(),
                reason: e.to_string(),
            })?;

        consumer
            .subscribe(&[queue])
            .map_err(|e| BrokerError::Subscribe {
                queue: queue.to_string(),
                reason: e.to_string(),
            })?;

        Ok(consumer)
    }
}

#[async_trait]
impl MessageBroker for KafkaBroker {
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let producer = self.connect().await?;
        self.send(&producer, queue, payload).await
    }

    async fn subscribe(
        &self,
        queue: &str,
        handler: MessageHandler,
    ) -> Result<Subscription, BrokerError> {
        if *self.closed.lock().await {
            return Err(BrokerError::Closed);
        }

        let consumer = self.build_consumer(queue)?;
        // Dedicated producer handle for dead-letter routing inside the loop
        let dlq_producer = self.connect().await?;

        let token = CancellationToken::new();
        let task_token = token.clone();
        let queue_name = queue.to_string();
        let retry = self.delivery_retry.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    received = consumer.recv() => {
                        let message = match received {
                            Ok(m) => m,
                            Err(err) => {
                                // Transport hiccup; the driver reconnects underneath
                                tracing::warn!(queue = %queue_name, error = %err, "Receive error");
                                tokio::time::sleep(CONNECT_BACKOFF).await;
                                continue;
                            }
                        };

                        let payload = message.payload().map(<[u8]>::to_vec).unwrap_or_default();

                        if let Err(err) =
                            process_delivery(&queue_name, &handler, payload.clone(), &retry).await
                        {
                            tracing::error!(
                                queue = %queue_name,
                                error = %err,
                                "Handler failed after all redelivery attempts, dead-lettering"
                            );
                            let dlq = dead_letter_queue(&queue_name);
                            let record = FutureRecord::to(dlq.as_str())
                                .key(queue_name.as_str())
                                .payload(&payload);
                            if let Err((e, _)) = dlq_producer
                                .send(record, rdkafka::util::Timeout::After(SEND_TIMEOUT))
                                .await
                            {
                                tracing::error!(queue = %dlq, error = %e, "Dead-letter publish failed");
                            }
                        }

                        // Acknowledge only once the message is handled or dead-lettered
                        if let Err(err) = consumer.commit_message(&message, CommitMode::Async) {
                            tracing::warn!(queue = %queue_name, error = %err, "Commit failed");
                        }
                    }
                }
            }
            tracing::info!(queue = %queue_name, "Consumer stopped");
        });

        tracing::info!(queue = queue, "Subscribed to queue");
        Ok(Subscription::new(queue.to_string(), token, task))
    }

    async fn close(&self) {
        *self.closed.lock().await = true;
        let mut guard = self.producer.lock().await;
        *guard = None;
        tracing::info!("Broker client closed");
    }
}
