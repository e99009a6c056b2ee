use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Covers the order workflow and the event pipeline:
// - order creation outcomes
// - events published/consumed per routing key
// - outbound email handoffs
//
// Scraped via GET /metrics on the service's HTTP surface.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    pub orders_created: IntCounter,
    pub order_failures: IntCounterVec,

    pub events_published: IntCounterVec,
    pub publish_failures: IntCounterVec,
    pub events_consumed: IntCounterVec,
    pub consume_failures: IntCounterVec,

    pub order_creation_duration: HistogramVec,

    pub emails_sent: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_created = IntCounter::new("orders_created_total", "Orders successfully created")?;
        registry.register(Box::new(orders_created.clone()))?;

        let order_failures = IntCounterVec::new(
            Opts::new("order_failures_total", "Order operations that failed"),
            &["operation", "reason"],
        )?;
        registry.register(Box::new(order_failures.clone()))?;

        let events_published = IntCounterVec::new(
            Opts::new("events_published_total", "Events published to the broker"),
            &["routing_key"],
        )?;
        registry.register(Box::new(events_published.clone()))?;

        let publish_failures = IntCounterVec::new(
            Opts::new("event_publish_failures_total", "Event publishes that failed"),
            &["routing_key"],
        )?;
        registry.register(Box::new(publish_failures.clone()))?;

        let events_consumed = IntCounterVec::new(
            Opts::new("events_consumed_total", "Events consumed and applied"),
            &["routing_key"],
        )?;
        registry.register(Box::new(events_consumed.clone()))?;

        let consume_failures = IntCounterVec::new(
            Opts::new("event_consume_failures_total", "Event handler failures"),
            &["routing_key"],
        )?;
        registry.register(Box::new(consume_failures.clone()))?;

        let order_creation_duration = HistogramVec::new(
            HistogramOpts::new(
                "order_creation_duration_seconds",
                "End-to-end order creation latency",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["outcome"],
        )?;
        registry.register(Box::new(order_creation_duration.clone()))?;

        let emails_sent = IntCounterVec::new(
            Opts::new("emails_sent_total", "Emails handed to the mail transport"),
            &["template"],
        )?;
        registry.register(Box::new(emails_sent.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            order_failures,
            events_published,
            publish_failures,
            events_consumed,
            consume_failures,
            order_creation_duration,
            emails_sent,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_publish(&self, routing_key: &str, success: bool) {
        if success {
            self.events_published.with_label_values(&[routing_key]).inc();
        } else {
            self.publish_failures.with_label_values(&[routing_key]).inc();
        }
    }

    pub fn record_consume(&self, routing_key: &str, success: bool) {
        if success {
            self.events_consumed.with_label_values(&[routing_key]).inc();
        } else {
            self.consume_failures.with_label_values(&[routing_key]).inc();
        }
    }

    pub fn record_order_failure(&self, operation: &str, reason: &str) {
        self.order_failures
            .with_label_values(&[operation, reason])
            .inc();
    }

    pub fn record_email(&self, template: &str) {
        self.emails_sent.with_label_values(&[template]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert!(!metrics.registry.gather().is_empty());
    }

    #[test]
    fn test_record_publish_and_consume() {
        let metrics = Metrics::new().unwrap();
        metrics.record_publish("ORDER_SELLER_DASHBOARD.ORDER_CREATED", true);
        metrics.record_publish("ORDER_SELLER_DASHBOARD.ORDER_CREATED", false);
        metrics.record_consume("ORDER_SELLER_DASHBOARD.ORDER_CREATED", true);

        let gathered = metrics.registry.gather();
        let published = gathered
            .iter()
            .find(|m| m.name() == "events_published_total")
            .unwrap();
        assert_eq!(published.metric[0].counter.value, Some(1.0));

        let failed = gathered
            .iter()
            .find(|m| m.name() == "event_publish_failures_total")
            .unwrap();
        assert_eq!(failed.metric[0].counter.value, Some(1.0));
    }

    #[test]
    fn test_record_order_failure_labels() {
        let metrics = Metrics::new().unwrap();
        metrics.record_order_failure("create", "insufficient_stock");
        metrics.record_order_failure("cancel", "conflict");

        let gathered = metrics.registry.gather();
        let failures = gathered
            .iter()
            .find(|m| m.name() == "order_failures_total")
            .unwrap();
        assert_eq!(failures.metric.len(), 2);
    }
}
