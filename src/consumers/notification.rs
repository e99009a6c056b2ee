use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::events::{Event, EventPayload, PaymentNotice, ProductListed, RoutingKey, UserRegistered};
use crate::messaging::{BrokerError, EventPublisher, Subscription};
use crate::metrics::Metrics;

// ============================================================================
// Notification Consumer
// ============================================================================
//
// Turns lifecycle events into user-facing emails. Delivery is at-least-once,
// so each composed email carries a dedupe key; a redelivered event whose key
// was already sent is dropped instead of mailing the user twice.
//
// ============================================================================

/// Rendered message: a plain-text part and an HTML part.
#[derive(Debug, Clone)]
pub struct EmailBody {
    pub text: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &EmailBody) -> anyhow::Result<()>;
}

/// Mail transport stand-in that only logs. Used until a real SMTP or
/// provider-backed transport is wired in.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &EmailBody) -> anyhow::Result<()> {
        tracing::info!(to = to, subject = subject, bytes = body.text.len(), "Email dispatched");
        Ok(())
    }
}

struct Composed {
    template: &'static str,
    dedupe_key: String,
    to: String,
    subject: String,
    body: EmailBody,
}

fn body(greeting: &str, line: &str) -> EmailBody {
    EmailBody {
        text: format!("Hi {greeting},\n\n{line}"),
        html: format!("<p>Hi {greeting},</p><p>{line}</p>"),
    }
}

fn welcome(user: &UserRegistered) -> Composed {
    Composed {
        template: "welcome",
        dedupe_key: format!("welcome:{}", user.id),
        to: user.email.clone(),
        subject: "Welcome to Supernova".to_string(),
        body: body(
            &user.full_name.first_name,
            &format!("Your account {} is ready. Happy shopping!", user.username),
        ),
    }
}

fn payment_notice(key: RoutingKey, notice: &PaymentNotice) -> Composed {
    let (template, subject, line) = match key {
        RoutingKey::PaymentCompleted => (
            "payment_completed",
            "Your payment was successful",
            "has been received",
        ),
        RoutingKey::PaymentFailed => (
            "payment_failed",
            "Your payment failed",
            "could not be processed",
        ),
        _ => (
            "payment_initiated",
            "Your payment is being processed",
            "is being processed",
        ),
    };

    Composed {
        template,
        dedupe_key: format!("{template}:{}", notice.order_id),
        to: notice.email.clone(),
        subject: subject.to_string(),
        body: body(
            &notice.username,
            &format!(
                "Your payment of {} {} for order {} {}.",
                notice.amount, notice.currency, notice.order_id, line
            ),
        ),
    }
}

fn product_launched(product: &ProductListed) -> Composed {
    Composed {
        template: "product_launched",
        dedupe_key: format!("product_launched:{}", product.id),
        to: product.email.clone(),
        subject: format!("{} is now live", product.title),
        body: body(
            &product.seller,
            &format!(
                "Your listing {} is live at {} {}.",
                product.title, product.price.amount, product.price.currency
            ),
        ),
    }
}

pub struct NotificationService {
    mailer: Arc<dyn Mailer>,
    metrics: Arc<Metrics>,
    sent: Mutex<HashSet<String>>,
}

impl NotificationService {
    pub fn new(mailer: Arc<dyn Mailer>, metrics: Arc<Metrics>) -> Self {
        Self {
            mailer,
            metrics,
            sent: Mutex::new(HashSet::new()),
        }
    }

    pub async fn handle(&self, event: Event) -> anyhow::Result<()> {
        let key = event.routing_key();

        let composed = match event.payload() {
            EventPayload::UserRegistered(user) => welcome(user),
            EventPayload::PaymentNotice(notice) => payment_notice(key, notice),
            EventPayload::ProductListed(product) => product_launched(product),
            other => anyhow::bail!("no notification is defined for payload {other:?}"),
        };

        {
            let mut sent = self.sent.lock().await;
            if !sent.insert(composed.dedupe_key.clone()) {
                tracing::debug!(key = %composed.dedupe_key, "Duplicate notification skipped");
                return Ok(());
            }
        }

        if let Err(err) = self
            .mailer
            .send(&composed.to, &composed.subject, &composed.body)
            .await
        {
            // Allow the retry/dead-letter path to take another shot
            self.sent.lock().await.remove(&composed.dedupe_key);
            return Err(err);
        }

        self.metrics.record_email(composed.template);
        Ok(())
    }

    pub async fn start(
        self: Arc<Self>,
        publisher: &EventPublisher,
    ) -> Result<Vec<Subscription>, BrokerError> {
        let keys = [
            RoutingKey::UserCreatedForNotification,
            RoutingKey::PaymentInitiated,
            RoutingKey::PaymentCompleted,
            RoutingKey::PaymentFailed,
            RoutingKey::ProductCreatedForNotification,
        ];

        let mut subscriptions = Vec::with_capacity(keys.len());
        for key in keys {
            let service = self.clone();
            let sub = publisher
                .subscribe(key, move |event| {
                    let service = service.clone();
                    async move { service.handle(event).await }
                })
                .await?;
            subscriptions.push(sub);
        }

        tracing::info!("Notification consumer started");
        Ok(subscriptions)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
