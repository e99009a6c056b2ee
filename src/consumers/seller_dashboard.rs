use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::order::Order;
use crate::domain::payment::PaymentRecord;
use crate::events::{Event, EventPayload, ProductListed, RoutingKey, UserRegistered};
use crate::messaging::{BrokerError, EventPublisher, Subscription};

// ============================================================================
// Seller Dashboard Projection
// ============================================================================
//
// Read model fed entirely by events: local copies of users, products, orders
// and payments so dashboard queries never call the owning services. Delivery
// is at-least-once, so every apply is keyed by the document id and a
// redelivered event lands on an existing key as a no-op.
//
// ============================================================================

#[derive(Default)]
struct Projections {
    users: HashMap<String, UserRegistered>,
    products: HashMap<String, ProductListed>,
    orders: HashMap<Uuid, Order>,
    /// Keyed by order id; PAYMENT_UPDATED replaces the record for its order.
    payments: HashMap<Uuid, PaymentRecord>,
}

#[derive(Default)]
pub struct DashboardStore {
    inner: RwLock<Projections>,
}

impl DashboardStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn apply(&self, event: Event) -> anyhow::Result<()> {
        let key = event.routing_key();
        let mut inner = self.inner.write().await;

        match event.into_payload() {
            EventPayload::Order(order) => {
                if inner.orders.contains_key(&order.id) {
                    tracing::debug!(order_id = %order.id, "Duplicate order event ignored");
                    return Ok(());
                }
                tracing::info!(order_id = %order.id, "Order projected to dashboard");
                inner.orders.insert(order.id, order);
            }
            EventPayload::Payment(payment) => match key {
                RoutingKey::PaymentUpdated => {
                    tracing::info!(order_id = %payment.order_id, status = ?payment.status, "Payment updated on dashboard");
                    inner.payments.insert(payment.order_id, payment);
                }
                _ => {
                    if inner.payments.contains_key(&payment.order_id) {
                        tracing::debug!(order_id = %payment.order_id, "Duplicate payment event ignored");
                        return Ok(());
                    }
                    inner.payments.insert(payment.order_id, payment);
                }
            },
            EventPayload::UserRegistered(user) => {
                if inner.users.contains_key(&user.id) {
                    tracing::debug!(user_id = %user.id, "Duplicate user event ignored");
                    return Ok(());
                }
                inner.users.insert(user.id.clone(), user);
            }
            EventPayload::ProductListed(product) => {
                if inner.products.contains_key(&product.id) {
                    tracing::debug!(product_id = %product.id, "Duplicate product event ignored");
                    return Ok(());
                }
                inner.products.insert(product.id.clone(), product);
            }
            EventPayload::PaymentNotice(_) => {
                anyhow::bail!("payment notice does not belong on a dashboard queue")
            }
        }

        Ok(())
    }

    pub async fn order(&self, id: Uuid) -> Option<Order> {
        self.inner.read().await.orders.get(&id).cloned()
    }

    pub async fn payment_for_order(&self, order_id: Uuid) -> Option<PaymentRecord> {
        self.inner.read().await.payments.get(&order_id).cloned()
    }

    pub async fn user(&self, id: &str) -> Option<UserRegistered> {
        self.inner.read().await.users.get(id).cloned()
    }

    pub async fn product(&self, id: &str) -> Option<ProductListed> {
        self.inner.read().await.products.get(id).cloned()
    }

    pub async fn order_count(&self) -> usize {
        self.inner.read().await.orders.len()
    }
}

/// The running dashboard consumer: one subscription per feed queue.
pub struct DashboardProjection {
    subscriptions: Vec<Subscription>,
}

impl DashboardProjection {
    pub async fn start(
        publisher: &EventPublisher,
        store: Arc<DashboardStore>,
    ) -> Result<Self, BrokerError> {
        let keys = [
            RoutingKey::OrderCreated,
            RoutingKey::PaymentCreated,
            RoutingKey::PaymentUpdated,
            RoutingKey::UserCreatedForDashboard,
            RoutingKey::ProductCreatedForDashboard,
        ];

        let mut subscriptions = Vec::with_capacity(keys.len());
        for key in keys {
            let store = store.clone();
            let sub = publisher
                .subscribe(key, move |event| {
                    let store = store.clone();
                    async move { store.apply(event).await }
                })
                .await?;
            subscriptions.push(sub);
        }

        tracing::info!("Seller dashboard projection started");
        Ok(Self { subscriptions })
    }

    pub async fn shutdown(self) {
        for sub in self.subscriptions {
            sub.shutdown().await;
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
