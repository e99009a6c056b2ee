use std::sync::Arc;
use std::time::Instant;

use futures_util::future::try_join_all;
use uuid::Uuid;

use crate::clients::{CartSource, ClientError, ProductSource};
use crate::domain::order::{AddressIssue, Order, OrderError, ShippingAddress};
use crate::events::Event;
use crate::messaging::EventPublisher;
use crate::metrics::Metrics;
use crate::storage::{OrderStore, Page, StoreError};

// ============================================================================
// Order Service - Orchestrator
// ============================================================================
//
// Owns the order lifecycle end to end: assembles an order from a live cart
// snapshot priced against live product data, persists it, publishes the
// creation event, and enforces the status state machine on every mutation.
//
// ============================================================================

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 50;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{message}")]
    Validation {
        message: String,
        issues: Vec<AddressIssue>,
    },

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// A collaborator call failed; its status and message pass through.
    #[error("{message}")]
    Upstream { status: u16, message: String },

    #[error("Internal Server Error")]
    Internal(#[source] anyhow::Error),
}

impl ServiceError {
    fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation {
            message: message.into(),
            issues: Vec::new(),
        }
    }

    /// Label used for failure metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            ServiceError::Validation { .. } => "validation",
            ServiceError::Forbidden(_) => "forbidden",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::Upstream { .. } => "upstream",
            ServiceError::Internal(_) => "internal",
        }
    }
}

impl From<ClientError> for ServiceError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Status { status, .. } => ServiceError::Upstream {
                status,
                message: err.to_string(),
            },
            ClientError::Transport { .. } | ClientError::Decode { .. } => ServiceError::Upstream {
                status: 503,
                message: err.to_string(),
            },
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ServiceError::NotFound("Order not found".to_string()),
            StoreError::VersionConflict { .. } => {
                ServiceError::Conflict("Order was modified concurrently, please retry".to_string())
            }
            StoreError::Duplicate | StoreError::Backend(_) => {
                ServiceError::Internal(anyhow::anyhow!(err))
            }
        }
    }
}

impl From<OrderError> for ServiceError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::CannotCancel(_) | OrderError::AddressLocked(_) => {
                ServiceError::Conflict(err.to_string())
            }
            OrderError::EmptyCart
            | OrderError::ProductNotFound(_)
            | OrderError::InsufficientStock { .. }
            | OrderError::InvalidQuantity { .. } => ServiceError::validation(err.to_string()),
        }
    }
}

pub struct OrderService {
    store: Arc<dyn OrderStore>,
    carts: Arc<dyn CartSource>,
    products: Arc<dyn ProductSource>,
    publisher: EventPublisher,
    metrics: Arc<Metrics>,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        carts: Arc<dyn CartSource>,
        products: Arc<dyn ProductSource>,
        publisher: EventPublisher,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            carts,
            products,
            publisher,
            metrics,
        }
    }

    /// Build an order from the caller's current cart, persist it as PENDING
    /// and publish the creation event.
    ///
    /// The cart and every product are read with the caller's own credential.
    /// Product lookups fan out in parallel and are all awaited before any
    /// total is computed; any failure aborts before persistence, so a
    /// partial order is never written.
    pub async fn create_order(
        &self,
        user: &str,
        token: &str,
        shipping_address: ShippingAddress,
    ) -> Result<Order, ServiceError> {
        let started = Instant::now();
        let result = self.create_order_inner(user, token, shipping_address).await;

        match &result {
            Ok(order) => {
                self.metrics.orders_created.inc();
                self.metrics
                    .order_creation_duration
                    .with_label_values(&["success"])
                    .observe(started.elapsed().as_secs_f64());
                tracing::info!(
                    order_id = %order.id,
                    user = user,
                    total = %order.total_price.amount,
                    "Order created"
                );
            }
            Err(err) => {
                self.metrics.record_order_failure("create", err.reason());
                self.metrics
                    .order_creation_duration
                    .with_label_values(&["failure"])
                    .observe(started.elapsed().as_secs_f64());
            }
        }

        result
    }

    async fn create_order_inner(
        &self,
        user: &str,
        token: &str,
        shipping_address: ShippingAddress,
    ) -> Result<Order, ServiceError> {
        if let Err(issues) = shipping_address.validate() {
            return Err(ServiceError::Validation {
                message: "Shipping address is required".to_string(),
                issues,
            });
        }

        let lines = self.carts.fetch_cart(token).await?;
        if lines.is_empty() {
            return Err(ServiceError::validation("Cart is empty"));
        }

        // One lookup per distinct cart line, in parallel, all awaited
        let products = try_join_all(
            lines
                .iter()
                .map(|line| self.products.fetch_product(token, &line.product_id)),
        )
        .await?;

        let order = Order::from_cart(user, &lines, &products, shipping_address)?;

        self.store.insert(order.clone()).await?;

        // The order exists once persisted; a publish failure delays the
        // downstream projection but does not undo the order.
        if let Err(err) = self
            .publisher
            .publish(&Event::order_created(order.clone()))
            .await
        {
            tracing::error!(order_id = %order.id, error = %err, "Order created but event publish failed");
        }

        Ok(order)
    }

    /// The caller's own orders, oldest first. `limit` is capped server-side.
    pub async fn my_orders(
        &self,
        user: &str,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<Page, ServiceError> {
        let page = page.unwrap_or(1).max(1);
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        Ok(self.store.list_by_user(user, page, limit).await?)
    }

    pub async fn get_order(&self, user: &str, id: Uuid) -> Result<Order, ServiceError> {
        let order = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

        if !order.is_owned_by(user) {
            return Err(ServiceError::Forbidden(
                "Forbidden: you cannot access this order".to_string(),
            ));
        }

        Ok(order)
    }

    /// Cancel a PENDING order owned by `user`.
    pub async fn cancel_order(&self, user: &str, id: Uuid) -> Result<Order, ServiceError> {
        let mut order = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

        if !order.is_owned_by(user) {
            self.metrics.record_order_failure("cancel", "forbidden");
            return Err(ServiceError::Forbidden(
                "You are not allowed to cancel this order".to_string(),
            ));
        }

        if let Err(err) = order.cancel() {
            self.metrics.record_order_failure("cancel", "conflict");
            return Err(err.into());
        }

        self.store.update(&order).await?;
        tracing::info!(order_id = %order.id, user = user, "Order cancelled");
        Ok(order)
    }

    /// Replace the shipping address of a PENDING order owned by `user`.
    pub async fn update_address(
        &self,
        user: &str,
        id: Uuid,
        address: ShippingAddress,
    ) -> Result<Order, ServiceError> {
        if let Err(issues) = address.validate() {
            return Err(ServiceError::Validation {
                message: "Shipping address is required".to_string(),
                issues,
            });
        }

        let mut order = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

        if !order.is_owned_by(user) {
            return Err(ServiceError::Forbidden(
                "Forbidden: you cannot change the shipping address of this order".to_string(),
            ));
        }

        order.update_address(address)?;
        self.store.update(&order).await?;
        tracing::info!(order_id = %order.id, user = user, "Shipping address updated");
        Ok(order)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{
        CartLine, Currency, Money, OrderStatus, ProductSnapshot, SETTLEMENT_CURRENCY,
    };
    use crate::events::RoutingKey;
    use crate::messaging::InMemoryBroker;
    use crate::storage::InMemoryOrderStore;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use tokio::sync::mpsc;

    struct FakeCart {
        lines: Vec<CartLine>,
    }

    #[async_trait]
    impl CartSource for FakeCart {
        async fn fetch_cart(&self, _token: &str) -> Result<Vec<CartLine>, ClientError> {
            Ok(self.lines.clone())
        }
    }

    struct FakeProducts {
        products: HashMap<String, ProductSnapshot>,
        failure: Option<(u16, String)>,
    }

    #[async_trait]
    impl ProductSource for FakeProducts {
        async fn fetch_product(
            &self,
            _token: &str,
            product_id: &str,
        ) -> Result<ProductSnapshot, ClientError> {
            if let Some((status, message)) = &self.failure {
                return Err(ClientError::Status {
                    service: "product",
                    status: *status,
                    message: message.clone(),
                });
            }
            self.products
                .get(product_id)
                .cloned()
                .ok_or(ClientError::Status {
                    service: "product",
                    status: 404,
                    message: "Product not found".to_string(),
                })
        }
    }

    struct Harness {
        service: OrderService,
        store: Arc<InMemoryOrderStore>,
        publisher: EventPublisher,
    }

    fn address() -> ShippingAddress {
        ShippingAddress {
            street: "123 Main St".to_string(),
            city: "Metropolis".to_string(),
            state: "CA".to_string(),
            pincode: "90210".to_string(),
            country: "USA".to_string(),
        }
    }

    fn harness(lines: Vec<CartLine>, products: Vec<ProductSnapshot>) -> Harness {
        harness_with_failure(lines, products, None)
    }

    fn harness_with_failure(
        lines: Vec<CartLine>,
        products: Vec<ProductSnapshot>,
        failure: Option<(u16, String)>,
    ) -> Harness {
        let store = Arc::new(InMemoryOrderStore::new());
        let broker = Arc::new(InMemoryBroker::new());
        let metrics = Arc::new(Metrics::new().unwrap());
        let publisher = EventPublisher::new(broker, metrics.clone());

        let service = OrderService::new(
            store.clone(),
            Arc::new(FakeCart { lines }),
            Arc::new(FakeProducts {
                products: products.into_iter().map(|p| (p.id.clone(), p)).collect(),
                failure,
            }),
            publisher.clone(),
            metrics,
        );

        Harness {
            service,
            store,
            publisher,
        }
    }

    fn product(id: &str, amount: rust_decimal::Decimal, stock: u32) -> ProductSnapshot {
        ProductSnapshot {
            id: id.to_string(),
            title: format!("Product {}", id),
            price: Money::new(amount, Currency::Inr),
            stock,
        }
    }

    fn line(id: &str, quantity: u32) -> CartLine {
        CartLine {
            product_id: id.to_string(),
            quantity,
        }
    }

    #[tokio::test]
    async fn test_create_order_prices_cart_and_publishes_event() {
        let h = harness(vec![line("P1", 2)], vec![product("P1", dec!(100), 10)]);

        let order = h
            .service
            .create_order("user-1", "jwt", address())
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].quantity, 2);
        assert_eq!(order.total_price.amount, dec!(200));
        assert_eq!(order.total_price.currency, SETTLEMENT_CURRENCY);

        // Persisted
        let stored = h.store.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored, order);

        // Exactly one creation event with the same id
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = h
            .publisher
            .subscribe(RoutingKey::OrderCreated, move |event| {
                let tx = tx.clone();
                async move {
                    tx.send(event).unwrap();
                    Ok(())
                }
            })
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        match event.payload() {
            crate::events::EventPayload::Order(published) => {
                assert_eq!(published.id, order.id);
                assert_eq!(published.total_price.amount, dec!(200));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
        sub.shutdown().await;
    }

    #[tokio::test]
    async fn test_create_order_rejects_invalid_address_before_any_io() {
        let h = harness(vec![line("P1", 1)], vec![product("P1", dec!(10), 5)]);
        let mut bad = address();
        bad.street = String::new();

        let err = h
            .service
            .create_order("user-1", "jwt", bad)
            .await
            .unwrap_err();

        match err {
            ServiceError::Validation { issues, .. } => {
                assert_eq!(issues.len(), 1);
                assert_eq!(issues[0].field, "street");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_create_order_rejects_empty_cart() {
        let h = harness(vec![], vec![]);
        let err = h
            .service
            .create_order("user-1", "jwt", address())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_create_order_insufficient_stock_persists_nothing() {
        let h = harness(vec![line("P1", 5)], vec![product("P1", dec!(10), 3)]);

        let err = h
            .service
            .create_order("user-1", "jwt", address())
            .await
            .unwrap_err();

        match err {
            ServiceError::Validation { message, .. } => {
                assert!(message.contains("insufficient stock"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }

        let page = h.store.list_by_user("user-1", 1, 10).await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_create_order_passes_collaborator_failure_through() {
        let h = harness_with_failure(
            vec![line("P1", 1)],
            vec![],
            Some((502, "upstream exploded".to_string())),
        );

        let err = h
            .service
            .create_order("user-1", "jwt", address())
            .await
            .unwrap_err();

        match err {
            ServiceError::Upstream { status, message } => {
                assert_eq!(status, 502);
                assert!(message.contains("upstream exploded"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let page = h.store.list_by_user("user-1", 1, 10).await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_get_order_enforces_ownership() {
        let h = harness(vec![line("P1", 1)], vec![product("P1", dec!(10), 5)]);
        let order = h
            .service
            .create_order("user-1", "jwt", address())
            .await
            .unwrap();

        let fetched = h.service.get_order("user-1", order.id).await.unwrap();
        assert_eq!(fetched.id, order.id);

        let err = h.service.get_order("intruder", order.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let err = h
            .service
            .get_order("user-1", Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_cancel_order_rules() {
        let h = harness(vec![line("P1", 1)], vec![product("P1", dec!(10), 5)]);
        let order = h
            .service
            .create_order("user-1", "jwt", address())
            .await
            .unwrap();

        // Non-owner is forbidden and the order is untouched
        let err = h
            .service
            .cancel_order("intruder", order.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
        let stored = h.store.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);

        // Owner cancels a PENDING order
        let cancelled = h.service.cancel_order("user-1", order.id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);

        // A second cancel is a conflict
        let err = h.service.cancel_order("user-1", order.id).await.unwrap_err();
        match err {
            ServiceError::Conflict(message) => {
                assert!(message.to_lowercase().contains("cannot cancel"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_cancel_shipped_order_is_conflict_and_unchanged() {
        let h = harness(vec![line("P1", 1)], vec![product("P1", dec!(10), 5)]);
        let order = h
            .service
            .create_order("user-1", "jwt", address())
            .await
            .unwrap();

        // Ship it out-of-band
        let mut shipped = h.store.get(order.id).await.unwrap().unwrap();
        shipped.status = OrderStatus::Shipped;
        shipped.version += 1;
        h.store.update(&shipped).await.unwrap();

        let err = h.service.cancel_order("user-1", order.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        let stored = h.store.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Shipped);
    }

    #[tokio::test]
    async fn test_update_address_rules() {
        let h = harness(vec![line("P1", 1)], vec![product("P1", dec!(10), 5)]);
        let order = h
            .service
            .create_order("user-1", "jwt", address())
            .await
            .unwrap();

        let mut new_address = address();
        new_address.city = "Gotham".to_string();

        let err = h
            .service
            .update_address("intruder", order.id, new_address.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let updated = h
            .service
            .update_address("user-1", order.id, new_address.clone())
            .await
            .unwrap();
        assert_eq!(updated.shipping_address.city, "Gotham");

        // Address changes are locked once the order is no longer PENDING
        h.service.cancel_order("user-1", order.id).await.unwrap();
        let err = h
            .service
            .update_address("user-1", order.id, new_address)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_my_orders_pagination_and_cap() {
        let h = harness(vec![line("P1", 1)], vec![product("P1", dec!(10), 100)]);
        for _ in 0..7 {
            h.service
                .create_order("user-1", "jwt", address())
                .await
                .unwrap();
        }

        let page = h
            .service
            .my_orders("user-1", Some(2), Some(5))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 7);
        assert_eq!(page.page, 2);
        assert_eq!(page.limit, 5);

        // Defaults
        let page = h.service.my_orders("user-1", None, None).await.unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.limit, DEFAULT_PAGE_SIZE);

        // Server-side cap on the requested limit
        let page = h
            .service
            .my_orders("user-1", Some(1), Some(10_000))
            .await
            .unwrap();
        assert_eq!(page.limit, MAX_PAGE_SIZE);
    }
}
