use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::order::{Currency, Money, Order};
use crate::domain::payment::PaymentRecord;

// ============================================================================
// Domain Event Contract
// ============================================================================
//
// Every queue carries a versioned envelope with an explicitly typed payload.
// The payload kind is validated against the routing key on both the publish
// and consume side, so a producer can never put the wrong document on a
// queue and a consumer can never misread one.
//
// ============================================================================

pub const SCHEMA_VERSION: u32 = 1;

/// Queue names follow the `<PRODUCER>_<CONSUMER>.<EVENT>` convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoutingKey {
    OrderCreated,
    PaymentCreated,
    PaymentUpdated,
    PaymentInitiated,
    PaymentCompleted,
    PaymentFailed,
    UserCreatedForDashboard,
    UserCreatedForNotification,
    ProductCreatedForDashboard,
    ProductCreatedForNotification,
}

impl RoutingKey {
    pub fn as_str(self) -> &'static str {
        match self {
            RoutingKey::OrderCreated => "ORDER_SELLER_DASHBOARD.ORDER_CREATED",
            RoutingKey::PaymentCreated => "PAYMENT_SELLER_DASHBOARD.PAYMENT_CREATED",
            RoutingKey::PaymentUpdated => "PAYMENT_SELLER_DASHBOARD.PAYMENT_UPDATED",
            RoutingKey::PaymentInitiated => "PAYMENT_NOTIFICATION.PAYMENT_INITIATED",
            RoutingKey::PaymentCompleted => "PAYMENT_NOTIFICATION.PAYMENT_COMPLETED",
            RoutingKey::PaymentFailed => "PAYMENT_NOTIFICATION.PAYMENT_FAILED",
            RoutingKey::UserCreatedForDashboard => "AUTH_SELLER_DASHBOARD.USER_CREATED",
            RoutingKey::UserCreatedForNotification => "AUTH_NOTIFICATION.USER_CREATED",
            RoutingKey::ProductCreatedForDashboard => "PRODUCT_SELLER_DASHBOARD.PRODUCT_CREATED",
            RoutingKey::ProductCreatedForNotification => "PRODUCT_NOTIFICATION.PRODUCT_CREATED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let all = [
            RoutingKey::OrderCreated,
            RoutingKey::PaymentCreated,
            RoutingKey::PaymentUpdated,
            RoutingKey::PaymentInitiated,
            RoutingKey::PaymentCompleted,
            RoutingKey::PaymentFailed,
            RoutingKey::UserCreatedForDashboard,
            RoutingKey::UserCreatedForNotification,
            RoutingKey::ProductCreatedForDashboard,
            RoutingKey::ProductCreatedForNotification,
        ];
        all.into_iter().find(|k| k.as_str() == s)
    }

    fn expected_kind(self) -> PayloadKind {
        match self {
            RoutingKey::OrderCreated => PayloadKind::Order,
            RoutingKey::PaymentCreated | RoutingKey::PaymentUpdated => PayloadKind::Payment,
            RoutingKey::PaymentInitiated
            | RoutingKey::PaymentCompleted
            | RoutingKey::PaymentFailed => PayloadKind::PaymentNotice,
            RoutingKey::UserCreatedForDashboard | RoutingKey::UserCreatedForNotification => {
                PayloadKind::UserRegistered
            }
            RoutingKey::ProductCreatedForDashboard | RoutingKey::ProductCreatedForNotification => {
                PayloadKind::ProductListed
            }
        }
    }
}

impl std::fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Order,
    Payment,
    PaymentNotice,
    UserRegistered,
    ProductListed,
}

// ============================================================================
// Payload schemas
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullName {
    pub first_name: String,
    pub last_name: Option<String>,
}

/// Copy of a newly registered account, projected by the dashboard and used
/// for the welcome email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRegistered {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: FullName,
    pub role: String,
}

/// Copy of a newly listed product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductListed {
    pub id: String,
    pub title: String,
    pub price: Money,
    pub seller: String,
    /// Seller's email, addressed by the launch notification.
    pub email: String,
}

/// Payment lifecycle notice addressed to the buying user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentNotice {
    pub order_id: Uuid,
    pub username: String,
    pub email: String,
    pub amount: Decimal,
    pub currency: Currency,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    Order(Order),
    Payment(PaymentRecord),
    PaymentNotice(PaymentNotice),
    UserRegistered(UserRegistered),
    ProductListed(ProductListed),
}

impl EventPayload {
    fn kind(&self) -> PayloadKind {
        match self {
            EventPayload::Order(_) => PayloadKind::Order,
            EventPayload::Payment(_) => PayloadKind::Payment,
            EventPayload::PaymentNotice(_) => PayloadKind::PaymentNotice,
            EventPayload::UserRegistered(_) => PayloadKind::UserRegistered,
            EventPayload::ProductListed(_) => PayloadKind::ProductListed,
        }
    }
}

// ============================================================================
// Envelope
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Malformed event payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unsupported event schema version {0}")]
    UnsupportedSchema(u32),

    #[error("Unknown routing key: {0}")]
    UnknownRoutingKey(String),

    #[error("Event for {expected} arrived on queue {found}")]
    RoutingKeyMismatch { expected: String, found: String },

    #[error("Payload kind {kind:?} is not valid for routing key {key}")]
    PayloadKindMismatch { key: &'static str, kind: PayloadKind },
}

/// A routed, immutable domain fact. Constructors pair each payload with its
/// legal routing key, so an `Event` is well-formed by construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    key: RoutingKey,
    payload: EventPayload,
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    schema_version: u32,
    routing_key: String,
    payload: EventPayload,
}

impl Event {
    pub fn order_created(order: Order) -> Self {
        Self {
            key: RoutingKey::OrderCreated,
            payload: EventPayload::Order(order),
        }
    }

    pub fn payment_created(payment: PaymentRecord) -> Self {
        Self {
            key: RoutingKey::PaymentCreated,
            payload: EventPayload::Payment(payment),
        }
    }

    pub fn payment_updated(payment: PaymentRecord) -> Self {
        Self {
            key: RoutingKey::PaymentUpdated,
            payload: EventPayload::Payment(payment),
        }
    }

    pub fn payment_initiated(notice: PaymentNotice) -> Self {
        Self {
            key: RoutingKey::PaymentInitiated,
            payload: EventPayload::PaymentNotice(notice),
        }
    }

    pub fn payment_completed(notice: PaymentNotice) -> Self {
        Self {
            key: RoutingKey::PaymentCompleted,
            payload: EventPayload::PaymentNotice(notice),
        }
    }

    pub fn payment_failed(notice: PaymentNotice) -> Self {
        Self {
            key: RoutingKey::PaymentFailed,
            payload: EventPayload::PaymentNotice(notice),
        }
    }

    pub fn user_created_for_dashboard(user: UserRegistered) -> Self {
        Self {
            key: RoutingKey::UserCreatedForDashboard,
            payload: EventPayload::UserRegistered(user),
        }
    }

    pub fn user_created_for_notification(user: UserRegistered) -> Self {
        Self {
            key: RoutingKey::UserCreatedForNotification,
            payload: EventPayload::UserRegistered(user),
        }
    }

    pub fn product_created_for_dashboard(product: ProductListed) -> Self {
        Self {
            key: RoutingKey::ProductCreatedForDashboard,
            payload: EventPayload::ProductListed(product),
        }
    }

    pub fn product_created_for_notification(product: ProductListed) -> Self {
        Self {
            key: RoutingKey::ProductCreatedForNotification,
            payload: EventPayload::ProductListed(product),
        }
    }

    pub fn routing_key(&self) -> RoutingKey {
        self.key
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    pub fn into_payload(self) -> EventPayload {
        self.payload
    }

    /// Serialize to the wire envelope.
    pub fn encode(&self) -> Result<Vec<u8>, EventError> {
        debug_assert_eq!(self.payload.kind(), self.key.expected_kind());
        let envelope = Envelope {
            schema_version: SCHEMA_VERSION,
            routing_key: self.key.as_str().to_string(),
            payload: self.payload.clone(),
        };
        Ok(serde_json::to_vec(&envelope)?)
    }

    /// Parse and validate a message delivered on `queue`.
    pub fn decode(queue: RoutingKey, bytes: &[u8]) -> Result<Self, EventError> {
        let envelope: Envelope = serde_json::from_slice(bytes)?;

        if envelope.schema_version != SCHEMA_VERSION {
            return Err(EventError::UnsupportedSchema(envelope.schema_version));
        }

        let key = RoutingKey::parse(&envelope.routing_key)
            .ok_or_else(|| EventError::UnknownRoutingKey(envelope.routing_key.clone()))?;

        if key != queue {
            return Err(EventError::RoutingKeyMismatch {
                expected: queue.as_str().to_string(),
                found: envelope.routing_key,
            });
        }

        let kind = envelope.payload.kind();
        if kind != key.expected_kind() {
            return Err(EventError::PayloadKindMismatch {
                key: key.as_str(),
                kind,
            });
        }

        Ok(Self {
            key,
            payload: envelope.payload,
        })
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
