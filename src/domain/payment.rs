use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::order::Money;

// ============================================================================
// Payment read-model types
// ============================================================================
//
// The payment service owns the source-of-truth payment record; these types
// describe the copy that rides on PAYMENT_* events and is projected into the
// seller dashboard.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub id: Uuid,
    pub order_id: Uuid,
    pub user: String,
    /// Gateway-side identifier, present once the payment has been captured.
    pub payment_id: Option<String>,
    pub price: Money,
    pub status: PaymentStatus,
}
