use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::OrderError;
use super::value_objects::{
    CartLine, Money, OrderItem, OrderStatus, ProductSnapshot, ShippingAddress, SETTLEMENT_CURRENCY,
};

// ============================================================================
// Order Aggregate - Domain Logic
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub user: String,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
    pub total_price: Money,
    pub shipping_address: ShippingAddress,

    /// Bumped on every successful mutation; the store rejects writes carrying
    /// a stale version so concurrent cancel/address-update cannot silently
    /// overwrite each other.
    pub version: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Price a cart snapshot against product snapshots and assemble the order.
    ///
    /// Any missing product or stock shortfall aborts the whole construction;
    /// a partial order is never produced. Line subtotals are computed here
    /// once and never recomputed, so later catalog price changes do not
    /// affect existing orders.
    pub fn from_cart(
        user: &str,
        lines: &[CartLine],
        products: &[ProductSnapshot],
        shipping_address: ShippingAddress,
    ) -> Result<Self, OrderError> {
        if lines.is_empty() {
            return Err(OrderError::EmptyCart);
        }

        let mut items = Vec::with_capacity(lines.len());
        let mut total = Decimal::ZERO;

        for line in lines {
            let product = products
                .iter()
                .find(|p| p.id == line.product_id)
                .ok_or_else(|| OrderError::ProductNotFound(line.product_id.clone()))?;

            if line.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    product: line.product_id.clone(),
                });
            }

            if product.stock < line.quantity {
                return Err(OrderError::InsufficientStock {
                    title: product.title.clone(),
                });
            }

            let item_total = product.price.amount * Decimal::from(line.quantity);
            total += item_total;

            items.push(OrderItem {
                product: line.product_id.clone(),
                quantity: line.quantity,
                price: Money::new(item_total, product.price.currency),
            });
        }

        let now = Utc::now();

        Ok(Self {
            id: Uuid::new_v4(),
            user: user.to_string(),
            items,
            status: OrderStatus::Pending,
            total_price: Money::new(total, SETTLEMENT_CURRENCY),
            shipping_address,
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_owned_by(&self, user: &str) -> bool {
        self.user == user
    }

    /// Cancel the order. Legal only while still PENDING.
    pub fn cancel(&mut self) -> Result<(), OrderError> {
        if self.status != OrderStatus::Pending {
            return Err(OrderError::CannotCancel(self.status));
        }
        self.status = OrderStatus::Cancelled;
        self.touch();
        Ok(())
    }

    /// Replace the shipping address. Legal only while still PENDING; items
    /// and totals are never affected.
    pub fn update_address(&mut self, address: ShippingAddress) -> Result<(), OrderError> {
        if self.status != OrderStatus::Pending {
            return Err(OrderError::AddressLocked(self.status));
        }
        self.shipping_address = address;
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::Currency;
    use rust_decimal_macros::dec;

    fn sample_address() -> ShippingAddress {
        ShippingAddress {
            street: "123 Main St".to_string(),
            city: "Metropolis".to_string(),
            state: "CA".to_string(),
            pincode: "90210".to_string(),
            country: "USA".to_string(),
        }
    }

    fn product(id: &str, amount: Decimal, stock: u32) -> ProductSnapshot {
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

    #[test]
    fn test_from_cart_prices_lines_and_totals() {
        let order = Order::from_cart(
            "user-1",
            &[line("p1", 2), line("p2", 1)],
            &[product("p1", dec!(100), 10), product("p2", dec!(50), 5)],
            sample_address(),
        )
        .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.version, 1);
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.items[0].quantity, 2);
        assert_eq!(order.items[0].price.amount, dec!(200));
        assert_eq!(order.items[1].price.amount, dec!(50));
        assert_eq!(order.total_price.amount, dec!(250));
        assert_eq!(order.total_price.currency, SETTLEMENT_CURRENCY);
    }

    #[test]
    fn test_from_cart_rejects_empty_cart() {
        let err = Order::from_cart("user-1", &[], &[], sample_address()).unwrap_err();
        assert!(matches!(err, OrderError::EmptyCart));
    }

    #[test]
    fn test_from_cart_rejects_unknown_product() {
        let err = Order::from_cart(
            "user-1",
            &[line("missing", 1)],
            &[product("p1", dec!(10), 3)],
            sample_address(),
        )
        .unwrap_err();
        assert!(matches!(err, OrderError::ProductNotFound(id) if id == "missing"));
    }

    #[test]
    fn test_from_cart_rejects_insufficient_stock() {
        let err = Order::from_cart(
            "user-1",
            &[line("p1", 5)],
            &[product("p1", dec!(10), 3)],
            sample_address(),
        )
        .unwrap_err();

        match err {
            OrderError::InsufficientStock { title } => assert_eq!(title, "Product p1"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_from_cart_rejects_zero_quantity() {
        let err = Order::from_cart(
            "user-1",
            &[line("p1", 0)],
            &[product("p1", dec!(10), 3)],
            sample_address(),
        )
        .unwrap_err();
        assert!(matches!(err, OrderError::InvalidQuantity { .. }));
    }

    #[test]
    fn test_cancel_only_from_pending() {
        let mut order = Order::from_cart(
            "user-1",
            &[line("p1", 1)],
            &[product("p1", dec!(10), 3)],
            sample_address(),
        )
        .unwrap();

        order.cancel().unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.version, 2);

        // Cancelling twice is a conflict
        let err = order.cancel().unwrap_err();
        assert!(matches!(err, OrderError::CannotCancel(OrderStatus::Cancelled)));
    }

    #[test]
    fn test_cancel_rejected_after_shipping() {
        let mut order = Order::from_cart(
            "user-1",
            &[line("p1", 1)],
            &[product("p1", dec!(10), 3)],
            sample_address(),
        )
        .unwrap();
        order.status = OrderStatus::Shipped;

        let err = order.cancel().unwrap_err();
        assert!(matches!(err, OrderError::CannotCancel(OrderStatus::Shipped)));
        assert_eq!(order.status, OrderStatus::Shipped);
    }

    #[test]
    fn test_update_address_only_while_pending() {
        let mut order = Order::from_cart(
            "user-1",
            &[line("p1", 1)],
            &[product("p1", dec!(10), 3)],
            sample_address(),
        )
        .unwrap();
        let items_before = order.items.clone();

        let mut new_address = sample_address();
        new_address.city = "Gotham".to_string();
        order.update_address(new_address.clone()).unwrap();
        assert_eq!(order.shipping_address, new_address);
        assert_eq!(order.version, 2);
        // Address changes never touch items or totals
        assert_eq!(order.items, items_before);

        order.status = OrderStatus::Confirmed;
        let err = order.update_address(sample_address()).unwrap_err();
        assert!(matches!(err, OrderError::AddressLocked(OrderStatus::Confirmed)));
    }

    #[test]
    fn test_order_wire_format_uses_camel_case() {
        let order = Order::from_cart(
            "user-1",
            &[line("p1", 2)],
            &[product("p1", dec!(100), 10)],
            sample_address(),
        )
        .unwrap();

        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["status"], "PENDING");
        assert!(json["totalPrice"]["amount"].is_string() || json["totalPrice"]["amount"].is_number());
        assert_eq!(json["shippingAddress"]["pincode"], "90210");
        assert_eq!(json["items"][0]["product"], "p1");
    }
}
