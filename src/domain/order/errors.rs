use super::value_objects::OrderStatus;

// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Product {title} has insufficient stock")]
    InsufficientStock { title: String },

    #[error("Invalid quantity for product {product}")]
    InvalidQuantity { product: String },

    #[error("You cannot cancel this order now")]
    CannotCancel(OrderStatus),

    #[error("You cannot update the address at this stage")]
    AddressLocked(OrderStatus),
}
