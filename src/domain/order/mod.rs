mod aggregate;
mod errors;
mod value_objects;

pub use aggregate::Order;
pub use errors::OrderError;
pub use value_objects::{
    AddressIssue, CartLine, Currency, Money, OrderItem, OrderStatus, ProductSnapshot,
    ShippingAddress, SETTLEMENT_CURRENCY,
};
