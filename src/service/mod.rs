mod orders;

pub use orders::{OrderService, ServiceError, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
