mod postgres;

pub use postgres::PgOrderStore;

use std::collections::HashMap;
use tokio::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::order::Order;

// ============================================================================
// Order Store
// ============================================================================
//
// The order service is the only writer of order records. Mutations carry the
// aggregate's bumped version and the store rejects any write whose
// predecessor version is no longer current, so a concurrent cancel and
// address-update cannot silently overwrite each other.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Order not found")]
    NotFound,

    #[error("Order already exists")]
    Duplicate,

    #[error("Version conflict: write expected to replace version {expected}, current is {current}")]
    VersionConflict { expected: u64, current: u64 },

    #[error("Storage backend error: {0}")]
    Backend(#[source] anyhow::Error),
}

/// One page of a user's orders plus the paging metadata echoed to the caller.
#[derive(Debug, Clone)]
pub struct Page {
    pub items: Vec<Order>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: Order) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Order>, StoreError>;

    /// Orders owned by `user`, oldest first, paginated. `page` is 1-based.
    async fn list_by_user(&self, user: &str, page: u32, limit: u32) -> Result<Page, StoreError>;

    /// Replace a mutated order. `order.version` must be exactly one ahead of
    /// the stored version.
    async fn update(&self, order: &Order) -> Result<(), StoreError>;
}

// ============================================================================
// In-memory implementation
// ============================================================================

struct Inner {
    orders: HashMap<Uuid, Order>,
    /// Insertion order, for stable pagination
    sequence: Vec<Uuid>,
}

pub struct InMemoryOrderStore {
    inner: RwLock<Inner>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                orders: HashMap::new(),
                sequence: Vec::new(),
            }),
        }
    }
}

impl Default for InMemoryOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: Order) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.orders.contains_key(&order.id) {
            return Err(StoreError::Duplicate);
        }
        inner.sequence.push(order.id);
        inner.orders.insert(order.id, order);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.orders.get(&id).cloned())
    }

    async fn list_by_user(&self, user: &str, page: u32, limit: u32) -> Result<Page, StoreError> {
        let inner = self.inner.read().await;
        let page = page.max(1);

        let mine: Vec<&Order> = inner
            .sequence
            .iter()
            .filter_map(|id| inner.orders.get(id))
            .filter(|o| o.user == user)
            .collect();

        let total = mine.len() as u64;
        let skip = ((page - 1) as usize).saturating_mul(limit as usize);
        let items = mine
            .into_iter()
            .skip(skip)
            .take(limit as usize)
            .cloned()
            .collect();

        Ok(Page {
            items,
            total,
            page,
            limit,
        })
    }

    async fn update(&self, order: &Order) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let current = inner.orders.get(&order.id).ok_or(StoreError::NotFound)?;

        if current.version + 1 != order.version {
            return Err(StoreError::VersionConflict {
                expected: order.version.saturating_sub(1),
                current: current.version,
            });
        }

        inner.orders.insert(order.id, order.clone());
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
