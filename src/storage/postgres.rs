use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{OrderStore, Page, StoreError};
use crate::domain::order::Order;

// ============================================================================
// Postgres-backed Order Store
// ============================================================================
//
// Orders are stored whole as JSONB, with the id, owner, version and creation
// time broken out into columns for keying, listing and the optimistic
// concurrency predicate. The conditional UPDATE carries the predecessor
// version, so a stale write affects zero rows instead of clobbering a
// concurrent one.
//
// ============================================================================

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS orders (
    id          UUID PRIMARY KEY,
    user_id     TEXT NOT NULL,
    version     BIGINT NOT NULL,
    doc         JSONB NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL
)"#;

const CREATE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS orders_user_created_idx ON orders (user_id, created_at)";

pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    /// Connect and ensure the schema exists.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
        let store = Self::from_pool(pool);
        store.ensure_schema().await?;
        tracing::info!("Connected to order database");
        Ok(store)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn ensure_schema(&self) -> anyhow::Result<()> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_INDEX).execute(&self.pool).await?;
        Ok(())
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return StoreError::Duplicate;
            }
        }
        StoreError::Backend(err.into())
    }
}

fn encode(order: &Order) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(order).map_err(|e| StoreError::Backend(e.into()))
}

fn decode(doc: serde_json::Value) -> Result<Order, StoreError> {
    serde_json::from_value(doc).map_err(|e| StoreError::Backend(e.into()))
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert(&self, order: Order) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO orders (id, user_id, version, doc, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(order.id)
        .bind(&order.user)
        .bind(order.version as i64)
        .bind(encode(&order)?)
        .bind(order.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query("SELECT doc FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| decode(r.get("doc"))).transpose()
    }

    async fn list_by_user(&self, user: &str, page: u32, limit: u32) -> Result<Page, StoreError> {
        let page = page.max(1);
        let skip = (page as i64 - 1) * limit as i64;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE user_id = $1")
            .bind(user)
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query(
            "SELECT doc FROM orders WHERE user_id = $1 \
             ORDER BY created_at ASC, id ASC OFFSET $2 LIMIT $3",
        )
        .bind(user)
        .bind(skip)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .into_iter()
            .map(|r| decode(r.get("doc")))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            items,
            total: total as u64,
            page,
            limit,
        })
    }

    async fn update(&self, order: &Order) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE orders SET doc = $1, version = $2 WHERE id = $3 AND version = $4",
        )
        .bind(encode(order)?)
        .bind(order.version as i64)
        .bind(order.id)
        .bind(order.version.saturating_sub(1) as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let current: Option<i64> =
                sqlx::query_scalar("SELECT version FROM orders WHERE id = $1")
                    .bind(order.id)
                    .fetch_optional(&self.pool)
                    .await?;

            return match current {
                None => Err(StoreError::NotFound),
                Some(v) => Err(StoreError::VersionConflict {
                    expected: order.version.saturating_sub(1),
                    current: v as u64,
                }),
            };
        }

        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
