use anyhow::Context;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub kafka_brokers: String,
    pub kafka_group_id: String,
    pub cart_service_url: String,
    pub product_service_url: String,
    pub jwt_secret: String,
}

impl Config {
    /// Read configuration from the environment. Only the JWT secret is
    /// required; everything else has a local-development default.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            port: env_or("PORT", "8002")
                .parse()
                .context("PORT must be a valid port number")?,
            database_url: env_or(
                "DATABASE_URL",
                "postgres://localhost:5432/supernova_orders",
            ),
            kafka_brokers: env_or("KAFKA_BROKERS", "localhost:9092"),
            kafka_group_id: env_or("KAFKA_GROUP_ID", "supernova-orders"),
            cart_service_url: env_or("CART_SERVICE_URL", "http://localhost:8001"),
            product_service_url: env_or("PRODUCT_SERVICE_URL", "http://localhost:8000"),
            jwt_secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
