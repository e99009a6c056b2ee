mod auth;
mod error;
mod handlers;

pub use auth::{AuthUser, JwtVerifier};
pub use error::ApiError;
pub use handlers::routes;

use actix_web::{web, HttpResponse};

use crate::metrics::Metrics;

/// Liveness probe plus the Prometheus scrape endpoint.
pub fn ops_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/metrics", web::get().to(metrics));
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

async fn metrics(metrics: web::Data<Metrics>) -> Result<HttpResponse, ApiError> {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&metrics.registry().gather(), &mut buffer)
        .map_err(|e| ApiError::internal(anyhow::anyhow!(e)))?;

    Ok(HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer))
}

// ============================================================================
// Unit Tests
// ============================================================================
