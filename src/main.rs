use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, App, HttpServer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use supernova_orders::clients::{HttpCartClient, HttpProductClient};
use supernova_orders::config::Config;
use supernova_orders::consumers::{DashboardProjection, DashboardStore, LogMailer, NotificationService};
use supernova_orders::http;
use supernova_orders::http::JwtVerifier;
use supernova_orders::messaging::{EventPublisher, KafkaBroker, MessageBroker};
use supernova_orders::metrics::Metrics;
use supernova_orders::service::OrderService;
use supernova_orders::storage::PgOrderStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!(port = config.port, brokers = %config.kafka_brokers, "Starting order service");

    let metrics = Arc::new(Metrics::new()?);
    let broker: Arc<dyn MessageBroker> =
        Arc::new(KafkaBroker::new(&config.kafka_brokers, &config.kafka_group_id));
    let publisher = EventPublisher::new(broker.clone(), metrics.clone());

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let store = Arc::new(PgOrderStore::connect(&config.database_url).await?);

    let service = web::Data::new(OrderService::new(
        store,
        Arc::new(HttpCartClient::new(
            http_client.clone(),
            &config.cart_service_url,
        )),
        Arc::new(HttpProductClient::new(
            http_client,
            &config.product_service_url,
        )),
        publisher.clone(),
        metrics.clone(),
    ));

    let dashboard = Arc::new(DashboardStore::new());
    let projection = DashboardProjection::start(&publisher, dashboard).await?;

    let notifications = Arc::new(NotificationService::new(
        Arc::new(LogMailer),
        metrics.clone(),
    ))
    .start(&publisher)
    .await?;

    let verifier = web::Data::new(JwtVerifier::new(&config.jwt_secret));
    let metrics_data = web::Data::from(metrics);

    HttpServer::new(move || {
        App::new()
            .app_data(service.clone())
            .app_data(verifier.clone())
            .app_data(metrics_data.clone())
            .configure(http::routes)
            .configure(http::ops_routes)
    })
    .bind(("0.0.0.0", config.port))?
    .run()
    .await?;

    tracing::info!("HTTP server stopped, draining consumers");
    projection.shutdown().await;
    for subscription in notifications {
        subscription.shutdown().await;
    }
    broker.close().await;

    Ok(())
}
