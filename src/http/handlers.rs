use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::auth::AuthUser;
use super::error::ApiError;
use crate::domain::order::{Order, ShippingAddress};
use crate::service::OrderService;

// ============================================================================
// Order API
// ============================================================================

const SHOPPER_ROLES: &[&str] = &["user", "seller"];

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/orders")
            .route("", web::post().to(create_order))
            .route("/me", web::get().to(my_orders))
            .route("/{id}", web::get().to(get_order))
            .route("/{id}/cancel", web::post().to(cancel_order))
            .route("/{id}/address", web::patch().to(update_address)),
    );
}

/// Body shape shared by creation and address update.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddressPayload {
    shipping_address: ShippingAddress,
}

/// Every single-order response rides under an `order` key.
#[derive(Debug, Serialize)]
struct OrderResponse {
    order: Order,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    page: Option<u32>,
    limit: Option<u32>,
}

#[derive(Debug, Serialize)]
struct OrdersPage {
    orders: Vec<Order>,
    meta: PageMeta,
}

#[derive(Debug, Serialize)]
struct PageMeta {
    total: u64,
    page: u32,
    limit: u32,
}

async fn create_order(
    user: AuthUser,
    service: web::Data<OrderService>,
    body: web::Json<AddressPayload>,
) -> Result<HttpResponse, ApiError> {
    user.require_role(SHOPPER_ROLES)?;

    let order = service
        .create_order(&user.id, &user.token, body.into_inner().shipping_address)
        .await?;

    Ok(HttpResponse::Created().json(OrderResponse { order }))
}

async fn my_orders(
    user: AuthUser,
    service: web::Data<OrderService>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    let page = service.my_orders(&user.id, query.page, query.limit).await?;

    Ok(HttpResponse::Ok().json(OrdersPage {
        orders: page.items,
        meta: PageMeta {
            total: page.total,
            page: page.page,
            limit: page.limit,
        },
    }))
}

async fn get_order(
    user: AuthUser,
    service: web::Data<OrderService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    // Ownership is enforced for every role, admin included
    let order = service.get_order(&user.id, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(OrderResponse { order }))
}

async fn cancel_order(
    user: AuthUser,
    service: web::Data<OrderService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    user.require_role(SHOPPER_ROLES)?;
    let order = service.cancel_order(&user.id, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(OrderResponse { order }))
}

async fn update_address(
    user: AuthUser,
    service: web::Data<OrderService>,
    path: web::Path<Uuid>,
    body: web::Json<AddressPayload>,
) -> Result<HttpResponse, ApiError> {
    user.require_role(SHOPPER_ROLES)?;
    let order = service
        .update_address(
            &user.id,
            path.into_inner(),
            body.into_inner().shipping_address,
        )
        .await?;
    Ok(HttpResponse::Ok().json(OrderResponse { order }))
}

// ============================================================================
// Unit Tests
// ============================================================================
