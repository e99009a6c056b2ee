use async_trait::async_trait;
use serde::Deserialize;

use super::ClientError;
use crate::domain::order::CartLine;

const SERVICE: &str = "cart";

/// Read-only view of a user's current cart.
#[async_trait]
pub trait CartSource: Send + Sync {
    /// Fetch the caller's cart lines using their own bearer credential.
    async fn fetch_cart(&self, token: &str) -> Result<Vec<CartLine>, ClientError>;
}

pub struct HttpCartClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpCartClient {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Deserialize)]
struct CartResponse {
    cart: CartBody,
}

#[derive(Deserialize)]
struct CartBody {
    items: Vec<CartLine>,
}

#[async_trait]
impl CartSource for HttpCartClient {
    async fn fetch_cart(&self, token: &str) -> Result<Vec<CartLine>, ClientError> {
        let url = format!("{}/api/cart", self.base_url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ClientError::from_reqwest(SERVICE, e))?;

        if !response.status().is_success() {
            return Err(ClientError::from_response(SERVICE, response).await);
        }

        let body: CartResponse = response
            .json()
            .await
            .map_err(|e| ClientError::from_reqwest(SERVICE, e))?;

        tracing::debug!(items = body.cart.items.len(), "Fetched cart snapshot");
        Ok(body.cart.items)
    }
}
