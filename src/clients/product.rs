use async_trait::async_trait;
use serde::Deserialize;

use super::ClientError;
use crate::domain::order::{Money, ProductSnapshot};

const SERVICE: &str = "product";

/// Authoritative price and stock for catalog products.
#[async_trait]
pub trait ProductSource: Send + Sync {
    async fn fetch_product(
        &self,
        token: &str,
        product_id: &str,
    ) -> Result<ProductSnapshot, ClientError>;
}

pub struct HttpProductClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpProductClient {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Deserialize)]
struct ProductResponse {
    data: ProductBody,
}

#[derive(Deserialize)]
struct ProductBody {
    #[serde(rename = "_id")]
    id: String,
    title: String,
    price: Money,
    stock: u32,
}

#[async_trait]
impl ProductSource for HttpProductClient {
    async fn fetch_product(
        &self,
        token: &str,
        product_id: &str,
    ) -> Result<ProductSnapshot, ClientError> {
        let url = format!("{}/api/products/{}", self.base_url, product_id);

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

        let body: ProductResponse = response
            .json()
            .await
            .map_err(|e| ClientError::from_reqwest(SERVICE, e))?;

        Ok(ProductSnapshot {
            id: body.data.id,
            title: body.data.title,
            price: body.data.price,
            stock: body.data.stock,
        })
    }
}
