mod cart;
mod product;

pub use cart::{CartSource, HttpCartClient};
pub use product::{HttpProductClient, ProductSource};

// ============================================================================
// Collaborator HTTP clients
// ============================================================================
//
// Thin authenticated clients for the cart and product services. The order
// service calls them with the requesting user's own bearer credential and
// passes their failures through rather than retrying.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The collaborator answered with a non-success status; passed through
    /// to the original caller.
    #[error("Internal Service Error: {message}")]
    Status {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("{service} service unreachable: {reason}")]
    Transport {
        service: &'static str,
        reason: String,
    },

    #[error("{service} service returned an unexpected body: {reason}")]
    Decode {
        service: &'static str,
        reason: String,
    },
}

impl ClientError {
    pub(crate) fn from_reqwest(service: &'static str, err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Decode {
                service,
                reason: err.to_string(),
            }
        } else {
            ClientError::Transport {
                service,
                reason: err.to_string(),
            }
        }
    }

    /// Read a non-success response into a pass-through error, preferring the
    /// collaborator's own `message` field.
    pub(crate) async fn from_response(service: &'static str, response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let message = match response.json::<serde_json::Value>().await {
            Ok(body) => body
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("Service unreachable")
                .to_string(),
            Err(_) => "Service unreachable".to_string(),
        };
        ClientError::Status {
            service,
            status,
            message,
        }
    }
}
