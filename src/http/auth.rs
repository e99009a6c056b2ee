use std::future::{ready, Ready};
use std::sync::Arc;

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use super::error::ApiError;

// ============================================================================
// Request authentication
// ============================================================================
//
// Every order route requires a signed token carrying the caller's identity.
// The token is read from the `token` cookie first, then from a standard
// bearer Authorization header. Signature or shape failures are all reported
// as a single 401 so the response never leaks which check failed.
//
// ============================================================================

#[derive(Clone)]
pub struct JwtVerifier {
    key: Arc<DecodingKey>,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Tokens without an expiry are accepted; an expiry, when present,
        // is still enforced.
        validation.required_spec_claims.clear();

        Self {
            key: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
            validation,
        }
    }

    fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        Ok(decode::<Claims>(token, &self.key, &self.validation)?.claims)
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    id: String,
    role: String,
}

/// The verified caller, available to any handler that declares it.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub role: String,
    /// The raw token, forwarded as-is on collaborator calls made on the
    /// caller's behalf.
    pub token: String,
}

impl AuthUser {
    pub fn require_role(&self, allowed: &[&str]) -> Result<(), ApiError> {
        if allowed.contains(&self.role.as_str()) {
            Ok(())
        } else {
            Err(ApiError::forbidden("Forbidden"))
        }
    }
}

fn bearer_token(req: &HttpRequest) -> Option<String> {
    if let Some(cookie) = req.cookie("token") {
        return Some(cookie.value().to_string());
    }

    req.headers()
        .get(actix_web::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|t| t.to_string())
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(extract(req))
    }
}

fn extract(req: &HttpRequest) -> Result<AuthUser, ApiError> {
    let verifier = req
        .app_data::<web::Data<JwtVerifier>>()
        .ok_or_else(|| ApiError::internal(anyhow::anyhow!("JwtVerifier is not registered")))?;

    let token = bearer_token(req).ok_or_else(ApiError::unauthorized)?;

    let claims = verifier.verify(&token).map_err(|err| {
        tracing::debug!(error = %err, "Token verification failed");
        ApiError::unauthorized()
    })?;

    Ok(AuthUser {
        id: claims.id,
        role: claims.role,
        token,
    })
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App, HttpResponse};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    const SECRET: &str = "test-secret";

    #[derive(Serialize)]
    struct TestClaims<'a> {
        id: &'a str,
        role: &'a str,
    }

    pub(crate) fn sign(id: &str, role: &str) -> String {
        encode(
            &Header::default(),
            &TestClaims { id, role },
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    async fn whoami(user: AuthUser) -> HttpResponse {
        HttpResponse::Ok().body(format!("{}:{}", user.id, user.role))
    }

    fn app() -> App<
        impl actix_web::dev::ServiceFactory<
            actix_web::dev::ServiceRequest,
            Config = (),
            Response = actix_web::dev::ServiceResponse,
            Error = actix_web::Error,
            InitError = (),
        >,
    > {
        App::new()
            .app_data(web::Data::new(JwtVerifier::new(SECRET)))
            .route("/whoami", web::get().to(whoami))
    }

    #[actix_web::test]
    async fn test_bearer_header_is_accepted() {
        let app = test::init_service(app()).await;
        let req = test::TestRequest::get()
            .uri("/whoami")
            .insert_header(("Authorization", format!("Bearer {}", sign("u1", "user"))))
            .to_request();

        let res = test::call_service(&app, req).await;
        assert!(res.status().is_success());
        let body = test::read_body(res).await;
        assert_eq!(body, "u1:user");
    }

    #[actix_web::test]
    async fn test_token_cookie_is_accepted() {
        let app = test::init_service(app()).await;
        let req = test::TestRequest::get()
            .uri("/whoami")
            .cookie(actix_web::cookie::Cookie::new("token", sign("u2", "seller")))
            .to_request();

        let res = test::call_service(&app, req).await;
        assert!(res.status().is_success());
        let body = test::read_body(res).await;
        assert_eq!(body, "u2:seller");
    }

    #[actix_web::test]
    async fn test_missing_token_is_unauthorized() {
        let app = test::init_service(app()).await;
        let req = test::TestRequest::get().uri("/whoami").to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), 401);
    }

    #[actix_web::test]
    async fn test_bad_signature_is_unauthorized() {
        let other = encode(
            &Header::default(),
            &TestClaims {
                id: "u1",
                role: "user",
            },
            &EncodingKey::from_secret(b"wrong-secret"),
        )
        .unwrap();

        let app = test::init_service(app()).await;
        let req = test::TestRequest::get()
            .uri("/whoami")
            .insert_header(("Authorization", format!("Bearer {other}")))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), 401);
    }

    #[actix_web::test]
    async fn test_require_role() {
        let user = AuthUser {
            id: "u1".to_string(),
            role: "user".to_string(),
            token: String::new(),
        };
        assert!(user.require_role(&["user", "seller"]).is_ok());
        assert!(user.require_role(&["admin"]).is_err());
    }
}
