use std::time::{SystemTime, UNIX_EPOCH};

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use service::domain::{Actor, Role};
use service::AppContext;
use uuid::Uuid;

use crate::errors::JsonApiError;

#[derive(Clone)]
pub struct ServerAuthConfig {
    pub jwt_secret: String,
}

#[derive(Clone)]
pub struct ServerState {
    pub ctx: AppContext,
    pub auth: ServerAuthConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub exp: usize,
}

/// Authenticated caller, decoded from `Authorization: Bearer <jwt>`.
#[derive(Clone, Copy, Debug)]
pub struct Principal(pub Actor);

impl Principal {
    pub fn id(&self) -> Uuid { self.0.id }

    /// Customer-only routes. A servian gets the same 404 a stranger would.
    pub fn customer(&self) -> Result<Uuid, JsonApiError> { self.require(Role::Customer) }

    pub fn servian(&self) -> Result<Uuid, JsonApiError> { self.require(Role::Servian) }

    fn require(&self, role: Role) -> Result<Uuid, JsonApiError> {
        if self.0.role == role {
            Ok(self.0.id)
        } else {
            Err(service::MarketError::Authorization.into())
        }
    }
}

#[async_trait]
impl FromRequestParts<ServerState> for Principal {
    type Rejection = JsonApiError;

    async fn from_request_parts(parts: &mut Parts, state: &ServerState) -> Result<Self, Self::Rejection> {
        let path = parts.uri.path().to_string();
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                tracing::warn!(path = %path, "missing Authorization header");
                JsonApiError::new(StatusCode::UNAUTHORIZED, "missing bearer token")
            })?;
        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            tracing::warn!(path = %path, "invalid Authorization format (expect Bearer)");
            JsonApiError::new(StatusCode::UNAUTHORIZED, "invalid authorization header")
        })?;

        let key = DecodingKey::from_secret(state.auth.jwt_secret.as_bytes());
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        match decode::<Claims>(token, &key, &validation) {
            Ok(data) => Ok(Principal(Actor { id: data.claims.sub, role: data.claims.role })),
            Err(e) => {
                tracing::warn!(path = %path, err = %e, "token validation failed");
                Err(JsonApiError::new(StatusCode::UNAUTHORIZED, "invalid or expired token"))
            }
        }
    }
}

/// Sign a token for `actor`, valid for `ttl_secs`.
pub fn issue_token(secret: &str, actor: Actor, ttl_secs: u64) -> anyhow::Result<String> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    let claims = Claims { sub: actor.id, role: actor.role, exp: (now + ttl_secs) as usize };
    Ok(encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes()))?)
}
