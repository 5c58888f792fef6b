use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{header, request::Parts, StatusCode},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::UserId;

/// The signed-in principal, as vouched for by the identity provider's token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: UserId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

/// Extracts the user id from a `Bearer` token. `Ok(None)` means no
/// credentials were sent; a malformed or invalid token is an error.
pub fn authenticate(parts: &Parts, secret: &str) -> Result<Option<AuthUser>, StatusCode> {
    let Some(value) = parts.headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let token = value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| {
        tracing::debug!("Rejected bearer token: {:?}", e);
        StatusCode::UNAUTHORIZED
    })?
    .claims;

    if claims.sub.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(Some(AuthUser { user_id: claims.sub }))
}

// Required credentials
impl FromRequestParts<Arc<crate::AppState>> for AuthUser {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<crate::AppState>,
    ) -> Result<Self, Self::Rejection> {
        authenticate(parts, &state.config.jwt.secret)?.ok_or(StatusCode::UNAUTHORIZED)
    }
}

// Optional credentials: booking reports a missing user itself
impl OptionalFromRequestParts<Arc<crate::AppState>> for AuthUser {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<crate::AppState>,
    ) -> Result<Option<Self>, Self::Rejection> {
        authenticate(parts, &state.config.jwt.secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret";

    fn parts_with(auth: Option<String>) -> Parts {
        let mut builder = Request::builder().uri("/api/bookings");
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        builder.body(()).unwrap().into_parts().0
    }

    fn token(sub: &str, secret: &str) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn missing_header_is_anonymous() {
        assert!(authenticate(&parts_with(None), SECRET).unwrap().is_none());
    }

    #[test]
    fn valid_token_yields_subject() {
        let parts = parts_with(Some(format!("Bearer {}", token("u1", SECRET))));
        let user = authenticate(&parts, SECRET).unwrap().unwrap();
        assert_eq!(user.user_id, "u1");
    }

    #[test]
    fn wrong_secret_or_scheme_is_rejected() {
        let parts = parts_with(Some(format!("Bearer {}", token("u1", "other"))));
        assert_eq!(authenticate(&parts, SECRET).unwrap_err(), StatusCode::UNAUTHORIZED);

        let parts = parts_with(Some("Basic dTE6cHc=".to_string()));
        assert_eq!(authenticate(&parts, SECRET).unwrap_err(), StatusCode::UNAUTHORIZED);
    }
}
