use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
};

use gatepass_common::Principal;

use crate::AppState;

/// Authenticated caller. Extract this in handlers that require auth.
/// If the bearer token is missing or invalid, the request ends with 401.
pub struct AuthPrincipal(pub Principal);

impl FromRequestParts<Arc<AppState>> for AuthPrincipal {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        let Some(token) = bearer_token(header_value) else {
            return Err(unauthorized("Missing bearer token"));
        };

        match state.jwt.verify_token(token) {
            Ok(claims) => Ok(AuthPrincipal(claims.principal())),
            Err(_) => Err(unauthorized("Invalid or expired token")),
        }
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

/// Pull the token out of an `Authorization: Bearer <token>` header value.
fn bearer_token(header: &str) -> Option<&str> {
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}
