use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use farebox_core::{Actor, Role};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::state::AppState;

/// Claims as issued by the identity collaborator. The engine trusts the
/// resolved `{id, role}` pair and only enforces ownership/role rules.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

/// Decode the bearer token and inject the resolved actor into the request.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let role = Role::from_str(&token_data.claims.role).map_err(|_| StatusCode::FORBIDDEN)?;
    req.extensions_mut()
        .insert(Actor::new(token_data.claims.sub, role));

    Ok(next.run(req).await)
}

/// Gate for the admin router; runs after `auth_middleware`.
pub async fn staff_middleware(req: Request, next: Next) -> Result<Response, StatusCode> {
    let actor = req
        .extensions()
        .get::<Actor>()
        .ok_or(StatusCode::UNAUTHORIZED)?;
    if !actor.is_staff() {
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(next.run(req).await)
}
