//! Middlewares for routes.

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use axum::Extension;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::token::{Claims, TokenKind};
use crate::user::{Account, Role};

const BEARER: &str = "Bearer ";

/// Token carried by `Authorization: Bearer <token>`.
pub fn bearer(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|value| value.strip_prefix(BEARER))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Require a valid login token.
///
/// Inserts the token [`Claims`] and the authoritative [`Account`] into
/// request extensions.
pub async fn auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let token = bearer(&req).ok_or(ServerError::InvalidAccessToken)?;
    let claims = state.token.parse_kind(token, TokenKind::Login)?;

    // A removed or vanished account invalidates its sessions.
    let account = state
        .accounts
        .get_by_id(&claims.id)
        .await
        .map_err(|err| match err {
            ServerError::InvalidUser => ServerError::InvalidAccessToken,
            err => err,
        })?;

    req.extensions_mut().insert::<Claims>(claims);
    req.extensions_mut().insert::<Account>(account);
    Ok(next.run(req).await)
}

/// Only let administrators through. Must run after [`auth`].
pub async fn admin(
    Extension(account): Extension<Account>,
    req: Request,
    next: Next,
) -> Result<Response> {
    if account.role != Role::Admin {
        return Err(ServerError::InvalidUser);
    }

    Ok(next.run(req).await)
}
