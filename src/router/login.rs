//! Local login and OAuth redirection.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Redirect, Response};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::router::{TokenResponse, Valid};
use crate::telemetry::record_auth;
use crate::token::TokenKind;
use crate::user::Kind;

/// Cookie holding the OAuth `state` until the callback.
pub const STATE_COOKIE: &str = "oauth_state";
const STATE_MAX_AGE: u64 = 60 * 10;

#[derive(Debug, Validate, Serialize, Deserialize)]
pub struct Body {
    #[validate(length(min = 1, message = "Username is required."))]
    pub username: String,
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct Params {
    pub auth_type: Option<String>,
}

pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<Json<TokenResponse>> {
    if !state.config.auth.local {
        return Err(ServerError::Disabled);
    }

    let checked = state
        .accounts
        .verify_password(&body.username, &body.password)
        .await;
    record_auth(Kind::Local.as_str(), checked.is_ok());
    if let Err(err) = checked {
        tracing::debug!(username = %body.username, %err, "local login refused");
        // Do not tell whether the username exists.
        return Err(match err {
            ServerError::InvalidUser => ServerError::InvalidPassword,
            err => err,
        });
    }

    let account = state.accounts.login(&body.username).await?;
    let token = state.token.create(&account, TokenKind::Login)?;

    Ok(Json(TokenResponse::new(
        token,
        state.token.ttl(TokenKind::Login),
    )))
}

/// Send the browser to the identity provider.
pub async fn redirect(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> Result<Response> {
    let kind = params
        .auth_type
        .as_deref()
        .and_then(|auth_type| auth_type.parse::<Kind>().ok())
        .filter(|kind| *kind != Kind::Local)
        .ok_or_else(|| ServerError::InvalidRequest("unknown `auth_type`".into()))?;

    let provider = state.providers.get(&kind).ok_or(ServerError::Disabled)?;

    let csrf = format!("{}.{}", kind.as_str(), uuid::Uuid::new_v4().simple());
    let url = provider.authorize_url(&csrf)?;

    let cookie = format!(
        "{STATE_COOKIE}={csrf}; HttpOnly; Secure; SameSite=Lax; Max-Age={STATE_MAX_AGE}; Path=/"
    );
    Ok(([(header::SET_COOKIE, cookie)], Redirect::to(&url)).into_response())
}
