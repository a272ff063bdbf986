//! OAuth2 callback of identity providers.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, header};
use axum::response::{IntoResponse, Redirect, Response};
use serde::Deserialize;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::router::login::STATE_COOKIE;
use crate::telemetry::record_auth;
use crate::token::TokenKind;
use crate::user::Kind;

#[derive(Debug, Deserialize)]
pub struct Params {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Value of the `oauth_state` cookie.
fn state_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == STATE_COOKIE)
        .map(|(_, value)| value)
}

pub async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<Params>,
) -> Result<Response> {
    if let Some(error) = params.error {
        return Err(ServerError::InvalidRequest(format!(
            "provider answered `{error}`"
        )));
    }

    let (Some(code), Some(csrf)) = (params.code, params.state) else {
        return Err(ServerError::InvalidRequest(
            "missing `code` or `state`".into(),
        ));
    };

    if state_cookie(&headers) != Some(csrf.as_str()) {
        return Err(ServerError::InvalidRequest("`state` mismatch".into()));
    }

    let kind = csrf
        .split_once('.')
        .and_then(|(kind, _)| kind.parse::<Kind>().ok())
        .ok_or_else(|| ServerError::InvalidRequest("unknown provider".into()))?;
    let provider = state.providers.get(&kind).ok_or(ServerError::Disabled)?;

    let resolved = match provider.exchange(&code).await {
        Ok(profile) => state.social.resolve(&profile).await,
        Err(err) => Err(err.into()),
    };
    record_auth(kind.as_str(), resolved.is_ok());
    let account = resolved?;

    let token = state.token.create(&account, TokenKind::Login)?;
    let clear = format!("{STATE_COOKIE}=; HttpOnly; Secure; SameSite=Lax; Max-Age=0; Path=/");

    Ok((
        [(header::SET_COOKIE, clear)],
        Redirect::to(&format!(
            "{}/login?access_token={token}",
            state.config.portal_url
        )),
    )
        .into_response())
}
