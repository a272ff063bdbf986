//! HTTP API.
pub mod email;
pub mod login;
pub mod logout;
pub mod oauth;
pub mod password;
pub mod signup;
pub mod status;
pub mod users;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Serialize;
use validator::Validate;

use crate::error::{ResponseError, ServerError};

const TOKEN_TYPE: &str = "Bearer";

/// JSON body checked with [`Validate`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Valid<T>(pub T);

impl<T, S> FromRequest<S> for Valid<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Valid(value))
    }
}

/// Issued session.
#[derive(Debug, Serialize, serde::Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

impl TokenResponse {
    pub fn new(access_token: String, expires_in: u64) -> Self {
        Self {
            access_token,
            token_type: TOKEN_TYPE.to_owned(),
            expires_in,
        }
    }
}

/// Answer unknown routes.
pub async fn not_found() -> Response {
    ResponseError::default()
        .status(StatusCode::NOT_FOUND)
        .title("Resource not found.")
        .into_response()
        .unwrap_or_else(|_| StatusCode::NOT_FOUND.into_response())
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;

    use crate::*;

    #[tokio::test]
    async fn test_unknown_route() {
        let state = test_state().await;
        let app = app(state.app);

        let response =
            make_request(None, app, Method::GET, "/nowhere", String::default()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["status"], 404);
    }

    #[tokio::test]
    async fn test_method_not_supported() {
        let state = test_state().await;
        let app = app(state.app);

        let response =
            make_request(None, app, Method::DELETE, "/login", String::default()).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let state = test_state().await;
        let app = app(state.app);

        let response =
            make_request(None, app, Method::POST, "/login", "{not json".into()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
