//! Email change and verification.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::Result;
use crate::router::Valid;
use crate::router::signup::send_verification;
use crate::token::TokenKind;
use crate::user::{Account, PublicInfo};

#[derive(Debug, Validate, Serialize, Deserialize)]
pub struct Body {
    #[validate(email(message = "Email must be formated."))]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct Params {
    pub access: String,
}

/// Stage a new email and mail its verification link.
pub async fn request(
    State(state): State<AppState>,
    Extension(account): Extension<Account>,
    Valid(body): Valid<Body>,
) -> Result<Json<PublicInfo>> {
    let account = state
        .accounts
        .request_email_change(&account.id, &body.email)
        .await?;
    send_verification(&state, &account).await;

    Ok(Json(account.public_info()))
}

/// Consume a verification link.
pub async fn verify(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> Result<Response> {
    let claims = state.token.parse_kind(&params.access, TokenKind::Verify)?;
    let info = state.accounts.verify_email(&claims).await?;

    if state.config.portal_url.is_empty() {
        Ok(Json(info).into_response())
    } else {
        Ok(Redirect::to(&format!("{}/login", state.config.portal_url)).into_response())
    }
}

/// Forget the staged email.
pub async fn restore(
    State(state): State<AppState>,
    Extension(account): Extension<Account>,
) -> Result<Json<PublicInfo>> {
    Ok(Json(state.accounts.restore_email(&account.id).await?))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::user::OnboardingState;
    use crate::*;

    #[tokio::test]
    async fn test_verification_link_single_use() {
        let state = test_state().await;
        let app = app(state.app.clone());
        let token = state.signup("u1", "p1").await;

        let body = json!({ "email": "u1@x.com" });
        let response =
            make_request(Some(&token), app.clone(), Method::POST, "/email", body.to_string())
                .await;
        assert_eq!(response.status(), StatusCode::OK);

        let link = state.mailer.sent.lock().await[0].link.clone();
        let path = link.strip_prefix("https://auth.example.com").unwrap().to_owned();

        let response =
            make_request(None, app.clone(), Method::GET, &path, String::default()).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let account = state.app.accounts.get_by_username("u1").await.unwrap();
        assert_eq!(account.email.as_deref(), Some("u1@x.com"));
        assert_eq!(account.onboarding_state, OnboardingState::EmailVerified);

        let response =
            make_request(None, app, Method::GET, &path, String::default()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_email_request_survives_mail_failure() {
        let mut state = test_state().await;
        let token = state.signup("u1", "p1").await;
        state.app.mailer = std::sync::Arc::new(mail::FailingMailer);
        let app = app(state.app.clone());

        let body = json!({ "email": "u1@x.com" });
        let response =
            make_request(Some(&token), app, Method::POST, "/email", body.to_string())
                .await;
        assert_eq!(response.status(), StatusCode::OK);

        let account = state.app.accounts.get_by_username("u1").await.unwrap();
        assert_eq!(account.unverified_email.as_deref(), Some("u1@x.com"));
    }

    #[tokio::test]
    async fn test_restore_email() {
        let state = test_state().await;
        let app = app(state.app.clone());
        let token = state.signup("u1", "p1").await;

        let body = json!({ "email": "u1@x.com" });
        make_request(Some(&token), app.clone(), Method::POST, "/email", body.to_string())
            .await;
        let link = state.mailer.sent.lock().await[0].link.clone();
        let path = link.strip_prefix("https://auth.example.com").unwrap().to_owned();

        let response = make_request(
            Some(&token),
            app.clone(),
            Method::DELETE,
            "/email",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        // Nothing left to verify.
        let response =
            make_request(None, app, Method::GET, &path, String::default()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let account = state.app.accounts.get_by_username("u1").await.unwrap();
        assert!(account.email.is_none());
    }

    #[tokio::test]
    async fn test_invalid_verification_token() {
        let state = test_state().await;
        let app = app(state.app);

        let response = make_request(
            None,
            app,
            Method::GET,
            "/email?access=not.a.jwt",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
