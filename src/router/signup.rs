//! Self signup with username and password.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{Result, ServerError};
use crate::mail::{Message, Template};
use crate::router::Valid;
use crate::token::TokenKind;
use crate::user::{Account, Candidate, CreateMode, PublicInfo};
use crate::AppState;

#[derive(Debug, Validate, Serialize, Deserialize)]
pub struct Body {
    #[validate(length(
        min = 1,
        max = 254,
        message = "Username must be 1 to 254 characters long."
    ))]
    pub username: String,
    #[validate(length(min = 1, max = 1024, message = "Password is required."))]
    pub password: String,
    #[validate(email(message = "Email must be formated."))]
    pub email: Option<String>,
    #[validate(length(max = 100, message = "Name must be at most 100 characters long."))]
    pub name: Option<String>,
}

/// Send a verification link for the staged email of `account`.
///
/// The account is already stored, so failures are logged and not returned.
pub(crate) async fn send_verification(state: &AppState, account: &Account) {
    let Some(to) = account.unverified_email.clone() else {
        return;
    };

    let token = match state.token.create(account, TokenKind::Verify) {
        Ok(token) => token,
        Err(err) => {
            tracing::error!(%err, uid = %account.uid, "cannot sign verification link");
            return;
        },
    };

    let message = Message {
        to,
        username: account.username.clone(),
        template: Template::VerifyEmail,
        link: format!("{}/email?access={token}", state.config.url),
    };
    if let Err(err) = state.mailer.send(message).await {
        tracing::error!(%err, uid = %account.uid, "verification mail not sent");
    }
}

pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<(StatusCode, Json<PublicInfo>)> {
    if !state.config.auth.local {
        return Err(ServerError::Disabled);
    }

    let candidate = Candidate {
        username: body.username,
        password: body.password,
        email: body.email,
        name: body.name,
        ..Default::default()
    };
    let info = state
        .accounts
        .create_local(candidate, CreateMode::Signup)
        .await?;

    let account = state.accounts.get_by_id(&info.id).await?;
    send_verification(&state, &account).await;

    Ok((StatusCode::CREATED, Json(info)))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::json;

    use crate::user::{OnboardingState, PublicInfo, Role};
    use crate::*;

    #[tokio::test]
    async fn test_signup_handler() {
        let state = test_state().await;
        let app = app(state.app.clone());

        let body = json!({ "username": "u1@x.com", "password": "p1" });
        let response =
            make_request(None, app.clone(), Method::POST, "/signup", body.to_string())
                .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let info: PublicInfo = serde_json::from_slice(&body).unwrap();
        assert_eq!(info.onboarding_state, OnboardingState::Signup);
        assert_eq!(info.role, Role::User);

        // Verification link went out.
        let sent = state.mailer.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "u1@x.com");
        assert!(sent[0].link.starts_with("https://auth.example.com/email?access="));
        drop(sent);

        // Same username again.
        let body = json!({ "username": "u1@x.com", "password": "p2" });
        let response =
            make_request(None, app, Method::POST, "/signup", body.to_string()).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_signup_survives_mail_failure() {
        let mut state = test_state().await;
        state.app.mailer = std::sync::Arc::new(mail::FailingMailer);
        let app = app(state.app.clone());

        let body = json!({ "username": "u1@x.com", "password": "p1" });
        let response =
            make_request(None, app.clone(), Method::POST, "/signup", body.to_string())
                .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let account = state.app.accounts.get_by_username("u1@x.com").await.unwrap();
        assert_eq!(account.unverified_email.as_deref(), Some("u1@x.com"));

        // Retrying is a conflict, not a second account.
        let response =
            make_request(None, app, Method::POST, "/signup", body.to_string()).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_signup_validation() {
        let state = test_state().await;
        let app = app(state.app);

        let body = json!({ "username": "", "password": "p1", "email": "not-an-email" });
        let response =
            make_request(None, app, Method::POST, "/signup", body.to_string()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["errors"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_signup_disabled() {
        let mut state = test_state().await;
        let mut config = (*state.app.config).clone();
        config.auth.local = false;
        state.app.config = std::sync::Arc::new(config);
        let app = app(state.app);

        let body = json!({ "username": "u1", "password": "p1" });
        let response =
            make_request(None, app, Method::POST, "/signup", body.to_string()).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
