//! Password change and recovery.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::mail::{Message, Template};
use crate::router::Valid;
use crate::token::TokenKind;
use crate::user::{Account, PasswordChange, PublicInfo};

#[derive(Debug, Validate, Serialize, Deserialize)]
pub struct ChangeBody {
    #[validate(length(min = 1, message = "Current password is required."))]
    pub old_password: String,
    #[validate(length(min = 1, max = 1024, message = "New password is required."))]
    pub password: String,
}

#[derive(Debug, Validate, Serialize, Deserialize)]
pub struct ForgotBody {
    /// Username or verified email.
    #[validate(length(min = 1, message = "Username is required."))]
    pub username: String,
}

#[derive(Debug, Validate, Serialize, Deserialize)]
pub struct ResetBody {
    #[validate(length(min = 1, message = "Token is required."))]
    pub token: String,
    #[validate(length(min = 1, max = 1024, message = "New password is required."))]
    pub password: String,
}

/// Change own password knowing the current one.
pub async fn change(
    State(state): State<AppState>,
    Extension(account): Extension<Account>,
    Valid(body): Valid<ChangeBody>,
) -> Result<Json<PublicInfo>> {
    let info = state
        .accounts
        .update_password(PasswordChange::SelfService {
            uid: account.uid,
            old: body.old_password,
            new: body.password,
        })
        .await?;

    Ok(Json(info))
}

/// Mail a reset link to the verified email of the account.
///
/// Answers `202` whether or not a link went out.
pub async fn forgot(
    State(state): State<AppState>,
    Valid(body): Valid<ForgotBody>,
) -> Result<StatusCode> {
    let account = match state.accounts.find_for_reset(&body.username).await {
        Ok(account) => account,
        Err(ServerError::InvalidUser) => {
            tracing::debug!("password reset asked for an unknown account");
            return Ok(StatusCode::ACCEPTED);
        },
        Err(err) => return Err(err),
    };
    let Some(to) = account.email.clone() else {
        tracing::debug!(uid = %account.uid, "password reset asked without verified email");
        return Ok(StatusCode::ACCEPTED);
    };

    let token = match state.token.create(&account, TokenKind::Reset) {
        Ok(token) => token,
        Err(err) => {
            tracing::error!(%err, uid = %account.uid, "cannot sign reset link");
            return Ok(StatusCode::ACCEPTED);
        },
    };
    let message = Message {
        to,
        username: account.username.clone(),
        template: Template::ResetPassword,
        link: format!("{}/reset-password?token={token}", state.config.portal_url),
    };
    match state.mailer.send(message).await {
        Ok(()) => tracing::info!(uid = %account.uid, "password reset link sent"),
        Err(err) => tracing::error!(%err, uid = %account.uid, "reset mail not sent"),
    }

    Ok(StatusCode::ACCEPTED)
}

/// Consume a reset link.
pub async fn reset(
    State(state): State<AppState>,
    Valid(body): Valid<ResetBody>,
) -> Result<Json<PublicInfo>> {
    let claims = state.token.parse_kind(&body.token, TokenKind::Reset)?;
    let info = state.accounts.reset_password(&claims, body.password).await?;

    Ok(Json(info))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::*;

    #[tokio::test]
    async fn test_change_password() {
        let state = test_state().await;
        let app = app(state.app.clone());
        let token = state.signup("u1", "p1").await;

        let body = json!({ "old_password": "wrong", "password": "p2" });
        let response =
            make_request(Some(&token), app.clone(), Method::PUT, "/password", body.to_string())
                .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = json!({ "old_password": "p1", "password": "p2" });
        let response =
            make_request(Some(&token), app.clone(), Method::PUT, "/password", body.to_string())
                .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json!({ "username": "u1", "password": "p2" });
        let response =
            make_request(None, app, Method::POST, "/login", body.to_string()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_reset_link_single_use() {
        let state = test_state().await;
        let app = app(state.app.clone());

        // No verified email yet: same answer, nothing sent.
        let body = json!({ "username": "admin" });
        let response = make_request(
            None,
            app.clone(),
            Method::POST,
            "/password/forgot",
            body.to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(state.mailer.sent.lock().await.is_empty());

        let admin = state.login("admin").await;
        let body = json!({ "username": "bob", "password": "p1", "email": "bob@x.com" });
        make_request(Some(&admin), app.clone(), Method::POST, "/users", body.to_string())
            .await;

        let body = json!({ "username": "bob@x.com" });
        let response = make_request(
            None,
            app.clone(),
            Method::POST,
            "/password/forgot",
            body.to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let link = state.mailer.sent.lock().await[0].link.clone();
        let token = link
            .strip_prefix("https://portal.example.com/reset-password?token=")
            .unwrap();

        let body = json!({ "token": token, "password": "p2" });
        let response = make_request(
            None,
            app.clone(),
            Method::POST,
            "/password/reset",
            body.to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        // The hash moved, the link is dead.
        let body = json!({ "token": token, "password": "p3" });
        let response = make_request(
            None,
            app.clone(),
            Method::POST,
            "/password/reset",
            body.to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = json!({ "username": "bob", "password": "p2" });
        let response =
            make_request(None, app, Method::POST, "/login", body.to_string()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_forgot_hides_unknown_accounts() {
        let state = test_state().await;
        let app = app(state.app.clone());

        for username in ["nobody", "nobody@x.com"] {
            let body = json!({ "username": username });
            let response = make_request(
                None,
                app.clone(),
                Method::POST,
                "/password/forgot",
                body.to_string(),
            )
            .await;
            assert_eq!(response.status(), StatusCode::ACCEPTED);
        }
        assert!(state.mailer.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_login_token_is_not_a_reset_link() {
        let state = test_state().await;
        let app = app(state.app.clone());
        let token = state.login("admin").await;

        let body = json!({ "token": token, "password": "p2" });
        let response =
            make_request(None, app, Method::POST, "/password/reset", body.to_string())
                .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
