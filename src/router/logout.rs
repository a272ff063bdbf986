use axum::Extension;
use axum::extract::State;
use axum::http::StatusCode;

use crate::AppState;
use crate::error::Result;
use crate::user::Account;

/// Flip the session flag off. Tokens stay valid until they expire.
pub async fn handler(
    State(state): State<AppState>,
    Extension(account): Extension<Account>,
) -> Result<StatusCode> {
    state.accounts.logout(&account.id).await?;
    tracing::debug!(uid = %account.uid, "logged out");

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};

    use crate::*;

    #[tokio::test]
    async fn test_logout_handler() {
        let state = test_state().await;
        let app = app(state.app.clone());
        let token = state.login("admin").await;

        let response = make_request(
            Some(&token),
            app.clone(),
            Method::POST,
            "/logout",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let admin = state.app.accounts.get_by_username("admin").await.unwrap();
        assert!(!admin.logged_in);

        // Already logged out is fine.
        let response =
            make_request(Some(&token), app.clone(), Method::POST, "/logout", String::default())
                .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response =
            make_request(None, app, Method::POST, "/logout", String::default()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
