//! Google OAuth application.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use super::{IdentityProvider, OAuthError, TokenResponse, client};
use crate::config::OAuthProvider;
use crate::user::Kind;
use crate::user::social::ProviderProfile;

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://www.googleapis.com/userinfo/v2/me";
const SCOPE: &str = "openid email profile";

#[derive(Debug, Deserialize)]
struct UserInfo {
    id: String,
    email: Option<String>,
    #[serde(default)]
    verified_email: bool,
    name: Option<String>,
    picture: Option<String>,
}

impl From<UserInfo> for ProviderProfile {
    fn from(info: UserInfo) -> Self {
        ProviderProfile {
            provider: Kind::Google,
            id: info.id,
            name: info.name,
            email: info.email,
            email_verified: info.verified_email,
            avatar_url: info.picture,
        }
    }
}

/// Login with Google.
pub struct GoogleProvider {
    app: OAuthProvider,
    http: reqwest::Client,
}

impl GoogleProvider {
    pub fn new(app: OAuthProvider) -> Self {
        Self { app, http: client() }
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn kind(&self) -> Kind {
        Kind::Google
    }

    fn authorize_url(&self, state: &str) -> Result<String, OAuthError> {
        let url = Url::parse_with_params(
            AUTHORIZE_URL,
            &[
                ("client_id", self.app.client_id.as_str()),
                ("redirect_uri", self.app.redirect_url.as_str()),
                ("response_type", "code"),
                ("scope", SCOPE),
                ("state", state),
            ],
        )?;

        Ok(url.into())
    }

    async fn exchange(&self, code: &str) -> Result<ProviderProfile, OAuthError> {
        let token = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("client_id", self.app.client_id.as_str()),
                ("client_secret", self.app.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.app.redirect_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?
            .json::<TokenResponse>()
            .await?
            .access_token()?;

        let info = self
            .http
            .get(USERINFO_URL)
            .bearer_auth(&token)
            .send()
            .await?
            .error_for_status()?
            .json::<UserInfo>()
            .await?;

        Ok(info.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_userinfo() {
        let info: UserInfo = serde_json::from_str(
            r#"{"id":"1098","email":"jane@x.com","verified_email":false,"name":"Jane Doe","picture":"https://lh3.example.com/a"}"#,
        )
        .unwrap();

        let profile = ProviderProfile::from(info);
        assert_eq!(profile.provider, Kind::Google);
        assert_eq!(profile.id, "1098");
        assert!(!profile.email_verified);
    }
}
