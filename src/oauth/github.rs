//! GitHub OAuth application.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use url::Url;

use super::{IdentityProvider, OAuthError, TokenResponse, client};
use crate::config::OAuthProvider;
use crate::user::Kind;
use crate::user::social::ProviderProfile;

const AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const API_URL: &str = "https://api.github.com";
const SCOPE: &str = "read:user user:email";

#[derive(Debug, Deserialize)]
struct User {
    id: u64,
    login: String,
    name: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Email {
    email: String,
    primary: bool,
    verified: bool,
}

/// Login with GitHub.
pub struct GithubProvider {
    app: OAuthProvider,
    http: reqwest::Client,
}

impl GithubProvider {
    pub fn new(app: OAuthProvider) -> Self {
        Self { app, http: client() }
    }
}

fn profile(user: User, emails: &[Email]) -> ProviderProfile {
    let primary = emails.iter().find(|e| e.primary);

    ProviderProfile {
        provider: Kind::Github,
        id: user.id.to_string(),
        name: user.name.filter(|n| !n.is_empty()).or(Some(user.login)),
        email: primary.map(|e| e.email.clone()),
        email_verified: primary.is_some_and(|e| e.verified),
        avatar_url: user.avatar_url,
    }
}

#[async_trait]
impl IdentityProvider for GithubProvider {
    fn kind(&self) -> Kind {
        Kind::Github
    }

    fn authorize_url(&self, state: &str) -> Result<String, OAuthError> {
        let url = Url::parse_with_params(
            AUTHORIZE_URL,
            &[
                ("client_id", self.app.client_id.as_str()),
                ("redirect_uri", self.app.redirect_url.as_str()),
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
            .header(ACCEPT, "application/json")
            .form(&[
                ("client_id", self.app.client_id.as_str()),
                ("client_secret", self.app.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.app.redirect_url.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json::<TokenResponse>()
            .await?
            .access_token()?;

        let user = self
            .http
            .get(format!("{API_URL}/user"))
            .bearer_auth(&token)
            .send()
            .await?
            .error_for_status()?
            .json::<User>()
            .await?;

        // Private emails are only listed there.
        let emails = self
            .http
            .get(format!("{API_URL}/user/emails"))
            .bearer_auth(&token)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<Email>>()
            .await?;

        Ok(profile(user, &emails))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile() {
        let user: User = serde_json::from_str(
            r#"{"login":"octocat","id":583231,"name":null,"avatar_url":"https://avatars.githubusercontent.com/u/583231"}"#,
        )
        .unwrap();
        let emails: Vec<Email> = serde_json::from_str(
            r#"[{"email":"old@x.com","primary":false,"verified":true},{"email":"octo@x.com","primary":true,"verified":true}]"#,
        )
        .unwrap();

        let profile = profile(user, &emails);
        assert_eq!(profile.id, "583231");
        assert_eq!(profile.name.as_deref(), Some("octocat"));
        assert_eq!(profile.email.as_deref(), Some("octo@x.com"));
        assert!(profile.email_verified);
    }

    #[test]
    fn test_authorize_url() {
        let github = GithubProvider::new(OAuthProvider {
            client_id: "abc".into(),
            client_secret: "secret".into(),
            redirect_url: "https://auth.example.com/oauth/callback".into(),
        });

        let url = github.authorize_url("github:xyz").unwrap();
        assert!(url.starts_with(AUTHORIZE_URL));
        assert!(url.contains("client_id=abc"));
        assert!(url.contains("state=github%3Axyz"));
        assert!(!url.contains("secret"));
    }
}
