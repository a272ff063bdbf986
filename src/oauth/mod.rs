//! OAuth2 identity providers.
//!
//! A provider turns an authorization code into a [`ProviderProfile`].

mod github;
mod google;

pub use github::GithubProvider;
pub use google::GoogleProvider;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::Configuration;
use crate::user::Kind;
use crate::user::social::ProviderProfile;

const USER_AGENT: &str = concat!("portal-auth/", env!("CARGO_PKG_VERSION"));

#[derive(thiserror::Error, Debug)]
pub enum OAuthError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("provider refused the code: {0}")]
    Exchange(String),
    #[error(transparent)]
    Url(#[from] url::ParseError),
}

impl From<OAuthError> for crate::error::ServerError {
    fn from(err: OAuthError) -> Self {
        match err {
            OAuthError::Exchange(reason) => {
                crate::error::ServerError::InvalidRequest(reason)
            },
            err => crate::error::ServerError::internal("identity provider failure", err),
        }
    }
}

/// Authorization code flow of an identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Provider the accounts will be bound to.
    fn kind(&self) -> Kind;

    /// Where to send the user, `state` is echoed back on callback.
    fn authorize_url(&self, state: &str) -> Result<String, OAuthError>;

    /// Trade `code` for the user profile.
    async fn exchange(&self, code: &str) -> Result<ProviderProfile, OAuthError>;
}

/// Enabled providers.
pub type Providers = HashMap<Kind, Arc<dyn IdentityProvider>>;

/// Build every provider enabled in configuration.
pub fn providers(config: &Configuration) -> Providers {
    let mut enabled: Vec<Arc<dyn IdentityProvider>> = Vec::new();

    match (config.auth.github, &config.github) {
        (true, Some(app)) => enabled.push(Arc::new(GithubProvider::new(app.clone()))),
        (true, None) => tracing::warn!("GitHub login enabled without `github` entry"),
        _ => (),
    }

    match (config.auth.google, &config.google) {
        (true, Some(app)) => enabled.push(Arc::new(GoogleProvider::new(app.clone()))),
        (true, None) => tracing::warn!("Google login enabled without `google` entry"),
        _ => (),
    }

    enabled
        .into_iter()
        .map(|provider| (provider.kind(), provider))
        .collect()
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_default()
}

/// Token endpoint answer, errors are reported with a 200 by some providers.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl TokenResponse {
    fn access_token(self) -> Result<String, OAuthError> {
        match self.access_token {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(OAuthError::Exchange(
                self.error_description
                    .or(self.error)
                    .unwrap_or_else(|| "no access token".into()),
            )),
        }
    }
}

/// Provider answering with a fixed profile for the code `good`.
#[cfg(test)]
pub struct FakeProvider {
    pub profile: ProviderProfile,
}

#[cfg(test)]
#[async_trait]
impl IdentityProvider for FakeProvider {
    fn kind(&self) -> Kind {
        self.profile.provider
    }

    fn authorize_url(&self, state: &str) -> Result<String, OAuthError> {
        Ok(url::Url::parse_with_params(
            "https://provider.example.com/authorize",
            &[("state", state)],
        )?
        .into())
    }

    async fn exchange(&self, code: &str) -> Result<ProviderProfile, OAuthError> {
        match code {
            "good" => Ok(self.profile.clone()),
            _ => Err(OAuthError::Exchange("bad_verification_code".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OAuthProvider;

    #[test]
    fn test_enabled_providers() {
        let mut config = Configuration::default();
        config.auth.github = true;
        config.github = Some(OAuthProvider {
            client_id: "id".into(),
            client_secret: "secret".into(),
            redirect_url: "https://auth.example.com/oauth/callback".into(),
        });
        config.google = Some(OAuthProvider::default());

        let providers = providers(&config);
        assert!(providers.contains_key(&Kind::Github));
        // Configured but disabled.
        assert!(!providers.contains_key(&Kind::Google));
    }

    #[test]
    fn test_token_response() {
        let ok: TokenResponse =
            serde_json::from_str(r#"{"access_token":"gho_1","token_type":"bearer"}"#).unwrap();
        assert_eq!(ok.access_token().unwrap(), "gho_1");

        let refused: TokenResponse = serde_json::from_str(
            r#"{"error":"bad_verification_code","error_description":"The code passed is incorrect or expired."}"#,
        )
        .unwrap();
        assert!(matches!(
            refused.access_token(),
            Err(OAuthError::Exchange(reason)) if reason.contains("expired")
        ));
    }
}
