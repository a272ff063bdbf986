//! Map identity provider profiles onto local accounts.

use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{Account, AccountManager, Kind, OnboardingState, Role, State};
use crate::error::{Result, ServerError};
use crate::store::{Field, Filter};

/// Give up generating a username after this many collisions.
pub const MAX_USERNAME_ATTEMPTS: usize = 1000;
const SUFFIX_RANGE: u32 = 100_000;
const FALLBACK_SEED: &str = "user";

/// Normalized user payload fetched from an identity provider.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub provider: Kind,
    /// Provider-side identifier.
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub email_verified: bool,
    pub avatar_url: Option<String>,
}

impl ProviderProfile {
    /// New account candidate built from the profile.
    pub fn candidate(&self) -> Account {
        let onboarding_state = if self.email_verified && self.email.is_some() {
            OnboardingState::EmailVerified
        } else {
            OnboardingState::Signup
        };

        Account {
            name: self.name.clone(),
            // An unverified provider email is staged, never trusted.
            email: self.email.clone().filter(|_| self.email_verified),
            unverified_email: self.email.clone().filter(|_| !self.email_verified),
            photo: self.avatar_url.clone(),
            kind: self.provider,
            role: Role::User,
            state: State::Active,
            onboarding_state,
            social_auth_id: Some(self.id.clone()),
            logged_in: true,
            ..Default::default()
        }
    }
}

/// Sanitized lowercase prefix for generated usernames.
///
/// Picks the first or the last word of the name at random, then falls back
/// on the local part of the email.
pub fn username_seed(name: Option<&str>, email: Option<&str>) -> String {
    let sanitize = |s: &str| -> String {
        s.chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect()
    };

    let words: Vec<String> = name
        .unwrap_or_default()
        .split_whitespace()
        .map(sanitize)
        .filter(|w| !w.is_empty())
        .collect();

    let picked = match words.as_slice() {
        [] => None,
        [only] => Some(only.clone()),
        [first, .., last] => Some(if rand::thread_rng().gen_bool(0.5) {
            first.clone()
        } else {
            last.clone()
        }),
    };

    picked
        .or_else(|| {
            email
                .and_then(|e| e.split('@').next())
                .map(sanitize)
                .filter(|s| !s.is_empty())
        })
        .unwrap_or_else(|| FALLBACK_SEED.to_owned())
}

/// Seed followed by a random 5-digit suffix.
pub fn generate_username(seed: &str) -> String {
    let suffix = rand::thread_rng().gen_range(0..SUFFIX_RANGE);
    format!("{seed}{suffix:05}")
}

/// Resolve a provider profile to the account it signs in.
pub struct SocialResolver {
    accounts: Arc<AccountManager>,
}

impl SocialResolver {
    pub fn new(accounts: Arc<AccountManager>) -> Self {
        Self { accounts }
    }

    /// Sign in the account mapped to `profile`, creating it on first visit.
    pub async fn resolve(&self, profile: &ProviderProfile) -> Result<Account> {
        if profile.id.is_empty() {
            return Err(ServerError::InvalidRequest(
                "provider returned no user id".into(),
            ));
        }

        let filter = Filter::by(Field::SocialAuthId, profile.id.clone())
            .kind(profile.provider);

        match self.accounts.find(&filter).await {
            Ok(mut account) => {
                if account.is_removed() {
                    return Err(ServerError::InvalidUser);
                }

                if profile.name.as_deref().is_some_and(|n| !n.is_empty()) {
                    account.name = profile.name.clone();
                }
                if profile.avatar_url.is_some() {
                    account.photo = profile.avatar_url.clone();
                }
                account.logged_in = true;
                account.state = State::Active;

                self.accounts.save(&mut account).await?;
                tracing::info!(
                    uid = %account.uid,
                    provider = profile.provider.as_str(),
                    "social account signed in"
                );

                Ok(account)
            },
            Err(ServerError::InvalidUser) => {
                self.accounts.create_social(profile.candidate()).await
            },
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CredentialStore, MemoryStore};

    fn profile(id: &str, email: Option<&str>, verified: bool) -> ProviderProfile {
        ProviderProfile {
            provider: Kind::Github,
            id: id.into(),
            name: Some("Mona Lisa Octocat".into()),
            email: email.map(Into::into),
            email_verified: verified,
            avatar_url: Some("https://avatars.example.com/u/1".into()),
        }
    }

    fn resolver() -> (Arc<MemoryStore>, SocialResolver) {
        let store = Arc::new(MemoryStore::new());
        let accounts = Arc::new(AccountManager::new(
            store.clone(),
            crate::crypto::test_password_manager(),
        ));
        (store, SocialResolver::new(accounts))
    }

    #[test]
    fn test_username_seed() {
        let seed = username_seed(Some("Mona Lisa Octocat"), None);
        assert!(seed == "mona" || seed == "octocat", "{seed}");
        assert_eq!(username_seed(Some("  Zoë  "), None), "zo");
        assert_eq!(username_seed(None, Some("j.doe@x.com")), "jdoe");
        assert_eq!(username_seed(Some("***"), None), FALLBACK_SEED);
    }

    #[test]
    fn test_generate_username() {
        let username = generate_username("mona");
        assert_eq!(username.len(), "mona".len() + 5);
        assert!(username.starts_with("mona"));
        assert!(username[4..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_candidate() {
        let verified = profile("1", Some("mona@x.com"), true).candidate();
        assert_eq!(verified.onboarding_state, OnboardingState::EmailVerified);
        assert_eq!(verified.email.as_deref(), Some("mona@x.com"));
        assert!(verified.logged_in);
        assert_eq!(verified.role, Role::User);

        let unverified = profile("1", Some("mona@x.com"), false).candidate();
        assert_eq!(unverified.onboarding_state, OnboardingState::Signup);
        assert!(unverified.email.is_none());
        assert_eq!(unverified.unverified_email.as_deref(), Some("mona@x.com"));
    }

    #[tokio::test]
    async fn test_new_identity_creates_account() {
        let (store, resolver) = resolver();

        let account = resolver
            .resolve(&profile("583231", Some("mona@x.com"), true))
            .await
            .unwrap();

        assert_eq!(account.kind, Kind::Github);
        assert_eq!(account.social_auth_id.as_deref(), Some("583231"));
        assert!(!account.username.is_empty());
        assert!(account.password.is_none());
        assert!(!account.uid.is_empty());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_returning_identity_is_refreshed() {
        let (store, resolver) = resolver();

        let first = resolver.resolve(&profile("1", None, false)).await.unwrap();

        let mut again = profile("1", None, false);
        again.name = Some("Mona".into());
        let second = resolver.resolve(&again).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.username, second.username);
        assert_eq!(second.name.as_deref(), Some("Mona"));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_local_email_is_not_taken_over() {
        let (store, resolver) = resolver();
        store
            .insert(&Account {
                username: "mona".into(),
                email: Some("mona@x.com".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(matches!(
            resolver
                .resolve(&profile("1", Some("mona@x.com"), true))
                .await,
            Err(ServerError::UserExists)
        ));
        assert_eq!(store.len().await, 1);
    }
}
