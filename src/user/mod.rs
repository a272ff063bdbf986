pub mod onboarding;
mod service;
pub mod social;

pub use service::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authentication method owning an account.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    #[default]
    Local,
    Github,
    Google,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Local => "local",
            Kind::Github => "github",
            Kind::Google => "google",
        }
    }
}

impl std::str::FromStr for Kind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Kind::Local),
            "github" => Ok(Kind::Github),
            "google" => Ok(Kind::Google),
            _ => Err(()),
        }
    }
}

/// Authorization level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
}

/// Lifecycle of an account.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    /// Until the first login or self-set password.
    #[default]
    Created,
    Active,
    /// Soft deleted.
    Removed,
}

/// Progress from signup to a verified and complete profile.
///
/// See [`onboarding`] for transitions.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingState {
    /// Never assigned to a real account.
    #[default]
    Invalid,
    Signup,
    EmailVerified,
    UnverifiedAndComplete,
    VerifiedAndComplete,
}

/// Account as saved on the credential store.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Account {
    pub id: String,
    pub uid: String,
    pub username: String,
    /// Argon2 PHC string, local accounts only.
    pub password: Option<String>,
    pub email: Option<String>,
    /// Email waiting for a verification link to be consumed.
    pub unverified_email: Option<String>,
    pub company: Option<String>,
    pub company_role: Option<String>,
    pub name: Option<String>,
    pub photo: Option<String>,
    pub kind: Kind,
    pub role: Role,
    pub state: State,
    pub onboarding_state: OnboardingState,
    pub social_auth_id: Option<String>,
    pub logged_in: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub removed_at: Option<DateTime<Utc>>,
}

/// Fields a user may change on their own account.
///
/// Emails are not part of it: they are staged then verified.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountPatch {
    pub name: Option<String>,
    pub company: Option<String>,
    pub company_role: Option<String>,
    pub photo: Option<String>,
}

fn merge_field(stored: &mut Option<String>, patch: &Option<String>) {
    if let Some(value) = patch.as_ref().filter(|v| !v.is_empty()) {
        *stored = Some(value.clone());
    }
}

impl Account {
    /// Apply every field set on `patch`, keep the stored value otherwise.
    pub fn merge(&mut self, patch: &AccountPatch) {
        merge_field(&mut self.name, &patch.name);
        merge_field(&mut self.company, &patch.company);
        merge_field(&mut self.company_role, &patch.company_role);
        merge_field(&mut self.photo, &patch.photo);
    }

    pub fn is_removed(&self) -> bool {
        self.state == State::Removed
    }

    /// Projection shown to the owner and to admins.
    pub fn public_info(&self) -> PublicInfo {
        PublicInfo {
            id: self.id.clone(),
            uid: self.uid.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
            unverified_email: self.unverified_email.clone(),
            company: self.company.clone(),
            company_role: self.company_role.clone(),
            name: self.name.clone(),
            photo: self.photo.clone(),
            kind: Some(self.kind),
            role: self.role,
            state: self.state,
            onboarding_state: self.onboarding_state,
            social_auth_id: self.social_auth_id.clone(),
            logged_in: self.logged_in,
            created_at: self.created_at,
            updated_at: self.updated_at,
            removed_at: self.removed_at,
        }
    }
}

/// Account without its password hash.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PublicInfo {
    pub id: String,
    pub uid: String,
    pub username: String,
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unverified_email: Option<String>,
    pub company: Option<String>,
    pub company_role: Option<String>,
    pub name: Option<String>,
    pub photo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<Kind>,
    pub role: Role,
    pub state: State,
    pub onboarding_state: OnboardingState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social_auth_id: Option<String>,
    pub logged_in: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub removed_at: Option<DateTime<Utc>>,
}

impl PublicInfo {
    /// Hide what only the owner and admins may see.
    pub fn redacted(mut self) -> Self {
        self.kind = None;
        self.social_auth_id = None;
        self.unverified_email = None;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_absent_fields() {
        let mut account = Account {
            name: Some("A".into()),
            email: Some("a@x.com".into()),
            ..Default::default()
        };

        account.merge(&AccountPatch {
            name: Some("B".into()),
            ..Default::default()
        });
        assert_eq!(account.name.as_deref(), Some("B"));
        assert_eq!(account.email.as_deref(), Some("a@x.com"));

        // Empty strings count as absent.
        account.merge(&AccountPatch {
            name: Some(String::new()),
            company: Some("ACME".into()),
            ..Default::default()
        });
        assert_eq!(account.name.as_deref(), Some("B"));
        assert_eq!(account.email.as_deref(), Some("a@x.com"));
        assert_eq!(account.company.as_deref(), Some("ACME"));
    }

    #[test]
    fn test_public_info_hides_password() {
        let account = Account {
            username: "octocat".into(),
            password: Some("$argon2id$secret".into()),
            kind: Kind::Github,
            social_auth_id: Some("583231".into()),
            ..Default::default()
        };

        let json = serde_json::to_string(&account.public_info()).unwrap();
        assert!(!json.contains("argon2id"));
        assert!(json.contains("583231"));

        let json = serde_json::to_string(&account.public_info().redacted()).unwrap();
        assert!(!json.contains("583231"));
        assert!(!json.contains("github"));
    }

    #[test]
    fn test_enum_encoding() {
        assert_eq!(serde_json::to_string(&Kind::Github).unwrap(), "\"github\"");
        assert_eq!(
            serde_json::to_string(&OnboardingState::UnverifiedAndComplete).unwrap(),
            "\"unverified_and_complete\""
        );
        assert_eq!("google".parse::<Kind>(), Ok(Kind::Google));
        assert!("ldap".parse::<Kind>().is_err());
    }
}
