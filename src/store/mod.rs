//! Credential store: a document collection of [`Account`].
//!
//! Uniqueness of usernames, local verified emails and social identities is
//! enforced by every backend. A violation is reported as
//! [`StoreError::Duplicate`], whichever request loses the race.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{
    DEFAULT_CREDENTIALS, DEFAULT_DATABASE_NAME, DEFAULT_POOL_SIZE,
    PostgresStore,
};

use async_trait::async_trait;

use crate::user::{Account, Kind};

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("no document matches the filter")]
    NotFound,
    #[error("document violates a unique constraint")]
    Duplicate,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

/// Queryable account fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    Id,
    Uid,
    Username,
    Email,
    Kind,
    SocialAuthId,
}

impl Field {
    /// Key of the field inside a document.
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::Uid => "uid",
            Field::Username => "username",
            Field::Email => "email",
            Field::Kind => "kind",
            Field::SocialAuthId => "social_auth_id",
        }
    }

    fn value<'a>(&self, account: &'a Account) -> Option<&'a str> {
        match self {
            Field::Id => Some(&account.id),
            Field::Uid => Some(&account.uid),
            Field::Username => Some(&account.username),
            Field::Email => account.email.as_deref(),
            Field::Kind => Some(account.kind.as_str()),
            Field::SocialAuthId => account.social_auth_id.as_deref(),
        }
    }
}

/// Conjunction of field equalities. An empty filter matches everything.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(Field, String)>,
}

impl Filter {
    /// Match every document.
    pub fn all() -> Self {
        Self::default()
    }

    /// Match documents where `field` equals `value`.
    pub fn by(field: Field, value: impl Into<String>) -> Self {
        Self::all().and(field, value)
    }

    /// Add another equality.
    pub fn and(mut self, field: Field, value: impl Into<String>) -> Self {
        self.conditions.push((field, value.into()));
        self
    }

    /// Restrict to accounts of an authentication method.
    pub fn kind(self, kind: Kind) -> Self {
        self.and(Field::Kind, kind.as_str())
    }

    pub fn conditions(&self) -> &[(Field, String)] {
        &self.conditions
    }

    /// Check `account` against every condition.
    pub fn matches(&self, account: &Account) -> bool {
        self.conditions
            .iter()
            .all(|(field, value)| field.value(account) == Some(value.as_str()))
    }
}

/// Storage backend for accounts.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a new document and return its identifier.
    async fn insert(&self, account: &Account) -> Result<String>;

    /// First document matching `filter`.
    async fn find_one(&self, filter: &Filter) -> Result<Account>;

    /// Every document matching `filter`.
    async fn find_all(&self, filter: &Filter) -> Result<Vec<Account>>;

    /// Replace the document identified by `id`.
    async fn update_by_id(&self, id: &str, account: &Account) -> Result<()>;

    /// Whether at least one document matches `filter`.
    async fn exists(&self, filter: &Filter) -> Result<bool> {
        match self.find_one(filter).await {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound) => Ok(false),
            Err(err) => Err(err),
        }
    }
}

/// Check `candidate` against the unique constraints of `others`.
pub(crate) fn conflicts(candidate: &Account, others: &[Account]) -> bool {
    let email = candidate
        .email
        .as_deref()
        .filter(|e| !e.is_empty() && candidate.kind == Kind::Local);

    others.iter().filter(|a| a.id != candidate.id).any(|other| {
        let username =
            !candidate.username.is_empty() && other.username == candidate.username;

        let social = candidate.social_auth_id.is_some()
            && other.kind == candidate.kind
            && other.social_auth_id == candidate.social_auth_id;

        let local_email = email.is_some()
            && other.kind == Kind::Local
            && other.email.as_deref() == email;

        username || social || local_email
    })
}
