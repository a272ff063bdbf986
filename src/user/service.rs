//! Every account mutation goes through [`AccountManager`].
//!
//! Uniqueness is checked before writing to produce a clean error, the store
//! constraints remain the backstop: a late [`StoreError::Duplicate`] surfaces
//! as [`ServerError::UserExists`].

use std::sync::Arc;

use chrono::Utc;

use super::onboarding::{self, Fields};
use super::social::{MAX_USERNAME_ATTEMPTS, generate_username, username_seed};
use super::{Account, AccountPatch, Kind, OnboardingState, PublicInfo, Role, State};
use crate::crypto::PasswordManager;
use crate::error::{Result, ServerError};
use crate::store::{CredentialStore, Field, Filter, StoreError};
use crate::token::{Claims, TokenKind, fingerprint};

/// Local account to create.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Candidate {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub company: Option<String>,
    pub company_role: Option<String>,
    /// Ignored on self signup.
    pub role: Role,
}

/// Who is creating a local account.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateMode {
    /// Self signup, email still to be verified.
    Signup,
    /// Created on behalf of someone by `caller`.
    Admin { caller: Role },
}

/// Password update request.
#[derive(Clone, Debug, PartialEq)]
pub enum PasswordChange {
    /// The owner knows the current password.
    SelfService {
        uid: String,
        old: String,
        new: String,
    },
    /// An admin overrides the password of `username`.
    AdminReset {
        caller: Role,
        username: String,
        new: String,
    },
}

/// Account manager.
pub struct AccountManager {
    store: Arc<dyn CredentialStore>,
    pwd: Arc<PasswordManager>,
}

impl AccountManager {
    /// Create a new [`AccountManager`].
    pub fn new(store: Arc<dyn CredentialStore>, pwd: Arc<PasswordManager>) -> Self {
        Self { store, pwd }
    }

    /// Find a single account, [`ServerError::InvalidUser`] when missing.
    pub(crate) async fn find(&self, filter: &Filter) -> Result<Account> {
        Ok(self.store.find_one(filter).await?)
    }

    async fn find_live(&self, filter: &Filter) -> Result<Account> {
        let account = self.find(filter).await?;
        if account.is_removed() {
            return Err(ServerError::InvalidUser);
        }
        Ok(account)
    }

    /// Persist a mutation.
    pub(crate) async fn save(&self, account: &mut Account) -> Result<()> {
        account.updated_at = Utc::now();
        Ok(self.store.update_by_id(&account.id, account).await?)
    }

    /// Whether a local account other than `id` owns `email`.
    async fn email_taken(&self, email: &str, id: &str) -> Result<bool> {
        let owners = self
            .store
            .find_all(&Filter::by(Field::Email, email).kind(Kind::Local))
            .await?;
        Ok(owners.iter().any(|owner| owner.id != id))
    }

    async fn username_taken(&self, username: &str, id: &str) -> Result<bool> {
        let owners = self
            .store
            .find_all(&Filter::by(Field::Username, username))
            .await?;
        Ok(owners.iter().any(|owner| owner.id != id))
    }

    /// Create a local account.
    pub async fn create_local(
        &self,
        candidate: Candidate,
        mode: CreateMode,
    ) -> Result<PublicInfo> {
        if candidate.username.is_empty() || candidate.password.is_empty() {
            return Err(ServerError::InvalidRequest(
                "username and password are required".into(),
            ));
        }

        if let CreateMode::Admin { caller } = mode {
            if caller != Role::Admin {
                return Err(ServerError::InvalidUser);
            }
        }

        if self
            .store
            .exists(&Filter::by(Field::Username, candidate.username.clone()))
            .await?
        {
            return Err(ServerError::UserExists);
        }

        let email = candidate.email.clone().filter(|e| !e.is_empty());
        if let Some(email) = &email {
            if self.email_taken(email, "").await? {
                return Err(ServerError::UserExists);
            }
        }

        let password = self.pwd.hash_async(candidate.password).await?;
        let now = Utc::now();

        let mut account = Account {
            uid: uuid::Uuid::new_v4().to_string(),
            username: candidate.username,
            password: Some(password),
            name: candidate.name,
            company: candidate.company,
            company_role: candidate.company_role,
            kind: Kind::Local,
            state: State::Created,
            created_at: now,
            updated_at: now,
            ..Default::default()
        };

        match mode {
            CreateMode::Signup => {
                account.role = Role::User;
                account.onboarding_state = OnboardingState::Signup;
                account.unverified_email = email.or_else(|| {
                    account.username.contains('@').then(|| account.username.clone())
                });
            },
            CreateMode::Admin { .. } => {
                account.role = candidate.role;
                account.onboarding_state = OnboardingState::UnverifiedAndComplete;
                account.email = email;
            },
        }

        account.id = self.store.insert(&account).await?;
        tracing::info!(uid = %account.uid, ?mode, "local account created");

        Ok(account.public_info())
    }

    /// Create the configured administrator if it does not exist yet.
    pub async fn seed_admin(
        &self,
        username: &str,
        password: &str,
        name: Option<String>,
    ) -> Result<()> {
        let candidate = Candidate {
            username: username.to_owned(),
            password: password.to_owned(),
            name,
            role: Role::Admin,
            ..Default::default()
        };

        match self
            .create_local(candidate, CreateMode::Admin { caller: Role::Admin })
            .await
        {
            Ok(_) | Err(ServerError::UserExists) => {
                tracing::info!(%username, "default admin ready");
                Ok(())
            },
            Err(err) => Err(err),
        }
    }

    /// Create an account for a new social identity.
    pub async fn create_social(&self, candidate: Account) -> Result<Account> {
        if let Some(email) = candidate.email.as_deref().filter(|e| !e.is_empty()) {
            if self.email_taken(email, "").await? {
                tracing::warn!(
                    provider = candidate.kind.as_str(),
                    "social login matches a local account email"
                );
                return Err(ServerError::UserExists);
            }
        }

        let seed = username_seed(candidate.name.as_deref(), candidate.email.as_deref());
        let now = Utc::now();
        let mut account = Account {
            uid: uuid::Uuid::new_v4().to_string(),
            password: None,
            created_at: now,
            updated_at: now,
            ..candidate
        };

        for _ in 0..MAX_USERNAME_ATTEMPTS {
            account.username = generate_username(&seed);
            if self
                .store
                .exists(&Filter::by(Field::Username, account.username.clone()))
                .await?
            {
                continue;
            }

            match self.store.insert(&account).await {
                Ok(id) => {
                    account.id = id;
                    tracing::info!(
                        uid = %account.uid,
                        provider = account.kind.as_str(),
                        "social account created"
                    );
                    return Ok(account);
                },
                Err(StoreError::Duplicate) => {
                    // Lost a race on the username, try another one.
                    if self.username_taken(&account.username, "").await? {
                        continue;
                    }
                    return Err(ServerError::UserExists);
                },
                Err(err) => return Err(err.into()),
            }
        }

        Err(ServerError::Internal {
            details: format!(
                "no free username after {MAX_USERNAME_ATTEMPTS} attempts"
            ),
            source: None,
        })
    }

    /// Check credentials of a local account.
    pub async fn verify_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<PublicInfo> {
        let account = self
            .find_live(&Filter::by(Field::Username, username).kind(Kind::Local))
            .await?;

        let Some(hash) = account.password.clone() else {
            return Err(ServerError::InvalidPassword);
        };
        self.pwd.verify_async(password.to_owned(), hash).await?;

        Ok(account.public_info())
    }

    /// Mark an account as logged in.
    pub async fn login(&self, username: &str) -> Result<Account> {
        let mut account = self
            .find_live(&Filter::by(Field::Username, username))
            .await?;

        account.logged_in = true;
        if account.state == State::Created {
            account.state = State::Active;
        }
        self.save(&mut account).await?;

        Ok(account)
    }

    /// Mark an account as logged out. Already logged out is fine.
    pub async fn logout(&self, id: &str) -> Result<()> {
        let mut account = self.find(&Filter::by(Field::Id, id)).await?;

        if account.logged_in {
            account.logged_in = false;
            self.save(&mut account).await?;
        }

        Ok(())
    }

    /// Merge `patch` into the stored account.
    pub async fn update_details(
        &self,
        id: &str,
        patch: &AccountPatch,
    ) -> Result<PublicInfo> {
        let mut account = self.find_live(&Filter::by(Field::Id, id)).await?;
        account.merge(patch);

        account.onboarding_state =
            onboarding::advance(account.onboarding_state, Fields::of(&account));
        self.save(&mut account).await?;

        Ok(account.public_info())
    }

    /// Change a local password.
    pub async fn update_password(&self, change: PasswordChange) -> Result<PublicInfo> {
        let (mut account, new) = match change {
            PasswordChange::SelfService { uid, old, new } => {
                let account = self
                    .find_live(&Filter::by(Field::Uid, uid).kind(Kind::Local))
                    .await?;

                let hash = account.password.clone().unwrap_or_default();
                self.pwd.verify_async(old, hash).await?;

                (account, new)
            },
            PasswordChange::AdminReset {
                caller,
                username,
                new,
            } => {
                if caller != Role::Admin {
                    return Err(ServerError::InvalidUser);
                }

                let account = self
                    .find_live(&Filter::by(Field::Username, username).kind(Kind::Local))
                    .await?;
                (account, new)
            },
        };

        if new.is_empty() {
            return Err(ServerError::InvalidRequest("password is required".into()));
        }

        account.password = Some(self.pwd.hash_async(new).await?);
        if account.state == State::Created {
            account.state = State::Active;
        }
        self.save(&mut account).await?;

        Ok(account.public_info())
    }

    /// Consume a password reset link.
    pub async fn reset_password(&self, claims: &Claims, new: String) -> Result<PublicInfo> {
        let mut account = self.find_live(&Filter::by(Field::Id, claims.id.clone())).await?;

        if account.kind != Kind::Local
            || claims.fingerprint != fingerprint(&account, TokenKind::Reset)
        {
            return Err(ServerError::InvalidAccessToken);
        }
        if new.is_empty() {
            return Err(ServerError::InvalidRequest("password is required".into()));
        }

        account.password = Some(self.pwd.hash_async(new).await?);
        account.state = State::Active;
        self.save(&mut account).await?;
        tracing::info!(uid = %account.uid, "password reset");

        Ok(account.public_info())
    }

    /// Stage a new email until its verification link is consumed.
    pub async fn request_email_change(&self, id: &str, email: &str) -> Result<Account> {
        if email.is_empty() {
            return Err(ServerError::InvalidRequest("email is required".into()));
        }

        let mut account = self.find_live(&Filter::by(Field::Id, id)).await?;

        // Going back to the verified email drops whatever was staged.
        if account.email.as_deref() == Some(email) {
            if account.unverified_email.take().is_some() {
                self.save(&mut account).await?;
            }
            return Ok(account);
        }

        if account.kind == Kind::Local && self.email_taken(email, id).await? {
            return Err(ServerError::UserExists);
        }

        account.unverified_email = Some(email.to_owned());
        self.save(&mut account).await?;

        Ok(account)
    }

    /// Account a password reset link should be sent to.
    pub async fn find_for_reset(&self, username: &str) -> Result<Account> {
        let by_username = Filter::by(Field::Username, username).kind(Kind::Local);
        match self.find_live(&by_username).await {
            Err(ServerError::InvalidUser) => {
                self.find_live(&Filter::by(Field::Email, username).kind(Kind::Local))
                    .await
            },
            found => found,
        }
    }

    /// Consume an email verification link.
    pub async fn verify_email(&self, claims: &Claims) -> Result<PublicInfo> {
        let mut account = self.find_live(&Filter::by(Field::Id, claims.id.clone())).await?;

        let Some(email) = account.unverified_email.clone() else {
            return Err(ServerError::InvalidRequest(
                "no email waiting for verification".into(),
            ));
        };
        if claims.fingerprint != fingerprint(&account, TokenKind::Verify) {
            return Err(ServerError::InvalidAccessToken);
        }

        if account.kind == Kind::Local {
            if self.email_taken(&email, &account.id).await? {
                return Err(ServerError::UserExists);
            }

            // Email-based usernames follow the verified email.
            if account.username.contains('@') && account.username != email {
                if self.username_taken(&email, &account.id).await? {
                    return Err(ServerError::UserExists);
                }
                account.username = email.clone();
            }
        }

        account.email = Some(email);
        account.unverified_email = None;
        account.onboarding_state =
            onboarding::advance(account.onboarding_state, Fields::of(&account));
        self.save(&mut account).await?;
        tracing::info!(uid = %account.uid, "email verified");

        Ok(account.public_info())
    }

    /// Drop a staged email.
    pub async fn restore_email(&self, id: &str) -> Result<PublicInfo> {
        let mut account = self.find_live(&Filter::by(Field::Id, id)).await?;

        if account.unverified_email.take().is_some() {
            self.save(&mut account).await?;
        }

        Ok(account.public_info())
    }

    /// Soft delete an account.
    pub async fn remove(&self, id: &str) -> Result<PublicInfo> {
        let mut account = self.find_live(&Filter::by(Field::Id, id)).await?;

        account.state = State::Removed;
        account.logged_in = false;
        account.removed_at = Some(Utc::now());
        self.save(&mut account).await?;
        tracing::info!(uid = %account.uid, "account removed");

        Ok(account.public_info())
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Account> {
        self.find_live(&Filter::by(Field::Id, id)).await
    }

    pub async fn get_by_uid(&self, uid: &str) -> Result<PublicInfo> {
        Ok(self
            .find_live(&Filter::by(Field::Uid, uid))
            .await?
            .public_info())
    }

    pub async fn get_by_username(&self, username: &str) -> Result<PublicInfo> {
        Ok(self
            .find_live(&Filter::by(Field::Username, username))
            .await?
            .public_info())
    }

    /// Every account not removed.
    pub async fn get_all(&self) -> Result<Vec<PublicInfo>> {
        Ok(self
            .store
            .find_all(&Filter::all())
            .await?
            .iter()
            .filter(|account| !account.is_removed())
            .map(Account::public_info)
            .collect())
    }
}
