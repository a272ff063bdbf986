//! In-process store, used when no `postgres` section is configured.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CredentialStore, Filter, Result, StoreError, conflicts};
use crate::user::Account;

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    accounts: Vec<Account>,
}

/// Accounts kept in memory, lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub async fn len(&self) -> usize {
        self.inner.read().await.accounts.len()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn insert(&self, account: &Account) -> Result<String> {
        let mut inner = self.inner.write().await;

        inner.next_id += 1;
        let mut account = account.clone();
        account.id = inner.next_id.to_string();

        if conflicts(&account, &inner.accounts) {
            return Err(StoreError::Duplicate);
        }

        let id = account.id.clone();
        inner.accounts.push(account);
        Ok(id)
    }

    async fn find_one(&self, filter: &Filter) -> Result<Account> {
        self.inner
            .read()
            .await
            .accounts
            .iter()
            .find(|account| filter.matches(account))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn find_all(&self, filter: &Filter) -> Result<Vec<Account>> {
        Ok(self
            .inner
            .read()
            .await
            .accounts
            .iter()
            .filter(|account| filter.matches(account))
            .cloned()
            .collect())
    }

    async fn update_by_id(&self, id: &str, account: &Account) -> Result<()> {
        let mut inner = self.inner.write().await;

        let mut account = account.clone();
        account.id = id.to_owned();

        if conflicts(&account, &inner.accounts) {
            return Err(StoreError::Duplicate);
        }

        let stored = inner
            .accounts
            .iter_mut()
            .find(|stored| stored.id == id)
            .ok_or(StoreError::NotFound)?;
        *stored = account;

        Ok(())
    }
}
