//! PostgreSQL store, one JSONB document per account.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;

use super::{CredentialStore, Field, Filter, Result, StoreError};
use crate::user::Account;

pub const DEFAULT_CREDENTIALS: &str = "postgres";
pub const DEFAULT_DATABASE_NAME: &str = "portal";
pub const DEFAULT_POOL_SIZE: u32 = 10;

/// Accounts stored in the `accounts` table.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Init database connections.
    pub async fn new(
        hostname: &str,
        username: &str,
        password: &str,
        db: &str,
        pool: u32,
    ) -> Result<Self> {
        let addr = format!("postgres://{username}:{password}@{hostname}/{db}");
        let pool = PgPoolOptions::new().max_connections(pool);
        let pool = pool.connect(&addr).await?;

        tracing::info!(%hostname, %db, "postgres connected");

        Ok(Self { pool })
    }

    /// Execute migrations scripts.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!().run(&self.pool).await?;
        Ok(())
    }

    /// Build `SELECT` matching `filter`, binds are the filter values in
    /// order.
    fn select(filter: &Filter) -> String {
        let mut sql = String::from("SELECT id, doc FROM accounts");

        for (index, (field, _)) in filter.conditions().iter().enumerate() {
            sql.push_str(if index == 0 { " WHERE " } else { " AND " });
            match field {
                Field::Id => sql.push_str(&format!("id = ${}", index + 1)),
                field => sql.push_str(&format!(
                    "doc->>'{}' = ${}",
                    field.as_str(),
                    index + 1
                )),
            }
        }

        sql.push_str(" ORDER BY doc->>'created_at', id");
        sql
    }

    async fn fetch(&self, filter: &Filter, limit: bool) -> Result<Vec<Account>> {
        let mut sql = Self::select(filter);
        if limit {
            sql.push_str(" LIMIT 1");
        }

        let mut query = sqlx::query_as::<_, (String, Json<Account>)>(&sql);
        for (_, value) in filter.conditions() {
            query = query.bind(value);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|(id, Json(mut account))| {
                account.id = id;
                account
            })
            .collect())
    }
}

/// Unique index violations are the canonical duplicate signal.
fn map_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            StoreError::Duplicate
        },
        err => StoreError::Database(err),
    }
}

#[async_trait]
impl CredentialStore for PostgresStore {
    async fn insert(&self, account: &Account) -> Result<String> {
        let mut account = account.clone();
        account.id = uuid::Uuid::new_v4().to_string();

        sqlx::query(r#"INSERT INTO accounts (id, doc) VALUES ($1, $2)"#)
            .bind(&account.id)
            .bind(Json(&account))
            .execute(&self.pool)
            .await
            .map_err(map_error)?;

        Ok(account.id)
    }

    async fn find_one(&self, filter: &Filter) -> Result<Account> {
        self.fetch(filter, true)
            .await?
            .into_iter()
            .next()
            .ok_or(StoreError::NotFound)
    }

    async fn find_all(&self, filter: &Filter) -> Result<Vec<Account>> {
        self.fetch(filter, false).await
    }

    async fn update_by_id(&self, id: &str, account: &Account) -> Result<()> {
        let mut account = account.clone();
        account.id = id.to_owned();

        let result = sqlx::query(r#"UPDATE accounts SET doc = $2 WHERE id = $1"#)
            .bind(id)
            .bind(Json(&account))
            .execute(&self.pool)
            .await
            .map_err(map_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_statement() {
        assert_eq!(
            PostgresStore::select(&Filter::all()),
            "SELECT id, doc FROM accounts ORDER BY doc->>'created_at', id"
        );

        let filter = Filter::by(Field::Id, "1")
            .and(Field::Username, "alice")
            .and(Field::Kind, "local");
        assert_eq!(
            PostgresStore::select(&filter),
            "SELECT id, doc FROM accounts WHERE id = $1 AND doc->>'username' = $2 \
             AND doc->>'kind' = $3 ORDER BY doc->>'created_at', id"
        );
    }
}
