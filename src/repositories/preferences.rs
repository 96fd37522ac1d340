//! Key/value user preferences

use async_trait::async_trait;
use sqlx::SqlitePool;

use super::traits::PreferenceStore;
use crate::errors::{RepositoryError, RepositoryResult};
use crate::models::CountryPreference;

const DEFAULT_CATEGORY_KEY: &str = "default_category";
const SELECTED_COUNTRY_KEY: &str = "selected_country";

pub struct SqlitePreferenceStore {
    pool: SqlitePool,
}

impl SqlitePreferenceStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn read(&self, key: &str) -> RepositoryResult<Option<String>> {
        let value: Option<Option<String>> =
            sqlx::query_scalar("SELECT value FROM preferences WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| RepositoryError::query_failed("read_preference", e))?;
        Ok(value.flatten())
    }

    async fn write(&self, key: &str, value: Option<&str>) -> RepositoryResult<()> {
        match value {
            Some(value) => {
                sqlx::query(
                    "INSERT INTO preferences (key, value) VALUES (?, ?)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                )
                .bind(key)
                .bind(value)
                .execute(&self.pool)
                .await
                .map_err(|e| RepositoryError::query_failed("write_preference", e))?;
            }
            None => {
                sqlx::query("DELETE FROM preferences WHERE key = ?")
                    .bind(key)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| RepositoryError::query_failed("clear_preference", e))?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PreferenceStore for SqlitePreferenceStore {
    async fn default_category(&self) -> RepositoryResult<Option<String>> {
        self.read(DEFAULT_CATEGORY_KEY).await
    }

    async fn set_default_category(&self, category: Option<&str>) -> RepositoryResult<()> {
        self.write(DEFAULT_CATEGORY_KEY, category).await
    }

    async fn country_preference(&self) -> RepositoryResult<CountryPreference> {
        let stored = self.read(SELECTED_COUNTRY_KEY).await?;
        Ok(CountryPreference::from_stored(stored.as_deref()))
    }

    async fn set_country_preference(
        &self,
        preference: &CountryPreference,
    ) -> RepositoryResult<()> {
        let stored = preference.to_stored();
        self.write(SELECTED_COUNTRY_KEY, Some(&stored)).await
    }
}
