use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use rust_decimal::Decimal;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode},
};

use crate::error::StorageError;
use crate::model::{Observation, TargetId};
use crate::storage::Storage;

pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path` and run migrations.
    pub async fn open(path: &Path) -> Result<Self, Report<StorageError>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .change_context(StorageError::Migration)
                .attach_with(|| format!("cannot create data directory: {}", parent.display()))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .change_context(StorageError::Migration)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(opts)
            .await
            .change_context(StorageError::Migration)
            .attach_with(|| format!("database path: {}", path.display()))?;

        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self, Report<StorageError>> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .change_context(StorageError::Migration)?;

        Ok(Self { pool })
    }
}

impl Storage for SqliteStorage {
    fn append(
        &self,
        target_id: &TargetId,
        observation: &Observation,
    ) -> BoxFuture<'_, Result<(), Report<StorageError>>> {
        let target_id = target_id.clone();
        let observation = observation.clone();
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO observations (target_id, observed_at, title, price) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(target_id.as_str())
            .bind(observation.timestamp.to_rfc3339())
            .bind(&observation.title)
            .bind(observation.price.to_string())
            .execute(&self.pool)
            .await
            .change_context(StorageError::Insert)
            .attach_with(|| format!("target: {target_id}"))?;
            Ok(())
        })
    }

    fn recent(
        &self,
        target_id: &TargetId,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Observation>, Report<StorageError>>> {
        let target_id = target_id.clone();
        Box::pin(async move {
            let rows: Vec<(String, String, String)> = sqlx::query_as(
                "SELECT observed_at, title, price FROM observations \
                 WHERE target_id = ? \
                 ORDER BY id DESC \
                 LIMIT ?",
            )
            .bind(target_id.as_str())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .change_context(StorageError::Query)?;

            let mut observations = rows
                .into_iter()
                .map(|(observed_at, title, price)| map_observation_row(observed_at, title, price))
                .collect::<Result<Vec<_>, _>>()
                .attach_with(|| format!("target: {target_id}"))?;

            // Return in ascending chronological order (oldest first)
            observations.reverse();
            Ok(observations)
        })
    }

    fn count(&self, target_id: &TargetId) -> BoxFuture<'_, Result<usize, Report<StorageError>>> {
        let target_id = target_id.clone();
        Box::pin(async move {
            let (count,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM observations WHERE target_id = ?")
                    .bind(target_id.as_str())
                    .fetch_one(&self.pool)
                    .await
                    .change_context(StorageError::Query)?;
            Ok(count.max(0) as usize)
        })
    }
}

fn map_observation_row(
    observed_at: String,
    title: String,
    price: String,
) -> Result<Observation, Report<StorageError>> {
    let timestamp = DateTime::parse_from_rfc3339(&observed_at)
        .map(|dt| dt.with_timezone(&Utc))
        .change_context(StorageError::Query)
        .attach_with(|| format!("bad timestamp: {observed_at}"))?;
    let price = Decimal::from_str(&price)
        .change_context(StorageError::Query)
        .attach_with(|| format!("bad price: {price}"))?;
    Ok(Observation {
        timestamp,
        title,
        price,
    })
}
