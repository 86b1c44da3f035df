//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::{NewRelease, NewRollback, ReleaseRow, RollbackRow, TrackingMetric};
use crate::repos::{ReleaseRepo, RollbackRepo, TrackingRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, Instant};
use time::OffsetDateTime;

/// Combined release ledger trait.
#[async_trait]
pub trait MetadataStore: ReleaseRepo + RollbackRepo + TrackingRepo + Send + Sync {
    /// Create tables and indexes if they do not exist.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based release ledger.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    slow_query_threshold: Duration,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();
        let query_timeout_secs = query_timeout_secs.unwrap_or(30);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        // One connection: SQLite serializes writers anyway and this avoids
        // "database is locked" errors under concurrent requests.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self {
            pool,
            slow_query_threshold: Duration::from_secs(query_timeout_secs),
        };
        store.migrate().await?;

        tracing::info!(
            path = %path.display(),
            query_timeout_secs,
            "SQLite release ledger ready (query timeout is advisory only)"
        );

        Ok(store)
    }

    /// Run `query` and log it if it outlives the configured timeout.
    ///
    /// SQLite cannot cancel a running statement, so the timeout only reports.
    async fn timed<T, F>(&self, operation: &'static str, query: F) -> MetadataResult<T>
    where
        F: Future<Output = MetadataResult<T>> + Send,
    {
        let started = Instant::now();
        let result = query.await;
        let elapsed = started.elapsed();
        if elapsed > self.slow_query_threshold {
            tracing::warn!(
                operation,
                elapsed_ms = elapsed.as_millis() as u64,
                threshold_ms = self.slow_query_threshold.as_millis() as u64,
                "Slow SQLite query"
            );
        }
        result
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

const RELEASE_COLUMNS: &str =
    "release_id, path, runtime_version, created_at, commit_hash, commit_message, update_id";

#[async_trait]
impl ReleaseRepo for SqliteStore {
    async fn create_release(&self, release: &NewRelease) -> MetadataResult<ReleaseRow> {
        self.timed("create_release", async {
            sqlx::query_as::<_, ReleaseRow>(&format!(
                r#"
                INSERT INTO releases (path, runtime_version, created_at, commit_hash, commit_message, update_id)
                VALUES (?, ?, ?, ?, ?, ?)
                RETURNING {RELEASE_COLUMNS}
                "#
            ))
            .bind(&release.path)
            .bind(&release.runtime_version)
            .bind(release.created_at)
            .bind(&release.commit_hash)
            .bind(&release.commit_message)
            .bind(release.update_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MetadataError::from_insert(e, &release.path))
        })
        .await
    }

    async fn get_release_by_path(&self, path: &str) -> MetadataResult<Option<ReleaseRow>> {
        self.timed("get_release_by_path", async {
            Ok(sqlx::query_as::<_, ReleaseRow>(&format!(
                "SELECT {RELEASE_COLUMNS} FROM releases WHERE path = ?"
            ))
            .bind(path)
            .fetch_optional(&self.pool)
            .await?)
        })
        .await
    }

    async fn list_releases(&self) -> MetadataResult<Vec<ReleaseRow>> {
        self.timed("list_releases", async {
            Ok(sqlx::query_as::<_, ReleaseRow>(&format!(
                "SELECT {RELEASE_COLUMNS} FROM releases ORDER BY release_id"
            ))
            .fetch_all(&self.pool)
            .await?)
        })
        .await
    }

    async fn list_releases_for_runtime(
        &self,
        runtime_version: &str,
    ) -> MetadataResult<Vec<ReleaseRow>> {
        self.timed("list_releases_for_runtime", async {
            Ok(sqlx::query_as::<_, ReleaseRow>(&format!(
                "SELECT {RELEASE_COLUMNS} FROM releases WHERE runtime_version = ? ORDER BY release_id"
            ))
            .bind(runtime_version)
            .fetch_all(&self.pool)
            .await?)
        })
        .await
    }
}

#[async_trait]
impl RollbackRepo for SqliteStore {
    async fn create_rollback(&self, rollback: &NewRollback) -> MetadataResult<RollbackRow> {
        self.timed("create_rollback", async {
            Ok(sqlx::query_as::<_, RollbackRow>(
                r#"
                INSERT INTO rollbacks (runtime_version, target_path, superseded_path, created_at)
                VALUES (?, ?, ?, ?)
                RETURNING rollback_id, runtime_version, target_path, superseded_path, created_at
                "#,
            )
            .bind(&rollback.runtime_version)
            .bind(&rollback.target_path)
            .bind(&rollback.superseded_path)
            .bind(rollback.created_at)
            .fetch_one(&self.pool)
            .await?)
        })
        .await
    }

    async fn latest_rollback(&self, runtime_version: &str) -> MetadataResult<Option<RollbackRow>> {
        self.timed("latest_rollback", async {
            Ok(sqlx::query_as::<_, RollbackRow>(
                r#"
                SELECT rollback_id, runtime_version, target_path, superseded_path, created_at
                FROM rollbacks
                WHERE runtime_version = ?
                ORDER BY rollback_id DESC
                LIMIT 1
                "#,
            )
            .bind(runtime_version)
            .fetch_optional(&self.pool)
            .await?)
        })
        .await
    }
}

#[async_trait]
impl TrackingRepo for SqliteStore {
    async fn record_download(
        &self,
        release_id: i64,
        platform: &str,
        downloaded_at: OffsetDateTime,
    ) -> MetadataResult<()> {
        self.timed("record_download", async {
            sqlx::query(
                "INSERT INTO release_downloads (release_id, platform, downloaded_at) VALUES (?, ?, ?)",
            )
            .bind(release_id)
            .bind(platform)
            .bind(downloaded_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn get_release_tracking_metrics(
        &self,
        release_id: i64,
    ) -> MetadataResult<Vec<TrackingMetric>> {
        self.timed("get_release_tracking_metrics", async {
            Ok(sqlx::query_as::<_, TrackingMetric>(
                r#"
                SELECT platform, COUNT(*) AS count
                FROM release_downloads
                WHERE release_id = ?
                GROUP BY platform
                ORDER BY platform
                "#,
            )
            .bind(release_id)
            .fetch_all(&self.pool)
            .await?)
        })
        .await
    }

    async fn get_release_tracking_metrics_for_all_releases(
        &self,
    ) -> MetadataResult<Vec<TrackingMetric>> {
        self.timed("get_release_tracking_metrics_for_all_releases", async {
            Ok(sqlx::query_as::<_, TrackingMetric>(
                r#"
                SELECT platform, COUNT(*) AS count
                FROM release_downloads
                GROUP BY platform
                ORDER BY platform
                "#,
            )
            .fetch_all(&self.pool)
            .await?)
        })
        .await
    }
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS releases (
    release_id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,
    runtime_version TEXT NOT NULL,
    created_at TEXT NOT NULL,
    commit_hash TEXT,
    commit_message TEXT,
    update_id BLOB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_releases_runtime ON releases(runtime_version, release_id);

CREATE TABLE IF NOT EXISTS rollbacks (
    rollback_id INTEGER PRIMARY KEY AUTOINCREMENT,
    runtime_version TEXT NOT NULL,
    target_path TEXT NOT NULL REFERENCES releases(path),
    superseded_path TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_rollbacks_runtime ON rollbacks(runtime_version, rollback_id);

CREATE TABLE IF NOT EXISTS release_downloads (
    download_id INTEGER PRIMARY KEY AUTOINCREMENT,
    release_id INTEGER NOT NULL REFERENCES releases(release_id),
    platform TEXT NOT NULL,
    downloaded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_release_downloads_release ON release_downloads(release_id, platform);
"#;
