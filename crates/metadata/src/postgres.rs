//! PostgreSQL-based release ledger.

use crate::error::{MetadataError, MetadataResult};
use crate::models::{NewRelease, NewRollback, ReleaseRow, RollbackRow, TrackingMetric};
use crate::repos::{ReleaseRepo, RollbackRepo, TrackingRepo};
use crate::store::MetadataStore;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode as SqlxPgSslMode};
use sqlx::{Pool, Postgres};
use std::str::FromStr;
use time::OffsetDateTime;
use updraft_core::config::PgSslMode;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

/// Split the schema into single statements; prepared statements take one at a time.
fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .map(str::trim)
        .filter(|statement| {
            statement.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            })
        })
        .collect()
}

/// PostgreSQL-based release ledger.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Connect using a full connection URL.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    /// Connect using individual parameters, so the password can come from its own env var.
    #[allow(clippy::too_many_arguments)]
    pub async fn from_params(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        database: &str,
        ssl_mode: Option<PgSslMode>,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let mut opts = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database);

        if let Some(user) = username {
            opts = opts.username(user);
        }
        if let Some(pass) = password {
            opts = opts.password(pass);
        }
        if let Some(mode) = ssl_mode {
            opts = opts.ssl_mode(match mode {
                PgSslMode::Disable => SqlxPgSslMode::Disable,
                PgSslMode::Prefer => SqlxPgSslMode::Prefer,
                PgSslMode::Require => SqlxPgSslMode::Require,
            });
        }

        tracing::info!(
            host,
            port,
            database,
            username = username.unwrap_or("<none>"),
            ssl_mode = ?ssl_mode,
            "Connecting to PostgreSQL"
        );

        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    async fn connect(
        mut opts: PgConnectOptions,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{timeout_ms}ms"))]);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        tracing::info!(
            max_connections,
            statement_timeout_ms = ?statement_timeout_ms,
            "PostgreSQL release ledger ready"
        );
        Ok(store)
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
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
impl ReleaseRepo for PostgresStore {
    async fn create_release(&self, release: &NewRelease) -> MetadataResult<ReleaseRow> {
        sqlx::query_as::<_, ReleaseRow>(&format!(
            r#"
            INSERT INTO releases (path, runtime_version, created_at, commit_hash, commit_message, update_id)
            VALUES ($1, $2, $3, $4, $5, $6)
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
    }

    async fn get_release_by_path(&self, path: &str) -> MetadataResult<Option<ReleaseRow>> {
        Ok(sqlx::query_as::<_, ReleaseRow>(&format!(
            "SELECT {RELEASE_COLUMNS} FROM releases WHERE path = $1"
        ))
        .bind(path)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_releases(&self) -> MetadataResult<Vec<ReleaseRow>> {
        Ok(sqlx::query_as::<_, ReleaseRow>(&format!(
            "SELECT {RELEASE_COLUMNS} FROM releases ORDER BY release_id"
        ))
        .fetch_all(&self.pool)
        .await?)
    }

    async fn list_releases_for_runtime(
        &self,
        runtime_version: &str,
    ) -> MetadataResult<Vec<ReleaseRow>> {
        Ok(sqlx::query_as::<_, ReleaseRow>(&format!(
            "SELECT {RELEASE_COLUMNS} FROM releases WHERE runtime_version = $1 ORDER BY release_id"
        ))
        .bind(runtime_version)
        .fetch_all(&self.pool)
        .await?)
    }
}

#[async_trait]
impl RollbackRepo for PostgresStore {
    async fn create_rollback(&self, rollback: &NewRollback) -> MetadataResult<RollbackRow> {
        Ok(sqlx::query_as::<_, RollbackRow>(
            r#"
            INSERT INTO rollbacks (runtime_version, target_path, superseded_path, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING rollback_id, runtime_version, target_path, superseded_path, created_at
            "#,
        )
        .bind(&rollback.runtime_version)
        .bind(&rollback.target_path)
        .bind(&rollback.superseded_path)
        .bind(rollback.created_at)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn latest_rollback(&self, runtime_version: &str) -> MetadataResult<Option<RollbackRow>> {
        Ok(sqlx::query_as::<_, RollbackRow>(
            r#"
            SELECT rollback_id, runtime_version, target_path, superseded_path, created_at
            FROM rollbacks
            WHERE runtime_version = $1
            ORDER BY rollback_id DESC
            LIMIT 1
            "#,
        )
        .bind(runtime_version)
        .fetch_optional(&self.pool)
        .await?)
    }
}

#[async_trait]
impl TrackingRepo for PostgresStore {
    async fn record_download(
        &self,
        release_id: i64,
        platform: &str,
        downloaded_at: OffsetDateTime,
    ) -> MetadataResult<()> {
        sqlx::query(
            "INSERT INTO release_downloads (release_id, platform, downloaded_at) VALUES ($1, $2, $3)",
        )
        .bind(release_id)
        .bind(platform)
        .bind(downloaded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_release_tracking_metrics(
        &self,
        release_id: i64,
    ) -> MetadataResult<Vec<TrackingMetric>> {
        Ok(sqlx::query_as::<_, TrackingMetric>(
            r#"
            SELECT platform, COUNT(*) AS count
            FROM release_downloads
            WHERE release_id = $1
            GROUP BY platform
            ORDER BY platform
            "#,
        )
        .bind(release_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn get_release_tracking_metrics_for_all_releases(
        &self,
    ) -> MetadataResult<Vec<TrackingMetric>> {
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
    }
}
