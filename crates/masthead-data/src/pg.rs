//! Postgres implementations of the store traits plus schema migrations.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgConnectOptions;
use sqlx::{Connection, PgConnection, PgPool};
use tracing::debug;

use crate::error::{DataError, Result};
use crate::store::{
    AssetRecord, AssetStore, ConnectivityProbe, DbOptions, ExtensionStore, GroupStore, PURGE_ALL,
    ROOT_ASSET, SessionStore,
};

fn map_query_err(operation: &'static str) -> impl FnOnce(sqlx::Error) -> DataError {
    move |source| DataError::QueryFailed { operation, source }
}

/// Apply all schema migrations.
///
/// # Errors
///
/// Returns an error when migration execution fails.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    let mut migrator = sqlx::migrate!("./migrations");
    migrator.set_ignore_missing(true);
    migrator
        .run(pool)
        .await
        .map_err(|source| DataError::MigrationFailed { source })?;
    Ok(())
}

/// Postgres-backed implementation of every store trait.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl AssetStore for PgStore {
    async fn fetch_by_name(&self, name: &str) -> Result<Option<AssetRecord>> {
        sqlx::query_as::<_, AssetRecord>(
            "SELECT id, parent_id, name, title, rules FROM assets WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_query_err("fetch asset by name"))
    }

    async fn fetch_chain(&self, name: &str) -> Result<Vec<AssetRecord>> {
        sqlx::query_as::<_, AssetRecord>(
            r"
            WITH RECURSIVE chain AS (
                SELECT id, parent_id, name, title, rules, 0 AS depth
                FROM assets
                WHERE name = $1
                UNION ALL
                SELECT a.id, a.parent_id, a.name, a.title, a.rules, chain.depth + 1
                FROM assets a
                JOIN chain ON a.id = chain.parent_id
            )
            SELECT id, parent_id, name, title, rules
            FROM chain
            ORDER BY depth DESC
            ",
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await
        .map_err(map_query_err("fetch asset chain"))
    }

    async fn save_rules(&self, name: &str, rules: &Value) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO assets (name, title, parent_id, rules)
            VALUES ($1, $1, (SELECT id FROM assets WHERE name = $2), $3)
            ON CONFLICT (name) DO UPDATE SET rules = EXCLUDED.rules
            ",
        )
        .bind(name)
        .bind(ROOT_ASSET)
        .bind(rules)
        .execute(&self.pool)
        .await
        .map_err(map_query_err("save asset rules"))?;
        Ok(())
    }
}

#[async_trait]
impl ExtensionStore for PgStore {
    async fn fetch_params(&self, element: &str) -> Result<Option<Value>> {
        sqlx::query_scalar::<_, Value>("SELECT params FROM extensions WHERE element = $1")
            .bind(element)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_query_err("fetch extension params"))
    }

    async fn save_params(&self, element: &str, params: &Value) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO extensions (element, params)
            VALUES ($1, $2)
            ON CONFLICT (element) DO UPDATE SET params = EXCLUDED.params
            ",
        )
        .bind(element)
        .bind(params)
        .execute(&self.pool)
        .await
        .map_err(map_query_err("save extension params"))?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn purge(&self, max_age_seconds: i64) -> Result<u64> {
        let result = if max_age_seconds == PURGE_ALL {
            sqlx::query("DELETE FROM sessions")
                .execute(&self.pool)
                .await
                .map_err(map_query_err("purge all sessions"))?
        } else {
            sqlx::query(
                "DELETE FROM sessions WHERE last_activity < now() - ($1::double precision * interval '1 second')",
            )
            .bind(max_age_seconds)
            .execute(&self.pool)
            .await
            .map_err(map_query_err("purge expired sessions"))?
        };
        debug!(removed = result.rows_affected(), "purged sessions");
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl GroupStore for PgStore {
    async fn groups_for_user(&self, user_id: i64) -> Result<Vec<i64>> {
        sqlx::query_scalar::<_, i64>(
            "SELECT group_id FROM user_group_map WHERE user_id = $1 ORDER BY group_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_query_err("fetch user groups"))
    }
}

/// Connectivity probe that opens a one-shot Postgres connection and fetches
/// the server version string.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgProbe;

#[async_trait]
impl ConnectivityProbe for PgProbe {
    async fn probe(&self, options: &DbOptions) -> Result<()> {
        let connect = PgConnectOptions::new()
            .host(&options.host)
            .port(options.port)
            .database(&options.database)
            .username(&options.username)
            .password(&options.password);
        let mut conn = PgConnection::connect_with(&connect)
            .await
            .map_err(|source| DataError::ConnectFailed { source })?;
        let version: String = sqlx::query_scalar("SELECT version()")
            .fetch_one(&mut conn)
            .await
            .map_err(|source| DataError::ConnectFailed { source })?;
        debug!(%version, "database answered connectivity probe");
        conn.close()
            .await
            .map_err(|source| DataError::ConnectFailed { source })?;
        Ok(())
    }
}
