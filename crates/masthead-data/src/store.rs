//! Port traits consumed by the configuration and permission services.
//!
//! Production code wires these to [`crate::pg::PgStore`]; tests substitute
//! in-memory fakes.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Name of the root node of the permission tree.
pub const ROOT_ASSET: &str = "root.1";

/// Sentinel age passed to [`SessionStore::purge`] to remove every session.
pub const PURGE_ALL: i64 = -1;

/// A node in the permission tree.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct AssetRecord {
    /// Primary key.
    pub id: i64,
    /// Parent node, `None` only for the root.
    pub parent_id: Option<i64>,
    /// Unique dotted name, e.g. `root.1` or `com_pages`.
    pub name: String,
    /// Human-readable title.
    pub title: String,
    /// Rule document attached to this node.
    pub rules: Value,
}

/// Connection parameters for a connectivity probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbOptions {
    /// Database host.
    pub host: String,
    /// Database port.
    pub port: u16,
    /// Database name.
    pub database: String,
    /// Account name.
    pub username: String,
    /// Account password.
    pub password: String,
}

/// Access to the permission tree.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Fetch a node by its unique name.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    async fn fetch_by_name(&self, name: &str) -> Result<Option<AssetRecord>>;

    /// Fetch a node together with all of its ancestors, root first.
    ///
    /// Returns an empty chain when `name` does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    async fn fetch_chain(&self, name: &str) -> Result<Vec<AssetRecord>>;

    /// Replace the rule document on the named node, creating the node under
    /// the root when it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn save_rules(&self, name: &str, rules: &Value) -> Result<()>;
}

/// Access to installed extension parameter documents.
#[async_trait]
pub trait ExtensionStore: Send + Sync {
    /// Fetch the parameter document for `element`, if installed.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    async fn fetch_params(&self, element: &str) -> Result<Option<Value>>;

    /// Replace the parameter document for `element`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn save_params(&self, element: &str, params: &Value) -> Result<()>;
}

/// Access to the server-side session table.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Remove sessions idle for longer than `max_age_seconds`.
    ///
    /// Passing [`PURGE_ALL`] removes every session regardless of age.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    async fn purge(&self, max_age_seconds: i64) -> Result<u64>;
}

/// Access to user group membership.
#[async_trait]
pub trait GroupStore: Send + Sync {
    /// Group identifiers the user belongs to.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    async fn groups_for_user(&self, user_id: i64) -> Result<Vec<i64>>;
}

/// Probe that verifies submitted database credentials before they are saved.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Open a connection with `options` and run a trivial statement.
    ///
    /// # Errors
    ///
    /// Returns [`crate::DataError::ConnectFailed`] when the database cannot be
    /// reached with the supplied parameters.
    async fn probe(&self, options: &DbOptions) -> Result<()>;
}
