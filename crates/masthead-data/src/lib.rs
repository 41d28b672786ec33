#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Data access layer for Masthead: schema migrations and the Postgres-backed
//! stores behind the configuration and permission services.

pub mod error;
pub mod pg;
pub mod store;

pub use error::{DataError, Result as DataResult};
pub use pg::{PgProbe, PgStore, run_migrations};
pub use store::{
    AssetRecord, AssetStore, ConnectivityProbe, DbOptions, ExtensionStore, GroupStore, PURGE_ALL,
    ROOT_ASSET, SessionStore,
};
