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

//! Filesystem collaborators for the configuration pipeline: the persisted
//! configuration artifact and the file-backed component cache.

pub mod artifact;
pub mod cache;
pub mod error;

pub use artifact::{ArtifactStore, FileArtifactStore, FtpSettings};
pub use cache::{CacheScope, CacheStore, FileCacheStore};
pub use error::{FsOpsError, FsOpsResult};
