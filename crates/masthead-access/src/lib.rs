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

//! Tri-state access rules over the asset hierarchy and the permission toggle
//! service that edits them.

pub mod error;
pub mod rules;
pub mod toggle;

pub use error::{AccessError, Result as AccessResult};
pub use rules::{CORE_ADMIN, Resolution, RuleSet, RuleState};
pub use toggle::{EffectiveRule, PermissionService, TogglePatch};
