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

//! Site configuration save pipeline.
//!
//! Layout: `model.rs` (typed configuration document, patches, filter
//! policies), `probe.rs` (HTTPS availability probe), `service.rs`
//! (`ConfigSaver` orchestration), `error.rs` (error taxonomy).

pub mod error;
pub mod model;
pub mod probe;
pub mod service;

pub use error::{ConfigError, ConfigResult, SaveWarning};
pub use model::{FilterMode, FilterPolicy, SavePatch, SiteConfig, TextFilterSet, amp_escape};
pub use probe::{HttpsProber, ProbeOutcome, SslProbe};
pub use service::{ConfigSaver, SaveReport, SaverPorts};
