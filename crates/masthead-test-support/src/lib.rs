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
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
// Test fakes panic on misuse instead of returning errors.
#![allow(clippy::missing_panics_doc)]

//! Shared test helpers used across integration suites.
//! Layout: postgres.rs (disposable database fixtures), memory.rs (in-memory
//! fakes for the store and filesystem ports).

pub mod memory;
pub mod postgres;
