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

//! Administrative CLI for the Masthead configuration and permission services.

mod cli;

use std::process;

#[tokio::main]
async fn main() {
    let exit_code = cli::run().await;
    if exit_code != 0 {
        process::exit(exit_code);
    }
}
