//! # mb-batch
//!
//! Runs a ROOT scoring macro once per input file.
//!
//! Inputs come either from a recursive walk of a local directory
//! ([`run_local`]) or from a remote XRootD listing ([`run_remote`]). Each
//! input is substituted into a fixed [`CommandTemplate`] and executed
//! sequentially through a [`CommandRunner`].

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod local;
pub mod remote;
pub mod runner;
pub mod template;

pub use local::{WalkOptions, run_local, walk_files};
pub use remote::{
    ListingEntries, ListingEntry, ListingSource, listing_entries, remote_url, run_remote,
};
pub use runner::{
    Batch, BatchOptions, BatchSummary, CommandRunner, DryRunRunner, Outcome, ProcessRunner,
    run_batch,
};
pub use template::{CommandTemplate, Invocation, quote_macro_arg};
