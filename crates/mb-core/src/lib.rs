//! # mb-core
//!
//! Shared error type for the mvabatch crates.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;

pub use error::{Error, Result};

/// Crate version, reported in plan metadata.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
