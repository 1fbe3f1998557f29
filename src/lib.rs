#![deny(missing_docs)]
//! encmount manages encfs encrypted-directory mounts with verified outcomes.

/// Command-line interface.
pub mod cli;
/// Bootstrap config parsing and validation.
pub mod config;
/// encfs lifecycle orchestration.
pub mod encfs;
/// Error types.
pub mod error;
/// Operation journal.
pub mod journal;
/// Shared types.
pub mod types;
