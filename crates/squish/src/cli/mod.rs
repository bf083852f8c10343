//! Subcommand implementations.

pub mod config;
pub mod optimize;
pub mod validate;
