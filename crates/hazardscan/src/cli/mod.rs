//! Subcommand implementations.

pub mod config;
pub mod models;
pub mod scan;
pub mod taxonomy;
