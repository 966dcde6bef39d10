//! sifter - A CLI tool that probes and enriches collected URLs
//!
//! This crate provides:
//! - A SQLite-backed URL store with task records and per-URL satellite data
//! - A probe subsystem that resolves redirects and normalizes HTTP outcomes
//! - A sequential task manager that drains URL operators until no work remains
//! - A scheduled registry for periodic maintenance operators

pub mod alert;
pub mod commands;
pub mod config;
pub mod error;
pub mod external;
pub mod parse;
pub mod probe;
pub mod progress;
pub mod store;
pub mod tasks;

pub use config::Config;
pub use error::{Error, Result};
