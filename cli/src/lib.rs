//! Library entry point for venered-cli components.
//!
//! Exposes the reusable modules (config, formatter, logging) so tests and
//! other crates can use them without going through the binary entry point.

pub mod config;
pub mod error;
pub mod formatter;
pub mod logging;

pub use config::CLIConfiguration;
pub use error::{CLIError, Result};
pub use formatter::OutputFormatter;
