/// Kubernetes client for the command line tool.
pub mod clients;

/// Constants and defaults.
pub mod constants;

/// The crate-wide error type.
pub mod error;

pub use error::{Error, Result};
