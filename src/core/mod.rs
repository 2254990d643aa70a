//! The core module holds the error type and the settings every other part of bindle is configured with.

pub mod error;
pub mod settings;
