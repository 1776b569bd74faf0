//! envguard core - Shared functionality for the envguard engine and CLI
//!
//! Standard paths, layered configuration, and small formatting helpers.

pub mod config;
pub mod format;
pub mod paths;
pub mod process;

pub use config::Config;
pub use paths::Paths;
