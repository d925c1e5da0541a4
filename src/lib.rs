//! booktracker: a small catalog backend for books, authors and series.
//!
//! Users keep a personal list of books with a per-user "loved" flag and
//! reading state. The catalog is served as JSON over HTTP.
//!
//! # Features
//!
//! - Authors, books and book series with external IDs only on the wire
//! - Limit/offset pagination on every list endpoint
//! - Session authentication and double-submit CSRF protection on mutations
//! - HTTPS redirect for deployments behind a TLS-terminating proxy

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Authentication and user management.
pub mod auth;
/// Configuration and CLI.
pub mod config;
/// Database operations.
pub mod db;
/// Error types.
pub mod error;
/// Per-entity query executors.
pub mod executor;
/// Pagination resolver.
pub mod pagination;
/// HTTP server.
pub mod server;


pub use config::{Cli, Command, Config};
pub use db::Database;
pub use error::{AppError, Result};
pub use pagination::Pagination;
pub use server::AppState;
