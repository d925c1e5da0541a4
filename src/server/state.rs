//! Application state shared across handlers.

use crate::auth::AuthService;
use crate::config::Config;
use crate::db::Database;
use crate::executor::{AuthorExecutor, BookExecutor, BookSeriesExecutor};
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<Config>,
    /// Database connection.
    pub db: Database,
    /// Authentication service.
    pub auth: Arc<AuthService>,
}

impl AppState {
    /// Create new application state with database.
    pub fn new_with_db(config: Config, db: Database, auth: AuthService) -> Self {
        Self {
            config: Arc::new(config),
            db,
            auth: Arc::new(auth),
        }
    }

    /// Build state from config alone, creating the auth service over `db`.
    pub fn new(config: Config, db: Database) -> Self {
        let auth = AuthService::new(
            db.clone(),
            config.auth.session_days,
            config.auth.registration_enabled(),
        );
        Self::new_with_db(config, db, auth)
    }

    /// Author executor for this request.
    pub fn authors(&self) -> AuthorExecutor {
        AuthorExecutor::new(self.db.clone())
    }

    /// Book executor for this request.
    pub fn books(&self) -> BookExecutor {
        BookExecutor::new(self.db.clone())
    }

    /// Series executor for this request.
    pub fn series(&self) -> BookSeriesExecutor {
        BookSeriesExecutor::new(self.db.clone())
    }

    /// Whether the server runs in local/development mode.
    pub fn is_local(&self) -> bool {
        self.config.server.local
    }
}
