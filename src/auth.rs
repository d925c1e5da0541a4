//! Authentication module.

use crate::db::{Database, Session, User, new_eid, now_timestamp};
use crate::error::{AppError, Result};
use crate::executor::UserExecutor;
use argon2::{
    Argon2,
    password_hash::{
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
        rand_core::{OsRng, RngCore},
    },
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

/// Hash a password using Argon2.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

/// Verify a password against a hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Generate a secure random token.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Compare two CSRF tokens without short-circuiting on the first
/// differing byte.
pub fn csrf_tokens_match(expected: &str, provided: &str) -> bool {
    let (a, b) = (expected.as_bytes(), provided.as_bytes());
    if a.is_empty() || a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Authentication service.
pub struct AuthService {
    db: Database,
    session_duration_days: u32,
    registration_enabled: bool,
}

impl AuthService {
    /// Create a new auth service.
    pub fn new(db: Database, session_duration_days: u32, registration_enabled: bool) -> Self {
        Self {
            db,
            session_duration_days,
            registration_enabled,
        }
    }

    fn users(&self) -> UserExecutor {
        UserExecutor::new(self.db.clone())
    }

    /// Register a new user.
    pub fn register(&self, login: &str, password: &str) -> Result<User> {
        if !self.registration_enabled {
            return Err(AppError::Forbidden("Registration is disabled".to_string()));
        }

        self.create_user(login, password)
    }

    /// Create a new user (admin function).
    pub fn create_user(&self, login: &str, password: &str) -> Result<User> {
        // Validate login
        if login.is_empty() || login.len() > 64 {
            return Err(AppError::Validation(
                "Login must be 1-64 characters".to_string(),
            ));
        }

        if !login
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        {
            return Err(AppError::Validation(
                "Login can only contain letters, numbers, _ and -".to_string(),
            ));
        }

        // Validate password
        if password.len() < 8 {
            return Err(AppError::Validation(
                "Password must be at least 8 characters".to_string(),
            ));
        }

        let user = User {
            user_id: 0,
            eid: new_eid(),
            login: login.to_string(),
            password_hash: hash_password(password)?,
            created_at: now_timestamp(),
            last_login: None,
        };

        let users = self.users();
        users.create_user(&user)?;
        users
            .get_by_login(login)?
            .ok_or_else(|| AppError::Internal(format!("User missing after insert: {}", login)))
    }

    /// Login and create a session.
    pub fn login(&self, login: &str, password: &str) -> Result<(User, String)> {
        let users = self.users();
        let user = users
            .get_by_login(login)?
            .ok_or_else(|| AppError::Unauthorized("Invalid login or password".to_string()))?;

        if !verify_password(password, &user.password_hash)? {
            return Err(AppError::Unauthorized(
                "Invalid login or password".to_string(),
            ));
        }

        // Update last login
        users.update_last_login(user.user_id)?;

        // Create session
        let token = generate_token();
        let expires_at = now_timestamp() + (self.session_duration_days as i64 * 24 * 60 * 60);

        let session = Session {
            token: token.clone(),
            user_id: user.user_id,
            expires_at,
        };

        self.db.create_session(&session)?;
        tracing::info!(user = %user.eid, "User logged in");

        Ok((user, token))
    }

    /// Validate a session token and return the user.
    pub fn validate_token(&self, token: &str) -> Result<Option<User>> {
        let session = match self.db.get_session(token)? {
            Some(s) => s,
            None => return Ok(None),
        };

        // Check expiration
        if session.expires_at < now_timestamp() {
            self.db.delete_session(token)?;
            return Ok(None);
        }

        self.users().get_by_id(session.user_id)
    }

    /// Logout (delete session).
    pub fn logout(&self, token: &str) -> Result<()> {
        self.db.delete_session(token)
    }

    /// Change user password.
    pub fn change_password(&self, login: &str, new_password: &str) -> Result<bool> {
        if new_password.len() < 8 {
            return Err(AppError::Validation(
                "Password must be at least 8 characters".to_string(),
            ));
        }

        let password_hash = hash_password(new_password)?;
        self.users().update_password(login, &password_hash)
    }

    /// Delete a user.
    pub fn delete_user(&self, login: &str) -> Result<bool> {
        self.users().delete_user(login)
    }

    /// List all users.
    pub fn list_users(&self) -> Result<Vec<User>> {
        self.users().list_users()
    }
}
