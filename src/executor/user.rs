use crate::db::{Database, User, is_unique_violation, now_timestamp};
use crate::error::{AppError, Result};
use rusqlite::{OptionalExtension, params};

const USER_SELECT: &str =
    "SELECT user_id, eid, login, password_hash, created_at, last_login FROM users";

/// User account queries.
pub struct UserExecutor {
    db: Database,
}

impl UserExecutor {
    /// Create an executor over the given store handle.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a user. Fails with [`AppError::Conflict`] if the login is taken.
    pub fn create_user(&self, user: &User) -> Result<()> {
        let conn = self.db.conn();
        conn.execute(
            "INSERT INTO users (eid, login, password_hash, created_at, last_login)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.eid,
                user.login,
                user.password_hash,
                user.created_at,
                user.last_login,
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("Login '{}' already exists", user.login))
            } else {
                AppError::Internal(format!("Failed to create user: {}", e))
            }
        })?;
        Ok(())
    }

    /// User by external ID.
    pub fn get_by_eid(&self, eid: &str) -> Result<User> {
        let conn = self.db.conn();
        conn.query_row(
            &format!("{USER_SELECT} WHERE eid = ?1"),
            params![eid],
            Self::row_to_user,
        )
        .optional()?
        .ok_or_else(|| AppError::NotFound(format!("User not found: {}", eid)))
    }

    /// User by internal ID.
    pub fn get_by_id(&self, user_id: i64) -> Result<Option<User>> {
        let conn = self.db.conn();
        let user = conn
            .query_row(
                &format!("{USER_SELECT} WHERE user_id = ?1"),
                params![user_id],
                Self::row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// User by login name.
    pub fn get_by_login(&self, login: &str) -> Result<Option<User>> {
        let conn = self.db.conn();
        let user = conn
            .query_row(
                &format!("{USER_SELECT} WHERE login = ?1"),
                params![login],
                Self::row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// List all users.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(&format!("{USER_SELECT} ORDER BY login"))?;

        let users = stmt
            .query_map([], Self::row_to_user)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(users)
    }

    /// Update user password.
    pub fn update_password(&self, login: &str, password_hash: &str) -> Result<bool> {
        let conn = self.db.conn();
        let rows = conn.execute(
            "UPDATE users SET password_hash = ?1 WHERE login = ?2",
            params![password_hash, login],
        )?;
        Ok(rows > 0)
    }

    /// Update user last login.
    pub fn update_last_login(&self, user_id: i64) -> Result<()> {
        let conn = self.db.conn();
        conn.execute(
            "UPDATE users SET last_login = ?1 WHERE user_id = ?2",
            params![now_timestamp(), user_id],
        )?;
        Ok(())
    }

    /// Delete user.
    pub fn delete_user(&self, login: &str) -> Result<bool> {
        let conn = self.db.conn();
        let rows = conn.execute("DELETE FROM users WHERE login = ?1", params![login])?;
        Ok(rows > 0)
    }

    fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
        Ok(User {
            user_id: row.get(0)?,
            eid: row.get(1)?,
            login: row.get(2)?,
            password_hash: row.get(3)?,
            created_at: row.get(4)?,
            last_login: row.get(5)?,
        })
    }
}
