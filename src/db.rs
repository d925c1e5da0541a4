mod schema;

pub use schema::Database;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// User account.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    /// Internal row ID.
    #[serde(skip)]
    pub user_id: i64,
    /// External ID.
    pub eid: String,
    /// Login name.
    pub login: String,
    /// Argon2 password hash.
    #[serde(skip)]
    pub password_hash: String,
    /// Account creation timestamp.
    #[serde(skip)]
    pub created_at: i64,
    /// Last login timestamp.
    #[serde(skip)]
    pub last_login: Option<i64>,
}

/// Public view of the user a book is linked to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRef {
    /// External ID.
    pub eid: String,
    /// Login name.
    pub login: String,
}

/// Authentication session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Session token.
    pub token: String,
    /// Internal user ID.
    pub user_id: i64,
    /// Expiration timestamp.
    pub expires_at: i64,
}

/// Book author.
#[derive(Debug, Clone, Serialize)]
pub struct Author {
    /// Internal row ID.
    #[serde(skip)]
    pub author_id: i64,
    /// External ID.
    pub eid: String,
    /// Display name.
    pub name: String,
    /// Number of books by this author (only on author listings).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_books: Option<i64>,
}

/// Book series.
#[derive(Debug, Clone, Serialize)]
pub struct BookSeries {
    /// Internal row ID.
    #[serde(skip)]
    pub series_id: i64,
    /// External ID.
    pub eid: String,
    /// Series name.
    pub name: String,
}

/// Book with its author, series and, when a user is in scope, that
/// user's loved flag and reading state.
#[derive(Debug, Clone, Serialize)]
pub struct Book {
    /// Internal row ID.
    #[serde(skip)]
    pub book_id: i64,
    /// External ID.
    pub eid: String,
    /// Book title.
    pub title: String,
    /// Owning author.
    pub author: Author,
    /// Series, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<BookSeries>,
    /// User the loved/state fields belong to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserRef>,
    /// Loved flag for `user`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_loved: Option<bool>,
    /// Reading state for `user`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<BookState>,
}

/// Reading state of a book for one user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookState {
    /// Not started.
    #[default]
    Unread,
    /// In progress.
    Reading,
    /// Done.
    Finished,
}

impl BookState {
    /// Stored and wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            BookState::Unread => "unread",
            BookState::Reading => "reading",
            BookState::Finished => "finished",
        }
    }
}

impl fmt::Display for BookState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "unread" => Ok(BookState::Unread),
            "reading" => Ok(BookState::Reading),
            "finished" => Ok(BookState::Finished),
            other => Err(format!("unknown book state: {}", other)),
        }
    }
}

/// Timestamp helper.
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Generate a new external ID.
pub fn new_eid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// True for UNIQUE and PRIMARY KEY constraint failures.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        }
        _ => false,
    }
}

/// Case-folded lookup key for names and titles.
///
/// SQLite's `NOCASE` only folds ASCII, so the key is computed here and
/// stored next to the display value.
pub(crate) fn name_key(name: &str) -> String {
    name.to_lowercase()
}

/// Escape `%`, `_` and `\` and wrap in wildcards for a `LIKE ... ESCAPE '\'`
/// substring match against a [`name_key`] column.
pub(crate) fn like_pattern(needle: &str) -> String {
    let needle = name_key(needle);
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
