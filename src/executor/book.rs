use crate::db::{
    Author, Book, BookSeries, BookState, Database, UserRef, is_unique_violation, like_pattern,
    name_key, new_eid, now_timestamp,
};
use crate::error::{AppError, Result};
use crate::pagination::Pagination;
use rusqlite::{OptionalExtension, named_params, params};

/// Books joined with author and series. `bu`/`u` only match when
/// `:viewer` is bound to a user ID, so anonymous reads get NULL per-user
/// columns.
const BOOK_SELECT: &str = "SELECT b.book_id, b.eid, b.title,
            a.author_id, a.eid, a.name,
            s.series_id, s.eid, s.name,
            bu.is_loved, bu.state, u.eid, u.login
     FROM books b
     JOIN authors a ON a.author_id = b.author_id
     LEFT JOIN series s ON s.series_id = b.series_id
     LEFT JOIN book_users bu ON bu.book_id = b.book_id AND bu.user_id = :viewer
     LEFT JOIN users u ON u.user_id = bu.user_id";

/// Book queries and per-user book links.
pub struct BookExecutor {
    db: Database,
}

impl BookExecutor {
    /// Create an executor over the given store handle.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// All books, oldest first, without per-user fields.
    pub fn get_all_books(&self, pagination: &Pagination) -> Result<Vec<Book>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(&format!(
            "{BOOK_SELECT} ORDER BY b.book_id LIMIT :limit OFFSET :offset"
        ))?;

        let books = stmt
            .query_map(
                named_params! {
                    ":viewer": None::<i64>,
                    ":limit": pagination.limit,
                    ":offset": pagination.offset,
                },
                Self::row_to_book,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(books)
    }

    /// Books whose title contains `title`, ignoring case. Results are not
    /// restricted to `viewer`; the viewer's flags are attached where linked.
    pub fn get_books_by_title(
        &self,
        title: &str,
        pagination: &Pagination,
        viewer: Option<i64>,
    ) -> Result<Vec<Book>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(&format!(
            "{BOOK_SELECT} WHERE b.title_key LIKE :pattern ESCAPE '\\'
             ORDER BY b.book_id LIMIT :limit OFFSET :offset"
        ))?;

        let books = stmt
            .query_map(
                named_params! {
                    ":viewer": viewer,
                    ":pattern": like_pattern(title),
                    ":limit": pagination.limit,
                    ":offset": pagination.offset,
                },
                Self::row_to_book,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(books)
    }

    /// Books linked to a user, in the order they were added to the catalog.
    pub fn get_all_books_for_user(
        &self,
        user_id: i64,
        pagination: &Pagination,
    ) -> Result<Vec<Book>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(&format!(
            "{BOOK_SELECT} WHERE bu.user_id IS NOT NULL
             ORDER BY b.book_id LIMIT :limit OFFSET :offset"
        ))?;

        let books = stmt
            .query_map(
                named_params! {
                    ":viewer": user_id,
                    ":limit": pagination.limit,
                    ":offset": pagination.offset,
                },
                Self::row_to_book,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(books)
    }

    /// Book by external ID.
    pub fn get_book_by_eid(&self, eid: &str) -> Result<Book> {
        self.fetch_by_eid(eid, None)
    }

    /// Book by external ID with the user's flags attached when linked.
    pub fn get_book_by_eid_for_user(&self, eid: &str, user_id: i64) -> Result<Book> {
        self.fetch_by_eid(eid, Some(user_id))
    }

    fn fetch_by_eid(&self, eid: &str, viewer: Option<i64>) -> Result<Book> {
        let conn = self.db.conn();
        conn.query_row(
            &format!("{BOOK_SELECT} WHERE b.eid = :eid"),
            named_params! { ":viewer": viewer, ":eid": eid },
            Self::row_to_book,
        )
        .optional()?
        .ok_or_else(|| AppError::NotFound(format!("Book not found: {}", eid)))
    }

    fn find_book_id(&self, title: &str, author_id: i64) -> Result<Option<String>> {
        let conn = self.db.conn();
        let eid = conn
            .query_row(
                "SELECT eid FROM books WHERE title_key = ?1 AND author_id = ?2",
                params![name_key(title), author_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(eid)
    }

    /// Get-or-create a book by title and author. An existing book keeps its
    /// series.
    pub fn create_book(
        &self,
        title: &str,
        author_id: i64,
        series_id: Option<i64>,
    ) -> Result<Book> {
        if let Some(eid) = self.find_book_id(title, author_id)? {
            return self.get_book_by_eid(&eid);
        }

        let eid = new_eid();
        let inserted = {
            let conn = self.db.conn();
            conn.execute(
                "INSERT INTO books (eid, title, title_key, author_id, series_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![eid, title, name_key(title), author_id, series_id, now_timestamp()],
            )
        };

        match inserted {
            Ok(_) => {
                tracing::info!(eid = %eid, title = %title, "Created book");
                self.get_book_by_eid(&eid)
            }
            Err(e) if is_unique_violation(&e) => {
                let existing = self.find_book_id(title, author_id)?.ok_or_else(|| {
                    AppError::Internal(format!("Book vanished after conflict: {}", title))
                })?;
                self.get_book_by_eid(&existing)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Link a book to a user. An existing link is reported as
    /// [`AppError::Conflict`] and left untouched.
    pub fn create_book_to_user(&self, book_id: i64, user_id: i64) -> Result<()> {
        let now = now_timestamp();
        let conn = self.db.conn();
        conn.execute(
            "INSERT INTO book_users (book_id, user_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)",
            params![book_id, user_id, now],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("Book {} already linked to user {}", book_id, user_id))
            } else {
                AppError::Database(e)
            }
        })?;
        Ok(())
    }

    fn book_id_for_eid(&self, eid: &str) -> Result<i64> {
        let conn = self.db.conn();
        conn.query_row(
            "SELECT book_id FROM books WHERE eid = ?1",
            params![eid],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| AppError::NotFound(format!("Book not found: {}", eid)))
    }

    /// Flip the loved flag of a book for one user, linking the book to the
    /// user first if needed. Returns the new value.
    pub fn update_toggle_book_is_loved(&self, eid: &str, user_id: i64) -> Result<bool> {
        let book_id = self.book_id_for_eid(eid)?;
        let now = now_timestamp();

        let conn = self.db.conn();
        let is_loved = conn.query_row(
            "INSERT INTO book_users (book_id, user_id, is_loved, created_at, updated_at)
             VALUES (?1, ?2, 1, ?3, ?3)
             ON CONFLICT (book_id, user_id) DO UPDATE SET
                is_loved = NOT book_users.is_loved,
                updated_at = excluded.updated_at
             RETURNING is_loved",
            params![book_id, user_id, now],
            |row| row.get(0),
        )?;
        Ok(is_loved)
    }

    /// Set the reading state of a book for one user, linking the book to
    /// the user first if needed.
    pub fn update_book_state(&self, eid: &str, user_id: i64, state: BookState) -> Result<()> {
        let book_id = self.book_id_for_eid(eid)?;
        let now = now_timestamp();

        let conn = self.db.conn();
        conn.execute(
            "INSERT INTO book_users (book_id, user_id, state, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT (book_id, user_id) DO UPDATE SET
                state = excluded.state,
                updated_at = excluded.updated_at",
            params![book_id, user_id, state.as_str(), now],
        )?;
        Ok(())
    }

    fn row_to_book(row: &rusqlite::Row<'_>) -> rusqlite::Result<Book> {
        let series = match row.get::<_, Option<i64>>(6)? {
            Some(series_id) => Some(BookSeries {
                series_id,
                eid: row.get(7)?,
                name: row.get(8)?,
            }),
            None => None,
        };

        let state = row
            .get::<_, Option<String>>(10)?
            .map(|s| {
                s.parse::<BookState>().map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        10,
                        rusqlite::types::Type::Text,
                        e.into(),
                    )
                })
            })
            .transpose()?;

        let user = match row.get::<_, Option<String>>(11)? {
            Some(eid) => Some(UserRef {
                eid,
                login: row.get(12)?,
            }),
            None => None,
        };

        Ok(Book {
            book_id: row.get(0)?,
            eid: row.get(1)?,
            title: row.get(2)?,
            author: Author {
                author_id: row.get(3)?,
                eid: row.get(4)?,
                name: row.get(5)?,
                num_books: None,
            },
            series,
            user,
            is_loved: row.get(9)?,
            state,
        })
    }
}
