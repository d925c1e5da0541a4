use crate::db::{
    Author, Database, is_unique_violation, like_pattern, name_key, new_eid, now_timestamp,
};
use crate::error::{AppError, Result};
use crate::pagination::Pagination;
use rusqlite::{OptionalExtension, named_params, params};

const AUTHOR_SELECT: &str = "SELECT a.author_id, a.eid, a.name,
            (SELECT COUNT(*) FROM books b WHERE b.author_id = a.author_id)
     FROM authors a";

/// Author queries.
pub struct AuthorExecutor {
    db: Database,
}

impl AuthorExecutor {
    /// Create an executor over the given store handle.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// All authors, oldest first.
    pub fn get_all_authors(&self, pagination: &Pagination) -> Result<Vec<Author>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(&format!(
            "{AUTHOR_SELECT} ORDER BY a.author_id LIMIT :limit OFFSET :offset"
        ))?;

        let authors = stmt
            .query_map(
                named_params! { ":limit": pagination.limit, ":offset": pagination.offset },
                Self::row_to_author,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(authors)
    }

    /// Authors whose name contains `name`, ignoring case.
    pub fn get_authors_by_name(&self, name: &str, pagination: &Pagination) -> Result<Vec<Author>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(&format!(
            "{AUTHOR_SELECT} WHERE a.name_key LIKE :pattern ESCAPE '\\'
             ORDER BY a.author_id LIMIT :limit OFFSET :offset"
        ))?;

        let authors = stmt
            .query_map(
                named_params! {
                    ":pattern": like_pattern(name),
                    ":limit": pagination.limit,
                    ":offset": pagination.offset,
                },
                Self::row_to_author,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(authors)
    }

    /// Author by external ID.
    pub fn get_author_by_eid(&self, eid: &str) -> Result<Author> {
        let conn = self.db.conn();
        conn.query_row(
            &format!("{AUTHOR_SELECT} WHERE a.eid = ?1"),
            params![eid],
            Self::row_to_author,
        )
        .optional()?
        .ok_or_else(|| AppError::NotFound(format!("Author not found: {}", eid)))
    }

    /// Author with exactly this name, ignoring case.
    pub fn get_author_by_exact_name(&self, name: &str) -> Result<Option<Author>> {
        let conn = self.db.conn();
        let author = conn
            .query_row(
                &format!("{AUTHOR_SELECT} WHERE a.name_key = ?1"),
                params![name_key(name)],
                Self::row_to_author,
            )
            .optional()?;
        Ok(author)
    }

    /// Get-or-create an author by name.
    pub fn create_author(&self, name: &str) -> Result<Author> {
        if let Some(existing) = self.get_author_by_exact_name(name)? {
            return Ok(existing);
        }

        let eid = new_eid();
        let inserted = {
            let conn = self.db.conn();
            conn.execute(
                "INSERT INTO authors (eid, name, name_key, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![eid, name, name_key(name), now_timestamp()],
            )
        };

        match inserted {
            Ok(_) => {
                tracing::info!(eid = %eid, name = %name, "Created author");
                self.get_author_by_eid(&eid)
            }
            // Lost a race with a concurrent insert of the same name.
            Err(e) if is_unique_violation(&e) => self
                .get_author_by_exact_name(name)?
                .ok_or_else(|| AppError::Internal(format!("Author vanished after conflict: {}", name))),
            Err(e) => Err(e.into()),
        }
    }

    fn row_to_author(row: &rusqlite::Row<'_>) -> rusqlite::Result<Author> {
        Ok(Author {
            author_id: row.get(0)?,
            eid: row.get(1)?,
            name: row.get(2)?,
            num_books: Some(row.get(3)?),
        })
    }
}
