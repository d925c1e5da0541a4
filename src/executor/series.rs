use crate::db::{
    BookSeries, Database, is_unique_violation, like_pattern, name_key, new_eid, now_timestamp,
};
use crate::error::{AppError, Result};
use crate::pagination::Pagination;
use rusqlite::{OptionalExtension, named_params, params};

/// Book series queries.
pub struct BookSeriesExecutor {
    db: Database,
}

impl BookSeriesExecutor {
    /// Create an executor over the given store handle.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// All series, oldest first.
    pub fn get_all_series(&self, pagination: &Pagination) -> Result<Vec<BookSeries>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT series_id, eid, name FROM series
             ORDER BY series_id LIMIT :limit OFFSET :offset",
        )?;

        let series = stmt
            .query_map(
                named_params! { ":limit": pagination.limit, ":offset": pagination.offset },
                Self::row_to_series,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(series)
    }

    /// Series whose name contains `name`, ignoring case.
    pub fn get_series_by_name(
        &self,
        name: &str,
        pagination: &Pagination,
    ) -> Result<Vec<BookSeries>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT series_id, eid, name FROM series
             WHERE name_key LIKE :pattern ESCAPE '\\'
             ORDER BY series_id LIMIT :limit OFFSET :offset",
        )?;

        let series = stmt
            .query_map(
                named_params! {
                    ":pattern": like_pattern(name),
                    ":limit": pagination.limit,
                    ":offset": pagination.offset,
                },
                Self::row_to_series,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(series)
    }

    /// Series by external ID.
    pub fn get_book_series_by_eid(&self, eid: &str) -> Result<BookSeries> {
        let conn = self.db.conn();
        conn.query_row(
            "SELECT series_id, eid, name FROM series WHERE eid = ?1",
            params![eid],
            Self::row_to_series,
        )
        .optional()?
        .ok_or_else(|| AppError::NotFound(format!("Series not found: {}", eid)))
    }

    fn get_series_by_exact_name(&self, name: &str) -> Result<Option<BookSeries>> {
        let conn = self.db.conn();
        let series = conn
            .query_row(
                "SELECT series_id, eid, name FROM series WHERE name_key = ?1",
                params![name_key(name)],
                Self::row_to_series,
            )
            .optional()?;
        Ok(series)
    }

    /// Get-or-create a series by name.
    pub fn create_book_series(&self, name: &str) -> Result<BookSeries> {
        if let Some(existing) = self.get_series_by_exact_name(name)? {
            return Ok(existing);
        }

        let eid = new_eid();
        let inserted = {
            let conn = self.db.conn();
            conn.execute(
                "INSERT INTO series (eid, name, name_key, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![eid, name, name_key(name), now_timestamp()],
            )
        };

        match inserted {
            Ok(_) => {
                tracing::info!(eid = %eid, name = %name, "Created book series");
                self.get_book_series_by_eid(&eid)
            }
            Err(e) if is_unique_violation(&e) => self
                .get_series_by_exact_name(name)?
                .ok_or_else(|| AppError::Internal(format!("Series vanished after conflict: {}", name))),
            Err(e) => Err(e.into()),
        }
    }

    fn row_to_series(row: &rusqlite::Row<'_>) -> rusqlite::Result<BookSeries> {
        Ok(BookSeries {
            series_id: row.get(0)?,
            eid: row.get(1)?,
            name: row.get(2)?,
        })
    }
}
