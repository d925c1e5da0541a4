//! Per-entity query executors.
//!
//! Each executor wraps a [`Database`](crate::db::Database) handle and is
//! built per request. Listing methods return an empty `Vec` when nothing
//! matches; single-entity lookups return [`AppError::NotFound`](crate::error::AppError::NotFound).

mod author;
mod book;
mod series;
mod user;

pub use author::AuthorExecutor;
pub use book::BookExecutor;
pub use series::BookSeriesExecutor;
pub use user::UserExecutor;
