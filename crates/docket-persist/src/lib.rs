//! # Docket Persistence
//!
//! SQLite store adapter for `docket-queue`.
//!
//! Each collection is a table. Job documents are stored whole as JSON next to
//! the handful of columns dequeue filters and sorts on, and the atomic claim
//! is a single `UPDATE ... RETURNING` statement.

pub mod collection;
pub mod sqlite;

pub use collection::SqliteCollection;
pub use sqlite::{SqliteConfig, SqliteDatabase};
