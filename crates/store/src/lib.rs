//! `floorbook-store` holds the file-backed collaborators for the reconciliation
//! engine: a SQLite attendance store and JSON export readers.

pub mod json;
pub mod sqlite;

pub use json::{JsonCustomerFile, JsonOrderFile};
pub use sqlite::{DbError, SqliteStore};
