//! Storage Layer - SQLite-backed persistence
//!
//! One database file holds the live tables:
//! - consumers, sales, sales_projects, tukang, worker_projects
//! - projects, materials_usage, users
//!
//! plus any number of archive tables named `<table>_backup_...`, created
//! by closing a book and discovered by name.

pub mod schema;
pub mod migrate;
pub mod sqlite;
pub mod repository;
pub mod backup;

pub use sqlite::{Store, DbStats};

/// Quote an identifier for interpolation into SQL text
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
