//! # Pembukuan - bookkeeping core for a small construction business
//!
//! Tracks customers, sales agents and their projects, workers (tukang) and
//! their projects, and material usage per project, all in one SQLite file.
//!
//! Pembukuan provides:
//! - A schema manager that evolves live tables and every archived copy of them
//! - A user-scoped entity repository
//! - "Closing a book": moving a period's rows into a uniquely named backup table
//! - Browsing and editing those frozen backup tables afterwards

pub mod table;
pub mod money;
pub mod entity;
pub mod storage;
pub mod archive;
pub mod photo;
pub mod auth;
pub mod report;
pub mod config;
pub mod ui;

// Re-exports for convenient access
pub use table::LiveTable;
pub use money::Money;
pub use entity::{Consumer, MaterialUsage, Period, PeriodFilter, Project, SalesAgent, SalesProject, Worker, WorkerProject};
pub use storage::Store;
pub use archive::{ArchiveEditor, ArchiveEngine, ArchiveName};
pub use photo::{LocalPhotoStore, PhotoStore, PhotoWarning};

/// Result type alias for Pembukuan operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Pembukuan operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Auth error: {0}")]
    Auth(String),
}

impl Error {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub(crate) fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }
}

/// Result of a write that may also have touched photo files.
///
/// The row-level change has committed whenever this is returned; a
/// `photo_warning` means the stored photo reference may be stale.
#[derive(Debug, Clone)]
pub struct WriteOutcome<T> {
    pub value: T,
    pub photo_warning: Option<PhotoWarning>,
}

impl<T> WriteOutcome<T> {
    pub fn clean(value: T) -> Self {
        Self { value, photo_warning: None }
    }

    pub fn with_warning(value: T, photo_warning: Option<PhotoWarning>) -> Self {
        Self { value, photo_warning }
    }

    pub fn is_clean(&self) -> bool {
        self.photo_warning.is_none()
    }
}
