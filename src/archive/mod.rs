//! Archives - closing books and working with the closed copies
//!
//! Closing a book moves a user's rows (optionally only one sales agent's
//! or worker's) out of a live table into a new table named by
//! [`ArchiveName`]. Archives are ordinary tables afterwards: they can be
//! listed, loaded and edited, and they keep their own id sequence.

pub mod name;
pub mod engine;
pub mod editor;

pub use name::ArchiveName;
pub use engine::ArchiveEngine;
pub use editor::{ArchiveEditor, ArchiveSnapshot, Cell};

/// Photo scope of rows in an archive.
///
/// Per-entity archives use their own name; whole-table archives keep one
/// scope per entity underneath the archive name.
pub(crate) fn photo_scope(name: &ArchiveName, entity_id: Option<i64>) -> String {
    match (name.entity_id, entity_id) {
        (None, Some(entity_id)) => format!("{}_{}", name, entity_id),
        _ => name.to_string(),
    }
}
