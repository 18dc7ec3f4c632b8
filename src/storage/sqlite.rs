//! SQLite storage implementation

use std::path::{Path, PathBuf};
use rusqlite::Connection;
use tracing::warn;
use crate::photo::{LocalPhotoStore, PhotoStore, PhotoWarning};
use crate::table::LiveTable;
use crate::{Error, Result};
use super::{migrate, quote_ident};

/// Directory for photos next to a database file
pub const DEFAULT_PHOTO_DIR: &str = "photos";

/// The bookkeeping database: one SQLite connection plus the photo store
/// that goes with it.
///
/// The handle is owned by whoever opened it and borrowed by the archive
/// layer; it is not meant to be shared across threads.
pub struct Store {
    pub(crate) conn: Connection,
    path: Option<PathBuf>,
    photos: Option<Box<dyn PhotoStore>>,
}

impl Store {
    /// Open a database file (creates if doesn't exist) and bring every
    /// live and archive table up to the current schema
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let photo_root = path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(DEFAULT_PHOTO_DIR);
        let store = Self {
            conn,
            path: Some(path.to_path_buf()),
            photos: Some(Box::new(LocalPhotoStore::new(photo_root))),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing). No photo store is attached.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn, path: None, photos: None };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Replace the photo store
    pub fn with_photo_store(mut self, photos: impl PhotoStore + 'static) -> Self {
        self.photos = Some(Box::new(photos));
        self
    }

    /// Run the schema manager; any failure is a schema error
    fn initialize_schema(&self) -> Result<()> {
        let schema_error = |e: Error| match e {
            Error::Schema(msg) => Error::Schema(msg),
            other => Error::Schema(other.to_string()),
        };
        migrate::ensure_schema(&self.conn).map_err(schema_error)?;
        migrate::ensure_archive_schema(&self.conn).map_err(schema_error)?;
        Ok(())
    }

    /// Database file, if not in memory
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn photos(&self) -> Option<&dyn PhotoStore> {
        self.photos.as_deref()
    }

    // ========== Photo Operations ==========

    /// Copy a photo into `scope`. Failure is reported, never raised.
    pub(crate) fn attach_photo(
        &self,
        user_id: i64,
        scope: &str,
        label: &str,
        source: &Path,
    ) -> std::result::Result<String, PhotoWarning> {
        let Some(photos) = self.photos() else {
            let warning = PhotoWarning::new(source.display().to_string(), "no photo storage configured");
            warn!("{}", warning);
            return Err(warning);
        };
        photos.store(user_id, scope, label, source).map_err(|e| {
            let warning = PhotoWarning::new(source.display().to_string(), e);
            warn!("{}", warning);
            warning
        })
    }

    /// Remove stored photos, keeping the first failure
    pub(crate) fn discard_photos<'p>(&self, paths: impl IntoIterator<Item = &'p str>) -> Option<PhotoWarning> {
        let photos = self.photos()?;
        let mut first = None;
        for path in paths.into_iter().filter(|p| !p.is_empty()) {
            if let Err(e) = photos.remove(path) {
                let warning = PhotoWarning::new(path, e);
                warn!("{}", warning);
                first.get_or_insert(warning);
            }
        }
        first
    }

    // ========== Statistics ==========

    /// Row counts for one user
    pub fn stats(&self, user_id: i64) -> Result<DbStats> {
        let mut tables = Vec::new();
        for table in LiveTable::all() {
            let count: i64 = self.conn.query_row(
                &format!("SELECT COUNT(*) FROM {} WHERE user_id = ?1", quote_ident(table.as_str())),
                [user_id],
                |row| row.get(0),
            )?;
            tables.push((*table, count as usize));
        }

        let mut archives = 0;
        for table in LiveTable::all() {
            archives += migrate::archive_tables(&self.conn, *table)?
                .iter()
                .filter(|name| name.user_id == user_id)
                .count();
        }

        Ok(DbStats { tables, archives })
    }
}

/// Database statistics
#[derive(Debug, Clone)]
pub struct DbStats {
    pub tables: Vec<(LiveTable, usize)>,
    pub archives: usize,
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        for (table, count) in &self.tables {
            writeln!(f, "  {}: {}", table, count)?;
        }
        write!(f, "  archives: {}", self.archives)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_file_creates_schema() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("project_management.db");
        {
            let store = Store::open(&db).unwrap();
            assert_eq!(store.path(), Some(db.as_path()));
            assert!(store.photos().is_some());
        }
        // reopening an existing file is a no-op migration
        let store = Store::open(&db).unwrap();
        assert!(migrate::table_exists(&store.conn, "users").unwrap());
    }

    #[test]
    fn test_stats_are_per_user() {
        let store = Store::open_in_memory().unwrap();
        store.conn.execute("INSERT INTO sales (name, user_id) VALUES ('A', 1)", []).unwrap();
        store.conn.execute("INSERT INTO sales (name, user_id) VALUES ('B', 2)", []).unwrap();
        store.conn.execute("CREATE TABLE consumers_backup_1_2024_3_5_1 (id INTEGER)", []).unwrap();

        let stats = store.stats(1).unwrap();
        assert!(stats.tables.contains(&(LiveTable::Sales, 1)));
        assert_eq!(stats.archives, 1);
        assert_eq!(store.stats(2).unwrap().archives, 0);
    }

    #[test]
    fn test_attach_photo_without_store_warns() {
        let store = Store::open_in_memory().unwrap();
        let result = store.attach_photo(1, "sales_projects_1", "A", Path::new("/nope.jpg"));
        assert!(result.is_err());
        assert_eq!(store.discard_photos(["1/x/a.jpg"]), None);
    }
}
