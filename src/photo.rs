//! Photo storage
//!
//! Sales and worker projects may carry one photo each. The database only
//! holds a storage-relative path (`<user>/<scope>/<file>`); the files live
//! under a root directory owned by a [`PhotoStore`].
//!
//! Scopes:
//! - live rows: `<table>_<entity id>`, e.g. `sales_projects_4`
//! - archived rows: the archive table name

use crate::Result;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A photo operation that failed after the owning row change committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhotoWarning {
    /// Path or scope the operation was about
    pub path: String,
    pub reason: String,
}

impl PhotoWarning {
    pub fn new(path: impl Into<String>, reason: impl ToString) -> Self {
        Self { path: path.into(), reason: reason.to_string() }
    }
}

impl std::fmt::Display for PhotoWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "photo {}: {}", self.path, self.reason)
    }
}

/// File storage for project photos.
pub trait PhotoStore {
    /// Copy `source` into the scope directory and return the relative path
    fn store(&self, user_id: i64, scope: &str, display_name: &str, source: &Path) -> Result<String>;

    /// Rename a scope directory. Returns the old and new relative prefixes
    /// when there was anything to move.
    fn move_scope(&self, user_id: i64, from: &str, to: &str) -> Result<Option<(String, String)>>;

    /// Delete a stored photo; an emptied scope directory goes with it
    fn remove(&self, relative: &str) -> Result<()>;
}

/// Scope key of a live parent entity
pub fn live_scope(table: crate::LiveTable, entity_id: i64) -> String {
    format!("{}_{}", table.as_str(), entity_id)
}

/// [`PhotoStore`] on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalPhotoStore {
    root: PathBuf,
}

impl LocalPhotoStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a stored relative path
    pub fn resolve(&self, relative: &str) -> PathBuf {
        relative.split('/').fold(self.root.clone(), |acc, part| acc.join(part))
    }

    fn scope_prefix(user_id: i64, scope: &str) -> String {
        format!("{}/{}/", user_id, scope)
    }
}

/// Keep letters, digits, `-` and `_`; everything else becomes `_`
fn file_stem(display_name: &str) -> String {
    let stem: String = display_name
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if stem.is_empty() { "photo".to_string() } else { stem }
}

impl PhotoStore for LocalPhotoStore {
    fn store(&self, user_id: i64, scope: &str, display_name: &str, source: &Path) -> Result<String> {
        let prefix = Self::scope_prefix(user_id, scope);
        let dir = self.resolve(prefix.trim_end_matches('/'));
        fs::create_dir_all(&dir)?;

        let stem = file_stem(display_name);
        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
            .unwrap_or_default();

        let mut file_name = format!("{}{}", stem, ext);
        let mut n = 2;
        while dir.join(&file_name).exists() {
            file_name = format!("{}({}){}", stem, n, ext);
            n += 1;
        }

        fs::copy(source, dir.join(&file_name))?;
        let relative = format!("{}{}", prefix, file_name);
        debug!("Stored photo {}", relative);
        Ok(relative)
    }

    fn move_scope(&self, user_id: i64, from: &str, to: &str) -> Result<Option<(String, String)>> {
        let old_prefix = Self::scope_prefix(user_id, from);
        let new_prefix = Self::scope_prefix(user_id, to);
        let old_dir = self.resolve(old_prefix.trim_end_matches('/'));
        if !old_dir.is_dir() {
            return Ok(None);
        }
        let new_dir = self.resolve(new_prefix.trim_end_matches('/'));
        fs::rename(&old_dir, &new_dir)?;
        debug!("Moved photos {} -> {}", old_prefix, new_prefix);
        Ok(Some((old_prefix, new_prefix)))
    }

    fn remove(&self, relative: &str) -> Result<()> {
        let path = self.resolve(relative);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        if let Some(parent) = path.parent() {
            if parent.is_dir() && fs::read_dir(parent)?.next().is_none() {
                fs::remove_dir(parent)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn source_file(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, b"jpeg bytes").unwrap();
        path
    }

    #[test]
    fn test_store_returns_relative_path() {
        let tmp = TempDir::new().unwrap();
        let photos = LocalPhotoStore::new(tmp.path().join("photos"));
        let src = source_file(&tmp, "IMG_001.JPG");

        let rel = photos.store(1, "sales_projects_4", "Bu Sari", &src).unwrap();
        assert_eq!(rel, "1/sales_projects_4/Bu_Sari.jpg");
        assert!(photos.resolve(&rel).exists());

        let again = photos.store(1, "sales_projects_4", "Bu Sari", &src).unwrap();
        assert_eq!(again, "1/sales_projects_4/Bu_Sari(2).jpg");
    }

    #[test]
    fn test_move_scope() {
        let tmp = TempDir::new().unwrap();
        let photos = LocalPhotoStore::new(tmp.path().join("photos"));
        let src = source_file(&tmp, "a.png");

        assert_eq!(photos.move_scope(1, "worker_projects_2", "x").unwrap(), None);

        let rel = photos.store(1, "worker_projects_2", "Pak Anto", &src).unwrap();
        let moved = photos
            .move_scope(1, "worker_projects_2", "worker_projects_backup_2_1_2024_3_5_1")
            .unwrap()
            .unwrap();
        assert_eq!(moved.0, "1/worker_projects_2/");
        assert_eq!(moved.1, "1/worker_projects_backup_2_1_2024_3_5_1/");

        let new_rel = rel.replace(&moved.0, &moved.1);
        assert!(photos.resolve(&new_rel).exists());
        assert!(!photos.resolve(&rel).exists());
    }

    #[test]
    fn test_remove_cleans_empty_scope() {
        let tmp = TempDir::new().unwrap();
        let photos = LocalPhotoStore::new(tmp.path().join("photos"));
        let src = source_file(&tmp, "a.png");

        let rel = photos.store(3, "sales_projects_1", "A", &src).unwrap();
        photos.remove(&rel).unwrap();
        assert!(!photos.resolve("3/sales_projects_1").exists());

        // missing file is not an error
        photos.remove("3/sales_projects_1/gone.png").unwrap();
    }
}
