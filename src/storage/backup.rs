//! Local copies of the database file

use std::fs;
use std::path::{Path, PathBuf};
use chrono::NaiveDate;
use tracing::info;
use crate::{Error, Result};
use super::sqlite::Store;

/// File name of a backup copy
pub const BACKUP_FILE_STEM: &str = "project_management";

/// `<dir>/<DD-MM-YYYY>/project_management.db`, or `project_management(N).db`
/// with the first free N when that file is taken
pub fn backup_path(dir: &Path, date: NaiveDate) -> PathBuf {
    let day_dir = dir.join(date.format("%d-%m-%Y").to_string());
    let first = day_dir.join(format!("{}.db", BACKUP_FILE_STEM));
    if !first.exists() {
        return first;
    }
    (2..)
        .map(|n| day_dir.join(format!("{}({}).db", BACKUP_FILE_STEM, n)))
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}

impl Store {
    /// Write a consistent copy of the database under `dir`
    pub fn backup_to(&self, dir: &Path, date: NaiveDate) -> Result<PathBuf> {
        let target = backup_path(dir, date);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let target_str = target
            .to_str()
            .ok_or_else(|| Error::validation(format!("Backup path is not valid UTF-8: {}", target.display())))?;

        self.conn.execute("VACUUM INTO ?1", [target_str])?;
        info!("Backed up database to {}", target.display());
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::SalesAgent;
    use crate::PeriodFilter;
    use tempfile::TempDir;

    #[test]
    fn test_backup_names_do_not_collide() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open_in_memory().unwrap();
        store.insert(&SalesAgent::new("Andi"), 1).unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();

        let first = store.backup_to(tmp.path(), day).unwrap();
        let second = store.backup_to(tmp.path(), day).unwrap();
        assert_eq!(first, tmp.path().join("05-03-2024").join("project_management.db"));
        assert_eq!(second, tmp.path().join("05-03-2024").join("project_management(2).db"));

        let copy = Store::open(&second).unwrap();
        assert_eq!(copy.list::<SalesAgent>(1, PeriodFilter::all()).unwrap().len(), 1);
    }
}
