//! Archive editor - reading and changing rows of a closed book
//!
//! Fields arrive keyed by display name ("Nama Konsumen", "Komisi", ...)
//! and are translated through the table family's column mapping. Fields
//! for columns the archive does not have are dropped, since older
//! archives may predate a column.

use std::path::Path;
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params_from_iter, OptionalExtension};
use serde::Serialize;
use tracing::{debug, warn};
use crate::money::Money;
use crate::storage::{migrate, quote_ident, Store};
use crate::{Error, PhotoWarning, Result, WriteOutcome};
use super::{photo_scope, ArchiveName};

/// One stored value, as found in the archive.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<ValueRef<'_>> for Cell {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Cell::Null,
            ValueRef::Integer(i) => Cell::Integer(i),
            ValueRef::Real(r) => Cell::Real(r),
            ValueRef::Text(t) => Cell::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Cell::Blob(b.to_vec()),
        }
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Integer(i) => write!(f, "{}", i),
            Cell::Real(r) => write!(f, "{}", r),
            Cell::Text(t) => write!(f, "{}", t),
            Cell::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

/// Full contents of an archive table
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveSnapshot {
    pub name: ArchiveName,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl ArchiveSnapshot {
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&Cell> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)
    }

    pub fn id_of(&self, row: usize) -> Option<i64> {
        match self.cell(row, "id")? {
            Cell::Integer(id) => Some(*id),
            Cell::Text(t) => t.parse().ok(),
            _ => None,
        }
    }

    pub fn text(&self, row: usize, column: &str) -> Option<String> {
        match self.cell(row, column)? {
            Cell::Null => None,
            cell => Some(cell.to_string()),
        }
    }
}

/// Reads and edits archive tables
pub struct ArchiveEditor<'a> {
    store: &'a Store,
}

impl<'a> ArchiveEditor<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Every row of the archive, in storage order
    pub fn load(&self, name: &ArchiveName) -> Result<ArchiveSnapshot> {
        let columns = self.columns(name)?;
        let mut stmt = self
            .store
            .conn
            .prepare(&format!("SELECT * FROM {}", quote_ident(&name.to_string())))?;
        let width = columns.len();
        let rows = stmt
            .query_map([], |row| {
                (0..width)
                    .map(|i| row.get_ref(i).map(Cell::from))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(ArchiveSnapshot { name: name.clone(), columns, rows })
    }

    /// `max(id) + 1`, or 1 for an empty archive
    pub fn next_id(&self, name: &ArchiveName) -> Result<i64> {
        self.columns(name)?;
        let next = self.store.conn.query_row(
            &format!("SELECT COALESCE(MAX(id), 0) + 1 FROM {}", quote_ident(&name.to_string())),
            [],
            |row| row.get(0),
        )?;
        Ok(next)
    }

    /// Add a row to an archive.
    ///
    /// `user_id` and `entity_id` default to the ones in the archive name.
    pub fn insert(
        &self,
        name: &ArchiveName,
        fields: &[(&str, &str)],
        photo: Option<&Path>,
        user_id: Option<i64>,
        entity_id: Option<i64>,
    ) -> Result<WriteOutcome<i64>> {
        let columns = self.columns(name)?;
        let values = self.translate(name, fields, &columns)?;
        let id = self.next_id(name)?;
        let owner = user_id.unwrap_or(name.user_id);
        let entity = entity_id.or(name.entity_id);
        let parent_key = name.table.parent_key();

        let mut row: Vec<(&str, Value)> = vec![("id", Value::Integer(id))];
        if has(&columns, "user_id") {
            row.push(("user_id", Value::Integer(owner)));
        }
        if let (Some(key), Some(entity)) = (parent_key, entity) {
            if has(&columns, key) {
                row.push((key, Value::Integer(entity)));
            }
        }
        for (column, value) in &values {
            if !row.iter().any(|(c, _)| *c == column.as_str()) {
                row.push((column.as_str(), value.clone()));
            }
        }

        let placeholders: Vec<String> = (1..=row.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&name.to_string()),
            row.iter().map(|(c, _)| quote_ident(c)).collect::<Vec<_>>().join(", "),
            placeholders.join(", ")
        );
        let bound: Vec<Value> = row.into_iter().map(|(_, v)| v).collect();
        debug!("{} {:?}", sql, bound);
        self.store.conn.execute(&sql, params_from_iter(bound))?;

        let warning = match photo {
            Some(source) => self.replace_photo(name, id, source, owner, entity, label(&values), &columns)?,
            None => None,
        };
        Ok(WriteOutcome::with_warning(id, warning))
    }

    /// Change a row of an archive. Only fields whose columns exist in
    /// this archive are written; with none left this does nothing.
    pub fn update(
        &self,
        name: &ArchiveName,
        record_id: i64,
        fields: &[(&str, &str)],
        photo: Option<&Path>,
    ) -> Result<WriteOutcome<()>> {
        let columns = self.columns(name)?;
        let values = self.translate(name, fields, &columns)?;
        if values.is_empty() && photo.is_none() {
            warn!("No matching columns to update in {}", name);
            return Ok(WriteOutcome::clean(()));
        }

        let archive = quote_ident(&name.to_string());
        if values.is_empty() {
            self.require_row(name, record_id)?;
        } else {
            let assignments: Vec<String> = values
                .iter()
                .enumerate()
                .map(|(i, (column, _))| format!("{} = ?{}", quote_ident(column), i + 1))
                .collect();
            let sql = format!(
                "UPDATE {} SET {} WHERE id = ?{}",
                archive,
                assignments.join(", "),
                values.len() + 1
            );
            let mut bound: Vec<Value> = values.iter().map(|(_, v)| v.clone()).collect();
            bound.push(Value::Integer(record_id));
            debug!("{} {:?}", sql, bound);

            if self.store.conn.execute(&sql, params_from_iter(bound))? == 0 {
                return Err(Error::not_found(format!("{} #{}", name, record_id)));
            }
        }

        let Some(source) = photo else {
            return Ok(WriteOutcome::clean(()));
        };
        let entity = match name.table.parent_key() {
            Some(key) if has(&columns, key) => self
                .store
                .conn
                .query_row(
                    &format!("SELECT {} FROM {} WHERE id = ?1", quote_ident(key), archive),
                    [record_id],
                    |row| row.get::<_, Option<i64>>(0),
                )
                .optional()?
                .flatten(),
            _ => None,
        };
        let owner = self.row_owner(name, record_id, &columns)?;
        let warning = self.replace_photo(name, record_id, source, owner, entity, label(&values), &columns)?;
        Ok(WriteOutcome::with_warning((), warning))
    }

    /// Delete one row by id; its photo goes with it
    pub fn delete(&self, name: &ArchiveName, record_id: i64) -> Result<WriteOutcome<()>> {
        let columns = self.columns(name)?;
        let photo = if has(&columns, "photo_path") {
            self.photo_of(name, record_id)?
        } else {
            None
        };

        let sql = format!("DELETE FROM {} WHERE id = ?1", quote_ident(&name.to_string()));
        debug!("{} [{}]", sql, record_id);
        if self.store.conn.execute(&sql, [record_id])? == 0 {
            return Err(Error::not_found(format!("{} #{}", name, record_id)));
        }

        let warning = photo.and_then(|p| self.store.discard_photos([p.as_str()]));
        Ok(WriteOutcome::with_warning((), warning))
    }

    /// Columns of the archive; a missing archive is not found
    fn columns(&self, name: &ArchiveName) -> Result<Vec<String>> {
        let columns = migrate::table_columns(&self.store.conn, &name.to_string())?;
        if columns.is_empty() {
            return Err(Error::not_found(format!("Archive {}", name)));
        }
        Ok(columns)
    }

    /// Display-named fields to `(column, value)` pairs this archive can hold
    fn translate(&self, name: &ArchiveName, fields: &[(&str, &str)], columns: &[String]) -> Result<Vec<(String, Value)>> {
        let table = name.table;
        let mut values: Vec<(String, Value)> = Vec::new();

        for (field, raw) in fields {
            let column = table.storage_column(field);
            if matches!(column, "id" | "user_id" | "photo_path") {
                debug!("Ignoring managed column {} for {}", column, name);
                continue;
            }
            if !has(columns, column) {
                debug!("Dropping field {} missing from {}", field, name);
                continue;
            }

            let value = if table.money_columns().contains(&column) {
                Value::Text(Money::parse(raw)?.to_string())
            } else {
                Value::Text(raw.to_string())
            };

            match values.iter_mut().find(|(c, _)| c == column) {
                Some(existing) => existing.1 = value,
                None => values.push((column.to_string(), value)),
            }
        }
        Ok(values)
    }

    fn require_row(&self, name: &ArchiveName, record_id: i64) -> Result<()> {
        self.store
            .conn
            .query_row(
                &format!("SELECT 1 FROM {} WHERE id = ?1", quote_ident(&name.to_string())),
                [record_id],
                |_| Ok(()),
            )
            .optional()?
            .ok_or_else(|| Error::not_found(format!("{} #{}", name, record_id)))
    }

    fn row_owner(&self, name: &ArchiveName, record_id: i64, columns: &[String]) -> Result<i64> {
        if !has(columns, "user_id") {
            return Ok(name.user_id);
        }
        let owner: Option<i64> = self
            .store
            .conn
            .query_row(
                &format!("SELECT user_id FROM {} WHERE id = ?1", quote_ident(&name.to_string())),
                [record_id],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(owner.unwrap_or(name.user_id))
    }

    fn photo_of(&self, name: &ArchiveName, record_id: i64) -> Result<Option<String>> {
        let path: Option<Option<String>> = self
            .store
            .conn
            .query_row(
                &format!("SELECT photo_path FROM {} WHERE id = ?1", quote_ident(&name.to_string())),
                [record_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(path.flatten().filter(|p| !p.is_empty()))
    }

    /// Store a photo for an archived row and drop the one it replaces
    #[allow(clippy::too_many_arguments)]
    fn replace_photo(
        &self,
        name: &ArchiveName,
        record_id: i64,
        source: &Path,
        owner: i64,
        entity: Option<i64>,
        label: String,
        columns: &[String],
    ) -> Result<Option<PhotoWarning>> {
        if !has(columns, "photo_path") {
            let warning = PhotoWarning::new(source.display().to_string(), format!("{} has no photo column", name));
            warn!("{}", warning);
            return Ok(Some(warning));
        }

        let previous = self.photo_of(name, record_id)?;
        let relative = match self.store.attach_photo(owner, &photo_scope(name, entity), &label, source) {
            Ok(relative) => relative,
            Err(warning) => return Ok(Some(warning)),
        };
        self.store.conn.execute(
            &format!("UPDATE {} SET photo_path = ?1 WHERE id = ?2", quote_ident(&name.to_string())),
            rusqlite::params![relative, record_id],
        )?;
        Ok(previous.and_then(|old| self.store.discard_photos([old.as_str()])))
    }
}

fn has(columns: &[String], column: &str) -> bool {
    columns.iter().any(|c| c == column)
}

/// File name for a photo: the customer or person name when one was given
fn label(values: &[(String, Value)]) -> String {
    values
        .iter()
        .find(|(column, _)| column == "customer_name" || column == "name")
        .and_then(|(_, value)| match value {
            Value::Text(t) if !t.trim().is_empty() => Some(t.clone()),
            _ => None,
        })
        .unwrap_or_else(|| "photo".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveEngine;
    use crate::entity::{Consumer, Period, SalesAgent, SalesProject};
    use crate::photo::LocalPhotoStore;
    use crate::table::LiveTable;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn closed_consumers(store: &Store, user: i64, names: &[&str], date: NaiveDate) -> ArchiveName {
        for name in names {
            store
                .insert(&Consumer::new(*name, Money::new(100_000), Period::new(2024, 3).unwrap()), user)
                .unwrap();
        }
        ArchiveEngine::new(store)
            .close_book_on(LiveTable::Consumers, user, date)
            .unwrap()
            .value
    }

    #[test]
    fn test_insert_maps_display_names() {
        let store = Store::open_in_memory().unwrap();
        let name = closed_consumers(&store, 1, &["A", "B"], day(2024, 3, 31));
        let editor = ArchiveEditor::new(&store);
        let before = editor.next_id(&name).unwrap();

        let id = editor
            .insert(
                &name,
                &[("Nama Konsumen", "Pak Harun"), ("Total Proyek", "2.500.000"), ("Bogus", "x")],
                None,
                None,
                None,
            )
            .unwrap()
            .value;
        assert_eq!(id, before);

        let snapshot = editor.load(&name).unwrap();
        let row = snapshot.rows.len() - 1;
        assert_eq!(snapshot.text(row, "name").as_deref(), Some("Pak Harun"));
        assert_eq!(snapshot.text(row, "total_projects").as_deref(), Some("Rp 2.500.000"));
        assert_eq!(snapshot.text(row, "user_id").as_deref(), Some("1"));
    }

    #[test]
    fn test_archive_ids_are_independent() {
        let store = Store::open_in_memory().unwrap();
        store.conn.execute_batch(
            "CREATE TABLE consumers_backup_1_2024_1_1_1 AS SELECT * FROM consumers WHERE 0;
             CREATE TABLE consumers_backup_1_2024_2_1_1 AS SELECT * FROM consumers WHERE 0;",
        ).unwrap();
        // live ids are already well past 1
        for _ in 0..5 {
            store.insert(&Consumer::new("live", Money::ZERO, Period::new(2024, 3).unwrap()), 1).unwrap();
        }

        let editor = ArchiveEditor::new(&store);
        let jan: ArchiveName = "consumers_backup_1_2024_1_1_1".parse().unwrap();
        let feb: ArchiveName = "consumers_backup_1_2024_2_1_1".parse().unwrap();
        assert_eq!(editor.next_id(&jan).unwrap(), 1);

        let a = editor.insert(&jan, &[("Nama Konsumen", "a")], None, None, None).unwrap().value;
        let b = editor.insert(&feb, &[("Nama Konsumen", "b")], None, None, None).unwrap().value;
        assert_eq!((a, b), (1, 1));
        assert_eq!(editor.next_id(&jan).unwrap(), 2);
    }

    #[test]
    fn test_old_archive_drops_new_column_until_migrated() {
        let store = Store::open_in_memory().unwrap();
        store
            .conn
            .execute_batch(
                "CREATE TABLE consumers_backup_1_2023_12_30_1 (
                    id INT, name TEXT, address TEXT, sales TEXT, job TEXT, total_projects TEXT,
                    worker TEXT, notes TEXT, year INT, month INT, user_id INT
                );",
            )
            .unwrap();
        let name: ArchiveName = "consumers_backup_1_2023_12_30_1".parse().unwrap();
        let editor = ArchiveEditor::new(&store);

        let first = editor
            .insert(&name, &[("Tanggal", "30/12/2023"), ("Nama Konsumen", "lama")], None, None, None)
            .unwrap()
            .value;
        assert_eq!(first, 1);
        let snapshot = editor.load(&name).unwrap();
        assert_eq!(snapshot.column_index("date"), None);
        assert_eq!(snapshot.text(0, "name").as_deref(), Some("lama"));

        migrate::ensure_archive_schema(&store.conn).unwrap();

        editor
            .insert(&name, &[("Tanggal", "31/12/2023"), ("Nama Konsumen", "baru")], None, None, None)
            .unwrap();
        let snapshot = editor.load(&name).unwrap();
        assert_eq!(snapshot.text(1, "date").as_deref(), Some("31/12/2023"));
        assert_eq!(snapshot.text(0, "date").as_deref(), Some(""));
    }

    #[test]
    fn test_update_and_delete() {
        let store = Store::open_in_memory().unwrap();
        let name = closed_consumers(&store, 1, &["A"], day(2024, 4, 1));
        let editor = ArchiveEditor::new(&store);
        let id = editor.load(&name).unwrap().id_of(0).unwrap();

        editor.update(&name, id, &[("Keterangan", "lunas"), ("Total Proyek", "Rp 750.000")], None).unwrap();
        let snapshot = editor.load(&name).unwrap();
        assert_eq!(snapshot.text(0, "notes").as_deref(), Some("lunas"));
        assert_eq!(snapshot.text(0, "total_projects").as_deref(), Some("Rp 750.000"));

        // nothing applicable: logged no-op
        assert!(editor.update(&name, id, &[("Komisi", "1")], None).unwrap().is_clean());

        assert!(matches!(
            editor.update(&name, 999, &[("Keterangan", "x")], None),
            Err(Error::NotFound(_))
        ));

        editor.delete(&name, id).unwrap();
        assert!(editor.load(&name).unwrap().rows.is_empty());
        assert_eq!(editor.next_id(&name).unwrap(), 1);
        assert!(matches!(editor.delete(&name, id), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_bad_money_rejected_without_writing() {
        let store = Store::open_in_memory().unwrap();
        let name = closed_consumers(&store, 1, &["A"], day(2024, 4, 1));
        let editor = ArchiveEditor::new(&store);

        let result = editor.insert(&name, &[("Nama Konsumen", "B"), ("Total Proyek", "banyak")], None, None, None);
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(editor.load(&name).unwrap().rows.len(), 1);
    }

    #[test]
    fn test_missing_archive_not_found() {
        let store = Store::open_in_memory().unwrap();
        let editor = ArchiveEditor::new(&store);
        let name: ArchiveName = "consumers_backup_1_2024_1_1_9".parse().unwrap();
        assert!(matches!(editor.load(&name), Err(Error::NotFound(_))));
        assert!(matches!(editor.next_id(&name), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_photo_in_per_entity_archive() {
        let tmp = TempDir::new().unwrap();
        let photos = LocalPhotoStore::new(tmp.path().join("photos"));
        let store = Store::open_in_memory().unwrap().with_photo_store(photos.clone());
        let src = tmp.path().join("a.png");
        std::fs::write(&src, b"img").unwrap();

        let sales = store.insert(&SalesAgent::new("Andi"), 1).unwrap();
        store.insert(&SalesProject::new(sales, "A", Period::new(2024, 3).unwrap()), 1).unwrap();
        let name = ArchiveEngine::new(&store)
            .close_book_for_entity_on(LiveTable::SalesProjects, sales, 1, day(2024, 3, 31))
            .unwrap()
            .value;

        let editor = ArchiveEditor::new(&store);
        let outcome = editor
            .insert(&name, &[("Nama Konsumen", "Bu Tini"), ("Komisi", "150.000")], Some(&src), None, None)
            .unwrap();
        assert!(outcome.is_clean());

        let snapshot = editor.load(&name).unwrap();
        let row = snapshot.rows.len() - 1;
        let path = snapshot.text(row, "photo_path").unwrap();
        assert_eq!(path, format!("1/{}/Bu_Tini.png", name));
        assert_eq!(snapshot.text(row, "sales_id"), Some(sales.to_string()));

        editor.delete(&name, outcome.value).unwrap();
        assert!(!photos.resolve(&path).exists());
    }
}
