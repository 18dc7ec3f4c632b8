//! Entity repository - user-scoped CRUD over the live tables
//!
//! Every statement filters on `user_id`. An id that exists but belongs to
//! another user behaves exactly like an id that does not exist.

use std::path::Path;
use rusqlite::{params_from_iter, OptionalExtension};
use rusqlite::types::Value;
use tracing::{debug, info};
use crate::entity::{PeriodFilter, Record};
use crate::photo::live_scope;
use crate::table::LiveTable;
use crate::{Error, Result, WriteOutcome};
use super::quote_ident;
use super::sqlite::Store;

fn select_list(table: LiveTable) -> String {
    std::iter::once("id")
        .chain(table.data_columns().iter().copied())
        .collect::<Vec<_>>()
        .join(", ")
}

impl Store {
    // ========== Insert ==========

    /// Insert a row for `user_id` and return its new id
    pub fn insert<R: Record>(&self, record: &R, user_id: i64) -> Result<i64> {
        self.check_write(record, user_id, None)?;

        let table = R::TABLE;
        let columns = table.data_columns();
        let placeholders: Vec<String> = (1..=columns.len() + 1).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}, user_id) VALUES ({})",
            quote_ident(table.as_str()),
            columns.join(", "),
            placeholders.join(", ")
        );

        let mut values = record.column_values();
        values.push(Value::Integer(user_id));
        self.conn.execute(&sql, params_from_iter(values))?;

        let id = self.conn.last_insert_rowid();
        debug!("Inserted {} #{} for user {}", table, id, user_id);
        Ok(id)
    }

    /// Insert a sales or worker project, copying `photo` into the parent's
    /// photo scope. The row is kept even if the photo cannot be stored.
    pub fn insert_with_photo<R: Record>(
        &self,
        record: &R,
        photo: Option<&Path>,
        user_id: i64,
    ) -> Result<WriteOutcome<i64>> {
        Self::require_photo_table(R::TABLE)?;
        let id = self.insert(record, user_id)?;
        let Some(source) = photo else {
            return Ok(WriteOutcome::clean(id));
        };

        let warning = self.replace_photo::<R>(id, record, source, user_id, None)?;
        Ok(WriteOutcome::with_warning(id, warning))
    }

    // ========== Read ==========

    /// All rows of a user, optionally restricted to one period.
    ///
    /// A filter with only a year or only a month does not filter.
    pub fn list<R: Record>(&self, user_id: i64, filter: PeriodFilter) -> Result<Vec<R>> {
        let table = R::TABLE;
        let mut sql = format!(
            "SELECT {} FROM {} WHERE user_id = ?1",
            select_list(table),
            quote_ident(table.as_str())
        );
        let mut values = vec![Value::Integer(user_id)];

        if let (true, Some(period)) = (table.has_period(), filter.effective()) {
            sql.push_str(" AND year = ?2 AND month = ?3");
            values.push(Value::Integer(period.year.into()));
            values.push(Value::Integer(period.month.into()));
        }
        sql.push_str(" ORDER BY id");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), |row| R::from_row(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Rows of a user that belong to one sales agent, worker or project
    pub fn list_by_parent<R: Record>(&self, parent_id: i64, user_id: i64) -> Result<Vec<R>> {
        let table = R::TABLE;
        let parent_key = table
            .parent_key()
            .ok_or_else(|| Error::validation(format!("{} has no parent", table)))?;

        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?1 AND user_id = ?2 ORDER BY id",
            select_list(table),
            quote_ident(table.as_str()),
            parent_key
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([parent_id, user_id], |row| R::from_row(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// One row by id
    pub fn get<R: Record>(&self, id: i64, user_id: i64) -> Result<R> {
        let table = R::TABLE;
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?1 AND user_id = ?2",
            select_list(table),
            quote_ident(table.as_str())
        );
        self.conn
            .query_row(&sql, [id, user_id], |row| R::from_row(row))
            .optional()?
            .ok_or_else(|| Error::not_found(format!("{} #{}", table, id)))
    }

    /// Stored photo path of a sales or worker project
    pub fn photo_path(&self, table: LiveTable, id: i64, user_id: i64) -> Result<Option<String>> {
        Self::require_photo_table(table)?;
        let path: Option<Option<String>> = self
            .conn
            .query_row(
                &format!(
                    "SELECT photo_path FROM {} WHERE id = ?1 AND user_id = ?2",
                    quote_ident(table.as_str())
                ),
                [id, user_id],
                |row| row.get(0),
            )
            .optional()?;
        match path {
            Some(path) => Ok(path.filter(|p| !p.is_empty())),
            None => Err(Error::not_found(format!("{} #{}", table, id))),
        }
    }

    // ========== Update ==========

    /// Rewrite the editable columns of a row. Parent key, period and photo
    /// stay as they are.
    pub fn update<R: Record>(&self, id: i64, record: &R, user_id: i64) -> Result<()> {
        self.check_write(record, user_id, Some(id))?;

        let table = R::TABLE;
        let editable = table.editable_columns();
        let values = record.column_values();
        let mut bound: Vec<Value> = table
            .data_columns()
            .iter()
            .zip(values)
            .filter(|(column, _)| editable.contains(*column))
            .map(|(_, value)| value)
            .collect();

        let assignments: Vec<String> = editable
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{} = ?{}", column, i + 1))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?{} AND user_id = ?{}",
            quote_ident(table.as_str()),
            assignments.join(", "),
            editable.len() + 1,
            editable.len() + 2
        );
        bound.push(Value::Integer(id));
        bound.push(Value::Integer(user_id));

        let affected = self.conn.execute(&sql, params_from_iter(bound))?;
        if affected == 0 {
            return Err(Error::not_found(format!("{} #{}", table, id)));
        }
        Ok(())
    }

    /// Update a sales or worker project and, if given, swap its photo
    pub fn update_with_photo<R: Record>(
        &self,
        id: i64,
        record: &R,
        photo: Option<&Path>,
        user_id: i64,
    ) -> Result<WriteOutcome<()>> {
        Self::require_photo_table(R::TABLE)?;
        self.update(id, record, user_id)?;
        let Some(source) = photo else {
            return Ok(WriteOutcome::clean(()));
        };

        let previous = self.photo_path(R::TABLE, id, user_id)?;
        let warning = self.replace_photo::<R>(id, record, source, user_id, previous)?;
        Ok(WriteOutcome::with_warning((), warning))
    }

    // ========== Delete ==========

    /// Delete a row and, for sales agents, workers and projects, the rows
    /// that belong to it. Photos of deleted rows are removed afterwards.
    pub fn delete<R: Record>(&self, id: i64, user_id: i64) -> Result<WriteOutcome<()>> {
        let table = R::TABLE;
        let tx = self.conn.unchecked_transaction()?;
        let mut photos = Vec::new();

        if table.has_photo() {
            match self.photo_path(table, id, user_id) {
                Ok(path) => photos.extend(path),
                // reported by the delete below
                Err(Error::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let mut cascaded = 0;
        if let Some(child) = table.cascade_child() {
            let parent_key = child.parent_key().unwrap_or("id");
            if child.has_photo() {
                let mut stmt = tx.prepare(&format!(
                    "SELECT photo_path FROM {} WHERE {} = ?1 AND user_id = ?2 AND photo_path != ''",
                    quote_ident(child.as_str()),
                    parent_key
                ))?;
                let paths = stmt
                    .query_map([id, user_id], |row| row.get::<_, Option<String>>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                photos.extend(paths.into_iter().flatten());
            }
            cascaded = tx.execute(
                &format!(
                    "DELETE FROM {} WHERE {} = ?1 AND user_id = ?2",
                    quote_ident(child.as_str()),
                    parent_key
                ),
                [id, user_id],
            )?;
        }

        let affected = tx.execute(
            &format!("DELETE FROM {} WHERE id = ?1 AND user_id = ?2", quote_ident(table.as_str())),
            [id, user_id],
        )?;
        if affected == 0 {
            // dropping the transaction rolls back the cascade
            return Err(Error::not_found(format!("{} #{}", table, id)));
        }
        tx.commit()?;

        if cascaded > 0 {
            info!("Deleted {} #{} with {} dependent rows", table, id, cascaded);
        }
        let warning = self.discard_photos(photos.iter().map(String::as_str));
        Ok(WriteOutcome::with_warning((), warning))
    }

    // ========== Helpers ==========

    /// Business rules, parent ownership and project name uniqueness
    fn check_write<R: Record>(&self, record: &R, user_id: i64, updating: Option<i64>) -> Result<()> {
        record.validate()?;
        let table = R::TABLE;

        if let (Some(parent), Some(parent_id)) = (table.parent_table(), record.parent_id()) {
            if updating.is_none() && !self.owns(parent, parent_id, user_id)? {
                return Err(Error::not_found(format!("{} #{}", parent, parent_id)));
            }
        }

        if table == LiveTable::Projects {
            self.ensure_unique_project_name(&record.display_label(), user_id, updating)?;
        }
        Ok(())
    }

    fn owns(&self, table: LiveTable, id: i64, user_id: i64) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                &format!("SELECT 1 FROM {} WHERE id = ?1 AND user_id = ?2", quote_ident(table.as_str())),
                [id, user_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Project names are unique per user, ignoring case
    fn ensure_unique_project_name(&self, name: &str, user_id: i64, except: Option<i64>) -> Result<()> {
        let wanted = name.trim().to_lowercase();
        let mut stmt = self.conn.prepare("SELECT id, name FROM projects WHERE user_id = ?1")?;
        let existing = stmt
            .query_map([user_id], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let taken = existing.iter().any(|(id, other)| {
            Some(*id) != except && other.as_deref().map(|o| o.trim().to_lowercase()) == Some(wanted.clone())
        });
        if taken {
            return Err(Error::validation(format!("Project name already exists: {}", name.trim())));
        }
        Ok(())
    }

    fn require_photo_table(table: LiveTable) -> Result<()> {
        if !table.has_photo() {
            return Err(Error::validation(format!("{} rows have no photo", table)));
        }
        Ok(())
    }

    /// Store `source` for row `id`, point the row at it and drop `previous`
    fn replace_photo<R: Record>(
        &self,
        id: i64,
        record: &R,
        source: &Path,
        user_id: i64,
        previous: Option<String>,
    ) -> Result<Option<crate::PhotoWarning>> {
        let scope = live_scope(R::TABLE, record.parent_id().unwrap_or(id));
        let relative = match self.attach_photo(user_id, &scope, &record.display_label(), source) {
            Ok(relative) => relative,
            Err(warning) => return Ok(Some(warning)),
        };

        self.conn.execute(
            &format!(
                "UPDATE {} SET photo_path = ?1 WHERE id = ?2 AND user_id = ?3",
                quote_ident(R::TABLE.as_str())
            ),
            rusqlite::params![relative, id, user_id],
        )?;

        Ok(previous.and_then(|old| self.discard_photos([old.as_str()])))
    }
}
