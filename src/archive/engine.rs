//! Archive engine - closing books
//!
//! A close copies the selected live rows into a fresh archive table and
//! deletes them from the live table inside one transaction, so a failure
//! leaves the live table as it was. Photos are moved afterwards; a failed
//! move is reported as a [`PhotoWarning`] on the outcome.

use chrono::{Local, NaiveDate};
use rusqlite::{params_from_iter, OptionalExtension};
use tracing::{info, warn};
use crate::photo::{live_scope, PhotoWarning};
use crate::storage::{migrate, quote_ident, Store};
use crate::table::LiveTable;
use crate::{Error, Result, WriteOutcome};
use super::{photo_scope, ArchiveName};

/// Closes books and lists the resulting archives
pub struct ArchiveEngine<'a> {
    store: &'a Store,
}

impl<'a> ArchiveEngine<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Move all of a user's rows of `table` into a new archive dated today
    pub fn close_book(&self, table: LiveTable, user_id: i64) -> Result<WriteOutcome<ArchiveName>> {
        self.close_book_on(table, user_id, Local::now().date_naive())
    }

    /// [`close_book`](Self::close_book) with an explicit closing date
    pub fn close_book_on(&self, table: LiveTable, user_id: i64, date: NaiveDate) -> Result<WriteOutcome<ArchiveName>> {
        if !table.is_closable() {
            return Err(Error::validation(format!("{} cannot be closed", table)));
        }
        let name = self.snapshot(table, None, user_id, date)?;

        let mut warning = None;
        if table.has_photo() {
            for entity_id in self.archived_entities(&name)? {
                let moved = self.relocate_photos(&name, user_id, entity_id, &photo_scope(&name, Some(entity_id)));
                warning = warning.or(moved);
            }
        }
        Ok(WriteOutcome::with_warning(name, warning))
    }

    /// Move one sales agent's or worker's rows into a new archive dated today
    pub fn close_book_for_entity(
        &self,
        table: LiveTable,
        entity_id: i64,
        user_id: i64,
    ) -> Result<WriteOutcome<ArchiveName>> {
        self.close_book_for_entity_on(table, entity_id, user_id, Local::now().date_naive())
    }

    pub fn close_book_for_entity_on(
        &self,
        table: LiveTable,
        entity_id: i64,
        user_id: i64,
        date: NaiveDate,
    ) -> Result<WriteOutcome<ArchiveName>> {
        if !table.is_closable_per_entity() {
            return Err(Error::validation(format!("{} cannot be closed per entity", table)));
        }
        let name = self.snapshot(table, Some(entity_id), user_id, date)?;
        let warning = self.relocate_photos(&name, user_id, entity_id, &photo_scope(&name, None));
        Ok(WriteOutcome::with_warning(name, warning))
    }

    /// Whole-table archives of a user, newest first
    pub fn list_archives(&self, table: LiveTable, user_id: i64) -> Result<Vec<ArchiveName>> {
        self.archives_where(table, |name| name.user_id == user_id && name.entity_id.is_none())
    }

    /// Archives of one sales agent or worker, newest first
    pub fn list_archives_for_entity(&self, table: LiveTable, entity_id: i64, user_id: i64) -> Result<Vec<ArchiveName>> {
        self.archives_where(table, |name| name.user_id == user_id && name.entity_id == Some(entity_id))
    }

    /// Display label; per-entity archives are labelled with the person's name
    pub fn display_label(&self, name: &ArchiveName) -> Result<String> {
        let person = match (name.entity_id, name.table.parent_table()) {
            (Some(entity_id), Some(parent)) => self
                .store
                .conn
                .query_row(
                    &format!("SELECT name FROM {} WHERE id = ?1 AND user_id = ?2", quote_ident(parent.as_str())),
                    [entity_id, name.user_id],
                    |row| row.get::<_, Option<String>>(0),
                )
                .optional()?
                .flatten(),
            _ => None,
        };
        Ok(name.display_label(person.as_deref()))
    }

    fn archives_where(&self, table: LiveTable, keep: impl Fn(&ArchiveName) -> bool) -> Result<Vec<ArchiveName>> {
        let mut names: Vec<ArchiveName> = migrate::archive_tables(&self.store.conn, table)?
            .into_iter()
            .filter(|name| keep(name))
            .collect();
        names.sort_by(|a, b| b.chronological_key().cmp(&a.chronological_key()));
        Ok(names)
    }

    /// First free sequence number for this scope and day
    fn free_name(&self, table: LiveTable, entity_id: Option<i64>, user_id: i64, date: NaiveDate) -> Result<ArchiveName> {
        let first = match entity_id {
            Some(entity_id) => ArchiveName::for_entity(table, entity_id, user_id, date, 1),
            None => ArchiveName::whole(table, user_id, date, 1),
        };
        let mut sequence = 1;
        loop {
            let candidate = first.with_sequence(sequence);
            if !migrate::table_exists(&self.store.conn, &candidate.to_string())? {
                return Ok(candidate);
            }
            sequence += 1;
        }
    }

    /// Copy and delete the selected rows in one transaction
    fn snapshot(&self, table: LiveTable, entity_id: Option<i64>, user_id: i64, date: NaiveDate) -> Result<ArchiveName> {
        let (filter, bound) = match (entity_id, table.parent_key()) {
            (Some(entity_id), Some(key)) => (format!("user_id = ?1 AND {} = ?2", key), vec![user_id, entity_id]),
            _ => ("user_id = ?1".to_string(), vec![user_id]),
        };
        let live = quote_ident(table.as_str());

        let tx = self.store.conn.unchecked_transaction()?;
        let count: i64 = tx.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE {}", live, filter),
            params_from_iter(&bound),
            |row| row.get(0),
        )?;
        if count == 0 {
            return Err(Error::validation(format!("Nothing to close in {}", table)));
        }

        let name = self.free_name(table, entity_id, user_id, date)?;
        let archive = quote_ident(&name.to_string());
        tx.execute(&format!("CREATE TABLE {} AS SELECT * FROM {} WHERE 0", archive, live), [])?;
        let copied = tx.execute(
            &format!("INSERT INTO {} SELECT * FROM {} WHERE {}", archive, live, filter),
            params_from_iter(&bound),
        )?;
        let deleted = tx.execute(&format!("DELETE FROM {} WHERE {}", live, filter), params_from_iter(&bound))?;
        if copied != deleted {
            return Err(Error::Schema(format!(
                "Closing {} copied {} rows but deleted {}",
                table, copied, deleted
            )));
        }
        tx.commit()?;

        info!("Closed book: {} rows of {} moved to {}", copied, table, name);
        Ok(name)
    }

    /// Parent ids present in a fresh whole-table archive
    fn archived_entities(&self, name: &ArchiveName) -> Result<Vec<i64>> {
        let Some(key) = name.table.parent_key() else {
            return Ok(Vec::new());
        };
        let mut stmt = self.store.conn.prepare(&format!(
            "SELECT DISTINCT {} FROM {} WHERE {} IS NOT NULL",
            key,
            quote_ident(&name.to_string()),
            key
        ))?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    /// Move an entity's live photo directory under the archive and point
    /// the archived rows at the new location
    fn relocate_photos(&self, name: &ArchiveName, user_id: i64, entity_id: i64, target_scope: &str) -> Option<PhotoWarning> {
        let photos = self.store.photos()?;
        let source_scope = live_scope(name.table, entity_id);

        let (old_prefix, new_prefix) = match photos.move_scope(user_id, &source_scope, target_scope) {
            Ok(Some(prefixes)) => prefixes,
            Ok(None) => return None,
            Err(e) => {
                let warning = PhotoWarning::new(source_scope, e);
                warn!("Photos not moved after closing {}: {}", name, warning);
                return Some(warning);
            }
        };

        let key = name.table.parent_key().unwrap_or("id");
        let rewrite = self.store.conn.execute(
            &format!(
                "UPDATE {} SET photo_path = ?2 || substr(photo_path, length(?1) + 1) \
                 WHERE substr(photo_path, 1, length(?1)) = ?1 AND {} = ?3",
                quote_ident(&name.to_string()),
                key
            ),
            rusqlite::params![old_prefix, new_prefix, entity_id],
        );
        match rewrite {
            Ok(_) => None,
            Err(e) => {
                let warning = PhotoWarning::new(new_prefix, e);
                warn!("Photo paths in {} are stale: {}", name, warning);
                Some(warning)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveEditor;
    use crate::entity::{Consumer, Period, PeriodFilter, SalesAgent, SalesProject, Worker, WorkerProject};
    use crate::money::Money;
    use crate::photo::{LocalPhotoStore, PhotoStore};
    use tempfile::TempDir;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn march() -> Period {
        Period::new(2024, 3).unwrap()
    }

    #[test]
    fn test_march_close_scenario() {
        let user = 7;
        let store = Store::open_in_memory().unwrap();
        let mut consumer = Consumer::new("Bu Sari", Money::new(2_000_000), march());
        consumer.date = "04/03/2024".to_string();
        let id = store.insert(&consumer, user).unwrap();

        let engine = ArchiveEngine::new(&store);
        let closed = engine.close_book_on(LiveTable::Consumers, user, day(2024, 3, 28)).unwrap();
        assert!(closed.is_clean());
        assert_eq!(closed.value.to_string(), "consumers_backup_7_2024_3_28_1");

        let listed = engine.list_archives(LiveTable::Consumers, user).unwrap();
        assert_eq!(listed, vec![closed.value.clone()]);

        let snapshot = ArchiveEditor::new(&store).load(&closed.value).unwrap();
        assert_eq!(snapshot.rows.len(), 1);
        assert_eq!(snapshot.id_of(0), Some(id));
        assert_eq!(snapshot.text(0, "name").as_deref(), Some("Bu Sari"));
    }

    #[test]
    fn test_close_moves_exactly_the_users_rows() {
        let store = Store::open_in_memory().unwrap();
        for name in ["A", "B", "C"] {
            store.insert(&Consumer::new(name, Money::ZERO, march()), 1).unwrap();
        }
        store.insert(&Consumer::new("other user", Money::ZERO, march()), 2).unwrap();
        let before = store.list::<Consumer>(1, PeriodFilter::all()).unwrap();

        let engine = ArchiveEngine::new(&store);
        let name = engine.close_book_on(LiveTable::Consumers, 1, day(2024, 3, 31)).unwrap().value;

        let snapshot = ArchiveEditor::new(&store).load(&name).unwrap();
        let archived_ids: Vec<i64> = (0..snapshot.rows.len()).filter_map(|i| snapshot.id_of(i)).collect();
        let live_ids: Vec<i64> = before.iter().map(|c| c.id).collect();
        assert_eq!(archived_ids, live_ids);

        assert!(store.list::<Consumer>(1, PeriodFilter::all()).unwrap().is_empty());
        assert_eq!(store.list::<Consumer>(2, PeriodFilter::all()).unwrap().len(), 1);
    }

    #[test]
    fn test_same_day_closes_get_distinct_names() {
        let store = Store::open_in_memory().unwrap();
        let engine = ArchiveEngine::new(&store);
        let today = day(2024, 5, 2);

        store.insert(&Consumer::new("A", Money::ZERO, march()), 1).unwrap();
        let first = engine.close_book_on(LiveTable::Consumers, 1, today).unwrap().value;
        store.insert(&Consumer::new("B", Money::ZERO, march()), 1).unwrap();
        let second = engine.close_book_on(LiveTable::Consumers, 1, today).unwrap().value;

        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        assert_ne!(first, second);
        assert_eq!(engine.list_archives(LiveTable::Consumers, 1).unwrap(), vec![second, first]);
    }

    #[test]
    fn test_sequence_fills_first_gap() {
        let store = Store::open_in_memory().unwrap();
        store
            .conn
            .execute("CREATE TABLE consumers_backup_1_2024_5_2_2 (id INTEGER)", [])
            .unwrap();
        store.insert(&Consumer::new("A", Money::ZERO, march()), 1).unwrap();

        let engine = ArchiveEngine::new(&store);
        let name = engine.close_book_on(LiveTable::Consumers, 1, day(2024, 5, 2)).unwrap().value;
        assert_eq!(name.sequence, 1);

        store.insert(&Consumer::new("B", Money::ZERO, march()), 1).unwrap();
        let name = engine.close_book_on(LiveTable::Consumers, 1, day(2024, 5, 2)).unwrap().value;
        assert_eq!(name.sequence, 3);
    }

    #[test]
    fn test_empty_and_unclosable_tables_rejected() {
        let store = Store::open_in_memory().unwrap();
        let engine = ArchiveEngine::new(&store);

        assert!(matches!(
            engine.close_book_on(LiveTable::Consumers, 1, day(2024, 1, 1)),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            engine.close_book_on(LiveTable::Projects, 1, day(2024, 1, 1)),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            engine.close_book_for_entity_on(LiveTable::Consumers, 1, 1, day(2024, 1, 1)),
            Err(Error::Validation(_))
        ));
        assert!(engine.list_archives(LiveTable::Consumers, 1).unwrap().is_empty());
    }

    #[test]
    fn test_per_entity_close() {
        let store = Store::open_in_memory().unwrap();
        let andi = store.insert(&SalesAgent::new("Andi"), 1).unwrap();
        let budi = store.insert(&SalesAgent::new("Budi"), 1).unwrap();
        store.insert(&SalesProject::new(andi, "A1", march()), 1).unwrap();
        store.insert(&SalesProject::new(andi, "A2", march()), 1).unwrap();
        store.insert(&SalesProject::new(budi, "B1", march()), 1).unwrap();

        let engine = ArchiveEngine::new(&store);
        let name = engine
            .close_book_for_entity_on(LiveTable::SalesProjects, andi, 1, day(2024, 3, 9))
            .unwrap()
            .value;
        assert_eq!(name.to_string(), format!("sales_projects_backup_{}_1_2024_3_9_1", andi));

        assert!(store.list_by_parent::<SalesProject>(andi, 1).unwrap().is_empty());
        assert_eq!(store.list_by_parent::<SalesProject>(budi, 1).unwrap().len(), 1);

        assert_eq!(engine.list_archives_for_entity(LiveTable::SalesProjects, andi, 1).unwrap(), vec![name.clone()]);
        assert!(engine.list_archives_for_entity(LiveTable::SalesProjects, budi, 1).unwrap().is_empty());
        assert!(engine.list_archives(LiveTable::SalesProjects, 1).unwrap().is_empty());
        assert_eq!(engine.display_label(&name).unwrap(), "Andi 2024 March 9 (1)");
    }

    #[test]
    fn test_listing_does_not_mix_user_ids() {
        let store = Store::open_in_memory().unwrap();
        let engine = ArchiveEngine::new(&store);
        for user in [1, 12] {
            store.insert(&Consumer::new("x", Money::ZERO, march()), user).unwrap();
            engine.close_book_on(LiveTable::Consumers, user, day(2024, 3, 1)).unwrap();
        }

        let mine = engine.list_archives(LiveTable::Consumers, 1).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].user_id, 1);
    }

    #[test]
    fn test_entity_photos_follow_the_archive() {
        let tmp = TempDir::new().unwrap();
        let photos = LocalPhotoStore::new(tmp.path().join("photos"));
        let store = Store::open_in_memory().unwrap().with_photo_store(photos.clone());
        let src = tmp.path().join("a.jpg");
        std::fs::write(&src, b"img").unwrap();

        let tukang = store.insert(&Worker::new("Pak Anto"), 1).unwrap();
        store
            .insert_with_photo(&WorkerProject::new(tukang, "Bu Rina", march()), Some(&src), 1)
            .unwrap();

        let engine = ArchiveEngine::new(&store);
        let closed = engine
            .close_book_for_entity_on(LiveTable::WorkerProjects, tukang, 1, day(2024, 3, 30))
            .unwrap();
        assert!(closed.is_clean());

        let snapshot = ArchiveEditor::new(&store).load(&closed.value).unwrap();
        let path = snapshot.text(0, "photo_path").unwrap();
        assert_eq!(path, format!("1/{}/Bu_Rina.jpg", closed.value));
        assert!(photos.resolve(&path).exists());
    }

    #[test]
    fn test_whole_close_keeps_photo_scopes_apart() {
        let tmp = TempDir::new().unwrap();
        let photos = LocalPhotoStore::new(tmp.path().join("photos"));
        let store = Store::open_in_memory().unwrap().with_photo_store(photos.clone());
        let src = tmp.path().join("a.jpg");
        std::fs::write(&src, b"img").unwrap();

        let andi = store.insert(&SalesAgent::new("Andi"), 1).unwrap();
        let budi = store.insert(&SalesAgent::new("Budi"), 1).unwrap();
        store.insert_with_photo(&SalesProject::new(andi, "X", march()), Some(&src), 1).unwrap();
        store.insert_with_photo(&SalesProject::new(budi, "X", march()), Some(&src), 1).unwrap();

        let engine = ArchiveEngine::new(&store);
        let closed = engine.close_book_on(LiveTable::SalesProjects, 1, day(2024, 4, 1)).unwrap();
        assert!(closed.is_clean());

        let snapshot = ArchiveEditor::new(&store).load(&closed.value).unwrap();
        for row in 0..2 {
            let path = snapshot.text(row, "photo_path").unwrap();
            assert!(path.starts_with(&format!("1/{}_", closed.value)));
            assert!(photos.resolve(&path).exists());
        }
    }

    #[test]
    fn test_display_label_falls_back_only_for_missing_person() {
        let store = Store::open_in_memory().unwrap();
        let engine = ArchiveEngine::new(&store);
        let andi = store.insert(&SalesAgent::new("Andi"), 1).unwrap();

        let named = ArchiveName::for_entity(LiveTable::SalesProjects, andi, 1, day(2024, 8, 17), 3);
        assert!(engine.display_label(&named).unwrap().starts_with("Andi 2024"));

        let gone = ArchiveName::for_entity(LiveTable::SalesProjects, 99, 1, day(2024, 8, 17), 3);
        assert!(engine.display_label(&gone).unwrap().starts_with("2024"));

        store.conn.execute("DROP TABLE sales", []).unwrap();
        assert!(matches!(engine.display_label(&named), Err(Error::Storage(_))));
    }

    /// Stores photos locally but cannot rename directories
    struct FullDisk(LocalPhotoStore);

    impl PhotoStore for FullDisk {
        fn store(&self, user_id: i64, scope: &str, display_name: &str, source: &std::path::Path) -> Result<String> {
            self.0.store(user_id, scope, display_name, source)
        }

        fn move_scope(&self, _user_id: i64, _from: &str, _to: &str) -> Result<Option<(String, String)>> {
            Err(Error::Io(std::io::Error::other("disk full")))
        }

        fn remove(&self, relative: &str) -> Result<()> {
            self.0.remove(relative)
        }
    }

    #[test]
    fn test_failed_photo_move_still_closes() {
        let tmp = TempDir::new().unwrap();
        let photos = LocalPhotoStore::new(tmp.path().join("photos"));
        let store = Store::open_in_memory().unwrap().with_photo_store(FullDisk(photos.clone()));
        let src = tmp.path().join("a.jpg");
        std::fs::write(&src, b"img").unwrap();

        let andi = store.insert(&SalesAgent::new("Andi"), 1).unwrap();
        let inserted = store
            .insert_with_photo(&SalesProject::new(andi, "Pak Dedi", march()), Some(&src), 1)
            .unwrap();
        assert!(inserted.is_clean());

        let engine = ArchiveEngine::new(&store);
        let closed = engine
            .close_book_for_entity_on(LiveTable::SalesProjects, andi, 1, day(2024, 3, 30))
            .unwrap();

        let warning = closed.photo_warning.clone().unwrap();
        assert_eq!(warning.path, "sales_projects_1");
        assert!(warning.reason.contains("disk full"));

        assert!(store.list_by_parent::<SalesProject>(andi, 1).unwrap().is_empty());
        let snapshot = ArchiveEditor::new(&store).load(&closed.value).unwrap();
        assert_eq!(snapshot.rows.len(), 1);
        // the row still points at the directory that was not moved
        let path = snapshot.text(0, "photo_path").unwrap();
        assert!(path.starts_with("1/sales_projects_1/"));
        assert!(photos.resolve(&path).exists());
    }
}
