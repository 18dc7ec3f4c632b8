//! Archive table names
//!
//! Format:
//! - whole table: `<table>_backup_<user>_<year>_<month>_<day>_<seq>`
//! - one entity:  `<table>_backup_<entity>_<user>_<year>_<month>_<day>_<seq>`
//!
//! Examples:
//! - `consumers_backup_3_2024_3_15_1`
//! - `sales_projects_backup_12_3_2024_3_15_2`
//!
//! Date and sequence are always the last four `_`-separated segments,
//! read positionally from the end.

use crate::table::LiveTable;
use crate::{Error, Result};
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static ARCHIVE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<family>[a-z_]+?)_backup_(?P<ids>.+)_(?P<year>\d+)_(?P<month>\d+)_(?P<day>\d+)_(?P<seq>\d+)$")
        .expect("archive name pattern is valid")
});

/// Parsed name of an archive table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveName {
    /// Live table the rows came from
    pub table: LiveTable,
    /// Sales agent or worker id for per-entity closes
    pub entity_id: Option<i64>,
    pub user_id: i64,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    /// 1-based counter separating closes on the same day
    pub sequence: u32,
}

impl ArchiveName {
    /// Name for closing the whole table for a user
    pub fn whole(table: LiveTable, user_id: i64, date: NaiveDate, sequence: u32) -> Self {
        Self {
            table,
            entity_id: None,
            user_id,
            year: date.year(),
            month: date.month(),
            day: date.day(),
            sequence,
        }
    }

    /// Name for closing one sales agent's or worker's rows
    pub fn for_entity(table: LiveTable, entity_id: i64, user_id: i64, date: NaiveDate, sequence: u32) -> Self {
        Self {
            entity_id: Some(entity_id),
            ..Self::whole(table, user_id, date, sequence)
        }
    }

    /// Parse an archive table name
    pub fn parse(name: &str) -> Result<Self> {
        let invalid = || Error::validation(format!("Not an archive name: {}", name));
        let caps = ARCHIVE_NAME.captures(name).ok_or_else(invalid)?;

        let table: LiveTable = caps["family"].parse().map_err(|_| invalid())?;
        if caps["family"] != *table.as_str() {
            return Err(invalid());
        }

        let ids: Vec<i64> = caps["ids"]
            .split('_')
            .map(|s| s.parse::<i64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| invalid())?;
        let (entity_id, user_id) = match ids.as_slice() {
            [user] => (None, *user),
            [entity, user] => (Some(*entity), *user),
            _ => return Err(invalid()),
        };

        Ok(Self {
            table,
            entity_id,
            user_id,
            year: caps["year"].parse().map_err(|_| invalid())?,
            month: caps["month"].parse().map_err(|_| invalid())?,
            day: caps["day"].parse().map_err(|_| invalid())?,
            sequence: caps["seq"].parse().map_err(|_| invalid())?,
        })
    }

    /// Whether this archive holds a single entity's rows
    pub fn is_per_entity(&self) -> bool {
        self.entity_id.is_some()
    }

    /// Same archive scope and day with a different sequence number
    pub fn with_sequence(&self, sequence: u32) -> Self {
        Self { sequence, ..self.clone() }
    }

    /// Ordering key, oldest first
    pub fn chronological_key(&self) -> (i32, u32, u32, u32) {
        (self.year, self.month, self.day, self.sequence)
    }

    pub fn date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
    }

    /// Human label, e.g. `Konsumen 2024 March 5 (1)` or `Pak Budi 2024 March 5 (2)`
    pub fn display_label(&self, person: Option<&str>) -> String {
        let month_name = NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .map(|d| d.format("%B").to_string())
            .unwrap_or_else(|| self.month.to_string());
        let when = format!("{} {} {} ({})", self.year, month_name, self.day, self.sequence);
        match (self.table, person) {
            (LiveTable::Consumers, _) => format!("Konsumen {}", when),
            (_, Some(person)) => format!("{} {}", person, when),
            (_, None) => when,
        }
    }
}

impl fmt::Display for ArchiveName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.table.archive_prefix())?;
        if let Some(entity_id) = self.entity_id {
            write!(f, "{}_", entity_id)?;
        }
        write!(
            f,
            "{}_{}_{}_{}_{}",
            self.user_id, self.year, self.month, self.day, self.sequence
        )
    }
}

impl FromStr for ArchiveName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for ArchiveName {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ArchiveName {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ArchiveName::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_whole_table_format() {
        let name = ArchiveName::whole(LiveTable::Consumers, 3, day(2024, 3, 5), 1);
        assert_eq!(name.to_string(), "consumers_backup_3_2024_3_5_1");
        assert_eq!(ArchiveName::parse(&name.to_string()).unwrap(), name);
    }

    #[test]
    fn test_per_entity_format() {
        let name = ArchiveName::for_entity(LiveTable::SalesProjects, 12, 3, day(2024, 11, 30), 2);
        assert_eq!(name.to_string(), "sales_projects_backup_12_3_2024_11_30_2");

        let parsed = ArchiveName::parse("sales_projects_backup_12_3_2024_11_30_2").unwrap();
        assert_eq!(parsed.table, LiveTable::SalesProjects);
        assert_eq!(parsed.entity_id, Some(12));
        assert_eq!(parsed.user_id, 3);
        assert_eq!(parsed.chronological_key(), (2024, 11, 30, 2));
    }

    #[test]
    fn test_date_is_read_from_the_end() {
        // numeric ids look like dates; the last four segments still win
        let parsed = ArchiveName::parse("worker_projects_backup_2024_12_2024_1_2_3").unwrap();
        assert_eq!(parsed.entity_id, Some(2024));
        assert_eq!(parsed.user_id, 12);
        assert_eq!((parsed.year, parsed.month, parsed.day, parsed.sequence), (2024, 1, 2, 3));
    }

    #[test]
    fn test_rejects_non_archives() {
        assert!(ArchiveName::parse("consumers").is_err());
        assert!(ArchiveName::parse("consumers_backup_notes").is_err());
        assert!(ArchiveName::parse("users_backup_1_2024_1_1_1").is_err());
        assert!(ArchiveName::parse("consumers_backup_1_2_3_2024_1_1_1").is_err());
        assert!(ArchiveName::parse("consumers_backup_x_2024_1_1_1").is_err());
    }

    #[test]
    fn test_display_label() {
        let name = ArchiveName::whole(LiveTable::Consumers, 1, day(2024, 3, 5), 1);
        assert_eq!(name.display_label(None), "Konsumen 2024 March 5 (1)");

        let name = ArchiveName::for_entity(LiveTable::WorkerProjects, 2, 1, day(2024, 8, 17), 3);
        assert_eq!(name.display_label(Some("Pak Budi")), "Pak Budi 2024 August 17 (3)");
        assert_eq!(name.display_label(None), "2024 August 17 (3)");
    }
}
