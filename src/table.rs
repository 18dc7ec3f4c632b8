//! Table descriptors - the closed set of live tables
//!
//! Every query that needs a table name at runtime resolves it through
//! [`LiveTable`] first, so no caller-supplied string ever reaches SQL text.
//! Each descriptor knows its storage columns, its parent key (if any),
//! and the display-name mapping used by the presentation layer.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The live tables of the bookkeeping database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveTable {
    /// Customers, closed wholesale per period
    Consumers,
    /// Sales agents
    Sales,
    /// Projects brought in by a sales agent
    SalesProjects,
    /// Workers (tukang)
    Tukang,
    /// Projects carried out by a worker
    WorkerProjects,
    /// Construction projects
    Projects,
    /// Material usage per project
    MaterialsUsage,
}

const CONSUMER_MAPPING: &[(&str, &str)] = &[
    ("Tanggal", "date"),
    ("Nama Konsumen", "name"),
    ("Alamat", "address"),
    ("Sales", "sales"),
    ("Pekerjaan", "job"),
    ("Total Proyek", "total_projects"),
    ("Tukang", "worker"),
    ("Keterangan", "notes"),
];

const SALES_PROJECT_MAPPING: &[(&str, &str)] = &[
    ("Nama Konsumen", "customer_name"),
    ("Alamat", "address"),
    ("Pekerjaan", "job"),
    ("Total Proyek", "total_project"),
    ("Komisi", "commission"),
    ("KB", "kb"),
    ("Keterangan", "notes"),
];

const WORKER_PROJECT_MAPPING: &[(&str, &str)] = &[
    ("Nama Konsumen", "customer_name"),
    ("Alamat", "address"),
    ("Pekerjaan", "job"),
    ("Ukuran", "size"),
    ("KB", "kb"),
    ("Keterangan", "notes"),
];

const PERSON_MAPPING: &[(&str, &str)] = &[("Nama", "name")];

const PROJECT_MAPPING: &[(&str, &str)] = &[
    ("Nama Proyek", "name"),
    ("Nama Sales", "sales_name"),
    ("Nama Tukang", "worker_name"),
    ("Tanggal Mulai", "start_date"),
    ("Tanggal Selesai", "end_date"),
    ("Total Proyek", "total_project"),
    ("DP", "dp"),
];

const MATERIAL_MAPPING: &[(&str, &str)] = &[
    ("Tanggal", "date"),
    ("Nama Barang", "item_name"),
    ("Jumlah", "quantity"),
    ("Harga Satuan", "unit_price"),
    ("Total", "total"),
    ("Keterangan", "notes"),
];

impl LiveTable {
    /// Get the storage name of the table
    pub fn as_str(&self) -> &'static str {
        match self {
            LiveTable::Consumers => "consumers",
            LiveTable::Sales => "sales",
            LiveTable::SalesProjects => "sales_projects",
            LiveTable::Tukang => "tukang",
            LiveTable::WorkerProjects => "worker_projects",
            LiveTable::Projects => "projects",
            LiveTable::MaterialsUsage => "materials_usage",
        }
    }

    /// Get all live tables
    pub fn all() -> &'static [LiveTable] {
        &[
            LiveTable::Consumers,
            LiveTable::Sales,
            LiveTable::SalesProjects,
            LiveTable::Tukang,
            LiveTable::WorkerProjects,
            LiveTable::Projects,
            LiveTable::MaterialsUsage,
        ]
    }

    /// Storage columns other than `id` and `user_id`, in current schema order
    pub fn data_columns(&self) -> &'static [&'static str] {
        match self {
            LiveTable::Consumers => &[
                "date", "name", "address", "sales", "job", "total_projects", "worker", "notes", "year", "month",
            ],
            LiveTable::Sales | LiveTable::Tukang => &["name"],
            LiveTable::SalesProjects => &[
                "sales_id", "customer_name", "address", "job", "total_project", "commission", "kb", "notes",
                "year", "month", "photo_path",
            ],
            LiveTable::WorkerProjects => &[
                "tukang_id", "customer_name", "address", "job", "size", "kb", "notes", "year", "month",
                "photo_path",
            ],
            LiveTable::Projects => &[
                "name", "sales_name", "worker_name", "start_date", "end_date", "total_project", "dp",
            ],
            LiveTable::MaterialsUsage => &[
                "project_id", "date", "item_name", "quantity", "unit_price", "total", "notes",
            ],
        }
    }

    /// Columns rewritten by an update. Parent keys, periods and photos are
    /// fixed at insert time (photos go through their own path).
    pub fn editable_columns(&self) -> Vec<&'static str> {
        self.data_columns()
            .iter()
            .copied()
            .filter(|c| Some(*c) != self.parent_key())
            .filter(|c| !matches!(*c, "year" | "month" | "photo_path"))
            .collect()
    }

    /// Columns holding rupiah amounts
    pub fn money_columns(&self) -> &'static [&'static str] {
        match self {
            LiveTable::Consumers => &["total_projects"],
            LiveTable::SalesProjects => &["total_project", "commission", "kb"],
            LiveTable::WorkerProjects => &["kb"],
            LiveTable::Projects => &["total_project", "dp"],
            LiveTable::MaterialsUsage => &["unit_price", "total"],
            LiveTable::Sales | LiveTable::Tukang => &[],
        }
    }

    /// Foreign-key-like column pointing at the owning entity
    pub fn parent_key(&self) -> Option<&'static str> {
        match self {
            LiveTable::SalesProjects => Some("sales_id"),
            LiveTable::WorkerProjects => Some("tukang_id"),
            LiveTable::MaterialsUsage => Some("project_id"),
            _ => None,
        }
    }

    /// Table the parent key points into
    pub fn parent_table(&self) -> Option<LiveTable> {
        match self {
            LiveTable::SalesProjects => Some(LiveTable::Sales),
            LiveTable::WorkerProjects => Some(LiveTable::Tukang),
            LiveTable::MaterialsUsage => Some(LiveTable::Projects),
            _ => None,
        }
    }

    /// Table whose rows are deleted along with a row of this table
    pub fn cascade_child(&self) -> Option<LiveTable> {
        match self {
            LiveTable::Sales => Some(LiveTable::SalesProjects),
            LiveTable::Tukang => Some(LiveTable::WorkerProjects),
            LiveTable::Projects => Some(LiveTable::MaterialsUsage),
            _ => None,
        }
    }

    /// Whether rows carry a year/month period
    pub fn has_period(&self) -> bool {
        matches!(self, LiveTable::Consumers | LiveTable::SalesProjects | LiveTable::WorkerProjects)
    }

    /// Whether rows may reference a stored photo
    pub fn has_photo(&self) -> bool {
        matches!(self, LiveTable::SalesProjects | LiveTable::WorkerProjects)
    }

    /// Whether the whole table can be closed for a user
    pub fn is_closable(&self) -> bool {
        self.has_period()
    }

    /// Whether the table can be closed for one sales agent or worker
    pub fn is_closable_per_entity(&self) -> bool {
        matches!(self, LiveTable::SalesProjects | LiveTable::WorkerProjects)
    }

    /// Display name → storage column mapping for this table family
    pub fn column_mapping(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            LiveTable::Consumers => CONSUMER_MAPPING,
            LiveTable::Sales | LiveTable::Tukang => PERSON_MAPPING,
            LiveTable::SalesProjects => SALES_PROJECT_MAPPING,
            LiveTable::WorkerProjects => WORKER_PROJECT_MAPPING,
            LiveTable::Projects => PROJECT_MAPPING,
            LiveTable::MaterialsUsage => MATERIAL_MAPPING,
        }
    }

    /// Translate a display field name to its storage column.
    ///
    /// Names without a mapping pass through unchanged, so storage names
    /// are accepted as-is.
    pub fn storage_column<'a>(&self, field: &'a str) -> &'a str {
        self.column_mapping()
            .iter()
            .find(|(display, _)| *display == field)
            .map(|(_, column)| *column)
            .unwrap_or(field)
    }

    /// Reverse lookup for table headers
    pub fn display_name<'a>(&self, column: &'a str) -> &'a str {
        self.column_mapping()
            .iter()
            .find(|(_, storage)| *storage == column)
            .map(|(display, _)| *display)
            .unwrap_or(column)
    }

    /// Prefix shared by every archive table of this family
    pub fn archive_prefix(&self) -> String {
        format!("{}_backup_", self.as_str())
    }
}

impl FromStr for LiveTable {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "consumers" | "consumer" | "konsumen" => Ok(LiveTable::Consumers),
            "sales" => Ok(LiveTable::Sales),
            "sales_projects" | "sales-projects" => Ok(LiveTable::SalesProjects),
            "tukang" | "workers" | "worker" => Ok(LiveTable::Tukang),
            "worker_projects" | "worker-projects" => Ok(LiveTable::WorkerProjects),
            "projects" | "project" | "proyek" => Ok(LiveTable::Projects),
            "materials_usage" | "materials" | "material" => Ok(LiveTable::MaterialsUsage),
            _ => Err(crate::Error::Validation(format!("Unknown table: {}", s))),
        }
    }
}

impl std::fmt::Display for LiveTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_roundtrip() {
        for table in LiveTable::all() {
            let parsed: LiveTable = table.as_str().parse().unwrap();
            assert_eq!(*table, parsed);
        }
    }

    #[test]
    fn test_unknown_table_rejected() {
        assert!(matches!("users".parse::<LiveTable>(), Err(crate::Error::Validation(_))));
        assert!("consumers; DROP TABLE sales".parse::<LiveTable>().is_err());
    }

    #[test]
    fn test_mapping_translates_and_passes_through() {
        let t = LiveTable::SalesProjects;
        assert_eq!(t.storage_column("Nama Konsumen"), "customer_name");
        assert_eq!(t.storage_column("Komisi"), "commission");
        assert_eq!(t.storage_column("notes"), "notes");
        assert_eq!(LiveTable::WorkerProjects.storage_column("Ukuran"), "size");
        assert_eq!(LiveTable::Consumers.display_name("total_projects"), "Total Proyek");
    }

    #[test]
    fn test_mapped_columns_exist_in_schema() {
        for table in LiveTable::all() {
            for (_, column) in table.column_mapping() {
                assert!(table.data_columns().contains(column), "{} lacks {}", table, column);
            }
            for column in table.money_columns() {
                assert!(table.data_columns().contains(column));
            }
        }
    }

    #[test]
    fn test_parent_and_cascade_agree() {
        for table in LiveTable::all() {
            if let Some(child) = table.cascade_child() {
                assert_eq!(child.parent_table(), Some(*table));
                assert!(child.parent_key().is_some());
            }
        }
    }

    #[test]
    fn test_editable_columns_skip_keys_and_period() {
        let cols = LiveTable::SalesProjects.editable_columns();
        assert!(!cols.contains(&"sales_id"));
        assert!(!cols.contains(&"year"));
        assert!(!cols.contains(&"photo_path"));
        assert!(cols.contains(&"commission"));
    }
}
