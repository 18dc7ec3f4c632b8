//! Database schema definitions

use crate::table::LiveTable;

/// Column definitions of one table, in storage order.
pub type ColumnDefs = &'static [(&'static str, &'static str)];

const CONSUMERS_COLUMNS: ColumnDefs = &[
    ("id", "INTEGER PRIMARY KEY"),
    ("date", "TEXT DEFAULT ''"),
    ("name", "TEXT"),
    ("address", "TEXT"),
    ("sales", "TEXT"),
    ("job", "TEXT"),
    ("total_projects", "TEXT"),
    ("worker", "TEXT"),
    ("notes", "TEXT"),
    ("year", "INTEGER"),
    ("month", "INTEGER"),
    ("user_id", "INTEGER"),
];

const SALES_COLUMNS: ColumnDefs = &[
    ("id", "INTEGER PRIMARY KEY"),
    ("name", "TEXT"),
    ("user_id", "INTEGER"),
];

const SALES_PROJECTS_COLUMNS: ColumnDefs = &[
    ("id", "INTEGER PRIMARY KEY"),
    ("sales_id", "INTEGER REFERENCES sales (id)"),
    ("customer_name", "TEXT"),
    ("address", "TEXT"),
    ("job", "TEXT"),
    ("total_project", "TEXT"),
    ("commission", "TEXT"),
    ("kb", "TEXT"),
    ("notes", "TEXT"),
    ("year", "INTEGER"),
    ("month", "INTEGER"),
    ("user_id", "INTEGER"),
    ("photo_path", "TEXT DEFAULT ''"),
];

const TUKANG_COLUMNS: ColumnDefs = &[
    ("id", "INTEGER PRIMARY KEY"),
    ("name", "TEXT"),
    ("user_id", "INTEGER"),
];

const WORKER_PROJECTS_COLUMNS: ColumnDefs = &[
    ("id", "INTEGER PRIMARY KEY"),
    ("tukang_id", "INTEGER REFERENCES tukang (id)"),
    ("customer_name", "TEXT"),
    ("address", "TEXT"),
    ("job", "TEXT"),
    ("size", "TEXT"),
    ("kb", "TEXT"),
    ("notes", "TEXT"),
    ("year", "INTEGER"),
    ("month", "INTEGER"),
    ("user_id", "INTEGER"),
    ("photo_path", "TEXT DEFAULT ''"),
];

const PROJECTS_COLUMNS: ColumnDefs = &[
    ("id", "INTEGER PRIMARY KEY"),
    ("name", "TEXT"),
    ("sales_name", "TEXT"),
    ("worker_name", "TEXT"),
    ("start_date", "TEXT"),
    ("end_date", "TEXT"),
    ("total_project", "TEXT"),
    ("dp", "TEXT"),
    ("user_id", "INTEGER"),
];

const MATERIALS_USAGE_COLUMNS: ColumnDefs = &[
    ("id", "INTEGER PRIMARY KEY"),
    ("project_id", "INTEGER REFERENCES projects (id)"),
    ("date", "TEXT"),
    ("item_name", "TEXT"),
    ("quantity", "TEXT"),
    ("unit_price", "TEXT DEFAULT ''"),
    ("total", "TEXT"),
    ("notes", "TEXT"),
    ("user_id", "INTEGER"),
];

/// SQL to create the users table (owned by the authentication collaborator)
pub const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    username TEXT UNIQUE NOT NULL,
    password TEXT NOT NULL
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_consumers_user ON consumers(user_id, year, month)",
    "CREATE INDEX IF NOT EXISTS idx_sales_user ON sales(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_sales_projects_user ON sales_projects(user_id, sales_id)",
    "CREATE INDEX IF NOT EXISTS idx_tukang_user ON tukang(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_worker_projects_user ON worker_projects(user_id, tukang_id)",
    "CREATE INDEX IF NOT EXISTS idx_projects_user ON projects(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_materials_usage_project ON materials_usage(user_id, project_id)",
];

/// Current column set of a live table
pub fn columns(table: LiveTable) -> ColumnDefs {
    match table {
        LiveTable::Consumers => CONSUMERS_COLUMNS,
        LiveTable::Sales => SALES_COLUMNS,
        LiveTable::SalesProjects => SALES_PROJECTS_COLUMNS,
        LiveTable::Tukang => TUKANG_COLUMNS,
        LiveTable::WorkerProjects => WORKER_PROJECTS_COLUMNS,
        LiveTable::Projects => PROJECTS_COLUMNS,
        LiveTable::MaterialsUsage => MATERIALS_USAGE_COLUMNS,
    }
}

/// Declaration of one current column
pub fn column_decl(table: LiveTable, column: &str) -> Option<&'static str> {
    columns(table).iter().find(|(name, _)| *name == column).map(|(_, decl)| *decl)
}

/// `CREATE TABLE` for the current shape of `table`, under `target` name
pub fn create_table_sql(table: LiveTable, target: &str, if_not_exists: bool) -> String {
    let defs: Vec<String> = columns(table)
        .iter()
        .map(|(name, decl)| format!("    {} {}", name, decl))
        .collect();
    format!(
        "CREATE TABLE {}{} (\n{}\n)",
        if if_not_exists { "IF NOT EXISTS " } else { "" },
        super::quote_ident(target),
        defs.join(",\n")
    )
}

/// Where a column introduced after the first release has to land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// `ALTER TABLE ADD COLUMN` at the end is fine
    Append,
    /// Position matters; the table is rebuilt in current column order
    Ordered,
}

/// A column added to a table family after the first release.
#[derive(Debug, Clone, Copy)]
pub struct ColumnPatch {
    pub table: LiveTable,
    pub column: &'static str,
    /// Declaration used for `ADD COLUMN` (must carry a constant default)
    pub decl: &'static str,
    pub placement: Placement,
    /// Statement run once on the live table right after the column appears
    pub backfill: Option<&'static str>,
}

/// Every column patch, oldest first
pub const COLUMN_PATCHES: &[ColumnPatch] = &[
    ColumnPatch {
        table: LiveTable::MaterialsUsage,
        column: "unit_price",
        decl: "TEXT DEFAULT ''",
        placement: Placement::Append,
        backfill: Some(
            "UPDATE materials_usage SET unit_price = CAST(CAST(total AS REAL) / CAST(quantity AS REAL) AS INTEGER) \
             WHERE quantity != '0' AND quantity != '' AND (unit_price IS NULL OR unit_price = '')",
        ),
    },
    ColumnPatch {
        table: LiveTable::SalesProjects,
        column: "photo_path",
        decl: "TEXT DEFAULT ''",
        placement: Placement::Append,
        backfill: None,
    },
    ColumnPatch {
        table: LiveTable::WorkerProjects,
        column: "photo_path",
        decl: "TEXT DEFAULT ''",
        placement: Placement::Append,
        backfill: None,
    },
    ColumnPatch {
        table: LiveTable::Consumers,
        column: "date",
        decl: "TEXT DEFAULT ''",
        placement: Placement::Ordered,
        backfill: None,
    },
];

/// Name of the scratch table used while rebuilding `table`
pub fn rebuild_table_name(table: LiveTable) -> String {
    format!("{}__rebuild", table.as_str())
}
