//! Schema manager
//!
//! Brings the live tables, and every archive table already copied from
//! them, up to the current column set. Both passes are idempotent and run
//! on every startup.

use rusqlite::{Connection, OptionalExtension};
use crate::archive::ArchiveName;
use crate::table::LiveTable;
use crate::{Error, Result};
use super::quote_ident;
use super::schema::{self, ColumnPatch, Placement};

/// What a schema pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// `table.column` for every column added to a live table
    pub columns_added: Vec<String>,
    /// Live tables rebuilt to fix column order
    pub tables_rebuilt: Vec<String>,
    /// Live tables restored from an interrupted rebuild
    pub tables_recovered: Vec<String>,
    /// Sales agents created from the free-text `sales` column
    pub agents_created: usize,
}

impl MigrationReport {
    pub fn is_empty(&self) -> bool {
        self.columns_added.is_empty()
            && self.tables_rebuilt.is_empty()
            && self.tables_recovered.is_empty()
            && self.agents_created == 0
    }
}

fn ddl_failed(context: String) -> impl FnOnce(rusqlite::Error) -> Error {
    move |e| Error::Schema(format!("{}: {}", context, e))
}

/// Check whether a table exists
pub fn table_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [name],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
}

/// Column names of a table, in storage order
pub fn table_columns(conn: &Connection, name: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
    let columns = stmt
        .query_map([name], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(columns)
}

/// Tables whose name starts with `prefix` (literal match, no wildcards)
pub fn tables_with_prefix(conn: &Connection, prefix: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND substr(name, 1, length(?1)) = ?1 ORDER BY name",
    )?;
    let names = stmt
        .query_map([prefix], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(names)
}

/// Every archive table of one table family
pub fn archive_tables(conn: &Connection, table: LiveTable) -> rusqlite::Result<Vec<ArchiveName>> {
    Ok(tables_with_prefix(conn, &table.archive_prefix())?
        .iter()
        .filter_map(|name| ArchiveName::parse(name).ok())
        .filter(|archive| archive.table == table)
        .collect())
}

/// Create missing live tables and apply pending column patches.
pub fn ensure_schema(conn: &Connection) -> Result<MigrationReport> {
    let mut report = MigrationReport::default();

    recover_interrupted_rebuilds(conn, &mut report)?;

    conn.execute_batch(schema::CREATE_USERS_TABLE)
        .map_err(ddl_failed("creating users".to_string()))?;

    for table in LiveTable::all() {
        conn.execute(&schema::create_table_sql(*table, table.as_str(), true), [])
            .map_err(ddl_failed(format!("creating {}", table)))?;
    }

    migrate_legacy_sales(conn, &mut report)?;

    for patch in schema::COLUMN_PATCHES {
        apply_live_patch(conn, patch, &mut report)?;
    }

    for stmt in schema::CREATE_INDEXES {
        conn.execute(stmt, []).map_err(ddl_failed(format!("index `{}`", stmt)))?;
    }

    if !report.is_empty() {
        tracing::info!(
            "Schema updated: added {:?}, rebuilt {:?}, recovered {:?}",
            report.columns_added,
            report.tables_rebuilt,
            report.tables_recovered
        );
    }
    Ok(report)
}

/// Add missing patch columns to every existing archive table.
///
/// Returns the number of columns added. Zero archives is fine.
pub fn ensure_archive_schema(conn: &Connection) -> Result<usize> {
    let mut added = 0;
    for patch in schema::COLUMN_PATCHES {
        let archives = archive_tables(conn, patch.table)
            .map_err(ddl_failed(format!("listing {} archives", patch.table)))?;

        for archive in archives {
            let name = archive.to_string();
            let columns = table_columns(conn, &name).map_err(ddl_failed(format!("reading {}", name)))?;
            if columns.iter().any(|c| c == patch.column) {
                continue;
            }
            conn.execute(
                &format!(
                    "ALTER TABLE {} ADD COLUMN {} {}",
                    quote_ident(&name),
                    quote_ident(patch.column),
                    patch.decl
                ),
                [],
            )
            .map_err(ddl_failed(format!("adding {} to {}", patch.column, name)))?;
            tracing::debug!("Added {} to archive {}", patch.column, name);
            added += 1;
        }
    }

    if added > 0 {
        tracing::info!("Patched {} archive column(s)", added);
    }
    Ok(added)
}

fn apply_live_patch(conn: &Connection, patch: &ColumnPatch, report: &mut MigrationReport) -> Result<()> {
    let table = patch.table.as_str();
    let columns = table_columns(conn, table).map_err(ddl_failed(format!("reading {}", table)))?;
    if columns.iter().any(|c| c == patch.column) {
        return Ok(());
    }

    match patch.placement {
        Placement::Append => {
            let tx = conn
                .unchecked_transaction()
                .map_err(ddl_failed(format!("patching {}", table)))?;
            tx.execute(
                &format!("ALTER TABLE {} ADD COLUMN {} {}", table, patch.column, patch.decl),
                [],
            )
            .map_err(ddl_failed(format!("adding {}.{}", table, patch.column)))?;
            if let Some(backfill) = patch.backfill {
                tx.execute_batch(backfill)
                    .map_err(ddl_failed(format!("back-filling {}.{}", table, patch.column)))?;
            }
            tx.commit().map_err(ddl_failed(format!("patching {}", table)))?;
        }
        Placement::Ordered => {
            rebuild_table(conn, patch.table, &columns)?;
            report.tables_rebuilt.push(table.to_string());
            if let Some(backfill) = patch.backfill {
                conn.execute_batch(backfill)
                    .map_err(ddl_failed(format!("back-filling {}.{}", table, patch.column)))?;
            }
        }
    }

    report.columns_added.push(format!("{}.{}", table, patch.column));
    Ok(())
}

/// Turn the free-text `sales` column of the first release into agent rows
/// in `sales` and a `sales_id` reference, rebuilding `sales_projects` in
/// current column order.
///
/// Agents are matched by exact name per user; blank names get no agent.
fn migrate_legacy_sales(conn: &Connection, report: &mut MigrationReport) -> Result<()> {
    let table = LiveTable::SalesProjects;
    let columns = table_columns(conn, table.as_str()).map_err(ddl_failed(format!("reading {}", table)))?;
    if !columns.iter().any(|c| c == "sales") || columns.iter().any(|c| c == "sales_id") {
        return Ok(());
    }
    let fail = |step: &str| ddl_failed(format!("moving {}.sales into agents ({})", table, step));

    let tx = conn.unchecked_transaction().map_err(fail("begin"))?;
    let pairs = {
        let mut stmt = tx
            .prepare(
                "SELECT DISTINCT sales, user_id FROM sales_projects \
                 WHERE sales IS NOT NULL AND trim(sales) != ''",
            )
            .map_err(fail("read names"))?;
        stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<i64>>(1)?)))
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(fail("read names"))?
    };

    let mut created = 0;
    for (name, user_id) in &pairs {
        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM sales WHERE name = ?1 AND user_id IS ?2 ORDER BY id LIMIT 1",
                rusqlite::params![name, user_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(fail("find agent"))?;
        if existing.is_none() {
            tx.execute("INSERT INTO sales (name, user_id) VALUES (?1, ?2)", rusqlite::params![name, user_id])
                .map_err(fail("create agent"))?;
            created += 1;
        }
    }

    let agent_of = "(SELECT s.id FROM sales s WHERE s.name = sales_projects.sales \
                    AND s.user_id IS sales_projects.user_id ORDER BY s.id LIMIT 1)";
    copy_into_rebuilt(&tx, table, &columns, &[("sales_id", agent_of)])?;
    tx.commit().map_err(fail("commit"))?;

    tracing::info!("Moved {} sales names into {} new agent(s)", pairs.len(), created);
    report.agents_created += created;
    report.columns_added.push(format!("{}.sales_id", table));
    report.tables_rebuilt.push(table.to_string());
    Ok(())
}

/// Recreate `table` in current column order and copy its rows over.
///
/// Runs as one transaction: create scratch, copy, drop original, rename.
fn rebuild_table(conn: &Connection, table: LiveTable, existing: &[String]) -> Result<()> {
    let fail = |step: &str| ddl_failed(format!("rebuilding {} ({})", table, step));
    let tx = conn.unchecked_transaction().map_err(fail("begin"))?;
    copy_into_rebuilt(&tx, table, existing, &[])?;
    tx.commit().map_err(fail("commit"))?;

    tracing::info!("Rebuilt {} in current column order", table);
    Ok(())
}

/// Copy `table` into a scratch table of the current shape and swap it in.
///
/// Columns in `derived` are filled from an SQL expression over the old
/// row; the rest are copied when the old table has them. The caller owns
/// the transaction.
fn copy_into_rebuilt(conn: &Connection, table: LiveTable, existing: &[String], derived: &[(&str, &str)]) -> Result<()> {
    let scratch = schema::rebuild_table_name(table);
    let fail = |step: &str| ddl_failed(format!("rebuilding {} ({})", table, step));

    let (mut targets, mut sources): (Vec<&str>, Vec<&str>) = schema::columns(table)
        .iter()
        .map(|(name, _)| *name)
        .filter(|name| existing.iter().any(|c| c == name) && !derived.iter().any(|(d, _)| d == name))
        .map(|name| (name, name))
        .unzip();
    for (name, expr) in derived {
        targets.push(*name);
        sources.push(*expr);
    }

    conn.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(&scratch)), [])
        .map_err(fail("clear scratch"))?;
    conn.execute(&schema::create_table_sql(table, &scratch, false), [])
        .map_err(fail("create scratch"))?;
    conn.execute(
        &format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}",
            quote_ident(&scratch),
            targets.join(", "),
            sources.join(", "),
            table.as_str()
        ),
        [],
    )
    .map_err(fail("copy rows"))?;
    conn.execute(&format!("DROP TABLE {}", table.as_str()), [])
        .map_err(fail("drop original"))?;
    conn.execute(
        &format!("ALTER TABLE {} RENAME TO {}", quote_ident(&scratch), table.as_str()),
        [],
    )
    .map_err(fail("rename"))?;
    Ok(())
}

/// Finish or discard a rebuild that stopped half way.
fn recover_interrupted_rebuilds(conn: &Connection, report: &mut MigrationReport) -> Result<()> {
    for table in LiveTable::all() {
        let scratch = schema::rebuild_table_name(*table);
        let check = |e: rusqlite::Error| Error::Schema(format!("checking {}: {}", scratch, e));
        if !table_exists(conn, &scratch).map_err(check)? {
            continue;
        }

        if table_exists(conn, table.as_str()).map_err(|e| Error::Schema(format!("checking {}: {}", table, e)))? {
            tracing::warn!("Discarding leftover {}", scratch);
            conn.execute(&format!("DROP TABLE {}", quote_ident(&scratch)), [])
                .map_err(ddl_failed(format!("dropping {}", scratch)))?;
        } else {
            tracing::warn!("Restoring {} from interrupted rebuild", table);
            conn.execute(
                &format!("ALTER TABLE {} RENAME TO {}", quote_ident(&scratch), table.as_str()),
                [],
            )
            .map_err(ddl_failed(format!("restoring {}", table)))?;
            report.tables_recovered.push(table.to_string());
        }
    }
    Ok(())
}
