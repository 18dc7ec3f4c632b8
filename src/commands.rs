use crate::{
    ArchiveCommand, Cli, Commands, ConsumerCommand, ConsumerFields, MaterialCommand, OutputFormat, PeriodArgs,
    PersonCommand, ProjectCommand, SalesProjectCommand, WorkerProjectCommand,
};
use anyhow::Context as _;
use chrono::Local;
use pembukuan::auth::Auth;
use pembukuan::config::{self, PembukuanConfig, ResolvedPaths};
use pembukuan::entity::Record;
use pembukuan::report;
use pembukuan::ui::{self, Icons};
use pembukuan::{
    ArchiveEditor, ArchiveEngine, ArchiveName, Consumer, LiveTable, LocalPhotoStore, MaterialUsage, Period,
    PeriodFilter, PhotoWarning, Project, SalesAgent, SalesProject, Store, Worker, WorkerProject,
};
use rusqlite::types::Value;
use serde::Serialize;
use std::path::{Path, PathBuf};

const PASSWORD_ENV: &str = "PEMBUKUAN_PASSWORD";

pub fn run(cli: Cli) -> anyhow::Result<()> {
    let config = config::load_config(cli.config.as_deref())?.unwrap_or_default();
    let paths = config.resolve(cli.database.as_deref());

    match cli.command {
        Commands::Init { force } => run_init(cli.config, cli.user, &config, &paths, force),
        Commands::Register { username, password } => {
            let store = open_store(&paths)?;
            let id = Auth::new(&store).register(&username, &password)?;
            emit(cli.format, &serde_json::json!({ "user_id": id }), || {
                ui::success(&format!("Registered {} (user #{})", username, id))
            })
        }
        Commands::Login { username, password } => {
            let store = open_store(&paths)?;
            let id = Auth::new(&store)
                .login(&username, &password)?
                .context("invalid username or password")?;
            emit(cli.format, &serde_json::json!({ "user_id": id }), || {
                ui::info(&format!("{} {}", Icons::LOCK, username), &format!("user #{}", id))
            })
        }
        command => {
            let store = open_store(&paths)?;
            let username = cli
                .user
                .clone()
                .or(config.user.clone())
                .context("no user given (use --user or set `user` in pembukuan.toml)")?;
            let password = cli
                .password
                .clone()
                .or_else(|| std::env::var(PASSWORD_ENV).ok())
                .with_context(|| format!("no password given (use --password or ${})", PASSWORD_ENV))?;
            let user_id = Auth::new(&store)
                .login(&username, &password)?
                .context("invalid username or password")?;

            let session = Session { store, user_id, format: cli.format, paths };
            session.dispatch(command)
        }
    }
}

fn run_init(
    path: Option<PathBuf>,
    user: Option<String>,
    config: &PembukuanConfig,
    paths: &ResolvedPaths,
    force: bool,
) -> anyhow::Result<()> {
    let path = path.unwrap_or_else(config::default_config_path);
    let written = PembukuanConfig {
        database: Some(paths.database.display().to_string()),
        photo_dir: Some(paths.photo_dir.display().to_string()),
        backup_dir: Some(paths.backup_dir.display().to_string()),
        user: user.or(config.user.clone()),
    };
    config::write_config(&path, &written, force)?;
    ui::success(&format!("Wrote {}", path.display()));
    Ok(())
}

fn open_store(paths: &ResolvedPaths) -> anyhow::Result<Store> {
    config::ensure_db_dir(&paths.database)?;
    let store = Store::open(&paths.database)
        .with_context(|| format!("opening {}", paths.database.display()))?
        .with_photo_store(LocalPhotoStore::new(&paths.photo_dir));
    Ok(store)
}

fn emit<T: Serialize>(format: OutputFormat, value: &T, text: impl FnOnce()) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => text(),
    }
    Ok(())
}

fn report_photo(warning: &Option<PhotoWarning>) {
    if let Some(warning) = warning {
        ui::photo_warning(warning);
    }
}

fn period_of(args: &PeriodArgs) -> anyhow::Result<Period> {
    let current = Period::current();
    Ok(Period::new(args.year.unwrap_or(current.year), args.month.unwrap_or(current.month))?)
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Integer(i) => i.to_string(),
        Value::Real(r) => r.to_string(),
        Value::Text(t) => t.clone(),
        Value::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

/// Table of live rows with display-name headers
fn record_grid<R: Record>(records: &[R]) -> String {
    let table = R::TABLE;
    let headers: Vec<String> = std::iter::once("ID".to_string())
        .chain(table.data_columns().iter().map(|c| table.display_name(c).to_string()))
        .collect();
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|r| {
            std::iter::once(r.id().to_string())
                .chain(r.column_values().iter().map(cell))
                .collect()
        })
        .collect();
    ui::grid(&headers, &rows)
}

/// `"Nama Konsumen=Pak Harun"` pairs
fn parse_fields(raw: &[String]) -> anyhow::Result<Vec<(&str, &str)>> {
    raw.iter()
        .map(|f| {
            f.split_once('=')
                .map(|(k, v)| (k.trim(), v.trim()))
                .with_context(|| format!("field must look like Name=Value: {}", f))
        })
        .collect()
}

/// Sales agents and workers share their commands
trait Person: Record + Serialize {
    const KIND: &'static str;
    fn named(name: String) -> Self;
}

impl Person for SalesAgent {
    const KIND: &'static str = "Sales";
    fn named(name: String) -> Self {
        SalesAgent::new(name)
    }
}

impl Person for Worker {
    const KIND: &'static str = "Tukang";
    fn named(name: String) -> Self {
        Worker::new(name)
    }
}

struct Session {
    store: Store,
    user_id: i64,
    format: OutputFormat,
    paths: ResolvedPaths,
}

impl Session {
    fn dispatch(&self, command: Commands) -> anyhow::Result<()> {
        match command {
            Commands::Consumer(cmd) => self.consumer(cmd),
            Commands::Sales(cmd) => self.person::<SalesAgent>(cmd),
            Commands::Worker(cmd) => self.person::<Worker>(cmd),
            Commands::SalesProject(cmd) => self.sales_project(cmd),
            Commands::WorkerProject(cmd) => self.worker_project(cmd),
            Commands::Project(cmd) => self.project(cmd),
            Commands::Material(cmd) => self.material(cmd),
            Commands::Close { table, entity } => self.close(&table, entity),
            Commands::Archives { table, entity } => self.archives(&table, entity),
            Commands::Archive(cmd) => self.archive(cmd),
            Commands::Backup { dir } => self.backup(dir.as_deref()),
            Commands::Stats => {
                let stats = self.store.stats(self.user_id)?;
                let counts: Vec<(String, usize)> = stats.tables.iter().map(|(t, n)| (t.to_string(), *n)).collect();
                emit(self.format, &serde_json::json!({ "tables": counts, "archives": stats.archives }), || {
                    ui::header(&format!("{} Pembukuan ({})", Icons::STATS, self.paths.database.display()));
                    println!("{}", stats);
                })
            }
            Commands::Init { .. } | Commands::Register { .. } | Commands::Login { .. } => {
                anyhow::bail!("command does not need a session")
            }
        }
    }

    fn list<R: Record + Serialize>(&self, records: Vec<R>, title: &str) -> anyhow::Result<()> {
        emit(self.format, &records, || {
            if records.is_empty() {
                ui::info(title, "no rows");
            } else {
                ui::section(title);
                println!("{}", record_grid(&records));
            }
        })
    }

    fn consumer(&self, cmd: ConsumerCommand) -> anyhow::Result<()> {
        match cmd {
            ConsumerCommand::Add { fields, period } => {
                let mut consumer = Consumer { period: period_of(&period)?, ..Default::default() };
                apply_consumer_fields(&mut consumer, fields);
                let id = self.store.insert(&consumer, self.user_id)?;
                emit(self.format, &serde_json::json!({ "id": id }), || ui::record_added("Konsumen", id))
            }
            ConsumerCommand::List { period } => {
                let filter = PeriodFilter { year: period.year, month: period.month };
                let rows: Vec<Consumer> = self.store.list(self.user_id, filter)?;
                self.list(rows, "Konsumen")
            }
            ConsumerCommand::Edit { id, fields } => {
                let mut consumer: Consumer = self.store.get(id, self.user_id)?;
                apply_consumer_fields(&mut consumer, fields);
                self.store.update(id, &consumer, self.user_id)?;
                emit(self.format, &consumer, || ui::record_updated("Konsumen", id))
            }
            ConsumerCommand::Rm { id } => {
                self.store.delete::<Consumer>(id, self.user_id)?;
                emit(self.format, &serde_json::json!({ "deleted": id }), || ui::record_deleted("Konsumen", id))
            }
        }
    }

    fn person<P: Person>(&self, cmd: PersonCommand) -> anyhow::Result<()> {
        match cmd {
            PersonCommand::Add { name } => {
                let id = self.store.insert(&P::named(name), self.user_id)?;
                emit(self.format, &serde_json::json!({ "id": id }), || ui::record_added(P::KIND, id))
            }
            PersonCommand::List => {
                let rows: Vec<P> = self.store.list(self.user_id, PeriodFilter::all())?;
                self.list(rows, P::KIND)
            }
            PersonCommand::Rename { id, name } => {
                self.store.update(id, &P::named(name), self.user_id)?;
                emit(self.format, &serde_json::json!({ "id": id }), || ui::record_updated(P::KIND, id))
            }
            PersonCommand::Rm { id } => {
                let outcome = self.store.delete::<P>(id, self.user_id)?;
                report_photo(&outcome.photo_warning);
                emit(self.format, &serde_json::json!({ "deleted": id }), || ui::record_deleted(P::KIND, id))
            }
            PersonCommand::Summary { id } => {
                if P::TABLE != LiveTable::Sales {
                    anyhow::bail!("summary is only available for sales agents");
                }
                let summary = report::commission_summary(&self.store, id, self.user_id)?;
                emit(self.format, &summary, || {
                    let mut table = ui::TableBuilder::new();
                    table.add_row("Sales", &summary.sales_name);
                    table.add_row("Proyek", &summary.projects.to_string());
                    table.add_row("Total Komisi", &summary.total_commission.to_string());
                    table.add_row("Total KB", &summary.total_kb.to_string());
                    table.add_row("Komisi Bersih", &summary.net_commission.to_string());
                    ui::section(&format!("{} Komisi", Icons::MONEY));
                    println!("{}", table.build());
                })
            }
        }
    }

    fn sales_project(&self, cmd: SalesProjectCommand) -> anyhow::Result<()> {
        match cmd {
            SalesProjectCommand::Add { sales_id, fields, total, commission, kb, period } => {
                let project = SalesProject {
                    sales_id,
                    customer_name: fields.customer,
                    address: fields.address,
                    job: fields.job,
                    total_project: total,
                    commission,
                    kb,
                    notes: fields.notes,
                    period: period_of(&period)?,
                    ..Default::default()
                };
                let outcome = self.store.insert_with_photo(&project, fields.photo.as_deref(), self.user_id)?;
                report_photo(&outcome.photo_warning);
                emit(self.format, &serde_json::json!({ "id": outcome.value }), || {
                    ui::record_added("Proyek Sales", outcome.value)
                })
            }
            SalesProjectCommand::List { sales_id } => {
                let rows: Vec<SalesProject> = self.store.list_by_parent(sales_id, self.user_id)?;
                self.list(rows, "Proyek Sales")
            }
            SalesProjectCommand::Rm { id } => {
                let outcome = self.store.delete::<SalesProject>(id, self.user_id)?;
                report_photo(&outcome.photo_warning);
                emit(self.format, &serde_json::json!({ "deleted": id }), || ui::record_deleted("Proyek Sales", id))
            }
        }
    }

    fn worker_project(&self, cmd: WorkerProjectCommand) -> anyhow::Result<()> {
        match cmd {
            WorkerProjectCommand::Add { tukang_id, fields, size, kb, period } => {
                let project = WorkerProject {
                    tukang_id,
                    customer_name: fields.customer,
                    address: fields.address,
                    job: fields.job,
                    size,
                    kb,
                    notes: fields.notes,
                    period: period_of(&period)?,
                    ..Default::default()
                };
                let outcome = self.store.insert_with_photo(&project, fields.photo.as_deref(), self.user_id)?;
                report_photo(&outcome.photo_warning);
                emit(self.format, &serde_json::json!({ "id": outcome.value }), || {
                    ui::record_added("Proyek Tukang", outcome.value)
                })
            }
            WorkerProjectCommand::List { tukang_id } => {
                let rows: Vec<WorkerProject> = self.store.list_by_parent(tukang_id, self.user_id)?;
                self.list(rows, "Proyek Tukang")
            }
            WorkerProjectCommand::Rm { id } => {
                let outcome = self.store.delete::<WorkerProject>(id, self.user_id)?;
                report_photo(&outcome.photo_warning);
                emit(self.format, &serde_json::json!({ "deleted": id }), || ui::record_deleted("Proyek Tukang", id))
            }
        }
    }

    fn project(&self, cmd: ProjectCommand) -> anyhow::Result<()> {
        match cmd {
            ProjectCommand::Add { name, sales, worker, start, end, total, dp } => {
                let project = Project {
                    id: 0,
                    name,
                    sales_name: sales,
                    worker_name: worker,
                    start_date: start,
                    end_date: end,
                    total_project: total,
                    dp,
                };
                let id = self.store.insert(&project, self.user_id)?;
                emit(self.format, &serde_json::json!({ "id": id }), || ui::record_added("Proyek", id))
            }
            ProjectCommand::List => {
                let rows: Vec<Project> = self.store.list(self.user_id, PeriodFilter::all())?;
                self.list(rows, "Proyek")
            }
            ProjectCommand::Rm { id } => {
                self.store.delete::<Project>(id, self.user_id)?;
                emit(self.format, &serde_json::json!({ "deleted": id }), || ui::record_deleted("Proyek", id))
            }
            ProjectCommand::Summary { id } => {
                let summary = report::project_summary(&self.store, id, self.user_id)?;
                emit(self.format, &summary, || {
                    let mut table = ui::TableBuilder::new();
                    table.add_row("Proyek", &summary.name);
                    table.add_row("Total Proyek", &summary.total_project.to_string());
                    table.add_row("DP", &summary.dp.to_string());
                    table.add_row("Sisa", &summary.remaining.to_string());
                    table.add_row("Material", &summary.material_items.to_string());
                    table.add_row("Biaya Material", &summary.material_cost.to_string());
                    ui::section(&format!("{} Proyek", Icons::MONEY));
                    println!("{}", table.build());
                })
            }
        }
    }

    fn material(&self, cmd: MaterialCommand) -> anyhow::Result<()> {
        match cmd {
            MaterialCommand::Add { project_id, item, quantity, unit_price, date, notes } => {
                let mut usage = MaterialUsage::new(project_id, item, quantity, unit_price);
                usage.date = date;
                usage.notes = notes;
                let id = self.store.insert(&usage, self.user_id)?;
                emit(self.format, &serde_json::json!({ "id": id, "total": usage.total }), || {
                    ui::record_added("Material", id);
                    ui::amount_row("Total", usage.total);
                })
            }
            MaterialCommand::List { project_id } => {
                let rows: Vec<MaterialUsage> = self.store.list_by_parent(project_id, self.user_id)?;
                self.list(rows, "Material")
            }
            MaterialCommand::Rm { id } => {
                self.store.delete::<MaterialUsage>(id, self.user_id)?;
                emit(self.format, &serde_json::json!({ "deleted": id }), || ui::record_deleted("Material", id))
            }
        }
    }

    fn close(&self, table: &str, entity: Option<i64>) -> anyhow::Result<()> {
        let table: LiveTable = table.parse()?;
        let engine = ArchiveEngine::new(&self.store);
        let outcome = match entity {
            Some(entity_id) => engine.close_book_for_entity(table, entity_id, self.user_id)?,
            None => engine.close_book(table, self.user_id)?,
        };
        report_photo(&outcome.photo_warning);
        let label = engine.display_label(&outcome.value)?;
        emit(self.format, &outcome.value, || ui::archive_closed(&outcome.value.to_string(), &label))
    }

    fn archives(&self, table: &str, entity: Option<i64>) -> anyhow::Result<()> {
        let table: LiveTable = table.parse()?;
        let engine = ArchiveEngine::new(&self.store);
        let names = match entity {
            Some(entity_id) => engine.list_archives_for_entity(table, entity_id, self.user_id)?,
            None => engine.list_archives(table, self.user_id)?,
        };

        let rows = names
            .iter()
            .map(|name| Ok(vec![engine.display_label(name)?, name.to_string()]))
            .collect::<pembukuan::Result<Vec<_>>>()?;
        emit(self.format, &names, || {
            if rows.is_empty() {
                ui::info(&format!("{} {}", Icons::ARCHIVE, table), "no closed books");
            } else {
                println!("{}", ui::grid(&["Buku".to_string(), "Tabel".to_string()], &rows));
            }
        })
    }

    /// Archive names are only accepted for the acting user
    fn own_archive(&self, raw: &str) -> anyhow::Result<ArchiveName> {
        let name: ArchiveName = raw.parse()?;
        if name.user_id != self.user_id {
            anyhow::bail!("archive {} belongs to another user", raw);
        }
        Ok(name)
    }

    fn archive(&self, cmd: ArchiveCommand) -> anyhow::Result<()> {
        let editor = ArchiveEditor::new(&self.store);
        match cmd {
            ArchiveCommand::Show { name } => {
                let name = self.own_archive(&name)?;
                let snapshot = editor.load(&name)?;
                emit(self.format, &snapshot, || {
                    let headers: Vec<String> = snapshot
                        .columns
                        .iter()
                        .map(|c| name.table.display_name(c).to_string())
                        .collect();
                    let rows: Vec<Vec<String>> = snapshot
                        .rows
                        .iter()
                        .map(|row| row.iter().map(|c| c.to_string()).collect())
                        .collect();
                    ui::section(&name.display_label(None));
                    if rows.is_empty() {
                        println!("{}", ui::muted("(empty)"));
                    } else {
                        println!("{}", ui::grid(&headers, &rows));
                    }
                })
            }
            ArchiveCommand::Add { name, fields, photo } => {
                let name = self.own_archive(&name)?;
                let fields = parse_fields(&fields)?;
                let outcome = editor.insert(&name, &fields, photo.as_deref(), Some(self.user_id), None)?;
                report_photo(&outcome.photo_warning);
                emit(self.format, &serde_json::json!({ "id": outcome.value }), || {
                    ui::record_added(&name.to_string(), outcome.value)
                })
            }
            ArchiveCommand::Edit { name, id, fields, photo } => {
                let name = self.own_archive(&name)?;
                let fields = parse_fields(&fields)?;
                let outcome = editor.update(&name, id, &fields, photo.as_deref())?;
                report_photo(&outcome.photo_warning);
                emit(self.format, &serde_json::json!({ "id": id }), || ui::record_updated(&name.to_string(), id))
            }
            ArchiveCommand::Rm { name, id } => {
                let name = self.own_archive(&name)?;
                let outcome = editor.delete(&name, id)?;
                report_photo(&outcome.photo_warning);
                emit(self.format, &serde_json::json!({ "deleted": id }), || {
                    ui::record_deleted(&name.to_string(), id)
                })
            }
        }
    }

    fn backup(&self, dir: Option<&Path>) -> anyhow::Result<()> {
        let dir = dir.unwrap_or(&self.paths.backup_dir);
        let path = self.store.backup_to(dir, Local::now().date_naive())?;
        emit(self.format, &serde_json::json!({ "path": path }), || {
            ui::info(&format!("{} Backup", Icons::DATABASE), &path.display().to_string())
        })
    }
}

fn apply_consumer_fields(consumer: &mut Consumer, fields: ConsumerFields) {
    let ConsumerFields { date, name, address, sales, job, total, worker, notes } = fields;
    if let Some(date) = date {
        consumer.date = date;
    }
    if let Some(name) = name {
        consumer.name = name;
    }
    if let Some(address) = address {
        consumer.address = address;
    }
    if let Some(sales) = sales {
        consumer.sales = sales;
    }
    if let Some(job) = job {
        consumer.job = job;
    }
    if let Some(total) = total {
        consumer.total_projects = total;
    }
    if let Some(worker) = worker {
        consumer.worker = worker;
    }
    if let Some(notes) = notes {
        consumer.notes = notes;
    }
}
