//! Pembukuan CLI - bookkeeping for customers, sales, workers and projects

mod commands;

use clap::{Args, Parser, Subcommand, ValueEnum};
use pembukuan::Money;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pembukuan")]
#[command(version)]
#[command(about = "Bookkeeping for a small construction business, with closable books")]
#[command(long_about = r#"
Pembukuan keeps customers, sales agents and their projects, workers (tukang)
and their projects, and material usage per project in one SQLite file.
Closing a book moves a period's rows into a dated archive that can still be
browsed and edited.

Example usage:
  pembukuan register --username admin --password rahasia
  pembukuan --user admin consumer add --name "Bu Sari" --total "Rp 1.500.000"
  pembukuan --user admin close consumers
  pembukuan --user admin archives consumers
"#)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ./pembukuan.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to the database file
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Username to act as
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// Password (falls back to $PEMBUKUAN_PASSWORD)
    #[arg(long, global = true)]
    password: Option<String>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a pembukuan.toml with the current settings
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Create a user account
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },

    /// Check credentials and print the user id
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },

    /// Customers (konsumen)
    #[command(subcommand)]
    Consumer(ConsumerCommand),

    /// Sales agents
    #[command(subcommand)]
    Sales(PersonCommand),

    /// Projects brought in by a sales agent
    #[command(subcommand)]
    SalesProject(SalesProjectCommand),

    /// Workers (tukang)
    #[command(subcommand)]
    Worker(PersonCommand),

    /// Projects carried out by a worker
    #[command(subcommand)]
    WorkerProject(WorkerProjectCommand),

    /// Construction projects
    #[command(subcommand)]
    Project(ProjectCommand),

    /// Material usage of a project
    #[command(subcommand)]
    Material(MaterialCommand),

    /// Close a book: move the live rows into a new archive
    Close {
        /// consumers, sales_projects or worker_projects
        table: String,

        /// Only this sales agent's or worker's rows
        #[arg(long)]
        entity: Option<i64>,
    },

    /// List closed books
    Archives {
        table: String,

        /// Per-entity archives of this sales agent or worker
        #[arg(long)]
        entity: Option<i64>,
    },

    /// Work with one closed book
    #[command(subcommand)]
    Archive(ArchiveCommand),

    /// Copy the database into the backup directory
    Backup {
        /// Backup directory (defaults to config or ./backup)
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Row counts for the current user
    Stats,
}

#[derive(Args)]
pub struct PeriodArgs {
    /// Year (defaults to the current one)
    #[arg(long)]
    pub year: Option<i32>,

    /// Month 1-12 (defaults to the current one)
    #[arg(long)]
    pub month: Option<u32>,
}

#[derive(Args)]
pub struct ConsumerFields {
    #[arg(long)]
    pub date: Option<String>,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub address: Option<String>,
    /// Sales agent name
    #[arg(long)]
    pub sales: Option<String>,
    #[arg(long)]
    pub job: Option<String>,
    #[arg(long)]
    pub total: Option<Money>,
    /// Worker name
    #[arg(long)]
    pub worker: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Subcommand)]
pub enum ConsumerCommand {
    Add {
        #[command(flatten)]
        fields: ConsumerFields,
        #[command(flatten)]
        period: PeriodArgs,
    },
    List {
        #[command(flatten)]
        period: PeriodArgs,
    },
    Edit {
        id: i64,
        #[command(flatten)]
        fields: ConsumerFields,
    },
    Rm {
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum PersonCommand {
    Add {
        name: String,
    },
    List,
    Rename {
        id: i64,
        name: String,
    },
    /// Delete along with all of their projects
    Rm {
        id: i64,
    },
    /// Commission totals (sales agents only)
    Summary {
        id: i64,
    },
}

#[derive(Args)]
pub struct JobFields {
    #[arg(long)]
    pub customer: String,
    #[arg(long, default_value = "")]
    pub address: String,
    #[arg(long, default_value = "")]
    pub job: String,
    #[arg(long, default_value = "")]
    pub notes: String,
    /// Photo to attach
    #[arg(long)]
    pub photo: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum SalesProjectCommand {
    Add {
        sales_id: i64,
        #[command(flatten)]
        fields: JobFields,
        #[arg(long, default_value = "0")]
        total: Money,
        #[arg(long, default_value = "0")]
        commission: Money,
        #[arg(long, default_value = "0")]
        kb: Money,
        #[command(flatten)]
        period: PeriodArgs,
    },
    List {
        sales_id: i64,
    },
    Rm {
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum WorkerProjectCommand {
    Add {
        tukang_id: i64,
        #[command(flatten)]
        fields: JobFields,
        #[arg(long, default_value = "")]
        size: String,
        #[arg(long, default_value = "0")]
        kb: Money,
        #[command(flatten)]
        period: PeriodArgs,
    },
    List {
        tukang_id: i64,
    },
    Rm {
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum ProjectCommand {
    Add {
        name: String,
        #[arg(long, default_value = "")]
        sales: String,
        #[arg(long, default_value = "")]
        worker: String,
        #[arg(long, default_value = "")]
        start: String,
        #[arg(long, default_value = "")]
        end: String,
        #[arg(long, default_value = "0")]
        total: Money,
        #[arg(long, default_value = "0")]
        dp: Money,
    },
    List,
    /// Delete along with its material usage
    Rm {
        id: i64,
    },
    Summary {
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum MaterialCommand {
    Add {
        project_id: i64,
        #[arg(long)]
        item: String,
        #[arg(long)]
        quantity: f64,
        #[arg(long)]
        unit_price: Money,
        #[arg(long, default_value = "")]
        date: String,
        #[arg(long, default_value = "")]
        notes: String,
    },
    List {
        project_id: i64,
    },
    Rm {
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum ArchiveCommand {
    /// Print every row
    Show {
        name: String,
    },
    /// Add a row; fields as "Nama Konsumen=Pak Harun"
    Add {
        name: String,
        #[arg(long = "field", short = 'F')]
        fields: Vec<String>,
        #[arg(long)]
        photo: Option<PathBuf>,
    },
    /// Change a row; fields as "Keterangan=lunas"
    Edit {
        name: String,
        id: i64,
        #[arg(long = "field", short = 'F')]
        fields: Vec<String>,
        #[arg(long)]
        photo: Option<PathBuf>,
    },
    Rm {
        name: String,
        id: i64,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Err(e) = commands::run(cli) {
        pembukuan::ui::error(&e.to_string());
        std::process::exit(1);
    }
    Ok(())
}
