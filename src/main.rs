use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use adaptation_dw::cli::{counts, dates, load, migrate};
use adaptation_dw::orchestrator::LoadOptions;
use adaptation_dw::util::env;

#[derive(Parser, Debug)]
#[command(
    name = "adaptation-dw",
    version,
    about = "Book-to-screen adaptation warehouse loader"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Apply pending SQL migrations (source and warehouse schemas)
    Migrate {
        /// Optional override for the database URL
        #[arg(long)]
        db_url: Option<String>,
        /// Migrations directory (default: DW_MIGRATIONS_DIR or ./migrations)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Load dimensions, calendar and facts from the source schema
    Load {
        /// Optional override for the database URL
        #[arg(long)]
        db_url: Option<String>,
        /// Read the source but write into an in-memory warehouse and report
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        /// Stop after dimension and calendar passes
        #[arg(long, default_value_t = false)]
        dimensions_only: bool,
        /// First calendar day (YYYY-MM-DD; default: derived from source dates)
        #[arg(long)]
        date_from: Option<NaiveDate>,
        /// Last calendar day (YYYY-MM-DD; default: derived from source dates)
        #[arg(long)]
        date_to: Option<NaiveDate>,
        /// Source entities per page (default: DW_BATCH_SIZE or 500)
        #[arg(long)]
        batch_size: Option<i64>,
        /// Row writes in flight per pass (default: DW_CONCURRENCY or 8)
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Populate dim_date for an explicit range
    Dates {
        /// Optional override for the database URL
        #[arg(long)]
        db_url: Option<String>,
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
    },
    /// Print warehouse row counts and the last load run
    Counts {
        /// Optional override for the database URL
        #[arg(long)]
        db_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env::bootstrap_cli("adaptation-dw")?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Migrate { db_url, dir } => {
            migrate::run(migrate::MigrateConfig {
                database_url: db_url,
                dir,
            })
            .await
        }
        Commands::Load {
            db_url,
            dry_run,
            dimensions_only,
            date_from,
            date_to,
            batch_size,
            concurrency,
        } => {
            let mut options = LoadOptions::from_env();
            options.dry_run = dry_run;
            options.dimensions_only = dimensions_only;
            options.date_from = date_from.or(options.date_from);
            options.date_to = date_to.or(options.date_to);
            if let Some(n) = batch_size {
                options.pass.batch_size = n;
            }
            if let Some(n) = concurrency {
                options.pass.concurrency = n;
            }
            load::run(load::LoadConfig {
                database_url: db_url,
                options,
            })
            .await
        }
        Commands::Dates { db_url, from, to } => {
            dates::run(dates::DatesConfig {
                database_url: db_url,
                from,
                to,
            })
            .await
        }
        Commands::Counts { db_url } => {
            counts::run(counts::CountsConfig {
                database_url: db_url,
            })
            .await
        }
    }
}
