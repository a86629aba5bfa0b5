use anyhow::{Context, Result};
use tracing::info;

use crate::cli::{auto_migrate, connect};
use crate::database_ops::memory::MemoryWarehouse;
use crate::database_ops::source::PgSource;
use crate::database_ops::warehouse::PgWarehouse;
use crate::orchestrator::{run_load, LoadOptions};

#[derive(Debug, Clone, Default)]
pub struct LoadConfig {
    /// Optional override for the Postgres connection string.
    pub database_url: Option<String>,
    pub options: LoadOptions,
}

/// Load the warehouse and print the run report as JSON on stdout.
///
/// A dry run reads the real source but writes into an empty in-memory
/// warehouse, so the report shows what a first load would write.
pub async fn run(cfg: LoadConfig) -> Result<()> {
    cfg.options.validate()?;
    let db = connect(cfg.database_url.as_deref()).await?;
    let source = PgSource::new(db.clone());

    let result = if cfg.options.dry_run {
        info!("dry run: writes go to an in-memory warehouse");
        let warehouse = MemoryWarehouse::new();
        run_load(&source, &warehouse, &cfg.options).await
    } else {
        auto_migrate(&db).await?;
        let warehouse = PgWarehouse::new(db.clone());
        run_load(&source, &warehouse, &cfg.options).await
    };
    let report = result.context("load failed")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
