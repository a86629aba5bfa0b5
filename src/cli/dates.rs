use anyhow::{Context, Result};
use chrono::NaiveDate;

use crate::cli::{auto_migrate, connect};
use crate::database_ops::date_dim::load_dates;
use crate::database_ops::pass::PassOptions;
use crate::database_ops::warehouse::PgWarehouse;

#[derive(Debug, Clone)]
pub struct DatesConfig {
    pub database_url: Option<String>,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

/// Populate `dim_date` for an explicit range without touching anything else.
pub async fn run(cfg: DatesConfig) -> Result<()> {
    if cfg.from > cfg.to {
        anyhow::bail!("--from {} is after --to {}", cfg.from, cfg.to);
    }
    let db = connect(cfg.database_url.as_deref()).await?;
    auto_migrate(&db).await?;
    let warehouse = PgWarehouse::new(db);
    let summary = load_dates(&warehouse, cfg.from, cfg.to, &PassOptions::from_env())
        .await
        .context("dim_date load failed")?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
