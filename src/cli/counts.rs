use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use crate::cli::connect;
use crate::database_ops::warehouse::{PgWarehouse, Warehouse};
use crate::util::db::Db;

#[derive(Debug, Clone, Default)]
pub struct CountsConfig {
    /// Optional override for the Postgres connection string.
    pub database_url: Option<String>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
struct LastRun {
    run_id: i64,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    status: String,
    dry_run: bool,
}

async fn last_run(db: &Db) -> Result<Option<LastRun>> {
    let res = sqlx::query_as::<_, LastRun>(
        "SELECT run_id, started_at, finished_at, status, dry_run \
         FROM dw_books_adaptations.etl_load_runs ORDER BY run_id DESC LIMIT 1",
    )
    .persistent(false)
    .fetch_optional(&db.pool)
    .await;
    match res {
        Ok(run) => Ok(run),
        // undefined_table: warehouse not migrated yet
        Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some("42P01") => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Print warehouse row counts and the most recent load run as JSON.
pub async fn run(cfg: CountsConfig) -> Result<()> {
    let db = connect(cfg.database_url.as_deref()).await?;
    let tables = PgWarehouse::new(db.clone()).row_counts().await?;
    let last = last_run(&db).await?;
    let out = json!({ "tables": tables, "last_run": last });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
