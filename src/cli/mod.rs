pub mod counts;
pub mod dates;
pub mod load;
pub mod migrate;

use anyhow::{Context, Result};
use tracing::info;

use crate::util::db::{migrations_dir, Db};
use crate::util::env::{db_url, env_flag, env_parse, redact_dsn};

/// Connect with an explicit URL or the env-resolved one; pool size from `DW_MAX_CONNECTIONS`.
pub async fn connect(database_url: Option<&str>) -> Result<Db> {
    let url = match database_url {
        Some(u) => u.to_string(),
        None => db_url().context("database url")?,
    };
    let max_connections = env_parse::<u32>("DW_MAX_CONNECTIONS", 10);
    info!(url = %redact_dsn(&url), max_connections, "connecting");
    Db::connect(&url, max_connections).await
}

/// Apply pending migrations first when `DW_AUTO_MIGRATE` is set.
pub async fn auto_migrate(db: &Db) -> Result<()> {
    if env_flag("DW_AUTO_MIGRATE", false) {
        let applied = db.run_migrations(&migrations_dir()).await?;
        info!(applied = ?applied, "auto-migrate complete");
    }
    Ok(())
}
