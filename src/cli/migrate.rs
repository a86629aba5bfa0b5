use anyhow::Result;
use std::path::PathBuf;
use tracing::info;

use crate::cli::connect;
use crate::util::db::migrations_dir;
use crate::util::env::preflight_check;

#[derive(Debug, Clone, Default)]
pub struct MigrateConfig {
    pub database_url: Option<String>,
    /// Defaults to `DW_MIGRATIONS_DIR` or `./migrations`.
    pub dir: Option<PathBuf>,
}

pub async fn run(cfg: MigrateConfig) -> Result<()> {
    if cfg.database_url.is_none() {
        preflight_check(
            "migrate",
            &[],
            &["DW_DATABASE_URL", "DATABASE_URL", "DW_MIGRATIONS_DIR"],
        )?;
    }
    let dir = cfg.dir.unwrap_or_else(migrations_dir);
    let db = connect(cfg.database_url.as_deref()).await?;
    let applied = db.run_migrations(&dir).await?;
    if applied.is_empty() {
        info!(dir = %dir.display(), "nothing to apply");
    }
    println!("{}", serde_json::json!({ "applied": applied }));
    Ok(())
}
