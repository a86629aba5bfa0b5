use anyhow::{Context, Result};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions, PgSslMode},
    PgPool, Row,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

use crate::util::env::env_opt;

const MIGRATIONS_TABLE: &str = "public._dw_migrations";

#[derive(Clone)]
pub struct Db {
    pub pool: PgPool,
}

/// A numbered migration file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    pub version: i64,
    pub description: String,
    pub path: PathBuf,
}

impl Db {
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let mut connect_options =
            PgConnectOptions::from_str(database_url).context("invalid database url")?;

        if database_url.contains("sslmode=require") && !database_url.contains("sslmode=disable") {
            connect_options = connect_options.ssl_mode(PgSslMode::Require);
        }
        // PgBouncer txn mode safe
        connect_options = connect_options.statement_cache_capacity(0);

        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("SET application_name = 'adaptation-dw'")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect_with(connect_options)
            .await
            .context("failed to connect to postgres")?;
        info!(max_connections, "connected to db");
        Ok(Self { pool })
    }

    /// Apply every pending `NNNN_name.sql` file from `dir` in version order.
    /// Returns the versions applied by this call.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self, dir: &Path) -> Result<Vec<i64>> {
        if !dir.exists() {
            anyhow::bail!("migrations directory {} does not exist", dir.display());
        }
        sqlx::raw_sql(
            "CREATE TABLE IF NOT EXISTS public._dw_migrations (
                version BIGINT PRIMARY KEY,
                description TEXT NOT NULL,
                installed_at TIMESTAMPTZ NOT NULL DEFAULT now()
             )",
        )
        .execute(&self.pool)
        .await?;

        let applied_rows = sqlx::raw_sql(&format!("SELECT version FROM {MIGRATIONS_TABLE}"))
            .fetch_all(&self.pool)
            .await?;
        let mut applied: HashSet<i64> = HashSet::new();
        for r in applied_rows {
            applied.insert(r.try_get::<i64, _>(0)?);
        }

        let mut newly_applied = Vec::new();
        for migration in discover_migrations(dir)? {
            if applied.contains(&migration.version) {
                continue;
            }
            let sql = std::fs::read_to_string(&migration.path)
                .with_context(|| format!("reading {}", migration.path.display()))?;
            info!(version = migration.version, file = ?migration.path, "applying migration");

            let mut tx = self.pool.begin().await?;
            sqlx::raw_sql(&sql)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("migration {} failed", migration.version))?;
            sqlx::query(&format!(
                "INSERT INTO {MIGRATIONS_TABLE} (version, description) VALUES ($1, $2)"
            ))
            .persistent(false)
            .bind(migration.version)
            .bind(&migration.description)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;

            applied.insert(migration.version);
            newly_applied.push(migration.version);
        }
        info!(applied = newly_applied.len(), "migrations up to date");
        Ok(newly_applied)
    }
}

/// Migrations directory: `DW_MIGRATIONS_DIR` or `./migrations`.
pub fn migrations_dir() -> PathBuf {
    env_opt("DW_MIGRATIONS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./migrations"))
}

/// List numbered migration files in `dir`, sorted by version.
pub fn discover_migrations(dir: &Path) -> Result<Vec<MigrationFile>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(fname) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        if let Some((version, description)) = parse_migration_name(fname) {
            out.push(MigrationFile {
                version,
                description,
                path: path.clone(),
            });
        }
    }
    out.sort_by_key(|m| m.version);
    if let Some(w) = out.windows(2).find(|w| w[0].version == w[1].version) {
        anyhow::bail!(
            "duplicate migration version {} ({} / {})",
            w[0].version,
            w[0].path.display(),
            w[1].path.display()
        );
    }
    Ok(out)
}

/// pattern: digits '_' rest '.sql'
fn parse_migration_name(fname: &str) -> Option<(i64, String)> {
    let stem = fname.strip_suffix(".sql")?;
    let digits_len = stem.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits_len == 0 {
        return None;
    }
    let (num, rest) = stem.split_at(digits_len);
    let desc = rest.strip_prefix('_')?;
    if desc.is_empty() {
        return None;
    }
    Some((num.parse().ok()?, desc.to_string()))
}
