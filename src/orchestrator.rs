//! Load orchestration: run bookkeeping around the three load phases.
//!
//! Phase 1 runs every dimension pass and the calendar pass concurrently,
//! phase 2 the adaptation facts, phase 3 the cast bridge and box-office weeks.
use anyhow::bail;
use chrono::{NaiveDate, Utc};
use serde_json::json;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

use crate::database_ops::box_office::load_box_office;
use crate::database_ops::bridge::load_bridge;
use crate::database_ops::date_dim::{load_dates, resolve_range};
use crate::database_ops::dimensions::{
    load_actors, load_authors, load_books, load_distributors, load_genres, load_movies,
};
use crate::database_ops::facts::load_facts;
use crate::database_ops::pass::PassOptions;
use crate::database_ops::report::{LoadReport, PassSummary};
use crate::database_ops::source::SourceCatalog;
use crate::database_ops::warehouse::Warehouse;
use crate::error::LoadError;
use crate::util::env::env_parse_opt;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadOptions {
    pub pass: PassOptions,
    pub dry_run: bool,
    /// Stop after phase 1.
    pub dimensions_only: bool,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

impl LoadOptions {
    /// Pass knobs plus `DW_DATE_FROM` / `DW_DATE_TO` (YYYY-MM-DD).
    pub fn from_env() -> Self {
        Self {
            pass: PassOptions::from_env(),
            dry_run: false,
            dimensions_only: false,
            date_from: env_parse_opt::<NaiveDate>("DW_DATE_FROM"),
            date_to: env_parse_opt::<NaiveDate>("DW_DATE_TO"),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if from > to {
                bail!("date range is reversed: {from} > {to}");
            }
        }
        if self.pass.batch_size < 1 {
            bail!("batch size must be at least 1");
        }
        if self.pass.concurrency < 1 {
            bail!("concurrency must be at least 1");
        }
        Ok(())
    }
}

/// Run a full load and record it in the warehouse's run log.
///
/// The run row is closed as failed when any pass aborts; the error is returned
/// after bookkeeping so a re-run can resume from the idempotent writes.
#[instrument(skip_all, fields(dry_run = opts.dry_run, dimensions_only = opts.dimensions_only))]
pub async fn run_load(
    source: &dyn SourceCatalog,
    warehouse: &dyn Warehouse,
    opts: &LoadOptions,
) -> Result<LoadReport, LoadError> {
    let started_at = Utc::now();
    let started = Instant::now();
    let run_id = warehouse.record_run_start(opts.dry_run).await?;
    info!(run_id, "load started");

    match run_phases(source, warehouse, opts).await {
        Ok((date_range, passes)) => {
            let report = LoadReport {
                run_id,
                dry_run: opts.dry_run,
                started_at,
                elapsed_ms: started.elapsed().as_millis() as u64,
                date_range,
                passes,
            };
            warehouse
                .record_run_finish(run_id, true, &report.to_json())
                .await?;
            info!(
                run_id,
                elapsed_ms = report.elapsed_ms,
                issues = report.total_issues(),
                "load finished"
            );
            Ok(report)
        }
        Err(err) => {
            error!(run_id, error = %err, "load aborted");
            let summary = json!({
                "run_id": run_id,
                "dry_run": opts.dry_run,
                "started_at": started_at,
                "elapsed_ms": started.elapsed().as_millis() as u64,
                "error": err.to_string(),
            });
            if let Err(e) = warehouse.record_run_finish(run_id, false, &summary).await {
                warn!(run_id, error = %e, "could not close run record");
            }
            Err(err)
        }
    }
}

type PhaseOutput = (Option<(NaiveDate, NaiveDate)>, Vec<PassSummary>);

async fn run_phases(
    source: &dyn SourceCatalog,
    warehouse: &dyn Warehouse,
    opts: &LoadOptions,
) -> Result<PhaseOutput, LoadError> {
    let p = &opts.pass;
    let date_range = resolve_range(source, opts.date_from, opts.date_to, p).await?;
    if date_range.is_none() {
        warn!("source has no dates and no range was given; dim_date left as is");
    }
    let dates = async {
        match date_range {
            Some((from, to)) => load_dates(warehouse, from, to, p).await,
            None => Ok(PassSummary::new("dim_date")),
        }
    };

    info!("phase 1: dimensions and calendar");
    let (date_pass, books, authors, movies, actors, distributors, genres) = tokio::try_join!(
        dates,
        load_books(source, warehouse, p),
        load_authors(source, warehouse, p),
        load_movies(source, warehouse, p),
        load_actors(source, warehouse, p),
        load_distributors(source, warehouse, p),
        load_genres(source, warehouse, p),
    )?;
    let mut passes = vec![date_pass, books, authors, movies, actors, distributors, genres];

    if opts.dimensions_only {
        info!("dimensions only; skipping fact passes");
        return Ok((date_range, passes));
    }

    info!("phase 2: adaptation facts");
    passes.push(load_facts(source, warehouse, p).await?);

    info!("phase 3: cast bridge and box office");
    let (bridge, box_office) = tokio::try_join!(
        load_bridge(source, warehouse, p),
        load_box_office(source, warehouse, p),
    )?;
    passes.push(bridge);
    passes.push(box_office);

    Ok((date_range, passes))
}
