use chrono::NaiveDate;
use std::time::Instant;
use tracing::info;

use crate::database_ops::model::DateRow;
use crate::database_ops::pass::PassOptions;
use crate::database_ops::report::PassSummary;
use crate::database_ops::source::SourceCatalog;
use crate::database_ops::warehouse::Warehouse;
use crate::error::LoadError;
use crate::normalization::calendar::{covering_range, date_row, days};
use crate::util::retry::with_retry;

/// Explicit bounds win; a missing bound is filled from the source's covering range.
/// None when neither bound is given and the source has no dates.
pub async fn resolve_range(
    source: &dyn SourceCatalog,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    opts: &PassOptions,
) -> Result<Option<(NaiveDate, NaiveDate)>, LoadError> {
    if let (Some(f), Some(t)) = (from, to) {
        return Ok(Some((f, t)));
    }
    let span = with_retry(&opts.retry, "date_span", || source.date_span()).await?;
    let derived = covering_range(span);
    Ok(match (from, to, derived) {
        (Some(f), None, Some((_, t))) => Some((f, t)),
        (None, Some(t), Some((f, _))) => Some((f, t)),
        (None, None, d) => d,
        (Some(f), None, None) => Some((f, f)),
        (None, Some(t), None) => Some((t, t)),
        (Some(f), Some(t), _) => Some((f, t)),
    })
}

/// Ensure one `dim_date` row per day in `[from, to]`. Existing rows are never touched.
pub async fn load_dates(
    warehouse: &dyn Warehouse,
    from: NaiveDate,
    to: NaiveDate,
    opts: &PassOptions,
) -> Result<PassSummary, LoadError> {
    let started = Instant::now();
    let mut summary = PassSummary::new("dim_date");
    if from > to {
        return Err(LoadError::InvalidSource(format!(
            "date range is reversed: {from} > {to}"
        )));
    }
    info!(%from, %to, "generating calendar");

    let mut rows: Vec<DateRow> = Vec::new();
    for d in days(from, to) {
        match date_row(d) {
            Ok(row) => rows.push(row),
            Err(err) => {
                summary.record_read(1);
                summary.record_issue(format!("date={d}"), &err);
            }
        }
    }
    let chunk = usize::try_from(opts.batch_size).unwrap_or(500).max(1);
    for batch in rows.chunks(chunk) {
        let inserted = with_retry(&opts.retry, "dim_date", || warehouse.insert_dates(batch)).await?;
        summary.record_read(batch.len());
        summary.inserted += inserted;
        summary.unchanged += batch.len() as u64 - inserted;
    }

    summary.elapsed_ms = started.elapsed().as_millis() as u64;
    summary.log();
    Ok(summary)
}
