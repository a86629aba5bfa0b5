//! Generic keyset-paged pass: read a page, write its rows with bounded
//! concurrency, fold outcomes into a [`PassSummary`], repeat until the source
//! signals the last page.
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::time::Instant;
use tracing::{debug, error};

use crate::database_ops::model::{Page, RowKey, Upserted};
use crate::database_ops::report::PassSummary;
use crate::database_ops::source::START;
use crate::error::LoadError;
use crate::util::env::env_parse;
use crate::util::retry::{with_retry, RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassOptions {
    /// Source entities per page.
    pub batch_size: i64,
    /// Row writes in flight per pass.
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

impl Default for PassOptions {
    fn default() -> Self {
        Self {
            batch_size: 500,
            concurrency: 8,
            retry: RetryPolicy::default(),
        }
    }
}

impl PassOptions {
    /// `DW_BATCH_SIZE`, `DW_CONCURRENCY` and the retry knobs.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            batch_size: env_parse::<i64>("DW_BATCH_SIZE", d.batch_size).max(1),
            concurrency: env_parse::<usize>("DW_CONCURRENCY", d.concurrency).max(1),
            retry: RetryPolicy::from_env(),
        }
    }
}

/// Drive one pass.
///
/// `fetch(after)` returns the next page; `write(row)` performs one idempotent
/// upsert. Both are retried on transient errors. Row-level errors from `write`
/// are recorded on the summary; anything else (including exhausted retries)
/// aborts the pass.
///
/// Every error from `fetch` aborts the pass, including `InvalidSource` from a
/// column that fails to decode: a failed page has no single row to charge it to.
pub async fn drive<T, F, FFut, W, WFut>(
    name: &'static str,
    opts: &PassOptions,
    fetch: F,
    write: W,
) -> Result<PassSummary, LoadError>
where
    T: RowKey + Clone + Send,
    F: Fn(i64) -> FFut,
    FFut: Future<Output = Result<Page<T>, LoadError>>,
    W: Fn(T) -> WFut,
    WFut: Future<Output = Result<Upserted, LoadError>>,
{
    let started = Instant::now();
    let mut summary = PassSummary::new(name);
    let mut after = START;
    let mut pages = 0u64;

    loop {
        let page = with_retry(&opts.retry, name, || fetch(after)).await?;
        pages += 1;
        summary.record_read(page.rows.len());
        debug!(pass = name, page = pages, rows = page.rows.len(), after, "page fetched");

        let write = &write;
        let outcomes: Vec<(String, Result<Upserted, LoadError>)> = stream::iter(page.rows)
            .map(|row| async move {
                let key = row.row_key();
                let res = with_retry(&opts.retry, name, || write(row.clone())).await;
                (key, res)
            })
            .buffer_unordered(opts.concurrency.max(1))
            .collect()
            .await;

        for (key, res) in outcomes {
            match res {
                Ok(out) => summary.record_upsert(out),
                Err(err) => {
                    if !summary.record_issue(key.clone(), &err) {
                        error!(pass = name, key = %key, error = %err, "aborting pass");
                        return Err(err);
                    }
                }
            }
        }

        match page.next {
            Some(next) if next > after => after = next,
            _ => break,
        }
    }

    summary.elapsed_ms = started.elapsed().as_millis() as u64;
    summary.log();
    Ok(summary)
}
