//! In-process warehouse with the same unique-key, foreign-key and
//! never-update-dates semantics as the Postgres schema. Backs `--dry-run`.
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::Mutex;

use crate::database_ops::model::{
    AdaptationActorRow, AdaptationFact, BoxOfficeWeekFact, DateRow, Dimension, DimensionRow,
    Upserted,
};
use crate::database_ops::warehouse::{TableCount, Warehouse, WAREHOUSE_TABLES};
use crate::error::LoadError;

#[derive(Debug, Clone)]
struct Keyed<T> {
    key: i64,
    row: T,
}

#[derive(Debug, Clone)]
pub struct RunRecord {
    pub run_id: i64,
    pub dry_run: bool,
    pub status: &'static str,
    pub summary: Option<serde_json::Value>,
}

#[derive(Default)]
struct State {
    next_key: i64,
    /// natural key -> surrogate + row, per dimension
    dims: HashMap<Dimension, BTreeMap<i64, Keyed<DimensionRow>>>,
    dim_keys: HashMap<Dimension, HashSet<i64>>,
    dates: BTreeMap<i32, DateRow>,
    facts: BTreeMap<(i64, i64), Keyed<AdaptationFact>>,
    fact_keys: HashSet<i64>,
    bridge: BTreeMap<(i64, i64), Keyed<AdaptationActorRow>>,
    box_office: BTreeMap<(i64, i32), Keyed<BoxOfficeWeekFact>>,
    runs: Vec<RunRecord>,
}

impl State {
    fn has_dim_key(&self, dimension: Dimension, key: i64) -> bool {
        self.dim_keys
            .get(&dimension)
            .is_some_and(|keys| keys.contains(&key))
    }

    fn check_fk(&self, table: &str, dimension: Dimension, key: Option<i64>) -> Result<(), LoadError> {
        match key {
            Some(k) if !self.has_dim_key(dimension, k) => Err(fk_violation(table, dimension.key_column(), k)),
            _ => Ok(()),
        }
    }

    fn check_date(&self, table: &str, column: &str, key: Option<i32>) -> Result<(), LoadError> {
        match key {
            Some(k) if !self.dates.contains_key(&k) => Err(fk_violation(table, column, k as i64)),
            _ => Ok(()),
        }
    }
}

fn fk_violation(table: &str, column: &str, key: i64) -> LoadError {
    LoadError::ConstraintViolation {
        table: table.to_string(),
        message: format!("insert violates foreign key: {column}={key} is not present"),
    }
}

fn allocator(next_key: &mut i64) -> impl FnOnce() -> i64 + '_ {
    move || {
        *next_key += 1;
        *next_key
    }
}

/// Insert-or-update under a unique key, reusing the existing surrogate.
fn upsert_keyed<K: Ord, T>(
    map: &mut BTreeMap<K, Keyed<T>>,
    unique: K,
    row: T,
    allocate: impl FnOnce() -> i64,
) -> Upserted {
    match map.get_mut(&unique) {
        Some(existing) => {
            existing.row = row;
            Upserted {
                key: existing.key,
                created: false,
            }
        }
        None => {
            let key = allocate();
            map.insert(unique, Keyed { key, row });
            Upserted { key, created: true }
        }
    }
}

#[derive(Default)]
pub struct MemoryWarehouse {
    state: Mutex<State>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn dimension_row(&self, dimension: Dimension, natural_key: i64) -> Option<DimensionRow> {
        let st = self.state.lock().await;
        st.dims
            .get(&dimension)?
            .get(&natural_key)
            .map(|k| k.row.clone())
    }

    pub async fn fact(&self, book_key: i64, movie_key: i64) -> Option<AdaptationFact> {
        let st = self.state.lock().await;
        st.facts.get(&(book_key, movie_key)).map(|k| k.row.clone())
    }

    pub async fn date(&self, date_key: i32) -> Option<DateRow> {
        self.state.lock().await.dates.get(&date_key).cloned()
    }

    pub async fn box_office_week(&self, movie_key: i64, weekend_date_key: i32) -> Option<BoxOfficeWeekFact> {
        let st = self.state.lock().await;
        st.box_office
            .get(&(movie_key, weekend_date_key))
            .map(|k| k.row.clone())
    }

    pub async fn runs(&self) -> Vec<RunRecord> {
        self.state.lock().await.runs.clone()
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn upsert_dimension(&self, row: &DimensionRow) -> Result<Upserted, LoadError> {
        let mut guard = self.state.lock().await;
        let st = &mut *guard;
        let dimension = row.dimension();
        let natural = row.natural_key();
        let out = upsert_keyed(
            st.dims.entry(dimension).or_default(),
            natural,
            row.clone(),
            allocator(&mut st.next_key),
        );
        st.dim_keys.entry(dimension).or_default().insert(out.key);
        Ok(out)
    }

    async fn insert_dates(&self, rows: &[DateRow]) -> Result<u64, LoadError> {
        let mut st = self.state.lock().await;
        let mut inserted = 0u64;
        for r in rows {
            if let std::collections::btree_map::Entry::Vacant(slot) = st.dates.entry(r.date_key) {
                slot.insert(r.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn surrogate_key(
        &self,
        dimension: Dimension,
        natural_key: i64,
    ) -> Result<Option<i64>, LoadError> {
        let st = self.state.lock().await;
        if dimension == Dimension::Date {
            let key = i32::try_from(natural_key).ok().filter(|k| st.dates.contains_key(k));
            return Ok(key.map(i64::from));
        }
        Ok(st
            .dims
            .get(&dimension)
            .and_then(|m| m.get(&natural_key))
            .map(|k| k.key))
    }

    async fn upsert_adaptation(&self, fact: &AdaptationFact) -> Result<Upserted, LoadError> {
        const TABLE: &str = "fact_adaptation";
        let mut guard = self.state.lock().await;
        let st = &mut *guard;
        st.check_fk(TABLE, Dimension::Book, Some(fact.book_key))?;
        st.check_fk(TABLE, Dimension::Movie, Some(fact.movie_key))?;
        st.check_fk(TABLE, Dimension::Author, fact.author_key)?;
        st.check_fk(TABLE, Dimension::Distributor, fact.distributor_key)?;
        st.check_fk(TABLE, Dimension::Genre, fact.genre_key)?;
        st.check_date(TABLE, "release_date_key", fact.release_date_key)?;
        let out = upsert_keyed(
            &mut st.facts,
            (fact.book_key, fact.movie_key),
            fact.clone(),
            allocator(&mut st.next_key),
        );
        st.fact_keys.insert(out.key);
        Ok(out)
    }

    async fn adaptation_key(
        &self,
        book_key: i64,
        movie_key: i64,
    ) -> Result<Option<i64>, LoadError> {
        let st = self.state.lock().await;
        Ok(st.facts.get(&(book_key, movie_key)).map(|k| k.key))
    }

    async fn upsert_adaptation_actor(
        &self,
        row: &AdaptationActorRow,
    ) -> Result<Upserted, LoadError> {
        const TABLE: &str = "fact_adaptation_actor";
        let mut guard = self.state.lock().await;
        let st = &mut *guard;
        if !st.fact_keys.contains(&row.adaptation_key) {
            return Err(fk_violation(TABLE, "adaptation_key", row.adaptation_key));
        }
        st.check_fk(TABLE, Dimension::Actor, Some(row.actor_key))?;
        Ok(upsert_keyed(
            &mut st.bridge,
            (row.adaptation_key, row.actor_key),
            row.clone(),
            allocator(&mut st.next_key),
        ))
    }

    async fn upsert_box_office_week(
        &self,
        row: &BoxOfficeWeekFact,
    ) -> Result<Upserted, LoadError> {
        const TABLE: &str = "fact_box_office_week";
        let mut guard = self.state.lock().await;
        let st = &mut *guard;
        st.check_fk(TABLE, Dimension::Movie, Some(row.movie_key))?;
        st.check_fk(TABLE, Dimension::Distributor, row.distributor_key)?;
        st.check_date(TABLE, "weekend_date_key", Some(row.weekend_date_key))?;
        Ok(upsert_keyed(
            &mut st.box_office,
            (row.movie_key, row.weekend_date_key),
            row.clone(),
            allocator(&mut st.next_key),
        ))
    }

    async fn row_counts(&self) -> Result<Vec<TableCount>, LoadError> {
        let st = self.state.lock().await;
        let dim_len = |d: Dimension| st.dims.get(&d).map_or(0, |m| m.len());
        Ok(WAREHOUSE_TABLES
            .iter()
            .map(|&table| {
                let rows = match table {
                    "dim_date" => st.dates.len(),
                    "dim_book" => dim_len(Dimension::Book),
                    "dim_author" => dim_len(Dimension::Author),
                    "dim_movie" => dim_len(Dimension::Movie),
                    "dim_actor" => dim_len(Dimension::Actor),
                    "dim_distributor" => dim_len(Dimension::Distributor),
                    "dim_genre" => dim_len(Dimension::Genre),
                    "fact_adaptation" => st.facts.len(),
                    "fact_adaptation_actor" => st.bridge.len(),
                    "fact_box_office_week" => st.box_office.len(),
                    _ => 0,
                };
                TableCount {
                    table: table.to_string(),
                    rows: rows as i64,
                }
            })
            .collect())
    }

    async fn record_run_start(&self, dry_run: bool) -> Result<i64, LoadError> {
        let mut st = self.state.lock().await;
        let run_id = st.runs.len() as i64 + 1;
        st.runs.push(RunRecord {
            run_id,
            dry_run,
            status: "running",
            summary: None,
        });
        Ok(run_id)
    }

    async fn record_run_finish(
        &self,
        run_id: i64,
        succeeded: bool,
        summary: &serde_json::Value,
    ) -> Result<(), LoadError> {
        let mut st = self.state.lock().await;
        let run = st
            .runs
            .iter_mut()
            .find(|r| r.run_id == run_id)
            .ok_or_else(|| LoadError::Storage(format!("unknown run_id {run_id}")))?;
        run.status = if succeeded { "succeeded" } else { "failed" };
        run.summary = Some(summary.clone());
        Ok(())
    }
}
