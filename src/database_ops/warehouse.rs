//! Write side: idempotent upserts into `dw_books_adaptations`.
use async_trait::async_trait;
use serde::Serialize;
use sqlx::{Postgres, QueryBuilder};
use tracing::{debug, instrument};

use crate::database_ops::model::{
    AdaptationActorRow, AdaptationFact, BoxOfficeWeekFact, DateRow, Dimension, DimensionRow,
    Upserted,
};
use crate::error::LoadError;
use crate::util::db::Db;

/// Tables reported by `row_counts`, in load order.
pub const WAREHOUSE_TABLES: [&str; 10] = [
    "dim_date",
    "dim_book",
    "dim_author",
    "dim_movie",
    "dim_actor",
    "dim_distributor",
    "dim_genre",
    "fact_adaptation",
    "fact_adaptation_actor",
    "fact_box_office_week",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCount {
    pub table: String,
    pub rows: i64,
}

/// Warehouse writer. The store's unique constraints are the only authority on
/// whether a natural key already exists; implementations keep no key cache.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Insert on first sight of the natural key, otherwise update descriptive attributes.
    async fn upsert_dimension(&self, row: &DimensionRow) -> Result<Upserted, LoadError>;
    /// Insert missing dates; existing dates are left untouched. Returns rows inserted.
    async fn insert_dates(&self, rows: &[DateRow]) -> Result<u64, LoadError>;
    async fn surrogate_key(
        &self,
        dimension: Dimension,
        natural_key: i64,
    ) -> Result<Option<i64>, LoadError>;
    /// Upsert keyed by (book_key, movie_key); measures are overwritten.
    async fn upsert_adaptation(&self, fact: &AdaptationFact) -> Result<Upserted, LoadError>;
    async fn adaptation_key(&self, book_key: i64, movie_key: i64)
        -> Result<Option<i64>, LoadError>;
    async fn upsert_adaptation_actor(&self, row: &AdaptationActorRow)
        -> Result<Upserted, LoadError>;
    async fn upsert_box_office_week(&self, row: &BoxOfficeWeekFact)
        -> Result<Upserted, LoadError>;
    async fn row_counts(&self) -> Result<Vec<TableCount>, LoadError>;
    async fn record_run_start(&self, dry_run: bool) -> Result<i64, LoadError>;
    async fn record_run_finish(
        &self,
        run_id: i64,
        succeeded: bool,
        summary: &serde_json::Value,
    ) -> Result<(), LoadError>;
}

/// Postgres-backed warehouse.
#[derive(Clone)]
pub struct PgWarehouse {
    db: Db,
}

impl PgWarehouse {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

// Postgres caps bind parameters at 65535; 11 columns per date row.
const DATE_CHUNK: usize = 2000;

const UPSERT_BOOK_SQL: &str = r#"
INSERT INTO dw_books_adaptations.dim_book
       (source_book_id, title, primary_author, all_authors, isbn13, language_code, num_pages,
        publisher, publication_year, average_rating, ratings_count, text_reviews_count)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
ON CONFLICT (source_book_id) DO UPDATE SET
       title = EXCLUDED.title,
       primary_author = EXCLUDED.primary_author,
       all_authors = EXCLUDED.all_authors,
       isbn13 = EXCLUDED.isbn13,
       language_code = EXCLUDED.language_code,
       num_pages = EXCLUDED.num_pages,
       publisher = EXCLUDED.publisher,
       publication_year = EXCLUDED.publication_year,
       average_rating = EXCLUDED.average_rating,
       ratings_count = EXCLUDED.ratings_count,
       text_reviews_count = EXCLUDED.text_reviews_count,
       updated_at = now()
RETURNING book_key, (xmax = 0) AS inserted
"#;

const UPSERT_AUTHOR_SQL: &str = r#"
INSERT INTO dw_books_adaptations.dim_author
       (source_author_id, author_name, average_rating, ratings_count, books_count)
VALUES ($1, $2, $3, $4, $5)
ON CONFLICT (source_author_id) DO UPDATE SET
       author_name = EXCLUDED.author_name,
       average_rating = EXCLUDED.average_rating,
       ratings_count = EXCLUDED.ratings_count,
       books_count = EXCLUDED.books_count,
       updated_at = now()
RETURNING author_key, (xmax = 0) AS inserted
"#;

const UPSERT_MOVIE_SQL: &str = r#"
INSERT INTO dw_books_adaptations.dim_movie
       (source_movie_id, tmdb_id, imdb_id, title, original_title, release_date, release_year,
        runtime_minutes, original_language, status, budget, revenue, popularity)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
ON CONFLICT (source_movie_id) DO UPDATE SET
       tmdb_id = EXCLUDED.tmdb_id,
       imdb_id = EXCLUDED.imdb_id,
       title = EXCLUDED.title,
       original_title = EXCLUDED.original_title,
       release_date = EXCLUDED.release_date,
       release_year = EXCLUDED.release_year,
       runtime_minutes = EXCLUDED.runtime_minutes,
       original_language = EXCLUDED.original_language,
       status = EXCLUDED.status,
       budget = EXCLUDED.budget,
       revenue = EXCLUDED.revenue,
       popularity = EXCLUDED.popularity,
       updated_at = now()
RETURNING movie_key, (xmax = 0) AS inserted
"#;

const UPSERT_ACTOR_SQL: &str = r#"
INSERT INTO dw_books_adaptations.dim_actor
       (source_person_id, imdb_id, tmdb_id, name, gender, birth_year, known_for_department, popularity)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
ON CONFLICT (source_person_id) DO UPDATE SET
       imdb_id = EXCLUDED.imdb_id,
       tmdb_id = EXCLUDED.tmdb_id,
       name = EXCLUDED.name,
       gender = EXCLUDED.gender,
       birth_year = EXCLUDED.birth_year,
       known_for_department = EXCLUDED.known_for_department,
       popularity = EXCLUDED.popularity,
       updated_at = now()
RETURNING actor_key, (xmax = 0) AS inserted
"#;

const UPSERT_DISTRIBUTOR_SQL: &str = r#"
INSERT INTO dw_books_adaptations.dim_distributor
       (source_distributor_id, distributor_name, market_share, total_gross, movies_count)
VALUES ($1, $2, $3, $4, $5)
ON CONFLICT (source_distributor_id) DO UPDATE SET
       distributor_name = EXCLUDED.distributor_name,
       market_share = EXCLUDED.market_share,
       total_gross = EXCLUDED.total_gross,
       movies_count = EXCLUDED.movies_count,
       updated_at = now()
RETURNING distributor_key, (xmax = 0) AS inserted
"#;

const UPSERT_GENRE_SQL: &str = r#"
INSERT INTO dw_books_adaptations.dim_genre (source_genre_id, genre_name)
VALUES ($1, $2)
ON CONFLICT (source_genre_id) DO UPDATE SET
       genre_name = EXCLUDED.genre_name,
       updated_at = now()
RETURNING genre_key, (xmax = 0) AS inserted
"#;

const UPSERT_ADAPTATION_SQL: &str = r#"
INSERT INTO dw_books_adaptations.fact_adaptation
       (book_key, movie_key, author_key, distributor_key, genre_key, release_date_key,
        source_adaptation_id, adaptation_type, budget, revenue, profit, roi,
        adaptation_gap_years, fidelity_score, imdb_rating, imdb_votes, tmdb_vote_average,
        tmdb_vote_count, tmdb_popularity, book_average_rating, book_ratings_count,
        avg_cast_popularity)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18,
        $19, $20, $21, $22)
ON CONFLICT ON CONSTRAINT fact_adaptation_book_movie_key DO UPDATE SET
       author_key = EXCLUDED.author_key,
       distributor_key = EXCLUDED.distributor_key,
       genre_key = EXCLUDED.genre_key,
       release_date_key = EXCLUDED.release_date_key,
       source_adaptation_id = EXCLUDED.source_adaptation_id,
       adaptation_type = EXCLUDED.adaptation_type,
       budget = EXCLUDED.budget,
       revenue = EXCLUDED.revenue,
       profit = EXCLUDED.profit,
       roi = EXCLUDED.roi,
       adaptation_gap_years = EXCLUDED.adaptation_gap_years,
       fidelity_score = EXCLUDED.fidelity_score,
       imdb_rating = EXCLUDED.imdb_rating,
       imdb_votes = EXCLUDED.imdb_votes,
       tmdb_vote_average = EXCLUDED.tmdb_vote_average,
       tmdb_vote_count = EXCLUDED.tmdb_vote_count,
       tmdb_popularity = EXCLUDED.tmdb_popularity,
       book_average_rating = EXCLUDED.book_average_rating,
       book_ratings_count = EXCLUDED.book_ratings_count,
       avg_cast_popularity = EXCLUDED.avg_cast_popularity,
       updated_at = now()
RETURNING adaptation_key, (xmax = 0) AS inserted
"#;

const UPSERT_ADAPTATION_ACTOR_SQL: &str = r#"
INSERT INTO dw_books_adaptations.fact_adaptation_actor
       (adaptation_key, actor_key, character_name, cast_order, is_lead_role)
VALUES ($1, $2, $3, $4, $5)
ON CONFLICT ON CONSTRAINT fact_adaptation_actor_pair_key DO UPDATE SET
       character_name = EXCLUDED.character_name,
       cast_order = EXCLUDED.cast_order,
       is_lead_role = EXCLUDED.is_lead_role
RETURNING adaptation_actor_key, (xmax = 0) AS inserted
"#;

const UPSERT_BOX_OFFICE_WEEK_SQL: &str = r#"
INSERT INTO dw_books_adaptations.fact_box_office_week
       (movie_key, weekend_date_key, distributor_key, rank_position, weekend_gross, theaters,
        total_gross_to_date, weeks_in_release, from_daily_rollup)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
ON CONFLICT ON CONSTRAINT fact_box_office_week_movie_weekend_key DO UPDATE SET
       distributor_key = EXCLUDED.distributor_key,
       rank_position = EXCLUDED.rank_position,
       weekend_gross = EXCLUDED.weekend_gross,
       theaters = EXCLUDED.theaters,
       total_gross_to_date = EXCLUDED.total_gross_to_date,
       weeks_in_release = EXCLUDED.weeks_in_release,
       from_daily_rollup = EXCLUDED.from_daily_rollup,
       updated_at = now()
RETURNING box_office_week_key, (xmax = 0) AS inserted
"#;

fn upserted((key, created): (i64, bool)) -> Upserted {
    Upserted { key, created }
}

fn is_undefined_table_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("42P01"),
        _ => false,
    }
}

#[async_trait]
impl Warehouse for PgWarehouse {
    #[instrument(level = "debug", skip(self, row), fields(dimension = %row.dimension(), natural_key = row.natural_key()))]
    async fn upsert_dimension(&self, row: &DimensionRow) -> Result<Upserted, LoadError> {
        let pool = &self.db.pool;
        let out = match row {
            DimensionRow::Book(r) => {
                sqlx::query_as::<_, (i64, bool)>(UPSERT_BOOK_SQL)
                    .persistent(false)
                    .bind(r.source_book_id)
                    .bind(&r.title)
                    .bind(&r.primary_author)
                    .bind(&r.all_authors)
                    .bind(&r.isbn13)
                    .bind(&r.language_code)
                    .bind(r.num_pages)
                    .bind(&r.publisher)
                    .bind(r.publication_year)
                    .bind(r.average_rating)
                    .bind(r.ratings_count)
                    .bind(r.text_reviews_count)
                    .fetch_one(pool)
                    .await?
            }
            DimensionRow::Author(r) => {
                sqlx::query_as::<_, (i64, bool)>(UPSERT_AUTHOR_SQL)
                    .persistent(false)
                    .bind(r.source_author_id)
                    .bind(&r.author_name)
                    .bind(r.average_rating)
                    .bind(r.ratings_count)
                    .bind(r.books_count)
                    .fetch_one(pool)
                    .await?
            }
            DimensionRow::Movie(r) => {
                sqlx::query_as::<_, (i64, bool)>(UPSERT_MOVIE_SQL)
                    .persistent(false)
                    .bind(r.source_movie_id)
                    .bind(r.tmdb_id)
                    .bind(&r.imdb_id)
                    .bind(&r.title)
                    .bind(&r.original_title)
                    .bind(r.release_date)
                    .bind(r.release_year)
                    .bind(r.runtime_minutes)
                    .bind(&r.original_language)
                    .bind(&r.status)
                    .bind(r.budget)
                    .bind(r.revenue)
                    .bind(r.popularity)
                    .fetch_one(pool)
                    .await?
            }
            DimensionRow::Actor(r) => {
                sqlx::query_as::<_, (i64, bool)>(UPSERT_ACTOR_SQL)
                    .persistent(false)
                    .bind(r.source_person_id)
                    .bind(&r.imdb_id)
                    .bind(r.tmdb_id)
                    .bind(&r.name)
                    .bind(r.gender)
                    .bind(r.birth_year)
                    .bind(&r.known_for_department)
                    .bind(r.popularity)
                    .fetch_one(pool)
                    .await?
            }
            DimensionRow::Distributor(r) => {
                sqlx::query_as::<_, (i64, bool)>(UPSERT_DISTRIBUTOR_SQL)
                    .persistent(false)
                    .bind(r.source_distributor_id)
                    .bind(&r.distributor_name)
                    .bind(r.market_share)
                    .bind(r.total_gross)
                    .bind(r.movies_count)
                    .fetch_one(pool)
                    .await?
            }
            DimensionRow::Genre(r) => {
                sqlx::query_as::<_, (i64, bool)>(UPSERT_GENRE_SQL)
                    .persistent(false)
                    .bind(r.source_genre_id)
                    .bind(&r.genre_name)
                    .fetch_one(pool)
                    .await?
            }
        };
        Ok(upserted(out))
    }

    #[instrument(level = "debug", skip(self, rows), fields(rows = rows.len()))]
    async fn insert_dates(&self, rows: &[DateRow]) -> Result<u64, LoadError> {
        let mut inserted = 0u64;
        for chunk in rows.chunks(DATE_CHUNK) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO dw_books_adaptations.dim_date (date_key, full_date, year, quarter, month, \
                 month_name, week_of_year, day_of_month, day_of_week, day_name, is_weekend) ",
            );
            qb.push_values(chunk, |mut b, r| {
                b.push_bind(r.date_key)
                    .push_bind(r.full_date)
                    .push_bind(r.year)
                    .push_bind(r.quarter)
                    .push_bind(r.month)
                    .push_bind(&r.month_name)
                    .push_bind(r.week_of_year)
                    .push_bind(r.day_of_month)
                    .push_bind(r.day_of_week)
                    .push_bind(&r.day_name)
                    .push_bind(r.is_weekend);
            });
            qb.push(" ON CONFLICT DO NOTHING");
            let res = qb.build().persistent(false).execute(&self.db.pool).await?;
            inserted += res.rows_affected();
        }
        debug!(inserted, "dim_date chunk written");
        Ok(inserted)
    }

    #[instrument(level = "debug", skip(self))]
    async fn surrogate_key(
        &self,
        dimension: Dimension,
        natural_key: i64,
    ) -> Result<Option<i64>, LoadError> {
        let sql = format!(
            "SELECT {key}::bigint FROM {table} WHERE {natural} = $1",
            key = dimension.key_column(),
            table = dimension.table(),
            natural = dimension.natural_column(),
        );
        let key = sqlx::query_scalar::<_, i64>(&sql)
            .persistent(false)
            .bind(natural_key)
            .fetch_optional(&self.db.pool)
            .await?;
        Ok(key)
    }

    #[instrument(level = "debug", skip(self, fact), fields(book_key = fact.book_key, movie_key = fact.movie_key))]
    async fn upsert_adaptation(&self, fact: &AdaptationFact) -> Result<Upserted, LoadError> {
        let m = &fact.measures;
        let out = sqlx::query_as::<_, (i64, bool)>(UPSERT_ADAPTATION_SQL)
            .persistent(false)
            .bind(fact.book_key)
            .bind(fact.movie_key)
            .bind(fact.author_key)
            .bind(fact.distributor_key)
            .bind(fact.genre_key)
            .bind(fact.release_date_key)
            .bind(fact.source_adaptation_id)
            .bind(&fact.adaptation_type)
            .bind(m.budget)
            .bind(m.revenue)
            .bind(m.profit)
            .bind(m.roi)
            .bind(m.adaptation_gap_years)
            .bind(m.fidelity_score)
            .bind(m.imdb_rating)
            .bind(m.imdb_votes)
            .bind(m.tmdb_vote_average)
            .bind(m.tmdb_vote_count)
            .bind(m.tmdb_popularity)
            .bind(m.book_average_rating)
            .bind(m.book_ratings_count)
            .bind(m.avg_cast_popularity)
            .fetch_one(&self.db.pool)
            .await?;
        Ok(upserted(out))
    }

    #[instrument(level = "debug", skip(self))]
    async fn adaptation_key(
        &self,
        book_key: i64,
        movie_key: i64,
    ) -> Result<Option<i64>, LoadError> {
        let key = sqlx::query_scalar::<_, i64>(
            "SELECT adaptation_key FROM dw_books_adaptations.fact_adaptation \
             WHERE book_key = $1 AND movie_key = $2",
        )
        .persistent(false)
        .bind(book_key)
        .bind(movie_key)
        .fetch_optional(&self.db.pool)
        .await?;
        Ok(key)
    }

    #[instrument(level = "debug", skip(self, row), fields(adaptation_key = row.adaptation_key, actor_key = row.actor_key))]
    async fn upsert_adaptation_actor(
        &self,
        row: &AdaptationActorRow,
    ) -> Result<Upserted, LoadError> {
        let out = sqlx::query_as::<_, (i64, bool)>(UPSERT_ADAPTATION_ACTOR_SQL)
            .persistent(false)
            .bind(row.adaptation_key)
            .bind(row.actor_key)
            .bind(&row.character_name)
            .bind(row.cast_order)
            .bind(row.is_lead_role)
            .fetch_one(&self.db.pool)
            .await?;
        Ok(upserted(out))
    }

    #[instrument(level = "debug", skip(self, row), fields(movie_key = row.movie_key, weekend_date_key = row.weekend_date_key))]
    async fn upsert_box_office_week(
        &self,
        row: &BoxOfficeWeekFact,
    ) -> Result<Upserted, LoadError> {
        let out = sqlx::query_as::<_, (i64, bool)>(UPSERT_BOX_OFFICE_WEEK_SQL)
            .persistent(false)
            .bind(row.movie_key)
            .bind(row.weekend_date_key)
            .bind(row.distributor_key)
            .bind(row.rank_position)
            .bind(row.weekend_gross)
            .bind(row.theaters)
            .bind(row.total_gross_to_date)
            .bind(row.weeks_in_release)
            .bind(row.from_daily_rollup)
            .fetch_one(&self.db.pool)
            .await?;
        Ok(upserted(out))
    }

    #[instrument(level = "debug", skip(self))]
    async fn row_counts(&self) -> Result<Vec<TableCount>, LoadError> {
        let mut out = Vec::with_capacity(WAREHOUSE_TABLES.len());
        for table in WAREHOUSE_TABLES {
            let sql = format!("SELECT count(*) FROM dw_books_adaptations.{table}");
            let rows = match sqlx::query_scalar::<_, i64>(&sql)
                .persistent(false)
                .fetch_one(&self.db.pool)
                .await
            {
                Ok(n) => n,
                // schema not migrated yet
                Err(e) if is_undefined_table_error(&e) => 0,
                Err(e) => return Err(e.into()),
            };
            out.push(TableCount {
                table: table.to_string(),
                rows,
            });
        }
        Ok(out)
    }

    #[instrument(level = "debug", skip(self))]
    async fn record_run_start(&self, dry_run: bool) -> Result<i64, LoadError> {
        let run_id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO dw_books_adaptations.etl_load_runs (dry_run) VALUES ($1) RETURNING run_id",
        )
        .persistent(false)
        .bind(dry_run)
        .fetch_one(&self.db.pool)
        .await?;
        Ok(run_id)
    }

    #[instrument(level = "debug", skip(self, summary))]
    async fn record_run_finish(
        &self,
        run_id: i64,
        succeeded: bool,
        summary: &serde_json::Value,
    ) -> Result<(), LoadError> {
        let status = if succeeded { "succeeded" } else { "failed" };
        sqlx::query(
            "UPDATE dw_books_adaptations.etl_load_runs \
             SET finished_at = now(), status = $2, summary = $3 \
             WHERE run_id = $1",
        )
        .persistent(false)
        .bind(run_id)
        .bind(status)
        .bind(sqlx::types::Json(summary))
        .execute(&self.db.pool)
        .await?;
        Ok(())
    }
}
