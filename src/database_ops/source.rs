//! Read side: keyset-paginated readers over `source_books_movies`.
use async_trait::async_trait;
use tracing::instrument;

use crate::database_ops::model::{
    AdaptationRecord, CastCredit, DateSpan, Page, SourceAuthor, SourceBook, SourceDistributor,
    SourceGenre, SourceMovie, SourcePerson, WeekendGross,
};
use crate::error::LoadError;
use crate::util::db::Db;

/// Cursor value that sorts before every natural key.
pub const START: i64 = i64::MIN;

/// Every reader returns rows whose key is strictly greater than `after`, at most
/// `limit` source entities per page.
#[async_trait]
pub trait SourceCatalog: Send + Sync {
    async fn books(&self, after: i64, limit: i64) -> Result<Page<SourceBook>, LoadError>;
    async fn authors(&self, after: i64, limit: i64) -> Result<Page<SourceAuthor>, LoadError>;
    async fn movies(&self, after: i64, limit: i64) -> Result<Page<SourceMovie>, LoadError>;
    /// People credited in the cast of an adapted movie.
    async fn cast_people(&self, after: i64, limit: i64) -> Result<Page<SourcePerson>, LoadError>;
    async fn distributors(&self, after: i64, limit: i64)
        -> Result<Page<SourceDistributor>, LoadError>;
    async fn genres(&self, after: i64, limit: i64) -> Result<Page<SourceGenre>, LoadError>;
    async fn adaptations(&self, after: i64, limit: i64)
        -> Result<Page<AdaptationRecord>, LoadError>;
    /// Cast credits on adapted movies, paged by cast credit id. A credit on a
    /// movie adapted from several books yields one row per adaptation.
    async fn adaptation_cast(&self, after: i64, limit: i64) -> Result<Page<CastCredit>, LoadError>;
    /// Weekend grosses, paged by movie id.
    async fn weekend_grosses(&self, after: i64, limit: i64)
        -> Result<Page<WeekendGross>, LoadError>;
    async fn date_span(&self) -> Result<DateSpan, LoadError>;
}

/// Postgres-backed source catalog.
#[derive(Clone)]
pub struct PgSource {
    db: Db,
}

impl PgSource {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

const BOOKS_SQL: &str = r#"
SELECT b.book_id,
       b.title,
       b.authors,
       (SELECT a.author_name
          FROM source_books_movies.book_author_mapping m
          JOIN source_books_movies.book_authors a ON a.author_id = m.author_id
         WHERE m.book_id = b.book_id
         ORDER BY m.author_order NULLS LAST, m.author_id
         LIMIT 1) AS mapped_primary_author,
       b.isbn13,
       b.language_code,
       b.num_pages,
       b.publisher,
       b.original_publication_year,
       b.average_rating::float8 AS average_rating,
       b.ratings_count,
       b.work_text_reviews_count
  FROM source_books_movies.books b
 WHERE b.book_id > $1
 ORDER BY b.book_id
 LIMIT $2
"#;

const AUTHORS_SQL: &str = r#"
SELECT author_id, author_name, average_rating::float8 AS average_rating, ratings_count, books_count
  FROM source_books_movies.book_authors
 WHERE author_id > $1
 ORDER BY author_id
 LIMIT $2
"#;

const MOVIES_SQL: &str = r#"
SELECT m.movie_id,
       m.tmdb_id,
       m.imdb_id,
       m.title,
       m.original_title,
       m.release_date,
       m.runtime_minutes,
       m.original_language,
       m.status,
       m.budget,
       m.revenue,
       COALESCE(s.popularity, m.popularity)::float8 AS popularity
  FROM source_books_movies.movies m
  LEFT JOIN LATERAL (
        SELECT ps.popularity
          FROM source_books_movies.movie_popularity_snapshots ps
         WHERE ps.movie_id = m.movie_id
         ORDER BY ps.snapshot_date DESC
         LIMIT 1) s ON true
 WHERE m.movie_id > $1
 ORDER BY m.movie_id
 LIMIT $2
"#;

const CAST_PEOPLE_SQL: &str = r#"
SELECT p.person_id,
       p.imdb_id,
       p.tmdb_id,
       p.name,
       p.gender,
       p.birth_date,
       p.known_for_department,
       COALESCE(s.popularity, p.popularity)::float8 AS popularity
  FROM source_books_movies.people p
  LEFT JOIN LATERAL (
        SELECT ps.popularity
          FROM source_books_movies.people_popularity_snapshots ps
         WHERE ps.person_id = p.person_id
         ORDER BY ps.snapshot_date DESC
         LIMIT 1) s ON true
 WHERE p.person_id > $1
   AND EXISTS (
        SELECT 1
          FROM source_books_movies.movie_cast c
          JOIN source_books_movies.book_movie_adaptations a ON a.movie_id = c.movie_id
         WHERE c.person_id = p.person_id)
 ORDER BY p.person_id
 LIMIT $2
"#;

const DISTRIBUTORS_SQL: &str = r#"
SELECT distributor_id, distributor_name, market_share::float8 AS market_share, total_gross, movies_count
  FROM source_books_movies.distributors
 WHERE distributor_id > $1
 ORDER BY distributor_id
 LIMIT $2
"#;

const GENRES_SQL: &str = r#"
SELECT genre_id, genre_name
  FROM source_books_movies.genres
 WHERE genre_id > $1
 ORDER BY genre_id
 LIMIT $2
"#;

// Lead role: flagged explicitly, or billed in the top two when the flag is unset.
const ADAPTATIONS_SQL: &str = r#"
SELECT a.adaptation_id,
       a.book_id,
       a.movie_id,
       a.adaptation_type,
       a.time_gap_years,
       a.fidelity_score::float8 AS fidelity_score,
       (SELECT m.author_id
          FROM source_books_movies.book_author_mapping m
         WHERE m.book_id = a.book_id
         ORDER BY m.author_order NULLS LAST, m.author_id
         LIMIT 1) AS primary_author_id,
       mv.distributor_id,
       (SELECT MIN(g.genre_id)
          FROM source_books_movies.movie_genres g
         WHERE g.movie_id = a.movie_id) AS primary_genre_id,
       b.original_publication_year AS publication_year,
       b.average_rating::float8 AS book_average_rating,
       b.ratings_count AS book_ratings_count,
       mv.release_date,
       mv.budget,
       mv.revenue,
       mv.imdb_rating::float8 AS imdb_rating,
       mv.imdb_votes,
       COALESCE(s.vote_average, mv.vote_average)::float8 AS tmdb_vote_average,
       COALESCE(s.vote_count, mv.vote_count) AS tmdb_vote_count,
       COALESCE(s.popularity, mv.popularity)::float8 AS tmdb_popularity,
       COALESCE(lc.pops, ARRAY[]::float8[]) AS lead_cast_popularity
  FROM source_books_movies.book_movie_adaptations a
  JOIN source_books_movies.books b ON b.book_id = a.book_id
  JOIN source_books_movies.movies mv ON mv.movie_id = a.movie_id
  LEFT JOIN LATERAL (
        SELECT ps.popularity, ps.vote_average, ps.vote_count
          FROM source_books_movies.movie_popularity_snapshots ps
         WHERE ps.movie_id = a.movie_id
         ORDER BY ps.snapshot_date DESC
         LIMIT 1) s ON true
  LEFT JOIN LATERAL (
        SELECT array_agg(COALESCE(pps.popularity, p.popularity)::float8 ORDER BY c.cast_order) AS pops
          FROM source_books_movies.movie_cast c
          JOIN source_books_movies.people p ON p.person_id = c.person_id
          LEFT JOIN LATERAL (
                SELECT x.popularity
                  FROM source_books_movies.people_popularity_snapshots x
                 WHERE x.person_id = p.person_id
                 ORDER BY x.snapshot_date DESC
                 LIMIT 1) pps ON true
         WHERE c.movie_id = a.movie_id
           AND COALESCE(c.is_lead_role, c.cast_order <= 2, false)
           AND COALESCE(pps.popularity, p.popularity) IS NOT NULL) lc ON true
 WHERE a.adaptation_id > $1
 ORDER BY a.adaptation_id
 LIMIT $2
"#;

const ADAPTATION_CAST_SQL: &str = r#"
WITH page AS (
    SELECT c.cast_id, c.movie_id, c.person_id, c.character_name, c.cast_order, c.is_lead_role
      FROM source_books_movies.movie_cast c
     WHERE c.cast_id > $1
       AND EXISTS (SELECT 1
                     FROM source_books_movies.book_movie_adaptations a
                    WHERE a.movie_id = c.movie_id)
     ORDER BY c.cast_id
     LIMIT $2
)
SELECT p.cast_id,
       a.book_id,
       p.movie_id,
       p.person_id,
       p.character_name,
       p.cast_order,
       COALESCE(p.is_lead_role, p.cast_order <= 2) AS is_lead_role
  FROM page p
  JOIN source_books_movies.book_movie_adaptations a ON a.movie_id = p.movie_id
 ORDER BY p.cast_id, a.book_id
"#;

const MOVIE_IDS_SQL: &str = r#"
SELECT movie_id
  FROM source_books_movies.movies
 WHERE movie_id > $1
 ORDER BY movie_id
 LIMIT $2
"#;

// Charted weekends come from box_office_performance. Weekends only present in the
// daily chart are rolled up from Friday..Sunday rows, anchored on the Friday.
const WEEKEND_GROSSES_SQL: &str = r#"
SELECT bp.movie_id,
       w.weekend_date,
       bp.distributor_id,
       bp.rank_position,
       bp.weekend_gross,
       bp.theaters,
       bp.total_gross_to_date,
       bp.weeks_in_release,
       false AS from_daily_rollup
  FROM source_books_movies.box_office_performance bp
  JOIN source_books_movies.box_office_weekends w ON w.weekend_id = bp.weekend_id
 WHERE bp.movie_id = ANY($1)
UNION ALL
SELECT d.movie_id,
       d.weekend_date,
       MIN(ds.distributor_id) AS distributor_id,
       MIN(d.rank_position) AS rank_position,
       SUM(d.daily_gross)::bigint AS weekend_gross,
       MAX(d.theaters) AS theaters,
       MAX(d.total_gross_to_date) AS total_gross_to_date,
       CEIL(MAX(d.days_in_release) / 7.0)::int AS weeks_in_release,
       true AS from_daily_rollup
  FROM (SELECT bd.*,
               (bd.chart_date - ((EXTRACT(ISODOW FROM bd.chart_date)::int + 2) % 7)) AS weekend_date
          FROM source_books_movies.box_office_daily bd
         WHERE bd.movie_id = ANY($1)
           AND EXTRACT(ISODOW FROM bd.chart_date) IN (5, 6, 7)) d
  LEFT JOIN source_books_movies.distributors ds ON ds.distributor_name = d.distributor
 WHERE NOT EXISTS (
        SELECT 1
          FROM source_books_movies.box_office_performance bp2
          JOIN source_books_movies.box_office_weekends w2 ON w2.weekend_id = bp2.weekend_id
         WHERE bp2.movie_id = d.movie_id
           AND (w2.weekend_date - ((EXTRACT(ISODOW FROM w2.weekend_date)::int + 2) % 7)) = d.weekend_date)
 GROUP BY d.movie_id, d.weekend_date
 ORDER BY 1, 2
"#;

const DATE_SPAN_SQL: &str = r#"
SELECT MIN(d) AS min_date, MAX(d) AS max_date
  FROM (SELECT release_date AS d FROM source_books_movies.movies
        UNION ALL
        SELECT weekend_date FROM source_books_movies.box_office_weekends
        UNION ALL
        SELECT chart_date FROM source_books_movies.box_office_daily) s
"#;

impl PgSource {
    async fn page<T>(&self, sql: &'static str, after: i64, limit: i64) -> Result<Vec<T>, LoadError>
    where
        T: for<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> + Send + Unpin,
    {
        let rows = sqlx::query_as::<_, T>(sql)
            .persistent(false)
            .bind(after)
            .bind(limit)
            .fetch_all(&self.db.pool)
            .await?;
        Ok(rows)
    }
}

#[async_trait]
impl SourceCatalog for PgSource {
    #[instrument(level = "debug", skip(self))]
    async fn books(&self, after: i64, limit: i64) -> Result<Page<SourceBook>, LoadError> {
        let rows = self.page(BOOKS_SQL, after, limit).await?;
        Ok(Page::keyed_by(rows, |r: &SourceBook| r.book_id))
    }

    #[instrument(level = "debug", skip(self))]
    async fn authors(&self, after: i64, limit: i64) -> Result<Page<SourceAuthor>, LoadError> {
        let rows = self.page(AUTHORS_SQL, after, limit).await?;
        Ok(Page::keyed_by(rows, |r: &SourceAuthor| r.author_id))
    }

    #[instrument(level = "debug", skip(self))]
    async fn movies(&self, after: i64, limit: i64) -> Result<Page<SourceMovie>, LoadError> {
        let rows = self.page(MOVIES_SQL, after, limit).await?;
        Ok(Page::keyed_by(rows, |r: &SourceMovie| r.movie_id))
    }

    #[instrument(level = "debug", skip(self))]
    async fn cast_people(&self, after: i64, limit: i64) -> Result<Page<SourcePerson>, LoadError> {
        let rows = self.page(CAST_PEOPLE_SQL, after, limit).await?;
        Ok(Page::keyed_by(rows, |r: &SourcePerson| r.person_id))
    }

    #[instrument(level = "debug", skip(self))]
    async fn distributors(
        &self,
        after: i64,
        limit: i64,
    ) -> Result<Page<SourceDistributor>, LoadError> {
        let rows = self.page(DISTRIBUTORS_SQL, after, limit).await?;
        Ok(Page::keyed_by(rows, |r: &SourceDistributor| r.distributor_id))
    }

    #[instrument(level = "debug", skip(self))]
    async fn genres(&self, after: i64, limit: i64) -> Result<Page<SourceGenre>, LoadError> {
        let rows = self.page(GENRES_SQL, after, limit).await?;
        Ok(Page::keyed_by(rows, |r: &SourceGenre| r.genre_id))
    }

    #[instrument(level = "debug", skip(self))]
    async fn adaptations(
        &self,
        after: i64,
        limit: i64,
    ) -> Result<Page<AdaptationRecord>, LoadError> {
        let rows = self.page(ADAPTATIONS_SQL, after, limit).await?;
        Ok(Page::keyed_by(rows, |r: &AdaptationRecord| r.adaptation_id))
    }

    #[instrument(level = "debug", skip(self))]
    async fn adaptation_cast(&self, after: i64, limit: i64) -> Result<Page<CastCredit>, LoadError> {
        let rows = self.page(ADAPTATION_CAST_SQL, after, limit).await?;
        Ok(Page::keyed_by(rows, |r: &CastCredit| r.cast_id))
    }

    #[instrument(level = "debug", skip(self))]
    async fn weekend_grosses(
        &self,
        after: i64,
        limit: i64,
    ) -> Result<Page<WeekendGross>, LoadError> {
        let ids = sqlx::query_scalar::<_, i64>(MOVIE_IDS_SQL)
            .persistent(false)
            .bind(after)
            .bind(limit)
            .fetch_all(&self.db.pool)
            .await?;
        let Some(&last) = ids.last() else {
            return Ok(Page::empty());
        };
        let rows = sqlx::query_as::<_, WeekendGross>(WEEKEND_GROSSES_SQL)
            .persistent(false)
            .bind(&ids)
            .fetch_all(&self.db.pool)
            .await?;
        // cursor follows the movie page, not the rows: a page of movies may have no grosses
        Ok(Page {
            rows,
            next: Some(last),
        })
    }

    #[instrument(level = "debug", skip(self))]
    async fn date_span(&self) -> Result<DateSpan, LoadError> {
        let span = sqlx::query_as::<_, DateSpan>(DATE_SPAN_SQL)
            .persistent(false)
            .fetch_one(&self.db.pool)
            .await?;
        Ok(span)
    }
}
