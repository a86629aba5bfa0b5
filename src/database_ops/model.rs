//! Row types shared by the source readers, the warehouse writers and the load passes.
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

/// Warehouse dimensions, each keyed by a surrogate and bound 1:1 to a source natural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Book,
    Author,
    Movie,
    Actor,
    Distributor,
    Genre,
    Date,
}

impl Dimension {
    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::Book => "book",
            Dimension::Author => "author",
            Dimension::Movie => "movie",
            Dimension::Actor => "actor",
            Dimension::Distributor => "distributor",
            Dimension::Genre => "genre",
            Dimension::Date => "date",
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            Dimension::Book => "dw_books_adaptations.dim_book",
            Dimension::Author => "dw_books_adaptations.dim_author",
            Dimension::Movie => "dw_books_adaptations.dim_movie",
            Dimension::Actor => "dw_books_adaptations.dim_actor",
            Dimension::Distributor => "dw_books_adaptations.dim_distributor",
            Dimension::Genre => "dw_books_adaptations.dim_genre",
            Dimension::Date => "dw_books_adaptations.dim_date",
        }
    }

    pub fn key_column(self) -> &'static str {
        match self {
            Dimension::Book => "book_key",
            Dimension::Author => "author_key",
            Dimension::Movie => "movie_key",
            Dimension::Actor => "actor_key",
            Dimension::Distributor => "distributor_key",
            Dimension::Genre => "genre_key",
            Dimension::Date => "date_key",
        }
    }

    /// Column holding the source natural key. Dates are keyed by YYYYMMDD on both sides.
    pub fn natural_column(self) -> &'static str {
        match self {
            Dimension::Book => "source_book_id",
            Dimension::Author => "source_author_id",
            Dimension::Movie => "source_movie_id",
            Dimension::Actor => "source_person_id",
            Dimension::Distributor => "source_distributor_id",
            Dimension::Genre => "source_genre_id",
            Dimension::Date => "date_key",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of an idempotent upsert: the surrogate key and whether the row was new.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Upserted {
    pub key: i64,
    pub created: bool,
}

/// One keyset page. `next` is the cursor for the following call; None ends iteration.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub rows: Vec<T>,
    pub next: Option<i64>,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            rows: Vec::new(),
            next: None,
        }
    }

    /// Page whose cursor is the key of its last row.
    pub fn keyed_by(rows: Vec<T>, key: impl Fn(&T) -> i64) -> Self {
        let next = rows.last().map(key);
        Self { rows, next }
    }
}

/// Natural key rendered for issue reports.
pub trait RowKey {
    fn row_key(&self) -> String;
}

// ---------------------------------------------------------------------------
// Source records (read side)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct SourceBook {
    pub book_id: i64,
    pub title: Option<String>,
    pub authors: Option<String>,
    /// Name of the mapped author with the lowest `author_order`.
    pub mapped_primary_author: Option<String>,
    pub isbn13: Option<String>,
    pub language_code: Option<String>,
    pub num_pages: Option<i32>,
    pub publisher: Option<String>,
    pub original_publication_year: Option<i32>,
    pub average_rating: Option<f64>,
    pub ratings_count: Option<i64>,
    pub work_text_reviews_count: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct SourceAuthor {
    pub author_id: i64,
    pub author_name: String,
    pub average_rating: Option<f64>,
    pub ratings_count: Option<i64>,
    pub books_count: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct SourceMovie {
    pub movie_id: i64,
    pub tmdb_id: Option<i64>,
    pub imdb_id: Option<String>,
    pub title: Option<String>,
    pub original_title: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub runtime_minutes: Option<i32>,
    pub original_language: Option<String>,
    pub status: Option<String>,
    pub budget: Option<i64>,
    pub revenue: Option<i64>,
    /// Latest snapshot popularity, falling back to the static column.
    pub popularity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct SourcePerson {
    pub person_id: i64,
    pub imdb_id: Option<String>,
    pub tmdb_id: Option<i64>,
    pub name: String,
    pub gender: Option<i16>,
    pub birth_date: Option<NaiveDate>,
    pub known_for_department: Option<String>,
    pub popularity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct SourceDistributor {
    pub distributor_id: i64,
    pub distributor_name: String,
    pub market_share: Option<f64>,
    pub total_gross: Option<i64>,
    pub movies_count: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct SourceGenre {
    pub genre_id: i64,
    pub genre_name: String,
}

/// An adaptation joined to its book and movie plus the references the fact needs.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct AdaptationRecord {
    pub adaptation_id: i64,
    pub book_id: i64,
    pub movie_id: i64,
    pub adaptation_type: Option<String>,
    pub time_gap_years: Option<i32>,
    pub fidelity_score: Option<f64>,
    pub primary_author_id: Option<i64>,
    pub distributor_id: Option<i64>,
    pub primary_genre_id: Option<i64>,
    pub publication_year: Option<i32>,
    pub book_average_rating: Option<f64>,
    pub book_ratings_count: Option<i64>,
    pub release_date: Option<NaiveDate>,
    pub budget: Option<i64>,
    pub revenue: Option<i64>,
    pub imdb_rating: Option<f64>,
    pub imdb_votes: Option<i64>,
    pub tmdb_vote_average: Option<f64>,
    pub tmdb_vote_count: Option<i64>,
    pub tmdb_popularity: Option<f64>,
    /// Popularity of each lead-role cast member.
    pub lead_cast_popularity: Vec<f64>,
}

/// A cast credit on an adapted movie, one per (adaptation, credit).
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct CastCredit {
    pub cast_id: i64,
    pub book_id: i64,
    pub movie_id: i64,
    pub person_id: i64,
    pub character_name: Option<String>,
    pub cast_order: Option<i32>,
    pub is_lead_role: Option<bool>,
}

/// Weekend box-office line for one movie.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct WeekendGross {
    pub movie_id: i64,
    pub weekend_date: NaiveDate,
    pub distributor_id: Option<i64>,
    pub rank_position: Option<i32>,
    pub weekend_gross: Option<i64>,
    pub theaters: Option<i32>,
    pub total_gross_to_date: Option<i64>,
    pub weeks_in_release: Option<i32>,
    pub from_daily_rollup: bool,
}

/// Earliest and latest dates referenced by the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct DateSpan {
    pub min_date: Option<NaiveDate>,
    pub max_date: Option<NaiveDate>,
}

impl RowKey for SourceBook {
    fn row_key(&self) -> String {
        format!("book_id={}", self.book_id)
    }
}

impl RowKey for SourceAuthor {
    fn row_key(&self) -> String {
        format!("author_id={}", self.author_id)
    }
}

impl RowKey for SourceMovie {
    fn row_key(&self) -> String {
        format!("movie_id={}", self.movie_id)
    }
}

impl RowKey for SourcePerson {
    fn row_key(&self) -> String {
        format!("person_id={}", self.person_id)
    }
}

impl RowKey for SourceDistributor {
    fn row_key(&self) -> String {
        format!("distributor_id={}", self.distributor_id)
    }
}

impl RowKey for SourceGenre {
    fn row_key(&self) -> String {
        format!("genre_id={}", self.genre_id)
    }
}

impl RowKey for AdaptationRecord {
    fn row_key(&self) -> String {
        format!("book_id={},movie_id={}", self.book_id, self.movie_id)
    }
}

impl RowKey for CastCredit {
    fn row_key(&self) -> String {
        format!(
            "book_id={},movie_id={},person_id={}",
            self.book_id, self.movie_id, self.person_id
        )
    }
}

impl RowKey for WeekendGross {
    fn row_key(&self) -> String {
        format!("movie_id={},weekend={}", self.movie_id, self.weekend_date)
    }
}

// ---------------------------------------------------------------------------
// Warehouse rows (write side)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct BookDim {
    pub source_book_id: i64,
    pub title: Option<String>,
    pub primary_author: Option<String>,
    pub all_authors: Option<String>,
    pub isbn13: Option<String>,
    pub language_code: Option<String>,
    pub num_pages: Option<i32>,
    pub publisher: Option<String>,
    pub publication_year: Option<i32>,
    pub average_rating: Option<f64>,
    pub ratings_count: Option<i64>,
    pub text_reviews_count: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthorDim {
    pub source_author_id: i64,
    pub author_name: String,
    pub average_rating: Option<f64>,
    pub ratings_count: Option<i64>,
    pub books_count: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MovieDim {
    pub source_movie_id: i64,
    pub tmdb_id: Option<i64>,
    pub imdb_id: Option<String>,
    pub title: Option<String>,
    pub original_title: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub release_year: Option<i32>,
    pub runtime_minutes: Option<i32>,
    pub original_language: Option<String>,
    pub status: Option<String>,
    pub budget: Option<i64>,
    pub revenue: Option<i64>,
    pub popularity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActorDim {
    pub source_person_id: i64,
    pub imdb_id: Option<String>,
    pub tmdb_id: Option<i64>,
    pub name: String,
    pub gender: Option<i16>,
    pub birth_year: Option<i32>,
    pub known_for_department: Option<String>,
    pub popularity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DistributorDim {
    pub source_distributor_id: i64,
    pub distributor_name: String,
    pub market_share: Option<f64>,
    pub total_gross: Option<i64>,
    pub movies_count: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenreDim {
    pub source_genre_id: i64,
    pub genre_name: String,
}

/// A denormalized dimension row ready for upsert.
#[derive(Debug, Clone, PartialEq)]
pub enum DimensionRow {
    Book(BookDim),
    Author(AuthorDim),
    Movie(MovieDim),
    Actor(ActorDim),
    Distributor(DistributorDim),
    Genre(GenreDim),
}

impl DimensionRow {
    pub fn dimension(&self) -> Dimension {
        match self {
            DimensionRow::Book(_) => Dimension::Book,
            DimensionRow::Author(_) => Dimension::Author,
            DimensionRow::Movie(_) => Dimension::Movie,
            DimensionRow::Actor(_) => Dimension::Actor,
            DimensionRow::Distributor(_) => Dimension::Distributor,
            DimensionRow::Genre(_) => Dimension::Genre,
        }
    }

    pub fn natural_key(&self) -> i64 {
        match self {
            DimensionRow::Book(r) => r.source_book_id,
            DimensionRow::Author(r) => r.source_author_id,
            DimensionRow::Movie(r) => r.source_movie_id,
            DimensionRow::Actor(r) => r.source_person_id,
            DimensionRow::Distributor(r) => r.source_distributor_id,
            DimensionRow::Genre(r) => r.source_genre_id,
        }
    }
}

/// One calendar day of `dim_date`.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct DateRow {
    pub date_key: i32,
    pub full_date: NaiveDate,
    pub year: i16,
    pub quarter: i16,
    pub month: i16,
    pub month_name: String,
    pub week_of_year: i16,
    pub day_of_month: i16,
    /// ISO weekday, Monday = 1 .. Sunday = 7.
    pub day_of_week: i16,
    pub day_name: String,
    pub is_weekend: bool,
}

/// Point-in-time measures copied onto the adaptation fact at load time.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AdaptationMeasures {
    pub budget: Option<i64>,
    pub revenue: Option<i64>,
    pub profit: Option<i64>,
    pub roi: Option<f64>,
    pub adaptation_gap_years: Option<i32>,
    pub fidelity_score: Option<f64>,
    pub imdb_rating: Option<f64>,
    pub imdb_votes: Option<i64>,
    pub tmdb_vote_average: Option<f64>,
    pub tmdb_vote_count: Option<i64>,
    pub tmdb_popularity: Option<f64>,
    pub book_average_rating: Option<f64>,
    pub book_ratings_count: Option<i64>,
    pub avg_cast_popularity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdaptationFact {
    pub book_key: i64,
    pub movie_key: i64,
    pub author_key: Option<i64>,
    pub distributor_key: Option<i64>,
    pub genre_key: Option<i64>,
    pub release_date_key: Option<i32>,
    pub source_adaptation_id: i64,
    pub adaptation_type: Option<String>,
    pub measures: AdaptationMeasures,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdaptationActorRow {
    pub adaptation_key: i64,
    pub actor_key: i64,
    pub character_name: Option<String>,
    pub cast_order: Option<i32>,
    pub is_lead_role: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoxOfficeWeekFact {
    pub movie_key: i64,
    pub weekend_date_key: i32,
    pub distributor_key: Option<i64>,
    pub rank_position: Option<i32>,
    pub weekend_gross: Option<i64>,
    pub theaters: Option<i32>,
    pub total_gross_to_date: Option<i64>,
    pub weeks_in_release: Option<i32>,
    pub from_daily_rollup: bool,
}
