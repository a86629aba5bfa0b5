//! Dimension upsert passes: one per dimension, each mapping a source record to
//! its denormalized warehouse row.
use chrono::Datelike;

use crate::database_ops::model::{
    ActorDim, AuthorDim, BookDim, DimensionRow, DistributorDim, GenreDim, MovieDim, SourceAuthor,
    SourceBook, SourceDistributor, SourceGenre, SourceMovie, SourcePerson,
};
use crate::database_ops::pass::{drive, PassOptions};
use crate::database_ops::report::PassSummary;
use crate::database_ops::source::SourceCatalog;
use crate::database_ops::warehouse::Warehouse;
use crate::error::LoadError;
use crate::normalization::measures::{bounded, non_negative};
use crate::normalization::names::{clean, joined_authors, primary_author};

fn required_name(field: &str, id: i64, value: String) -> Result<String, LoadError> {
    clean(Some(value)).ok_or_else(|| LoadError::InvalidSource(format!("{field} is blank for id {id}")))
}

fn popularity(v: Option<f64>) -> Option<f64> {
    bounded(v, 0.0, f64::MAX)
}

pub fn book_row(b: SourceBook) -> DimensionRow {
    DimensionRow::Book(BookDim {
        source_book_id: b.book_id,
        primary_author: primary_author(b.mapped_primary_author.as_deref(), b.authors.as_deref()),
        all_authors: joined_authors(b.authors.as_deref()),
        title: clean(b.title),
        isbn13: clean(b.isbn13),
        language_code: clean(b.language_code),
        num_pages: b.num_pages.filter(|n| *n > 0),
        publisher: clean(b.publisher),
        publication_year: b.original_publication_year,
        average_rating: bounded(b.average_rating, 0.0, 5.0),
        ratings_count: non_negative(b.ratings_count),
        text_reviews_count: non_negative(b.work_text_reviews_count),
    })
}

pub fn author_row(a: SourceAuthor) -> Result<DimensionRow, LoadError> {
    Ok(DimensionRow::Author(AuthorDim {
        author_name: required_name("author_name", a.author_id, a.author_name)?,
        source_author_id: a.author_id,
        average_rating: bounded(a.average_rating, 0.0, 5.0),
        ratings_count: non_negative(a.ratings_count),
        books_count: a.books_count.filter(|n| *n >= 0),
    }))
}

pub fn movie_row(m: SourceMovie) -> DimensionRow {
    DimensionRow::Movie(MovieDim {
        source_movie_id: m.movie_id,
        tmdb_id: m.tmdb_id,
        imdb_id: clean(m.imdb_id),
        title: clean(m.title),
        original_title: clean(m.original_title),
        release_year: m.release_date.map(|d| d.year()),
        release_date: m.release_date,
        runtime_minutes: m.runtime_minutes.filter(|n| *n > 0),
        original_language: clean(m.original_language),
        status: clean(m.status),
        budget: non_negative(m.budget),
        revenue: non_negative(m.revenue),
        popularity: popularity(m.popularity),
    })
}

pub fn actor_row(p: SourcePerson) -> Result<DimensionRow, LoadError> {
    Ok(DimensionRow::Actor(ActorDim {
        name: required_name("name", p.person_id, p.name)?,
        source_person_id: p.person_id,
        imdb_id: clean(p.imdb_id),
        tmdb_id: p.tmdb_id,
        gender: p.gender,
        birth_year: p.birth_date.map(|d| d.year()),
        known_for_department: clean(p.known_for_department),
        popularity: popularity(p.popularity),
    }))
}

pub fn distributor_row(d: SourceDistributor) -> Result<DimensionRow, LoadError> {
    Ok(DimensionRow::Distributor(DistributorDim {
        distributor_name: required_name("distributor_name", d.distributor_id, d.distributor_name)?,
        source_distributor_id: d.distributor_id,
        market_share: bounded(d.market_share, 0.0, 100.0),
        total_gross: non_negative(d.total_gross),
        movies_count: d.movies_count.filter(|n| *n >= 0),
    }))
}

pub fn genre_row(g: SourceGenre) -> Result<DimensionRow, LoadError> {
    Ok(DimensionRow::Genre(GenreDim {
        genre_name: required_name("genre_name", g.genre_id, g.genre_name)?,
        source_genre_id: g.genre_id,
    }))
}

pub async fn load_books(
    source: &dyn SourceCatalog,
    warehouse: &dyn Warehouse,
    opts: &PassOptions,
) -> Result<PassSummary, LoadError> {
    drive(
        "dim_book",
        opts,
        |after| source.books(after, opts.batch_size),
        |rec: SourceBook| async move { warehouse.upsert_dimension(&book_row(rec)).await },
    )
    .await
}

pub async fn load_authors(
    source: &dyn SourceCatalog,
    warehouse: &dyn Warehouse,
    opts: &PassOptions,
) -> Result<PassSummary, LoadError> {
    drive(
        "dim_author",
        opts,
        |after| source.authors(after, opts.batch_size),
        |rec: SourceAuthor| async move { warehouse.upsert_dimension(&author_row(rec)?).await },
    )
    .await
}

pub async fn load_movies(
    source: &dyn SourceCatalog,
    warehouse: &dyn Warehouse,
    opts: &PassOptions,
) -> Result<PassSummary, LoadError> {
    drive(
        "dim_movie",
        opts,
        |after| source.movies(after, opts.batch_size),
        |rec: SourceMovie| async move { warehouse.upsert_dimension(&movie_row(rec)).await },
    )
    .await
}

pub async fn load_actors(
    source: &dyn SourceCatalog,
    warehouse: &dyn Warehouse,
    opts: &PassOptions,
) -> Result<PassSummary, LoadError> {
    drive(
        "dim_actor",
        opts,
        |after| source.cast_people(after, opts.batch_size),
        |rec: SourcePerson| async move { warehouse.upsert_dimension(&actor_row(rec)?).await },
    )
    .await
}

pub async fn load_distributors(
    source: &dyn SourceCatalog,
    warehouse: &dyn Warehouse,
    opts: &PassOptions,
) -> Result<PassSummary, LoadError> {
    drive(
        "dim_distributor",
        opts,
        |after| source.distributors(after, opts.batch_size),
        |rec: SourceDistributor| async move {
            warehouse.upsert_dimension(&distributor_row(rec)?).await
        },
    )
    .await
}

pub async fn load_genres(
    source: &dyn SourceCatalog,
    warehouse: &dyn Warehouse,
    opts: &PassOptions,
) -> Result<PassSummary, LoadError> {
    drive(
        "dim_genre",
        opts,
        |after| source.genres(after, opts.batch_size),
        |rec: SourceGenre| async move { warehouse.upsert_dimension(&genre_row(rec)?).await },
    )
    .await
}
