//! `fact_adaptation` pass: one row per (book, movie) adaptation with
//! point-in-time measures.
use chrono::Datelike;

use crate::database_ops::model::{AdaptationFact, AdaptationMeasures, AdaptationRecord, Dimension};
use crate::database_ops::pass::{drive, PassOptions};
use crate::database_ops::report::PassSummary;
use crate::database_ops::source::SourceCatalog;
use crate::database_ops::warehouse::Warehouse;
use crate::error::LoadError;
use crate::normalization::calendar::date_key;
use crate::normalization::measures::{
    adaptation_gap_years, bounded, mean, non_negative, profit, roi,
};
use crate::normalization::names::clean;

pub(crate) async fn required_key(
    warehouse: &dyn Warehouse,
    dimension: Dimension,
    natural_key: i64,
) -> Result<i64, LoadError> {
    warehouse
        .surrogate_key(dimension, natural_key)
        .await?
        .ok_or_else(|| LoadError::missing(dimension, natural_key))
}

/// Null when the source carries no reference; an unresolvable reference is an error.
pub(crate) async fn optional_key(
    warehouse: &dyn Warehouse,
    dimension: Dimension,
    natural_key: Option<i64>,
) -> Result<Option<i64>, LoadError> {
    match natural_key {
        Some(n) => required_key(warehouse, dimension, n).await.map(Some),
        None => Ok(None),
    }
}

pub fn measures(rec: &AdaptationRecord) -> AdaptationMeasures {
    let budget = non_negative(rec.budget);
    let revenue = non_negative(rec.revenue);
    AdaptationMeasures {
        budget,
        revenue,
        profit: profit(budget, revenue),
        roi: roi(budget, revenue),
        adaptation_gap_years: adaptation_gap_years(
            rec.time_gap_years,
            rec.release_date.map(|d| d.year()),
            rec.publication_year,
        ),
        fidelity_score: rec.fidelity_score.filter(|v| v.is_finite()),
        imdb_rating: bounded(rec.imdb_rating, 0.0, 10.0),
        imdb_votes: non_negative(rec.imdb_votes),
        tmdb_vote_average: bounded(rec.tmdb_vote_average, 0.0, 10.0),
        tmdb_vote_count: non_negative(rec.tmdb_vote_count),
        tmdb_popularity: bounded(rec.tmdb_popularity, 0.0, f64::MAX),
        book_average_rating: bounded(rec.book_average_rating, 0.0, 5.0),
        book_ratings_count: non_negative(rec.book_ratings_count),
        avg_cast_popularity: mean(&rec.lead_cast_popularity),
    }
}

/// Resolve every surrogate key for the record and attach its measures.
pub async fn build_fact(
    warehouse: &dyn Warehouse,
    rec: &AdaptationRecord,
) -> Result<AdaptationFact, LoadError> {
    let book_key = required_key(warehouse, Dimension::Book, rec.book_id).await?;
    let movie_key = required_key(warehouse, Dimension::Movie, rec.movie_id).await?;
    let author_key = optional_key(warehouse, Dimension::Author, rec.primary_author_id).await?;
    let distributor_key =
        optional_key(warehouse, Dimension::Distributor, rec.distributor_id).await?;
    let genre_key = optional_key(warehouse, Dimension::Genre, rec.primary_genre_id).await?;
    let release_date_key = optional_key(
        warehouse,
        Dimension::Date,
        rec.release_date.map(date_key).transpose()?.map(i64::from),
    )
    .await?
    .and_then(|k| i32::try_from(k).ok());

    Ok(AdaptationFact {
        book_key,
        movie_key,
        author_key,
        distributor_key,
        genre_key,
        release_date_key,
        source_adaptation_id: rec.adaptation_id,
        adaptation_type: clean(rec.adaptation_type.clone()),
        measures: measures(rec),
    })
}

pub async fn load_facts(
    source: &dyn SourceCatalog,
    warehouse: &dyn Warehouse,
    opts: &PassOptions,
) -> Result<PassSummary, LoadError> {
    drive(
        "fact_adaptation",
        opts,
        |after| source.adaptations(after, opts.batch_size),
        |rec: AdaptationRecord| async move {
            let fact = build_fact(warehouse, &rec).await?;
            warehouse.upsert_adaptation(&fact).await
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::date_dim::load_dates;
    use crate::database_ops::dimensions::{load_books, load_movies};
    use crate::database_ops::fixtures::{adaptation, book, movie, ymd, MemorySource};
    use crate::database_ops::memory::MemoryWarehouse;
    use crate::error::IssueKind;

    fn carrie() -> MemorySource {
        let mut rec = adaptation(1, 10, 20);
        rec.budget = Some(100_000);
        rec.revenue = Some(250_000);
        rec.publication_year = Some(1974);
        rec.release_date = Some(ymd(1976, 11, 3));
        rec.lead_cast_popularity = vec![10.0, 20.0];
        MemorySource {
            books: vec![book(10, "Carrie", Some(1974))],
            movies: vec![movie(20, "Carrie", Some(ymd(1976, 11, 3)))],
            adaptations: vec![rec],
            ..Default::default()
        }
    }

    async fn load_dims(source: &MemorySource, wh: &MemoryWarehouse, opts: &PassOptions) {
        load_books(source, wh, opts).await.unwrap();
        load_movies(source, wh, opts).await.unwrap();
        load_dates(wh, ymd(1976, 1, 1), ymd(1976, 12, 31), opts).await.unwrap();
    }

    #[test]
    fn derived_measures() {
        let mut rec = adaptation(1, 1, 1);
        rec.budget = Some(100_000);
        rec.revenue = Some(250_000);
        rec.publication_year = Some(1998);
        rec.release_date = Some(ymd(2020, 2, 14));
        let m = measures(&rec);
        assert_eq!(m.profit, Some(150_000));
        assert_eq!(m.roi, Some(1.5));
        assert_eq!(m.adaptation_gap_years, Some(22));
        assert_eq!(m.avg_cast_popularity, None);

        rec.time_gap_years = Some(21);
        rec.budget = Some(0);
        rec.imdb_rating = Some(11.0);
        let m = measures(&rec);
        assert_eq!(m.adaptation_gap_years, Some(21));
        assert_eq!(m.roi, None);
        assert_eq!(m.profit, Some(250_000));
        assert_eq!(m.imdb_rating, None);
    }

    #[tokio::test]
    async fn facts_resolve_keys_and_reruns_are_stable() {
        let source = carrie();
        let wh = MemoryWarehouse::new();
        let opts = PassOptions::default();
        load_dims(&source, &wh, &opts).await;

        let first = load_facts(&source, &wh, &opts).await.unwrap();
        assert_eq!((first.inserted, first.skipped), (1, 0));

        let book_key = wh.surrogate_key(Dimension::Book, 10).await.unwrap().unwrap();
        let movie_key = wh.surrogate_key(Dimension::Movie, 20).await.unwrap().unwrap();
        let before = wh.fact(book_key, movie_key).await.expect("fact loaded");
        assert_eq!(before.release_date_key, Some(19761103));
        assert_eq!(before.measures.avg_cast_popularity, Some(15.0));
        assert_eq!(before.measures.adaptation_gap_years, Some(2));

        let second = load_facts(&source, &wh, &opts).await.unwrap();
        assert_eq!((second.inserted, second.updated), (0, 1));
        assert_eq!(wh.fact(book_key, movie_key).await, Some(before));
        let counts = wh.row_counts().await.unwrap();
        let facts = counts.iter().find(|c| c.table == "fact_adaptation").unwrap();
        assert_eq!(facts.rows, 1);
    }

    #[tokio::test]
    async fn unresolved_references_are_skipped_and_reported() {
        let mut source = carrie();
        source.adaptations.push(adaptation(2, 10, 99));
        let mut with_genre = adaptation(3, 10, 20);
        with_genre.primary_genre_id = Some(5);
        source.adaptations.push(with_genre);
        let wh = MemoryWarehouse::new();
        let opts = PassOptions::default();
        load_dims(&source, &wh, &opts).await;

        let summary = load_facts(&source, &wh, &opts).await.unwrap();
        assert_eq!((summary.inserted, summary.skipped, summary.failed), (1, 2, 0));
        assert!(summary
            .issues
            .iter()
            .all(|i| i.kind == IssueKind::MissingReference));
        assert!(summary.issues.iter().any(|i| i.key == "book_id=10,movie_id=99"));
    }

    #[tokio::test]
    async fn release_date_outside_calendar_is_a_missing_reference() {
        let source = carrie();
        let wh = MemoryWarehouse::new();
        let opts = PassOptions::default();
        load_books(&source, &wh, &opts).await.unwrap();
        load_movies(&source, &wh, &opts).await.unwrap();

        let err = build_fact(&wh, &source.adaptations[0]).await.unwrap_err();
        assert!(matches!(
            err,
            LoadError::MissingReference {
                dimension: Dimension::Date,
                natural_key: 19761103
            }
        ));
    }

    #[tokio::test]
    async fn release_dates_without_a_date_key_fail_the_row() {
        let mut source = carrie();
        let mut far = adaptation(2, 10, 20);
        far.release_date = Some(ymd(40_000, 6, 1));
        source.adaptations = vec![far];
        let wh = MemoryWarehouse::new();
        let opts = PassOptions::default();
        load_dims(&source, &wh, &opts).await;

        let summary = load_facts(&source, &wh, &opts).await.unwrap();
        assert_eq!((summary.inserted, summary.skipped, summary.failed), (0, 0, 1));
        assert_eq!(summary.issues[0].kind, IssueKind::InvalidSource);
    }
}
