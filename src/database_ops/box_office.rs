//! `fact_box_office_week`: one row per (movie, weekend), weekend keyed by its Friday.
use crate::database_ops::facts::{optional_key, required_key};
use crate::database_ops::model::{BoxOfficeWeekFact, Dimension, WeekendGross};
use crate::database_ops::pass::{drive, PassOptions};
use crate::database_ops::report::PassSummary;
use crate::database_ops::source::SourceCatalog;
use crate::database_ops::warehouse::Warehouse;
use crate::error::LoadError;
use crate::normalization::calendar::{date_key, weekend_anchor};
use crate::normalization::measures::non_negative;

pub async fn box_office_row(
    warehouse: &dyn Warehouse,
    g: WeekendGross,
) -> Result<BoxOfficeWeekFact, LoadError> {
    let movie_key = required_key(warehouse, Dimension::Movie, g.movie_id).await?;
    let weekend = date_key(weekend_anchor(g.weekend_date))?;
    required_key(warehouse, Dimension::Date, i64::from(weekend)).await?;
    let distributor_key = optional_key(warehouse, Dimension::Distributor, g.distributor_id).await?;
    Ok(BoxOfficeWeekFact {
        movie_key,
        weekend_date_key: weekend,
        distributor_key,
        rank_position: g.rank_position.filter(|r| *r > 0),
        weekend_gross: non_negative(g.weekend_gross),
        theaters: g.theaters.filter(|t| *t >= 0),
        total_gross_to_date: non_negative(g.total_gross_to_date),
        weeks_in_release: g.weeks_in_release.filter(|w| *w > 0),
        from_daily_rollup: g.from_daily_rollup,
    })
}

pub async fn load_box_office(
    source: &dyn SourceCatalog,
    warehouse: &dyn Warehouse,
    opts: &PassOptions,
) -> Result<PassSummary, LoadError> {
    drive(
        "fact_box_office_week",
        opts,
        |after| source.weekend_grosses(after, opts.batch_size),
        |g: WeekendGross| async move {
            let row = box_office_row(warehouse, g).await?;
            warehouse.upsert_box_office_week(&row).await
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::date_dim::load_dates;
    use crate::database_ops::dimensions::load_movies;
    use crate::database_ops::fixtures::{gross, movie, ymd, MemorySource};
    use crate::database_ops::memory::MemoryWarehouse;
    use crate::error::IssueKind;

    async fn setup(source: &MemorySource) -> (MemoryWarehouse, PassOptions, i64) {
        let wh = MemoryWarehouse::new();
        let opts = PassOptions {
            batch_size: 1,
            ..Default::default()
        };
        load_movies(source, &wh, &opts).await.unwrap();
        load_dates(&wh, ymd(2019, 12, 1), ymd(2020, 1, 31), &opts)
            .await
            .unwrap();
        let key = wh.surrogate_key(Dimension::Movie, 7).await.unwrap().unwrap();
        (wh, opts, key)
    }

    #[tokio::test]
    async fn weekends_are_keyed_by_their_friday() {
        let source = MemorySource {
            movies: vec![movie(7, "Little Women", Some(ymd(2019, 12, 25)))],
            // Sunday 2019-12-29 belongs to the weekend opening Friday 2019-12-27
            grosses: vec![gross(7, ymd(2019, 12, 29), 16_755_000), gross(7, ymd(2020, 1, 3), 13_608_000)],
            ..Default::default()
        };
        let (wh, opts, movie_key) = setup(&source).await;

        let first = load_box_office(&source, &wh, &opts).await.unwrap();
        let second = load_box_office(&source, &wh, &opts).await.unwrap();

        assert_eq!(first.inserted, 2);
        assert_eq!((second.inserted, second.updated), (0, 2));
        let week = wh.box_office_week(movie_key, 20191227).await.expect("week row");
        assert_eq!(week.weekend_gross, Some(16_755_000));
        assert!(wh.box_office_week(movie_key, 20200103).await.is_some());
    }

    #[tokio::test]
    async fn weekends_outside_the_calendar_are_skipped() {
        let source = MemorySource {
            movies: vec![movie(7, "Little Women", None)],
            grosses: vec![gross(7, ymd(2021, 6, 4), 1_000), gross(8, ymd(2020, 1, 3), 5)],
            ..Default::default()
        };
        let (wh, opts, _) = setup(&source).await;

        let summary = load_box_office(&source, &wh, &opts).await.unwrap();
        assert_eq!((summary.inserted, summary.skipped), (0, 2));
        assert!(summary
            .issues
            .iter()
            .all(|i| i.kind == IssueKind::MissingReference));
    }

    #[tokio::test]
    async fn weekends_without_a_date_key_fail_the_row() {
        let source = MemorySource {
            movies: vec![movie(7, "Little Women", None)],
            grosses: vec![gross(7, ymd(214_749, 3, 1), 1_000), gross(7, ymd(2020, 1, 3), 5)],
            ..Default::default()
        };
        let (wh, opts, _) = setup(&source).await;

        let summary = load_box_office(&source, &wh, &opts).await.unwrap();
        assert_eq!((summary.inserted, summary.failed), (1, 1));
        assert_eq!(summary.issues[0].kind, IssueKind::InvalidSource);
    }
}
