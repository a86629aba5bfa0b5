//! In-memory source catalog and record builders for pass tests.
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::database_ops::model::{
    AdaptationRecord, CastCredit, DateSpan, Page, SourceAuthor, SourceBook, SourceDistributor,
    SourceGenre, SourceMovie, SourcePerson, WeekendGross,
};
use crate::database_ops::source::SourceCatalog;
use crate::error::LoadError;

#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    pub books: Vec<SourceBook>,
    pub authors: Vec<SourceAuthor>,
    pub movies: Vec<SourceMovie>,
    pub people: Vec<SourcePerson>,
    pub distributors: Vec<SourceDistributor>,
    pub genres: Vec<SourceGenre>,
    pub adaptations: Vec<AdaptationRecord>,
    pub cast: Vec<CastCredit>,
    pub grosses: Vec<WeekendGross>,
}

/// Rows whose key is > `after`, covering at most `limit` distinct keys.
fn page_by<T: Clone>(rows: &[T], key: impl Fn(&T) -> i64, after: i64, limit: i64) -> Page<T> {
    let mut sorted: Vec<T> = rows.iter().filter(|r| key(r) > after).cloned().collect();
    sorted.sort_by_key(|r| key(r));
    let mut keys = 0i64;
    let mut last = None;
    let mut out = Vec::new();
    for r in sorted {
        let k = key(&r);
        if last != Some(k) {
            if keys == limit {
                break;
            }
            keys += 1;
            last = Some(k);
        }
        out.push(r);
    }
    Page::keyed_by(out, key)
}

#[async_trait]
impl SourceCatalog for MemorySource {
    async fn books(&self, after: i64, limit: i64) -> Result<Page<SourceBook>, LoadError> {
        Ok(page_by(&self.books, |r| r.book_id, after, limit))
    }

    async fn authors(&self, after: i64, limit: i64) -> Result<Page<SourceAuthor>, LoadError> {
        Ok(page_by(&self.authors, |r| r.author_id, after, limit))
    }

    async fn movies(&self, after: i64, limit: i64) -> Result<Page<SourceMovie>, LoadError> {
        Ok(page_by(&self.movies, |r| r.movie_id, after, limit))
    }

    async fn cast_people(&self, after: i64, limit: i64) -> Result<Page<SourcePerson>, LoadError> {
        Ok(page_by(&self.people, |r| r.person_id, after, limit))
    }

    async fn distributors(
        &self,
        after: i64,
        limit: i64,
    ) -> Result<Page<SourceDistributor>, LoadError> {
        Ok(page_by(&self.distributors, |r| r.distributor_id, after, limit))
    }

    async fn genres(&self, after: i64, limit: i64) -> Result<Page<SourceGenre>, LoadError> {
        Ok(page_by(&self.genres, |r| r.genre_id, after, limit))
    }

    async fn adaptations(
        &self,
        after: i64,
        limit: i64,
    ) -> Result<Page<AdaptationRecord>, LoadError> {
        Ok(page_by(&self.adaptations, |r| r.adaptation_id, after, limit))
    }

    async fn adaptation_cast(&self, after: i64, limit: i64) -> Result<Page<CastCredit>, LoadError> {
        Ok(page_by(&self.cast, |r| r.cast_id, after, limit))
    }

    async fn weekend_grosses(
        &self,
        after: i64,
        limit: i64,
    ) -> Result<Page<WeekendGross>, LoadError> {
        Ok(page_by(&self.grosses, |r| r.movie_id, after, limit))
    }

    async fn date_span(&self) -> Result<DateSpan, LoadError> {
        let dates: Vec<NaiveDate> = self
            .movies
            .iter()
            .filter_map(|m| m.release_date)
            .chain(self.grosses.iter().map(|g| g.weekend_date))
            .collect();
        Ok(DateSpan {
            min_date: dates.iter().min().copied(),
            max_date: dates.iter().max().copied(),
        })
    }
}

pub fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid fixture date")
}

pub fn book(id: i64, title: &str, year: Option<i32>) -> SourceBook {
    SourceBook {
        book_id: id,
        title: Some(title.to_string()),
        authors: None,
        mapped_primary_author: None,
        isbn13: None,
        language_code: Some("eng".into()),
        num_pages: Some(320),
        publisher: None,
        original_publication_year: year,
        average_rating: Some(4.0),
        ratings_count: Some(1000),
        work_text_reviews_count: Some(50),
    }
}

pub fn movie(id: i64, title: &str, release: Option<NaiveDate>) -> SourceMovie {
    SourceMovie {
        movie_id: id,
        tmdb_id: Some(id + 1000),
        imdb_id: Some(format!("tt{id:07}")),
        title: Some(title.to_string()),
        original_title: None,
        release_date: release,
        runtime_minutes: Some(120),
        original_language: Some("en".into()),
        status: Some("Released".into()),
        budget: None,
        revenue: None,
        popularity: Some(12.5),
    }
}

pub fn person(id: i64, name: &str, popularity: Option<f64>) -> SourcePerson {
    SourcePerson {
        person_id: id,
        imdb_id: Some(format!("nm{id:07}")),
        tmdb_id: None,
        name: name.to_string(),
        gender: None,
        birth_date: None,
        known_for_department: Some("Acting".into()),
        popularity,
    }
}

pub fn adaptation(id: i64, book_id: i64, movie_id: i64) -> AdaptationRecord {
    AdaptationRecord {
        adaptation_id: id,
        book_id,
        movie_id,
        adaptation_type: Some("direct".into()),
        time_gap_years: None,
        fidelity_score: None,
        primary_author_id: None,
        distributor_id: None,
        primary_genre_id: None,
        publication_year: None,
        book_average_rating: None,
        book_ratings_count: None,
        release_date: None,
        budget: None,
        revenue: None,
        imdb_rating: None,
        imdb_votes: None,
        tmdb_vote_average: None,
        tmdb_vote_count: None,
        tmdb_popularity: None,
        lead_cast_popularity: Vec::new(),
    }
}

pub fn credit(cast_id: i64, book_id: i64, movie_id: i64, person_id: i64, order: i32) -> CastCredit {
    CastCredit {
        cast_id,
        book_id,
        movie_id,
        person_id,
        character_name: Some(format!("Character {cast_id}")),
        cast_order: Some(order),
        is_lead_role: Some(order <= 2),
    }
}

pub fn gross(movie_id: i64, weekend: NaiveDate, amount: i64) -> WeekendGross {
    WeekendGross {
        movie_id,
        weekend_date: weekend,
        distributor_id: None,
        rank_position: Some(1),
        weekend_gross: Some(amount),
        theaters: Some(3000),
        total_gross_to_date: Some(amount),
        weeks_in_release: Some(1),
        from_daily_rollup: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_by_groups_rows_sharing_a_key() {
        let rows = vec![
            credit(1, 10, 5, 100, 1),
            credit(1, 11, 5, 100, 1),
            credit(2, 10, 5, 101, 2),
            credit(3, 10, 5, 102, 3),
        ];
        let page = page_by(&rows, |r| r.cast_id, i64::MIN, 1);
        assert_eq!(page.rows.len(), 2);
        assert_eq!(page.next, Some(1));
        let page = page_by(&rows, |r| r.cast_id, 1, 5);
        assert_eq!(page.rows.len(), 2);
        assert_eq!(page.next, Some(3));
        assert!(page_by(&rows, |r| r.cast_id, 3, 5).next.is_none());
    }
}
