use chrono::{Datelike, Days, NaiveDate, Weekday};

use crate::database_ops::model::{DateRow, DateSpan};
use crate::error::LoadError;

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// YYYYMMDD integer key. Only four-digit years have one.
pub fn date_key(d: NaiveDate) -> Result<i32, LoadError> {
    if !(1..=9999).contains(&d.year()) {
        return Err(LoadError::InvalidSource(format!(
            "date {d} is outside years 1..=9999"
        )));
    }
    Ok(d.year() * 10_000 + d.month() as i32 * 100 + d.day() as i32)
}

fn day_name(w: Weekday) -> &'static str {
    match w {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// All calendar attributes of `d`, derived from the date alone.
pub fn date_row(d: NaiveDate) -> Result<DateRow, LoadError> {
    let date_key = date_key(d)?;
    let year = i16::try_from(d.year())
        .map_err(|_| LoadError::InvalidSource(format!("year of {d} does not fit dim_date")))?;
    let weekday = d.weekday();
    let day_of_week = weekday.number_from_monday() as i16;
    let month = d.month();
    Ok(DateRow {
        date_key,
        full_date: d,
        year,
        quarter: ((month - 1) / 3 + 1) as i16,
        month: month as i16,
        month_name: MONTH_NAMES[(month - 1) as usize].to_string(),
        week_of_year: d.iso_week().week() as i16,
        day_of_month: d.day() as i16,
        day_of_week,
        day_name: day_name(weekday).to_string(),
        is_weekend: day_of_week >= 6,
    })
}

/// Inclusive day iterator; empty when `from > to`.
pub fn days(from: NaiveDate, to: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    from.iter_days().take_while(move |d| *d <= to)
}

/// Friday that opens the box-office weekend containing `d`
/// (Friday itself, or the most recent Friday before it).
pub fn weekend_anchor(d: NaiveDate) -> NaiveDate {
    let back = (d.weekday().num_days_from_monday() + 3) % 7;
    d.checked_sub_days(Days::new(back as u64)).unwrap_or(d)
}

/// Whole calendar years covering the span, with the start backed off six days
/// so a Friday anchor for any date in the first week is still covered.
pub fn covering_range(span: DateSpan) -> Option<(NaiveDate, NaiveDate)> {
    let (min, max) = (span.min_date?, span.max_date?);
    let start = NaiveDate::from_ymd_opt(min.year(), 1, 1)?;
    let start = start.checked_sub_days(Days::new(6)).unwrap_or(start);
    let end = NaiveDate::from_ymd_opt(max.year(), 12, 31)?;
    Some((start, end))
}
