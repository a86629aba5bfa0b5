//! Derived fact measures. Every division is zero-guarded and every float is
//! checked for finiteness so NaN/inf never reach the warehouse.

/// `revenue - budget`; None when either side is unknown or the subtraction overflows.
pub fn profit(budget: Option<i64>, revenue: Option<i64>) -> Option<i64> {
    revenue?.checked_sub(budget?)
}

/// `profit / budget` as a ratio (1.5 = 150% return). None when budget is zero,
/// negative or unknown.
pub fn roi(budget: Option<i64>, revenue: Option<i64>) -> Option<f64> {
    let budget = budget.filter(|b| *b > 0)?;
    let profit = profit(Some(budget), revenue)?;
    finite(profit as f64 / budget as f64)
}

/// Years between publication and release. A gap recorded on the adaptation
/// wins; otherwise computed. Negative gaps are kept as-is.
pub fn adaptation_gap_years(
    recorded: Option<i32>,
    release_year: Option<i32>,
    publication_year: Option<i32>,
) -> Option<i32> {
    recorded.or_else(|| release_year?.checked_sub(publication_year?))
}

/// Arithmetic mean of the finite values; None for an empty input.
pub fn mean(values: &[f64]) -> Option<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    Some(finite.iter().sum::<f64>() / finite.len() as f64)
}

/// Keep a rating only when it is finite and within `[lo, hi]`.
pub fn bounded(value: Option<f64>, lo: f64, hi: f64) -> Option<f64> {
    value.filter(|v| v.is_finite() && (lo..=hi).contains(v))
}

/// Counts and money cannot be negative; treat negatives as unknown.
pub fn non_negative(value: Option<i64>) -> Option<i64> {
    value.filter(|v| *v >= 0)
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}
