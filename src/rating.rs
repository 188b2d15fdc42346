//! Incremental maintenance of a title's rating aggregate.
//!
//! `average_rating` is kept rounded to one decimal and updated from the
//! previous aggregate rather than recomputed from every stored rating. When an
//! update produces a non-finite value the affected rating is taken as
//! authoritative instead.

use crate::{
    error::{Error, Result},
    model::TitleStats,
};

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

pub fn validate(value: u8) -> Result<u8> {
    if (MIN_RATING..=MAX_RATING).contains(&value) {
        Ok(value)
    } else {
        Err(Error::InvalidRequest(format!(
            "rating must be between {MIN_RATING} and {MAX_RATING}, got {value}"
        )))
    }
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        round_one_decimal(value)
    } else {
        fallback
    }
}

/// Fold a brand-new rating into the aggregate.
pub fn apply_new(stats: &mut TitleStats, value: u8) {
    let n = f64::from(stats.total_ratings);
    let r = f64::from(value);
    let total = stats.total_ratings + 1;

    let avg = (stats.average_rating * n + r) / f64::from(total);
    stats.total_ratings = total;
    stats.average_rating = finite_or(avg, r);
}

/// Replace an existing rating `old` with `new`; the count is unchanged.
pub fn apply_update(stats: &mut TitleStats, old: u8, new: u8) {
    let n = f64::from(stats.total_ratings);
    let avg =
        (stats.average_rating * n - f64::from(old) + f64::from(new)) / n;
    stats.average_rating = finite_or(avg, f64::from(new));
}

/// Remove rating `value` from the aggregate.
pub fn apply_remove(stats: &mut TitleStats, value: u8) {
    if stats.total_ratings <= 1 {
        stats.total_ratings = 0;
        stats.average_rating = 0.0;
        return;
    }

    let n = f64::from(stats.total_ratings);
    let avg = (stats.average_rating * n - f64::from(value)) / (n - 1.0);
    stats.total_ratings -= 1;
    stats.average_rating = finite_or(avg, 0.0);
}
