//! Year-boundary estimates
//!
//! Estimates a counter's reading on 1 January and 31 December of every year
//! in a range, from the readings around each date:
//!
//! - a reading on the day itself is taken as is;
//! - readings on both sides are interpolated linearly, unless the later one
//!   is a reset, in which case the earlier side is extrapolated forward;
//! - with readings on one side only, the nearest one is extrapolated using
//!   its own `delta_per_day`.

use crate::delta::elapsed_days;
use crate::models::ReadingRow;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

const DAYS_PER_YEAR: f64 = 365.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimateMethod {
    Exact,
    Interpolated,
    Forward,
    Backward,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundaryEstimate {
    pub counter_uuid: String,
    pub date: NaiveDate,
    pub value: f64,
    pub daily_rate: f64,
    pub annualized: f64,
    pub method: EstimateMethod,
}

impl BoundaryEstimate {
    pub fn is_estimated(&self) -> bool {
        self.method != EstimateMethod::Exact
    }
}

/// 1 January and 31 December of every year in `first..=last`.
pub fn boundary_dates(first: i32, last: i32) -> Vec<NaiveDate> {
    (first..=last)
        .flat_map(|year| {
            [
                NaiveDate::from_ymd_opt(year, 1, 1),
                NaiveDate::from_ymd_opt(year, 12, 31),
            ]
        })
        .flatten()
        .collect()
}

/// Estimate for one target date, `None` when the counter has no rows.
pub fn estimate_at(counter_uuid: &str, rows: &[ReadingRow], date: NaiveDate) -> Option<BoundaryEstimate> {
    let target = date.and_hms_opt(0, 0, 0)?;

    let (value, daily_rate, method) =
        if let Some(row) = rows.iter().find(|r| r.reading.timestamp.date() == date) {
            (row.value, row.delta.delta_per_day.unwrap_or(0.0), EstimateMethod::Exact)
        } else {
            let before = rows.iter().rev().find(|r| r.reading.timestamp <= target);
            let after = rows.iter().find(|r| r.reading.timestamp >= target);

            match (before, after) {
                (Some(b), Some(a)) if !a.delta.reset_detected => interpolate(b, a, target),
                (Some(b), _) => {
                    let rate = b.delta.delta_per_day.unwrap_or(0.0);
                    (
                        b.value + rate * elapsed_days(b.reading.timestamp, target),
                        rate,
                        EstimateMethod::Forward,
                    )
                }
                (None, Some(a)) => {
                    let rate = a.delta.delta_per_day.unwrap_or(0.0);
                    (
                        a.value - rate * elapsed_days(target, a.reading.timestamp),
                        rate,
                        EstimateMethod::Backward,
                    )
                }
                (None, None) => return None,
            }
        };

    Some(BoundaryEstimate {
        counter_uuid: counter_uuid.to_string(),
        date,
        value,
        daily_rate,
        annualized: daily_rate * DAYS_PER_YEAR,
        method,
    })
}

fn interpolate(before: &ReadingRow, after: &ReadingRow, target: NaiveDateTime) -> (f64, f64, EstimateMethod) {
    let span = elapsed_days(before.reading.timestamp, after.reading.timestamp);
    if span <= 0.0 {
        let rate = before.delta.delta_per_day.unwrap_or(0.0);
        return (before.value, rate, EstimateMethod::Forward);
    }

    let slope = (after.value - before.value) / span;
    let fraction = elapsed_days(before.reading.timestamp, target) / span;
    (
        before.value + fraction * (after.value - before.value),
        after.delta.delta_per_day.unwrap_or(slope),
        EstimateMethod::Interpolated,
    )
}

/// Estimates for every boundary date of `first..=last`, oldest first.
pub fn estimate_years(counter_uuid: &str, rows: &[ReadingRow], first: i32, last: i32) -> Vec<BoundaryEstimate> {
    boundary_dates(first, last)
        .into_iter()
        .filter_map(|date| estimate_at(counter_uuid, rows, date))
        .collect()
}
