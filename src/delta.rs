//! Delta Calculator
//!
//! Derives consumption between consecutive readings of one counter. The
//! readings must already be in ascending timestamp order (see
//! [`crate::store::CounterStream`]).
//!
//! ## Rules
//!
//! - The first reading has no predecessor: its delta is its own value.
//! - A value lower than the preceding one is a reset (meter replaced or
//!   rolled over): the delta is the new value and no predecessor is reported.
//! - Otherwise the delta is the difference, and `days` is the fractional
//!   number of days between the two timestamps.
//! - `delta_per_day` is `delta / days` when `days > 0`. A zero delta is zero
//!   per day even on a zero-day span; a non-zero delta on a zero-day span has
//!   no rate.
//!
//! Whatever the outcome, the next reading is compared with the one directly
//! before it. The running predecessor is carried as a fold accumulator, so
//! the computation is a pure function of the reading sequence.

use crate::error::DataError;
use crate::models::{DeltaRecord, Reading, ReadingRow};
use chrono::NaiveDateTime;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// The reading a successor is compared against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Previous {
    pub timestamp: NaiveDateTime,
    pub value: f64,
}

impl DeltaRecord {
    /// Delta of a reading given its predecessor, if any.
    pub fn following(previous: Option<Previous>, timestamp: NaiveDateTime, value: f64) -> Self {
        match previous {
            None => Self::baseline(value, false),
            Some(prev) if value < prev.value => Self::baseline(value, true),
            Some(prev) => {
                let delta = value - prev.value;
                let days = elapsed_days(prev.timestamp, timestamp);
                let delta_per_day = if delta == 0.0 {
                    Some(0.0)
                } else if days > 0.0 {
                    Some(delta / days)
                } else {
                    None
                };
                Self {
                    prev_value: Some(prev.value),
                    prev_date: Some(prev.timestamp),
                    delta,
                    days: Some(days),
                    delta_per_day,
                    reset_detected: false,
                }
            }
        }
    }

    fn baseline(value: f64, reset_detected: bool) -> Self {
        Self {
            prev_value: None,
            prev_date: None,
            delta: value,
            days: None,
            delta_per_day: None,
            reset_detected,
        }
    }
}

pub fn elapsed_days(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    (to - from).num_milliseconds() as f64 / MILLIS_PER_DAY
}

/// One [`DeltaRecord`] per reading, in the same order.
///
/// Fails on the first reading without a numeric value; `counter` is only
/// used to label that error.
pub fn compute_deltas(counter: &str, readings: &[Reading]) -> Result<Vec<DeltaRecord>, DataError> {
    Ok(fold_readings(counter, readings)?
        .into_iter()
        .map(|(_, record)| record)
        .collect())
}

/// Readings paired with their numeric value and delta.
pub fn compute_rows(counter: &str, readings: &[Reading]) -> Result<Vec<ReadingRow>, DataError> {
    Ok(readings
        .iter()
        .cloned()
        .zip(fold_readings(counter, readings)?)
        .map(|(reading, (value, delta))| ReadingRow {
            reading,
            value,
            delta,
        })
        .collect())
}

fn fold_readings(counter: &str, readings: &[Reading]) -> Result<Vec<(f64, DeltaRecord)>, DataError> {
    let (records, _) = readings.iter().enumerate().try_fold(
        (Vec::with_capacity(readings.len()), None::<Previous>),
        |(mut records, previous), (index, reading)| {
            let value = reading.value.ok_or_else(|| DataError::MissingValue {
                counter: counter.to_string(),
                index,
                timestamp: reading.timestamp.to_string(),
                raw: reading.value_orig.clone(),
            })?;
            records.push((value, DeltaRecord::following(previous, reading.timestamp, value)));
            Ok::<_, DataError>((
                records,
                Some(Previous {
                    timestamp: reading.timestamp,
                    value,
                }),
            ))
        },
    )?;
    Ok(records)
}
