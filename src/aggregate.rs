//! Aggregator
//!
//! Groups one counter's [`ReadingRow`]s by calendar month or calendar year.
//!
//! - `delta` is the sum of every reading's delta in the period, reset
//!   baselines included as they are.
//! - `days` is the sum of the readings' present `days`. A span that starts in
//!   the previous period counts fully towards the period of the reading that
//!   closes it.
//! - `delta_per_day` is `delta / days` when `days > 0`.
//! - Periods without readings produce no record.

use crate::models::*;
use std::collections::BTreeMap;

struct PeriodAccumulator {
    delta: f64,
    days: Option<f64>,
    reading_count: usize,
    reset_count: usize,
    first_date: chrono::NaiveDateTime,
    last_date: chrono::NaiveDateTime,
}

impl PeriodAccumulator {
    fn start(row: &ReadingRow) -> Self {
        Self {
            delta: 0.0,
            days: None,
            reading_count: 0,
            reset_count: 0,
            first_date: row.reading.timestamp,
            last_date: row.reading.timestamp,
        }
    }

    fn add(&mut self, row: &ReadingRow) {
        self.delta += row.delta.delta;
        if let Some(days) = row.delta.days {
            *self.days.get_or_insert(0.0) += days;
        }
        self.reading_count += 1;
        if row.delta.reset_detected {
            self.reset_count += 1;
        }
        self.first_date = self.first_date.min(row.reading.timestamp);
        self.last_date = self.last_date.max(row.reading.timestamp);
    }

    fn finish(self, counter_uuid: &str, period: Period) -> AggregateRecord {
        let delta_per_day = match self.days {
            Some(days) if days > 0.0 => Some(self.delta / days),
            _ => None,
        };
        AggregateRecord {
            counter_uuid: counter_uuid.to_string(),
            period,
            delta: self.delta,
            days: self.days,
            delta_per_day,
            reading_count: self.reading_count,
            reset_count: self.reset_count,
            first_date: self.first_date,
            last_date: self.last_date,
        }
    }
}

/// One record per period that has at least one reading, oldest first.
pub fn aggregate(counter_uuid: &str, rows: &[ReadingRow], granularity: Granularity) -> Vec<AggregateRecord> {
    let mut periods: BTreeMap<Period, PeriodAccumulator> = BTreeMap::new();

    for row in rows {
        let period = Period::of(&row.reading.timestamp, granularity);
        periods
            .entry(period)
            .or_insert_with(|| PeriodAccumulator::start(row))
            .add(row);
    }

    periods
        .into_iter()
        .map(|(period, acc)| acc.finish(counter_uuid, period))
        .collect()
}

pub fn monthly(counter_uuid: &str, rows: &[ReadingRow]) -> Vec<AggregateRecord> {
    aggregate(counter_uuid, rows, Granularity::Monthly)
}

pub fn yearly(counter_uuid: &str, rows: &[ReadingRow]) -> Vec<AggregateRecord> {
    aggregate(counter_uuid, rows, Granularity::Yearly)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::compute_rows;
    use chrono::{NaiveDate, NaiveDateTime};

    fn ts(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn rows() -> Vec<ReadingRow> {
        compute_rows(
            "c",
            &[
                Reading::new(ts(2024, 1, 1), 100.0),
                Reading::new(ts(2024, 1, 15), 130.0),
                Reading::new(ts(2024, 2, 1), 50.0),
                Reading::new(ts(2024, 2, 21), 70.0),
                Reading::new(ts(2024, 4, 10), 90.0),
                Reading::new(ts(2025, 1, 10), 120.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_monthly_sums_and_rates() {
        let months = monthly("c", &rows());
        let labels: Vec<String> = months.iter().map(|m| m.period.to_string()).collect();
        assert_eq!(labels, vec!["2024-01", "2024-02", "2024-04", "2025-01"]);

        // January: baseline 100 + 30 over 14 days
        assert_eq!(months[0].delta, 130.0);
        assert_eq!(months[0].days, Some(14.0));
        assert!((months[0].delta_per_day.unwrap() - 130.0 / 14.0).abs() < 1e-12);

        // February: reset baseline 50 (summed as-is) + 20 over 20 days
        assert_eq!(months[1].delta, 70.0);
        assert_eq!(months[1].days, Some(20.0));
        assert_eq!(months[1].reset_count, 1);
        assert_eq!(months[1].reading_count, 2);
        assert_eq!(months[1].first_date, ts(2024, 2, 1));
        assert_eq!(months[1].last_date, ts(2024, 2, 21));

        // April: whole span since 21 Feb attributed to April
        assert_eq!(months[2].delta, 20.0);
        assert_eq!(months[2].days, Some(49.0));
    }

    #[test]
    fn test_monthly_totals_match_yearly() {
        let rows = rows();
        let months = monthly("c", &rows);
        let years = yearly("c", &rows);
        assert_eq!(years.len(), 2);

        for year in &years {
            let monthly_sum: f64 = months
                .iter()
                .filter(|m| m.period.year() == year.period.year())
                .map(|m| m.delta)
                .sum();
            assert!((monthly_sum - year.delta).abs() < 1e-9);
        }
        assert_eq!(years[0].delta, 220.0);
        assert_eq!(years[0].reading_count, 5);
    }

    #[test]
    fn test_period_without_days_has_no_rate() {
        let rows = compute_rows("c", &[Reading::new(ts(2024, 5, 1), 10.0)]).unwrap();
        let months = monthly("c", &rows);
        assert_eq!(months.len(), 1);
        assert_eq!(months[0].days, None);
        assert_eq!(months[0].delta_per_day, None);
    }

    #[test]
    fn test_zero_day_period_has_no_rate() {
        let rows = compute_rows(
            "c",
            &[
                Reading::new(ts(2024, 5, 1), 10.0),
                Reading::new(ts(2024, 5, 1), 12.0),
            ],
        )
        .unwrap();
        let months = monthly("c", &rows);
        assert_eq!(months[0].days, Some(0.0));
        assert_eq!(months[0].delta, 12.0);
        assert_eq!(months[0].delta_per_day, None);
    }

    #[test]
    fn test_empty_rows() {
        assert!(monthly("c", &[]).is_empty());
        assert!(yearly("c", &[]).is_empty());
    }
}
