//! Delta and aggregation properties over generated reading sequences

use chrono::{Duration, NaiveDate, NaiveDateTime};
use meter_report::aggregate::{monthly, yearly};
use meter_report::delta::{compute_deltas, compute_rows};
use meter_report::Reading;

/// Small deterministic generator so sequences are reproducible.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }
}

fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 11, 20)
        .unwrap()
        .and_hms_opt(7, 30, 0)
        .unwrap()
}

/// Mostly increasing readings at irregular intervals with occasional resets
/// and repeated timestamps.
fn sequence(seed: u64, len: usize) -> Vec<Reading> {
    let mut rng = Lcg(seed);
    let mut ts = start();
    let mut value = 500.0;
    let mut readings = Vec::with_capacity(len);
    for _ in 0..len {
        match rng.next() % 10 {
            0 => value = (rng.next() % 50) as f64,
            1 => {}
            _ => value += (rng.next() % 400) as f64 / 4.0,
        }
        if rng.next() % 7 != 0 {
            ts += Duration::hours((rng.next() % 24 * 20) as i64);
        }
        readings.push(Reading::new(ts, value));
    }
    readings
}

#[test]
fn test_delta_rules_hold_for_generated_sequences() {
    for seed in 1..40 {
        let readings = sequence(seed, 60);
        let records = compute_deltas("c", &readings).unwrap();
        assert_eq!(records.len(), readings.len());

        let first = &records[0];
        assert_eq!(first.delta, readings[0].value.unwrap());
        assert_eq!(first.prev_value, None);

        for i in 1..readings.len() {
            let prev = readings[i - 1].value.unwrap();
            let cur = readings[i].value.unwrap();
            let record = &records[i];
            if cur >= prev {
                assert!(!record.reset_detected);
                assert_eq!(record.delta, cur - prev);
                assert!(record.delta >= 0.0);
                assert_eq!(record.prev_value, Some(prev));
                assert_eq!(record.prev_date, Some(readings[i - 1].timestamp));
            } else {
                assert!(record.reset_detected);
                assert_eq!(record.delta, cur);
                assert_eq!(record.prev_value, None);
                assert_eq!(record.days, None);
            }
            if let (Some(rate), Some(days)) = (record.delta_per_day, record.days) {
                if days > 0.0 {
                    assert!((rate - record.delta / days).abs() < 1e-9);
                }
            }
        }
    }
}

#[test]
fn test_recomputation_is_idempotent() {
    let readings = sequence(7, 100);
    assert_eq!(
        compute_rows("c", &readings).unwrap(),
        compute_rows("c", &readings).unwrap()
    );
}

#[test]
fn test_monthly_sums_equal_yearly_sums() {
    for seed in 1..20 {
        let rows = compute_rows("c", &sequence(seed, 80)).unwrap();
        let months = monthly("c", &rows);
        let years = yearly("c", &rows);

        for year in &years {
            let sum: f64 = months
                .iter()
                .filter(|m| m.period.year() == year.period.year())
                .map(|m| m.delta)
                .sum();
            assert!((sum - year.delta).abs() < 1e-6);

            let count: usize = months
                .iter()
                .filter(|m| m.period.year() == year.period.year())
                .map(|m| m.reading_count)
                .sum();
            assert_eq!(count, year.reading_count);
        }
    }
}

#[test]
fn test_reference_scenarios() {
    let day = |m, d| {
        NaiveDate::from_ymd_opt(2024, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    };
    let records = compute_deltas(
        "c",
        &[
            Reading::new(day(1, 1), 100.0),
            Reading::new(day(1, 15), 130.0),
            Reading::new(day(2, 1), 50.0),
            Reading::new(day(2, 1), 50.0),
        ],
    )
    .unwrap();

    assert_eq!(records[1].delta, 30.0);
    assert_eq!(records[1].days, Some(14.0));
    assert!((records[1].delta_per_day.unwrap() - 2.142857).abs() < 1e-6);

    assert!(records[2].reset_detected);
    assert_eq!(records[2].delta, 50.0);

    assert_eq!(records[3].delta, 0.0);
    assert_eq!(records[3].delta_per_day, Some(0.0));
}
