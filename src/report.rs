//! Report Builder
//!
//! Turns an [`Analysis`] into the relations that are displayed or written
//! to disk:
//!
//! - `counters` - one overview line per counter, in hierarchical order
//! - `raw` - every reading with its delta
//! - `monthly` / `yearly` - aggregates per calendar period
//! - `summary` - utility maxima per month
//! - `boundaries` - 1 Jan / 31 Dec estimates
//! - `failures` - counters that were dropped
//!
//! ## Ordering
//!
//! Counters are sorted by name. A virtual counter is immediately followed by
//! its constituents (additions, subtractions, then the master), each counter
//! appearing once.
//!
//! ## Unit scaling
//!
//! Counters exported in cubic units are usually recorded in litres. When
//! scaling is enabled, their values, deltas and rates are divided by the
//! configured divisor and each affected row carries a remark.
//!
//! ## Date filters
//!
//! `since`/`until` restrict the emitted rows only. Deltas were computed on
//! the full history beforehand.

use crate::analyzer::{Analysis, CounterAnalysis};
use crate::boundary::{BoundaryEstimate, EstimateMethod};
use crate::error::CounterFailure;
use crate::models::*;
use crate::summary::{build_summary, SummaryRow};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

const CUBIC_UNITS: [&str; 4] = ["qbm", "m3", "m³", "m^3"];

#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub scale_cubic: bool,
    pub cubic_divisor: f64,
    pub since: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
    /// Case-insensitive substring of the counter name
    pub counter_filter: Option<String>,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            scale_cubic: true,
            cubic_divisor: 1000.0,
            since: None,
            until: None,
            counter_filter: None,
        }
    }
}

impl ReportOptions {
    fn in_range(&self, date: NaiveDate) -> bool {
        self.since.map_or(true, |s| date >= s) && self.until.map_or(true, |u| date <= u)
    }

    fn overlaps(&self, first: NaiveDate, last: NaiveDate) -> bool {
        self.since.map_or(true, |s| last >= s) && self.until.map_or(true, |u| first <= u)
    }

    fn matches(&self, counter: &Counter) -> bool {
        match &self.counter_filter {
            Some(needle) => counter.name.to_lowercase().contains(&needle.to_lowercase()),
            None => true,
        }
    }
}

pub fn is_cubic_unit(unit: &str) -> bool {
    let unit = unit.trim().to_lowercase();
    CUBIC_UNITS.contains(&unit.as_str())
}

/// Divisor and remark applied to one counter's figures.
#[derive(Debug, Clone, PartialEq)]
struct Scale {
    divisor: f64,
    remark: Option<String>,
}

impl Scale {
    fn for_counter(counter: &Counter, options: &ReportOptions) -> Self {
        let cubic = counter.unit.as_deref().map_or(false, is_cubic_unit);
        if options.scale_cubic && cubic && options.cubic_divisor > 0.0 {
            Self {
                divisor: options.cubic_divisor,
                remark: Some(format!("values divided by {}", options.cubic_divisor)),
            }
        } else {
            Self {
                divisor: 1.0,
                remark: None,
            }
        }
    }

    fn apply(&self, value: f64) -> f64 {
        value / self.divisor
    }

    fn apply_opt(&self, value: Option<f64>) -> Option<f64> {
        value.map(|v| v / self.divisor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterOverview {
    pub counter_uuid: String,
    pub counter_id: Option<String>,
    pub counter_name: String,
    pub counter_type: String,
    pub unit: Option<String>,
    pub room: Option<String>,
    pub object: Option<String>,
    pub source: String,
    /// Nesting level below virtual counters, 0 at the top
    pub depth: usize,
    pub reading_count: usize,
    pub first_date: Option<NaiveDateTime>,
    pub last_date: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRow {
    pub counter_uuid: String,
    pub counter_id: Option<String>,
    pub counter_name: String,
    pub counter_type: String,
    pub unit: Option<String>,
    pub room: Option<String>,
    pub object: Option<String>,
    pub date: NaiveDateTime,
    pub value: f64,
    pub value_orig: Option<String>,
    pub photo: Option<String>,
    pub prev_value: Option<f64>,
    pub prev_date: Option<NaiveDateTime>,
    pub delta: f64,
    pub days: Option<f64>,
    pub delta_per_day: Option<f64>,
    pub reset_detected: bool,
    pub remark: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRow {
    pub counter_uuid: String,
    pub counter_name: String,
    pub unit: Option<String>,
    pub period: Period,
    pub delta: f64,
    pub days: Option<f64>,
    pub delta_per_day: Option<f64>,
    pub reading_count: usize,
    pub reset_count: usize,
    pub first_date: NaiveDateTime,
    pub last_date: NaiveDateTime,
    pub remark: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundaryRow {
    pub counter_uuid: String,
    pub counter_name: String,
    pub unit: Option<String>,
    pub date: NaiveDate,
    pub value: f64,
    pub daily_rate: f64,
    pub annualized: f64,
    pub method: EstimateMethod,
    pub estimated: bool,
    pub remark: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub run_id: String,
    pub generated_at: DateTime<Local>,
    pub sources: Vec<String>,
    pub counters: Vec<CounterOverview>,
    pub raw: Vec<RawRow>,
    pub monthly: Vec<AggregateRow>,
    pub yearly: Vec<AggregateRow>,
    pub summary: Vec<SummaryRow>,
    pub boundaries: Vec<BoundaryRow>,
    pub failures: Vec<CounterFailure>,
}

/// Counters sorted by name, each virtual counter followed by its
/// constituents. Returns each counter with its nesting depth.
pub fn hierarchical_order<'a>(counters: &[&'a Counter]) -> Vec<(&'a Counter, usize)> {
    let by_uuid: HashMap<&str, &'a Counter> = counters.iter().map(|c| (c.uuid.as_str(), *c)).collect();

    let claimed: HashSet<&str> = counters
        .iter()
        .filter_map(|c| c.virtual_spec().map(|spec| (c, spec)))
        .flat_map(|(c, spec)| {
            spec.constituents()
                .into_iter()
                .filter(move |uuid| *uuid != c.uuid)
        })
        .filter(|uuid| by_uuid.contains_key(uuid))
        .collect();

    let mut sorted: Vec<&'a Counter> = counters.to_vec();
    sorted.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.uuid.cmp(&b.uuid)));

    fn emit<'a>(
        counter: &'a Counter,
        depth: usize,
        by_uuid: &HashMap<&str, &'a Counter>,
        listed: &mut HashSet<String>,
        out: &mut Vec<(&'a Counter, usize)>,
    ) {
        if !listed.insert(counter.uuid.clone()) {
            return;
        }
        out.push((counter, depth));
        if let Some(spec) = counter.virtual_spec() {
            let children = spec.add.iter().chain(spec.subtract.iter()).chain(spec.master.iter());
            for uuid in children {
                if let Some(&child) = by_uuid.get(uuid.as_str()) {
                    emit(child, depth + 1, by_uuid, listed, out);
                }
            }
        }
    }

    let mut listed = HashSet::new();
    let mut out = Vec::with_capacity(sorted.len());
    for &counter in sorted.iter().filter(|c| !claimed.contains(c.uuid.as_str())) {
        emit(counter, 0, &by_uuid, &mut listed, &mut out);
    }
    // Constituents whose parents are all constituents themselves
    for &counter in &sorted {
        emit(counter, 0, &by_uuid, &mut listed, &mut out);
    }
    out
}

fn overview(entry: &CounterAnalysis, depth: usize) -> CounterOverview {
    let counter = &entry.counter;
    CounterOverview {
        counter_uuid: counter.uuid.clone(),
        counter_id: counter.counter_id.clone(),
        counter_name: counter.name.clone(),
        counter_type: counter.kind.label().to_string(),
        unit: counter.unit.clone(),
        room: counter.room.clone(),
        object: counter.object.clone(),
        source: counter.source.clone(),
        depth,
        reading_count: entry.rows.len(),
        first_date: entry.rows.first().map(|r| r.reading.timestamp),
        last_date: entry.rows.last().map(|r| r.reading.timestamp),
    }
}

fn raw_row(counter: &Counter, row: &ReadingRow, scale: &Scale) -> RawRow {
    RawRow {
        counter_uuid: counter.uuid.clone(),
        counter_id: counter.counter_id.clone(),
        counter_name: counter.name.clone(),
        counter_type: counter.kind.label().to_string(),
        unit: counter.unit.clone(),
        room: counter.room.clone(),
        object: counter.object.clone(),
        date: row.reading.timestamp,
        value: scale.apply(row.value),
        value_orig: row.reading.value_orig.clone(),
        photo: row.reading.photo.clone(),
        prev_value: scale.apply_opt(row.delta.prev_value),
        prev_date: row.delta.prev_date,
        delta: scale.apply(row.delta.delta),
        days: row.delta.days,
        delta_per_day: scale.apply_opt(row.delta.delta_per_day),
        reset_detected: row.delta.reset_detected,
        remark: scale.remark.clone(),
    }
}

fn aggregate_row(counter: &Counter, record: &AggregateRecord, scale: &Scale) -> AggregateRow {
    AggregateRow {
        counter_uuid: counter.uuid.clone(),
        counter_name: counter.name.clone(),
        unit: counter.unit.clone(),
        period: record.period,
        delta: scale.apply(record.delta),
        days: record.days,
        delta_per_day: scale.apply_opt(record.delta_per_day),
        reading_count: record.reading_count,
        reset_count: record.reset_count,
        first_date: record.first_date,
        last_date: record.last_date,
        remark: scale.remark.clone(),
    }
}

fn boundary_row(counter: &Counter, estimate: &BoundaryEstimate, scale: &Scale) -> BoundaryRow {
    BoundaryRow {
        counter_uuid: counter.uuid.clone(),
        counter_name: counter.name.clone(),
        unit: counter.unit.clone(),
        date: estimate.date,
        value: scale.apply(estimate.value),
        daily_rate: scale.apply(estimate.daily_rate),
        annualized: scale.apply(estimate.annualized),
        method: estimate.method,
        estimated: estimate.is_estimated(),
        remark: scale.remark.clone(),
    }
}

/// Build every output relation from an analysis.
pub fn build_report(analysis: &Analysis, options: &ReportOptions, run_id: &str) -> Report {
    let selected: Vec<&CounterAnalysis> = analysis
        .counters
        .iter()
        .filter(|c| options.matches(&c.counter))
        .collect();
    let by_uuid: HashMap<&str, &CounterAnalysis> =
        selected.iter().map(|c| (c.counter.uuid.as_str(), *c)).collect();
    let counters: Vec<&Counter> = selected.iter().map(|c| &c.counter).collect();

    let mut report = Report {
        run_id: run_id.to_string(),
        generated_at: Local::now(),
        sources: analysis.sources.clone(),
        counters: Vec::new(),
        raw: Vec::new(),
        monthly: Vec::new(),
        yearly: Vec::new(),
        summary: Vec::new(),
        boundaries: Vec::new(),
        failures: analysis
            .failures
            .iter()
            .filter(|f| {
                options
                    .counter_filter
                    .as_ref()
                    .map_or(true, |n| f.counter_name.to_lowercase().contains(&n.to_lowercase()))
            })
            .cloned()
            .collect(),
    };

    let mut summary_input: Vec<(Counter, Vec<ReadingRow>)> = Vec::new();

    for (counter, depth) in hierarchical_order(&counters) {
        let Some(entry) = by_uuid.get(counter.uuid.as_str()) else {
            continue;
        };
        let scale = Scale::for_counter(counter, options);
        report.counters.push(overview(entry, depth));

        let rows: Vec<&ReadingRow> = entry
            .rows
            .iter()
            .filter(|r| options.in_range(r.reading.timestamp.date()))
            .collect();
        report
            .raw
            .extend(rows.iter().map(|row| raw_row(counter, row, &scale)));

        let in_period = |r: &&AggregateRecord| options.overlaps(r.first_date.date(), r.last_date.date());
        report.monthly.extend(
            entry
                .monthly
                .iter()
                .filter(in_period)
                .map(|r| aggregate_row(counter, r, &scale)),
        );
        report.yearly.extend(
            entry
                .yearly
                .iter()
                .filter(in_period)
                .map(|r| aggregate_row(counter, r, &scale)),
        );
        report.boundaries.extend(
            entry
                .boundaries
                .iter()
                .filter(|b| options.in_range(b.date))
                .map(|b| boundary_row(counter, b, &scale)),
        );

        let scaled_rows = rows
            .into_iter()
            .map(|row| ReadingRow {
                value: scale.apply(row.value),
                ..row.clone()
            })
            .collect();
        summary_input.push((counter.clone(), scaled_rows));
    }

    report.summary = build_summary(
        summary_input
            .iter()
            .map(|(counter, rows)| (counter, rows.as_slice())),
    );
    report
}
