//! Utility summary
//!
//! One row per reading month with the highest month-end reading of each
//! utility kind, and the dwelling unit the month's first counter belongs to.
//! A counter's month-end reading is its last reading within that month;
//! months in which no counter was read have no row.

use crate::models::{Counter, ReadingRow};
use chrono::Datelike;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UtilityKind {
    Water,
    Heat,
    Electricity,
}

impl UtilityKind {
    /// Classify a counter from its type label and name, case-insensitively.
    pub fn detect(counter_type: &str, name: &str) -> Option<Self> {
        let text = format!("{} {}", counter_type, name).to_lowercase();
        if text.contains("wasser") || text.contains("water") {
            Some(UtilityKind::Water)
        } else if text.contains("wärme") || text.contains("waerme") || text.contains("heat") {
            Some(UtilityKind::Heat)
        } else if text.contains("strom") || text.contains("electric") {
            Some(UtilityKind::Electricity)
        } else {
            None
        }
    }
}

/// Dwelling unit of a counter: the first two `.`-separated parts of its name,
/// e.g. `H1.Whg2` for `H1.Whg2.Wasser-Kueche`.
pub fn dwelling_unit(name: &str) -> String {
    name.splitn(3, '.').take(2).collect::<Vec<_>>().join(".")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRow {
    /// Reading month as `YYYY.MM`
    pub month: String,
    pub water: Option<f64>,
    pub heat: Option<f64>,
    pub electricity: Option<f64>,
    pub dwelling: Option<String>,
}

impl SummaryRow {
    fn record(&mut self, kind: UtilityKind, value: f64) {
        let slot = match kind {
            UtilityKind::Water => &mut self.water,
            UtilityKind::Heat => &mut self.heat,
            UtilityKind::Electricity => &mut self.electricity,
        };
        *slot = Some(slot.map_or(value, |current| current.max(value)));
    }
}

/// Last reading value of each month, in month order.
fn month_end_values(rows: &[ReadingRow]) -> BTreeMap<(i32, u32), f64> {
    rows.iter()
        .map(|row| {
            let ts = row.reading.timestamp;
            ((ts.year(), ts.month()), row.value)
        })
        .collect()
}

/// Build the monthly summary over counters in the given order.
pub fn build_summary<'a, I>(counters: I) -> Vec<SummaryRow>
where
    I: IntoIterator<Item = (&'a Counter, &'a [ReadingRow])>,
{
    let mut months: BTreeMap<(i32, u32), SummaryRow> = BTreeMap::new();

    for (counter, rows) in counters {
        let kind = UtilityKind::detect(counter.kind.label(), &counter.name);
        for ((year, month), value) in month_end_values(rows) {
            let entry = months.entry((year, month)).or_insert_with(|| SummaryRow {
                month: format!("{:04}.{:02}", year, month),
                ..Default::default()
            });
            if entry.dwelling.is_none() {
                entry.dwelling = Some(dwelling_unit(&counter.name));
            }
            if let Some(kind) = kind {
                entry.record(kind, value);
            }
        }
    }

    months.into_values().collect()
}
