//! Core Data Models
//!
//! This module defines the data structures used throughout the meter report
//! pipeline, from the raw export tree to the derived per-reading and
//! per-period records.
//!
//! ## Data Flow
//!
//! 1. **Raw Data**: [`ExportFile`] - the JSON tree written by the metering app
//! 2. **Domain**: [`Counter`] and [`Reading`] - normalized counters and their readings
//! 3. **Derived**: [`DeltaRecord`] - consumption since the preceding reading
//! 4. **Aggregated**: [`AggregateRecord`] - per-month and per-year sums keyed by [`Period`]
//!
//! ## Export Structure
//!
//! - [`ExportFile`] - top-level object with rooms and counters
//! - [`RoomEntry`] - room id and display name
//! - [`CounterEntry`] - counter metadata, virtual definition and entries
//! - [`ReadingEntry`] - one reading as exported (date, raw value, photo)
//!
//! Every export field is optional or defaulted; the app omits empty values
//! and older exports lack some keys entirely.

use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportFile {
    pub object_id: Option<String>,
    #[serde(default)]
    pub rooms: Vec<RoomEntry>,
    #[serde(default)]
    pub counters: Vec<CounterEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomEntry {
    pub room_id: Option<String>,
    pub name: Option<String>,
    pub title: Option<String>,
}

impl RoomEntry {
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().or(self.title.as_deref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterEntry {
    pub uuid: Option<String>,
    /// App-level id, a number in some exports and a string in others
    pub counter_id: Option<serde_json::Value>,
    pub counter_name: Option<String>,
    pub counter_type: Option<String>,
    pub counter_unit: Option<String>,
    pub room_id: Option<String>,
    pub virtual_counter_data: Option<VirtualCounterData>,
    #[serde(default)]
    pub entries: EntryList,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryList {
    #[serde(default)]
    pub entries: Vec<ReadingEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingEntry {
    pub date: Option<String>,
    pub value: Option<serde_json::Value>,
    pub local_image_file_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualCounterData {
    pub master_counter_uuid: Option<String>,
    #[serde(default)]
    pub counter_uuids_to_be_added: Vec<String>,
    #[serde(default)]
    pub counter_uuids_to_be_subtracted: Vec<String>,
}

/// Constituents of a virtual counter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VirtualSpec {
    pub master: Option<String>,
    pub add: Vec<String>,
    pub subtract: Vec<String>,
}

impl VirtualSpec {
    /// Master, additions and subtractions in that order, without duplicates.
    pub fn constituents(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for uuid in self
            .master
            .iter()
            .chain(self.add.iter())
            .chain(self.subtract.iter())
        {
            if !out.contains(&uuid.as_str()) {
                out.push(uuid);
            }
        }
        out
    }
}

impl From<&VirtualCounterData> for VirtualSpec {
    fn from(data: &VirtualCounterData) -> Self {
        Self {
            master: data
                .master_counter_uuid
                .as_ref()
                .filter(|m| !m.trim().is_empty())
                .cloned(),
            add: data.counter_uuids_to_be_added.clone(),
            subtract: data.counter_uuids_to_be_subtracted.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterKind {
    Physical,
    Virtual(VirtualSpec),
}

impl CounterKind {
    pub fn is_virtual(&self) -> bool {
        matches!(self, CounterKind::Virtual(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            CounterKind::Physical => "PHYSICAL",
            CounterKind::Virtual(_) => "VIRTUAL",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Counter {
    pub uuid: String,
    pub counter_id: Option<String>,
    pub name: String,
    pub unit: Option<String>,
    pub kind: CounterKind,
    pub room: Option<String>,
    pub object: Option<String>,
    /// Export folder the counter was loaded from
    pub source: String,
}

impl Counter {
    pub fn physical(uuid: &str, name: &str) -> Self {
        Self {
            uuid: uuid.to_string(),
            counter_id: None,
            name: name.to_string(),
            unit: None,
            kind: CounterKind::Physical,
            room: None,
            object: None,
            source: String::new(),
        }
    }

    pub fn virtual_counter(uuid: &str, name: &str, spec: VirtualSpec) -> Self {
        Self {
            kind: CounterKind::Virtual(spec),
            ..Self::physical(uuid, name)
        }
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    pub fn virtual_spec(&self) -> Option<&VirtualSpec> {
        match &self.kind {
            CounterKind::Virtual(spec) => Some(spec),
            CounterKind::Physical => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub timestamp: NaiveDateTime,
    /// Parsed numeric value; `None` when the raw value is missing or not numeric
    pub value: Option<f64>,
    pub value_orig: Option<String>,
    pub photo: Option<String>,
}

impl Reading {
    pub fn new(timestamp: NaiveDateTime, value: f64) -> Self {
        Self {
            timestamp,
            value: Some(value),
            value_orig: Some(value.to_string()),
            photo: None,
        }
    }
}

/// Consumption derived for one reading from its predecessor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaRecord {
    pub prev_value: Option<f64>,
    pub prev_date: Option<NaiveDateTime>,
    pub delta: f64,
    pub days: Option<f64>,
    pub delta_per_day: Option<f64>,
    pub reset_detected: bool,
}

/// A reading together with its numeric value and derived delta.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingRow {
    pub reading: Reading,
    pub value: f64,
    pub delta: DeltaRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Granularity {
    Monthly,
    Yearly,
}

/// Calendar period used as aggregation key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Period {
    Month { year: i32, month: u32 },
    Year(i32),
}

impl Period {
    pub fn of(timestamp: &NaiveDateTime, granularity: Granularity) -> Self {
        match granularity {
            Granularity::Monthly => Period::Month {
                year: timestamp.year(),
                month: timestamp.month(),
            },
            Granularity::Yearly => Period::Year(timestamp.year()),
        }
    }

    pub fn year(&self) -> i32 {
        match self {
            Period::Month { year, .. } => *year,
            Period::Year(year) => *year,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Month { year, month } => write!(f, "{:04}-{:02}", year, month),
            Period::Year(year) => write!(f, "{:04}", year),
        }
    }
}

impl Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRecord {
    pub counter_uuid: String,
    pub period: Period,
    pub delta: f64,
    /// Sum of the present `days` of the period's readings
    pub days: Option<f64>,
    pub delta_per_day: Option<f64>,
    pub reading_count: usize,
    pub reset_count: usize,
    pub first_date: NaiveDateTime,
    pub last_date: NaiveDateTime,
}
