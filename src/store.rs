//! Reading Store
//!
//! In-memory, per-counter collection of readings built from one or more
//! export trees. Each counter's readings are kept in ascending timestamp
//! order; readings sharing a timestamp keep their export order. The store is
//! not mutated after construction: adding virtual counter streams consumes the
//! store and returns a new one.

use crate::models::*;
use crate::parser::ExportParser;
use crate::timestamp_parser::TimestampParser;
use chrono::NaiveDateTime;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct CounterStream {
    pub counter: Counter,
    pub readings: Vec<Reading>,
}

impl CounterStream {
    pub fn new(counter: Counter, mut readings: Vec<Reading>) -> Self {
        // Stable sort: equal timestamps keep input order
        readings.sort_by_key(|r| r.timestamp);

        for pair in readings.windows(2) {
            if pair[0].timestamp == pair[1].timestamp && pair[0].value != pair[1].value {
                debug!(
                    counter = %counter.uuid,
                    timestamp = %pair[0].timestamp,
                    "Duplicate timestamp with differing values, keeping export order"
                );
            }
        }

        Self { counter, readings }
    }

    pub fn last_reading(&self) -> Option<&Reading> {
        self.readings.last()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub counters: usize,
    pub readings: usize,
    pub skipped_counters: usize,
    pub skipped_readings: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ReadingStore {
    streams: Vec<CounterStream>,
    index: HashMap<String, usize>,
    stats: LoadStats,
}

impl ReadingStore {
    /// Build the store from a parsed export. `source` names the export folder.
    pub fn from_export(export: &ExportFile, source: &str) -> Self {
        let parser = ExportParser::new();
        let rooms = parser.room_names(export);
        let mut stats = LoadStats::default();
        let mut streams = Vec::with_capacity(export.counters.len());

        for entry in &export.counters {
            let Some(uuid) = entry.uuid.as_ref().filter(|u| !u.trim().is_empty()) else {
                warn!(
                    source = source,
                    counter_name = ?entry.counter_name,
                    "Skipping counter without uuid"
                );
                stats.skipped_counters += 1;
                continue;
            };

            let (room, object) = parser.resolve_room_and_object(entry, &rooms);
            let is_virtual = entry
                .counter_type
                .as_deref()
                .is_some_and(|t| t.eq_ignore_ascii_case("VIRTUAL"));
            let kind = if is_virtual {
                CounterKind::Virtual(
                    entry
                        .virtual_counter_data
                        .as_ref()
                        .map(VirtualSpec::from)
                        .unwrap_or_default(),
                )
            } else {
                CounterKind::Physical
            };

            let counter = Counter {
                uuid: uuid.clone(),
                counter_id: entry.counter_id.as_ref().and_then(render_counter_id),
                name: entry
                    .counter_name
                    .clone()
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| uuid.clone()),
                unit: entry.counter_unit.clone().filter(|u| !u.trim().is_empty()),
                kind,
                room,
                object,
                source: source.to_string(),
            };

            let mut readings = Vec::with_capacity(entry.entries.entries.len());
            for raw in &entry.entries.entries {
                let timestamp = match raw.date.as_deref().map(TimestampParser::parse) {
                    Some(Ok(ts)) => ts,
                    Some(Err(e)) => {
                        warn!(counter = %counter.uuid, error = %e, "Skipping reading with invalid date");
                        stats.skipped_readings += 1;
                        continue;
                    }
                    None => {
                        warn!(counter = %counter.uuid, "Skipping reading without date");
                        stats.skipped_readings += 1;
                        continue;
                    }
                };
                readings.push(Reading {
                    timestamp,
                    value: raw.value.as_ref().and_then(|v| parser.parse_value(v)),
                    value_orig: raw.value.as_ref().and_then(|v| parser.raw_value_text(v)),
                    photo: raw.local_image_file_name.clone(),
                });
            }

            stats.counters += 1;
            stats.readings += readings.len();
            streams.push(CounterStream::new(counter, readings));
        }

        let mut store = Self::from_streams(streams);
        store.stats.skipped_counters = stats.skipped_counters;
        store.stats.skipped_readings = stats.skipped_readings;
        store
    }

    /// Build the store from ready streams. A uuid seen twice (the same
    /// counter exported in two folders) gets one stream with all readings.
    pub fn from_streams(streams: Vec<CounterStream>) -> Self {
        let mut store = Self::default();
        for stream in streams {
            store.insert(stream);
        }
        store
    }

    /// Merge several stores, e.g. one per export folder.
    pub fn merge(stores: Vec<ReadingStore>) -> Self {
        let mut skipped_counters = 0;
        let mut skipped_readings = 0;
        let mut streams = Vec::new();
        for store in stores {
            skipped_counters += store.stats.skipped_counters;
            skipped_readings += store.stats.skipped_readings;
            streams.extend(store.streams);
        }
        let mut merged = Self::from_streams(streams);
        merged.stats.skipped_counters = skipped_counters;
        merged.stats.skipped_readings = skipped_readings;
        merged
    }

    /// Replace the streams of the given counters (or add them if new).
    pub fn with_streams(mut self, replacements: Vec<CounterStream>) -> Self {
        for stream in replacements {
            match self.index.get(&stream.counter.uuid) {
                Some(&pos) => {
                    self.stats.readings -= self.streams[pos].readings.len();
                    self.stats.readings += stream.readings.len();
                    self.streams[pos] = stream;
                }
                None => self.insert(stream),
            }
        }
        self
    }

    /// Drop the given counters.
    pub fn without(self, uuids: &HashSet<String>) -> Self {
        if uuids.is_empty() {
            return self;
        }
        let streams = self
            .streams
            .into_iter()
            .filter(|s| !uuids.contains(&s.counter.uuid))
            .collect();
        let mut store = Self::from_streams(streams);
        store.stats.skipped_counters = self.stats.skipped_counters;
        store.stats.skipped_readings = self.stats.skipped_readings;
        store
    }

    fn insert(&mut self, stream: CounterStream) {
        match self.index.get(&stream.counter.uuid) {
            Some(&pos) => {
                warn!(
                    counter = %stream.counter.uuid,
                    source = %stream.counter.source,
                    "Counter appears in more than one export, merging readings"
                );
                self.stats.readings += stream.readings.len();
                let existing = &mut self.streams[pos];
                let mut readings = std::mem::take(&mut existing.readings);
                readings.extend(stream.readings);
                *existing = CounterStream::new(existing.counter.clone(), readings);
            }
            None => {
                self.stats.counters += 1;
                self.stats.readings += stream.readings.len();
                self.index
                    .insert(stream.counter.uuid.clone(), self.streams.len());
                self.streams.push(stream);
            }
        }
    }

    pub fn get(&self, uuid: &str) -> Option<&CounterStream> {
        self.index.get(uuid).map(|&pos| &self.streams[pos])
    }

    pub fn contains(&self, uuid: &str) -> bool {
        self.index.contains_key(uuid)
    }

    pub fn streams(&self) -> &[CounterStream] {
        &self.streams
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn stats(&self) -> &LoadStats {
        &self.stats
    }

    /// Oldest and newest reading across all counters.
    pub fn date_range(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let mut all = self
            .streams
            .iter()
            .flat_map(|s| s.readings.iter().map(|r| r.timestamp));
        let first = all.next()?;
        Some(all.fold((first, first), |(lo, hi), ts| (lo.min(ts), hi.max(ts))))
    }
}

fn render_counter_id(raw: &serde_json::Value) -> Option<String> {
    match raw {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) if s.trim().is_empty() => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn export() -> ExportFile {
        serde_json::from_value(json!({
            "objectId": "obj",
            "rooms": [{"roomId": "r1", "name": "H1.Keller"}],
            "counters": [
                {
                    "uuid": "c1", "counterId": 5, "counterName": "H1.Keller.Wasser",
                    "counterType": "PHYSICAL", "counterUnit": "m3", "roomId": "r1",
                    "entries": {"entries": [
                        {"date": "2024-02-01T00:00:00Z", "value": "130"},
                        {"date": "2024-01-01T00:00:00Z", "value": 100, "localImageFileName": "a.jpg"},
                        {"date": "not a date", "value": 1},
                        {"value": 2}
                    ]}
                },
                {
                    "uuid": "v1", "counterName": "Sum", "counterType": "virtual",
                    "virtualCounterData": {"masterCounterUuid": "c1", "counterUuidsToBeAdded": ["c2"]}
                },
                {"counterName": "orphan"}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_from_export_orders_and_skips() {
        let store = ReadingStore::from_export(&export(), "folder-a");
        assert_eq!(store.len(), 2);
        assert_eq!(store.stats().skipped_readings, 2);
        assert_eq!(store.stats().skipped_counters, 1);

        let stream = store.get("c1").unwrap();
        assert_eq!(stream.readings.len(), 2);
        assert_eq!(stream.readings[0].value, Some(100.0));
        assert_eq!(stream.readings[0].photo.as_deref(), Some("a.jpg"));
        assert_eq!(stream.readings[1].value, Some(130.0));
        assert_eq!(stream.counter.counter_id.as_deref(), Some("5"));
        assert_eq!(stream.counter.room.as_deref(), Some("H1.Keller"));
        assert_eq!(stream.counter.object.as_deref(), Some("H1"));
        assert_eq!(stream.counter.source, "folder-a");
    }

    #[test]
    fn test_virtual_type_is_case_insensitive() {
        let store = ReadingStore::from_export(&export(), "folder-a");
        let spec = store.get("v1").unwrap().counter.virtual_spec().unwrap();
        assert_eq!(spec.master.as_deref(), Some("c1"));
        assert_eq!(spec.add, vec!["c2".to_string()]);
    }

    #[test]
    fn test_duplicate_timestamps_keep_input_order() {
        let ts = TimestampParser::parse("2024-01-01").unwrap();
        let stream = CounterStream::new(
            Counter::physical("c", "c"),
            vec![
                Reading::new(ts + chrono::Duration::days(1), 5.0),
                Reading::new(ts, 3.0),
                Reading::new(ts, 1.0),
            ],
        );
        let values: Vec<f64> = stream.readings.iter().filter_map(|r| r.value).collect();
        assert_eq!(values, vec![3.0, 1.0, 5.0]);
    }

    #[test]
    fn test_merge_combines_same_counter() {
        let a = ReadingStore::from_export(&export(), "a");
        let b = ReadingStore::from_export(&export(), "b");
        let merged = ReadingStore::merge(vec![a, b]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.get("c1").unwrap().readings.len(), 4);
        assert_eq!(merged.stats().readings, 4);
    }

    #[test]
    fn test_with_streams_replaces_existing() {
        let store = ReadingStore::from_export(&export(), "a");
        let ts = TimestampParser::parse("2024-03-01").unwrap();
        let counter = store.get("v1").unwrap().counter.clone();
        let store = store.with_streams(vec![CounterStream::new(counter, vec![Reading::new(ts, 1.0)])]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("v1").unwrap().readings.len(), 1);
        assert_eq!(store.stats().readings, 3);
    }

    #[test]
    fn test_date_range() {
        let store = ReadingStore::from_export(&export(), "a");
        let (lo, hi) = store.date_range().unwrap();
        assert_eq!(lo.to_string(), "2024-01-01 00:00:00");
        assert_eq!(hi.to_string(), "2024-02-01 00:00:00");
        assert!(ReadingStore::default().date_range().is_none());
    }
}
