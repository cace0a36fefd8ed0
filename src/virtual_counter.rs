//! Virtual Counter Resolver
//!
//! A virtual counter has no meter of its own. Its readings are derived from
//! other counters as `master + Σ additions − Σ subtractions`, on every
//! calendar day where each constituent has a usable reading. The derived
//! reading is stamped with the latest constituent timestamp of that day.
//! Days where any constituent is missing are skipped; nothing is
//! interpolated.
//!
//! Virtual counters may be built from other virtual counters, so they are
//! resolved in dependency order. Invalid definitions (missing or unknown
//! references, self references, cycles) fail only the counter concerned.

use crate::error::{ConfigError, CounterFailure};
use crate::models::*;
use crate::parser::object_prefix;
use crate::store::{CounterStream, ReadingStore};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tracing::{debug, info, warn};

pub struct Resolution {
    pub store: ReadingStore,
    pub failures: Vec<CounterFailure>,
}

/// Replace every virtual counter's stream with its derived readings.
/// Virtual counters that cannot be resolved are removed from the store and
/// reported as failures.
pub fn resolve_virtual_counters(store: ReadingStore) -> Resolution {
    let virtuals: Vec<&Counter> = store
        .streams()
        .iter()
        .map(|s| &s.counter)
        .filter(|c| c.kind.is_virtual())
        .collect();

    if virtuals.is_empty() {
        return Resolution {
            store,
            failures: Vec::new(),
        };
    }

    let mut failed: HashMap<String, ConfigError> = HashMap::new();
    for counter in &virtuals {
        if let Err(e) = validate(counter, &store) {
            failed.insert(counter.uuid.clone(), e);
        }
    }

    let (order, cyclic) = dependency_order(&virtuals, &store);
    for uuid in cyclic {
        failed
            .entry(uuid.clone())
            .or_insert(ConfigError::Cycle { counter: uuid });
    }

    let mut derived: HashMap<String, Vec<Reading>> = HashMap::new();
    let mut resolved_streams = Vec::new();

    for counter in order {
        if failed.contains_key(&counter.uuid) {
            continue;
        }
        let Some(spec) = counter.virtual_spec() else {
            continue;
        };

        if let Some(dep) = spec
            .constituents()
            .into_iter()
            .find(|dep| failed.contains_key(*dep))
        {
            failed.insert(
                counter.uuid.clone(),
                ConfigError::ConstituentFailed {
                    counter: counter.uuid.clone(),
                    constituent: dep.to_string(),
                },
            );
            continue;
        }

        let readings = synthesize(spec, |uuid| readings_for(uuid, &derived, &store));

        if let Some(own) = store.get(&counter.uuid) {
            if !own.readings.is_empty() {
                debug!(
                    counter = %counter.uuid,
                    exported = own.readings.len(),
                    "Ignoring exported readings of virtual counter"
                );
            }
        }
        info!(
            counter = %counter.uuid,
            name = %counter.name,
            readings = readings.len(),
            "Resolved virtual counter"
        );

        derived.insert(counter.uuid.clone(), readings.clone());
        resolved_streams.push(CounterStream::new(with_fallbacks(counter, &store), readings));
    }

    let mut failures = Vec::new();
    for counter in &virtuals {
        if let Some(err) = failed.get(&counter.uuid) {
            warn!(counter = %counter.uuid, error = %err, "Virtual counter skipped");
            failures.push(CounterFailure::config(&counter.uuid, &counter.name, err));
        }
    }

    let failed_uuids: HashSet<String> = failed.into_keys().collect();
    let store = store.with_streams(resolved_streams).without(&failed_uuids);

    Resolution { store, failures }
}

fn readings_for<'s>(
    uuid: &str,
    derived: &'s HashMap<String, Vec<Reading>>,
    store: &'s ReadingStore,
) -> &'s [Reading] {
    derived
        .get(uuid)
        .map(Vec::as_slice)
        .or_else(|| store.get(uuid).map(|s| s.readings.as_slice()))
        .unwrap_or(&[])
}

fn validate(counter: &Counter, store: &ReadingStore) -> Result<(), ConfigError> {
    let Some(spec) = counter.virtual_spec() else {
        return Ok(());
    };
    let Some(master) = spec.master.as_deref() else {
        return Err(ConfigError::MissingMaster {
            counter: counter.uuid.clone(),
        });
    };
    if spec.constituents().contains(&counter.uuid.as_str()) {
        return Err(ConfigError::SelfReference {
            counter: counter.uuid.clone(),
        });
    }
    if !store.contains(master) {
        return Err(ConfigError::UnknownMaster {
            counter: counter.uuid.clone(),
            master: master.to_string(),
        });
    }
    if let Some(missing) = spec.add.iter().chain(spec.subtract.iter()).find(|u| !store.contains(u)) {
        return Err(ConfigError::UnknownConstituent {
            counter: counter.uuid.clone(),
            constituent: missing.clone(),
        });
    }
    Ok(())
}

/// Topological order of the virtual counters (dependencies first), plus the
/// uuids that could not be ordered because they sit on or behind a cycle.
fn dependency_order<'a>(virtuals: &[&'a Counter], store: &ReadingStore) -> (Vec<&'a Counter>, Vec<String>) {
    let is_virtual = |uuid: &str| {
        store
            .get(uuid)
            .is_some_and(|s| s.counter.kind.is_virtual())
    };

    let mut pending: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for &counter in virtuals {
        let deps: Vec<&str> = counter
            .virtual_spec()
            .map(|spec| spec.constituents())
            .unwrap_or_default()
            .into_iter()
            .filter(|dep| *dep != counter.uuid && is_virtual(*dep))
            .collect();
        pending.insert(counter.uuid.as_str(), deps.len());
        for dep in deps {
            dependents.entry(dep).or_default().push(counter.uuid.as_str());
        }
    }

    let by_uuid: HashMap<&str, &'a Counter> = virtuals.iter().map(|c| (c.uuid.as_str(), *c)).collect();
    let mut queue: VecDeque<&str> = virtuals
        .iter()
        .map(|c| c.uuid.as_str())
        .filter(|uuid| pending.get(uuid) == Some(&0))
        .collect();

    let mut order = Vec::with_capacity(virtuals.len());
    while let Some(uuid) = queue.pop_front() {
        order.push(by_uuid[uuid]);
        for dependent in dependents.get(uuid).into_iter().flatten() {
            if let Some(count) = pending.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    queue.push_back(*dependent);
                }
            }
        }
    }

    let ordered: HashSet<&str> = order.iter().map(|c| c.uuid.as_str()).collect();
    let cyclic = virtuals
        .iter()
        .filter(|c| !ordered.contains(c.uuid.as_str()))
        .map(|c| c.uuid.clone())
        .collect();

    (order, cyclic)
}

/// Last usable reading of each calendar day.
fn daily_values(readings: &[Reading]) -> BTreeMap<NaiveDate, (NaiveDateTime, f64)> {
    let mut days = BTreeMap::new();
    for reading in readings {
        if let Some(value) = reading.value {
            days.insert(reading.timestamp.date(), (reading.timestamp, value));
        }
    }
    days
}

/// Derived readings for one virtual counter.
pub fn synthesize<'r>(spec: &VirtualSpec, readings_of: impl Fn(&str) -> &'r [Reading]) -> Vec<Reading> {
    let Some(master) = spec.master.as_deref() else {
        return Vec::new();
    };
    let master_days = daily_values(readings_of(master));
    let add_days: Vec<_> = spec.add.iter().map(|u| daily_values(readings_of(u))).collect();
    let sub_days: Vec<_> = spec.subtract.iter().map(|u| daily_values(readings_of(u))).collect();

    let mut readings = Vec::new();
    'days: for (day, &(master_ts, master_value)) in &master_days {
        let mut value = master_value;
        let mut latest = master_ts;

        for (sign, maps) in [(1.0, &add_days), (-1.0, &sub_days)] {
            for map in maps.iter() {
                let Some(&(ts, v)) = map.get(day) else {
                    continue 'days;
                };
                value += sign * v;
                latest = latest.max(ts);
            }
        }

        readings.push(Reading {
            timestamp: latest,
            value: Some(value),
            value_orig: None,
            photo: None,
        });
    }
    readings
}

/// Unit and room fallbacks for a derived counter.
fn with_fallbacks(counter: &Counter, store: &ReadingStore) -> Counter {
    let mut counter = counter.clone();
    let master = counter
        .virtual_spec()
        .and_then(|spec| spec.master.as_deref())
        .and_then(|uuid| store.get(uuid))
        .map(|s| s.counter.clone());

    if counter.unit.is_none() {
        counter.unit = Some(match &master {
            Some(m) if m.unit.is_some() => m.unit.clone().unwrap_or_default(),
            Some(m) => unit_from_name(&m.name).to_string(),
            None => "unknown".to_string(),
        });
    }
    if counter.room.is_none() {
        counter.room = Some(if counter.name.is_empty() {
            "Virtual".to_string()
        } else {
            counter.name.clone()
        });
    }
    if counter.object.is_none() {
        counter.object = counter.room.as_deref().map(|r| object_prefix(r).to_string());
    }
    counter
}

pub fn unit_from_name(name: &str) -> &'static str {
    let lower = name.to_lowercase();
    if lower.contains("wasser") {
        "m3"
    } else if lower.contains("strom") || lower.contains("wärme") || lower.contains("waerme") {
        "kwh"
    } else {
        "unknown"
    }
}
