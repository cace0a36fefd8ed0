#![allow(dead_code)]

use anyhow::Result;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Write `export` as `<base>/<name>/<name>.json` and return the folder.
pub fn write_export_folder(base: &Path, name: &str, export: &Value) -> Result<PathBuf> {
    let dir = base.join(name);
    fs::create_dir_all(&dir)?;
    fs::write(dir.join(format!("{}.json", name)), serde_json::to_string_pretty(export)?)?;
    Ok(dir)
}

pub fn entry(date: &str, value: Value) -> Value {
    json!({ "date": date, "value": value, "localImageFileName": format!("{}.jpg", &date[..10]) })
}

/// One house with a water meter (litres, exported as m³), a main and a sub
/// heat meter, a virtual net heat counter and an electricity meter with an
/// unreadable value.
pub fn house_export() -> Value {
    json!({
        "objectId": "H1",
        "rooms": [
            { "roomId": "r1", "name": "H1.EG.Bad" },
            { "roomId": "r2", "title": "H1.Keller" }
        ],
        "counters": [
            {
                "uuid": "w1",
                "counterId": 11,
                "counterName": "H1.EG.Wasser",
                "counterType": "PHYSICAL",
                "counterUnit": "m³",
                "roomId": "r1",
                "entries": { "entries": [
                    entry("2024-01-01T08:00:00Z", json!("100000,0")),
                    entry("2024-01-15T08:00:00Z", json!("101400")),
                    entry("2024-02-01T08:00:00Z", json!(102000))
                ]}
            },
            {
                "uuid": "hm",
                "counterName": "H1.Waerme-Haupt",
                "counterUnit": "kWh",
                "roomId": "r2",
                "entries": { "entries": [
                    entry("2024-01-01T08:00:00Z", json!(1000)),
                    entry("2024-01-15T08:00:00Z", json!(1300)),
                    entry("2024-02-01T08:00:00Z", json!(1500))
                ]}
            },
            {
                "uuid": "hs",
                "counterName": "H1.EG.Waerme",
                "counterUnit": "kWh",
                "roomId": "r1",
                "entries": { "entries": [
                    entry("2024-01-01T09:00:00Z", json!(200)),
                    entry("2024-01-15T09:00:00Z", json!(260)),
                    entry("2024-02-01T09:00:00Z", json!(50))
                ]}
            },
            {
                "uuid": "v1",
                "counterName": "H1.Waerme-Netto",
                "counterType": "VIRTUAL",
                "virtualCounterData": {
                    "masterCounterUuid": "hm",
                    "counterUuidsToBeAdded": [],
                    "counterUuidsToBeSubtracted": ["hs"]
                },
                "entries": { "entries": [] }
            },
            {
                "uuid": "b1",
                "counterName": "H1.EG.Strom",
                "counterUnit": "kWh",
                "entries": { "entries": [
                    entry("2024-01-01T08:00:00Z", json!("12,5")),
                    entry("2024-01-10T08:00:00Z", json!("n/a")),
                    { "date": "yesterday", "value": 13 }
                ]}
            }
        ]
    })
}

/// Two virtual counters referring to each other, plus one valid counter.
pub fn cyclic_export() -> Value {
    json!({
        "counters": [
            {
                "uuid": "p1",
                "counterName": "H2.Strom",
                "entries": { "entries": [ entry("2024-03-01T00:00:00", json!(5)) ] }
            },
            {
                "uuid": "x",
                "counterName": "H2.X",
                "counterType": "virtual",
                "virtualCounterData": { "masterCounterUuid": "y" }
            },
            {
                "uuid": "y",
                "counterName": "H2.Y",
                "counterType": "VIRTUAL",
                "virtualCounterData": { "masterCounterUuid": "x", "counterUuidsToBeAdded": ["p1"] }
            }
        ]
    })
}
