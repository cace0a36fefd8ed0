//! End-to-end tests from export files on disk to report relations

mod common;

use common::{cyclic_export, house_export, write_export_folder};
use meter_report::analyzer::{write_reports, Analysis, MeterAnalyzer, ProcessOptions};
use meter_report::error::FailureKind;
use meter_report::file_discovery::FileDiscovery;
use meter_report::report::{build_report, ReportOptions};
use std::fs;
use tempfile::TempDir;

fn analyze(temp: &TempDir, options: ProcessOptions) -> Vec<Analysis> {
    let analyzer = MeterAnalyzer::with_discovery(FileDiscovery::with_base(temp.path(), &[]));
    analyzer.analyze(&options).unwrap()
}

fn house(temp: &TempDir) -> Analysis {
    let folder = write_export_folder(temp.path(), "H1", &house_export()).unwrap();
    let mut analyses = analyze(
        temp,
        ProcessOptions {
            inputs: vec![folder],
            ..Default::default()
        },
    );
    assert_eq!(analyses.len(), 1);
    analyses.remove(0)
}

fn counter<'a>(analysis: &'a Analysis, uuid: &str) -> &'a meter_report::CounterAnalysis {
    analysis
        .counters
        .iter()
        .find(|c| c.counter.uuid == uuid)
        .unwrap()
}

#[test]
fn test_export_loads_and_isolates_broken_counter() {
    let temp = TempDir::new().unwrap();
    let analysis = house(&temp);

    assert_eq!(analysis.sources, vec!["H1"]);
    assert_eq!(analysis.counters.len(), 4);
    assert_eq!(analysis.failures.len(), 1);
    assert_eq!(analysis.failures[0].counter_uuid, "b1");
    assert_eq!(analysis.failures[0].kind, FailureKind::Data);
    assert!(analysis.failures[0].message.contains("n/a"));
    assert_eq!(analysis.stats.skipped_readings, 1);
}

#[test]
fn test_deltas_and_reset() {
    let temp = TempDir::new().unwrap();
    let analysis = house(&temp);

    let water = counter(&analysis, "w1");
    assert_eq!(water.counter.room.as_deref(), Some("H1.EG.Bad"));
    assert_eq!(water.counter.object.as_deref(), Some("H1"));
    assert_eq!(water.counter.counter_id.as_deref(), Some("11"));
    assert_eq!(water.rows[0].delta.delta, 100_000.0);
    assert_eq!(water.rows[1].delta.delta, 1_400.0);
    assert_eq!(water.rows[1].delta.days, Some(14.0));
    assert_eq!(water.rows[1].delta.delta_per_day, Some(100.0));

    let sub = counter(&analysis, "hs");
    assert!(sub.rows[2].delta.reset_detected);
    assert_eq!(sub.rows[2].delta.delta, 50.0);
    assert_eq!(sub.rows[2].delta.prev_value, None);
}

#[test]
fn test_virtual_counter_values() {
    let temp = TempDir::new().unwrap();
    let analysis = house(&temp);

    let net = counter(&analysis, "v1");
    let values: Vec<f64> = net.rows.iter().map(|r| r.value).collect();
    assert_eq!(values, vec![800.0, 1040.0, 1450.0]);
    // Stamped with the later constituent reading of the day
    assert_eq!(net.rows[0].reading.timestamp.to_string(), "2024-01-01 09:00:00");
    assert_eq!(net.counter.unit.as_deref(), Some("kWh"));
}

#[test]
fn test_monthly_totals_match_yearly() {
    let temp = TempDir::new().unwrap();
    let analysis = house(&temp);

    for entry in &analysis.counters {
        let monthly: f64 = entry.monthly.iter().map(|m| m.delta).sum();
        let yearly: f64 = entry.yearly.iter().map(|y| y.delta).sum();
        assert!((monthly - yearly).abs() < 1e-9, "counter {}", entry.counter.uuid);
    }
}

#[test]
fn test_report_order_and_scaling() {
    let temp = TempDir::new().unwrap();
    let analysis = house(&temp);
    let report = build_report(&analysis, &ReportOptions::default(), "run-1");

    let order: Vec<(&str, usize)> = report
        .counters
        .iter()
        .map(|c| (c.counter_uuid.as_str(), c.depth))
        .collect();
    assert_eq!(order, vec![("w1", 0), ("v1", 0), ("hs", 1), ("hm", 1)]);

    let water_rows: Vec<_> = report.raw.iter().filter(|r| r.counter_uuid == "w1").collect();
    assert_eq!(water_rows[1].value, 101.4);
    assert_eq!(water_rows[1].delta, 1.4);
    assert!(water_rows[1].remark.is_some());

    let heat_rows: Vec<_> = report.raw.iter().filter(|r| r.counter_uuid == "hm").collect();
    assert_eq!(heat_rows[1].value, 1300.0);
    assert!(heat_rows[1].remark.is_none());

    assert_eq!(report.summary.len(), 2);
    assert_eq!(report.summary[0].month, "2024.01");
    assert_eq!(report.summary[0].dwelling.as_deref(), Some("H1.EG"));
    assert_eq!(report.failures.len(), 1);
}

#[test]
fn test_cycle_is_reported_without_affecting_others() {
    let temp = TempDir::new().unwrap();
    let folder = write_export_folder(temp.path(), "H2", &cyclic_export()).unwrap();
    let analyses = analyze(
        &temp,
        ProcessOptions {
            inputs: vec![folder],
            ..Default::default()
        },
    );

    let analysis = &analyses[0];
    assert_eq!(analysis.counters.len(), 1);
    assert_eq!(analysis.counters[0].counter.uuid, "p1");
    let mut failed: Vec<&str> = analysis
        .failures
        .iter()
        .map(|f| f.counter_uuid.as_str())
        .collect();
    failed.sort();
    assert_eq!(failed, vec!["x", "y"]);
    assert!(analysis.failures.iter().all(|f| f.kind == FailureKind::Config));
}

#[test]
fn test_per_folder_and_combined_runs() {
    let temp = TempDir::new().unwrap();
    write_export_folder(temp.path(), "H1", &house_export()).unwrap();
    write_export_folder(temp.path(), "H2", &cyclic_export()).unwrap();

    let separate = analyze(&temp, ProcessOptions::default());
    assert_eq!(separate.len(), 2);
    assert_eq!(separate[0].sources, vec!["H1"]);
    assert_eq!(separate[1].sources, vec!["H2"]);

    let combined = analyze(
        &temp,
        ProcessOptions {
            combined: true,
            ..Default::default()
        },
    );
    assert_eq!(combined.len(), 1);
    assert_eq!(combined[0].sources, vec!["H1", "H2"]);
    assert_eq!(combined[0].counters.len(), 5);
    assert_eq!(combined[0].failures.len(), 3);
}

#[test]
fn test_reports_written_per_folder() {
    let temp = TempDir::new().unwrap();
    write_export_folder(temp.path(), "H1", &house_export()).unwrap();
    write_export_folder(temp.path(), "H2", &cyclic_export()).unwrap();

    let analyzer = MeterAnalyzer::with_discovery(FileDiscovery::with_base(temp.path(), &[]));
    let reports = analyzer
        .build_reports(&ProcessOptions::default(), "run-2")
        .unwrap();
    let out = temp.path().join("out").join("report.json");
    let written = write_reports(&reports, &out).unwrap();

    assert_eq!(written.len(), 2);
    assert!(written[0].ends_with("report_H1.json"));
    let content = fs::read_to_string(&written[0]).unwrap();
    let json: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(json["runId"], "run-2");
    assert!(json["raw"].as_array().unwrap().len() > 0);
    assert_eq!(json["failures"][0]["kind"], "data");
}
