//! Meter Analysis Engine
//!
//! This module orchestrates the whole meter report pipeline and is the
//! entry point for every CLI command.
//!
//! ## Processing Pipeline
//!
//! 1. **Discovery**: resolves export files from input paths or configuration
//! 2. **Loading**: parses each export into a [`ReadingStore`]
//! 3. **Virtual counters**: derives virtual counter streams from their constituents
//! 4. **Deltas**: computes a [`DeltaRecord`] per reading, per counter
//! 5. **Aggregation**: monthly and yearly sums plus year-boundary estimates
//! 6. **Reporting**: builds the output relations and displays or writes them
//!
//! Each export folder is analysed on its own unless `combined` is set, in
//! which case all folders are merged into one store first.
//!
//! ## Failure isolation
//!
//! A counter whose readings cannot be processed (non-numeric value, invalid
//! virtual definition) is dropped from the data relations and reported in
//! the failures relation. The remaining counters are unaffected.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use meter_report::{MeterAnalyzer, ProcessOptions};
//!
//! # fn example() -> anyhow::Result<()> {
//! let mut analyzer = MeterAnalyzer::new();
//!
//! let options = ProcessOptions {
//!     inputs: vec!["exports/H1".into()],
//!     json_output: true,
//!     ..Default::default()
//! };
//!
//! analyzer.run_command("monthly", options)?;
//! # Ok(())
//! # }
//! ```

use crate::aggregate;
use crate::boundary::{estimate_years, BoundaryEstimate};
use crate::config::get_config;
use crate::delta::compute_rows;
use crate::display::DisplayManager;
use crate::error::{CounterFailure, DataError};
use crate::file_discovery::{ExportSource, FileDiscovery};
use crate::logging::{new_run_id, run_span};
use crate::models::*;
use crate::parser::ExportParser;
use crate::report::{build_report, Report, ReportOptions};
use crate::store::{CounterStream, LoadStats, ReadingStore};
use crate::virtual_counter::resolve_virtual_counters;
use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

pub const COMMANDS: [&str; 7] = ["raw", "monthly", "yearly", "summary", "boundaries", "counters", "report"];

/// Everything derived for one counter.
#[derive(Debug, Clone, PartialEq)]
pub struct CounterAnalysis {
    pub counter: Counter,
    pub rows: Vec<ReadingRow>,
    pub monthly: Vec<AggregateRecord>,
    pub yearly: Vec<AggregateRecord>,
    pub boundaries: Vec<BoundaryEstimate>,
}

impl CounterAnalysis {
    /// Deltas, aggregates and boundary estimates for one counter.
    /// `years` is the year range boundaries are estimated for.
    pub fn compute(counter: Counter, readings: &[Reading], years: Option<(i32, i32)>) -> Result<Self, DataError> {
        let rows = compute_rows(&counter.uuid, readings)?;
        let monthly = aggregate::monthly(&counter.uuid, &rows);
        let yearly = aggregate::yearly(&counter.uuid, &rows);
        let boundaries = match years {
            Some((first, last)) => estimate_years(&counter.uuid, &rows, first, last),
            None => Vec::new(),
        };
        Ok(Self {
            counter,
            rows,
            monthly,
            yearly,
            boundaries,
        })
    }
}

/// Result of analysing one store (one export folder, or all of them combined).
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    pub sources: Vec<String>,
    pub counters: Vec<CounterAnalysis>,
    pub failures: Vec<CounterFailure>,
    pub stats: LoadStats,
}

fn analyze_stream(stream: &CounterStream, years: Option<(i32, i32)>) -> Result<CounterAnalysis, CounterFailure> {
    CounterAnalysis::compute(stream.counter.clone(), &stream.readings, years).map_err(|e| {
        warn!(counter = %stream.counter.uuid, name = %stream.counter.name, error = %e, "Counter skipped");
        CounterFailure::data(&stream.counter.uuid, &stream.counter.name, &e)
    })
}

/// Resolve virtual counters, then analyse every counter of the store.
pub fn analyze_store(store: ReadingStore, sources: Vec<String>) -> Analysis {
    let resolution = resolve_virtual_counters(store);
    let store = resolution.store;
    let years = store
        .date_range()
        .map(|(first, last)| (first.year(), last.year()));

    #[cfg(feature = "parallel")]
    let results: Vec<_> = store
        .streams()
        .par_iter()
        .map(|stream| analyze_stream(stream, years))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let results: Vec<_> = store
        .streams()
        .iter()
        .map(|stream| analyze_stream(stream, years))
        .collect();

    let mut failures = resolution.failures;
    let mut counters = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(analysis) => counters.push(analysis),
            Err(failure) => failures.push(failure),
        }
    }

    info!(
        sources = ?sources,
        counters = counters.len(),
        failures = failures.len(),
        "Analysis complete"
    );

    Analysis {
        sources,
        counters,
        failures,
        stats: store.stats().clone(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// Export files or folders; empty means configured folders
    pub inputs: Vec<PathBuf>,
    pub json_output: bool,
    /// Rows shown per counter
    pub limit: Option<usize>,
    pub since_date: Option<NaiveDate>,
    pub until_date: Option<NaiveDate>,
    pub counter: Option<String>,
    /// One report across all folders instead of one per folder
    pub combined: bool,
    /// `report` only: write the JSON report here
    pub output: Option<PathBuf>,
}

pub struct MeterAnalyzer {
    display_manager: DisplayManager,
    discovery: FileDiscovery,
}

impl Default for MeterAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl MeterAnalyzer {
    pub fn new() -> Self {
        Self::with_discovery(FileDiscovery::new())
    }

    pub fn with_discovery(discovery: FileDiscovery) -> Self {
        Self {
            display_manager: DisplayManager::new(),
            discovery,
        }
    }

    pub fn load_store(&self, source: &ExportSource) -> Result<ReadingStore> {
        let export = ExportParser::new()
            .parse_export_file(&source.path)
            .with_context(|| format!("Failed to load export {}", source.path.display()))?;
        let store = ReadingStore::from_export(&export, &source.name);
        info!(
            source = %source.name,
            counters = store.stats().counters,
            readings = store.stats().readings,
            skipped_readings = store.stats().skipped_readings,
            "Export loaded"
        );
        Ok(store)
    }

    /// One analysis per export folder, or a single one when `combined`.
    pub fn analyze(&self, options: &ProcessOptions) -> Result<Vec<Analysis>> {
        let sources = self.discovery.discover(&options.inputs)?;

        if options.combined {
            let stores = sources
                .iter()
                .map(|s| self.load_store(s))
                .collect::<Result<Vec<_>>>()?;
            let names = sources.into_iter().map(|s| s.name).collect();
            return Ok(vec![analyze_store(ReadingStore::merge(stores), names)]);
        }

        sources
            .into_iter()
            .map(|source| {
                let store = self.load_store(&source)?;
                Ok(analyze_store(store, vec![source.name]))
            })
            .collect()
    }

    pub fn build_reports(&self, options: &ProcessOptions, run_id: &str) -> Result<Vec<Report>> {
        let config = get_config();
        let report_options = ReportOptions {
            scale_cubic: config.units.scale_cubic,
            cubic_divisor: config.units.cubic_divisor,
            since: options.since_date,
            until: options.until_date,
            counter_filter: options.counter.clone(),
        };

        Ok(self
            .analyze(options)?
            .iter()
            .map(|analysis| build_report(analysis, &report_options, run_id))
            .collect())
    }

    pub fn run_command(&mut self, command: &str, options: ProcessOptions) -> Result<()> {
        if !COMMANDS.contains(&command) {
            anyhow::bail!("Unknown command: {}", command);
        }

        let run_id = new_run_id();
        let span = run_span(&run_id, command);
        let _entered = span.enter();

        let reports = self.build_reports(&options, &run_id)?;
        let limit = options.limit;
        let json = options.json_output;

        match command {
            "raw" => self.display_manager.display_raw(&reports, limit, json),
            "monthly" => self.display_manager.display_monthly(&reports, limit, json),
            "yearly" => self.display_manager.display_yearly(&reports, limit, json),
            "summary" => self.display_manager.display_summary(&reports, limit, json),
            "boundaries" => self.display_manager.display_boundaries(&reports, limit, json),
            "counters" => self.display_manager.display_counters(&reports, json),
            "report" => match &options.output {
                Some(path) => {
                    let written = write_reports(&reports, path)?;
                    self.display_manager.display_written(&written, json);
                }
                None => self.display_manager.display_report(&reports)?,
            },
            _ => anyhow::bail!("Unknown command: {}", command),
        }

        Ok(())
    }
}

/// Output file for one report. Relative paths are placed in the configured
/// target directory; with several reports each file gets the source name
/// appended to its stem.
fn report_path(output: &Path, report: &Report, several: bool) -> PathBuf {
    let base = if output.is_absolute() {
        output.to_path_buf()
    } else {
        get_config().paths.target_base_dir.join(output)
    };
    if !several {
        return base;
    }

    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".to_string());
    let extension = base
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "json".to_string());
    base.with_file_name(format!("{}_{}.{}", stem, report.sources.join("+"), extension))
}

/// Write each report as JSON and return the written paths.
pub fn write_reports(reports: &[Report], output: &Path) -> Result<Vec<PathBuf>> {
    let pretty = get_config().output.json_pretty;
    let several = reports.len() > 1;
    let mut written = Vec::with_capacity(reports.len());

    for report in reports {
        let path = report_path(output, report, several);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let content = if pretty {
            serde_json::to_string_pretty(report)?
        } else {
            serde_json::to_string(report)?
        };
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        info!(path = %path.display(), rows = report.raw.len(), "Report written");
        written.push(path);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn ts(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_failing_counter_is_isolated() {
        let mut broken = Reading::new(ts(2024, 1, 15), 0.0);
        broken.value = None;
        let store = ReadingStore::from_streams(vec![
            CounterStream::new(
                Counter::physical("ok", "Good"),
                vec![Reading::new(ts(2024, 1, 1), 1.0), Reading::new(ts(2024, 1, 2), 2.0)],
            ),
            CounterStream::new(
                Counter::physical("bad", "Broken"),
                vec![Reading::new(ts(2024, 1, 1), 1.0), broken],
            ),
        ]);

        let analysis = analyze_store(store, vec!["H1".to_string()]);
        assert_eq!(analysis.counters.len(), 1);
        assert_eq!(analysis.counters[0].counter.uuid, "ok");
        assert_eq!(analysis.failures.len(), 1);
        assert_eq!(analysis.failures[0].counter_uuid, "bad");
    }

    #[test]
    fn test_virtual_counter_is_analysed() {
        let spec = VirtualSpec {
            master: Some("m".to_string()),
            add: vec!["a".to_string()],
            subtract: vec!["s".to_string()],
        };
        let store = ReadingStore::from_streams(vec![
            CounterStream::new(Counter::physical("m", "Main"), vec![Reading::new(ts(2024, 1, 1), 100.0)]),
            CounterStream::new(Counter::physical("a", "Add"), vec![Reading::new(ts(2024, 1, 1), 20.0)]),
            CounterStream::new(Counter::physical("s", "Sub"), vec![Reading::new(ts(2024, 1, 1), 5.0)]),
            CounterStream::new(Counter::virtual_counter("v", "Net", spec), Vec::new()),
        ]);

        let analysis = analyze_store(store, Vec::new());
        let net = analysis
            .counters
            .iter()
            .find(|c| c.counter.uuid == "v")
            .unwrap();
        assert_eq!(net.rows.len(), 1);
        assert_eq!(net.rows[0].value, 115.0);
        assert!(analysis.failures.is_empty());
    }

    #[test]
    fn test_boundaries_cover_store_years() {
        let store = ReadingStore::from_streams(vec![CounterStream::new(
            Counter::physical("c", "C"),
            vec![Reading::new(ts(2023, 6, 1), 10.0), Reading::new(ts(2024, 6, 1), 20.0)],
        )]);
        let analysis = analyze_store(store, Vec::new());
        assert_eq!(analysis.counters[0].boundaries.len(), 4);
    }

    #[test]
    fn test_unknown_command() {
        let mut analyzer = MeterAnalyzer::with_discovery(FileDiscovery::with_base(Path::new("."), &[]));
        let err = analyzer
            .run_command("weekly", ProcessOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("Unknown command"));
    }
}
