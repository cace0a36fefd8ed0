//! Meter Report Library
//!
//! Builds consumption reports from the JSON exports of a home utility
//! metering app: rooms, counters and their irregularly sampled readings.
//!
//! ## Core Features
//!
//! - **Delta calculation**: consumption between consecutive readings, with
//!   meter reset detection and per-day rates over fractional day spans
//! - **Virtual counters**: composite counters derived as
//!   `master + additions - subtractions`, resolved in dependency order
//! - **Aggregation**: monthly and yearly sums with re-derived daily rates
//! - **Year boundaries**: estimated readings on 1 January and 31 December
//! - **Reports**: JSON and coloured terminal output, with cubic-unit scaling
//!   and hierarchical counter ordering
//!
//! ## Architecture Overview
//!
//! - [`parser`] / [`file_discovery`] / [`timestamp_parser`] - export loading
//! - [`store`] - per-counter reading streams in timestamp order
//! - [`virtual_counter`] - virtual counter resolution
//! - [`delta`] - delta and reset detection
//! - [`aggregate`] - monthly and yearly aggregation
//! - [`boundary`] - year-boundary estimates
//! - [`summary`] - per-month utility summary
//! - [`report`] - output relations
//! - [`analyzer`] - pipeline orchestration
//! - [`display`] - terminal and JSON rendering
//! - [`config`] / [`logging`] / [`error`] - ambient plumbing
//!
//! ## Main Entry Point
//!
//! ```rust
//! use chrono::NaiveDate;
//! use meter_report::{analyze_store, Counter, CounterStream, Reading, ReadingStore};
//!
//! let day = |d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap().and_hms_opt(0, 0, 0).unwrap();
//! let store = ReadingStore::from_streams(vec![CounterStream::new(
//!     Counter::physical("c1", "H1.EG.Wasser"),
//!     vec![Reading::new(day(1), 100.0), Reading::new(day(15), 130.0)],
//! )]);
//!
//! let analysis = analyze_store(store, vec!["H1".to_string()]);
//! assert_eq!(analysis.counters[0].rows[1].delta.delta, 30.0);
//! ```

pub mod aggregate;
pub mod analyzer;
pub mod boundary;
pub mod config;
pub mod delta;
pub mod display;
pub mod error;
pub mod file_discovery;
pub mod logging;
pub mod models;
pub mod parser;
pub mod report;
pub mod store;
pub mod summary;
pub mod timestamp_parser;
pub mod virtual_counter;

pub use analyzer::{analyze_store, Analysis, CounterAnalysis, MeterAnalyzer, ProcessOptions};
pub use error::{ConfigError, CounterFailure, DataError, MeterError};
pub use models::*;
pub use report::{build_report, Report, ReportOptions};
pub use store::{CounterStream, ReadingStore};
