//! Output Formatting and Display Management
//!
//! Renders [`Report`]s either as coloured terminal output or as JSON for
//! programmatic consumption.
//!
//! ## Report Views
//!
//! - **raw**: every reading with value, delta, day span and daily rate
//! - **monthly** / **yearly**: aggregated consumption per period
//! - **summary**: highest water/heat/electricity reading per month
//! - **boundaries**: estimated readings on 1 January and 31 December
//! - **counters**: counter overview in hierarchical order
//!
//! Each view ends with the counters that were dropped, if any.
//!
//! ## Limits
//!
//! `limit` keeps the most recent N rows of each counter (N months for the
//! summary view).
//!
//! ## JSON Output
//!
//! When `json_output` is enabled, each view prints one object keyed by the
//! view name, holding one group per report:
//! ```json
//! {
//!   "monthly": [
//!     {
//!       "sources": ["H1"],
//!       "rows": [
//!         {"counterName": "H1.EG.Wasser", "period": "2024-01", "delta": 3.2}
//!       ],
//!       "failures": []
//!     }
//!   ]
//! }
//! ```

use crate::config::get_config;
use crate::error::CounterFailure;
use crate::report::{AggregateRow, Report};
use anyhow::Result;
use chrono::NaiveDateTime;
use colored::Colorize;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;

pub struct DisplayManager {
    date_format: String,
}

impl Default for DisplayManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Last `limit` rows of every counter, in their original order.
pub fn limit_per_counter<'a, T>(rows: &'a [T], limit: Option<usize>, key: impl Fn(&T) -> &str) -> Vec<&'a T> {
    let Some(limit) = limit else {
        return rows.iter().collect();
    };

    let mut totals: HashMap<&str, usize> = HashMap::new();
    for row in rows {
        *totals.entry(key(row)).or_default() += 1;
    }

    let mut seen: HashMap<&str, usize> = HashMap::new();
    rows.iter()
        .filter(|row| {
            let k = key(*row);
            let index = seen.entry(k).or_default();
            let keep = index.saturating_add(limit) >= totals[k];
            *index += 1;
            keep
        })
        .collect()
}

#[derive(Serialize)]
struct JsonGroup<'a, T: Serialize> {
    sources: &'a [String],
    rows: Vec<&'a T>,
    failures: &'a [CounterFailure],
}

/// Most recent `limit` rows of an already ordered slice.
pub fn tail<T>(rows: &[T], limit: Option<usize>) -> &[T] {
    let skip = limit.map_or(0, |n| rows.len().saturating_sub(n));
    &rows[skip..]
}

fn print_json(key: &str, groups: serde_json::Value) {
    let mut object = serde_json::Map::new();
    object.insert(key.to_string(), groups);
    let output = serde_json::Value::Object(object);
    let rendered = if get_config().output.json_pretty {
        serde_json::to_string_pretty(&output)
    } else {
        serde_json::to_string(&output)
    };
    match rendered {
        Ok(json_str) => println!("{}", json_str),
        Err(e) => eprintln!("Error serializing {} data to JSON: {}", key, e),
    }
}

fn json_groups<'a, T: Serialize + 'a>(
    reports: &'a [Report],
    rows_of: impl Fn(&'a Report) -> Vec<&'a T>,
) -> serde_json::Value {
    let groups: Vec<JsonGroup<'a, T>> = reports
        .iter()
        .map(|report| JsonGroup {
            sources: &report.sources,
            rows: rows_of(report),
            failures: &report.failures,
        })
        .collect();
    serde_json::to_value(groups).unwrap_or_default()
}

fn fmt_opt(value: Option<f64>, precision: usize) -> String {
    value
        .map(|v| format!("{:.*}", precision, v))
        .unwrap_or_else(|| "-".to_string())
}

impl DisplayManager {
    pub fn new() -> Self {
        Self {
            date_format: get_config().output.date_format.clone(),
        }
    }

    fn date(&self, ts: &NaiveDateTime) -> String {
        ts.format(&self.date_format).to_string()
    }

    fn banner(&self, title: &str, report: &Report) {
        println!("\n{}", "=".repeat(80).bright_cyan());
        println!(
            "{} {}",
            title.bright_white().bold(),
            format!("({})", report.sources.join(", ")).bright_black()
        );
        println!("{}", "=".repeat(80).bright_cyan());
    }

    fn display_failures(&self, failures: &[CounterFailure]) {
        if failures.is_empty() {
            return;
        }
        println!("{} {} counter(s) skipped", "⚠️".bright_yellow(), failures.len());
        for failure in failures {
            println!(
                "   {} [{}]: {}",
                failure.counter_name.bright_red(),
                format!("{:?}", failure.kind).to_lowercase(),
                failure.message
            );
        }
        println!();
    }

    fn no_data(&self, report: &Report) -> bool {
        if report.counters.is_empty() {
            println!("No meter readings found.");
            self.display_failures(&report.failures);
            return true;
        }
        false
    }

    pub fn display_raw(&self, reports: &[Report], limit: Option<usize>, json_output: bool) {
        if json_output {
            print_json(
                "raw",
                json_groups(reports, |r| {
                    limit_per_counter(&r.raw, limit, |row| row.counter_uuid.as_str())
                }),
            );
            return;
        }

        for report in reports {
            self.banner("Meter Readings", report);
            if self.no_data(report) {
                continue;
            }

            let rows = limit_per_counter(&report.raw, limit, |row| row.counter_uuid.as_str());
            let mut current: Option<&str> = None;
            for row in rows {
                if current != Some(row.counter_uuid.as_str()) {
                    current = Some(row.counter_uuid.as_str());
                    println!(
                        "\n{} {} {}",
                        "🔢".bright_blue(),
                        row.counter_name.bright_white().bold(),
                        format!("[{}]", row.unit.as_deref().unwrap_or("-")).bright_black()
                    );
                    if let Some(remark) = &row.remark {
                        println!("   {}", remark.bright_black());
                    }
                }
                let reset = if row.reset_detected {
                    " reset".bright_red().to_string()
                } else {
                    String::new()
                };
                println!(
                    "   {}  {:>12.3}  Δ {}  {} d  {} /d{}",
                    self.date(&row.date).bright_cyan(),
                    row.value,
                    format!("{:.3}", row.delta).bright_green(),
                    fmt_opt(row.days, 1),
                    fmt_opt(row.delta_per_day, 3).bright_yellow(),
                    reset
                );
            }
            println!();
            self.display_failures(&report.failures);
        }
    }

    pub fn display_monthly(&self, reports: &[Report], limit: Option<usize>, json_output: bool) {
        self.display_aggregates("monthly", "Monthly Consumption", reports, limit, json_output, |r| &r.monthly);
    }

    pub fn display_yearly(&self, reports: &[Report], limit: Option<usize>, json_output: bool) {
        self.display_aggregates("yearly", "Yearly Consumption", reports, limit, json_output, |r| &r.yearly);
    }

    fn display_aggregates(
        &self,
        key: &str,
        title: &str,
        reports: &[Report],
        limit: Option<usize>,
        json_output: bool,
        rows_of: impl Fn(&Report) -> &Vec<AggregateRow>,
    ) {
        if json_output {
            print_json(
                key,
                json_groups(reports, |r| {
                    limit_per_counter(rows_of(r), limit, |row| row.counter_uuid.as_str())
                }),
            );
            return;
        }

        for report in reports {
            self.banner(title, report);
            if self.no_data(report) {
                continue;
            }

            let rows = limit_per_counter(rows_of(report), limit, |row| row.counter_uuid.as_str());
            let mut current: Option<&str> = None;
            for row in rows {
                if current != Some(row.counter_uuid.as_str()) {
                    current = Some(row.counter_uuid.as_str());
                    println!(
                        "\n{} {} {}",
                        "📊".bright_yellow(),
                        row.counter_name.bright_white().bold(),
                        format!("[{}]", row.unit.as_deref().unwrap_or("-")).bright_black()
                    );
                }
                let resets = if row.reset_count > 0 {
                    format!(" ({} reset)", row.reset_count).bright_red().to_string()
                } else {
                    String::new()
                };
                println!(
                    "   {:<8} {} over {} d, {} /d, {} readings{}",
                    row.period.to_string().bright_cyan(),
                    format!("{:>12.3}", row.delta).bright_green().bold(),
                    fmt_opt(row.days, 1),
                    fmt_opt(row.delta_per_day, 3).bright_yellow(),
                    row.reading_count,
                    resets
                );
            }
            println!();
            self.display_failures(&report.failures);
        }
    }

    pub fn display_summary(&self, reports: &[Report], limit: Option<usize>, json_output: bool) {
        if json_output {
            print_json(
                "summary",
                json_groups(reports, |r| tail(&r.summary, limit).iter().collect()),
            );
            return;
        }

        for report in reports {
            self.banner("Utility Summary", report);
            if self.no_data(report) {
                continue;
            }

            println!(
                "\n   {:<8} {:>14} {:>14} {:>14}  {}",
                "Month".bright_white().bold(),
                "Water".bright_blue().bold(),
                "Heat".bright_red().bold(),
                "Electricity".bright_yellow().bold(),
                "Unit".bright_white().bold()
            );
            for row in tail(&report.summary, limit) {
                println!(
                    "   {:<8} {:>14} {:>14} {:>14}  {}",
                    row.month.bright_cyan(),
                    fmt_opt(row.water, 3),
                    fmt_opt(row.heat, 1),
                    fmt_opt(row.electricity, 1),
                    row.dwelling.as_deref().unwrap_or("-")
                );
            }
            println!();
            self.display_failures(&report.failures);
        }
    }

    pub fn display_boundaries(&self, reports: &[Report], limit: Option<usize>, json_output: bool) {
        if json_output {
            print_json(
                "boundaries",
                json_groups(reports, |r| {
                    limit_per_counter(&r.boundaries, limit, |row| row.counter_uuid.as_str())
                }),
            );
            return;
        }

        for report in reports {
            self.banner("Year Boundary Estimates", report);
            if self.no_data(report) {
                continue;
            }

            let rows = limit_per_counter(&report.boundaries, limit, |row| row.counter_uuid.as_str());
            let mut current: Option<&str> = None;
            for row in rows {
                if current != Some(row.counter_uuid.as_str()) {
                    current = Some(row.counter_uuid.as_str());
                    println!(
                        "\n{} {} {}",
                        "📅".bright_blue(),
                        row.counter_name.bright_white().bold(),
                        format!("[{}]", row.unit.as_deref().unwrap_or("-")).bright_black()
                    );
                }
                let marker = if row.estimated {
                    format!("{:?}", row.method).to_lowercase().bright_black().to_string()
                } else {
                    "reading".bright_green().to_string()
                };
                println!(
                    "   {}  {:>12.3}  {} /d  {} /yr  {}",
                    row.date.to_string().bright_cyan(),
                    row.value,
                    format!("{:.3}", row.daily_rate).bright_yellow(),
                    format!("{:.1}", row.annualized).bright_green(),
                    marker
                );
            }
            println!();
            self.display_failures(&report.failures);
        }
    }

    pub fn display_counters(&self, reports: &[Report], json_output: bool) {
        if json_output {
            print_json("counters", json_groups(reports, |r| r.counters.iter().collect()));
            return;
        }

        for report in reports {
            self.banner("Counters", report);
            if self.no_data(report) {
                continue;
            }

            println!(
                "\n{} {} counters • {} readings\n",
                "📊".bright_yellow(),
                report.counters.len().to_string().bright_white().bold(),
                report.raw.len().to_string().bright_white().bold()
            );
            for counter in &report.counters {
                let indent = "   ".repeat(counter.depth + 1);
                let last = counter
                    .last_date
                    .map(|d| self.date(&d))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}{} {} {} readings, last {}",
                    indent,
                    counter.counter_name.bright_white().bold(),
                    format!(
                        "[{} {}]",
                        counter.counter_type,
                        counter.unit.as_deref().unwrap_or("-")
                    )
                    .bright_black(),
                    counter.reading_count.to_string().bright_cyan(),
                    last.bright_cyan()
                );
            }
            println!();
            self.display_failures(&report.failures);
        }
    }

    /// Full reports on stdout as JSON.
    pub fn display_report(&self, reports: &[Report]) -> Result<()> {
        let rendered = if get_config().output.json_pretty {
            serde_json::to_string_pretty(reports)?
        } else {
            serde_json::to_string(reports)?
        };
        println!("{}", rendered);
        Ok(())
    }

    pub fn display_written(&self, paths: &[PathBuf], json_output: bool) {
        if json_output {
            print_json("written", serde_json::json!(paths));
            return;
        }
        for path in paths {
            println!("{} Report written to {}", "✅".bright_green(), path.display().to_string().bright_white());
        }
    }
}
