use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use meter_report::config::init_config;
use meter_report::logging::init_logging;
use meter_report::timestamp_parser::TimestampParser;
use meter_report::{MeterAnalyzer, ProcessOptions};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "meter-report")]
#[command(about = "Consumption reports from home utility meter exports")]
#[command(version)]
struct Cli {
    /// Configuration file (default: meter-report.toml lookup)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Clone, Default)]
struct CommonArgs {
    /// Export JSON files or export folders (default: configured folders)
    inputs: Vec<PathBuf>,
    /// Output in JSON format
    #[arg(long)]
    json: bool,
    /// Show the last N rows per counter
    #[arg(long)]
    limit: Option<usize>,
    /// Start date filter (YYYY-MM-DD)
    #[arg(long)]
    since: Option<String>,
    /// End date filter (YYYY-MM-DD)
    #[arg(long)]
    until: Option<String>,
    /// Only counters whose name contains this text
    #[arg(long)]
    counter: Option<String>,
    /// One report across all folders
    #[arg(long)]
    combined: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show every reading with its delta
    Raw(CommonArgs),
    /// Show monthly consumption per counter
    Monthly(CommonArgs),
    /// Show yearly consumption per counter
    Yearly(CommonArgs),
    /// Show the monthly water/heat/electricity summary
    Summary(CommonArgs),
    /// Show estimated readings on 1 January and 31 December
    Boundaries(CommonArgs),
    /// List counters in report order
    Counters(CommonArgs),
    /// Emit the full report as JSON
    Report {
        #[command(flatten)]
        common: CommonArgs,
        /// Write the report to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

impl Commands {
    fn split(self) -> (&'static str, CommonArgs, Option<PathBuf>) {
        match self {
            Commands::Raw(args) => ("raw", args, None),
            Commands::Monthly(args) => ("monthly", args, None),
            Commands::Yearly(args) => ("yearly", args, None),
            Commands::Summary(args) => ("summary", args, None),
            Commands::Boundaries(args) => ("boundaries", args, None),
            Commands::Counters(args) => ("counters", args, None),
            Commands::Report { common, output } => ("report", common, output),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let (command, args, output) = cli
        .command
        .unwrap_or(Commands::Monthly(CommonArgs::default()))
        .split();
    let json = args.json;

    let config = match init_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => return handle_error(e, json),
    };
    let _log_guard = init_logging(config);

    let options = match parse_common_args(args, output) {
        Ok(options) => options,
        Err(e) => return handle_error(e, json),
    };

    let mut analyzer = MeterAnalyzer::new();
    match analyzer.run_command(command, options) {
        Ok(_) => Ok(()),
        Err(e) => handle_error(e, json),
    }
}

fn parse_common_args(args: CommonArgs, output: Option<PathBuf>) -> Result<ProcessOptions> {
    let since_date = args
        .since
        .as_deref()
        .map(TimestampParser::parse_date)
        .transpose()?;
    let until_date = args
        .until
        .as_deref()
        .map(TimestampParser::parse_date)
        .transpose()?;

    if let (Some(since), Some(until)) = (since_date, until_date) {
        if since > until {
            anyhow::bail!("--since {} is after --until {}", since, until);
        }
    }

    Ok(ProcessOptions {
        inputs: args.inputs,
        json_output: args.json,
        limit: args.limit,
        since_date,
        until_date,
        counter: args.counter,
        combined: args.combined,
        output,
    })
}

fn handle_error(e: anyhow::Error, json: bool) -> Result<(), anyhow::Error> {
    if json {
        println!("{}", serde_json::json!({ "error": format!("{:#}", e) }));
    } else {
        eprintln!("❌ Error: {:#}", e);
    }
    process::exit(1);
}
