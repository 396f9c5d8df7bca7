//! CLI argument definitions for the sharing tool.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

#[derive(Parser)]
#[command(
    name = "tabshare",
    version,
    about = "Share tabular data according to a declarative rule schema",
    long_about = "Compile a CSV rule schema into per-organization SQL queries and\n\
                  run them against CSV input data.\n\n\
                  `extract` writes one filtered CSV per organization and table;\n\
                  `inspect` prints the selected columns and per-rule row counts."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for debug, -vv for trace, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Extract filtered data into one CSV per organization and table.
    Extract(ExtractArgs),

    /// Report what each organization would receive, without writing data.
    Inspect(InspectArgs),
}

#[derive(Parser)]
pub struct ExtractArgs {
    /// Path to the sharing schema CSV.
    #[arg(value_name = "SCHEMA")]
    pub schema: PathBuf,

    /// Input CSV files, one per table, named after the table they hold.
    #[arg(value_name = "INPUTS", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Table names for the input files, paired by position. An omitted or
    /// empty entry falls back to that input's file stem.
    #[arg(long = "tables", value_name = "TABLE", value_delimiter = ',')]
    pub tables: Vec<String>,

    /// Restrict output to these organizations (default: all in the schema).
    #[arg(long = "orgs", value_name = "ORG", value_delimiter = ',')]
    pub orgs: Vec<String>,

    /// Output directory for the extracted files.
    #[arg(long = "outdir", value_name = "DIR", default_value = ".")]
    pub outdir: PathBuf,

    /// Print the paths of the produced files to stdout.
    #[arg(long = "list")]
    pub list: bool,
}

#[derive(Parser)]
pub struct InspectArgs {
    /// Path to the sharing schema CSV.
    #[arg(value_name = "SCHEMA")]
    pub schema: PathBuf,

    /// Input CSV files, one per table, named after the table they hold.
    #[arg(value_name = "INPUTS", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Table names for the input files, paired by position. An omitted or
    /// empty entry falls back to that input's file stem.
    #[arg(long = "tables", value_name = "TABLE", value_delimiter = ',')]
    pub tables: Vec<String>,

    /// Restrict the report to these organizations (default: all in the schema).
    #[arg(long = "orgs", value_name = "ORG", value_delimiter = ',')]
    pub orgs: Vec<String>,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
