//! CLI argument parsing using clap derive API
//!
//! Purely declarative: no side effects or I/O happen here.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// logtriage -- device log bundle triage.
///
/// Use `logtriage <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "logtriage", version, about, long_about = None)]
pub struct Cli {
    /// Path to the logtriage.toml configuration file (defaults apply when missing).
    #[arg(short, long, global = true, default_value = "logtriage.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table / text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Decode log bundles into plain device logs.
    Decode(DecodeArgs),

    /// Wrap a plain archive into the proprietary container format.
    Encrypt(EncryptArgs),

    /// Inspect and validate analysis rules.
    Rules(RulesArgs),

    /// Run one analysis over local log files.
    Analyze(AnalyzeArgs),

    /// Inspect stored analysis tasks.
    Tasks(TasksArgs),

    /// Mark runs interrupted by a crash as failed.
    Recover,

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- decode ----

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Input files (containers, zip, gzip or plain logs).
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Directory for intermediate and decoded files.
    #[arg(long, default_value = "decoded")]
    pub out: PathBuf,
}

// ---- encrypt ----

#[derive(Args, Debug)]
pub struct EncryptArgs {
    /// Plain zip archive to wrap.
    pub input: PathBuf,

    /// Container file to write.
    #[arg(id = "container", value_name = "OUTPUT")]
    pub output: PathBuf,
}

// ---- rules ----

#[derive(Args, Debug)]
pub struct RulesArgs {
    #[command(subcommand)]
    pub action: RulesAction,
}

#[derive(Subcommand, Debug)]
pub enum RulesAction {
    /// List all rules in the catalog.
    List {
        /// Filter by status (enabled, disabled).
        #[arg(long)]
        status: Option<String>,
    },
    /// Show one rule including its document body.
    Show {
        /// Rule ID.
        id: String,
    },
    /// Classify a problem description and show the matched rule set.
    Classify {
        /// Problem description.
        text: String,
    },
    /// Validate rule documents without touching the catalog.
    Validate {
        /// Directory containing markdown rule documents (default: rules.dir).
        path: Option<PathBuf>,
    },
}

// ---- analyze ----

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Problem description as reported by the user.
    #[arg(short, long)]
    pub description: String,

    /// Log bundle to analyse (repeatable).
    #[arg(short, long = "file")]
    pub files: Vec<PathBuf>,

    /// Agent provider to use instead of the routed one.
    #[arg(long)]
    pub agent: Option<String>,

    /// Issue ID (generated when omitted).
    #[arg(long)]
    pub issue_id: Option<String>,

    /// Device serial number.
    #[arg(long, default_value = "")]
    pub device_sn: String,

    /// Firmware version.
    #[arg(long, default_value = "")]
    pub firmware: String,

    /// Do not print progress lines.
    #[arg(short, long)]
    pub quiet: bool,
}

// ---- tasks ----

#[derive(Args, Debug)]
pub struct TasksArgs {
    #[command(subcommand)]
    pub action: TasksAction,
}

#[derive(Subcommand, Debug)]
pub enum TasksAction {
    /// List stored tasks, oldest first.
    List {
        /// Filter by stage (queued, downloading, ..., done, failed).
        #[arg(long)]
        stage: Option<String>,
    },
    /// Show one task and its result.
    Show {
        /// Task ID.
        id: String,
    },
}

// ---- config ----

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only one section (general, storage, rules, decoder, extractor, agent, concurrency, progress).
        #[arg(long)]
        section: Option<String>,
    },
}
