//! Clap derive structures for the `hostwatch` CLI.
//!
//! Defines the command tree, global flags, and the value parsers shared by
//! several subcommands.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// hostwatch -- keep an eye on SSH-reachable hosts
#[derive(Debug, Parser)]
#[command(
    name = "hostwatch",
    version,
    about = "Watch and operate SSH-reachable hosts",
    long_about = "Tracks liveness and sensor values of the hosts in your config file,\n\
        and runs commands, actions and power operations across any number of them.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, short = 'c', env = "HOSTWATCH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Device to target (repeatable, defaults to every device)
    #[arg(long = "device", short = 'd', value_name = "NAME", global = true)]
    pub devices: Vec<String>,

    /// Output format (overrides `defaults.output`)
    #[arg(long, short = 'o', env = "HOSTWATCH_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Log line format on stderr
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List configured devices
    #[command(alias = "ls")]
    Devices,

    /// Run a shell command on the selected devices
    Exec(ExecArgs),

    /// Run a configured action
    Action(ActionArgs),

    /// Read sensors now
    Poll(PollArgs),

    /// Write sensor values
    Set(SetArgs),

    /// Power on via wake-on-LAN
    On,

    /// Power off (requires `allow_turn_off`)
    Off,

    /// Reboot
    Restart,

    /// Run every coordinator and print changes until interrupted
    Watch,
}

// ── Subcommand Arguments ─────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ExecArgs {
    /// Command template (minijinja syntax)
    pub command: String,

    /// Template variable as key=value (value parsed as JSON when possible)
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
    pub vars: Vec<(String, serde_json::Value)>,

    /// Command timeout, in seconds or as a duration like "90s"
    #[arg(long, value_parser = parse_timeout)]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Args)]
pub struct ActionArgs {
    /// Action key
    pub key: String,

    /// Template variable as key=value (value parsed as JSON when possible)
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
    pub vars: Vec<(String, serde_json::Value)>,
}

#[derive(Debug, Args)]
pub struct PollArgs {
    /// Sensor keys or entity ids (`device.key`). Polls every sensor when empty.
    pub keys: Vec<String>,
}

#[derive(Debug, Args)]
pub struct SetArgs {
    /// Sensor key or entity id, paired in order with --value
    #[arg(long = "key", short = 'k', value_name = "KEY", required = true)]
    pub keys: Vec<String>,

    /// Value to write
    #[arg(long = "value", value_name = "VALUE", required = true)]
    pub values: Vec<String>,
}

// ── Value parsers ────────────────────────────────────────────────────

fn parse_var(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err("variable name must not be empty".into());
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_owned()));
    Ok((key.to_owned(), value))
}

fn parse_timeout(raw: &str) -> Result<Duration, String> {
    let timeout = match raw.parse::<u64>() {
        Ok(secs) => Duration::from_secs(secs),
        Err(_) => humantime::parse_duration(raw).map_err(|e| e.to_string())?,
    };
    if timeout.is_zero() {
        return Err("timeout must be greater than zero".into());
    }
    Ok(timeout)
}
