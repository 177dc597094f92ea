//! Output formatting: table and JSON.
//!
//! Renders data in the format selected by `--output` (or `defaults.output`).
//! Tables use `tabled`, structured formats serialize the original data.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use serde_json::Value;
use tabled::{Table, Tabled, settings::Style};

use hostwatch_core::{AggregatedResult, TargetResult};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

/// Longest command output shown in a table cell.
const MAX_DETAIL_CHARS: usize = 120;

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// Green `ok` or red `FAILED`.
pub fn status_label(success: bool, color: bool) -> String {
    match (success, color) {
        (true, true) => "ok".green().to_string(),
        (true, false) => "ok".into(),
        (false, true) => "FAILED".red().bold().to_string(),
        (false, false) => "FAILED".into(),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable + tabled items in the chosen format.
pub fn render_list<T, R>(
    format: OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
) -> Result<String, CliError>
where
    T: serde::Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            Ok(render_table(&rows))
        }
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
    }
}

/// Render the records of one dispatched operation.
pub fn render_aggregate(
    format: OutputFormat,
    result: &AggregatedResult,
    color: bool,
) -> Result<String, CliError> {
    match format {
        OutputFormat::Table => {
            let rows: Vec<ResultRow> = result
                .results
                .iter()
                .map(|r| ResultRow::new(r, color))
                .collect();
            Ok(render_table(&rows))
        }
        OutputFormat::Json => render_json(result, false),
        OutputFormat::JsonCompact => render_json(result, true),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

// ── Format-specific renderers ────────────────────────────────────────

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

pub(crate) fn render_json<T: serde::Serialize + ?Sized>(
    data: &T,
    compact: bool,
) -> Result<String, CliError> {
    let rendered = if compact {
        serde_json::to_string(data)?
    } else {
        serde_json::to_string_pretty(data)?
    };
    Ok(rendered)
}

// ── Result rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct ResultRow {
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

impl ResultRow {
    fn new(record: &TargetResult, color: bool) -> Self {
        let detail = match (&record.payload, &record.error) {
            (_, Some(err)) => format!("{}: {}", err.kind, err.message),
            (Some(payload), None) => summarize(payload),
            (None, None) => String::new(),
        };
        Self {
            target: record.target.clone(),
            status: status_label(record.success, color),
            detail,
        }
    }
}

/// One-cell summary of a success payload.
fn summarize(payload: &Value) -> String {
    if let Some(stdout) = payload.get("stdout").and_then(Value::as_str) {
        let exit = payload
            .get("exit_status")
            .and_then(Value::as_u64)
            .unwrap_or_default();
        let text = truncate(stdout.trim_end());
        return if exit == 0 {
            text
        } else {
            let stderr = payload
                .get("stderr")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim_end();
            let shown = if text.is_empty() { truncate(stderr) } else { text };
            format!("exit {exit}: {shown}")
        };
    }
    match payload.get("value") {
        Some(Value::Null) => "-".into(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_DETAIL_CHARS {
        return text.to_owned();
    }
    let mut cut: String = text.chars().take(MAX_DETAIL_CHARS).collect();
    cut.push('…');
    cut
}
