//! Output formatting: table, JSON, YAML, plain.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde, plain emits one identifier per line.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// "yes" / "no" cell, green or dimmed when color is on.
pub fn flag(value: bool, color: bool) -> String {
    match (value, color) {
        (true, true) => "yes".green().to_string(),
        (false, true) => "no".dimmed().to_string(),
        (true, false) => "yes".into(),
        (false, false) => "no".into(),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable + tabled items in the chosen format.
pub fn render_list<T, R>(
    format: OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
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
        OutputFormat::Plain => Ok(data.iter().map(&id_fn).collect::<Vec<_>>().join("\n")),
        structured => render_structured(structured, data),
    }
}

/// Render a single item; table mode uses `detail_fn`.
pub fn render_single<T>(
    format: OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
{
    match format {
        OutputFormat::Table => Ok(detail_fn(data)),
        OutputFormat::Plain => Ok(id_fn(data)),
        structured => render_structured(structured, data),
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

fn render_structured<T: serde::Serialize + ?Sized>(
    format: OutputFormat,
    data: &T,
) -> Result<String, CliError> {
    match format {
        OutputFormat::JsonCompact => Ok(serde_json::to_string(data)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(data)?),
        _ => Ok(serde_json::to_string_pretty(data)?),
    }
}
