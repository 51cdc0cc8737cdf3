use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flowweave_core::{
    DEFAULT_IDLE_TIMEOUT_S, DEFAULT_MIN_PACKETS, EngineConfig, FlowReport, KeyShape,
};
use glob::glob;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (commit ",
    env!("FLOWWEAVE_BUILD_COMMIT"),
    ", ",
    env!("FLOWWEAVE_BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "flowweave")]
#[command(version, long_version = LONG_VERSION)]
#[command(
    about = "Flow reconstruction for tshark CSV field exports.",
    long_about = None,
    after_help = "Examples:\n  flowweave export analyse capture.csv -o flows.csv\n  flowweave export analyze capture.csv --stdout\n  flowweave export analyse capture.csv --json --pretty -o report.json"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Operations on tshark CSV field exports (offline-first).
    Export {
        #[command(subcommand)]
        command: ExportCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ExportCommands {
    /// Analyse an export file and write the aggregated flow table.
    #[command(alias = "analyze")]
    #[command(
        after_help = "Examples:\n  flowweave export analyse capture.csv -o flows.csv\n  flowweave export analyze capture.csv --stdout\n  flowweave export analyse capture.csv --json --pretty -o report.json"
    )]
    Analyse {
        /// Path to a tshark CSV field export (.csv or .txt)
        input: PathBuf,

        /// Output path (CSV flow table, or JSON report with --json)
        #[arg(short = 'o', long, required_unless_present = "stdout")]
        output: Option<PathBuf>,

        /// Write the result to stdout
        #[arg(long, conflicts_with = "output")]
        stdout: bool,

        /// Emit the versioned JSON report instead of the CSV flow table
        #[arg(long)]
        json: bool,

        /// Pretty-print JSON output
        #[arg(long, requires = "json", conflicts_with = "compact")]
        pretty: bool,

        /// Compact JSON output (default)
        #[arg(long, requires = "json")]
        compact: bool,

        /// Idle gap in seconds that closes a flow segment
        #[arg(long, value_name = "SECONDS", default_value_t = DEFAULT_IDLE_TIMEOUT_S)]
        idle_timeout: f64,

        /// Minimum records a flow group needs to be kept
        #[arg(long, value_name = "COUNT", default_value_t = DEFAULT_MIN_PACKETS)]
        min_packets: usize,

        /// Keep the two directions of a conversation apart
        #[arg(long)]
        directional: bool,

        /// Group by address pair only, ignoring ports
        #[arg(long)]
        ignore_ports: bool,

        /// Suppress non-error output
        #[arg(long)]
        quiet: bool,

        /// Exit with a non-zero code if input lines were skipped
        #[arg(long)]
        strict: bool,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_default_env()
        .format_target(false)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Export { command } => match command {
            ExportCommands::Analyse {
                input,
                output,
                stdout,
                json,
                pretty,
                compact,
                idle_timeout,
                min_packets,
                directional,
                ignore_ports,
                quiet,
                strict,
            } => {
                let config = EngineConfig {
                    idle_timeout_s: idle_timeout,
                    min_packets,
                    key_shape: KeyShape {
                        bidirectional: !directional,
                        include_ports: !ignore_ports,
                    },
                };
                cmd_export_analyse(
                    input, output, stdout, json, pretty, compact, quiet, strict, &config,
                )
            }
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err.message);
            if let Some(hint) = err.hint {
                eprintln!("hint: {}", hint);
            }
            ExitCode::from(2)
        }
    }
}

#[derive(Debug)]
struct CliError {
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn new(message: impl Into<String>, hint: Option<String>) -> Self {
        Self {
            message: message.into(),
            hint,
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::new(err.to_string(), None)
    }
}

fn cmd_export_analyse(
    input: PathBuf,
    output: Option<PathBuf>,
    stdout: bool,
    json: bool,
    pretty: bool,
    compact: bool,
    quiet: bool,
    strict: bool,
    config: &EngineConfig,
) -> Result<(), CliError> {
    let resolved_input = resolve_input_path(&input)?;
    validate_input_file(&resolved_input)?;
    let input_abs = fs::canonicalize(&resolved_input)
        .with_context(|| format!("Failed to resolve input path: {}", resolved_input.display()))?;
    let output = if stdout {
        None
    } else {
        Some(output.ok_or_else(|| {
            CliError::new(
                "missing output path",
                Some("use -o/--output or --stdout".to_string()),
            )
        })?)
    };

    if let Some(output_path) = output.as_ref() {
        let output_abs = output_path
            .parent()
            .map(|parent| {
                if parent.as_os_str().is_empty() {
                    fs::canonicalize(".")
                } else {
                    fs::canonicalize(parent)
                }
            })
            .transpose()
            .with_context(|| format!("Failed to resolve output path: {}", output_path.display()))?;
        if let Some(output_dir) = output_abs {
            let output_target = output_dir.join(
                output_path
                    .file_name()
                    .ok_or_else(|| anyhow::anyhow!("Invalid output path"))?,
            );
            if output_target == input_abs {
                return Err(CliError::new(
                    format!(
                        "output path must differ from input: {}",
                        output_path.display()
                    ),
                    Some("choose a different output path".to_string()),
                ));
            }
        }
    }

    let meta = fs::metadata(&resolved_input)
        .with_context(|| format!("Failed to read input file: {}", resolved_input.display()))?;

    if !meta.is_file() {
        return Err(CliError::new(
            format!("input is not a file: {}", input.display()),
            Some("use a tshark CSV field export (.csv or .txt)".to_string()),
        ));
    }

    let report = flowweave_core::analyze_export_file(&resolved_input, config)
        .context("export analysis failed")?;
    let rendered = render_output(&report, json, pretty, compact)?;

    if stdout {
        print!("{}", rendered);
        check_strict(strict, &report)?;
        return Ok(());
    }

    let output = output.expect("output required when not using stdout");
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create output directory: {}", parent.display())
            })?;
        }
    }

    fs::write(&output, rendered)
        .with_context(|| format!("Failed to write output: {}", output.display()))?;

    if !quiet {
        let kind = if json { "report" } else { "flow table" };
        eprintln!("OK: {} written -> {}", kind, output.display());
    }
    check_strict(strict, &report)?;
    Ok(())
}

fn render_output(
    report: &FlowReport,
    json: bool,
    pretty: bool,
    compact: bool,
) -> Result<String, CliError> {
    if pretty && compact {
        return Err(CliError::new(
            "cannot use --pretty and --compact together",
            Some("choose one output format".to_string()),
        ));
    }
    if !json {
        return flowweave_core::render_flow_table(&report.flows)
            .context("CSV rendering failed")
            .map_err(Into::into);
    }
    if pretty {
        serde_json::to_string_pretty(report)
            .context("JSON serialization failed")
            .map_err(Into::into)
    } else {
        serde_json::to_string(report)
            .context("JSON serialization failed")
            .map_err(Into::into)
    }
}

fn check_strict(strict: bool, report: &FlowReport) -> Result<(), CliError> {
    if !strict {
        return Ok(());
    }
    let skipped = report
        .capture_summary
        .as_ref()
        .map_or(0, |summary| summary.records_skipped);
    if skipped > 0 {
        return Err(CliError::new(
            format!("input lines were skipped: {}", skipped),
            Some("re-run with RUST_LOG=warn to see the skipped lines".to_string()),
        ));
    }
    Ok(())
}

fn validate_input_file(input: &PathBuf) -> Result<(), CliError> {
    if !input.exists() {
        return Err(CliError::new(
            format!("input file not found: {}", input.display()),
            Some("use a tshark CSV field export (.csv or .txt)".to_string()),
        ));
    }
    let ext = input
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    if ext != "csv" && ext != "txt" {
        return Err(CliError::new(
            format!("unsupported input format '{}'", input.display()),
            Some("expected a .csv or .txt field export".to_string()),
        ));
    }
    Ok(())
}

fn resolve_input_path(input: &PathBuf) -> Result<PathBuf, CliError> {
    let pattern = input.to_string_lossy();
    if !is_glob_pattern(&pattern) {
        return Ok(input.clone());
    }

    let mut matches = Vec::new();
    let paths = glob(&pattern).map_err(|err| {
        CliError::new(
            format!("invalid input pattern '{}'", pattern),
            Some(format!("pattern error: {}", err.msg)),
        )
    })?;
    for entry in paths {
        let path = entry.map_err(|err| {
            CliError::new(
                format!("invalid input pattern '{}'", pattern),
                Some(format!("pattern error: {}", err)),
            )
        })?;
        if path.is_file() {
            matches.push(path);
        }
    }

    if matches.is_empty() {
        return Err(CliError::new(
            format!("no files match pattern '{}'", pattern),
            Some("check the path or quote the pattern; expected .csv or .txt".to_string()),
        ));
    }
    if matches.len() > 1 {
        let hint = "pass a single export file, or run once per file".to_string();
        let mut message = format!(
            "multiple files match pattern '{}' ({} matches)",
            pattern,
            matches.len()
        );
        let listed = matches.iter().take(3).collect::<Vec<_>>();
        if !listed.is_empty() {
            let mut details = String::new();
            details.push_str("; matches: ");
            details.push_str(
                &listed
                    .into_iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            );
            if matches.len() > 3 {
                details.push_str(", ...");
            }
            message.push_str(&details);
        }
        return Err(CliError::new(message, Some(hint)));
    }

    Ok(matches.remove(0))
}

fn is_glob_pattern(input: &str) -> bool {
    input.contains('*') || input.contains('?') || input.contains('[')
}
