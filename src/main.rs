// LogWeave - main.rs
//
// Command-line entry point. Handles:
// 1. CLI argument parsing
// 2. config.toml loading and logging initialisation (debug mode support)
// 3. Building the import -> multi-line -> merge -> filter pipeline
// 4. Printing the merged view once processing completes

use clap::Parser;
use logweave::app::pipeline::Pipeline;
use logweave::core::filter::FilterState;
use logweave::core::model::Severity;
use logweave::platform::config::{self, PlatformPaths};
use logweave::platform::scheduler::DefaultTaskScheduler;
use logweave::sources::SourceOptions;
use logweave::util::{self, constants};
use logweave::util::error::{LogWeaveError, Result};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

/// LogWeave - merge log files into one chronological view.
///
/// Continuation lines (stack traces, wrapped messages) stay attached to the
/// entry they belong to; filters keep or drop whole entries.
#[derive(Parser, Debug)]
#[command(name = "logweave", version, about)]
struct Cli {
    /// Log files to merge.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Keep entries containing this text (case-insensitive).
    #[arg(short = 't', long = "filter")]
    text: Option<String>,

    /// Keep entries matching this regular expression.
    #[arg(short = 'r', long = "regex")]
    regex: Option<String>,

    /// Keep entries of this level (repeatable).
    #[arg(short = 'l', long = "level", value_parser = parse_level)]
    levels: Vec<Severity>,

    /// Config file to use instead of the platform default.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Seconds to wait for processing to complete.
    #[arg(long = "timeout-secs", default_value_t = constants::DEFAULT_PIPELINE_TIMEOUT_SECS)]
    timeout_secs: u64,

    /// Enable debug logging (equivalent to RUST_LOG=debug).
    #[arg(short = 'd', long = "debug")]
    debug: bool,
}

fn parse_level(value: &str) -> std::result::Result<Severity, String> {
    Severity::from_keyword(value).ok_or_else(|| {
        format!("unknown level '{value}' (expected fatal, error, warn, info, debug or trace)")
    })
}

fn build_filter(cli: &Cli) -> Result<FilterState> {
    let mut filter = FilterState {
        severity_levels: cli.levels.iter().copied().collect(),
        text_search: cli.text.clone().unwrap_or_default(),
        ..Default::default()
    };
    if let Some(ref pattern) = cli.regex {
        filter.set_regex(pattern)?;
    }
    Ok(filter)
}

/// Runs the pipeline and prints the result. Returns false if processing did
/// not complete in time.
fn run(cli: &Cli) -> Result<bool> {
    let (app_config, warnings) = match cli.config {
        Some(ref path) => config::load_config_file(path)?,
        None => config::load_config(&PlatformPaths::resolve().config_dir),
    };

    util::logging::init(
        cli.debug,
        app_config.log_level.as_deref(),
        app_config.log_file.as_deref(),
    );
    tracing::info!(
        version = constants::APP_VERSION,
        debug = cli.debug,
        files = cli.files.len(),
        "LogWeave starting"
    );
    for warning in &warnings {
        tracing::warn!(warning = %warning, "Config warning");
    }

    let filter = build_filter(cli)?;
    let scheduler = DefaultTaskScheduler::new(app_config.worker_threads)?;
    let pipeline = Pipeline::from_files(
        scheduler.clone(),
        &cli.files,
        Some(filter),
        SourceOptions::from(&app_config),
    )?;

    let completed = pipeline.wait_until_complete(Duration::from_secs(cli.timeout_secs));
    let rows = pipeline.rows();

    let stdout = std::io::stdout();
    let mut out = std::io::BufWriter::new(stdout.lock());
    let write_err = |source| LogWeaveError::Io {
        path: PathBuf::from("<stdout>"),
        operation: "write",
        source,
    };
    for row in &rows {
        writeln!(out, "{}", row.format()).map_err(write_err)?;
    }
    out.flush().map_err(write_err)?;

    tracing::info!(rows = rows.len(), completed, "LogWeave finished");
    pipeline.dispose();
    scheduler.shutdown();
    Ok(completed)
}

fn main() {
    let cli = Cli::parse();

    match run(&cli) {
        Ok(true) => {}
        Ok(false) => {
            eprintln!(
                "Error: processing did not complete within {} seconds; output is partial",
                cli.timeout_secs
            );
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!(error = %e, "LogWeave failed");
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
