//! code-health CLI - Cohesion, Complexity and Coupling Analysis
//!
//! Analyzes a Rust crate (or a JSON fact file from another front end) and
//! prints a summary or a full JSON report.
//!
//! Usage:
//!   code-health [OPTIONS] [PATH]

use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;
use std::process;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use code_health::{
    CompiledConfig, ProjectFacts, analyze_facts, analyze_path_with_deadline, load_config,
    load_config_file, write_json, write_summary,
};

/// code-health - Find the structs, functions and packages that hurt the most
#[derive(Parser, Debug)]
#[command(name = "code-health")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the crate or directory to analyze
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Summary)]
    format: OutputFormat,

    /// Output file for the report (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Config file path (default: search for .code-health.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Analyze a JSON fact file instead of Rust sources
    #[arg(long, value_name = "FILE")]
    facts: Option<PathBuf>,

    /// Additional directories to exclude (comma separated)
    #[arg(long, value_delimiter = ',', value_name = "DIR")]
    exclude: Vec<String>,

    /// Include #[cfg(test)] modules and #[test] functions
    #[arg(long)]
    include_tests: bool,

    /// Number of threads for parallel processing (default: all CPU cores)
    #[arg(long, short = 'j', value_name = "N")]
    jobs: Option<usize>,

    /// Abort the run after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Verbose output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    // === Threshold options ===
    /// Cyclomatic complexity at which a function is flagged
    #[arg(long)]
    max_complexity: Option<usize>,

    /// LCOM4 at which a heavily used struct is a God Object
    #[arg(long)]
    god_object_lcom4: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Summary,
    Json,
}

fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// `RUST_LOG` wins; otherwise the level follows `-v`
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    // Configure thread pool
    let available_cores = std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1);
    if let Some(jobs) = args.jobs {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build_global()
        {
            warn!(error = %e, "could not set thread count");
        }
    }
    debug!(
        threads = args.jobs.unwrap_or(available_cores),
        cores = available_cores,
        "thread pool"
    );

    // CLI flags override the config file, which overrides defaults
    let mut raw = match &args.config {
        Some(path) => load_config_file(path)?,
        None => load_config(&args.path)?,
    };
    raw.analysis.exclude_dirs.extend(args.exclude.iter().cloned());
    if args.include_tests {
        raw.analysis.exclude_tests = false;
    }
    if let Some(max) = args.max_complexity {
        raw.thresholds.complex_function = max;
    }
    if let Some(lcom4) = args.god_object_lcom4 {
        raw.thresholds.god_object_lcom4 = lcom4;
    }
    let config = CompiledConfig::from_config(raw)?;

    let deadline = args
        .timeout
        .map(|secs| Instant::now() + Duration::from_secs(secs));

    let start = Instant::now();
    let report = match &args.facts {
        Some(path) => {
            eprintln!("Analyzing facts from '{}'...", path.display());
            let facts = ProjectFacts::from_json_file(path)?;
            analyze_facts(&facts, &config, deadline)?
        }
        None => {
            eprintln!("Analyzing project at '{}'...", args.path.display());
            analyze_path_with_deadline(&args.path, &config, deadline)?
        }
    };
    info!(
        packages = report.packages.len(),
        findings = report.findings.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "run finished"
    );

    // Generate output
    let mut writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(stdout()),
    };

    match args.format {
        OutputFormat::Summary => write_summary(&report, &mut writer)?,
        OutputFormat::Json => write_json(&report, &mut writer)?,
    }
    writer.flush()?;

    if let Some(path) = &args.output {
        eprintln!("Report written to: {}", path.display());
    }

    Ok(())
}
