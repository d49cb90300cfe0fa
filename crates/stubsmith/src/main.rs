use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use tracing::debug;

use stubsmith_core::{run_batch, Instrumentation};
use stubsmith_types::{RunOptions, SourceOutputPair};

#[derive(Parser, Debug)]
#[command(name = "stubsmith", version)]
#[command(about = "Generate and check Python type stubs in batch", long_about = None)]
struct Cli {
    /// Input source files.
    ///
    /// Each may carry an explicit destination as INPUT:OUTPUT. Without
    /// one, --output applies (single input only), else stdout.
    #[arg(value_name = "FILE")]
    inputs: Vec<String>,

    /// Where to write the stub, or the reference to check against.
    ///
    /// Only valid with exactly one input; '-' means stdout.
    #[arg(long, short = 'o', value_name = "PATH")]
    output: Option<PathBuf>,

    /// Check inputs against existing reference stubs instead of
    /// generating new ones.
    #[arg(long)]
    check: bool,

    /// Shallow analysis: no unknown solving, nested classes skipped.
    #[arg(long)]
    quick: bool,

    /// Skip deep analysis of function bodies.
    #[arg(long)]
    main_only: bool,

    /// Keep going on analysis failures and write degraded stubs.
    /// Unreadable inputs still abort the run.
    #[arg(long)]
    nofail: bool,

    /// Collect diagnostics but never print them or fail the run.
    #[arg(long)]
    no_report_errors: bool,

    /// Write all diagnostics to this CSV file instead of stderr.
    ///
    /// With an active report the process exit status stays 0; consuming
    /// tooling decides pass/fail from the rows.
    #[arg(long, value_name = "PATH")]
    output_errors_csv: Option<PathBuf>,

    /// Update this file's mtime when the whole batch succeeds.
    #[arg(long, value_name = "PATH")]
    touch: Option<PathBuf>,

    /// Write a per-file timing profile to this path.
    #[arg(long, value_name = "PATH")]
    profile: Option<PathBuf>,

    /// Write run metrics (counters + total time) as JSON to this path.
    #[arg(long, value_name = "PATH")]
    metrics: Option<PathBuf>,

    /// Disable builtin literal typing; everything unannotated is Any.
    #[arg(long)]
    no_builtins: bool,

    /// Cache resolved unknown expressions across files.
    #[arg(long)]
    cache_unknowns: bool,

    /// Abort the run when a warmup-pass file fails instead of leaving
    /// it to the main pass.
    #[arg(long)]
    strict_warmup: bool,

    /// Check names to suppress for the whole run. Repeatable;
    /// comma-separated lists are accepted.
    #[arg(long, value_name = "CHECKS", action = clap::ArgAction::Append)]
    disable: Vec<String>,

    /// Enable verbose (info-level) logging to stderr.
    #[arg(long, short = 'v')]
    verbose: bool,

    /// Enable debug-level logging to stderr.
    #[arg(long)]
    debug: bool,
}

#[cfg(not(test))]
fn main() -> std::process::ExitCode {
    match run_with_args(std::env::args_os()) {
        Ok(code) => std::process::ExitCode::from(code as u8),
        Err(err) => {
            eprintln!("{err:?}");
            std::process::ExitCode::from(1)
        }
    }
}

fn run_with_args<I, T>(args: I) -> Result<i32>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    init_logging(cli.verbose, cli.debug);

    let pairs = build_pairs(&cli)?;
    let options = build_options(&cli);
    debug!(files = pairs.len(), check = options.check, "starting batch");

    let mut instr = Instrumentation::from_options(&options);
    run_batch(&pairs, &options, &mut instr)
}

/// Initialize tracing/logging based on CLI flags.
fn init_logging(verbose: bool, debug: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        "warn"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

fn build_pairs(cli: &Cli) -> Result<Vec<SourceOutputPair>> {
    if cli.output.is_some() && cli.inputs.len() > 1 {
        bail!("--output requires exactly one input file");
    }

    let mut pairs = Vec::new();
    for raw in &cli.inputs {
        let (input, inline_output) = match raw.split_once(':') {
            Some((input, output)) => {
                let output = if output.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(output))
                };
                (input, output)
            }
            None => (raw.as_str(), None),
        };
        if inline_output.is_some() && cli.output.is_some() {
            bail!("cannot combine INPUT:OUTPUT with --output");
        }
        let output = inline_output.or_else(|| cli.output.clone());
        pairs.push(SourceOutputPair::new(input, output));
    }
    Ok(pairs)
}

fn build_options(cli: &Cli) -> RunOptions {
    let disabled_checks = cli
        .disable
        .iter()
        .flat_map(|s| s.split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    RunOptions {
        check: cli.check,
        quick: cli.quick,
        main_only: cli.main_only,
        nofail: cli.nofail,
        report_errors: !cli.no_report_errors,
        output_errors_csv: cli.output_errors_csv.clone(),
        touch: cli.touch.clone(),
        profile: cli.profile.clone(),
        metrics: cli.metrics.clone(),
        run_builtins: !cli.no_builtins,
        cache_unknowns: cli.cache_unknowns,
        skip_warmup_failures: !cli.strict_warmup,
        disabled_checks,
    }
}
