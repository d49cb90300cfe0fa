//! Batch orchestration: ordering, the warmup pass, status aggregation,
//! and run-level side effects.

use std::cmp::Reverse;
use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use stubsmith_types::{RunOptions, SourceOutputPair};

use crate::artifact;
use crate::instrument::Instrumentation;
use crate::report::CsvReportSink;
use crate::single::process_source_file;

/// The two-phase processing order for one batch.
///
/// With more than one pair, everything except the largest input is run
/// once in a diagnostics-suppressed warmup pass to prime the engine's
/// caches, then the full list is processed with normal reporting. The
/// largest file is pinned to the head of the list, so it is processed
/// exactly once, after every other file has been seen. Size ties keep
/// their original relative order (the sort is stable).
///
/// Keep this ordering rule as-is: downstream callers depend on its
/// deterministic behavior.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    ordered: Vec<SourceOutputPair>,
}

impl BatchPlan {
    pub fn from_pairs(pairs: &[SourceOutputPair]) -> Self {
        let mut ordered = pairs.to_vec();
        if ordered.len() > 1 {
            ordered.sort_by_key(|p| Reverse(input_size(&p.input)));
        }
        Self { ordered }
    }

    /// The warmup set: every pair except the largest. Empty for
    /// single-pair batches.
    pub fn warmup(&self) -> &[SourceOutputPair] {
        if self.ordered.len() > 1 {
            &self.ordered[1..]
        } else {
            &[]
        }
    }

    /// The authoritative pass over every pair, largest first.
    pub fn main_pass(&self) -> &[SourceOutputPair] {
        &self.ordered
    }
}

/// Missing files sort as empty; reading them fails later with a proper
/// error from the processor.
fn input_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Runs a whole batch and returns the process exit status.
///
/// Processing is strictly sequential and never aborts early on a
/// nonzero file status; only fatal per-file errors (unreadable input,
/// missing reference, non-downgraded analysis failure) abort the run.
pub fn run_batch(
    pairs: &[SourceOutputPair],
    options: &RunOptions,
    instr: &mut Instrumentation,
) -> Result<i32> {
    if pairs.is_empty() {
        error!("no input files given");
        return Ok(1);
    }

    let plan = BatchPlan::from_pairs(pairs);

    let mut report = match &options.output_errors_csv {
        Some(path) => Some(
            CsvReportSink::create(path)
                .with_context(|| format!("open diagnostic report {}", path.display()))?,
        ),
        None => None,
    };

    let mut fully_processed = true;

    for pair in plan.warmup() {
        debug!(input = %pair.input.display(), "warmup pass");
        match process_source_file(&pair.input, pair.output.as_deref(), options, false, None) {
            Ok(_) => instr.metrics.incr("warmup_files"),
            Err(err) if options.skip_warmup_failures => {
                warn!(
                    input = %pair.input.display(),
                    error = %err,
                    "warmup failed; file left to the main pass"
                );
                fully_processed = false;
            }
            Err(err) => {
                return Err(err).with_context(|| format!("warmup of {}", pair.input.display()))
            }
        }
    }

    let mut status = 0;
    for pair in plan.main_pass() {
        info!(input = %pair.input.display(), "processing");
        let started = Instant::now();
        let code =
            process_source_file(&pair.input, pair.output.as_deref(), options, true, report.as_mut())
                .with_context(|| format!("processing {}", pair.input.display()))?;
        instr
            .profiler
            .record(&pair.input.display().to_string(), started.elapsed());
        instr.metrics.incr("files_processed");
        status = status.max(code);
    }

    if let Some(sink) = report {
        sink.finish().context("close diagnostic report")?;
    }

    if status == 0 && fully_processed {
        if let Some(touch_path) = &options.touch {
            artifact::touch(touch_path)
                .with_context(|| format!("touch {}", touch_path.display()))?;
            debug!(path = %touch_path.display(), "updated touch file");
        }
    }

    Ok(status)
}
