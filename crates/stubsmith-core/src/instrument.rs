//! Instrumentation scopes wrapping a whole batch run.
//!
//! Both scopes are plain values owned by the caller and passed into the
//! orchestrator, not ambient globals. Their data persists on drop, which
//! runs on every exit path, including early returns on error. Failures
//! while persisting are logged, never raised.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{info, warn};

use stubsmith_types::RunOptions;

/// The two independently toggleable scopes, bundled for hand-off into
/// the orchestrator's entry point.
pub struct Instrumentation {
    pub profiler: Profiler,
    pub metrics: Metrics,
}

impl Instrumentation {
    pub fn from_options(options: &RunOptions) -> Self {
        Self {
            profiler: Profiler::new(options.profile.clone()),
            metrics: Metrics::new(options.metrics.clone()),
        }
    }

    /// A scope with both sinks disabled, for embedders and tests.
    pub fn disabled() -> Self {
        Self {
            profiler: Profiler::new(None),
            metrics: Metrics::new(None),
        }
    }
}

/// Per-file wall-time profile, persisted as a sorted text table.
/// Enabled only when a nonempty output path is configured.
pub struct Profiler {
    out: Option<PathBuf>,
    samples: Vec<(String, Duration)>,
}

impl Profiler {
    fn new(out: Option<PathBuf>) -> Self {
        Self {
            out: out.filter(|p| !p.as_os_str().is_empty()),
            samples: Vec::new(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.out.is_some()
    }

    pub fn record(&mut self, label: &str, elapsed: Duration) {
        if self.enabled() {
            self.samples.push((label.to_string(), elapsed));
        }
    }

    fn dump(&mut self) {
        let Some(path) = self.out.take() else { return };
        self.samples
            .sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let mut text = String::from("# per-file wall time, slowest first\n");
        for (label, elapsed) in &self.samples {
            text.push_str(&format!("{:>10.3}ms  {}\n", elapsed.as_secs_f64() * 1e3, label));
        }

        if let Err(err) = write_with_parents(&path, &text) {
            warn!(path = %path.display(), error = %err, "failed to write profile");
        }
    }
}

impl Drop for Profiler {
    fn drop(&mut self) {
        self.dump();
    }
}

/// Named counters plus a `total_time` stopwatch spanning the run.
///
/// On drop the summary is written as JSON to the configured path, or
/// logged when no path is set.
pub struct Metrics {
    out: Option<PathBuf>,
    counters: BTreeMap<String, u64>,
    started: Instant,
    started_at: chrono::DateTime<Utc>,
    flushed: bool,
}

impl Metrics {
    fn new(out: Option<PathBuf>) -> Self {
        Self {
            out: out.filter(|p| !p.as_os_str().is_empty()),
            counters: BTreeMap::new(),
            started: Instant::now(),
            started_at: Utc::now(),
            flushed: false,
        }
    }

    pub fn incr(&mut self, name: &str) {
        self.add(name, 1);
    }

    pub fn add(&mut self, name: &str, n: u64) {
        *self.counters.entry(name.to_string()).or_insert(0) += n;
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    fn flush(&mut self) {
        if self.flushed {
            return;
        }
        self.flushed = true;

        let total_ms = self.started.elapsed().as_millis() as u64;
        match self.out.take() {
            Some(path) => {
                let doc = serde_json::json!({
                    "started_at": self.started_at.to_rfc3339(),
                    "ended_at": Utc::now().to_rfc3339(),
                    "timers": { "total_time_ms": total_ms },
                    "counters": self.counters.clone(),
                });
                let text = match serde_json::to_string_pretty(&doc) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(error = %err, "failed to serialize metrics");
                        return;
                    }
                };
                if let Err(err) = write_with_parents(&path, &text) {
                    warn!(path = %path.display(), error = %err, "failed to write metrics");
                }
            }
            None => {
                info!(
                    total_time_ms = total_ms,
                    files = self.counter("files_processed"),
                    "run finished"
                );
            }
        }
    }
}

impl Drop for Metrics {
    fn drop(&mut self) {
        self.flush();
    }
}

fn write_with_parents(path: &Path, text: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, text)
}
