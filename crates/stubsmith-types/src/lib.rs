//! Data types (run options + diagnostics) for stubsmith.
//!
//! This crate is intentionally "dumb": pure DTOs with serde + schemars.

use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ── Frozen Vocabulary ──────────────────────────────────────────
// Check names (kebab-case). These appear in diagnostics, in the CSV
// report's `kind` column, and in suppression directives.
pub const CHECK_COMPILE_ERROR: &str = "compile-error";
pub const CHECK_MISSING_DEFINITION: &str = "missing-definition";
pub const CHECK_SIGNATURE_MISMATCH: &str = "signature-mismatch";
pub const CHECK_OBSOLETE_DEFINITION: &str = "obsolete-definition";

/// Output path value meaning "write to standard output".
pub const STDOUT_PATH: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// A single reported issue from analyzing one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Diagnostic {
    /// Path of the analyzed file, as given on the command line.
    pub path: String,
    /// 1-based line number; 0 when the issue has no meaningful location.
    pub line: u32,
    /// Stable check name (see the `CHECK_*` constants).
    pub kind: String,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn error(path: &str, line: u32, kind: &str, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            line,
            kind: kind.to_string(),
            severity: Severity::Error,
            message: message.into(),
        }
    }

    pub fn warning(path: &str, line: u32, kind: &str, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            line,
            kind: kind.to_string(),
            severity: Severity::Warning,
            message: message.into(),
        }
    }
}

/// One unit of work: an input source file and where its artifact goes.
///
/// `output` of `None`, or the literal path `-`, means standard output.
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SourceOutputPair {
    pub input: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

impl SourceOutputPair {
    pub fn new(input: impl Into<PathBuf>, output: Option<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output,
        }
    }

    /// True when the artifact (if any) goes to standard output.
    pub fn writes_to_stdout(&self) -> bool {
        match &self.output {
            None => true,
            Some(p) => is_stdout_path(p),
        }
    }
}

/// True for the `-` stdout marker.
pub fn is_stdout_path(path: &Path) -> bool {
    path == Path::new(STDOUT_PATH)
}

/// Configuration snapshot for one batch run.
///
/// Assembled by the CLI layer; read-only for the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RunOptions {
    /// Check against a reference stub instead of generating one.
    pub check: bool,
    /// Shallow inference: no unknown solving, nesting depth capped at 1.
    pub quick: bool,
    /// Skip deep analysis of non-entry code (function bodies).
    pub main_only: bool,
    /// Degrade analysis failures to a best-effort artifact instead of
    /// aborting the batch. Unreadable inputs still abort.
    pub nofail: bool,
    /// When false, diagnostics are collected but never affect the exit
    /// status and are not printed.
    pub report_errors: bool,
    /// Write diagnostics for the whole batch to this CSV file instead of
    /// streaming them to stderr.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_errors_csv: Option<PathBuf>,
    /// Create/update this file's mtime when the whole batch succeeds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub touch: Option<PathBuf>,
    /// Write a per-file timing profile here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<PathBuf>,
    /// Write run metrics (counters + total time) as JSON here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<PathBuf>,
    /// Resolve builtin literal types during inference.
    pub run_builtins: bool,
    /// Cache resolved unknown expressions across files.
    pub cache_unknowns: bool,
    /// Skip a file whose warmup processing fails instead of aborting the
    /// run. The main pass still processes it normally.
    pub skip_warmup_failures: bool,
    /// Check names suppressed for the whole run.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disabled_checks: Vec<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            check: false,
            quick: false,
            main_only: false,
            nofail: false,
            report_errors: true,
            output_errors_csv: None,
            touch: None,
            profile: None,
            metrics: None,
            run_builtins: true,
            cache_unknowns: false,
            skip_warmup_failures: true,
            disabled_checks: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_as_str() {
        assert_eq!(Severity::Warning.as_str(), "warning");
        assert_eq!(Severity::Error.as_str(), "error");
    }

    #[test]
    fn defaults_match_expected_values() {
        let opts = RunOptions::default();
        assert!(!opts.check);
        assert!(opts.report_errors);
        assert!(opts.run_builtins);
        assert!(opts.skip_warmup_failures);
        assert!(!opts.cache_unknowns);
        assert!(opts.output_errors_csv.is_none());
        assert!(opts.disabled_checks.is_empty());
    }

    #[test]
    fn stdout_pair_detection() {
        let none = SourceOutputPair::new("a.py", None);
        assert!(none.writes_to_stdout());

        let dash = SourceOutputPair::new("a.py", Some(PathBuf::from("-")));
        assert!(dash.writes_to_stdout());

        let file = SourceOutputPair::new("a.py", Some(PathBuf::from("a.pyi")));
        assert!(!file.writes_to_stdout());
    }

    #[test]
    fn diagnostic_constructors_set_severity() {
        let e = Diagnostic::error("m.py", 3, CHECK_COMPILE_ERROR, "bad syntax");
        assert_eq!(e.severity, Severity::Error);
        assert_eq!(e.kind, "compile-error");

        let w = Diagnostic::warning("m.py", 0, CHECK_OBSOLETE_DEFINITION, "gone");
        assert_eq!(w.severity, Severity::Warning);
        assert_eq!(w.line, 0);
    }

    #[test]
    fn run_options_serde_omits_empty_optionals() {
        let value = serde_json::to_value(RunOptions::default()).expect("serialize options");
        let obj = value.as_object().expect("options should be an object");
        assert!(!obj.contains_key("touch"));
        assert!(!obj.contains_key("output_errors_csv"));
        assert!(!obj.contains_key("disabled_checks"));
    }
}
