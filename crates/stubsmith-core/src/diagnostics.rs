//! Per-file diagnostic accumulation.

use std::io::{self, Write};

use stubsmith_types::{Diagnostic, Severity, CHECK_COMPILE_ERROR};

/// Decides whether a diagnostic should be reported (true = keep).
pub type ReportFilter = Box<dyn Fn(&Diagnostic) -> bool>;

/// Collects diagnostics for one file.
///
/// Exactly one log exists per file being processed. The suppression
/// filter must be installed before anything is recorded or inspected:
/// suppressed entries are dropped at record time and never counted.
#[derive(Default)]
pub struct DiagnosticLog {
    entries: Vec<Diagnostic>,
    filter: Option<ReportFilter>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_filter(&mut self, filter: ReportFilter) {
        self.filter = Some(filter);
    }

    pub fn record(&mut self, diagnostic: Diagnostic) {
        if let Some(filter) = &self.filter {
            if !filter(&diagnostic) {
                return;
            }
        }
        self.entries.push(diagnostic);
    }

    /// Records a downgraded source parse failure.
    pub fn record_compile_error(&mut self, path: &str, line: u32, message: &str) {
        self.record(Diagnostic::error(path, line, CHECK_COMPILE_ERROR, message));
    }

    pub fn has_error(&self) -> bool {
        self.entries.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Renders entries human-readably, one per line.
    pub fn print_to_stream(&self, out: &mut dyn Write) -> io::Result<()> {
        for d in &self.entries {
            writeln!(
                out,
                "{}:{}: {}: {} [{}]",
                d.path,
                d.line,
                d.severity.as_str(),
                d.message,
                d.kind
            )?;
        }
        Ok(())
    }
}
