//! Core batch driver: decides processing order, runs the engine per file,
//! collects and reports diagnostics, writes artifacts, and computes the
//! process exit status.

mod artifact;
mod batch;
mod diagnostics;
mod directives;
mod instrument;
mod report;
mod single;

pub use artifact::{touch, write_artifact};
pub use batch::{run_batch, BatchPlan};
pub use diagnostics::{DiagnosticLog, ReportFilter};
pub use directives::build_report_filter;
pub use instrument::{Instrumentation, Metrics, Profiler};
pub use report::CsvReportSink;
pub use single::{process_source_file, ProcessError, DEFAULT_STUB};
