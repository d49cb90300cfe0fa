//! Per-file processing: runs check or generate mode for one input,
//! converts engine failures per the failure policy, and computes the
//! file's status code.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;

use stubsmith_ast::{canonicalize, optimize, render, verify, OptimizeOptions};
use stubsmith_engine::{check, infer, load_reference, CheckFlags, EngineError, InferFlags};
use stubsmith_types::{is_stdout_path, RunOptions};

use crate::artifact::write_artifact;
use crate::diagnostics::DiagnosticLog;
use crate::directives::build_report_filter;
use crate::report::CsvReportSink;

/// The artifact written when a module cannot be analyzed: every attribute
/// exists and is untyped.
pub const DEFAULT_STUB: &str = "from typing import Any\n\ndef __getattr__(name) -> Any: ...\n";

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// Input or output file I/O. Never downgraded, even under `nofail`.
    #[error("failed to read or write '{path}': {source}")]
    FileIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Check mode's reference stub is unreadable or unparseable.
    #[error("failed to load reference stub '{path}': {message}")]
    MissingReference { path: PathBuf, message: String },

    /// The engine failed for a reason other than a source parse error.
    #[error("analysis of '{path}' failed: {message}")]
    Analysis { path: PathBuf, message: String },

    /// The structured report sink could not be written.
    #[error("failed to write diagnostic report: {source}")]
    Report {
        #[source]
        source: io::Error,
    },
}

/// Processes one input file.
///
/// Returns the file's status code: nonzero only when diagnostics are
/// being reported to stderr and an error-severity entry survived the
/// suppression filter. Fatal conditions come back as [`ProcessError`].
pub fn process_source_file(
    input: &Path,
    output: Option<&Path>,
    options: &RunOptions,
    print_diagnostics: bool,
    report: Option<&mut CsvReportSink>,
) -> Result<i32, ProcessError> {
    let raw = fs::read(input).map_err(|source| ProcessError::FileIo {
        path: input.to_path_buf(),
        source,
    })?;
    let display_path = input.display().to_string();

    let mut log = DiagnosticLog::new();
    log.set_filter(build_report_filter(&raw, &options.disabled_checks));

    let source = String::from_utf8_lossy(&raw).into_owned();

    if options.check {
        run_check_mode(input, output, options, &display_path, &source, &mut log)?;
    } else {
        run_generate_mode(input, output, options, &display_path, &source, &mut log)?;
    }

    // Status policy: inert diagnostics, then the report sink, then stderr.
    if !options.report_errors {
        return Ok(0);
    }
    if let Some(sink) = report {
        sink.append(log.entries())
            .map_err(|source| ProcessError::Report { source })?;
        return Ok(0);
    }
    if print_diagnostics {
        let mut stderr = io::stderr().lock();
        // Diagnostics are best-effort output; a broken stderr never
        // changes the verdict.
        let _ = log.print_to_stream(&mut stderr);
        return Ok(if log.has_error() { 1 } else { 0 });
    }
    Ok(0)
}

fn run_check_mode(
    input: &Path,
    output: Option<&Path>,
    options: &RunOptions,
    display_path: &str,
    source: &str,
    log: &mut DiagnosticLog,
) -> Result<(), ProcessError> {
    let reference = match output {
        Some(path) if !is_stdout_path(path) => {
            let text = fs::read_to_string(path).map_err(|err| ProcessError::MissingReference {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;
            Some(
                load_reference(&text).map_err(|err| ProcessError::MissingReference {
                    path: path.to_path_buf(),
                    message: err.to_string(),
                })?,
            )
        }
        _ => None,
    };

    let flags = CheckFlags {
        run_builtins: options.run_builtins,
        deep: !options.main_only,
        cache_unknowns: options.cache_unknowns,
    };

    match check(display_path, source, reference.as_ref(), &flags) {
        Ok(diagnostics) => {
            for d in diagnostics {
                log.record(d);
            }
            Ok(())
        }
        Err(EngineError::Compile { line, message }) => {
            log.record_compile_error(display_path, line, &message);
            Ok(())
        }
        Err(err) if options.nofail => {
            warn!(path = %display_path, error = %err, "analysis failed; continuing");
            Ok(())
        }
        Err(err) => Err(ProcessError::Analysis {
            path: input.to_path_buf(),
            message: err.to_string(),
        }),
    }
}

fn run_generate_mode(
    input: &Path,
    output: Option<&Path>,
    options: &RunOptions,
    display_path: &str,
    source: &str,
    log: &mut DiagnosticLog,
) -> Result<(), ProcessError> {
    let text = match generate_stub(source, options) {
        Ok(text) => text,
        Err(EngineError::Compile { line, message }) => {
            // Unparseable source still yields a usable, untyped artifact.
            log.record_compile_error(display_path, line, &message);
            DEFAULT_STUB.to_string()
        }
        Err(err) if options.nofail => {
            warn!(path = %display_path, error = %err, "analysis failed; writing degraded stub");
            degraded_stub(&err)
        }
        Err(err) => {
            return Err(ProcessError::Analysis {
                path: input.to_path_buf(),
                message: err.to_string(),
            })
        }
    };

    write_artifact(&text, output).map_err(|source| ProcessError::FileIo {
        path: output.unwrap_or_else(|| Path::new("-")).to_path_buf(),
        source,
    })
}

/// Runs the full generate pipeline: infer, verify, optimize with the
/// fixed knobs, canonicalize, render.
fn generate_stub(source: &str, options: &RunOptions) -> Result<String, EngineError> {
    let flags = InferFlags {
        run_builtins: options.run_builtins,
        deep: !options.main_only,
        solve_unknowns: !options.quick,
        maximum_depth: if options.quick { 1 } else { 3 },
        cache_unknowns: options.cache_unknowns,
    };

    let (module, builtins) = infer(source, &flags)?;
    verify(&module).map_err(|err| EngineError::Internal(err.to_string()))?;

    let knobs = OptimizeOptions {
        lossy: false,
        use_abcs: false,
        max_union: 7,
        remove_mutable: false,
    };
    let module = optimize(module, &builtins, &knobs);
    let module = canonicalize(module, true);

    let mut text = render(&module);
    if !text.ends_with('\n') {
        text.push('\n');
    }
    if options.quick {
        text = format!("# (generated with --quick)\n{text}");
    }
    Ok(text)
}

/// The nofail fallback artifact: the default stub annotated with the
/// failure, so downstream consumers still get something loadable.
fn degraded_stub(err: &EngineError) -> String {
    let mut text = String::from(DEFAULT_STUB);
    text.push('\n');
    text.push_str("# stub generation failed; module treated as untyped\n");
    for line in err.to_string().lines() {
        text.push_str("# ");
        text.push_str(line);
        text.push('\n');
    }
    let mut cause = std::error::Error::source(err);
    while let Some(c) = cause {
        text.push_str("#   caused by: ");
        text.push_str(&c.to_string());
        text.push('\n');
        cause = c.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_input(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).expect("write input");
        path
    }

    #[test]
    fn generate_writes_a_stub_with_one_trailing_newline() {
        let dir = TempDir::new().expect("tempdir");
        let input = write_input(&dir, "m.py", "def f(x: int) -> str:\n    return \"a\"\n");
        let output = dir.path().join("m.pyi");

        let code = process_source_file(
            &input,
            Some(&output),
            &RunOptions::default(),
            true,
            None,
        )
        .expect("process");
        assert_eq!(code, 0);

        let text = fs::read_to_string(&output).expect("read stub");
        assert_eq!(text, "def f(x: int) -> str: ...\n");
        assert!(text.ends_with('\n'));
        assert!(!text.ends_with("\n\n"));
    }

    #[test]
    fn generate_is_idempotent_for_a_clean_file() {
        let dir = TempDir::new().expect("tempdir");
        let input = write_input(&dir, "m.py", "X = 1\n\ndef f():\n    return X\n");
        let output = dir.path().join("m.pyi");

        process_source_file(&input, Some(&output), &RunOptions::default(), true, None)
            .expect("first run");
        let first = fs::read(&output).expect("read");
        process_source_file(&input, Some(&output), &RunOptions::default(), true, None)
            .expect("second run");
        let second = fs::read(&output).expect("read");
        assert_eq!(first, second);
    }

    #[test]
    fn missing_input_is_fatal_even_under_nofail() {
        let dir = TempDir::new().expect("tempdir");
        let options = RunOptions {
            nofail: true,
            ..Default::default()
        };
        let err = process_source_file(
            &dir.path().join("absent.py"),
            None,
            &options,
            true,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ProcessError::FileIo { .. }));
    }

    #[test]
    fn parse_error_downgrades_to_a_diagnostic_and_default_stub() {
        let dir = TempDir::new().expect("tempdir");
        let input = write_input(&dir, "bad.py", "def broken(\n");
        let output = dir.path().join("bad.pyi");

        let code =
            process_source_file(&input, Some(&output), &RunOptions::default(), true, None)
                .expect("process");
        assert_eq!(code, 1);

        let text = fs::read_to_string(&output).expect("read stub");
        assert_eq!(text, DEFAULT_STUB);
    }

    #[test]
    fn quick_mode_prepends_the_provenance_comment() {
        let dir = TempDir::new().expect("tempdir");
        let input = write_input(&dir, "m.py", "def f():\n    return 1\n");
        let output = dir.path().join("m.pyi");
        let options = RunOptions {
            quick: true,
            ..Default::default()
        };

        process_source_file(&input, Some(&output), &options, true, None).expect("process");
        let text = fs::read_to_string(&output).expect("read stub");
        assert!(text.starts_with("# (generated with --quick)\n"));
    }

    #[test]
    fn check_mode_writes_no_artifact() {
        let dir = TempDir::new().expect("tempdir");
        let input = write_input(&dir, "m.py", "def f():\n    return 1\n");
        let reference = write_input(&dir, "m.pyi", "def f() -> int: ...\n");
        let options = RunOptions {
            check: true,
            ..Default::default()
        };

        let before = fs::read_to_string(&reference).expect("read reference");
        let code = process_source_file(&input, Some(&reference), &options, true, None)
            .expect("process");
        assert_eq!(code, 0);
        assert_eq!(
            fs::read_to_string(&reference).expect("read reference"),
            before
        );
    }

    #[test]
    fn check_mode_missing_reference_is_fatal() {
        let dir = TempDir::new().expect("tempdir");
        let input = write_input(&dir, "m.py", "def f():\n    return 1\n");
        let options = RunOptions {
            check: true,
            nofail: true,
            ..Default::default()
        };

        let err = process_source_file(
            &input,
            Some(&dir.path().join("absent.pyi")),
            &options,
            true,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ProcessError::MissingReference { .. }));
    }

    #[test]
    fn check_mode_reports_errors_via_status() {
        let dir = TempDir::new().expect("tempdir");
        let input = write_input(&dir, "m.py", "def f():\n    return 1\n\ndef g():\n    pass\n");
        let reference = write_input(&dir, "m.pyi", "def f() -> int: ...\n");
        let options = RunOptions {
            check: true,
            ..Default::default()
        };

        let code = process_source_file(&input, Some(&reference), &options, true, None)
            .expect("process");
        assert_eq!(code, 1);
    }

    #[test]
    fn report_errors_off_makes_diagnostics_inert() {
        let dir = TempDir::new().expect("tempdir");
        let input = write_input(&dir, "bad.py", "def broken(\n");
        let options = RunOptions {
            report_errors: false,
            ..Default::default()
        };

        let code = process_source_file(&input, Some(&dir.path().join("bad.pyi")), &options, true, None)
            .expect("process");
        assert_eq!(code, 0);
    }

    #[test]
    fn suppressed_diagnostics_do_not_fail_the_file() {
        let dir = TempDir::new().expect("tempdir");
        let input = write_input(&dir, "m.py", "def g():\n    pass\n");
        let reference = write_input(&dir, "m.pyi", "\n");
        let options = RunOptions {
            check: true,
            disabled_checks: vec!["missing-definition".to_string()],
            ..Default::default()
        };

        let code = process_source_file(&input, Some(&reference), &options, true, None)
            .expect("process");
        assert_eq!(code, 0);
    }

    #[test]
    fn nofail_analysis_failure_writes_annotated_default_stub() {
        let dir = TempDir::new().expect("tempdir");
        // Class nesting past the engine limit is a generic analysis
        // failure rather than a parse error.
        let mut src = String::new();
        for depth in 0..18 {
            src.push_str(&format!("{}class C{depth}:\n", "    ".repeat(depth)));
        }
        src.push_str(&format!("{}x = 1\n", "    ".repeat(18)));
        let input = write_input(&dir, "deep.py", &src);
        let output = dir.path().join("deep.pyi");

        // Without nofail the failure is fatal.
        let err = process_source_file(
            &input,
            Some(&output),
            &RunOptions::default(),
            true,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ProcessError::Analysis { .. }));
        assert!(!output.exists());

        // With nofail a degraded artifact lands, carrying the error text.
        let options = RunOptions {
            nofail: true,
            ..Default::default()
        };
        let code = process_source_file(&input, Some(&output), &options, true, None)
            .expect("process");
        assert_eq!(code, 0);
        let text = fs::read_to_string(&output).expect("read stub");
        assert!(!text.is_empty());
        assert!(text.contains("def __getattr__(name) -> Any: ..."));
        assert!(text.contains("# stub generation failed"));
        assert!(text.contains("class nesting exceeds supported depth"));
    }

    #[test]
    fn degraded_stub_quotes_the_error_as_comments() {
        let err = EngineError::Internal("boom on line one\nand line two".to_string());
        let text = degraded_stub(&err);
        assert!(text.starts_with(DEFAULT_STUB));
        assert!(text.contains("# analysis failed: boom on line one\n"));
        assert!(text.contains("# and line two\n"));
    }
}
