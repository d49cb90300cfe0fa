//! The structured diagnostic report: a CSV file accumulated across the
//! whole batch, one row per diagnostic (RFC 4180 escaping).

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use stubsmith_types::Diagnostic;

/// CSV header row.
const CSV_HEADER: &str = "file,line,message,kind";

/// Incremental CSV sink for the whole run.
///
/// Rows are appended once per file by the single thread of control and
/// flushed as they land, so a crashed run still leaves the completed
/// files' rows behind. Dropping the sink flushes; the success path calls
/// [`CsvReportSink::finish`] to surface write errors.
pub struct CsvReportSink {
    writer: BufWriter<File>,
    rows: u64,
}

impl CsvReportSink {
    pub fn create(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "{CSV_HEADER}")?;
        Ok(Self { writer, rows: 0 })
    }

    pub fn append(&mut self, diagnostics: &[Diagnostic]) -> io::Result<()> {
        for d in diagnostics {
            writeln!(
                self.writer,
                "{},{},{},{}",
                escape_csv_field(&d.path),
                d.line,
                escape_csv_field(&d.message),
                escape_csv_field(&d.kind)
            )?;
            self.rows += 1;
        }
        self.writer.flush()
    }

    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    pub fn finish(mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Escapes a field for CSV according to RFC 4180.
///
/// Fields containing commas, double quotes, or newlines are quoted.
/// Double quotes within the field are escaped by doubling them.
fn escape_csv_field(s: &str) -> String {
    let needs_quoting = s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r');

    if needs_quoting {
        let escaped = s.replace('"', "\"\"");
        format!("\"{}\"", escaped)
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stubsmith_types::CHECK_COMPILE_ERROR;

    #[test]
    fn escape_csv_field_plain_text() {
        assert_eq!(escape_csv_field("plain text"), "plain text");
    }

    #[test]
    fn escape_csv_field_with_comma() {
        assert_eq!(escape_csv_field("a,b"), "\"a,b\"");
    }

    #[test]
    fn escape_csv_field_with_quote() {
        assert_eq!(escape_csv_field("say \"hello\""), "\"say \"\"hello\"\"\"");
    }

    #[test]
    fn escape_csv_field_with_newline() {
        assert_eq!(escape_csv_field("line1\nline2"), "\"line1\nline2\"");
    }

    #[test]
    fn sink_writes_header_and_rows() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("report.csv");

        let mut sink = CsvReportSink::create(&path).expect("create sink");
        sink.append(&[
            Diagnostic::error("a.py", 3, CHECK_COMPILE_ERROR, "bad, syntax"),
            Diagnostic::warning("b.py", 0, "some-check", "stale"),
        ])
        .expect("append rows");
        assert_eq!(sink.rows_written(), 2);
        sink.finish().expect("finish");

        let text = std::fs::read_to_string(&path).expect("read report");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "file,line,message,kind");
        assert_eq!(lines[1], "a.py,3,\"bad, syntax\",compile-error");
        assert_eq!(lines[2], "b.py,0,stale,some-check");
    }

    #[test]
    fn sink_creates_missing_parent_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/deep/report.csv");
        let sink = CsvReportSink::create(&path).expect("create sink");
        sink.finish().expect("finish");
        assert!(path.exists());
    }
}
