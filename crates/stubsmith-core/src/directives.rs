//! In-source suppression directives.
//!
//! A file can hide specific checks from reporting:
//!
//! ```python
//! x = compute()  # stubsmith: disable=signature-mismatch
//! # stubsmith: disable=missing-definition
//! ...
//! # stubsmith: enable=missing-definition
//! ```
//!
//! A directive trailing a statement applies to that line only. A directive
//! on its own line opens a region that runs until a matching `enable` or
//! the end of the file. The filter is built from the raw source bytes,
//! before any decoding, so it exists before the first diagnostic is
//! recorded.

use std::collections::{HashMap, HashSet};

use stubsmith_types::Diagnostic;

use crate::diagnostics::ReportFilter;

const DIRECTIVE_MARKER: &str = "stubsmith:";

/// Builds the per-file report filter from in-source annotations plus the
/// run-wide disabled check set. Returns true for diagnostics to keep.
pub fn build_report_filter(raw_source: &[u8], disabled_checks: &[String]) -> ReportFilter {
    let index = DirectiveIndex::scan(raw_source);
    let disabled: HashSet<String> = disabled_checks.iter().cloned().collect();
    Box::new(move |d: &Diagnostic| {
        if disabled.contains(&d.kind) {
            return false;
        }
        !index.is_suppressed(&d.kind, d.line)
    })
}

#[derive(Debug, Default)]
struct DirectiveIndex {
    /// Check name -> single lines it is suppressed on.
    lines: HashMap<String, HashSet<u32>>,
    /// Check name -> inclusive suppressed line ranges.
    ranges: HashMap<String, Vec<(u32, u32)>>,
}

impl DirectiveIndex {
    fn scan(raw_source: &[u8]) -> Self {
        let mut index = DirectiveIndex::default();
        // Open `disable` regions awaiting their `enable`.
        let mut open: HashMap<String, u32> = HashMap::new();

        for (idx, raw_line) in raw_source.split(|b| *b == b'\n').enumerate() {
            let lineno = idx as u32 + 1;
            let line = String::from_utf8_lossy(raw_line);
            let Some((before_comment, directive)) = split_directive(&line) else {
                continue;
            };
            let whole_line = before_comment.trim().is_empty();

            match directive {
                Directive::Disable(checks) => {
                    for check in checks {
                        if whole_line {
                            open.entry(check).or_insert(lineno);
                        } else {
                            index.lines.entry(check).or_default().insert(lineno);
                        }
                    }
                }
                Directive::Enable(checks) => {
                    for check in checks {
                        if let Some(start) = open.remove(&check) {
                            index.ranges.entry(check).or_default().push((start, lineno));
                        }
                    }
                }
            }
        }

        for (check, start) in open {
            index.ranges.entry(check).or_default().push((start, u32::MAX));
        }
        index
    }

    fn is_suppressed(&self, check: &str, line: u32) -> bool {
        if self
            .lines
            .get(check)
            .is_some_and(|lines| lines.contains(&line))
        {
            return true;
        }
        self.ranges
            .get(check)
            .is_some_and(|ranges| ranges.iter().any(|(start, end)| line >= *start && line <= *end))
    }
}

enum Directive {
    Disable(Vec<String>),
    Enable(Vec<String>),
}

/// Splits a line into the code before the comment and a parsed directive,
/// if the comment carries one.
fn split_directive(line: &str) -> Option<(&str, Directive)> {
    let hash = line.find('#')?;
    let (before, comment) = line.split_at(hash);

    let marker = comment.find(DIRECTIVE_MARKER)?;
    let rest = comment[marker + DIRECTIVE_MARKER.len()..].trim();

    if let Some(names) = rest.strip_prefix("disable=") {
        return Some((before, Directive::Disable(parse_checks(names))));
    }
    if let Some(names) = rest.strip_prefix("enable=") {
        return Some((before, Directive::Enable(parse_checks(names))));
    }
    None
}

fn parse_checks(names: &str) -> Vec<String> {
    names
        .split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect()
}
