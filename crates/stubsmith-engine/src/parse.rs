//! Logical-line parsing of Python source.
//!
//! Physical lines are joined into logical lines (open brackets, trailing
//! backslashes, and triple-quoted strings continue a statement), comments
//! are stripped, and the top-level constructs the engine cares about are
//! extracted with their 1-based line numbers.

use std::sync::OnceLock;

use regex::Regex;

use crate::{EngineError, MAX_CLASS_NESTING};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LogicalLine {
    /// 1-based number of the first physical line.
    pub number: u32,
    /// Indentation of the first physical line (spaces; tab counts as 4).
    pub indent: usize,
    /// Joined statement text, comments stripped, surrounding space trimmed.
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParsedFunction {
    pub line: u32,
    pub name: String,
    pub decorators: Vec<String>,
    /// Raw text between the parameter parentheses.
    pub params_src: String,
    pub ret_annotation: Option<String>,
    /// Statement text following the header's colon on the same line.
    pub inline_body: Option<String>,
    /// Indented body statements.
    pub body: Vec<LogicalLine>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParsedAssign {
    pub line: u32,
    pub name: String,
    pub annotation: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParsedClass {
    pub line: u32,
    pub name: String,
    pub bases: Vec<String>,
    pub body: ParsedBlock,
}

/// The constructs found at one indentation level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ParsedBlock {
    pub assigns: Vec<ParsedAssign>,
    pub functions: Vec<ParsedFunction>,
    pub classes: Vec<ParsedClass>,
}

pub(crate) fn parse_module(source: &str) -> Result<ParsedBlock, EngineError> {
    let lines = logical_lines(source)?;
    if let Some(first) = lines.first() {
        if first.indent > 0 {
            return Err(EngineError::compile(first.number, "unexpected indent"));
        }
    }
    parse_block(&lines, 0, 0)
}

// ── Logical line assembly ──────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StrMode {
    None,
    Single { quote: char },
    Triple { quote: char, start_line: u32 },
}

enum LineEnd {
    /// Statement may end here (if brackets are balanced).
    Normal,
    /// Explicit continuation: trailing backslash or an open string.
    Continuation,
}

fn logical_lines(source: &str) -> Result<Vec<LogicalLine>, EngineError> {
    let mut out = Vec::new();
    let mut start_line = 0u32;
    let mut indent = 0usize;
    let mut text = String::new();
    let mut open = false;
    let mut depth: i32 = 0;
    let mut mode = StrMode::None;

    for (idx, raw) in source.lines().enumerate() {
        let lineno = idx as u32 + 1;

        let scan_from = if !open {
            let (cols, bytes) = leading_indent(raw);
            start_line = lineno;
            indent = cols;
            text.clear();
            open = true;
            bytes
        } else if matches!(mode, StrMode::None) {
            // Collapse the join point to a single space.
            while text.ends_with(' ') {
                text.pop();
            }
            text.push(' ');
            leading_indent(raw).1
        } else {
            text.push(' ');
            0
        };

        let end = scan_physical_line(&raw[scan_from..], lineno, &mut mode, &mut depth, &mut text)?;

        let continues =
            matches!(end, LineEnd::Continuation) || depth > 0 || !matches!(mode, StrMode::None);
        if !continues {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                out.push(LogicalLine {
                    number: start_line,
                    indent,
                    text: trimmed.to_string(),
                });
            }
            open = false;
        }
    }

    if let StrMode::Triple {
        start_line: opened, ..
    } = mode
    {
        return Err(EngineError::compile(
            opened,
            "unterminated triple-quoted string",
        ));
    }
    if open {
        if depth > 0 {
            return Err(EngineError::compile(start_line, "'(' was never closed"));
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            out.push(LogicalLine {
                number: start_line,
                indent,
                text: trimmed.to_string(),
            });
        }
    }

    Ok(out)
}

/// Scans one physical line, appending statement text (comments stripped,
/// strings kept verbatim) and updating bracket/string state.
fn scan_physical_line(
    line: &str,
    lineno: u32,
    mode: &mut StrMode,
    depth: &mut i32,
    out: &mut String,
) -> Result<LineEnd, EngineError> {
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match *mode {
            StrMode::Triple { quote, .. } => {
                if c == '\\' && i + 1 < chars.len() {
                    out.push(c);
                    out.push(chars[i + 1]);
                    i += 2;
                } else if c == quote
                    && chars.get(i + 1) == Some(&quote)
                    && chars.get(i + 2) == Some(&quote)
                {
                    out.push(quote);
                    out.push(quote);
                    out.push(quote);
                    i += 3;
                    *mode = StrMode::None;
                } else {
                    out.push(c);
                    i += 1;
                }
            }
            StrMode::Single { quote } => {
                if c == '\\' {
                    if i + 1 < chars.len() {
                        out.push(c);
                        out.push(chars[i + 1]);
                        i += 2;
                    } else {
                        // Backslash-newline inside the literal.
                        return Ok(LineEnd::Continuation);
                    }
                } else {
                    out.push(c);
                    if c == quote {
                        *mode = StrMode::None;
                    }
                    i += 1;
                }
            }
            StrMode::None => match c {
                '#' => break,
                '"' | '\'' => {
                    if chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c) {
                        *mode = StrMode::Triple {
                            quote: c,
                            start_line: lineno,
                        };
                        out.push(c);
                        out.push(c);
                        out.push(c);
                        i += 3;
                    } else {
                        *mode = StrMode::Single { quote: c };
                        out.push(c);
                        i += 1;
                    }
                }
                '(' | '[' | '{' => {
                    *depth += 1;
                    out.push(c);
                    i += 1;
                }
                ')' | ']' | '}' => {
                    *depth -= 1;
                    if *depth < 0 {
                        return Err(EngineError::compile(lineno, format!("unmatched '{c}'")));
                    }
                    out.push(c);
                    i += 1;
                }
                '\\' if i == chars.len() - 1 => {
                    return Ok(LineEnd::Continuation);
                }
                _ => {
                    out.push(c);
                    i += 1;
                }
            },
        }
    }

    if matches!(*mode, StrMode::Single { .. }) {
        return Err(EngineError::compile(lineno, "unterminated string literal"));
    }
    Ok(LineEnd::Normal)
}

fn leading_indent(line: &str) -> (usize, usize) {
    let mut cols = 0;
    let mut bytes = 0;
    for c in line.chars() {
        match c {
            ' ' => cols += 1,
            '\t' => cols += 4,
            _ => break,
        }
        bytes += c.len_utf8();
    }
    (cols, bytes)
}

// ── Block parsing ──────────────────────────────────────────────

const KEYWORDS: &[&str] = &[
    "import", "from", "if", "elif", "else", "for", "while", "try", "except", "finally", "with",
    "return", "yield", "raise", "assert", "del", "pass", "break", "continue", "global", "nonlocal",
    "lambda", "match", "case",
];

fn def_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:async\s+)?def\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(").expect("static regex")
    })
}

fn class_head_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^class\s+([A-Za-z_][A-Za-z0-9_]*)\s*").expect("static regex"))
}

fn annotated_assign_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*:\s*([^=]+?)(?:\s*=\s*(.+))?$")
            .expect("static regex")
    })
}

fn plain_assign_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.+)$").expect("static regex"))
}

fn parse_block(
    lines: &[LogicalLine],
    nesting: usize,
    base_indent: usize,
) -> Result<ParsedBlock, EngineError> {
    if nesting > MAX_CLASS_NESTING {
        return Err(EngineError::Internal(format!(
            "class nesting exceeds supported depth of {MAX_CLASS_NESTING}"
        )));
    }

    let mut block = ParsedBlock::default();
    let mut decorators: Vec<String> = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = &lines[i];
        if line.indent != base_indent {
            // Body of an uncaptured construct (if/try/with...); skip.
            decorators.clear();
            i += 1;
            continue;
        }

        if let Some(rest) = line.text.strip_prefix('@') {
            let name = rest
                .split(|c: char| c == '(' || c.is_whitespace())
                .next()
                .unwrap_or("")
                .to_string();
            decorators.push(name);
            i += 1;
            continue;
        }

        if is_def_statement(&line.text) {
            let end = block_end(lines, i, base_indent);
            let mut f = parse_def_header(line)?;
            f.decorators = std::mem::take(&mut decorators);
            f.body = lines[i + 1..end].to_vec();
            block.functions.push(f);
            i = end;
            continue;
        }

        if starts_construct(&line.text, "class") {
            let end = block_end(lines, i, base_indent);
            let (name, bases) = parse_class_header(line)?;
            let body_lines = &lines[i + 1..end];
            let body = if body_lines.is_empty() {
                ParsedBlock::default()
            } else {
                parse_block(body_lines, nesting + 1, body_lines[0].indent)?
            };
            block.classes.push(ParsedClass {
                line: line.number,
                name,
                bases,
                body,
            });
            decorators.clear();
            i = end;
            continue;
        }

        decorators.clear();

        if is_keyword_statement(&line.text) {
            i += 1;
            continue;
        }

        if let Some(assign) = match_assign(line) {
            block.assigns.push(assign);
        }
        i += 1;
    }

    Ok(block)
}

/// Index one past the last body line of the construct starting at `start`.
fn block_end(lines: &[LogicalLine], start: usize, base_indent: usize) -> usize {
    let mut end = start + 1;
    while end < lines.len() && lines[end].indent > base_indent {
        end += 1;
    }
    end
}

fn starts_construct(text: &str, keyword: &str) -> bool {
    match text.strip_prefix(keyword) {
        Some(rest) => rest.starts_with(|c: char| c.is_whitespace()),
        None => false,
    }
}

fn is_def_statement(text: &str) -> bool {
    let mut words = text.split_whitespace();
    match words.next() {
        Some("def") => true,
        // `async for`/`async with` are plain statements, not defs.
        Some("async") => words.next() == Some("def"),
        _ => false,
    }
}

fn is_keyword_statement(text: &str) -> bool {
    let first = text
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .next()
        .unwrap_or("");
    KEYWORDS.contains(&first)
}

fn match_assign(line: &LogicalLine) -> Option<ParsedAssign> {
    if let Some(caps) = annotated_assign_re().captures(&line.text) {
        return Some(ParsedAssign {
            line: line.number,
            name: caps[1].to_string(),
            annotation: Some(caps[2].trim().to_string()),
            value: caps.get(3).map(|m| m.as_str().trim().to_string()),
        });
    }
    if let Some(caps) = plain_assign_re().captures(&line.text) {
        let value = caps[2].trim().to_string();
        // `x == y` is a comparison, not an assignment.
        if value.starts_with('=') {
            return None;
        }
        return Some(ParsedAssign {
            line: line.number,
            name: caps[1].to_string(),
            annotation: None,
            value: Some(value),
        });
    }
    None
}

fn parse_def_header(line: &LogicalLine) -> Result<ParsedFunction, EngineError> {
    let caps = def_name_re()
        .captures(&line.text)
        .ok_or_else(|| EngineError::compile(line.number, "invalid function definition"))?;
    let name = caps[1].to_string();
    let params_start = caps.get(0).map(|m| m.end()).unwrap_or(0);

    let (params_src, after_params) = take_until_close_paren(&line.text[params_start..])
        .ok_or_else(|| EngineError::compile(line.number, "'(' was never closed"))?;

    let rest = after_params.trim_start();
    let (ret_annotation, rest) = match rest.strip_prefix("->") {
        Some(tail) => {
            let colon = find_top_level(tail, ':')
                .ok_or_else(|| EngineError::compile(line.number, "expected ':'"))?;
            (
                Some(tail[..colon].trim().to_string()),
                &tail[colon + 1..],
            )
        }
        None => {
            let colon = find_top_level(rest, ':')
                .ok_or_else(|| EngineError::compile(line.number, "expected ':'"))?;
            (None, &rest[colon + 1..])
        }
    };

    let inline = rest.trim();
    Ok(ParsedFunction {
        line: line.number,
        name,
        decorators: Vec::new(),
        params_src: params_src.trim().to_string(),
        ret_annotation,
        inline_body: if inline.is_empty() {
            None
        } else {
            Some(inline.to_string())
        },
        body: Vec::new(),
    })
}

fn parse_class_header(line: &LogicalLine) -> Result<(String, Vec<String>), EngineError> {
    let caps = class_head_re()
        .captures(&line.text)
        .ok_or_else(|| EngineError::compile(line.number, "invalid class definition"))?;
    let name = caps[1].to_string();
    let rest = &line.text[caps.get(0).map(|m| m.end()).unwrap_or(0)..];
    let rest = rest.trim_start();

    let (bases, rest) = if let Some(tail) = rest.strip_prefix('(') {
        let (inner, after) = take_until_close_paren(tail)
            .ok_or_else(|| EngineError::compile(line.number, "'(' was never closed"))?;
        let bases = split_top_level(inner, ',')
            .into_iter()
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty())
            .collect();
        (bases, after.trim_start())
    } else {
        (Vec::new(), rest)
    };

    if !rest.starts_with(':') {
        return Err(EngineError::compile(line.number, "expected ':'"));
    }
    Ok((name, bases))
}

// ── Small string scanners ──────────────────────────────────────
// These run on single logical lines, where strings are already closed
// and brackets balanced.

/// Splits off the text up to the `)` matching an already-consumed `(`.
/// Returns the inner text and the remainder after the `)`.
pub(crate) fn take_until_close_paren(s: &str) -> Option<(&str, &str)> {
    let mut depth = 0i32;
    let mut string: Option<char> = None;
    let mut escaped = false;
    for (idx, c) in s.char_indices() {
        if let Some(q) = string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                string = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => string = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' if depth == 0 => return Some((&s[..idx], &s[idx + 1..])),
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
    }
    None
}

/// Splits on a separator at bracket depth zero, outside string literals.
pub(crate) fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut depth = 0i32;
    let mut string: Option<char> = None;
    let mut escaped = false;
    for (idx, c) in s.char_indices() {
        if let Some(q) = string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                string = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => string = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            c2 if c2 == sep && depth == 0 => {
                parts.push(&s[start..idx]);
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Byte index of the first `needle` at bracket depth zero, outside strings.
pub(crate) fn find_top_level(s: &str, needle: char) -> Option<usize> {
    let mut depth = 0i32;
    let mut string: Option<char> = None;
    let mut escaped = false;
    for (idx, c) in s.char_indices() {
        if let Some(q) = string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                string = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => string = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            c2 if c2 == needle && depth == 0 => return Some(idx),
            _ => {}
        }
    }
    None
}
