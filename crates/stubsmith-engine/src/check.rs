//! Check mode: compares parsed source against a reference stub.

use stubsmith_ast::StubModule;
use stubsmith_types::{
    Diagnostic, CHECK_MISSING_DEFINITION, CHECK_OBSOLETE_DEFINITION, CHECK_SIGNATURE_MISMATCH,
};

use crate::parse::{self, split_top_level, ParsedBlock, ParsedFunction};
use crate::infer::{infer, InferFlags};
use crate::EngineError;

/// Checking switches, derived from the run options by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckFlags {
    pub run_builtins: bool,
    /// Also compare class methods, not just top-level names.
    pub deep: bool,
    pub cache_unknowns: bool,
}

impl Default for CheckFlags {
    fn default() -> Self {
        Self {
            run_builtins: true,
            deep: true,
            cache_unknowns: false,
        }
    }
}

/// Parses a previously generated stub into a reference description.
pub fn load_reference(text: &str) -> Result<StubModule, EngineError> {
    let flags = InferFlags {
        run_builtins: true,
        deep: false,
        solve_unknowns: false,
        maximum_depth: 3,
        cache_unknowns: false,
    };
    let (module, _) = infer(text, &flags)?;
    Ok(module)
}

/// Checks source text against an optional reference description.
///
/// Without a reference there is nothing to compare; the call still fails
/// with [`EngineError::Compile`] on unparseable source.
pub fn check(
    path: &str,
    source: &str,
    reference: Option<&StubModule>,
    flags: &CheckFlags,
) -> Result<Vec<Diagnostic>, EngineError> {
    let parsed = parse::parse_module(source)?;
    let Some(reference) = reference else {
        return Ok(Vec::new());
    };

    let mut diags = Vec::new();
    compare_block(path, &parsed, reference, flags, &mut diags);
    Ok(diags)
}

fn compare_block(
    path: &str,
    parsed: &ParsedBlock,
    reference: &StubModule,
    flags: &CheckFlags,
    diags: &mut Vec<Diagnostic>,
) {
    let mut seen_functions: Vec<&str> = Vec::new();
    for f in &parsed.functions {
        if seen_functions.contains(&f.name.as_str()) {
            continue;
        }
        seen_functions.push(&f.name);

        match reference.functions.iter().find(|r| r.name == f.name) {
            None => diags.push(Diagnostic::error(
                path,
                f.line,
                CHECK_MISSING_DEFINITION,
                format!("function '{}' is not declared in the reference description", f.name),
            )),
            Some(r) => compare_arity(path, f, &r.signatures, diags),
        }
    }

    let mut seen_classes: Vec<&str> = Vec::new();
    for c in &parsed.classes {
        if seen_classes.contains(&c.name.as_str()) {
            continue;
        }
        seen_classes.push(&c.name);

        match reference.classes.iter().find(|r| r.name == c.name) {
            None => diags.push(Diagnostic::error(
                path,
                c.line,
                CHECK_MISSING_DEFINITION,
                format!("class '{}' is not declared in the reference description", c.name),
            )),
            Some(r) if flags.deep => {
                let mut seen_methods: Vec<&str> = Vec::new();
                for m in &c.body.functions {
                    if seen_methods.contains(&m.name.as_str()) {
                        continue;
                    }
                    seen_methods.push(&m.name);

                    match r.methods.iter().find(|rm| rm.name == m.name) {
                        None => diags.push(Diagnostic::error(
                            path,
                            m.line,
                            CHECK_MISSING_DEFINITION,
                            format!(
                                "method '{}.{}' is not declared in the reference description",
                                c.name, m.name
                            ),
                        )),
                        Some(rm) => compare_arity(path, m, &rm.signatures, diags),
                    }
                }
            }
            Some(_) => {}
        }
    }

    let mut seen_constants: Vec<&str> = Vec::new();
    for a in &parsed.assigns {
        if seen_constants.contains(&a.name.as_str()) {
            continue;
        }
        seen_constants.push(&a.name);

        // Names redefined as functions or classes are not constants.
        if seen_functions.contains(&a.name.as_str()) || seen_classes.contains(&a.name.as_str()) {
            continue;
        }
        if reference.constants.iter().all(|r| r.name != a.name) {
            diags.push(Diagnostic::error(
                path,
                a.line,
                CHECK_MISSING_DEFINITION,
                format!("constant '{}' is not declared in the reference description", a.name),
            ));
        }
    }

    // The reverse direction: reference entries with no source definition.
    for r in &reference.functions {
        if !seen_functions.contains(&r.name.as_str()) {
            diags.push(obsolete(path, "function", &r.name));
        }
    }
    for r in &reference.classes {
        if !seen_classes.contains(&r.name.as_str()) {
            diags.push(obsolete(path, "class", &r.name));
        }
    }
    for r in &reference.constants {
        if !seen_constants.contains(&r.name.as_str()) {
            diags.push(obsolete(path, "constant", &r.name));
        }
    }
}

fn obsolete(path: &str, what: &str, name: &str) -> Diagnostic {
    Diagnostic::warning(
        path,
        0,
        CHECK_OBSOLETE_DEFINITION,
        format!("{what} '{name}' in the reference description has no definition in the source"),
    )
}

fn compare_arity(
    path: &str,
    f: &ParsedFunction,
    reference_signatures: &[stubsmith_ast::Signature],
    diags: &mut Vec<Diagnostic>,
) {
    let actual = count_params(&f.params_src);
    if reference_signatures
        .iter()
        .any(|sig| sig.params.len() == actual)
    {
        return;
    }
    let declared = reference_signatures
        .first()
        .map(|sig| sig.params.len())
        .unwrap_or(0);
    diags.push(Diagnostic::error(
        path,
        f.line,
        CHECK_SIGNATURE_MISMATCH,
        format!(
            "function '{}' takes {actual} parameter(s) but the reference declares {declared}",
            f.name
        ),
    ));
}

fn count_params(params_src: &str) -> usize {
    split_top_level(params_src, ',')
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty() && *p != "*" && *p != "/")
        .count()
}
