//! Lowers parsed source into a stub description.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use stubsmith_ast::{
    is_identifier, Attribute, BuiltinsContext, Class, Function, Param, ParamKind, Signature,
    StubModule, Type,
};

use crate::parse::{self, find_top_level, split_top_level, ParsedBlock, ParsedClass, ParsedFunction};
use crate::unknowns::resolve_unknown;
use crate::EngineError;

/// Inference switches, derived from the run options by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferFlags {
    /// Resolve builtin literal types. Off means everything untyped is `Any`.
    pub run_builtins: bool,
    /// Scan function bodies for `return` expressions.
    pub deep: bool,
    /// Try to type non-literal expressions (constructor calls).
    pub solve_unknowns: bool,
    /// Class nesting levels to descend into.
    pub maximum_depth: usize,
    /// Share resolved unknowns across files.
    pub cache_unknowns: bool,
}

impl Default for InferFlags {
    fn default() -> Self {
        Self {
            run_builtins: true,
            deep: true,
            solve_unknowns: true,
            maximum_depth: 3,
            cache_unknowns: false,
        }
    }
}

/// Infers a stub description for one module of source text.
pub fn infer(source: &str, flags: &InferFlags) -> Result<(StubModule, BuiltinsContext), EngineError> {
    let parsed = parse::parse_module(source)?;
    let builtins = if flags.run_builtins {
        BuiltinsContext::loaded()
    } else {
        BuiltinsContext::empty()
    };
    let module = lower_block(&parsed, flags, &builtins, 1)?;
    debug!(
        constants = module.constants.len(),
        functions = module.functions.len(),
        classes = module.classes.len(),
        "inferred module"
    );
    Ok((module, builtins))
}

/// Lowers one indentation level. `class_level` is the nesting level any
/// class found here would occupy (1 at module scope).
fn lower_block(
    block: &ParsedBlock,
    flags: &InferFlags,
    builtins: &BuiltinsContext,
    class_level: usize,
) -> Result<StubModule, EngineError> {
    let mut constants = lower_assigns(block, flags, builtins);

    let mut functions: Vec<Function> = Vec::new();
    for f in &block.functions {
        let lowered = lower_function(f, flags, builtins)?;
        match functions.iter_mut().find(|existing| existing.name == lowered.name) {
            // A redefinition contributes another signature.
            Some(existing) => existing.signatures.extend(lowered.signatures),
            None => functions.push(lowered),
        }
    }

    let mut classes: Vec<Class> = Vec::new();
    if class_level <= flags.maximum_depth {
        for c in &block.classes {
            classes.push(lower_class(c, flags, builtins, class_level)?);
        }
    }

    // A name bound both by assignment and by def/class (wrapper
    // reassignment is the common case) keeps only the definition.
    constants.retain(|c| {
        functions.iter().all(|f| f.name != c.name) && classes.iter().all(|k| k.name != c.name)
    });

    Ok(StubModule {
        constants,
        functions,
        classes,
    })
}

fn lower_class(
    c: &ParsedClass,
    flags: &InferFlags,
    builtins: &BuiltinsContext,
    level: usize,
) -> Result<Class, EngineError> {
    let body = lower_block(&c.body, flags, builtins, level + 1)?;
    Ok(Class {
        name: c.name.clone(),
        bases: c.bases.clone(),
        attributes: body.constants,
        methods: body.functions,
        nested: body.classes,
    })
}

fn lower_assigns(
    block: &ParsedBlock,
    flags: &InferFlags,
    builtins: &BuiltinsContext,
) -> Vec<Attribute> {
    let mut out: Vec<Attribute> = Vec::new();
    for a in &block.assigns {
        let ty = match (&a.annotation, &a.value) {
            (Some(ann), _) => parse_annotation(ann),
            (None, Some(value)) => classify_expr(value, flags, builtins),
            (None, None) => Type::Any,
        };
        match out.iter_mut().find(|e| e.name == a.name) {
            Some(existing) => {
                existing.ty = Type::union_of(vec![existing.ty.clone(), ty]);
                existing.reassigned = true;
            }
            None => out.push(Attribute {
                name: a.name.clone(),
                ty,
                reassigned: false,
            }),
        }
    }
    out
}

fn lower_function(
    f: &ParsedFunction,
    flags: &InferFlags,
    builtins: &BuiltinsContext,
) -> Result<Function, EngineError> {
    let params = lower_params(f, flags, builtins)?;

    let ret = match &f.ret_annotation {
        Some(ann) => parse_annotation(ann),
        None if flags.deep => infer_return(f, flags, builtins),
        None => Type::Any,
    };

    Ok(Function {
        name: f.name.clone(),
        decorators: f.decorators.clone(),
        signatures: vec![Signature { params, ret }],
    })
}

fn lower_params(
    f: &ParsedFunction,
    flags: &InferFlags,
    builtins: &BuiltinsContext,
) -> Result<Vec<Param>, EngineError> {
    let mut params = Vec::new();
    for piece in split_top_level(&f.params_src, ',') {
        let piece = piece.trim();
        if piece.is_empty() || piece == "*" || piece == "/" {
            continue;
        }

        let (kind, rest) = if let Some(r) = piece.strip_prefix("**") {
            (ParamKind::StarStar, r)
        } else if let Some(r) = piece.strip_prefix('*') {
            (ParamKind::Star, r)
        } else {
            (ParamKind::Positional, piece)
        };

        let (left, default) = match find_top_level(rest, '=') {
            Some(i) => (&rest[..i], Some(rest[i + 1..].trim())),
            None => (rest, None),
        };
        let (name, annotation) = match find_top_level(left, ':') {
            Some(i) => (left[..i].trim(), Some(left[i + 1..].trim())),
            None => (left.trim(), None),
        };

        if !is_identifier(name) {
            return Err(EngineError::compile(f.line, "invalid parameter list"));
        }

        let ty = match annotation {
            Some(ann) => parse_annotation(ann),
            None => match default {
                Some(expr) => classify_expr(expr, flags, builtins),
                None => Type::Any,
            },
        };

        params.push(Param {
            name: name.to_string(),
            ty,
            has_default: default.is_some(),
            kind,
        });
    }
    Ok(params)
}

/// Types an unannotated function from its literal `return` expressions.
/// No return statement means the function returns `None`.
fn infer_return(f: &ParsedFunction, flags: &InferFlags, builtins: &BuiltinsContext) -> Type {
    let mut arms: Vec<Type> = Vec::new();
    let statements = f
        .body
        .iter()
        .map(|l| l.text.as_str())
        .chain(f.inline_body.as_deref());

    for text in statements {
        let expr = if text == "return" {
            Some("None")
        } else {
            text.strip_prefix("return ").map(str::trim)
        };
        let Some(expr) = expr else { continue };
        let ty = if expr == "None" {
            Type::None
        } else {
            classify_expr(expr, flags, builtins)
        };
        if ty == Type::Any {
            // One untypable return poisons the whole union.
            return Type::Any;
        }
        arms.push(ty);
    }

    if arms.is_empty() {
        Type::None
    } else {
        Type::union_of(arms)
    }
}

// ── Expression and annotation typing ───────────────────────────

fn int_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[+-]?(0[xXoObB][0-9a-fA-F_]+|[0-9][0-9_]*)$").expect("static regex")
    })
}

fn float_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[+-]?([0-9][0-9_]*\.[0-9_]*|\.[0-9][0-9_]*|[0-9][0-9_]*(\.[0-9_]*)?[eE][+-]?[0-9]+)$")
            .expect("static regex")
    })
}

/// Types an expression. Only literals and (under `solve_unknowns`)
/// builtin constructor calls resolve; everything else is `Any`.
pub(crate) fn classify_expr(expr: &str, flags: &InferFlags, builtins: &BuiltinsContext) -> Type {
    if !builtins.is_loaded() {
        return Type::Any;
    }

    let e = expr.trim();
    match e {
        "None" => return Type::None,
        "True" | "False" => return Type::Named("bool".to_string()),
        "..." => return Type::Any,
        _ => {}
    }

    if int_re().is_match(e) {
        return Type::Named("int".to_string());
    }
    if float_re().is_match(e) {
        return Type::Named("float".to_string());
    }

    if let Some(ty) = classify_string_literal(e) {
        return ty;
    }

    if e.starts_with('[') && e.ends_with(']') {
        return Type::Named("list".to_string());
    }
    if e.starts_with('{') && e.ends_with('}') {
        let inner = &e[1..e.len() - 1];
        let name = if inner.trim().is_empty() || find_top_level(inner, ':').is_some() {
            "dict"
        } else {
            "set"
        };
        return Type::Named(name.to_string());
    }
    if e.starts_with('(') && e.ends_with(')') {
        let inner = &e[1..e.len() - 1];
        if find_top_level(inner, ',').is_some() {
            return Type::Named("tuple".to_string());
        }
        // Parenthesized expression, not a tuple.
        return classify_expr(inner, flags, builtins);
    }

    if flags.solve_unknowns {
        if let Some(ty) = resolve_unknown(e, flags.cache_unknowns) {
            return ty;
        }
    }
    Type::Any
}

fn classify_string_literal(e: &str) -> Option<Type> {
    let mut is_bytes = false;
    let mut rest = e;
    for _ in 0..2 {
        match rest.chars().next() {
            Some(c @ ('b' | 'B')) => {
                is_bytes = true;
                rest = &rest[c.len_utf8()..];
            }
            Some(c @ ('r' | 'R' | 'f' | 'F' | 'u' | 'U')) => {
                rest = &rest[c.len_utf8()..];
            }
            _ => break,
        }
    }
    if rest.starts_with('"') || rest.starts_with('\'') {
        let name = if is_bytes { "bytes" } else { "str" };
        return Some(Type::Named(name.to_string()));
    }
    None
}

/// Types an annotation string.
pub(crate) fn parse_annotation(annotation: &str) -> Type {
    let a = annotation.trim();

    // Forward references: "ClassName".
    let a = a
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| a.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
        .unwrap_or(a)
        .trim();

    match a {
        "" | "Any" => return Type::Any,
        "None" => return Type::None,
        _ => {}
    }

    if find_top_level(a, '|').is_some() {
        let arms = split_top_level(a, '|')
            .into_iter()
            .map(parse_annotation)
            .collect();
        return Type::union_of(arms);
    }
    if let Some(inner) = a.strip_prefix("Optional[").and_then(|s| s.strip_suffix(']')) {
        return Type::union_of(vec![parse_annotation(inner), Type::None]);
    }
    if let Some(inner) = a.strip_prefix("Union[").and_then(|s| s.strip_suffix(']')) {
        let arms = split_top_level(inner, ',')
            .into_iter()
            .map(parse_annotation)
            .collect();
        return Type::union_of(arms);
    }

    Type::Named(a.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(n: &str) -> Type {
        Type::Named(n.to_string())
    }

    fn infer_default(source: &str) -> StubModule {
        infer(source, &InferFlags::default()).expect("should infer").0
    }

    #[test]
    fn literal_constants_get_builtin_types() {
        let m = infer_default("A = 1\nB = 1.5\nC = \"s\"\nD = b\"x\"\nE = True\nF = None\n");
        let types: Vec<&Type> = m.constants.iter().map(|c| &c.ty).collect();
        assert_eq!(
            types,
            vec![
                &named("int"),
                &named("float"),
                &named("str"),
                &named("bytes"),
                &named("bool"),
                &Type::None,
            ]
        );
    }

    #[test]
    fn container_literals_classify() {
        let m = infer_default("A = [1, 2]\nB = {\"k\": 1}\nC = {1, 2}\nD = (1, 2)\nE = (1)\n");
        let by_name = |n: &str| {
            m.constants
                .iter()
                .find(|c| c.name == n)
                .map(|c| c.ty.clone())
                .expect("constant present")
        };
        assert_eq!(by_name("A"), named("list"));
        assert_eq!(by_name("B"), named("dict"));
        assert_eq!(by_name("C"), named("set"));
        assert_eq!(by_name("D"), named("tuple"));
        assert_eq!(by_name("E"), named("int"));
    }

    #[test]
    fn annotation_beats_value() {
        let m = infer_default("TIMEOUT: float = 30\n");
        assert_eq!(m.constants[0].ty, named("float"));
    }

    #[test]
    fn reassignment_builds_a_union_and_marks_mutable() {
        let m = infer_default("X = 1\nX = \"s\"\n");
        assert_eq!(m.constants.len(), 1);
        assert_eq!(
            m.constants[0].ty,
            Type::Union(vec![named("int"), named("str")])
        );
        assert!(m.constants[0].reassigned);
    }

    #[test]
    fn params_type_from_annotations_and_defaults() {
        let m = infer_default("def f(a: int, b=\"x\", *args, **kw):\n    pass\n");
        let sig = &m.functions[0].signatures[0];
        assert_eq!(sig.params.len(), 4);
        assert_eq!(sig.params[0].ty, named("int"));
        assert_eq!(sig.params[1].ty, named("str"));
        assert!(sig.params[1].has_default);
        assert_eq!(sig.params[2].kind, ParamKind::Star);
        assert_eq!(sig.params[3].kind, ParamKind::StarStar);
    }

    #[test]
    fn deep_return_inference_unions_literals() {
        let src = "def f(flag):\n    if flag:\n        return 1\n    return \"s\"\n";
        let m = infer_default(src);
        assert_eq!(
            m.functions[0].signatures[0].ret,
            Type::Union(vec![named("int"), named("str")])
        );
    }

    #[test]
    fn no_return_statement_means_none() {
        let m = infer_default("def f():\n    pass\n");
        assert_eq!(m.functions[0].signatures[0].ret, Type::None);
    }

    #[test]
    fn shallow_mode_gives_any_returns() {
        let flags = InferFlags {
            deep: false,
            ..Default::default()
        };
        let (m, _) = infer("def f():\n    return 1\n", &flags).expect("should infer");
        assert_eq!(m.functions[0].signatures[0].ret, Type::Any);
    }

    #[test]
    fn without_builtins_everything_untyped_is_any() {
        let flags = InferFlags {
            run_builtins: false,
            ..Default::default()
        };
        let (m, ctx) = infer("X = 1\n", &flags).expect("should infer");
        assert!(!ctx.is_loaded());
        assert_eq!(m.constants[0].ty, Type::Any);
    }

    #[test]
    fn maximum_depth_prunes_nested_classes() {
        let src = "\
class Outer:
    class Inner:
        class Innermost:
            x = 1
";
        let quick = InferFlags {
            maximum_depth: 1,
            ..Default::default()
        };
        let (m, _) = infer(src, &quick).expect("should infer");
        assert_eq!(m.classes.len(), 1);
        assert!(m.classes[0].nested.is_empty());

        let full = InferFlags::default();
        let (m, _) = infer(src, &full).expect("should infer");
        assert_eq!(m.classes[0].nested[0].name, "Inner");
        assert_eq!(m.classes[0].nested[0].nested[0].name, "Innermost");
    }

    #[test]
    fn redefinition_merges_signatures() {
        let src = "def f(a):\n    return 1\n\ndef f(a, b):\n    return 2\n";
        let m = infer_default(src);
        assert_eq!(m.functions.len(), 1);
        assert_eq!(m.functions[0].signatures.len(), 2);
    }

    #[test]
    fn wrapper_reassignment_keeps_the_def() {
        let src = "def f():\n    return 1\n\nf = wrapped(f)\n";
        let m = infer_default(src);
        assert!(m.constants.is_empty());
        assert_eq!(m.functions.len(), 1);
    }

    #[test]
    fn constructor_calls_solve_as_unknowns() {
        let m = infer_default("X = int(raw)\n");
        assert_eq!(m.constants[0].ty, named("int"));

        let quick = InferFlags {
            solve_unknowns: false,
            ..Default::default()
        };
        let (m, _) = infer("X = int(raw)\n", &quick).expect("should infer");
        assert_eq!(m.constants[0].ty, Type::Any);
    }

    #[test]
    fn annotations_parse_unions_and_optionals() {
        assert_eq!(
            parse_annotation("int | None"),
            Type::Union(vec![named("int"), Type::None])
        );
        assert_eq!(
            parse_annotation("Optional[str]"),
            Type::Union(vec![named("str"), Type::None])
        );
        assert_eq!(
            parse_annotation("Union[int, str]"),
            Type::Union(vec![named("int"), named("str")])
        );
        assert_eq!(parse_annotation("\"Config\""), named("Config"));
        assert_eq!(parse_annotation("list[int]"), named("list[int]"));
    }
}
