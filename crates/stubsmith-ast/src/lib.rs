//! The type-stub description AST and the passes that shape it.
//!
//! A [`StubModule`] is the engine's view of one Python module: constants,
//! functions, and classes with their inferred or declared types. The passes
//! here run in a fixed order on every generated stub: [`verify`] (internal
//! consistency), [`optimize`] (union normalization and signature dedup),
//! [`canonicalize`] (stable ordering), then [`render`] (text).

mod optimize;
mod render;

pub use optimize::{optimize, OptimizeOptions};
pub use render::render;

/// A type expression as it appears in a stub.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Type {
    /// The unknown/dynamic type.
    Any,
    /// `None` (the NoneType singleton).
    None,
    /// A named type, kept verbatim from the annotation or literal
    /// classification (e.g. `int`, `list[str]`).
    Named(String),
    /// A union of alternatives, rendered `a | b`.
    Union(Vec<Type>),
}

impl Type {
    /// Builds a union from alternatives, flattening nested unions and
    /// dropping duplicates while preserving first-seen order. An empty
    /// input collapses to `Any`, a single alternative to itself.
    pub fn union_of(types: Vec<Type>) -> Type {
        let mut arms: Vec<Type> = Vec::new();
        for t in types {
            match t {
                Type::Union(inner) => {
                    for arm in inner {
                        if !arms.contains(&arm) {
                            arms.push(arm);
                        }
                    }
                }
                other => {
                    if !arms.contains(&other) {
                        arms.push(other);
                    }
                }
            }
        }
        match arms.len() {
            0 => Type::Any,
            1 => arms.remove(0),
            _ => Type::Union(arms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ParamKind {
    Positional,
    /// `*args`
    Star,
    /// `**kwargs`
    StarStar,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Param {
    pub name: String,
    pub ty: Type,
    pub has_default: bool,
    pub kind: ParamKind,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Signature {
    pub params: Vec<Param>,
    pub ret: Type,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub decorators: Vec<String>,
    pub signatures: Vec<Signature>,
}

/// A module constant or class attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub ty: Type,
    /// True when the source assigns this name more than once.
    pub reassigned: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Class {
    pub name: String,
    pub bases: Vec<String>,
    pub attributes: Vec<Attribute>,
    pub methods: Vec<Function>,
    pub nested: Vec<Class>,
}

/// The stub description of one module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StubModule {
    pub constants: Vec<Attribute>,
    pub functions: Vec<Function>,
    pub classes: Vec<Class>,
}

impl StubModule {
    pub fn is_empty(&self) -> bool {
        self.constants.is_empty() && self.functions.is_empty() && self.classes.is_empty()
    }
}

/// Builtins knowledge handed from the engine to the optimizer.
///
/// When not loaded, the optimizer never widens unions to abstract numeric
/// bases, because it cannot tell the numeric tower apart.
#[derive(Debug, Clone, Default)]
pub struct BuiltinsContext {
    loaded: bool,
}

impl BuiltinsContext {
    pub fn loaded() -> Self {
        Self { loaded: true }
    }

    pub fn empty() -> Self {
        Self { loaded: false }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Widens a pair of numeric types to their common base, per the
    /// builtin numeric tower (bool < int < float < complex).
    pub fn widen_pair(&self, a: &Type, b: &Type) -> Option<Type> {
        if !self.loaded {
            return None;
        }
        let rank = |t: &Type| match t {
            Type::Named(n) => match n.as_str() {
                "bool" => Some(0),
                "int" => Some(1),
                "float" => Some(2),
                "complex" => Some(3),
                _ => None,
            },
            _ => None,
        };
        let (ra, rb) = (rank(a)?, rank(b)?);
        Some(if ra >= rb { a.clone() } else { b.clone() })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("invalid identifier '{name}'")]
    InvalidName { name: String },
    #[error("duplicate definition '{name}'")]
    DuplicateName { name: String },
    #[error("function '{name}' has no signatures")]
    EmptySignatures { name: String },
}

/// Checks a stub description for internal consistency before it is
/// optimized and rendered. A failure here is an engine bug surfacing as a
/// generic analysis failure, not a user error.
pub fn verify(module: &StubModule) -> Result<(), VerifyError> {
    let mut seen = std::collections::HashSet::new();
    for c in &module.constants {
        verify_name(&c.name, &mut seen)?;
    }
    for f in &module.functions {
        verify_name(&f.name, &mut seen)?;
        verify_function(f)?;
    }
    for c in &module.classes {
        verify_name(&c.name, &mut seen)?;
        verify_class(c)?;
    }
    Ok(())
}

fn verify_class(class: &Class) -> Result<(), VerifyError> {
    let mut seen = std::collections::HashSet::new();
    for a in &class.attributes {
        verify_name(&a.name, &mut seen)?;
    }
    for m in &class.methods {
        verify_name(&m.name, &mut seen)?;
        verify_function(m)?;
    }
    for n in &class.nested {
        verify_name(&n.name, &mut seen)?;
        verify_class(n)?;
    }
    Ok(())
}

fn verify_function(f: &Function) -> Result<(), VerifyError> {
    if f.signatures.is_empty() {
        return Err(VerifyError::EmptySignatures {
            name: f.name.clone(),
        });
    }
    Ok(())
}

fn verify_name(
    name: &str,
    seen: &mut std::collections::HashSet<String>,
) -> Result<(), VerifyError> {
    if !is_identifier(name) {
        return Err(VerifyError::InvalidName {
            name: name.to_string(),
        });
    }
    if !seen.insert(name.to_string()) {
        return Err(VerifyError::DuplicateName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// True for a valid Python identifier (ASCII subset).
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Reorders a stub description into its stable output order: every item
/// group sorted by name, union arms sorted, and (optionally) each
/// function's signatures sorted.
pub fn canonicalize(mut module: StubModule, sort_signatures: bool) -> StubModule {
    module.constants.sort_by(|a, b| a.name.cmp(&b.name));
    module.functions.sort_by(|a, b| a.name.cmp(&b.name));
    module.classes.sort_by(|a, b| a.name.cmp(&b.name));
    for c in &mut module.constants {
        c.ty = sort_union_arms(c.ty.clone());
    }
    for f in &mut module.functions {
        canonicalize_function(f, sort_signatures);
    }
    for c in &mut module.classes {
        canonicalize_class(c, sort_signatures);
    }
    module
}

fn canonicalize_class(class: &mut Class, sort_signatures: bool) {
    class.attributes.sort_by(|a, b| a.name.cmp(&b.name));
    class.methods.sort_by(|a, b| a.name.cmp(&b.name));
    class.nested.sort_by(|a, b| a.name.cmp(&b.name));
    for a in &mut class.attributes {
        a.ty = sort_union_arms(a.ty.clone());
    }
    for m in &mut class.methods {
        canonicalize_function(m, sort_signatures);
    }
    for n in &mut class.nested {
        canonicalize_class(n, sort_signatures);
    }
}

fn canonicalize_function(f: &mut Function, sort_signatures: bool) {
    for sig in &mut f.signatures {
        sig.ret = sort_union_arms(sig.ret.clone());
        for p in &mut sig.params {
            p.ty = sort_union_arms(p.ty.clone());
        }
    }
    if sort_signatures {
        f.signatures.sort();
    }
}

fn sort_union_arms(ty: Type) -> Type {
    match ty {
        Type::Union(mut arms) => {
            for arm in &mut arms {
                *arm = sort_union_arms(arm.clone());
            }
            arms.sort();
            Type::Union(arms)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn func(name: &str, ret: Type) -> Function {
        Function {
            name: name.to_string(),
            decorators: vec![],
            signatures: vec![Signature {
                params: vec![],
                ret,
            }],
        }
    }

    #[test]
    fn union_of_flattens_and_dedupes() {
        let t = Type::union_of(vec![
            Type::Named("int".into()),
            Type::Union(vec![Type::Named("str".into()), Type::Named("int".into())]),
        ]);
        assert_eq!(
            t,
            Type::Union(vec![Type::Named("int".into()), Type::Named("str".into())])
        );
    }

    #[test]
    fn union_of_single_collapses() {
        assert_eq!(
            Type::union_of(vec![Type::Named("int".into()), Type::Named("int".into())]),
            Type::Named("int".into())
        );
        assert_eq!(Type::union_of(vec![]), Type::Any);
    }

    #[test]
    fn verify_rejects_duplicate_top_level_names() {
        let module = StubModule {
            functions: vec![func("f", Type::None), func("f", Type::Any)],
            ..Default::default()
        };
        assert!(matches!(
            verify(&module),
            Err(VerifyError::DuplicateName { .. })
        ));
    }

    #[test]
    fn verify_rejects_invalid_identifier() {
        let module = StubModule {
            constants: vec![Attribute {
                name: "3bad".into(),
                ty: Type::Any,
                reassigned: false,
            }],
            ..Default::default()
        };
        assert!(matches!(
            verify(&module),
            Err(VerifyError::InvalidName { .. })
        ));
    }

    #[test]
    fn verify_accepts_well_formed_module() {
        let module = StubModule {
            constants: vec![Attribute {
                name: "VERSION".into(),
                ty: Type::Named("str".into()),
                reassigned: false,
            }],
            functions: vec![func("main", Type::None)],
            classes: vec![Class {
                name: "Config".into(),
                bases: vec![],
                attributes: vec![],
                methods: vec![func("load", Type::Named("bool".into()))],
                nested: vec![],
            }],
        };
        assert!(verify(&module).is_ok());
    }

    #[test]
    fn canonicalize_orders_items_by_name() {
        let module = StubModule {
            functions: vec![func("zeta", Type::None), func("alpha", Type::None)],
            ..Default::default()
        };
        let out = canonicalize(module, true);
        assert_eq!(out.functions[0].name, "alpha");
        assert_eq!(out.functions[1].name, "zeta");
    }

    #[test]
    fn canonicalize_sorts_union_arms() {
        let module = StubModule {
            constants: vec![Attribute {
                name: "X".into(),
                ty: Type::Union(vec![Type::Named("str".into()), Type::Named("int".into())]),
                reassigned: false,
            }],
            ..Default::default()
        };
        let out = canonicalize(module, true);
        assert_eq!(
            out.constants[0].ty,
            Type::Union(vec![Type::Named("int".into()), Type::Named("str".into())])
        );
    }

    #[test]
    fn widen_pair_follows_numeric_tower() {
        let ctx = BuiltinsContext::loaded();
        let int = Type::Named("int".into());
        let float = Type::Named("float".into());
        assert_eq!(ctx.widen_pair(&int, &float), Some(float.clone()));
        assert_eq!(ctx.widen_pair(&float, &int), Some(float));
        assert_eq!(ctx.widen_pair(&int, &Type::Named("str".into())), None);

        let empty = BuiltinsContext::empty();
        assert_eq!(
            empty.widen_pair(&Type::Named("int".into()), &Type::Named("float".into())),
            None
        );
    }
}
