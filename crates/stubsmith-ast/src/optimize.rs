//! Stub optimization: union normalization and signature dedup.

use crate::{Attribute, BuiltinsContext, Class, Function, StubModule, Type};

/// Knobs for the optimization pass.
///
/// The batch driver always runs with the defaults; the individual switches
/// exist so callers embedding the engine can trade precision for size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizeOptions {
    /// Collapse any multi-arm union to `Any`.
    pub lossy: bool,
    /// Widen numeric unions to their common base (needs loaded builtins).
    pub use_abcs: bool,
    /// Unions with more arms than this collapse to `Any`.
    pub max_union: usize,
    /// Drop attributes the source reassigns.
    pub remove_mutable: bool,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            lossy: false,
            use_abcs: false,
            max_union: 7,
            remove_mutable: false,
        }
    }
}

/// Runs the optimization pass over a whole stub description.
pub fn optimize(
    mut module: StubModule,
    builtins: &BuiltinsContext,
    opts: &OptimizeOptions,
) -> StubModule {
    optimize_attributes(&mut module.constants, builtins, opts);
    for f in &mut module.functions {
        optimize_function(f, builtins, opts);
    }
    for c in &mut module.classes {
        optimize_class(c, builtins, opts);
    }
    module
}

fn optimize_class(class: &mut Class, builtins: &BuiltinsContext, opts: &OptimizeOptions) {
    optimize_attributes(&mut class.attributes, builtins, opts);
    for m in &mut class.methods {
        optimize_function(m, builtins, opts);
    }
    for n in &mut class.nested {
        optimize_class(n, builtins, opts);
    }
}

fn optimize_attributes(
    attrs: &mut Vec<Attribute>,
    builtins: &BuiltinsContext,
    opts: &OptimizeOptions,
) {
    if opts.remove_mutable {
        attrs.retain(|a| !a.reassigned);
    }
    for a in attrs.iter_mut() {
        a.ty = simplify(a.ty.clone(), builtins, opts);
    }
}

fn optimize_function(f: &mut Function, builtins: &BuiltinsContext, opts: &OptimizeOptions) {
    for sig in &mut f.signatures {
        sig.ret = simplify(sig.ret.clone(), builtins, opts);
        for p in &mut sig.params {
            p.ty = simplify(p.ty.clone(), builtins, opts);
        }
    }
    // Dedup after simplification: two signatures can converge once their
    // unions normalize.
    let mut unique = Vec::with_capacity(f.signatures.len());
    for sig in f.signatures.drain(..) {
        if !unique.contains(&sig) {
            unique.push(sig);
        }
    }
    f.signatures = unique;
}

/// Normalizes one type expression under the configured knobs.
fn simplify(ty: Type, builtins: &BuiltinsContext, opts: &OptimizeOptions) -> Type {
    match ty {
        Type::Union(arms) => {
            let arms: Vec<Type> = arms
                .into_iter()
                .map(|a| simplify(a, builtins, opts))
                .collect();
            let mut flat = match Type::union_of(arms) {
                Type::Union(arms) => arms,
                other => return other,
            };
            if opts.use_abcs {
                flat = widen_numeric(flat, builtins);
                if flat.len() == 1 {
                    return flat.remove(0);
                }
            }
            if opts.lossy || flat.len() > opts.max_union {
                return Type::Any;
            }
            Type::Union(flat)
        }
        other => other,
    }
}

/// Folds adjacent numeric arms into their common base, repeatedly, until
/// no pair widens.
fn widen_numeric(arms: Vec<Type>, builtins: &BuiltinsContext) -> Vec<Type> {
    let mut out: Vec<Type> = Vec::with_capacity(arms.len());
    for arm in arms {
        let mut absorbed = false;
        for existing in &mut out {
            if let Some(widened) = builtins.widen_pair(existing, &arm) {
                *existing = widened;
                absorbed = true;
                break;
            }
        }
        if !absorbed {
            out.push(arm);
        }
    }
    out
}
