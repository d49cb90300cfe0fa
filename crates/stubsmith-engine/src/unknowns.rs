//! Resolution of non-literal expressions to builtin types.
//!
//! Solving an unknown is cheap today (a constructor-call lookup), but the
//! result cache is keyed by expression text and shared across files, so a
//! batch that analyzes its dependencies first resolves repeated
//! expressions from the cache in later files.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use stubsmith_ast::Type;

/// Builtin constructors whose call expressions name their own type.
const CONSTRUCTORS: &[&str] = &[
    "int",
    "float",
    "complex",
    "bool",
    "str",
    "bytes",
    "bytearray",
    "list",
    "dict",
    "set",
    "frozenset",
    "tuple",
];

fn cache() -> &'static Mutex<HashMap<String, String>> {
    static CACHE: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Tries to type a non-literal expression. With `use_cache`, hits are
/// served from (and stored into) the shared cache.
pub(crate) fn resolve_unknown(expr: &str, use_cache: bool) -> Option<Type> {
    if use_cache {
        if let Ok(guard) = cache().lock() {
            if let Some(name) = guard.get(expr) {
                return Some(Type::Named(name.clone()));
            }
        }
    }

    let name = resolve(expr)?;
    if use_cache {
        if let Ok(mut guard) = cache().lock() {
            guard.insert(expr.to_string(), name.to_string());
        }
    }
    Some(Type::Named(name.to_string()))
}

fn resolve(expr: &str) -> Option<&'static str> {
    let open = expr.find('(')?;
    if !expr.ends_with(')') {
        return None;
    }
    let callee = expr[..open].trim();
    CONSTRUCTORS.iter().find(|c| **c == callee).copied()
}
