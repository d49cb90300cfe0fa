//! Renders a stub description to `.pyi` text.

use crate::{Class, Function, Param, ParamKind, StubModule, Type};

const INDENT: &str = "    ";

/// Renders a whole module. The result always ends with exactly one
/// trailing newline; an empty module renders as a single newline.
pub fn render(module: &StubModule) -> String {
    let mut blocks: Vec<String> = Vec::new();

    for c in &module.constants {
        blocks.push(format!("{}: {}", c.name, render_type(&c.ty)));
    }
    for f in &module.functions {
        blocks.push(render_function(f, 0));
    }
    for c in &module.classes {
        blocks.push(render_class(c, 0));
    }

    let body = blocks.join("\n\n");

    let mut out = String::new();
    if body.contains("Any") {
        out.push_str("from typing import Any\n\n");
    }
    out.push_str(&body);

    while out.ends_with('\n') {
        out.pop();
    }
    out.push('\n');
    out
}

pub fn render_type(ty: &Type) -> String {
    match ty {
        Type::Any => "Any".to_string(),
        Type::None => "None".to_string(),
        Type::Named(name) => name.clone(),
        Type::Union(arms) => arms
            .iter()
            .map(render_type)
            .collect::<Vec<_>>()
            .join(" | "),
    }
}

fn render_function(f: &Function, depth: usize) -> String {
    let pad = INDENT.repeat(depth);
    let mut out = String::new();
    for d in &f.decorators {
        out.push_str(&format!("{pad}@{d}\n"));
    }
    for (i, sig) in f.signatures.iter().enumerate() {
        if i > 0 {
            out.push('\n');
            for d in &f.decorators {
                out.push_str(&format!("{pad}@{d}\n"));
            }
        }
        let params = sig
            .params
            .iter()
            .map(render_param)
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!(
            "{pad}def {}({params}) -> {}: ...",
            f.name,
            render_type(&sig.ret)
        ));
    }
    out
}

fn render_param(p: &Param) -> String {
    let prefix = match p.kind {
        ParamKind::Positional => "",
        ParamKind::Star => "*",
        ParamKind::StarStar => "**",
    };
    let mut out = format!("{prefix}{}", p.name);
    // `Any` params stay unannotated, matching hand-written stub style.
    if p.ty != Type::Any {
        out.push_str(&format!(": {}", render_type(&p.ty)));
    }
    if p.has_default {
        out.push_str(" = ...");
    }
    out
}

fn render_class(c: &Class, depth: usize) -> String {
    let pad = INDENT.repeat(depth);
    let header = if c.bases.is_empty() {
        format!("{pad}class {}", c.name)
    } else {
        format!("{pad}class {}({})", c.name, c.bases.join(", "))
    };

    let mut members: Vec<String> = Vec::new();
    let member_pad = INDENT.repeat(depth + 1);
    for a in &c.attributes {
        members.push(format!("{member_pad}{}: {}", a.name, render_type(&a.ty)));
    }
    for m in &c.methods {
        members.push(render_function(m, depth + 1));
    }
    for n in &c.nested {
        members.push(render_class(n, depth + 1));
    }

    if members.is_empty() {
        format!("{header}: ...")
    } else {
        format!("{header}:\n{}", members.join("\n"))
    }
}
