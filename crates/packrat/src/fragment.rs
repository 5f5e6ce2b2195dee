//! Embedded target-language fragments: syntax checking and action
//! return-type inference.
//!
//! The prelude, action bodies and predicate code are Rust fragments.
//! They are parsed with `syn` purely for well-formedness; semantic
//! validity is the compiler's business once the generated file builds.
//! Fragment error positions are re-based onto the grammar file.
//!
//! An action without a declared type gets one inferred from its value
//! expression (the trailing expression, or the first top-level
//! `return`): numeric, char and bool literals, `as` casts, struct
//! literals, associated-function calls like `T::new(…)`, and
//! `.to_string()` calls. Anything else needs an annotation.

use proc_macro2::LineColumn;
use quote::ToTokens;

use crate::ast::{Expr, Grammar};
use crate::error::ErrorAccumulator;
use crate::span::{Span, Text};

pub fn check_fragments(grammar: &mut Grammar, err: &ErrorAccumulator) {
    if let Some(prelude) = &grammar.prelude {
        if let Err(e) = syn::parse_file(prelude.as_str()) {
            report(err, prelude, 0, e);
        }
    }

    for id in grammar.checked.clone() {
        grammar.rules[id].expr.visit_mut(&mut |e| match e {
            Expr::Action(a) => {
                let wrapped = format!("{{{}}}", a.code.as_str());
                match syn::parse_str::<syn::Block>(&wrapped) {
                    Ok(block) => {
                        if a.ty.is_empty() {
                            match infer_ty(&block) {
                                Some(ty) => a.ty = ty,
                                None => err.error(a.code.span, "cannot infer action type"),
                            }
                        }
                    }
                    Err(e) => report(err, &a.code, 1, e),
                }
            }
            Expr::PredCode(p) => {
                if let Err(e) = syn::parse_str::<syn::Expr>(p.code.as_str()) {
                    report(err, &p.code, 0, e);
                }
            }
            _ => {}
        });
    }
}

/// Re-bases a syn error onto the grammar file. `prefix` is the number of
/// runes prepended to the fragment before parsing (the synthetic `{`).
fn report(err: &ErrorAccumulator, code: &Text, prefix: usize, e: syn::Error) {
    let off = frag_offset(code.as_str(), prefix, e.span().start());
    // The fragment's content starts one rune after the span start, which
    // points at the opening brace in the source.
    err.error(Span::at(code.span.start + 1 + off as u32), e);
}

fn frag_offset(content: &str, prefix: usize, lc: LineColumn) -> usize {
    let mut col = lc.column;
    if lc.line == 1 {
        col = col.saturating_sub(prefix);
    }
    let mut off = 0;
    for (i, line) in content.split('\n').enumerate() {
        if i + 1 == lc.line {
            let byte = line
                .char_indices()
                .nth(col)
                .map(|(b, _)| b)
                .unwrap_or(line.len());
            return off + byte;
        }
        off += line.len() + 1;
    }
    content.len()
}

fn infer_ty(block: &syn::Block) -> Option<String> {
    classify(value_expr(block)?)
}

fn value_expr(block: &syn::Block) -> Option<&syn::Expr> {
    if let Some(syn::Stmt::Expr(e, None)) = block.stmts.last() {
        return Some(e);
    }
    for stmt in &block.stmts {
        if let syn::Stmt::Expr(syn::Expr::Return(r), _) = stmt {
            return r.expr.as_deref();
        }
    }
    None
}

fn classify(e: &syn::Expr) -> Option<String> {
    match e {
        syn::Expr::Group(g) => classify(&g.expr),
        syn::Expr::Paren(p) => classify(&p.expr),
        syn::Expr::Return(r) => classify(r.expr.as_deref()?),
        syn::Expr::Lit(l) => match &l.lit {
            syn::Lit::Int(i) if i.suffix().is_empty() => Some("i64".to_string()),
            syn::Lit::Int(i) => Some(i.suffix().to_string()),
            syn::Lit::Float(f) if f.suffix().is_empty() => Some("f64".to_string()),
            syn::Lit::Float(f) => Some(f.suffix().to_string()),
            syn::Lit::Char(_) => Some("char".to_string()),
            syn::Lit::Bool(_) => Some("bool".to_string()),
            _ => None,
        },
        syn::Expr::Cast(c) => Some(tokens(&c.ty)),
        syn::Expr::Struct(s) => Some(tokens(&s.path)),
        syn::Expr::Call(c) => {
            let syn::Expr::Path(p) = &*c.func else {
                return None;
            };
            let segments = &p.path.segments;
            if segments.len() < 2 {
                return None;
            }
            let last = segments.last().unwrap();
            let starts_lower = last
                .ident
                .to_string()
                .chars()
                .next()
                .is_some_and(|c| c.is_lowercase());
            if !starts_lower {
                return None;
            }
            // `String::from(…)`, `BigInt::new(…)`: the type is the path
            // up to the function segment.
            let prefix: Vec<String> = segments
                .iter()
                .take(segments.len() - 1)
                .map(|s| s.to_token_stream().to_string().replace(' ', ""))
                .collect();
            Some(prefix.join("::"))
        }
        syn::Expr::MethodCall(m) if m.method == "to_string" => Some("String".to_string()),
        _ => None,
    }
}

fn tokens(t: &impl ToTokens) -> String {
    t.to_token_stream().to_string().replace(' ', "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis;
    use crate::front;

    fn run(src: &str) -> (Option<Grammar>, String) {
        let err = ErrorAccumulator::new();
        let g = front::parse(src, &err);
        let g = g.map(|mut g| {
            analysis::check(&mut g, &err);
            g
        });
        let rendered = err.render("test.file", src);
        (g, rendered)
    }

    fn inferred(code: &str) -> String {
        let src = format!("A <- \"x\" {{ {code} }}");
        let (g, errs) = run(&src);
        assert_eq!(errs, "", "for {code:?}");
        let g = g.unwrap();
        g.rules[g.checked[0]].ty().to_string()
    }

    #[test]
    fn inference_forms() {
        assert_eq!(inferred("1"), "i64");
        assert_eq!(inferred("1u8"), "u8");
        assert_eq!(inferred("2.5"), "f64");
        assert_eq!(inferred("'c'"), "char");
        assert_eq!(inferred("true"), "bool");
        assert_eq!(inferred("n as usize"), "usize");
        assert_eq!(inferred("Point { x: 1, y: 2 }"), "Point");
        assert_eq!(inferred("String::from(\"s\")"), "String");
        assert_eq!(inferred("BigInt::new(7)"), "BigInt");
        assert_eq!(inferred("Vec::<i64>::new()"), "Vec::<i64>");
        assert_eq!(inferred("\"s\".to_string()"), "String");
        assert_eq!(inferred("return 7;"), "i64");
    }

    #[test]
    fn declared_type_wins() {
        let (g, errs) = run("A <- \"x\" Wide:{ 1 }");
        assert_eq!(errs, "");
        let g = g.unwrap();
        assert_eq!(g.rules[g.checked[0]].ty(), "Wide");
    }

    #[test]
    fn uninferable_action_is_an_error() {
        let (_, errs) = run("A <- \"x\" { helper(1) }");
        assert!(errs.contains("cannot infer action type"), "{errs}");
    }

    #[test]
    fn action_syntax_error_located_in_grammar_file() {
        let (_, errs) = run("A <- B { @ }\nB <- \"x\"");
        assert!(errs.starts_with("test.file:1.10"), "{errs}");
    }

    #[test]
    fn predicate_code_is_parsed_as_an_expression() {
        let (_, errs) = run("A <- \"x\" &{ let y = 1; }");
        assert!(!errs.is_empty());
        let (_, errs) = run("A <- l:\"x\" &{ l == \"x\" }");
        assert_eq!(errs, "");
    }

    #[test]
    fn prelude_is_checked_as_a_file() {
        let (_, errs) = run("{ use std::fmt:: }\nA <- \"x\"");
        assert!(errs.starts_with("test.file:1"), "{errs}");
        let (_, errs) = run("{ use std::fmt; }\nA <- \"x\"");
        assert_eq!(errs, "");
    }
}
