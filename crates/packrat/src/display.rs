//! Stringification of grammars and expressions.
//!
//! Three forms: the minimal form (`display`) reproduces the grammar with
//! no comments and single-space separation; the fully parenthesized form
//! (`full_string`) normalizes grouping so that two grammars parse-equal
//! exactly when their full strings are equal; the stripped form drops
//! labels and actions for the CLI pretty mode.

use crate::ast::{Expr, Grammar, Rule};

impl Rule {
    /// `Name <- expr`, with the error name when the rule is named.
    pub fn display(&self) -> String {
        let name = match &self.error_name {
            Some(err) => format!("{} {}", self.name.display(), quote_str(err.as_str())),
            None => self.name.display(),
        };
        format!("{} <- {}", name, self.expr.display())
    }

    pub fn full_string(&self) -> String {
        let name = match &self.error_name {
            Some(err) => format!("{} {}", self.name.display(), quote_str(err.as_str())),
            None => self.name.display(),
        };
        format!("{} <- {}", name, self.expr.full_string())
    }

    /// The display form with labels and actions stripped.
    pub fn stripped(&self) -> String {
        let name = match &self.error_name {
            Some(err) => format!("{} {}", self.name.display(), quote_str(err.as_str())),
            None => self.name.display(),
        };
        format!("{} <- {}", name, self.expr.stripped())
    }
}

/// The minimal string form of all rules, one per line.
pub fn grammar_string(grammar: &Grammar) -> String {
    let lines: Vec<String> = grammar.rules.values().map(|r| r.display()).collect();
    lines.join("\n")
}

/// The fully parenthesized form of all rules, one per line.
pub fn grammar_full_string(grammar: &Grammar) -> String {
    let lines: Vec<String> = grammar.rules.values().map(|r| r.full_string()).collect();
    lines.join("\n")
}

impl Expr {
    pub fn display(&self) -> String {
        match self {
            Expr::Choice(e) => {
                let branches: Vec<String> = e.exprs.iter().map(|s| s.display()).collect();
                branches.join("/")
            }
            Expr::Action(e) => {
                format!("{}{}{{{}}}", e.expr.display(), action_ty_prefix(&e.ty), e.code)
            }
            Expr::Sequence(e) => {
                let factors: Vec<String> = e.exprs.iter().map(|s| s.display()).collect();
                factors.join(" ")
            }
            Expr::Label(e) => format!("{}:{}", e.label, e.expr.display()),
            Expr::Pred(e) => format!("{}{}", pred_glyph(e.neg), e.expr.display()),
            Expr::Rep(e) => format!("{}{}", e.expr.display(), e.op.glyph()),
            Expr::Opt(e) => format!("{}?", e.expr.display()),
            Expr::Sub(e) => format!("({})", e.expr.display()),
            Expr::PredCode(e) => format!("{}{{{}}}", pred_glyph(e.neg), e.code),
            Expr::Ident(e) => e.name.display(),
            Expr::Literal(e) => quote_str(e.text.as_str()),
            Expr::Class(e) => class_string(e),
            Expr::Any(_) => ".".to_string(),
        }
    }

    /// The fully parenthesized form. Source parentheses are dropped and
    /// every other construct gets its own pair, so grouping differences
    /// that do not change the parse disappear.
    pub fn full_string(&self) -> String {
        match self {
            Expr::Choice(e) => {
                let mut s = "(".repeat(e.exprs.len() - 1);
                s.push_str(&e.exprs[0].full_string());
                for sub in &e.exprs[1..] {
                    s.push('/');
                    s.push_str(&sub.full_string());
                    s.push(')');
                }
                s
            }
            Expr::Action(e) => format!(
                "({}{}{{{}}})",
                e.expr.full_string(),
                action_ty_prefix(&e.ty),
                e.code
            ),
            Expr::Sequence(e) => {
                let mut s = "(".repeat(e.exprs.len() - 1);
                s.push_str(&e.exprs[0].full_string());
                for sub in &e.exprs[1..] {
                    s.push(' ');
                    s.push_str(&sub.full_string());
                    s.push(')');
                }
                s
            }
            Expr::Label(e) => format!("({}:{})", e.label, e.expr.full_string()),
            Expr::Pred(e) => format!("({}{})", pred_glyph(e.neg), e.expr.full_string()),
            Expr::Rep(e) => format!("({}{})", e.expr.full_string(), e.op.glyph()),
            Expr::Opt(e) => format!("({}?)", e.expr.full_string()),
            Expr::Sub(e) => e.expr.full_string(),
            Expr::PredCode(_) | Expr::Ident(_) | Expr::Literal(_) | Expr::Class(_)
            | Expr::Any(_) => {
                format!("({})", self.display())
            }
        }
    }

    pub fn stripped(&self) -> String {
        match self {
            Expr::Choice(e) => {
                let branches: Vec<String> = e.exprs.iter().map(|s| s.stripped()).collect();
                branches.join("/")
            }
            Expr::Action(e) => e.expr.stripped(),
            Expr::Sequence(e) => {
                let factors: Vec<String> = e.exprs.iter().map(|s| s.stripped()).collect();
                factors.join(" ")
            }
            Expr::Label(e) => e.expr.stripped(),
            Expr::Pred(e) => format!("{}{}", pred_glyph(e.neg), e.expr.stripped()),
            Expr::Rep(e) => format!("{}{}", e.expr.stripped(), e.op.glyph()),
            Expr::Opt(e) => format!("{}?", e.expr.stripped()),
            Expr::Sub(e) => format!("({})", e.expr.stripped()),
            _ => self.display(),
        }
    }
}

fn pred_glyph(neg: bool) -> char {
    if neg {
        '!'
    } else {
        '&'
    }
}

fn action_ty_prefix(ty: &str) -> String {
    if ty.is_empty() {
        return " ".to_string();
    }
    if ty.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return format!(" {ty}:");
    }
    format!(" {}:", quote_str(ty))
}

/// Quotes a string the way the grammar surface writes literals, using
/// only escapes the grammar lexer accepts, so printed grammars re-parse.
pub fn quote_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for r in s.chars() {
        push_esc(&mut out, r, '"');
    }
    out.push('"');
    out
}

fn push_esc(out: &mut String, r: char, delim: char) {
    match r {
        '\\' => out.push_str("\\\\"),
        '\x07' => out.push_str("\\a"),
        '\x08' => out.push_str("\\b"),
        '\x0c' => out.push_str("\\f"),
        '\n' => out.push_str("\\n"),
        '\r' => out.push_str("\\r"),
        '\t' => out.push_str("\\t"),
        '\x0b' => out.push_str("\\v"),
        r if r == delim => {
            out.push('\\');
            out.push(r);
        }
        r if (r as u32) < 0x20 || r == '\x7f' => {
            out.push_str(&format!("\\x{:02X}", r as u32));
        }
        r => out.push(r),
    }
}

fn class_string(class: &crate::ast::Class) -> String {
    let mut s = String::from("[");
    if class.neg {
        s.push('^');
    }
    for &(lo, hi) in &class.spans {
        push_class_rune(&mut s, lo);
        if lo != hi {
            s.push('-');
            push_class_rune(&mut s, hi);
        }
    }
    s.push(']');
    s
}

fn push_class_rune(out: &mut String, r: char) {
    match r {
        '-' => out.push_str("\\-"),
        ']' => out.push_str("\\]"),
        '\\' => out.push_str("\\\\"),
        r => push_esc(out, r, ']'),
    }
}
