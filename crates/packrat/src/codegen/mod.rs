//! Code generation: translates a checked grammar into Rust source for a
//! packrat parser.
//!
//! The emitted parser owns two flat `(position × rule)` matrices of
//! `i32`, accessed by direct indexing, never by hashed lookup:
//! `delta_pos` records bytes accepted (`p+1`), failure (`-1`) or no
//! attempt yet (`0`), and `delta_err` records the distance to the
//! furthest error seen (`d+1`). Per rule, up to four functions are
//! emitted over that table: Accepts (phase one), and Node / Fail /
//! Action (phase two) which replay the table to build a parse tree, a
//! failure tree, or a semantic value. Formatting of the output is left
//! to rustfmt.

macro_rules! w {
    ($out:expr, $($arg:tt)*) => {{
        let _ = ::std::fmt::Write::write_fmt($out, format_args!($($arg)*));
    }};
}
pub(crate) use w;

mod expr;

use std::fmt::Write as _;

use crate::ast::Grammar;

/// Code-generation switches, threaded explicitly through emission.
#[derive(Clone, Debug)]
pub struct GenConfig {
    /// Identifier prefix for everything the generator declares.
    pub prefix: String,
    /// Emit the Action pass.
    pub actions: bool,
    /// Emit the Node (parse tree) pass.
    pub parse_tree: bool,
}

impl Default for GenConfig {
    fn default() -> GenConfig {
        GenConfig {
            prefix: "_".to_string(),
            actions: true,
            parse_tree: true,
        }
    }
}

/// Generates the parser source for a checked grammar. `file` names the
/// grammar file in the generated-by header.
pub fn generate(grammar: &Grammar, file: &str, cfg: &GenConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "// Code generated by packrat from {file}. DO NOT EDIT.");
    out.push_str(ALLOW);
    out.push('\n');
    if let Some(prelude) = &grammar.prelude {
        out.push_str(prelude.as_str());
        out.push('\n');
    }
    decls(&mut out, grammar, cfg);
    for &id in &grammar.checked {
        let rule = &grammar.rules[id];
        expr::rule_accepts(&mut out, grammar, cfg, rule);
        if cfg.parse_tree {
            expr::rule_node(&mut out, grammar, cfg, rule);
        }
        expr::rule_fail(&mut out, grammar, cfg, rule);
        if cfg.actions {
            expr::rule_action(&mut out, grammar, cfg, rule);
        }
    }
    out
}

// The schema leans on rustfmt for layout and on these allows for the
// restore paths that can be statically unreachable, the unused label
// slots, and the non-snake-case surface names.
const ALLOW: &str = "#![allow(dead_code, non_snake_case, non_upper_case_globals, \
unreachable_code, unused_imports, unused_labels, unused_mut, unused_parens, \
unused_variables, clippy::all)]\n";

fn decls(out: &mut String, grammar: &Grammar, cfg: &GenConfig) {
    let pre = &cfg.prefix;
    out.push('\n');
    for &id in &grammar.checked {
        let rule = &grammar.rules[id];
        let _ = writeln!(
            out,
            "pub const {pre}{}: usize = {};",
            rule.name.ident(),
            rule.n
        );
    }
    let _ = writeln!(out, "pub const {pre}N: usize = {};", grammar.checked.len());
    out.push_str(&DECLS.replace("$p", pre));
}

const DECLS: &str = r#"
use packrat_runtime as peg;

use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;

pub struct $pParser<'a> {
    text: &'a str,
    delta_pos: Vec<[i32; $pN]>,
    delta_err: Vec<[i32; $pN]>,
    node: HashMap<(usize, usize), Rc<peg::Node<'a>>>,
    fail: HashMap<(usize, usize), Rc<peg::Fail>>,
    act: HashMap<(usize, usize), Rc<dyn Any>>,
    last_fail: isize,
}

#[derive(Debug)]
pub struct $pTooBigError;

impl std::fmt::Display for $pTooBigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("input is too big")
    }
}

impl std::error::Error for $pTooBigError {}

pub fn $pNewParser(text: &str) -> Result<$pParser<'_>, $pTooBigError> {
    if text.len() >= i32::MAX as usize {
        return Err($pTooBigError);
    }
    let n = text.len() + 1;
    Ok($pParser {
        text,
        delta_pos: vec![[0; $pN]; n],
        delta_err: vec![[0; $pN]; n],
        node: HashMap::new(),
        fail: HashMap::new(),
        act: HashMap::new(),
        last_fail: 0,
    })
}

fn $pmax(a: isize, b: isize) -> isize {
    if a > b {
        a
    } else {
        b
    }
}

fn $pmemoize(p: &mut $pParser<'_>, rule: usize, start: usize, pos: isize, perr: isize) -> (isize, isize) {
    p.last_fail = perr;
    let derr = perr - start as isize;
    p.delta_err[start][rule] = derr as i32 + 1;
    if pos >= 0 {
        let dpos = pos - start as isize;
        p.delta_pos[start][rule] = dpos as i32 + 1;
        return (dpos, derr);
    }
    p.delta_pos[start][rule] = -1;
    (-1, derr)
}

fn $pmemo(p: &$pParser<'_>, rule: usize, start: usize) -> Option<(isize, isize)> {
    let mut dp = p.delta_pos[start][rule] as isize;
    if dp == 0 {
        return None;
    }
    if dp > 0 {
        dp -= 1;
    }
    let de = p.delta_err[start][rule] as isize - 1;
    Some((dp, de))
}

fn $pfail_memo(p: &$pParser<'_>, rule: usize, start: usize, err_pos: usize) -> Option<(isize, Rc<peg::Fail>)> {
    if start as isize > p.last_fail {
        return Some((-1, Rc::new(peg::Fail::default())));
    }
    let dp = p.delta_pos[start][rule] as isize;
    let de = p.delta_err[start][rule] as isize;
    if start as isize + de - 1 < err_pos as isize {
        if dp > 0 {
            return Some((start as isize + dp - 1, Rc::new(peg::Fail::default())));
        }
        return Some((-1, Rc::new(peg::Fail::default())));
    }
    if let Some(f) = p.fail.get(&(start, rule)) {
        if dp < 0 {
            return Some((-1, Rc::clone(f)));
        }
        if dp > 0 {
            return Some((start as isize + dp - 1, Rc::clone(f)));
        }
    }
    None
}

fn $paccept<'a>(p: &mut $pParser<'a>, f: fn(&mut $pParser<'a>, usize) -> (isize, isize), pos: &mut usize, perr: &mut isize) -> bool {
    let (dp, de) = f(p, *pos);
    *perr = $pmax(*perr, *pos as isize + de);
    if dp < 0 {
        return false;
    }
    *pos += dp as usize;
    true
}

fn $pnode<'a>(p: &mut $pParser<'a>, f: fn(&mut $pParser<'a>, usize) -> (isize, Option<Rc<peg::Node<'a>>>), node: &mut peg::Node<'a>, pos: &mut usize) -> bool {
    let (np, kid) = f(p, *pos);
    let Some(kid) = kid else {
        return false;
    };
    node.kids.push(kid);
    *pos = np as usize;
    true
}

fn $pfail<'a>(p: &mut $pParser<'a>, f: fn(&mut $pParser<'a>, usize, usize) -> (isize, Rc<peg::Fail>), err_pos: usize, failure: &mut peg::Fail, pos: &mut usize) -> bool {
    let (np, kid) = f(p, *pos, err_pos);
    if !kid.want.is_empty() || !kid.kids.is_empty() {
        failure.kids.push(Rc::clone(&kid));
    }
    if np < 0 {
        return false;
    }
    *pos = np as usize;
    true
}

fn $psub<'a>(text: &'a str, start: usize, end: usize, kids: &[Rc<peg::Node<'a>>]) -> Rc<peg::Node<'a>> {
    Rc::new(peg::Node {
        name: "",
        text: &text[start..end],
        kids: kids.to_vec(),
    })
}

fn $pleaf<'a>(text: &'a str, start: usize, end: usize) -> Rc<peg::Node<'a>> {
    Rc::new(peg::Node {
        name: "",
        text: &text[start..end],
        kids: Vec::new(),
    })
}
"#;
