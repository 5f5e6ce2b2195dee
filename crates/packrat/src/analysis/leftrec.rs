//! Left-recursion detection, and the rule type and ε-flag assignment
//! that rides on the same depth-first traversal.
//!
//! Only the potentially-left-consuming prefix of each expression is
//! walked: a parse can recurse into whatever its first consumed input
//! position reaches, so a cycle along those edges would recurse forever
//! without consuming anything.

use crate::ast::{Expr, Grammar, RuleId};
use crate::error::ErrorAccumulator;
use crate::span::Span;

pub fn check_left(grammar: &mut Grammar, err: &ErrorAccumulator) {
    let mut stack: Vec<RuleId> = Vec::new();
    for id in grammar.checked.clone() {
        check_rule(grammar, id, &mut stack, err);
    }
}

fn check_rule(g: &mut Grammar, id: RuleId, stack: &mut Vec<RuleId>, err: &ErrorAccumulator) {
    // A rule with a type is fully analyzed, or sits on an already
    // reported cycle.
    if g.rules[id].ty.is_some() {
        return;
    }
    if let Some(pos) = stack.iter().position(|&r| r == id) {
        let cycle: Vec<RuleId> = stack[pos..].to_vec();
        let mut names: Vec<String> =
            cycle.iter().map(|&r| g.rules[r].name.display()).collect();
        names.push(names[0].clone());
        err.error(
            g.rules[cycle[0]].name.span(),
            format!("left-recursion: {}", names.join(", ")),
        );
        // Poison every rule on the cycle so it is neither revisited nor
        // reported again.
        for r in cycle {
            g.rules[r].ty = Some(String::new());
        }
        return;
    }

    stack.push(id);
    let expr = std::mem::replace(&mut g.rules[id].expr, placeholder());
    check_expr(g, &expr, stack, err);
    g.rules[id].expr = expr;
    stack.pop();

    let epsilon = g.rules[id].expr.epsilon(&g.rules);
    let ty = g.rules[id].expr.ty(&g.rules);
    g.rules[id].epsilon = epsilon;
    if g.rules[id].ty.is_none() {
        g.rules[id].ty = Some(ty);
    }
}

fn check_expr(g: &mut Grammar, e: &Expr, stack: &mut Vec<RuleId>, err: &ErrorAccumulator) {
    match e {
        Expr::Choice(c) => {
            for branch in &c.exprs {
                check_expr(g, branch, stack, err);
            }
        }
        Expr::Sequence(s) => {
            for factor in &s.exprs {
                check_expr(g, factor, stack, err);
                if !factor.epsilon(&g.rules) {
                    break;
                }
            }
        }
        Expr::Action(a) => check_expr(g, &a.expr, stack, err),
        Expr::Label(l) => check_expr(g, &l.expr, stack, err),
        Expr::Pred(p) => check_expr(g, &p.expr, stack, err),
        Expr::Rep(r) => check_expr(g, &r.expr, stack, err),
        Expr::Opt(o) => check_expr(g, &o.expr, stack, err),
        Expr::Sub(s) => check_expr(g, &s.expr, stack, err),
        Expr::Ident(ident) => {
            if let Some(target) = ident.rule {
                check_rule(g, target, stack, err);
            }
        }
        Expr::PredCode(_) | Expr::Literal(_) | Expr::Class(_) | Expr::Any(_) => {}
    }
}

fn placeholder() -> Expr {
    Expr::Any(crate::ast::Any { loc: Span::empty() })
}
