//! Type agreement for choices and sequences.
//!
//! Inference itself is bottom-up and pure (`Expr::ty`); this pass only
//! verifies that every branch of a consumed choice and every factor of a
//! consumed sequence carries the first member's type. A value counts as
//! consumed unless the node sits in an unassigned position: directly
//! under a predicate, or directly under an action (the action's code
//! computes the value; the subexpression's own is discarded). The empty
//! type marks subtrees poisoned by earlier errors and never mismatches.

use crate::ast::{Expr, Grammar, Rules};
use crate::error::ErrorAccumulator;

pub fn check_types(grammar: &Grammar, err: &ErrorAccumulator) {
    for &id in &grammar.checked {
        check_expr(&grammar.rules[id].expr, true, &grammar.rules, err);
    }
}

fn check_expr(e: &Expr, used: bool, rules: &Rules, err: &ErrorAccumulator) {
    match e {
        Expr::Choice(c) => {
            for branch in &c.exprs {
                check_expr(branch, used, rules, err);
            }
            if used {
                agree(&c.exprs, rules, err);
            }
        }
        Expr::Sequence(s) => {
            for factor in &s.exprs {
                check_expr(factor, used, rules, err);
            }
            if used {
                agree(&s.exprs, rules, err);
            }
        }
        Expr::Action(a) => check_expr(&a.expr, false, rules, err),
        Expr::Label(l) => check_expr(&l.expr, true, rules, err),
        Expr::Pred(p) => check_expr(&p.expr, false, rules, err),
        Expr::Rep(r) => check_expr(&r.expr, used, rules, err),
        Expr::Opt(o) => check_expr(&o.expr, used, rules, err),
        Expr::Sub(s) => check_expr(&s.expr, used, rules, err),
        Expr::PredCode(_) | Expr::Ident(_) | Expr::Literal(_) | Expr::Class(_) | Expr::Any(_) => {}
    }
}

fn agree(exprs: &[Expr], rules: &Rules, err: &ErrorAccumulator) {
    let want = exprs[0].ty(rules);
    if want.is_empty() {
        return;
    }
    for e in &exprs[1..] {
        let got = e.ty(rules);
        if !got.is_empty() && got != want {
            err.error(e.span(), format!("type mismatch: got {got}, want {want}"));
        }
    }
}
