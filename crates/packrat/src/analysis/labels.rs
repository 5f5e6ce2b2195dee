//! Label numbering and scope bookkeeping.
//!
//! One traversal per rule, after the left-recursion pass has fixed types:
//! every labeled subexpression gets the next slot index within its rule
//! and is appended to the rule's label list; action and predicate-code
//! nodes snapshot the labels in scope at their position. A label leaves
//! scope at the end of its choice branch, so distinct branches may reuse
//! a name; reuse within one scope chain is an error.

use crate::ast::{Expr, Grammar, LabelInfo, Rules};
use crate::error::ErrorAccumulator;
use crate::span::Span;

pub fn collect_labels(grammar: &mut Grammar, err: &ErrorAccumulator) {
    for id in grammar.checked.clone() {
        let mut expr = std::mem::replace(&mut grammar.rules[id].expr, placeholder());
        let mut cx = Cx {
            rules: &grammar.rules,
            err,
            all: Vec::new(),
            scope: Vec::new(),
        };
        visit(&mut expr, &mut cx);
        let labels = cx.all;
        let rule = &mut grammar.rules[id];
        rule.expr = expr;
        rule.labels = labels;
    }
}

struct Cx<'a> {
    rules: &'a Rules,
    err: &'a ErrorAccumulator,
    /// Every label of the rule, in numbering order.
    all: Vec<LabelInfo>,
    /// Labels visible at the current point of the traversal.
    scope: Vec<LabelInfo>,
}

fn visit(e: &mut Expr, cx: &mut Cx) {
    match e {
        Expr::Choice(c) => {
            for branch in &mut c.exprs {
                let mark = cx.scope.len();
                visit(branch, cx);
                cx.scope.truncate(mark);
            }
        }
        Expr::Sequence(s) => {
            for factor in &mut s.exprs {
                visit(factor, cx);
            }
        }
        Expr::Label(l) => {
            visit(&mut l.expr, cx);
            let name = l.label.as_str().to_string();
            if cx.scope.iter().any(|info| info.name == name) {
                cx.err
                    .error(l.label.span, format!("label {name} redefined"));
            }
            l.n = cx.all.len();
            let info = LabelInfo {
                name,
                n: l.n,
                ty: l.expr.ty(cx.rules),
                span: l.label.span,
            };
            cx.all.push(info.clone());
            cx.scope.push(info);
        }
        Expr::Action(a) => {
            visit(&mut a.expr, cx);
            a.labels = cx.scope.clone();
        }
        Expr::PredCode(p) => {
            p.labels = cx.scope.clone();
        }
        Expr::Pred(p) => visit(&mut p.expr, cx),
        Expr::Rep(r) => visit(&mut r.expr, cx),
        Expr::Opt(o) => visit(&mut o.expr, cx),
        Expr::Sub(s) => visit(&mut s.expr, cx),
        Expr::Ident(_) | Expr::Literal(_) | Expr::Class(_) | Expr::Any(_) => {}
    }
}

fn placeholder() -> Expr {
    Expr::Any(crate::ast::Any { loc: Span::empty() })
}

#[cfg(test)]
mod tests {
    use crate::analysis;
    use crate::ast::{Expr, Grammar};
    use crate::error::ErrorAccumulator;
    use crate::front;

    fn checked(src: &str) -> Grammar {
        let err = ErrorAccumulator::new();
        let mut g = front::parse(src, &err).expect("parse should succeed");
        analysis::check(&mut g, &err);
        assert!(err.is_empty(), "{}", err.render("test.file", src));
        g
    }

    fn check_errs(src: &str) -> String {
        let err = ErrorAccumulator::new();
        let mut g = front::parse(src, &err).expect("parse should succeed");
        analysis::check(&mut g, &err);
        err.render("test.file", src)
    }

    #[test]
    fn numbering_follows_visit_order() {
        let g = checked("A <- a:[x] (b:[y])* c:[z]");
        let rule = &g.rules[g.checked[0]];
        let names: Vec<(&str, usize)> = rule
            .labels
            .iter()
            .map(|l| (l.name.as_str(), l.n))
            .collect();
        assert_eq!(names, vec![("a", 0), ("b", 1), ("c", 2)]);
    }

    #[test]
    fn nested_labels_number_inside_out() {
        let g = checked("A <- l:m:[x]");
        let rule = &g.rules[g.checked[0]];
        let names: Vec<(&str, usize)> = rule
            .labels
            .iter()
            .map(|l| (l.name.as_str(), l.n))
            .collect();
        assert_eq!(names, vec![("m", 0), ("l", 1)]);
    }

    #[test]
    fn label_types_recorded() {
        let g = checked("A <- a:[x] b:B*\nB <- [y] { 1 }");
        let rule = &g.rules[g.checked[0]];
        assert_eq!(rule.labels[0].ty, "String");
        assert_eq!(rule.labels[1].ty, "Vec<i64>");
    }

    #[test]
    fn actions_see_labels_from_their_subexpression() {
        let g = checked("A <- (a:[x] b:[y] T:{ act(a, b) })");
        let rule = &g.rules[g.checked[0]];
        let mut found = false;
        let mut expr = rule.expr.clone();
        expr.visit_mut(&mut |e| {
            if let Expr::Action(action) = e {
                let names: Vec<&str> =
                    action.labels.iter().map(|l| l.name.as_str()).collect();
                assert_eq!(names, vec!["a", "b"]);
                found = true;
            }
        });
        assert!(found);
    }

    #[test]
    fn pred_code_sees_only_preceding_labels() {
        let g = checked("A <- a:[x] &{ p(a) } b:[y]");
        let rule = &g.rules[g.checked[0]];
        let mut expr = rule.expr.clone();
        expr.visit_mut(&mut |e| {
            if let Expr::PredCode(pred) = e {
                let names: Vec<&str> = pred.labels.iter().map(|l| l.name.as_str()).collect();
                assert_eq!(names, vec!["a"]);
            }
        });
    }

    #[test]
    fn branches_may_reuse_a_name() {
        let g = checked("A <- a:[x] T:{ f(a) } / a:[y] T:{ g(a) }");
        let rule = &g.rules[g.checked[0]];
        // Distinct slots even though the name repeats.
        assert_eq!(rule.labels.len(), 2);
        assert_eq!(rule.labels[0].n, 0);
        assert_eq!(rule.labels[1].n, 1);
    }

    #[test]
    fn reuse_in_one_scope_is_an_error() {
        assert!(check_errs("A <- a:[x] a:[y]").contains("label a redefined"));
        assert!(check_errs("A <- a:[x] b:(a:[y])").contains("label a redefined"));
    }

    #[test]
    fn reuse_after_a_closed_branch_is_allowed() {
        // A branch's labels leave scope with the branch.
        assert_eq!(
            check_errs("A <- (a:[x] \"String\":{ a } / [z]) a:[y]"),
            ""
        );
    }
}
