//! The grammar tree the front-end produces and the semantic passes
//! annotate in place.
//!
//! Rules live in an entity map and refer to each other through `RuleId`
//! handles; identifier expressions carry an `Option<RuleId>` binding that
//! resolution fills in. Rule-to-rule edges form a cyclic graph, so no
//! expression ever owns another rule.

use std::collections::HashMap;

use cranelift_entity::{entity_impl, PrimaryMap};

use crate::span::{Span, Text};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct RuleId(u32);

entity_impl! { RuleId }

pub type Rules = PrimaryMap<RuleId, Rule>;

pub struct Grammar {
    /// Verbatim target-language fragment emitted ahead of the parser.
    pub prelude: Option<Text>,
    pub rules: Rules,
    /// The expanded, index-assigned rule list produced by checking:
    /// every non-template rule plus every template specialization. A
    /// rule's position here is its column index in the memo table.
    pub checked: Vec<RuleId>,
}

impl Grammar {
    pub fn new(prelude: Option<Text>, rules: Vec<Rule>) -> Grammar {
        let mut map = PrimaryMap::new();
        for rule in rules {
            map.push(rule);
        }
        Grammar {
            prelude,
            rules: map,
            checked: Vec::new(),
        }
    }
}

/// The name of a rule: an identifier plus template parameters (on a
/// template declaration) or arguments (on a specialization clone). The
/// printed form `Name<a, b>` is the rule's identity.
#[derive(Clone, Debug)]
pub struct RuleName {
    pub name: Text,
    pub args: Vec<Text>,
}

impl RuleName {
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            return self.name.str.clone();
        }
        let args: Vec<&str> = self.args.iter().map(|a| a.as_str()).collect();
        format!("{}<{}>", self.name.str, args.join(", "))
    }

    /// A valid target-language identifier derived from the display name.
    pub fn ident(&self) -> String {
        let mut out = String::new();
        for r in self.display().chars() {
            match r {
                c if c.is_alphanumeric() || c == '_' => out.push(c),
                '<' | ',' => out.push_str("__"),
                '>' | ' ' => {}
                _ => out.push('_'),
            }
        }
        out
    }

    pub fn span(&self) -> Span {
        match self.args.last() {
            Some(last) => self.name.span.join(last.span),
            None => self.name.span,
        }
    }
}

pub struct Rule {
    pub name: RuleName,
    /// Display string making this a named rule: failures beneath it
    /// collapse into a single `want error_name` leaf at the rule's start.
    pub error_name: Option<Text>,
    pub expr: Expr,
    /// True for rules declared with template parameters. Templates are
    /// expanded away and never appear in `Grammar::checked`.
    pub template: bool,
    /// Memo-table column index; equals the rule's position in `checked`.
    pub n: usize,
    /// Action-pass result type. None before the left-recursion pass;
    /// an empty string marks a rule poisoned by an earlier error.
    pub ty: Option<String>,
    /// Whether the rule can match the empty string.
    pub epsilon: bool,
    /// Every labeled subexpression in the rule, in numbering order.
    pub labels: Vec<LabelInfo>,
}

impl Rule {
    pub fn new(name: RuleName, error_name: Option<Text>, expr: Expr) -> Rule {
        let template = !name.args.is_empty();
        Rule {
            name,
            error_name,
            expr,
            template,
            n: 0,
            ty: None,
            epsilon: false,
            labels: Vec::new(),
        }
    }

    pub fn ty(&self) -> &str {
        self.ty.as_deref().unwrap_or("")
    }

    pub fn span(&self) -> Span {
        self.name.span().join(self.expr.span())
    }
}

/// A label's bookkeeping: its text, the slot index unique within the
/// rule, and the labeled subexpression's type.
#[derive(Clone, Debug)]
pub struct LabelInfo {
    pub name: String,
    pub n: usize,
    pub ty: String,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub enum Expr {
    Choice(Choice),
    Action(Action),
    Sequence(Sequence),
    Label(Label),
    Pred(Pred),
    Rep(Rep),
    Opt(Opt),
    Sub(Sub),
    PredCode(PredCode),
    Ident(Ident),
    Literal(Literal),
    Class(Class),
    Any(Any),
}

/// An ordered choice between expressions.
#[derive(Clone, Debug)]
pub struct Choice {
    pub exprs: Vec<Expr>,
}

/// A subexpression with code to run once it matches.
#[derive(Clone, Debug)]
pub struct Action {
    pub expr: Box<Expr>,
    /// The code fragment, braces excluded.
    pub code: Text,
    /// The declared result type, or empty until fragment checking infers
    /// one from the code.
    pub ty: String,
    /// Labels in scope for the code, filled by label collection.
    pub labels: Vec<LabelInfo>,
}

#[derive(Clone, Debug)]
pub struct Sequence {
    pub exprs: Vec<Expr>,
}

/// A labeled subexpression; the label names the subexpression's value in
/// actions and its matched text in predicate code.
#[derive(Clone, Debug)]
pub struct Label {
    pub label: Text,
    pub expr: Box<Expr>,
    /// Slot index unique within the containing rule, assigned by label
    /// collection in first-visit order.
    pub n: usize,
}

/// A lookahead predicate `&E` or `!E`: matches without consuming input.
#[derive(Clone, Debug)]
pub struct Pred {
    pub neg: bool,
    pub expr: Box<Expr>,
    /// Location of the operator.
    pub loc: Span,
}

/// Repetition `E*` or `E+`.
#[derive(Clone, Debug)]
pub struct Rep {
    pub op: RepOp,
    pub expr: Box<Expr>,
    pub loc: Span,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RepOp {
    Star,
    Plus,
}

impl RepOp {
    pub fn glyph(self) -> char {
        match self {
            RepOp::Star => '*',
            RepOp::Plus => '+',
        }
    }
}

/// Optional expression `E?`.
#[derive(Clone, Debug)]
pub struct Opt {
    pub expr: Box<Expr>,
    pub loc: Span,
}

/// A parenthesized subexpression. Carries no information beyond the
/// parentheses, so stringification can reproduce them without computing
/// precedence inversions.
#[derive(Clone, Debug)]
pub struct Sub {
    pub expr: Box<Expr>,
    pub open: Span,
    pub close: Span,
}

/// A code predicate `&{…}` or `!{…}`: a target-language boolean
/// expression over the labeled texts in scope.
#[derive(Clone, Debug)]
pub struct PredCode {
    pub neg: bool,
    pub code: Text,
    pub loc: Span,
    pub labels: Vec<LabelInfo>,
}

/// A reference to another rule, possibly a template invocation when
/// `name.args` is non-empty.
#[derive(Clone, Debug)]
pub struct Ident {
    pub name: RuleName,
    /// The referenced rule, bound during resolution.
    pub rule: Option<RuleId>,
}

/// A literal text match.
#[derive(Clone, Debug)]
pub struct Literal {
    pub text: Text,
}

/// A character class `[…]` or `[^…]`. Spans are inclusive on both ends;
/// a single rune is a span of itself.
#[derive(Clone, Debug)]
pub struct Class {
    pub spans: Vec<(char, char)>,
    pub neg: bool,
    pub open: Span,
    pub close: Span,
}

/// The any-rune match `.`.
#[derive(Clone, Debug)]
pub struct Any {
    pub loc: Span,
}

/// Control signal returned by `walk` callbacks.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Visit {
    Continue,
    SkipChildren,
    Stop,
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Choice(e) => span_of_list(&e.exprs),
            Expr::Action(e) => e.expr.span().join(e.code.span),
            Expr::Sequence(e) => span_of_list(&e.exprs),
            Expr::Label(e) => e.label.span.join(e.expr.span()),
            Expr::Pred(e) => e.loc.join(e.expr.span()),
            Expr::Rep(e) => e.expr.span().join(e.loc),
            Expr::Opt(e) => e.expr.span().join(e.loc),
            Expr::Sub(e) => e.open.join(e.close),
            Expr::PredCode(e) => e.loc.join(e.code.span),
            Expr::Ident(e) => e.name.span(),
            Expr::Literal(e) => e.text.span,
            Expr::Class(e) => e.open.join(e.close),
            Expr::Any(e) => e.loc,
        }
    }

    /// Pre-order traversal with pruning: the callback may continue into
    /// children, skip them, or stop the whole walk.
    pub fn walk(&self, f: &mut dyn FnMut(&Expr) -> Visit) -> Visit {
        match f(self) {
            Visit::Stop => return Visit::Stop,
            Visit::SkipChildren => return Visit::Continue,
            Visit::Continue => {}
        }
        for kid in self.children() {
            if kid.walk(f) == Visit::Stop {
                return Visit::Stop;
            }
        }
        Visit::Continue
    }

    /// Post-order mutable traversal.
    pub fn visit_mut(&mut self, f: &mut dyn FnMut(&mut Expr)) {
        match self {
            Expr::Choice(e) => {
                for kid in &mut e.exprs {
                    kid.visit_mut(f);
                }
            }
            Expr::Sequence(e) => {
                for kid in &mut e.exprs {
                    kid.visit_mut(f);
                }
            }
            Expr::Action(e) => e.expr.visit_mut(f),
            Expr::Label(e) => e.expr.visit_mut(f),
            Expr::Pred(e) => e.expr.visit_mut(f),
            Expr::Rep(e) => e.expr.visit_mut(f),
            Expr::Opt(e) => e.expr.visit_mut(f),
            Expr::Sub(e) => e.expr.visit_mut(f),
            Expr::PredCode(_)
            | Expr::Ident(_)
            | Expr::Literal(_)
            | Expr::Class(_)
            | Expr::Any(_) => {}
        }
        f(self)
    }

    pub fn children(&self) -> &[Expr] {
        match self {
            Expr::Choice(e) => &e.exprs,
            Expr::Sequence(e) => &e.exprs,
            Expr::Action(e) => std::slice::from_ref(&*e.expr),
            Expr::Label(e) => std::slice::from_ref(&*e.expr),
            Expr::Pred(e) => std::slice::from_ref(&*e.expr),
            Expr::Rep(e) => std::slice::from_ref(&*e.expr),
            Expr::Opt(e) => std::slice::from_ref(&*e.expr),
            Expr::Sub(e) => std::slice::from_ref(&*e.expr),
            Expr::PredCode(_)
            | Expr::Ident(_)
            | Expr::Literal(_)
            | Expr::Class(_)
            | Expr::Any(_) => &[],
        }
    }

    /// A clone with every identifier that is a key of `sub` renamed, both
    /// in plain name position and in template-argument position. Must run
    /// before checking: bookkeeping fields are not carried over.
    pub fn substituted(&self, sub: &HashMap<String, String>) -> Expr {
        let mut clone = self.clone();
        clone.visit_mut(&mut |e| match e {
            Expr::Ident(id) => {
                if let Some(new) = sub.get(id.name.name.as_str()) {
                    id.name.name = Text::new(new.clone(), id.name.name.span);
                }
                for arg in &mut id.name.args {
                    if let Some(new) = sub.get(arg.as_str()) {
                        *arg = Text::new(new.clone(), arg.span);
                    }
                }
            }
            Expr::Action(a) => a.labels.clear(),
            Expr::PredCode(p) => p.labels.clear(),
            _ => {}
        });
        clone
    }

    /// Whether the expression can match the empty string. Correct only
    /// once the left-recursion pass has filled rule epsilons along the
    /// reference chain.
    pub fn epsilon(&self, rules: &Rules) -> bool {
        match self {
            Expr::Choice(e) => e.exprs.iter().any(|s| s.epsilon(rules)),
            Expr::Sequence(e) => e.exprs.iter().all(|s| s.epsilon(rules)),
            Expr::Action(e) => e.expr.epsilon(rules),
            Expr::Label(e) => e.expr.epsilon(rules),
            Expr::Pred(_) | Expr::PredCode(_) | Expr::Opt(_) => true,
            Expr::Rep(e) => match e.op {
                RepOp::Star => true,
                RepOp::Plus => e.expr.epsilon(rules),
            },
            Expr::Sub(e) => e.expr.epsilon(rules),
            Expr::Ident(e) => match e.rule {
                Some(id) => rules[id].epsilon,
                None => false,
            },
            Expr::Literal(e) => e.text.str.is_empty(),
            Expr::Class(_) | Expr::Any(_) => false,
        }
    }

    /// Whether the expression can ever fail to parse. Parents of
    /// never-fail expressions need no failure branch.
    pub fn can_fail(&self, rules: &Rules) -> bool {
        match self {
            // A choice fails only if every branch can; a non-failing
            // branch always accepts.
            Expr::Choice(e) => e.exprs.iter().all(|s| s.can_fail(rules)),
            Expr::Sequence(e) => e.exprs.iter().any(|s| s.can_fail(rules)),
            Expr::Action(e) => e.expr.can_fail(rules),
            Expr::Label(e) => e.expr.can_fail(rules),
            Expr::Pred(e) => e.expr.can_fail(rules),
            Expr::Rep(e) => e.op == RepOp::Plus && e.expr.can_fail(rules),
            Expr::Opt(_) => false,
            Expr::Sub(e) => e.expr.can_fail(rules),
            Expr::PredCode(_) => true,
            Expr::Ident(_) => true,
            Expr::Literal(_) | Expr::Class(_) | Expr::Any(_) => true,
        }
    }

    /// The expression's result type in the action pass, as a type token
    /// of the target language. The empty type marks a subtree poisoned by
    /// an earlier error; it suppresses downstream mismatch reports.
    pub fn ty(&self, rules: &Rules) -> String {
        match self {
            // All branches share the first's type; the checker verifies.
            Expr::Choice(e) => e.exprs[0].ty(rules),
            Expr::Action(e) => e.ty.clone(),
            Expr::Sequence(e) => match e.exprs[0].ty(rules) {
                t if t.is_empty() => String::new(),
                t if t == "String" => t,
                t => format!("Vec<{t}>"),
            },
            Expr::Label(e) => e.expr.ty(rules),
            // Predicates match the empty string.
            Expr::Pred(_) | Expr::PredCode(_) => "String".to_string(),
            Expr::Rep(e) => match e.expr.ty(rules) {
                t if t.is_empty() => String::new(),
                t if t == "String" => t,
                t => format!("Vec<{t}>"),
            },
            Expr::Opt(e) => match e.expr.ty(rules) {
                t if t.is_empty() => String::new(),
                t if t == "String" => t,
                t => format!("Option<{t}>"),
            },
            Expr::Sub(e) => e.expr.ty(rules),
            Expr::Ident(e) => match e.rule {
                Some(id) => rules[id].ty().to_string(),
                None => String::new(),
            },
            Expr::Literal(_) | Expr::Class(_) | Expr::Any(_) => "String".to_string(),
        }
    }
}

fn span_of_list(exprs: &[Expr]) -> Span {
    let first = exprs.first().map(|e| e.span()).unwrap_or(Span::empty());
    let last = exprs.last().map(|e| e.span()).unwrap_or(Span::empty());
    first.join(last)
}
