//! The per-expression-form translation schema.
//!
//! Each checked rule is walked once per emitted pass. The walk threads
//! `pos` (current offset), `perr` (furthest error, accepts only), the
//! node or failure aggregate under construction, an optional carrier (the
//! place expression receiving the action value), and the name of the
//! labeled block to break out of on failure. The original design's `goto
//! fail` cleanup jumps map onto Rust labeled blocks one for one.
//!
//! Layout of the emitted text is flat; rustfmt owns the final shape.

use crate::ast::{Expr, Grammar, LabelInfo, RepOp, Rule, Rules};

use super::{w, GenConfig};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Pass {
    Accepts,
    Node,
    Fail,
    Action,
}

pub(super) fn rule_accepts(out: &mut String, g: &Grammar, cfg: &GenConfig, rule: &Rule) {
    let pre = &cfg.prefix;
    let id = rule.name.ident();
    w!(out, "\npub fn {pre}{id}Accepts<'a>(p: &mut {pre}Parser<'a>, start: usize) -> (isize, isize) {{\n");
    w!(out, "    let text = p.text;\n");
    labels_decl(out, rule);
    w!(out, "    if let Some((dp, de)) = {pre}memo(p, {pre}{id}, start) {{\n");
    w!(out, "    return (dp, de);\n    }}\n");
    w!(out, "    let mut pos = start;\n");
    w!(out, "    let mut perr: isize = -1;\n");
    w!(out, "    'fail: {{\n");
    emitter(g, pre, Pass::Accepts).expr(out, &rule.expr, None, "fail");
    if rule.error_name.is_some() {
        w!(out, "    perr = start as isize;\n");
    }
    w!(out, "    return {pre}memoize(p, {pre}{id}, start, pos as isize, perr);\n");
    w!(out, "    }}\n");
    w!(out, "    {pre}memoize(p, {pre}{id}, start, -1, perr)\n");
    w!(out, "}}\n");
}

pub(super) fn rule_node(out: &mut String, g: &Grammar, cfg: &GenConfig, rule: &Rule) {
    let pre = &cfg.prefix;
    let id = rule.name.ident();
    let display = q(&rule.name.display());
    w!(out, "\npub fn {pre}{id}Node<'a>(p: &mut {pre}Parser<'a>, start: usize) -> (isize, Option<Rc<peg::Node<'a>>>) {{\n");
    w!(out, "    let text = p.text;\n");
    labels_decl(out, rule);
    w!(out, "    let dp = p.delta_pos[start][{pre}{id}];\n");
    w!(out, "    if dp < 0 {{\n    return (-1, None);\n    }}\n");
    w!(out, "    let key = (start, {pre}{id});\n");
    w!(out, "    if let Some(node) = p.node.get(&key) {{\n");
    w!(out, "    return (start as isize + dp as isize - 1, Some(Rc::clone(node)));\n");
    w!(out, "    }}\n");
    w!(out, "    let mut pos = start;\n");
    w!(out, "    let mut node = peg::Node {{ name: {display}, text: \"\", kids: Vec::new() }};\n");
    w!(out, "    'fail: {{\n");
    emitter(g, pre, Pass::Node).expr(out, &rule.expr, None, "fail");
    w!(out, "    node.text = &text[start..pos];\n");
    w!(out, "    let node = Rc::new(node);\n");
    w!(out, "    p.node.insert(key, Rc::clone(&node));\n");
    w!(out, "    return (pos as isize, Some(node));\n");
    w!(out, "    }}\n");
    w!(out, "    (-1, None)\n");
    w!(out, "}}\n");
}

pub(super) fn rule_fail(out: &mut String, g: &Grammar, cfg: &GenConfig, rule: &Rule) {
    let pre = &cfg.prefix;
    let id = rule.name.ident();
    w!(out, "\npub fn {pre}{id}Fail<'a>(p: &mut {pre}Parser<'a>, start: usize, err_pos: usize) -> (isize, Rc<peg::Fail>) {{\n");
    w!(out, "    let text = p.text;\n");
    labels_decl(out, rule);
    w!(out, "    if let Some((pos, failure)) = {pre}fail_memo(p, {pre}{id}, start, err_pos) {{\n");
    w!(out, "    return (pos, failure);\n    }}\n");
    w!(out, "    let key = (start, {pre}{id});\n");
    w!(out, "    let mut pos = start;\n");
    w!(out, "    let mut failure = peg::Fail {{ name: {}, pos: start, ..Default::default() }};\n", q(&id));
    w!(out, "    'fail: {{\n");
    emitter(g, pre, Pass::Fail).expr(out, &rule.expr, None, "fail");
    if rule.error_name.is_some() {
        w!(out, "    failure.kids.clear();\n");
    }
    w!(out, "    let failure = Rc::new(failure);\n");
    w!(out, "    p.fail.insert(key, Rc::clone(&failure));\n");
    w!(out, "    return (pos as isize, failure);\n");
    w!(out, "    }}\n");
    if let Some(error_name) = &rule.error_name {
        w!(out, "    failure.kids.clear();\n");
        w!(out, "    failure.want = {};\n", q(error_name.as_str()));
    }
    w!(out, "    let failure = Rc::new(failure);\n");
    w!(out, "    p.fail.insert(key, Rc::clone(&failure));\n");
    w!(out, "    (-1, failure)\n");
    w!(out, "}}\n");
}

pub(super) fn rule_action(out: &mut String, g: &Grammar, cfg: &GenConfig, rule: &Rule) {
    let pre = &cfg.prefix;
    let id = rule.name.ident();
    let ty = rule.ty();
    w!(out, "\npub fn {pre}{id}Action<'a>(p: &mut {pre}Parser<'a>, start: usize) -> (isize, Option<{ty}>) {{\n");
    w!(out, "    let text = p.text;\n");
    labels_decl(out, rule);
    for label in &rule.labels {
        w!(out, "    let mut label{}: {} = Default::default();\n", label.n, label.ty);
    }
    w!(out, "    let dp = p.delta_pos[start][{pre}{id}];\n");
    w!(out, "    if dp < 0 {{\n    return (-1, None);\n    }}\n");
    w!(out, "    let key = (start, {pre}{id});\n");
    w!(out, "    if let Some(n) = p.act.get(&key) {{\n");
    w!(out, "    let n = n.downcast_ref::<{ty}>().unwrap().clone();\n");
    w!(out, "    return (start as isize + dp as isize - 1, Some(n));\n");
    w!(out, "    }}\n");
    w!(out, "    let mut pos = start;\n");
    w!(out, "    let mut node: {ty} = Default::default();\n");
    w!(out, "    'fail: {{\n");
    emitter(g, pre, Pass::Action).expr(out, &rule.expr, Some("node"), "fail");
    w!(out, "    p.act.insert(key, Rc::new(node.clone()));\n");
    w!(out, "    return (pos as isize, Some(node));\n");
    w!(out, "    }}\n");
    w!(out, "    (-1, None)\n");
    w!(out, "}}\n");
}

fn labels_decl(out: &mut String, rule: &Rule) {
    if rule.labels.is_empty() {
        return;
    }
    let n = rule.labels.len();
    w!(out, "    let mut labels: [&str; {n}] = [\"\"; {n}];\n");
}

fn emitter<'a>(g: &'a Grammar, pre: &'a str, pass: Pass) -> Emitter<'a> {
    Emitter { g, pre, pass, n: 0 }
}

struct Emitter<'a> {
    g: &'a Grammar,
    pre: &'a str,
    pass: Pass,
    n: u32,
}

impl<'a> Emitter<'a> {
    fn id(&mut self, base: &str) -> String {
        let n = self.n;
        self.n += 1;
        format!("{base}{n}")
    }

    fn rules(&self) -> &Rules {
        &self.g.rules
    }

    fn expr(&mut self, out: &mut String, e: &Expr, carrier: Option<&str>, fail: &str) {
        match e {
            Expr::Choice(_) => self.choice(out, e, carrier, fail),
            Expr::Action(_) => self.action(out, e, carrier, fail),
            Expr::Sequence(_) => self.sequence(out, e, carrier, fail),
            Expr::Label(_) => self.label(out, e, carrier, fail),
            Expr::Pred(_) => self.pred(out, e, carrier, fail),
            Expr::Rep(_) => self.rep(out, e, carrier, fail),
            Expr::Opt(_) => self.opt(out, e, carrier, fail),
            Expr::Sub(_) => self.sub(out, e, carrier, fail),
            Expr::PredCode(_) => self.pred_code(out, e, carrier, fail),
            Expr::Ident(_) => self.ident(out, e, carrier, fail),
            Expr::Literal(_) => self.literal(out, e, carrier, fail),
            Expr::Class(_) => self.class(out, e, carrier, fail),
            Expr::Any(_) => self.any(out, carrier, fail),
        }
    }

    fn comment(&self, out: &mut String, text: &str) {
        w!(out, "    // {}\n", text.replace('\n', " "));
    }

    /// The failure arm of a terminal match: record the furthest error in
    /// the accepts pass, append a failure leaf past the cutoff in the
    /// fail pass, and jump to the enclosing fail target.
    fn terminal_fail(&self, out: &mut String, want: &str, fail: &str) {
        match self.pass {
            Pass::Accepts => {
                w!(out, "    perr = {}max(perr, pos as isize);\n", self.pre);
            }
            Pass::Fail => {
                w!(out, "    if pos >= err_pos {{\n");
                w!(out, "    failure.kids.push(Rc::new(peg::Fail {{ pos, want: {}, ..Default::default() }}));\n", q(want));
                w!(out, "    }}\n");
            }
            Pass::Node | Pass::Action => {}
        }
        w!(out, "    break '{fail};\n");
    }

    fn literal(&mut self, out: &mut String, e: &Expr, carrier: Option<&str>, fail: &str) {
        let Expr::Literal(lit) = e else { unreachable!() };
        self.comment(out, &e.display());
        let s = lit.text.as_str();
        let n = s.len();
        w!(out, "    if !text[pos..].starts_with({}) {{\n", q(s));
        self.terminal_fail(out, &e.display(), fail);
        w!(out, "    }}\n");
        match self.pass {
            Pass::Node => {
                w!(out, "    node.kids.push({}leaf(text, pos, pos + {n}));\n", self.pre);
            }
            Pass::Action => {
                if let Some(c) = carrier {
                    w!(out, "    {c} = text[pos..pos + {n}].to_string();\n");
                }
            }
            _ => {}
        }
        w!(out, "    pos += {n};\n");
    }

    fn class(&mut self, out: &mut String, e: &Expr, carrier: Option<&str>, fail: &str) {
        let Expr::Class(class) = e else { unreachable!() };
        self.comment(out, &e.display());
        w!(out, "    {{\n");
        w!(out, "    let (r, w) = peg::next(text, pos);\n");
        let mut parts: Vec<String> = Vec::new();
        if class.neg {
            parts.push("w == 0 || r == '\\u{FFFD}'".to_string());
            for &(lo, hi) in &class.spans {
                if lo == hi {
                    parts.push(format!("r == {}", qr(lo)));
                } else {
                    parts.push(format!("(r >= {} && r <= {})", qr(lo), qr(hi)));
                }
            }
            w!(out, "    if {} {{\n", parts.join(" || "));
        } else {
            for &(lo, hi) in &class.spans {
                if lo == hi {
                    parts.push(format!("r != {}", qr(lo)));
                } else {
                    parts.push(format!("(r < {} || r > {})", qr(lo), qr(hi)));
                }
            }
            w!(out, "    if {} {{\n", parts.join(" && "));
        }
        self.terminal_fail(out, &e.display(), fail);
        w!(out, "    }}\n");
        self.rune_match_tail(out, carrier);
        w!(out, "    }}\n");
    }

    fn any(&mut self, out: &mut String, carrier: Option<&str>, fail: &str) {
        self.comment(out, ".");
        w!(out, "    {{\n");
        w!(out, "    let (r, w) = peg::next(text, pos);\n");
        w!(out, "    if w == 0 || r == '\\u{{FFFD}}' {{\n");
        self.terminal_fail(out, ".", fail);
        w!(out, "    }}\n");
        self.rune_match_tail(out, carrier);
        w!(out, "    }}\n");
    }

    fn rune_match_tail(&self, out: &mut String, carrier: Option<&str>) {
        match self.pass {
            Pass::Node => {
                w!(out, "    node.kids.push({}leaf(text, pos, pos + w));\n", self.pre);
            }
            Pass::Action => {
                if let Some(c) = carrier {
                    w!(out, "    {c} = text[pos..pos + w].to_string();\n");
                }
            }
            _ => {}
        }
        w!(out, "    pos += w;\n");
    }

    fn ident(&mut self, out: &mut String, e: &Expr, carrier: Option<&str>, fail: &str) {
        let Expr::Ident(ident) = e else { unreachable!() };
        self.comment(out, &e.display());
        let pre = self.pre;
        let target = self.g.rules[ident.rule.expect("unresolved ident in codegen")]
            .name
            .ident();
        match self.pass {
            Pass::Accepts => {
                w!(out, "    if !{pre}accept(p, {pre}{target}Accepts, &mut pos, &mut perr) {{\n");
                w!(out, "    break '{fail};\n    }}\n");
            }
            Pass::Node => {
                w!(out, "    if !{pre}node(p, {pre}{target}Node, &mut node, &mut pos) {{\n");
                w!(out, "    break '{fail};\n    }}\n");
            }
            Pass::Fail => {
                w!(out, "    if !{pre}fail(p, {pre}{target}Fail, err_pos, &mut failure, &mut pos) {{\n");
                w!(out, "    break '{fail};\n    }}\n");
            }
            Pass::Action => {
                let np = self.id("np");
                let n = self.id("n");
                w!(out, "    {{\n");
                w!(out, "    let ({np}, {n}) = {pre}{target}Action(p, pos);\n");
                w!(out, "    let Some({n}) = {n} else {{\n    break '{fail};\n    }};\n");
                if let Some(c) = carrier {
                    w!(out, "    {c} = {n};\n");
                } else {
                    w!(out, "    let _ = {n};\n");
                }
                w!(out, "    pos = {np} as usize;\n");
                w!(out, "    }}\n");
            }
        }
    }

    fn sub(&mut self, out: &mut String, e: &Expr, carrier: Option<&str>, fail: &str) {
        let Expr::Sub(sub) = e else { unreachable!() };
        if self.pass != Pass::Node {
            self.expr(out, &sub.expr, carrier, fail);
            return;
        }
        self.comment(out, &e.display());
        let pre = self.pre;
        let nkids = self.id("nkids");
        let pos0 = self.id("pos");
        w!(out, "    {{\n");
        w!(out, "    let {nkids} = node.kids.len();\n");
        w!(out, "    let {pos0} = pos;\n");
        self.expr(out, &sub.expr, carrier, fail);
        w!(out, "    let sub = {pre}sub(text, {pos0}, pos, &node.kids[{nkids}..]);\n");
        w!(out, "    node.kids.truncate({nkids});\n");
        w!(out, "    node.kids.push(sub);\n");
        w!(out, "    }}\n");
    }

    fn sequence(&mut self, out: &mut String, e: &Expr, carrier: Option<&str>, fail: &str) {
        let Expr::Sequence(seq) = e else { unreachable!() };
        self.comment(out, &e.display());
        let with_value = self.pass == Pass::Action && carrier.is_some();
        if !with_value {
            for factor in &seq.exprs {
                self.expr(out, factor, None, fail);
            }
            return;
        }
        let c = carrier.unwrap();
        if e.ty(self.rules()) == "String" {
            // String sequences concatenate factor by factor.
            let acc = self.id("seq");
            w!(out, "    {{\n");
            w!(out, "    let mut {acc} = String::new();\n");
            for factor in &seq.exprs {
                self.expr(out, factor, Some(&acc), fail);
                w!(out, "    {c}.push_str(&{acc});\n");
                w!(out, "    {acc}.clear();\n");
            }
            w!(out, "    }}\n");
        } else {
            // Element sequences fill a pre-sized vector in factor order.
            let elem = seq.exprs[0].ty(self.rules());
            w!(out, "    {c} = Vec::with_capacity({});\n", seq.exprs.len());
            for factor in &seq.exprs {
                let tmp = self.id("seq");
                w!(out, "    {{\n");
                w!(out, "    let mut {tmp}: {elem} = Default::default();\n");
                self.expr(out, factor, Some(&tmp), fail);
                w!(out, "    {c}.push({tmp});\n");
                w!(out, "    }}\n");
            }
        }
    }

    fn choice(&mut self, out: &mut String, e: &Expr, carrier: Option<&str>, fail: &str) {
        let Expr::Choice(choice) = e else { unreachable!() };
        self.comment(out, &e.display());
        let pos0 = self.id("pos");
        w!(out, "    {{\n");
        w!(out, "    let {pos0} = pos;\n");
        let nkids = match self.pass {
            Pass::Node => {
                let nkids = self.id("nkids");
                w!(out, "    let {nkids} = node.kids.len();\n");
                Some(nkids)
            }
            _ => None,
        };
        let ok = self.id("ok");
        w!(out, "    '{ok}: {{\n");
        let last = choice.exprs.len() - 1;
        for (i, branch) in choice.exprs.iter().enumerate() {
            if !branch.can_fail(self.rules()) {
                self.expr(out, branch, carrier, fail);
                w!(out, "    break '{ok};\n");
                continue;
            }
            let bfail = self.id("fail");
            w!(out, "    '{bfail}: {{\n");
            self.expr(out, branch, carrier, &bfail);
            w!(out, "    break '{ok};\n");
            w!(out, "    }}\n");
            // The branch failed: restore and try the next one, or give
            // up after the last.
            w!(out, "    pos = {pos0};\n");
            if let Some(nkids) = &nkids {
                w!(out, "    node.kids.truncate({nkids});\n");
            }
            if self.pass == Pass::Action {
                if let Some(c) = carrier {
                    w!(out, "    {c} = Default::default();\n");
                }
            }
            if i == last {
                w!(out, "    break '{fail};\n");
            }
        }
        w!(out, "    }}\n");
        w!(out, "    }}\n");
    }

    fn label(&mut self, out: &mut String, e: &Expr, carrier: Option<&str>, fail: &str) {
        let Expr::Label(label) = e else { unreachable!() };
        self.comment(out, &e.display());
        let pos0 = self.id("pos");
        w!(out, "    {{\n");
        w!(out, "    let {pos0} = pos;\n");
        if self.pass == Pass::Action {
            let slot = format!("label{}", label.n);
            self.expr(out, &label.expr, Some(&slot), fail);
            if let Some(c) = carrier {
                w!(out, "    {c} = {slot}.clone();\n");
            }
        } else {
            self.expr(out, &label.expr, None, fail);
        }
        w!(out, "    labels[{}] = &text[{pos0}..pos];\n", label.n);
        w!(out, "    }}\n");
    }

    fn pred(&mut self, out: &mut String, e: &Expr, carrier: Option<&str>, fail: &str) {
        let Expr::Pred(pred) = e else { unreachable!() };
        self.comment(out, &e.display());
        let pre = self.pre;
        let pos0 = self.id("pos");
        w!(out, "    {{\n");
        w!(out, "    let {pos0} = pos;\n");
        let perr0 = match self.pass {
            Pass::Accepts => {
                let perr0 = self.id("perr");
                w!(out, "    let {perr0} = perr;\n");
                Some(perr0)
            }
            _ => None,
        };
        let nkids = match self.pass {
            Pass::Node => {
                let nkids = self.id("nkids");
                w!(out, "    let {nkids} = node.kids.len();\n");
                Some(nkids)
            }
            Pass::Fail => {
                let nkids = self.id("nkids");
                w!(out, "    let {nkids} = failure.kids.len();\n");
                Some(nkids)
            }
            _ => None,
        };

        let fail_arm = |out: &mut String, em: &Emitter| {
            w!(out, "    pos = {pos0};\n");
            match em.pass {
                Pass::Accepts => {
                    let perr0 = perr0.as_ref().unwrap();
                    w!(out, "    perr = {pre}max({perr0}, pos as isize);\n");
                }
                Pass::Node => {
                    if pred.neg {
                        let nkids = nkids.as_ref().unwrap();
                        w!(out, "    node.kids.truncate({nkids});\n");
                    }
                }
                Pass::Fail => {
                    let nkids = nkids.as_ref().unwrap();
                    w!(out, "    failure.kids.truncate({nkids});\n");
                    w!(out, "    if pos >= err_pos {{\n");
                    w!(out, "    failure.kids.push(Rc::new(peg::Fail {{ pos, want: {}, ..Default::default() }}));\n", q(&e.display()));
                    w!(out, "    }}\n");
                }
                Pass::Action => {}
            }
            w!(out, "    break '{fail};\n");
        };

        if pred.neg {
            let efail = self.id("fail");
            w!(out, "    '{efail}: {{\n");
            self.expr(out, &pred.expr, None, &efail);
            // The subexpression matched, so the negated predicate fails.
            fail_arm(out, self);
            w!(out, "    }}\n");
        } else {
            let ok = self.id("ok");
            let efail = self.id("fail");
            w!(out, "    '{ok}: {{\n");
            w!(out, "    '{efail}: {{\n");
            self.expr(out, &pred.expr, None, &efail);
            w!(out, "    break '{ok};\n");
            w!(out, "    }}\n");
            fail_arm(out, self);
            w!(out, "    }}\n");
        }

        // The predicate holds: consume nothing and restore the pass
        // aggregates the lookahead touched.
        w!(out, "    pos = {pos0};\n");
        match self.pass {
            Pass::Accepts => {
                let perr0 = perr0.as_ref().unwrap();
                w!(out, "    perr = {perr0};\n");
            }
            Pass::Node => {
                let nkids = nkids.as_ref().unwrap();
                w!(out, "    node.kids.truncate({nkids});\n");
            }
            Pass::Fail => {
                let nkids = nkids.as_ref().unwrap();
                w!(out, "    failure.kids.truncate({nkids});\n");
            }
            Pass::Action => {
                if let Some(c) = carrier {
                    w!(out, "    {c} = String::new();\n");
                }
            }
        }
        w!(out, "    }}\n");
    }

    fn rep(&mut self, out: &mut String, e: &Expr, carrier: Option<&str>, fail: &str) {
        let Expr::Rep(rep) = e else { unreachable!() };
        self.comment(out, &e.display());
        let with_value = self.pass == Pass::Action && carrier.is_some();
        let is_string = e.ty(self.rules()) == "String";
        let sub_ty = rep.expr.ty(self.rules());

        if rep.op == RepOp::Plus {
            // The first match runs against the enclosing fail target.
            if with_value {
                let tmp = self.id("node");
                w!(out, "    {{\n");
                w!(out, "    let mut {tmp}: {sub_ty} = Default::default();\n");
                self.expr(out, &rep.expr, Some(&tmp), fail);
                accumulate(out, carrier.unwrap(), &tmp, is_string);
                w!(out, "    }}\n");
            } else {
                self.expr(out, &rep.expr, None, fail);
            }
        }

        w!(out, "    loop {{\n");
        let nkids = match self.pass {
            Pass::Node => {
                let nkids = self.id("nkids");
                w!(out, "    let {nkids} = node.kids.len();\n");
                Some(nkids)
            }
            _ => None,
        };
        let pos0 = self.id("pos");
        w!(out, "    let {pos0} = pos;\n");
        let lfail = self.id("fail");
        w!(out, "    '{lfail}: {{\n");
        if with_value {
            let tmp = self.id("node");
            w!(out, "    let mut {tmp}: {sub_ty} = Default::default();\n");
            self.expr(out, &rep.expr, Some(&tmp), &lfail);
            accumulate(out, carrier.unwrap(), &tmp, is_string);
        } else {
            self.expr(out, &rep.expr, None, &lfail);
        }
        w!(out, "    continue;\n");
        w!(out, "    }}\n");
        if let Some(nkids) = &nkids {
            w!(out, "    node.kids.truncate({nkids});\n");
        }
        w!(out, "    pos = {pos0};\n");
        w!(out, "    break;\n");
        w!(out, "    }}\n");
    }

    fn opt(&mut self, out: &mut String, e: &Expr, carrier: Option<&str>, fail: &str) {
        let Expr::Opt(opt) = e else { unreachable!() };
        let with_value = self.pass == Pass::Action && carrier.is_some();
        let is_string = opt.expr.ty(self.rules()) == "String";
        if !opt.expr.can_fail(self.rules()) {
            // The subexpression always accepts; only the value shape
            // differs from emitting it plain.
            if with_value && !is_string {
                let tmp = self.id("node");
                let sub_ty = opt.expr.ty(self.rules());
                w!(out, "    {{\n");
                w!(out, "    let mut {tmp}: {sub_ty} = Default::default();\n");
                self.expr(out, &opt.expr, Some(&tmp), fail);
                w!(out, "    {} = Some({tmp});\n", carrier.unwrap());
                w!(out, "    }}\n");
            } else {
                self.expr(out, &opt.expr, carrier, fail);
            }
            return;
        }
        self.comment(out, &e.display());
        w!(out, "    {{\n");
        let nkids = match self.pass {
            Pass::Node => {
                let nkids = self.id("nkids");
                w!(out, "    let {nkids} = node.kids.len();\n");
                Some(nkids)
            }
            _ => None,
        };
        let pos0 = self.id("pos");
        w!(out, "    let {pos0} = pos;\n");
        let ok = self.id("ok");
        let ofail = self.id("fail");
        w!(out, "    '{ok}: {{\n");
        w!(out, "    '{ofail}: {{\n");
        if with_value && is_string {
            self.expr(out, &opt.expr, carrier, &ofail);
        } else if with_value {
            let tmp = self.id("node");
            let sub_ty = opt.expr.ty(self.rules());
            w!(out, "    let mut {tmp}: {sub_ty} = Default::default();\n");
            self.expr(out, &opt.expr, Some(&tmp), &ofail);
            w!(out, "    {} = Some({tmp});\n", carrier.unwrap());
        } else {
            self.expr(out, &opt.expr, None, &ofail);
        }
        w!(out, "    break '{ok};\n");
        w!(out, "    }}\n");
        // No match: an optional accepts empty and leaves the zero value.
        if let Some(nkids) = &nkids {
            w!(out, "    node.kids.truncate({nkids});\n");
        }
        if with_value && is_string {
            w!(out, "    {} = String::new();\n", carrier.unwrap());
        } else if with_value {
            w!(out, "    {} = None;\n", carrier.unwrap());
        }
        w!(out, "    pos = {pos0};\n");
        w!(out, "    }}\n");
        w!(out, "    }}\n");
    }

    fn pred_code(&mut self, out: &mut String, e: &Expr, carrier: Option<&str>, fail: &str) {
        let Expr::PredCode(pred) = e else { unreachable!() };
        self.comment(out, "pred code");
        let params = pred
            .labels
            .iter()
            .map(|l| format!("{}: &str", l.name))
            .collect::<Vec<_>>()
            .join(", ");
        let args = pred
            .labels
            .iter()
            .map(|l| format!("labels[{}]", l.n))
            .collect::<Vec<_>>()
            .join(", ");
        let bang = if pred.neg { "" } else { "!" };
        w!(out, "    if {bang}(|{params}| -> bool {{{}}})({args}) {{\n", pred.code);
        self.terminal_fail(out, &e.display(), fail);
        w!(out, "    }}\n");
        if self.pass == Pass::Action {
            if let Some(c) = carrier {
                w!(out, "    {c} = String::new();\n");
            }
        }
    }

    fn action(&mut self, out: &mut String, e: &Expr, carrier: Option<&str>, fail: &str) {
        let Expr::Action(action) = e else { unreachable!() };
        if self.pass != Pass::Action {
            self.expr(out, &action.expr, None, fail);
            return;
        }
        self.comment(out, "action");
        let start0 = self.id("start");
        w!(out, "    {{\n");
        w!(out, "    let {start0} = pos;\n");
        self.expr(out, &action.expr, None, fail);
        let params = closure_params(&action.labels);
        let args = closure_args(&start0, &action.labels);
        match carrier {
            Some(c) => {
                w!(out, "    {c} = (|{params}| -> {} {{{}}})({args});\n", action.ty, action.code);
            }
            None => {
                w!(out, "    let _ = (|{params}| -> {} {{{}}})({args});\n", action.ty, action.code);
            }
        }
        w!(out, "    }}\n");
    }
}

fn accumulate(out: &mut String, carrier: &str, tmp: &str, is_string: bool) {
    if is_string {
        w!(out, "    {carrier}.push_str(&{tmp});\n");
    } else {
        w!(out, "    {carrier}.push({tmp});\n");
    }
}

fn closure_params(labels: &[LabelInfo]) -> String {
    let mut params = vec!["start: usize".to_string(), "end: usize".to_string()];
    for label in labels {
        params.push(format!("{}: {}", label.name, label.ty));
    }
    params.join(", ")
}

fn closure_args(start0: &str, labels: &[LabelInfo]) -> String {
    let mut args = vec![start0.to_string(), "pos".to_string()];
    for label in labels {
        args.push(format!("label{}.clone()", label.n));
    }
    args.join(", ")
}

/// A Rust string literal for `s`.
fn q(s: &str) -> String {
    format!("{s:?}")
}

/// A Rust char literal for `r`.
fn qr(r: char) -> String {
    format!("{r:?}")
}
