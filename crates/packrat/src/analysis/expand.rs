//! Template expansion: replaces every invocation of a parameterized rule
//! with a specialized clone produced by textual identifier substitution.

use std::collections::{HashMap, HashSet};

use crate::ast::{Expr, Grammar, Rule, RuleId, RuleName, Visit};
use crate::error::ErrorAccumulator;

pub fn expand(grammar: &mut Grammar, err: &ErrorAccumulator) {
    let mut templates: HashMap<String, RuleId> = HashMap::new();
    let mut work: Vec<RuleId> = Vec::new();

    for (id, rule) in grammar.rules.iter() {
        if !rule.template {
            work.push(id);
            continue;
        }
        let base = rule.name.name.as_str().to_string();
        if templates.insert(base, id).is_some() {
            err.error(
                rule.name.span(),
                format!("template {} redefined", rule.name.name),
            );
        }
        let mut seen = HashSet::new();
        for param in &rule.name.args {
            if !seen.insert(param.as_str().to_string()) {
                err.error(param.span, format!("parameter {param} redefined"));
            }
        }
    }

    // Every invocation reachable from a concrete rule gets one clone,
    // keyed by its printed form; clones join the worklist so nested
    // invocations expand too.
    let mut expanded: HashSet<String> = HashSet::new();
    let mut i = 0;
    while i < work.len() {
        let id = work[i];
        i += 1;

        let mut invocations: Vec<RuleName> = Vec::new();
        grammar.rules[id].expr.walk(&mut |e| {
            if let Expr::Ident(ident) = e {
                if !ident.name.args.is_empty() {
                    invocations.push(ident.name.clone());
                }
            }
            Visit::Continue
        });

        for inv in invocations {
            if !expanded.insert(inv.display()) {
                continue;
            }
            // A missing template is reported as an undefined rule once
            // resolution finds no specialization to bind to.
            let Some(&tid) = templates.get(inv.name.as_str()) else {
                continue;
            };
            let template = &grammar.rules[tid];
            if template.name.args.len() != inv.args.len() {
                err.error(
                    inv.span(),
                    format!(
                        "template {} expects {} arguments",
                        template.name.display(),
                        template.name.args.len()
                    ),
                );
                continue;
            }

            let mut sub = HashMap::new();
            for (param, arg) in template.name.args.iter().zip(&inv.args) {
                sub.insert(param.as_str().to_string(), arg.as_str().to_string());
            }
            let mut clone = Rule::new(
                inv.clone(),
                template.error_name.clone(),
                template.expr.substituted(&sub),
            );
            // The clone is a concrete rule whose display name is the
            // invocation itself.
            clone.template = false;
            let nid = grammar.rules.push(clone);
            work.push(nid);
        }
    }
}
