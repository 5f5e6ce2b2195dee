//! Builds the checked-rule list, assigns memo-table columns, and binds
//! every identifier expression to its target rule.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::ast::{Expr, Grammar, RuleId};
use crate::error::ErrorAccumulator;

pub fn resolve(grammar: &mut Grammar, err: &ErrorAccumulator) {
    // Templates have been expanded away; everything else is checked and
    // gets a column index equal to its position.
    let checked: Vec<RuleId> = grammar
        .rules
        .iter()
        .filter(|(_, rule)| !rule.template)
        .map(|(id, _)| id)
        .collect();
    for (i, &id) in checked.iter().enumerate() {
        grammar.rules[id].n = i;
    }

    let mut by_name: HashMap<String, RuleId> = HashMap::new();
    for &id in &checked {
        let rule = &grammar.rules[id];
        match by_name.entry(rule.name.display()) {
            Entry::Occupied(_) => {
                err.error(
                    rule.span(),
                    format!("rule {} redefined", rule.name.display()),
                );
            }
            Entry::Vacant(v) => {
                v.insert(id);
            }
        }
    }

    for &id in &checked {
        grammar.rules[id].expr.visit_mut(&mut |e| {
            if let Expr::Ident(ident) = e {
                match by_name.get(&ident.name.display()) {
                    Some(&target) => ident.rule = Some(target),
                    None => err.error(
                        ident.name.span(),
                        format!("rule {} undefined", ident.name.display()),
                    ),
                }
            }
        });
    }

    grammar.checked = checked;
}
