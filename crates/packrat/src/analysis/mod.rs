//! Semantic analysis: everything between a parsed grammar and code
//! generation.
//!
//! The passes run in a fixed order and fill the tree's bookkeeping fields
//! in place: template expansion clones specializations into the rule map,
//! resolution assigns memo-table columns and binds identifiers, fragment
//! checking validates embedded code and completes action types, the
//! left-recursion pass rejects left cycles and fixes every rule's type
//! and ε-flag, and the remaining passes verify type agreement and number
//! labels. All diagnostics land in the accumulator; callers generate code
//! only when it stays empty.

mod expand;
mod labels;
mod leftrec;
mod resolve;
mod types;

use crate::ast::Grammar;
use crate::error::ErrorAccumulator;
use crate::fragment;

pub fn check(grammar: &mut Grammar, err: &ErrorAccumulator) {
    expand::expand(grammar, err);
    resolve::resolve(grammar, err);
    fragment::check_fragments(grammar, err);
    leftrec::check_left(grammar, err);
    types::check_types(grammar, err);
    labels::collect_labels(grammar, err);
}
