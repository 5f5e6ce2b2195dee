//! packrat is a parser generator for Parsing Expression Grammars. It
//! reads a grammar file and emits Rust source for a packrat parser whose
//! first pass records, per (rule, input position), the number of bytes
//! accepted or the distance to the furthest error. The memo table is a
//! flat array of integers indexed directly, never hashed. The later
//! passes replay that table to build a parse tree, run semantic actions,
//! or assemble a failure tree for error messages.
//!
//! The pipeline: [`front`] parses the grammar surface, [`analysis`]
//! expands templates, binds names, rejects left recursion and fixes
//! types and labels, and [`codegen`] translates each checked rule into
//! up to four functions over the shared memo table. Generated parsers
//! link against the `packrat-runtime` crate.

pub mod analysis;
pub mod ast;
pub mod codegen;
pub mod display;
pub mod error;
pub mod fragment;
pub mod front;
pub mod linemap;
pub mod span;

pub use analysis::check;
pub use codegen::{generate, GenConfig};
pub use error::ErrorAccumulator;
pub use front::parse;
