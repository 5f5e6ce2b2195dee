//! End-to-end tests over the whole pipeline: grammar text in, checked
//! grammar and generated parser source out.

use packrat::display::{grammar_full_string, grammar_string};
use packrat::{check, generate, parse, ErrorAccumulator, GenConfig};

struct ParserTest {
    name: &'static str,
    input: &'static str,
    /// Expected fully parenthesized form.
    full: &'static str,
    /// Expected minimal form.
    string: &'static str,
}

const PARSER_TESTS: &[ParserTest] = &[
    ParserTest {
        name: "empty",
        input: "",
        full: "",
        string: "",
    },
    ParserTest {
        name: "only whitespace",
        input: "  \n\n\t    ",
        full: "",
        string: "",
    },
    ParserTest {
        name: "simple rule",
        input: "A <- B",
        full: "A <- (B)",
        string: "A <- B",
    },
    ParserTest {
        name: "named rule",
        input: "A \"name\" <- B",
        full: "A \"name\" <- (B)",
        string: "A \"name\" <- B",
    },
    ParserTest {
        name: "named rule, single quotes",
        input: "A 'name' <- B",
        full: "A \"name\" <- (B)",
        string: "A \"name\" <- B",
    },
    ParserTest {
        name: "named rule, empty name",
        input: "A \"\" <- B",
        full: "A \"\" <- (B)",
        string: "A \"\" <- B",
    },
    ParserTest {
        name: "named rule, escapes",
        input: "A \"\\t\\nabc\" <- B",
        full: "A \"\\t\\nabc\" <- (B)",
        string: "A \"\\t\\nabc\" <- B",
    },
    ParserTest {
        name: "multiple rules",
        input: "A <- B\nC <- D",
        full: "A <- (B)\nC <- (D)",
        string: "A <- B\nC <- D",
    },
    ParserTest {
        name: "choice",
        input: "A <- B/C/D",
        full: "A <- (((B)/(C))/(D))",
        string: "A <- B/C/D",
    },
    ParserTest {
        name: "sequence",
        input: "A <- B C D",
        full: "A <- (((B) (C)) (D))",
        string: "A <- B C D",
    },
    ParserTest {
        name: "comments dropped",
        input: "# heading\nA <- B # trailing\n# footer",
        full: "A <- (B)",
        string: "A <- B",
    },
    ParserTest {
        name: "literal escapes normalize",
        input: "A <- '\\x41\\377'",
        full: "A <- (\"Aÿ\")",
        string: "A <- \"Aÿ\"",
    },
    ParserTest {
        name: "char class",
        input: "A <- [a-z_0-9]",
        full: "A <- ([a-z_0-9])",
        string: "A <- [a-z_0-9]",
    },
    ParserTest {
        name: "negated class keeps caret",
        input: "A <- [^a\\-b]",
        full: "A <- ([^a\\-b])",
        string: "A <- [^a\\-b]",
    },
    ParserTest {
        name: "predicates and repetition",
        input: "A <- !B* &C+ D?",
        full: "A <- (((!((B)*)) (&((C)+))) ((D)?))",
        string: "A <- !B* &C+ D?",
    },
    ParserTest {
        name: "label binds tighter than sequence",
        input: "A <- l:B C",
        full: "A <- ((l:(B)) (C))",
        string: "A <- l:B C",
    },
    ParserTest {
        name: "source parens survive the minimal form",
        input: "A <- ( B C ) D",
        full: "A <- (((B) (C)) (D))",
        string: "A <- (B C) D",
    },
    ParserTest {
        name: "templates",
        input: "Sep<x, s> <- x (s x)*",
        full: "Sep<x, s> <- ((x) (((s) (x))*))",
        string: "Sep<x, s> <- x (s x)*",
    },
];

#[test]
fn parser_table() {
    for test in PARSER_TESTS {
        let err = ErrorAccumulator::new();
        let g = parse(test.input, &err)
            .unwrap_or_else(|| panic!("{}: {}", test.name, err.render("t", test.input)));
        assert_eq!(grammar_full_string(&g), test.full, "{}", test.name);
        assert_eq!(grammar_string(&g), test.string, "{}", test.name);
    }
}

#[test]
fn parser_round_trip() {
    for test in PARSER_TESTS {
        let err = ErrorAccumulator::new();
        let first = parse(test.input, &err).unwrap();
        let printed = grammar_string(&first);
        let second = parse(&printed, &err)
            .unwrap_or_else(|| panic!("{}: reparse of {:?}", test.name, printed));
        assert_eq!(
            grammar_full_string(&first),
            grammar_full_string(&second),
            "{}",
            test.name
        );
    }
}

#[test]
fn parse_errors() {
    for (input, want) in [
        ("A <- ", "unexpected end of file"),
        ("A <- (B", "unexpected end of file"),
        ("A <- \"abc", "unclosed \""),
        ("A <- [abc", "unclosed ["),
        ("A <- []", "bad char class: empty"),
        ("A <- [z-a]", "bad span"),
        ("A <- \"\\400\"", "octal escape >255"),
        ("A <- \"\\U00110000\"", "hex escape >0x10FFFF"),
        ("A <- \"\\q\"", "unknown escape sequence"),
        ("A <- { }", "syntax error"),
        ("A <- B @", "unexpected rune '@'"),
    ] {
        let err = ErrorAccumulator::new();
        assert!(parse(input, &err).is_none(), "{input:?} should not parse");
        let rendered = err.render("t", input);
        assert!(rendered.contains(want), "{input:?}: {rendered}");
    }
}

fn checked_gen(src: &str) -> String {
    let err = ErrorAccumulator::new();
    let mut g = parse(src, &err).expect("parse");
    check(&mut g, &err);
    assert!(err.is_empty(), "{}", err.render("t", src));
    generate(&g, "t", &GenConfig::default())
}

// The end-to-end scenarios the design is specified against. The
// generated parsers are not executed here; the translation they receive
// is pinned down instead.

#[test]
fn scenario_literal() {
    let out = checked_gen("A <- \"abc☺XYZ\"");
    assert!(out.contains("if !text[pos..].starts_with(\"abc☺XYZ\")"));
    assert!(out.contains("pos += 9;"));
    assert!(out.contains("= text[pos..pos + 9].to_string();"));
}

#[test]
fn scenario_char_class() {
    let out = checked_gen("A <- [a-zA-Z0-9☺]");
    assert!(out.contains("let (r, w) = peg::next(text, pos);"));
    assert!(out.contains("(r < 'a' || r > 'z')"));
    assert!(out.contains("r != '☺'"));
    assert!(out.contains("pos += w;"));
}

#[test]
fn scenario_repetition() {
    let out = checked_gen("A <- \"abc\"+");
    // One mandatory match against the enclosing fail target, then the
    // greedy loop with a local one.
    assert!(out.contains("loop {"));
    assert!(out.contains("continue;"));
    assert!(out.contains("break;"));
}

#[test]
fn scenario_calculator() {
    let src = include_str!("../../../docs/calc.peg");
    let out = checked_gen(src);
    for rule in ["Expr", "Sum", "Product", "Value", "Num"] {
        for pass in ["Accepts", "Node", "Fail", "Action"] {
            assert!(
                out.contains(&format!("pub fn _{rule}{pass}")),
                "missing _{rule}{pass}"
            );
        }
    }
    // The whitespace rule's ident mangles to a second underscore.
    assert!(out.contains("pub const __: usize ="));
    assert!(out.contains("pub const _N: usize = 6;"));
    // Num is a named rule.
    assert!(out.contains("failure.want = \"number\";"));
}

#[test]
fn scenario_labeled_predicate() {
    let out = checked_gen("A <- L:\"abc\"* &{ L == \"abcabcabc\" } \"xyz\"");
    assert!(out.contains("let mut labels: [&str; 1]"));
    assert!(out.contains("(|L: &str| -> bool { L == \"abcabcabc\" })(labels[0])"));
}

#[test]
fn scenario_left_recursion() {
    let err = ErrorAccumulator::new();
    let mut g = parse("A <- A", &err).expect("parse");
    check(&mut g, &err);
    assert_eq!(err.len(), 1);
    assert_eq!(
        err.render("t", "A <- A"),
        "t:1.1,1.2: left-recursion: A, A"
    );
}

#[test]
fn generated_file_shape() {
    let out = checked_gen("{ use std::fmt; }\nA <- B\nB <- \"x\"");
    let header = out.find("// Code generated by packrat").unwrap();
    let allow = out.find("#![allow(").unwrap();
    let prelude = out.find("use std::fmt;").unwrap();
    let consts = out.find("pub const _A: usize = 0;").unwrap();
    let parser = out.find("pub struct _Parser<'a>").unwrap();
    let rules = out.find("pub fn _AAccepts").unwrap();
    assert!(header < allow && allow < prelude && prelude < consts);
    assert!(consts < parser && parser < rules);
}

#[test]
fn memo_encodings_in_helpers() {
    let out = checked_gen("A <- \"x\"");
    // 0 means unattempted, p+1 accepted, -1 failed; d+1 for errors.
    assert!(out.contains("p.delta_pos[start][rule] = dpos as i32 + 1;"));
    assert!(out.contains("p.delta_pos[start][rule] = -1;"));
    assert!(out.contains("p.delta_err[start][rule] = derr as i32 + 1;"));
    assert!(out.contains("if dp == 0 {"));
}

#[test]
fn template_pipeline() {
    let src = "A <- Sep<B, Comma>\nB <- [b]\nComma <- \",\"\nSep<x, s> <- x (s x)*";
    let out = checked_gen(src);
    assert!(out.contains("pub fn _Sep__B__CommaAccepts"), "{out}");
    assert!(out.contains("name: \"Sep<B, Comma>\""));
}

#[test]
fn stripped_output_drops_labels_and_actions() {
    let err = ErrorAccumulator::new();
    let g = parse(
        "A <- l:B i64:{ 1 }\nB <- \"x\" (m:\"y\" { 2.0 })?",
        &err,
    )
    .expect("parse");
    let stripped: Vec<String> = g.rules.values().map(|r| r.stripped()).collect();
    assert_eq!(stripped[0], "A <- B");
    assert_eq!(stripped[1], "B <- \"x\" (\"y\")?");
}
