use crate::ast::{
    Action, Any, Choice, Class, Expr, Grammar, Ident, Label, Literal, Opt, Pred, PredCode, Rep,
    RepOp, Rule, RuleName, Sequence, Sub,
};
use crate::error::ErrorAccumulator;
use crate::span::{Span, Text};

use super::lexer::{lex, Token, TokenKind};

/// Parses a grammar file. Reports errors through the accumulator and
/// returns None on the first syntax error; a grammar is only handed to
/// the semantic passes when its surface form is sound.
pub fn parse(src: &str, err: &ErrorAccumulator) -> Option<Grammar> {
    let tokens = lex(src, err)?;
    let mut parser = Parser {
        tokens,
        i: 0,
        err,
    };
    parser.file()
}

struct Parser<'e> {
    tokens: Vec<Token>,
    i: usize,
    err: &'e ErrorAccumulator,
}

impl<'e> Parser<'e> {
    fn peek(&self) -> &Token {
        &self.tokens[self.i]
    }

    fn peek_at(&self, n: usize) -> &TokenKind {
        let i = (self.i + n).min(self.tokens.len() - 1);
        &self.tokens[i].kind
    }

    fn bump(&mut self) -> Token {
        let tok = self.tokens[self.i].clone();
        if self.i + 1 < self.tokens.len() {
            self.i += 1;
        }
        tok
    }

    fn at(&self, kind: &TokenKind) -> bool {
        self.peek().kind == *kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.bump();
            return true;
        }
        false
    }

    fn syntax_error(&mut self) {
        let tok = self.peek();
        let what = match &tok.kind {
            TokenKind::Eof => "unexpected end of file".to_string(),
            TokenKind::Newline => "unexpected newline".to_string(),
            TokenKind::Unknown(r) => format!("unexpected rune {r:?}"),
            _ => "syntax error".to_string(),
        };
        self.err.error(tok.span, what);
    }

    fn skip_newlines(&mut self) {
        while self.at(&TokenKind::Newline) {
            self.bump();
        }
    }

    fn file(&mut self) -> Option<Grammar> {
        self.skip_newlines();
        let prelude = match &self.peek().kind {
            TokenKind::Code(code) => {
                let code = code.clone();
                let span = self.peek().span;
                self.bump();
                Some(Text::new(code, span))
            }
            _ => None,
        };
        self.skip_newlines();

        let mut rules = Vec::new();
        while !self.at(&TokenKind::Eof) {
            let rule = self.rule()?;
            rules.push(rule);
            if !self.at(&TokenKind::Eof) && !self.at(&TokenKind::Newline) {
                self.syntax_error();
                return None;
            }
            self.skip_newlines();
        }
        Some(Grammar::new(prelude, rules))
    }

    fn rule(&mut self) -> Option<Rule> {
        let name = self.rule_name()?;
        let error_name = match &self.peek().kind {
            TokenKind::Str(s) => {
                let text = Text::new(s.clone(), self.peek().span);
                self.bump();
                Some(text)
            }
            _ => None,
        };
        if !self.eat(&TokenKind::Arrow) {
            self.syntax_error();
            return None;
        }
        let expr = self.choice()?;
        Some(Rule::new(name, error_name, expr))
    }

    fn rule_name(&mut self) -> Option<RuleName> {
        let tok = self.bump();
        let TokenKind::Ident(name) = tok.kind else {
            self.i -= 1;
            self.syntax_error();
            return None;
        };
        let name = Text::new(name, tok.span);
        let args = self.name_args()?;
        Some(RuleName { name, args })
    }

    /// The `<a, b>` suffix of a template declaration or invocation.
    fn name_args(&mut self) -> Option<Vec<Text>> {
        if !self.eat(&TokenKind::Lt) {
            return Some(Vec::new());
        }
        let mut args = Vec::new();
        loop {
            let tok = self.bump();
            let TokenKind::Ident(arg) = tok.kind else {
                self.i -= 1;
                self.syntax_error();
                return None;
            };
            args.push(Text::new(arg, tok.span));
            if self.eat(&TokenKind::Comma) {
                continue;
            }
            if self.eat(&TokenKind::Gt) {
                return Some(args);
            }
            self.syntax_error();
            return None;
        }
    }

    fn choice(&mut self) -> Option<Expr> {
        let first = self.action_expr()?;
        if !self.at(&TokenKind::Slash) {
            return Some(first);
        }
        let mut exprs = vec![first];
        while self.eat(&TokenKind::Slash) {
            exprs.push(self.action_expr()?);
        }
        Some(Expr::Choice(Choice { exprs }))
    }

    /// A sequence with any number of trailing actions, `E {a}` or
    /// `E Type:{a}` (the type an identifier or a quoted string).
    fn action_expr(&mut self) -> Option<Expr> {
        let mut expr = self.sequence()?;
        loop {
            match self.action_suffix() {
                Some((ty, code)) => {
                    expr = Expr::Action(Action {
                        expr: Box::new(expr),
                        code,
                        ty,
                        labels: Vec::new(),
                    });
                }
                None => return Some(expr),
            }
        }
    }

    fn action_suffix(&mut self) -> Option<(String, Text)> {
        match (self.peek_at(0), self.peek_at(1), self.peek_at(2)) {
            (TokenKind::Code(code), _, _) => {
                let code = Text::new(code.clone(), self.peek().span);
                self.bump();
                Some((String::new(), code))
            }
            (TokenKind::Ident(ty), TokenKind::Colon, TokenKind::Code(code)) => {
                let ty = ty.clone();
                let code = code.clone();
                self.bump();
                self.bump();
                let span = self.peek().span;
                self.bump();
                Some((ty, Text::new(code, span)))
            }
            (TokenKind::Str(ty), TokenKind::Colon, TokenKind::Code(code)) => {
                let ty = ty.clone();
                let code = code.clone();
                self.bump();
                self.bump();
                let span = self.peek().span;
                self.bump();
                Some((ty, Text::new(code, span)))
            }
            _ => None,
        }
    }

    fn sequence(&mut self) -> Option<Expr> {
        let first = self.labeled()?;
        let mut exprs = vec![first];
        while self.starts_sequence_item() {
            exprs.push(self.labeled()?);
        }
        if exprs.len() == 1 {
            return Some(exprs.pop().unwrap());
        }
        Some(Expr::Sequence(Sequence { exprs }))
    }

    fn starts_sequence_item(&self) -> bool {
        match self.peek_at(0) {
            // An identifier or string directly followed by `:{` is an
            // action type annotation, not a sequence item.
            TokenKind::Ident(_) | TokenKind::Str(_) => !matches!(
                (self.peek_at(1), self.peek_at(2)),
                (TokenKind::Colon, TokenKind::Code(_))
            ),
            TokenKind::Class(_)
            | TokenKind::Dot
            | TokenKind::Open
            | TokenKind::Amp
            | TokenKind::Bang => true,
            _ => false,
        }
    }

    fn labeled(&mut self) -> Option<Expr> {
        if let TokenKind::Ident(name) = self.peek_at(0) {
            if *self.peek_at(1) == TokenKind::Colon {
                let name = name.clone();
                let span = self.peek().span;
                self.bump();
                self.bump();
                let expr = self.labeled()?;
                return Some(Expr::Label(Label {
                    label: Text::new(name, span),
                    expr: Box::new(expr),
                    n: 0,
                }));
            }
        }
        self.pred()
    }

    fn pred(&mut self) -> Option<Expr> {
        let neg = match self.peek_at(0) {
            TokenKind::Amp => false,
            TokenKind::Bang => true,
            _ => return self.rep(),
        };
        let loc = self.peek().span;
        self.bump();
        if let TokenKind::Code(code) = self.peek_at(0) {
            let code = Text::new(code.clone(), self.peek().span);
            self.bump();
            return Some(Expr::PredCode(PredCode {
                neg,
                code,
                loc,
                labels: Vec::new(),
            }));
        }
        let expr = self.pred()?;
        Some(Expr::Pred(Pred {
            neg,
            expr: Box::new(expr),
            loc,
        }))
    }

    fn rep(&mut self) -> Option<Expr> {
        let mut expr = self.primary()?;
        loop {
            let loc = self.peek().span;
            match self.peek_at(0) {
                TokenKind::Star => {
                    self.bump();
                    expr = Expr::Rep(Rep {
                        op: RepOp::Star,
                        expr: Box::new(expr),
                        loc,
                    });
                }
                TokenKind::Plus => {
                    self.bump();
                    expr = Expr::Rep(Rep {
                        op: RepOp::Plus,
                        expr: Box::new(expr),
                        loc,
                    });
                }
                TokenKind::Question => {
                    self.bump();
                    expr = Expr::Opt(Opt {
                        expr: Box::new(expr),
                        loc,
                    });
                }
                _ => return Some(expr),
            }
        }
    }

    fn primary(&mut self) -> Option<Expr> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Open => {
                self.bump();
                let expr = self.choice()?;
                let close = self.peek().span;
                if !self.eat(&TokenKind::Close) {
                    self.syntax_error();
                    return None;
                }
                Some(Expr::Sub(Sub {
                    expr: Box::new(expr),
                    open: tok.span,
                    close,
                }))
            }
            TokenKind::Dot => {
                self.bump();
                Some(Expr::Any(Any { loc: tok.span }))
            }
            TokenKind::Ident(name) => {
                self.bump();
                let name = RuleName {
                    name: Text::new(name, tok.span),
                    args: self.name_args()?,
                };
                Some(Expr::Ident(Ident { name, rule: None }))
            }
            TokenKind::Str(text) => {
                self.bump();
                Some(Expr::Literal(Literal {
                    text: Text::new(text, tok.span),
                }))
            }
            TokenKind::Class(class) => {
                self.bump();
                Some(Expr::Class(Class {
                    spans: class.spans,
                    neg: class.neg,
                    open: Span::at(tok.span.start),
                    close: tok.span,
                }))
            }
            _ => {
                self.syntax_error();
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{grammar_full_string, grammar_string};

    fn parse_ok(src: &str) -> Grammar {
        let err = ErrorAccumulator::new();
        let grammar = parse(src, &err);
        assert!(err.is_empty(), "{}", err.render("test.file", src));
        grammar.unwrap()
    }

    fn parse_err(src: &str) -> String {
        let err = ErrorAccumulator::new();
        assert!(parse(src, &err).is_none());
        err.render("test.file", src)
    }

    #[track_caller]
    fn check(src: &str, full: &str) {
        let g = parse_ok(src);
        assert_eq!(grammar_full_string(&g), full);
    }

    #[test]
    fn empty_inputs() {
        check("", "");
        check("  \n\n\t    ", "");
        check("# only a comment\n", "");
    }

    #[test]
    fn simple_rules() {
        check("A <- B", "A <- (B)");
        check("A <- B\nC <- D", "A <- (B)\nC <- (D)");
        check("\tA <- B\n   \n\n    C <- D\t  ", "A <- (B)\nC <- (D)");
    }

    #[test]
    fn named_rules() {
        check(r#"A "name" <- B"#, r#"A "name" <- (B)"#);
        check(r#"A 'name' <- B"#, r#"A "name" <- (B)"#);
        check(r#"A "" <- B"#, r#"A "" <- (B)"#);
    }

    #[test]
    fn precedence_ladder() {
        check("A <- B/C D/E", "A <- (((B)/((C) (D)))/(E))");
        check("A <- a:B*", "A <- (a:((B)*))");
        check("A <- !B+", "A <- (!((B)+))");
        check("A <- (B/C) D", "A <- (((B)/(C)) (D))");
        check("A <- B C?", "A <- ((B) ((C)?))");
        check("A <- &!B", "A <- (&(!(B)))");
    }

    #[test]
    fn actions() {
        check("A <- B { go() }", "A <- ((B) { go() })");
        check("A <- B T:{ mk() }", "A <- ((B) T:{ mk() })");
        check(
            r#"A <- B "Vec<u8>":{ mk() }"#,
            r#"A <- ((B) "Vec<u8>":{ mk() })"#,
        );
        // Actions bind tighter than choice, looser than sequence.
        check("A <- B/C { f() }", "A <- ((B)/((C) { f() }))");
        // Actions stack.
        check("A <- B { f() } { g() }", "A <- (((B) { f() }) { g() })");
    }

    #[test]
    fn pred_code() {
        check("A <- &{ ok() } B", "A <- ((&{ ok() }) (B))");
        check("A <- !{ ok() }", "A <- (!{ ok() })");
    }

    #[test]
    fn labels_nest() {
        check("A <- l:m:B", "A <- (l:(m:(B)))");
    }

    #[test]
    fn templates() {
        check("List<x> <- x List<x>?", "List<x> <- ((x) ((List<x>)?))");
        check("A <- List<B, C>", "A <- (List<B, C>)");
    }

    #[test]
    fn prelude() {
        let g = parse_ok("{ use std::fmt; }\nA <- B");
        assert_eq!(g.prelude.as_ref().unwrap().as_str(), " use std::fmt; ");
        assert_eq!(grammar_string(&g), "A <- B");
    }

    #[test]
    fn string_form_minimal() {
        let g = parse_ok("A <- B  ( C / D )*   # comment");
        assert_eq!(grammar_string(&g), "A <- B (C/D)*");
    }

    #[test]
    fn reparse_full_string_is_stable() {
        let srcs = [
            "A <- B/C D/E",
            "A <- a:B* &{ p(a) } \"xyz\"",
            "A <- (B/C)+ !D { act() }",
            "List<x, sep> <- x (sep x)*",
        ];
        for src in srcs {
            let g1 = parse_ok(src);
            let printed = grammar_string(&g1);
            let g2 = parse_ok(&printed);
            assert_eq!(
                grammar_full_string(&g1),
                grammar_full_string(&g2),
                "round trip of {src:?} via {printed:?}"
            );
        }
    }

    #[test]
    fn syntax_errors() {
        assert!(parse_err("A <- ").contains("unexpected"));
        assert!(parse_err("A B").contains("syntax error"));
        assert!(parse_err("A <- (B").contains("unexpected"));
        assert!(parse_err("<- B").contains("syntax error"));
        assert!(parse_err("A <- B )").contains("syntax error"));
    }

    #[test]
    fn newline_ends_a_rule() {
        assert!(parse_err("A <-\nB").contains("unexpected newline"));
    }
}
