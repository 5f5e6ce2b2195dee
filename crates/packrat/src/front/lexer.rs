use std::iter::Peekable;
use std::str::CharIndices;

use crate::error::ErrorAccumulator;
use crate::span::Span;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Ident(String),
    /// A quoted literal with escapes resolved.
    Str(String),
    /// A brace-delimited code fragment, braces excluded.
    Code(String),
    Class(ClassTok),
    /// `<-`
    Arrow,
    Newline,
    Slash,
    Colon,
    Amp,
    Bang,
    Star,
    Plus,
    Question,
    Dot,
    Open,
    Close,
    Lt,
    Gt,
    Comma,
    /// A rune no token starts with; reported by the parser.
    Unknown(char),
    Eof,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassTok {
    pub spans: Vec<(char, char)>,
    pub neg: bool,
}

#[derive(Clone, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

/// Tokenizes a grammar file. Returns None after reporting the first
/// lexical error; the parser never runs on a broken token stream.
pub fn lex(src: &str, err: &ErrorAccumulator) -> Option<Vec<Token>> {
    let mut lx = Lexer {
        src,
        iter: src.char_indices().peekable(),
        err,
    };
    let mut tokens = Vec::new();
    loop {
        let tok = lx.token()?;
        let done = tok.kind == TokenKind::Eof;
        tokens.push(tok);
        if done {
            return Some(tokens);
        }
    }
}

struct Lexer<'a, 'e> {
    src: &'a str,
    iter: Peekable<CharIndices<'a>>,
    err: &'e ErrorAccumulator,
}

enum Unesc {
    Rune(char, bool),
    Eof,
}

impl<'a, 'e> Lexer<'a, 'e> {
    fn pos(&mut self) -> u32 {
        match self.iter.peek() {
            Some(&(i, _)) => i as u32,
            None => self.src.len() as u32,
        }
    }

    fn next(&mut self) -> Option<char> {
        self.iter.next().map(|(_, r)| r)
    }

    fn peek(&mut self) -> Option<char> {
        self.iter.peek().map(|&(_, r)| r)
    }

    fn error(&mut self, span: Span, msg: impl ToString) {
        self.err.error(span, msg);
    }

    fn token(&mut self) -> Option<Token> {
        loop {
            let start = self.pos();
            let tok = |kind, lx: &mut Self| {
                let end = lx.pos();
                Some(Token {
                    kind,
                    span: Span::new(start, end),
                })
            };
            let Some(r) = self.next() else {
                return tok(TokenKind::Eof, self);
            };
            match r {
                '#' => {
                    while let Some(r) = self.next() {
                        if r == '\n' {
                            break;
                        }
                    }
                    return tok(TokenKind::Newline, self);
                }
                '\n' => return tok(TokenKind::Newline, self),
                r if r.is_whitespace() => continue,
                r if r.is_alphabetic() || r == '_' => {
                    let mut name = String::from(r);
                    while let Some(r) = self.peek() {
                        if !r.is_alphanumeric() && r != '_' {
                            break;
                        }
                        name.push(r);
                        self.next();
                    }
                    return tok(TokenKind::Ident(name), self);
                }
                '<' => {
                    if self.peek() == Some('-') {
                        self.next();
                        return tok(TokenKind::Arrow, self);
                    }
                    return tok(TokenKind::Lt, self);
                }
                '{' => {
                    let code = self.code(start)?;
                    return tok(TokenKind::Code(code), self);
                }
                '[' => {
                    let class = self.class(start)?;
                    return tok(TokenKind::Class(class), self);
                }
                '\'' | '"' => {
                    let str = self.delimited(start, r)?;
                    return tok(TokenKind::Str(str), self);
                }
                '/' => return tok(TokenKind::Slash, self),
                ':' => return tok(TokenKind::Colon, self),
                '&' => return tok(TokenKind::Amp, self),
                '!' => return tok(TokenKind::Bang, self),
                '*' => return tok(TokenKind::Star, self),
                '+' => return tok(TokenKind::Plus, self),
                '?' => return tok(TokenKind::Question, self),
                '.' => return tok(TokenKind::Dot, self),
                '(' => return tok(TokenKind::Open, self),
                ')' => return tok(TokenKind::Close, self),
                '>' => return tok(TokenKind::Gt, self),
                ',' => return tok(TokenKind::Comma, self),
                r => return tok(TokenKind::Unknown(r), self),
            }
        }
    }

    /// The body of a `{…}` fragment. Braces nest; no awareness of target
    /// language strings or comments inside.
    fn code(&mut self, start: u32) -> Option<String> {
        let mut out = String::new();
        let mut depth = 0;
        loop {
            let Some(r) = self.next() else {
                let __end = self.pos();
                self.error(Span::new(start, __end), "unclosed {");
                return None;
            };
            match r {
                '{' => depth += 1,
                '}' => {
                    if depth == 0 {
                        return Some(out);
                    }
                    depth -= 1;
                }
                _ => {}
            }
            out.push(r);
        }
    }

    fn delimited(&mut self, start: u32, delim: char) -> Option<String> {
        let mut out = String::new();
        loop {
            match self.unesc(delim)? {
                Unesc::Eof => {
                    let __end = self.pos();
                    self.error(Span::new(start, __end), format!("unclosed {delim}"));
                    return None;
                }
                Unesc::Rune(r, false) if r == delim => return Some(out),
                Unesc::Rune(r, _) => out.push(r),
            }
        }
    }

    fn class(&mut self, start: u32) -> Option<ClassTok> {
        let mut class = ClassTok {
            spans: Vec::new(),
            neg: false,
        };
        let mut prev: Option<char> = None;
        let mut in_span = false;
        // Start of the pending single rune or span, for error spans.
        let mut item_start = self.pos();
        loop {
            let last = self.pos();
            match self.unesc(']')? {
                Unesc::Eof => {
                    let __end = self.pos();
                    self.error(Span::new(start, __end), "unclosed [");
                    return None;
                }
                Unesc::Rune(']', false) => break,
                Unesc::Rune(r, esc) => {
                    if in_span {
                        let lo = match prev.take() {
                            Some(lo) => lo,
                            None => {
                                let __end = self.pos();
                                self.error(Span::new(item_start, __end), "bad span");
                                return None;
                            }
                        };
                        if lo >= r {
                            let __end = self.pos();
                            self.error(Span::new(item_start, __end), "bad span");
                            return None;
                        }
                        class.spans.push((lo, r));
                        in_span = false;
                        item_start = self.pos();
                    } else if r == '-' && !esc {
                        in_span = true;
                    } else if r == '^' && !esc && !class.neg && class.spans.is_empty() && prev.is_none()
                    {
                        class.neg = true;
                        item_start = self.pos();
                    } else {
                        if let Some(p) = prev {
                            class.spans.push((p, p));
                            item_start = last;
                        }
                        prev = Some(r);
                    }
                }
            }
        }
        if in_span {
            let __end = self.pos();
            self.error(Span::new(item_start, __end), "bad span");
            return None;
        }
        if let Some(p) = prev {
            class.spans.push((p, p));
        }
        if class.spans.is_empty() {
            let __end = self.pos();
            self.error(Span::new(start, __end), "bad char class: empty");
            return None;
        }
        Some(class)
    }

    /// Reads one rune, resolving escape sequences. The flag reports
    /// whether the rune was escaped, so callers can tell a literal
    /// delimiter from an escaped one.
    fn unesc(&mut self, delim: char) -> Option<Unesc> {
        let start = self.pos();
        let Some(r) = self.next() else {
            return Some(Unesc::Eof);
        };
        if r != '\\' {
            return Some(Unesc::Rune(r, false));
        }
        let Some(r) = self.next() else {
            return Some(Unesc::Eof);
        };
        let r = match r {
            'a' => '\x07',
            'b' => '\x08',
            'f' => '\x0c',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'v' => '\x0b',
            '\\' => '\\',
            '\'' | '"' => r,
            '0'..='7' => {
                let mut v = r as u32 - '0' as u32;
                for _ in 1..3 {
                    match self.next().and_then(|d| d.to_digit(8)) {
                        Some(d) => v = (v << 3) | d,
                        None => {
                            let __end = self.pos();
                            self.error(
                                Span::new(start, __end),
                                "unknown escape sequence",
                            );
                            return None;
                        }
                    }
                }
                if v > 255 {
                    let __end = self.pos();
                    self.error(Span::new(start, __end), "octal escape >255");
                    return None;
                }
                char::from_u32(v).unwrap()
            }
            'x' | 'u' | 'U' => {
                let n = match r {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let mut v: u32 = 0;
                for _ in 0..n {
                    match self.next().and_then(|d| d.to_digit(16)) {
                        Some(d) => v = (v << 4) | d,
                        None => {
                            let __end = self.pos();
                            self.error(
                                Span::new(start, __end),
                                "unknown escape sequence",
                            );
                            return None;
                        }
                    }
                }
                if v > 0x10FFFF {
                    let __end = self.pos();
                    self.error(Span::new(start, __end), "hex escape >0x10FFFF");
                    return None;
                }
                match char::from_u32(v) {
                    Some(r) => r,
                    None => {
                        let __end = self.pos();
                        self.error(Span::new(start, __end), "hex escape is not a rune");
                        return None;
                    }
                }
            }
            '-' if delim == ']' => '-',
            _ => {
                let __end = self.pos();
                self.error(Span::new(start, __end), "unknown escape sequence");
                return None;
            }
        };
        Some(Unesc::Rune(r, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let err = ErrorAccumulator::new();
        let toks = lex(src, &err).expect("lex should succeed");
        assert!(err.is_empty(), "{}", err.render("test.file", src));
        toks.into_iter().map(|t| t.kind).collect()
    }

    fn lex_err(src: &str) -> String {
        let err = ErrorAccumulator::new();
        assert!(lex(src, &err).is_none());
        err.render("test.file", src)
    }

    #[test]
    fn simple_rule() {
        assert_eq!(
            kinds("A <- B"),
            vec![
                TokenKind::Ident("A".into()),
                TokenKind::Arrow,
                TokenKind::Ident("B".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn comments_count_as_newlines() {
        assert_eq!(
            kinds("A <- B # trailing\nC <- D"),
            vec![
                TokenKind::Ident("A".into()),
                TokenKind::Arrow,
                TokenKind::Ident("B".into()),
                TokenKind::Newline,
                TokenKind::Ident("C".into()),
                TokenKind::Arrow,
                TokenKind::Ident("D".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            kinds(r#"'\t\n\\\'x' "\"y""#),
            vec![
                TokenKind::Str("\t\n\\'x".into()),
                TokenKind::Str("\"y".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn octal_and_hex_escapes() {
        assert_eq!(
            kinds(r#""\377\x41☺\U0010FFFF""#),
            vec![
                TokenKind::Str("\u{FF}A\u{263A}\u{10FFFF}".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn octal_escape_too_big() {
        // The reported span covers the whole escape.
        assert_eq!(
            lex_err(r#"A <- "\400""#),
            "test.file:1.7,1.11: octal escape >255"
        );
    }

    #[test]
    fn hex_escape_too_big() {
        assert_eq!(
            lex_err(r#"A <- "\U00110000""#),
            "test.file:1.7,1.17: hex escape >0x10FFFF"
        );
    }

    #[test]
    fn unclosed_literal() {
        assert_eq!(lex_err("A <- \"abc"), "test.file:1.6,1.10: unclosed \"");
    }

    #[test]
    fn code_token_balances_braces() {
        assert_eq!(
            kinds("{ fn f() { g() } }"),
            vec![TokenKind::Code(" fn f() { g() } ".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn char_class_spans_and_singles() {
        assert_eq!(
            kinds("[a-zA36]"),
            vec![
                TokenKind::Class(ClassTok {
                    spans: vec![('a', 'z'), ('A', 'A'), ('3', '3'), ('6', '6')],
                    neg: false,
                }),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn char_class_negation_only_first() {
        assert_eq!(
            kinds("[^a^]"),
            vec![
                TokenKind::Class(ClassTok {
                    spans: vec![('a', 'a'), ('^', '^')],
                    neg: true,
                }),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn char_class_escaped_dash_and_bracket() {
        assert_eq!(
            kinds(r"[\-\]a]"),
            vec![
                TokenKind::Class(ClassTok {
                    spans: vec![('-', '-'), (']', ']'), ('a', 'a')],
                    neg: false,
                }),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn char_class_bad_spans() {
        assert!(lex_err("[z-a]").contains("bad span"));
        assert!(lex_err("[a-]").contains("bad span"));
        assert!(lex_err("[]").contains("bad char class: empty"));
        assert!(lex_err("[abc").contains("unclosed ["));
    }

    #[test]
    fn arrow_vs_lt() {
        assert_eq!(
            kinds("A<B> <- C"),
            vec![
                TokenKind::Ident("A".into()),
                TokenKind::Lt,
                TokenKind::Ident("B".into()),
                TokenKind::Gt,
                TokenKind::Arrow,
                TokenKind::Ident("C".into()),
                TokenKind::Eof,
            ]
        );
    }
}
