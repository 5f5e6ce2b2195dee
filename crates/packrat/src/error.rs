use std::cell::RefCell;

use crate::linemap::LineMap;
use crate::span::Span;

/// One collected diagnostic: a message pinned to a source range.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub span: Span,
    pub msg: String,
}

/// Collects diagnostics across a pass without threading `&mut` through
/// every visitor. Passes report everything they find; callers decide at
/// phase boundaries whether to continue.
#[derive(Default)]
pub struct ErrorAccumulator {
    errors: RefCell<Vec<Diagnostic>>,
}

impl ErrorAccumulator {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn error(&self, span: Span, err: impl ToString) {
        self.errors.borrow_mut().push(Diagnostic {
            span,
            msg: err.to_string(),
        });
    }
    pub fn is_empty(&self) -> bool {
        self.errors.borrow().is_empty()
    }
    pub fn len(&self) -> usize {
        self.errors.borrow().len()
    }
    pub fn get(&self) -> std::cell::Ref<'_, Vec<Diagnostic>> {
        self.errors.borrow()
    }
    pub fn clear(&self) {
        self.errors.borrow_mut().clear();
    }

    /// Renders all collected errors sorted by source position, one per
    /// line, as `file:line.col: message` or
    /// `file:line.col,line.col: message` when the span covers a range.
    pub fn render(&self, file: &str, src: &str) -> String {
        let map = LineMap::new(src);
        let mut errors: Vec<Diagnostic> = self.errors.borrow().clone();
        errors.sort_by_key(|d| (d.span.start, d.span.end));

        let mut out = String::new();
        for (i, d) in errors.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            let begin = map.line_col(src, d.span.start);
            let end = map.line_col(src, d.span.end);
            if begin == end {
                out.push_str(&format!("{file}:{}.{}: {}", begin.line, begin.col, d.msg));
            } else {
                out.push_str(&format!(
                    "{file}:{}.{},{}.{}: {}",
                    begin.line, begin.col, end.line, end.col, d.msg
                ));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_sorted_by_position() {
        let src = "A <- B\nC <- D";
        let err = ErrorAccumulator::new();
        err.error(Span::new(7, 13), "rule C redefined");
        err.error(Span::new(5, 6), "rule B undefined");
        assert_eq!(
            err.render("test.file", src),
            "test.file:1.6,1.7: rule B undefined\n\
             test.file:2.1,2.7: rule C redefined"
        );
    }

    #[test]
    fn point_spans_render_once() {
        let src = "A <- .";
        let err = ErrorAccumulator::new();
        err.error(Span::at(5), "boom");
        assert_eq!(err.render("g.peg", src), "g.peg:1.6: boom");
    }
}
