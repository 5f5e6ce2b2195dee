//! Byte offset to line.column conversion for diagnostics.

/// Maps byte offsets in a source string to 1-based line and column
/// numbers. Columns count runes, not bytes, so multibyte characters in a
/// grammar line do not skew reported positions.
pub struct LineMap {
    /// Byte offset of the start of each line, first entry always 0.
    line_starts: Vec<u32>,
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct LineCol {
    /// 1-based line index.
    pub line: u32,
    /// 1-based column, counted in code points from the line start.
    pub col: u32,
}

impl LineMap {
    pub fn new(src: &str) -> LineMap {
        let mut line_starts = vec![0];
        for (i, b) in src.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i as u32 + 1);
            }
        }
        LineMap { line_starts }
    }

    pub fn line_col(&self, src: &str, offset: u32) -> LineCol {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let start = self.line_starts[line] as usize;
        let offset = (offset as usize).min(src.len());
        let col = src[start..offset].chars().count() as u32 + 1;
        LineCol {
            line: line as u32 + 1,
            col,
        }
    }
}
