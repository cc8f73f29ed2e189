//! Position conversion utilities.
//!
//! Everything in the pipeline tracks byte offsets. Diagnostics and the CLI
//! speak in lines and character columns, so this module converts between the
//! two.

/// Largest char boundary `<= offset`, clamped to the source length.
fn floor_char_boundary(source: &str, offset: usize) -> usize {
    let mut offset = offset.min(source.len());
    while !source.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

/// Zero-based line/column. `col` counts characters, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LineCol {
    pub line: usize,
    pub col: usize,
}

/// Line start table for a source text.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            line_starts,
            len: source.len(),
        }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Zero-based line containing `offset` (clamped to the source length).
    pub fn line(&self, offset: usize) -> usize {
        let offset = offset.min(self.len);
        self.line_starts.partition_point(|&start| start <= offset) - 1
    }

    /// Byte offset where `line` starts, if the line exists.
    pub fn line_start(&self, line: usize) -> Option<usize> {
        self.line_starts.get(line).copied()
    }

    pub fn line_col(&self, source: &str, offset: usize) -> LineCol {
        let offset = floor_char_boundary(source, offset);
        let line = self.line(offset);
        let start = self.line_starts[line];
        LineCol {
            line,
            col: source[start..offset].chars().count(),
        }
    }

    /// Byte offset for a line and character column. Columns past the end of
    /// the line clamp to the line end.
    pub fn offset(&self, source: &str, position: LineCol) -> Option<usize> {
        let start = self.line_start(position.line)?;
        let end = self
            .line_start(position.line + 1)
            .map(|next| next - 1)
            .unwrap_or(self.len);
        let line = &source[start..end];
        let col = line
            .char_indices()
            .nth(position.col)
            .map(|(i, _)| i)
            .unwrap_or(line.len());
        Some(start + col)
    }
}
