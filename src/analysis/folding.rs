use serde::Serialize;

use super::{Visitor, walk};
use crate::ast::Statement;
use crate::parser::{LineIndex, Piece, PieceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FoldingKind {
    Region,
    Comment,
}

/// Zero-based, inclusive line range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FoldingRange {
    pub start_line: usize,
    pub end_line: usize,
    pub kind: FoldingKind,
}

struct Collector<'p> {
    pieces: &'p [Piece],
    lines: &'p LineIndex,
    ranges: Vec<FoldingRange>,
}

impl<'a> Visitor<'a> for Collector<'_> {
    fn enter(&mut self, statement: &'a Statement) -> bool {
        for segment in statement.segments() {
            // A body the document never closes offers no range
            let (Some(open), Some(close)) = (
                self.pieces.get(segment.open_piece),
                segment.close_piece.and_then(|i| self.pieces.get(i)),
            ) else {
                continue;
            };
            let start_line = self.lines.line(open.start());
            let end_line = self.lines.line(close.start()).saturating_sub(1);
            if end_line > start_line {
                self.ranges.push(FoldingRange {
                    start_line,
                    end_line,
                    kind: FoldingKind::Region,
                });
            }
        }
        true
    }
}

/// Foldable line ranges: one per statement body (from its opening tag's line
/// to the line before the tag that ends it) and one per multi-line comment.
pub fn folding_ranges(source: &str, pieces: &[Piece], statements: &[Statement]) -> Vec<FoldingRange> {
    let lines = LineIndex::new(source);
    let mut collector = Collector {
        pieces,
        lines: &lines,
        ranges: Vec::new(),
    };
    walk(statements, &mut collector);
    let mut ranges = collector.ranges;

    for piece in pieces {
        if piece.kind != PieceKind::Comment || !piece.closed {
            continue;
        }
        let start_line = lines.line(piece.start());
        let end_line = lines.line(piece.end().saturating_sub(1));
        if end_line > start_line {
            ranges.push(FoldingRange {
                start_line,
                end_line,
                kind: FoldingKind::Comment,
            });
        }
    }

    ranges.sort_by(|a, b| a.start_line.cmp(&b.start_line).then(b.end_line.cmp(&a.end_line)));
    ranges
}
