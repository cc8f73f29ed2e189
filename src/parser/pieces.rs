//! Grouping of tokens into pieces.
//!
//! A piece is a maximal classified span of the document: markup text, a
//! comment, a tag or an expression. Pieces are contiguous and ordered, and
//! everything downstream refers to them by index.

use super::tokenizer::{Delimiter, Span, Token, TokenKind};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PieceKind {
    Text,
    Comment,
    Tag,
    Expression,
}

impl PieceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PieceKind::Text => "text",
            PieceKind::Comment => "comment",
            PieceKind::Tag => "tag",
            PieceKind::Expression => "expression",
        }
    }
}

impl From<Delimiter> for PieceKind {
    fn from(delimiter: Delimiter) -> Self {
        match delimiter {
            Delimiter::Tag => PieceKind::Tag,
            Delimiter::Expression => PieceKind::Expression,
            Delimiter::Comment => PieceKind::Comment,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Piece {
    pub kind: PieceKind,
    /// Full extent, delimiters included
    pub span: Span,
    /// Content between the delimiters (and their trim markers). Equals
    /// `span` for text pieces.
    pub body: Span,
    /// False when the closing delimiter is missing
    pub closed: bool,
}

impl Piece {
    pub fn start(&self) -> usize {
        self.span.start
    }

    pub fn end(&self) -> usize {
        self.span.end
    }

    /// Content text of the piece.
    pub fn body_text<'a>(&self, source: &'a str) -> &'a str {
        self.body.text(source)
    }
}

/// An opening delimiter waiting for its close.
struct OpenRegion {
    kind: PieceKind,
    start: usize,
    body_start: usize,
}

impl OpenRegion {
    fn finish(self, body_end: usize, end: usize, closed: bool) -> Piece {
        Piece {
            kind: self.kind,
            span: Span::new(self.start, end),
            body: Span::new(self.body_start, body_end),
            closed,
        }
    }
}

/// Group a token stream into pieces.
pub fn find_pieces(tokens: &[Token]) -> Vec<Piece> {
    let mut pieces = Vec::new();
    let mut region: Option<OpenRegion> = None;
    let mut text: Option<Span> = None;

    let flush_text = |text: &mut Option<Span>, pieces: &mut Vec<Piece>| {
        if let Some(span) = text.take() {
            pieces.push(Piece {
                kind: PieceKind::Text,
                span,
                body: span,
                closed: true,
            });
        }
    };

    for token in tokens {
        match token.kind {
            TokenKind::Open(delimiter) => {
                // An open region here was interrupted by a different delimiter
                if let Some(open) = region.take() {
                    pieces.push(open.finish(token.span.start, token.span.start, false));
                }
                flush_text(&mut text, &mut pieces);
                region = Some(OpenRegion {
                    kind: delimiter.into(),
                    start: token.span.start,
                    body_start: token.span.end,
                });
            }
            TokenKind::Close(_) => match region.take() {
                Some(open) => pieces.push(open.finish(token.span.start, token.span.end, true)),
                None => extend(&mut text, token.span),
            },
            TokenKind::QuotedString | TokenKind::Raw => {
                if region.is_none() {
                    extend(&mut text, token.span);
                }
            }
        }
    }

    let end = tokens.last().map(|t| t.span.end).unwrap_or(0);
    if let Some(open) = region.take() {
        pieces.push(open.finish(end, end, false));
    }
    flush_text(&mut text, &mut pieces);

    pieces
}

fn extend(text: &mut Option<Span>, span: Span) {
    match text {
        Some(existing) => existing.end = span.end,
        None => *text = Some(span),
    }
}

/// Index of the piece containing `offset`. The document end maps to the
/// last piece.
pub fn piece_at(pieces: &[Piece], offset: usize) -> Option<usize> {
    let last = pieces.last()?;
    if offset > last.end() {
        return None;
    }
    let index = pieces.partition_point(|piece| piece.end() <= offset);
    Some(index.min(pieces.len() - 1))
}
