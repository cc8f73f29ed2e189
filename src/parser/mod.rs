pub(crate) mod header;
pub mod pieces;
pub mod positions;
pub mod tokenizer;
mod tree_builder;

pub use pieces::{Piece, PieceKind, find_pieces, piece_at};
pub use positions::{LineCol, LineIndex};
pub use tokenizer::{Delimiter, Span, Token, TokenKind, tokenize};
pub use tree_builder::MAX_NESTING;
use tree_builder::TreeBuilder;

use crate::Options;
use crate::ast::{Document, Statement};
use crate::error::Diagnostic;
use std::sync::Arc;
use tracing::debug;

/// Parser trait - converts template source to a document
pub trait Parser {
    fn parse(&self, source: &str) -> Document;
}

/// Twig template parser
#[derive(Debug, Clone, Default)]
pub struct TwigParser {
    options: Options,
}

impl TwigParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: Options) -> Self {
        Self { options }
    }
}

impl Parser for TwigParser {
    fn parse(&self, source: &str) -> Document {
        let tokens = tokenize(source);
        let pieces = find_pieces(&tokens);
        let (statements, diagnostics) = parse_with(source, &pieces, &self.options);

        debug!(
            bytes = source.len(),
            tokens = tokens.len(),
            pieces = pieces.len(),
            statements = statements.len(),
            diagnostics = diagnostics.len(),
            "parsed template"
        );

        Document::new(Arc::from(source), tokens, pieces, statements, diagnostics)
    }
}

/// Build the statement tree for `pieces` of `source` with default options.
pub fn parse(source: &str, pieces: &[Piece]) -> Vec<Statement> {
    parse_with(source, pieces, &Options::default()).0
}

/// Build the statement tree, also returning what was recovered from.
pub fn parse_with(source: &str, pieces: &[Piece], options: &Options) -> (Vec<Statement>, Vec<Diagnostic>) {
    TreeBuilder::new(source, pieces, options).build()
}
