//! Error-tolerant lexer and parser for Twig templates.
//!
//! The pipeline runs in four pure stages:
//!
//! 1. [`tokenize`] splits text into delimiter, string and raw tokens
//! 2. [`find_pieces`] groups tokens into text, comment, tag and expression pieces
//! 3. [`parse`] builds the statement tree from the pieces
//! 4. [`analysis`] answers queries over the tree (scopes, folding, symbols)
//!
//! Every stage accepts any input. Unterminated delimiters, missing end tags
//! and unknown tags degrade the result instead of failing.
//!
//! ```
//! let doc = twig_syntax::parse_document("{% for x in items %}{{ x }}{% endfor %}");
//! let names = doc.scopes_at(22);
//! assert!(names.iter().any(|entry| entry.name == "x"));
//! ```

pub mod analysis;
pub mod ast;
pub mod error;
pub mod parser;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use analysis::{
    CursorContext, FoldingKind, FoldingRange, ScopeEntry, ScopeKind, Symbol, SymbolKind, Visitor,
    folding_ranges, scopes_at, walk,
};
pub use ast::{Document, Statement};
pub use error::{Diagnostic, DiagnosticKind, Error, Result};
pub use parser::{
    LineCol, LineIndex, MAX_NESTING, Parser, Piece, PieceKind, Span, Token, TokenKind, TwigParser,
    find_pieces, parse, parse_with, piece_at, tokenize,
};

/// Parser configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Extra tags that open a body closed by `end<tag>` (e.g. `trans`)
    pub body_tags: Vec<String>,
    /// Extra single-piece tags that should not be reported as unknown
    pub inline_tags: Vec<String>,
    /// File extensions treated as templates when walking directories
    pub extensions: Vec<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            body_tags: Vec::new(),
            inline_tags: Vec::new(),
            extensions: vec!["twig".to_string()],
        }
    }
}

impl Options {
    /// Load options from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// True when `path` has one of the configured template extensions.
    pub fn is_template(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        self.extensions
            .iter()
            .any(|ext| name.len() > ext.len() + 1 && name.ends_with(ext.as_str()) && name[..name.len() - ext.len()].ends_with('.'))
    }
}

/// Run the whole pipeline with default options.
pub fn parse_document(source: &str) -> Document {
    TwigParser::new().parse(source)
}

/// Run the whole pipeline with `options`.
pub fn parse_document_with(source: &str, options: &Options) -> Document {
    TwigParser::with_options(options.clone()).parse(source)
}
