use serde::Serialize;

use crate::ast::Document;
use crate::parser::header::TagHeader;
use crate::parser::{PieceKind, TokenKind, piece_at};

/// Syntactic position of a cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "context", rename_all = "camelCase")]
pub enum CursorContext {
    Text,
    Comment,
    /// On an opening or closing delimiter
    Delimiter,
    /// Where a tag keyword goes; `prefix` is what is typed so far
    TagKeyword { prefix: String },
    TagArguments { keyword: String },
    Expression,
    /// Inside a string literal of a tag or expression
    String,
}

/// Classify `offset`. `None` past the end of the document.
pub fn cursor_context(document: &Document, offset: usize) -> Option<CursorContext> {
    let source = &*document.source;
    let piece = document.pieces.get(piece_at(&document.pieces, offset)?)?;

    match piece.kind {
        PieceKind::Text => return Some(CursorContext::Text),
        PieceKind::Comment => return Some(CursorContext::Comment),
        PieceKind::Tag | PieceKind::Expression => {}
    }

    if offset < piece.body.start || offset > piece.body.end {
        return Some(CursorContext::Delimiter);
    }

    if in_string(document, offset) {
        return Some(CursorContext::String);
    }

    if piece.kind == PieceKind::Expression {
        return Some(CursorContext::Expression);
    }

    let header = TagHeader::parse(source, piece);
    match header.keyword {
        Some(keyword) if offset > keyword.end => Some(CursorContext::TagArguments {
            keyword: keyword.text(source).to_string(),
        }),
        Some(keyword) if offset >= keyword.start => Some(CursorContext::TagKeyword {
            prefix: source.get(keyword.start..offset).unwrap_or("").to_string(),
        }),
        Some(_) => Some(CursorContext::TagKeyword { prefix: String::new() }),
        // Only punctuation or literals so far
        None if header.args.iter().any(|arg| arg.span.start < offset) => Some(CursorContext::TagArguments {
            keyword: String::new(),
        }),
        None => Some(CursorContext::TagKeyword { prefix: String::new() }),
    }
}

/// True when `offset` sits after the opening quote of a literal and before
/// its closing quote. Inside tags and expressions, a raw run starting with a
/// quote is a literal that never closes.
fn in_string(document: &Document, offset: usize) -> bool {
    let tokens = &document.tokens;
    let index = tokens.partition_point(|token| token.span.end < offset);
    let Some(token) = tokens.get(index) else {
        return false;
    };
    if offset <= token.span.start {
        return false;
    }
    match token.kind {
        TokenKind::QuotedString => offset < token.span.end,
        TokenKind::Raw => token
            .span
            .text(&document.source)
            .starts_with(['"', '\'']),
        TokenKind::Open(_) | TokenKind::Close(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_document;

    fn context(source: &str, offset: usize) -> Option<CursorContext> {
        parse_document(source).cursor_context(offset)
    }

    fn keyword(prefix: &str) -> Option<CursorContext> {
        Some(CursorContext::TagKeyword {
            prefix: prefix.to_string(),
        })
    }

    #[test]
    fn test_text_and_comment() {
        let source = "ab{# c #}";
        assert_eq!(context(source, 1), Some(CursorContext::Text));
        assert_eq!(context(source, 5), Some(CursorContext::Comment));
        assert_eq!(context(source, 100), None);
    }

    #[test]
    fn test_tag_positions() {
        let source = "{% for x in 'abc' %}";
        assert_eq!(context(source, 1), Some(CursorContext::Delimiter));
        assert_eq!(context(source, 2), keyword(""));
        assert_eq!(context(source, 5), keyword("fo"));
        assert_eq!(context(source, 6), keyword("for"));
        assert_eq!(
            context(source, 8),
            Some(CursorContext::TagArguments {
                keyword: "for".to_string()
            })
        );
        assert_eq!(context(source, 14), Some(CursorContext::String));
        assert_eq!(context(source, 19), Some(CursorContext::Delimiter));
    }

    #[test]
    fn test_incomplete_tag() {
        assert_eq!(context("{% ", 3), keyword(""));
        assert_eq!(context("{% en", 5), keyword("en"));
    }

    #[test]
    fn test_expression_and_unterminated_string() {
        let source = "{{ user.name }}";
        assert_eq!(context(source, 5), Some(CursorContext::Expression));

        let source = "{{ path('home";
        assert_eq!(context(source, source.len()), Some(CursorContext::String));
        assert_eq!(context(source, 4), Some(CursorContext::Expression));
    }
}
