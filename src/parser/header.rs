//! Lightweight lexing of tag headers (`for k, v in items`, `macro f(a, b = 1)`).
//!
//! This is not an expression parser: it only splits the tag body into words,
//! literals and punctuation with bracket depth, which is all the statement
//! parser needs to pull out names and argument spans.

use super::pieces::Piece;
use super::tokenizer::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArgKind {
    Name,
    String,
    Number,
    /// Single punctuation byte: `( ) [ ] { } , : = | . ? + - ...`
    Punct,
    /// Multi-byte operator: `== != <= >= => .. ?? ?: ** //`
    Operator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Arg {
    pub kind: ArgKind,
    /// Absolute span in the document
    pub span: Span,
    /// Bracket depth the token sits at (closing brackets report the outer depth)
    pub depth: usize,
}

impl Arg {
    pub fn is_name(&self, source: &str, name: &str) -> bool {
        self.kind == ArgKind::Name && self.span.text(source) == name
    }

    pub fn is_punct(&self, source: &str, punct: &str) -> bool {
        self.kind == ArgKind::Punct && self.span.text(source) == punct
    }
}

const OPERATORS: &[&str] = &["==", "!=", "<=", ">=", "=>", "..", "??", "?:", "**", "//"];

/// Split `span` of `source` into header arguments.
pub(crate) fn lex_args(source: &str, span: Span) -> Vec<Arg> {
    let bytes = source.as_bytes();
    let end = span.end.min(bytes.len());
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut i = span.start;

    while i < end {
        let b = bytes[i];
        let start = i;

        let kind = if b.is_ascii_whitespace() {
            i += 1;
            continue;
        } else if is_name_start(b) {
            while i < end && is_name_continue(bytes[i]) {
                i += 1;
            }
            ArgKind::Name
        } else if b.is_ascii_digit() {
            while i < end && (bytes[i].is_ascii_digit() || bytes[i] == b'_' || bytes[i] == b'.') {
                // `1..5` is a range, not a float
                if bytes[i] == b'.' && bytes.get(i + 1) == Some(&b'.') {
                    break;
                }
                i += 1;
            }
            ArgKind::Number
        } else if b == b'"' || b == b'\'' {
            i += 1;
            while i < end && bytes[i] != b {
                if bytes[i] == b'\\' {
                    i += 1;
                }
                i += 1;
            }
            i = (i + 1).min(end);
            ArgKind::String
        } else if let Some(op) = OPERATORS.iter().find(|op| bytes[i..end].starts_with(op.as_bytes())) {
            i += op.len();
            ArgKind::Operator
        } else {
            i += 1;
            ArgKind::Punct
        };

        let arg_depth = match b {
            b')' | b']' | b'}' if kind == ArgKind::Punct => {
                depth = depth.saturating_sub(1);
                depth
            }
            _ => depth,
        };
        args.push(Arg {
            kind,
            span: Span::new(start, i),
            depth: arg_depth,
        });
        if kind == ArgKind::Punct && matches!(b, b'(' | b'[' | b'{') {
            depth += 1;
        }
    }

    args
}

fn is_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b >= 0x80
}

fn is_name_continue(b: u8) -> bool {
    is_name_start(b) || b.is_ascii_digit()
}

/// A tag piece split into keyword and argument list.
#[derive(Debug, Clone)]
pub(crate) struct TagHeader {
    /// Keyword span; `None` for an empty or malformed tag body
    pub keyword: Option<Span>,
    /// Everything after the keyword, trimmed
    pub rest: Span,
    pub args: Vec<Arg>,
}

impl TagHeader {
    pub fn parse(source: &str, piece: &Piece) -> Self {
        let mut args = lex_args(source, piece.body);
        let keyword = match args.first() {
            Some(first) if first.kind == ArgKind::Name => Some(first.span),
            _ => None,
        };
        if keyword.is_some() {
            args.remove(0);
        }

        let rest = match (args.first(), args.last()) {
            (Some(first), Some(last)) => Span::new(first.span.start, last.span.end),
            _ => {
                let at = keyword.map(|k| k.end).unwrap_or(piece.body.start);
                Span::new(at, at)
            }
        };

        Self { keyword, rest, args }
    }

    pub fn keyword_text<'a>(&self, source: &'a str) -> &'a str {
        self.keyword.map(|k| k.text(source)).unwrap_or("")
    }

    /// Index of the first top-level name `word` at or after `from`.
    pub fn find_name(&self, source: &str, word: &str, from: usize) -> Option<usize> {
        self.args
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, arg)| arg.depth == 0 && arg.is_name(source, word))
            .map(|(i, _)| i)
    }

    /// Index of the first top-level punctuation `punct` at or after `from`.
    pub fn find_punct(&self, source: &str, punct: &str, from: usize) -> Option<usize> {
        self.args
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, arg)| arg.depth == 0 && arg.is_punct(source, punct))
            .map(|(i, _)| i)
    }

    /// Split args `from..to` on commas sitting at `depth`. Returns index
    /// ranges, one per group, empty groups included.
    pub fn split_commas(&self, source: &str, from: usize, to: usize, depth: usize) -> Vec<(usize, usize)> {
        let to = to.min(self.args.len());
        if from >= to {
            return Vec::new();
        }
        let mut groups = Vec::new();
        let mut start = from;
        for i in from..to {
            let arg = &self.args[i];
            if arg.depth == depth && arg.is_punct(source, ",") {
                groups.push((start, i));
                start = i + 1;
            }
        }
        groups.push((start, to));
        groups
    }

    /// Span covering args `from..to`, or `None` when that range is empty.
    pub fn span_of(&self, from: usize, to: usize) -> Option<Span> {
        let to = to.min(self.args.len());
        if from >= to {
            return None;
        }
        Some(Span::new(self.args[from].span.start, self.args[to - 1].span.end))
    }
}
