use std::sync::Arc;

use serde::Serialize;

use crate::error::Diagnostic;
use crate::parser::pieces::Piece;

// Re-export Span from tokenizer so the rest of the crate uses a single span type
pub use crate::parser::tokenizer::{Span, Token};

/// A parsed template: every stage of the pipeline, owned by the caller.
///
/// The document is immutable once built; analysis queries borrow it.
#[derive(Debug, Clone)]
pub struct Document {
    pub source: Arc<str>,
    pub tokens: Vec<Token>,
    pub pieces: Vec<Piece>,
    pub statements: Vec<Statement>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Document {
    pub fn new(
        source: Arc<str>,
        tokens: Vec<Token>,
        pieces: Vec<Piece>,
        statements: Vec<Statement>,
        diagnostics: Vec<Diagnostic>,
    ) -> Self {
        Self {
            source,
            tokens,
            pieces,
            statements,
            diagnostics,
        }
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

}

/// An identifier together with where it was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Name {
    pub text: String,
    pub span: Span,
}

impl Name {
    pub fn new(source: &str, span: Span) -> Self {
        Self {
            text: span.text(source).to_string(),
            span,
        }
    }
}

/// Raw expression text copied out of a tag header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Expr {
    pub text: String,
    pub span: Span,
}

impl Expr {
    pub fn new(source: &str, span: Span) -> Self {
        Self {
            text: span.text(source).to_string(),
            span,
        }
    }

    /// Contents of the expression when it is a single string literal
    /// (`"base.html.twig"` -> `base.html.twig`).
    pub fn string_literal(&self) -> Option<&str> {
        let text = self.text.as_str();
        let quote = text.chars().next().filter(|c| *c == '"' || *c == '\'')?;
        let inner = text.get(1..text.len().checked_sub(1)?)?;
        if text.len() >= 2 && text.ends_with(quote) && !inner.contains(quote) {
            Some(inner)
        } else {
            None
        }
    }
}

/// Statement tree node.
///
/// Piece fields hold indices into `Document::pieces`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Statement {
    // Control flow
    If(IfStatement),
    For(ForStatement),

    // Inheritance and reuse
    Block(BlockStatement),
    Extends(ExtendsStatement),
    Include(IncludeStatement),
    Use(UseStatement),

    // Declarations
    Macro(MacroStatement),
    Import(ImportStatement),
    From(FromStatement),
    Set(SetStatement),

    /// Body tags closed by `end<keyword>`: filter, apply, autoescape, ...
    Simple(SimpleStatement),

    /// `{{ ... }}` interpolation
    Output(OutputStatement),
}

/// `{% if %}` / `{% elseif %}` / `{% else %}` / `{% endif %}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IfStatement {
    pub start_piece: usize,
    pub condition: Option<Expr>,
    pub stmts: Vec<Statement>,
    pub else_if_parts: Vec<ElseIfPart>,
    pub else_part: Option<ElsePart>,
    pub end_piece: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElseIfPart {
    pub piece_index: usize,
    pub condition: Option<Expr>,
    pub stmts: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElsePart {
    pub piece_index: usize,
    pub stmts: Vec<Statement>,
}

/// `{% for key, value in items if cond %}` ... `{% else %}` ... `{% endfor %}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForStatement {
    pub start_piece: usize,
    /// One name (`value`) or two (`key, value`)
    pub variables: Vec<Name>,
    pub iterable: Option<Expr>,
    /// Legacy inline filter: `for x in items if x.active`
    pub condition: Option<Expr>,
    pub stmts: Vec<Statement>,
    pub else_part: Option<ElsePart>,
    pub end_piece: Option<usize>,
}

/// `{% block name %}...{% endblock %}` or shorthand `{% block name value %}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockStatement {
    pub start_piece: usize,
    pub name: Option<Name>,
    /// Shorthand value; present means no body and no end piece
    pub value: Option<Expr>,
    pub stmts: Vec<Statement>,
    pub end_piece: Option<usize>,
}

impl BlockStatement {
    pub fn is_shorthand(&self) -> bool {
        self.value.is_some()
    }
}

/// `{% macro name(a, b = 1) %}...{% endmacro %}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MacroStatement {
    pub start_piece: usize,
    pub name: Option<Name>,
    pub parameters: Vec<MacroParameter>,
    pub stmts: Vec<Statement>,
    pub end_piece: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MacroParameter {
    pub name: Name,
    pub default: Option<Expr>,
}

/// `{% import "forms.html" as forms %}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportStatement {
    pub piece: usize,
    pub source: Option<Expr>,
    pub alias: Option<Name>,
}

/// `{% from "forms.html" import input as field, textarea %}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FromStatement {
    pub piece: usize,
    pub source: Option<Expr>,
    pub names: Vec<ImportedName>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedName {
    pub name: Name,
    pub alias: Option<Name>,
}

impl ImportedName {
    /// The name this import binds in the template.
    pub fn local(&self) -> &Name {
        self.alias.as_ref().unwrap_or(&self.name)
    }
}

/// `{% set a, b = 1, 2 %}` or capture form `{% set a %}...{% endset %}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetStatement {
    pub start_piece: usize,
    pub targets: Vec<Name>,
    /// Inline value; `None` for a capture or for `set x =` still being typed
    pub value: Option<Expr>,
    /// No `=` in the header: the value is the body up to `endset`
    pub capture: bool,
    pub stmts: Vec<Statement>,
    pub end_piece: Option<usize>,
}

impl SetStatement {
    pub fn is_capture(&self) -> bool {
        self.capture
    }
}

/// `{% extends "base.html" %}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendsStatement {
    pub piece: usize,
    pub parent: Option<Expr>,
}

/// `{% include "part.html" with {...} only %}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncludeStatement {
    pub piece: usize,
    pub template: Option<Expr>,
}

/// `{% use "blocks.html" %}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UseStatement {
    pub piece: usize,
    pub template: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleStatement {
    pub keyword: String,
    pub start_piece: usize,
    pub arguments: Option<Expr>,
    pub stmts: Vec<Statement>,
    pub end_piece: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputStatement {
    pub piece: usize,
}

/// Which body of a compound statement a segment is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Main,
    ElseIf(usize),
    Else,
}

/// One body of a compound statement, bounded by the piece that opens it and
/// the piece that ends it (`None` when the document ends first).
#[derive(Debug, Clone, Copy)]
pub struct Segment<'a> {
    pub branch: Branch,
    pub open_piece: usize,
    pub close_piece: Option<usize>,
    pub stmts: &'a [Statement],
}

impl Statement {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Statement::If(_) => "if",
            Statement::For(_) => "for",
            Statement::Block(_) => "block",
            Statement::Extends(_) => "extends",
            Statement::Include(_) => "include",
            Statement::Use(_) => "use",
            Statement::Macro(_) => "macro",
            Statement::Import(_) => "import",
            Statement::From(_) => "from",
            Statement::Set(_) => "set",
            Statement::Simple(_) => "simple",
            Statement::Output(_) => "output",
        }
    }

    /// Index of the first piece of the statement.
    pub fn start_piece(&self) -> usize {
        match self {
            Statement::If(s) => s.start_piece,
            Statement::For(s) => s.start_piece,
            Statement::Block(s) => s.start_piece,
            Statement::Macro(s) => s.start_piece,
            Statement::Set(s) => s.start_piece,
            Statement::Simple(s) => s.start_piece,
            Statement::Extends(s) => s.piece,
            Statement::Include(s) => s.piece,
            Statement::Use(s) => s.piece,
            Statement::Import(s) => s.piece,
            Statement::From(s) => s.piece,
            Statement::Output(s) => s.piece,
        }
    }

    /// Index of the closing tag's piece, if the statement has one.
    pub fn end_piece(&self) -> Option<usize> {
        match self {
            Statement::If(s) => s.end_piece,
            Statement::For(s) => s.end_piece,
            Statement::Block(s) => s.end_piece,
            Statement::Macro(s) => s.end_piece,
            Statement::Set(s) => s.end_piece,
            Statement::Simple(s) => s.end_piece,
            Statement::Extends(_)
            | Statement::Include(_)
            | Statement::Use(_)
            | Statement::Import(_)
            | Statement::From(_)
            | Statement::Output(_) => None,
        }
    }

    /// True for statements that own a body (shorthand forms do not).
    pub fn has_body(&self) -> bool {
        match self {
            Statement::If(_) | Statement::For(_) | Statement::Macro(_) | Statement::Simple(_) => true,
            Statement::Block(s) => !s.is_shorthand(),
            Statement::Set(s) => s.is_capture(),
            Statement::Extends(_)
            | Statement::Include(_)
            | Statement::Use(_)
            | Statement::Import(_)
            | Statement::From(_)
            | Statement::Output(_) => false,
        }
    }

    /// Bodies of the statement in document order. Empty for single-piece
    /// statements.
    pub fn segments(&self) -> Vec<Segment<'_>> {
        match self {
            Statement::If(s) => {
                let mut boundaries: Vec<(Branch, usize, &[Statement])> =
                    vec![(Branch::Main, s.start_piece, s.stmts.as_slice())];
                for (i, part) in s.else_if_parts.iter().enumerate() {
                    boundaries.push((Branch::ElseIf(i), part.piece_index, part.stmts.as_slice()));
                }
                if let Some(part) = &s.else_part {
                    boundaries.push((Branch::Else, part.piece_index, part.stmts.as_slice()));
                }
                chain(boundaries, s.end_piece)
            }
            Statement::For(s) => {
                let mut boundaries: Vec<(Branch, usize, &[Statement])> =
                    vec![(Branch::Main, s.start_piece, s.stmts.as_slice())];
                if let Some(part) = &s.else_part {
                    boundaries.push((Branch::Else, part.piece_index, part.stmts.as_slice()));
                }
                chain(boundaries, s.end_piece)
            }
            Statement::Macro(s) => chain(vec![(Branch::Main, s.start_piece, s.stmts.as_slice())], s.end_piece),
            Statement::Simple(s) => chain(vec![(Branch::Main, s.start_piece, s.stmts.as_slice())], s.end_piece),
            Statement::Block(s) if !s.is_shorthand() => {
                chain(vec![(Branch::Main, s.start_piece, s.stmts.as_slice())], s.end_piece)
            }
            Statement::Set(s) if s.is_capture() => {
                chain(vec![(Branch::Main, s.start_piece, s.stmts.as_slice())], s.end_piece)
            }
            _ => Vec::new(),
        }
    }
}

/// Turn ordered (branch, opening piece, body) triples into segments, each
/// closed by the next one's opening piece and the last by `end_piece`.
fn chain<'a>(boundaries: Vec<(Branch, usize, &'a [Statement])>, end_piece: Option<usize>) -> Vec<Segment<'a>> {
    let closers: Vec<Option<usize>> = boundaries
        .iter()
        .skip(1)
        .map(|(_, piece, _)| Some(*piece))
        .chain(std::iter::once(end_piece))
        .collect();

    boundaries
        .into_iter()
        .zip(closers)
        .map(|((branch, open_piece, stmts), close_piece)| Segment {
            branch,
            open_piece,
            close_piece,
            stmts,
        })
        .collect()
}
