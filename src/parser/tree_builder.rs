use tracing::trace;

use super::header::{ArgKind, TagHeader};
use super::pieces::{Piece, PieceKind};
use super::tokenizer::Span;
use crate::Options;
use crate::ast::*;
use crate::error::{Diagnostic, DiagnosticKind};

/// Tags that open a body closed by `end<tag>`, beyond the dedicated ones
const BODY_TAGS: &[&str] = &[
    "apply",
    "autoescape",
    "cache",
    "embed",
    "filter",
    "guard",
    "sandbox",
    "spaceless",
    "verbatim",
    "raw",
    "with",
];

/// Known single-piece tags that produce no statement
const INLINE_TAGS: &[&str] = &["do", "flush", "deprecated", "types"];

/// Deepest construct nesting kept in the tree. Constructs opened below it
/// are tracked by keyword only and their children go to the innermost kept
/// construct.
pub const MAX_NESTING: usize = 256;

/// A compound statement waiting for its end tag.
struct Frame {
    /// Opening keyword; the frame closes on `end<keyword>`
    keyword: String,
    statement: Statement,
}

/// Builds the statement tree from a piece sequence.
///
/// One linear pass over the pieces with an explicit stack of open
/// constructs. Missing or mismatched end tags never stop the pass; they leave
/// `end_piece` unset and record a diagnostic.
pub struct TreeBuilder<'a> {
    source: &'a str,
    pieces: &'a [Piece],
    options: &'a Options,
    root: Vec<Statement>,
    stack: Vec<Frame>,
    /// Keywords of constructs opened past `MAX_NESTING`, innermost last
    flattened: Vec<String>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(source: &'a str, pieces: &'a [Piece], options: &'a Options) -> Self {
        Self {
            source,
            pieces,
            options,
            root: Vec::new(),
            stack: Vec::new(),
            flattened: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn build(mut self) -> (Vec<Statement>, Vec<Diagnostic>) {
        let pieces = self.pieces;
        for (index, piece) in pieces.iter().enumerate() {
            if !piece.closed {
                self.report_unclosed_delimiter(piece);
            }
            match piece.kind {
                PieceKind::Text | PieceKind::Comment => {}
                PieceKind::Expression => self.push_statement(Statement::Output(OutputStatement { piece: index })),
                PieceKind::Tag => self.parse_tag(index, piece),
            }
        }

        // Whatever is still open runs to the end of the document
        while let Some(frame) = self.stack.last() {
            let open_span = self.piece_span(frame.statement.start_piece());
            let diagnostic = Diagnostic::new(
                DiagnosticKind::UnclosedBlock,
                format!("`{}` is never closed", frame.keyword),
                open_span,
            )
            .with_help(format!("add `{{% end{} %}}`", frame.keyword));
            self.report(diagnostic);
            self.pop_frame(None);
        }

        (self.root, self.diagnostics)
    }

    fn parse_tag(&mut self, index: usize, piece: &Piece) {
        let source = self.source;
        let header = TagHeader::parse(source, piece);
        let Some(keyword_span) = header.keyword else {
            trace!(piece = index, "tag without keyword");
            return;
        };
        let keyword = keyword_span.text(source);

        match keyword {
            "if" => self.open(keyword, Statement::If(IfStatement {
                start_piece: index,
                condition: self.expr(Some(header.rest)),
                stmts: Vec::new(),
                else_if_parts: Vec::new(),
                else_part: None,
                end_piece: None,
            })),
            "elseif" => self.parse_else_if(index, &header),
            "else" => self.parse_else(index),
            "for" => self.parse_for(index, &header),
            "block" => self.parse_block(index, &header),
            "macro" => self.parse_macro(index, &header),
            "set" => self.parse_set(index, &header),
            "import" => self.parse_import(index, &header),
            "from" => self.parse_from(index, &header),
            "extends" => self.push_statement(Statement::Extends(ExtendsStatement {
                piece: index,
                parent: self.expr(header.span_of(0, header.args.len())),
            })),
            "include" => {
                let end = self.first_name_of(&header, &["with", "ignore", "only"]);
                self.push_statement(Statement::Include(IncludeStatement {
                    piece: index,
                    template: self.expr(header.span_of(0, end)),
                }))
            }
            "use" => {
                let end = self.first_name_of(&header, &["with"]);
                self.push_statement(Statement::Use(UseStatement {
                    piece: index,
                    template: self.expr(header.span_of(0, end)),
                }))
            }
            _ if self.is_body_tag(keyword) => self.open(keyword, Statement::Simple(SimpleStatement {
                keyword: keyword.to_string(),
                start_piece: index,
                arguments: self.expr(header.span_of(0, header.args.len())),
                stmts: Vec::new(),
                end_piece: None,
            })),
            _ if self.is_inline_tag(keyword) => {}
            _ if keyword.starts_with("end") => self.parse_end(index, &keyword["end".len()..]),
            _ => {
                let diagnostic = Diagnostic::new(
                    DiagnosticKind::UnknownTag,
                    format!("unknown tag `{}`", keyword),
                    keyword_span,
                );
                self.report(diagnostic);
            }
        }
    }

    fn parse_else_if(&mut self, index: usize, header: &TagHeader) {
        if !self.flattened.is_empty() {
            return;
        }
        let condition = self.expr(Some(header.rest));
        match self.stack.last_mut().map(|frame| &mut frame.statement) {
            Some(Statement::If(stmt)) if stmt.else_part.is_none() => {
                stmt.else_if_parts.push(ElseIfPart {
                    piece_index: index,
                    condition,
                    stmts: Vec::new(),
                });
            }
            _ => self.report_stray_branch(index, "elseif"),
        }
    }

    fn parse_else(&mut self, index: usize) {
        if !self.flattened.is_empty() {
            return;
        }
        let else_part = Some(ElsePart {
            piece_index: index,
            stmts: Vec::new(),
        });
        match self.stack.last_mut().map(|frame| &mut frame.statement) {
            Some(Statement::If(stmt)) if stmt.else_part.is_none() => stmt.else_part = else_part,
            Some(Statement::For(stmt)) if stmt.else_part.is_none() => stmt.else_part = else_part,
            _ => self.report_stray_branch(index, "else"),
        }
    }

    /// `for key, value in iterable [if condition]`
    fn parse_for(&mut self, index: usize, header: &TagHeader) {
        let len = header.args.len();
        let in_index = header.find_name(self.source, "in", 0);
        let head_end = in_index.unwrap_or(len);
        let variables = header.args[..head_end]
            .iter()
            .filter(|arg| arg.depth == 0 && arg.kind == ArgKind::Name)
            .map(|arg| Name::new(self.source, arg.span))
            .collect();

        let (iterable, condition) = match in_index {
            Some(in_index) => {
                let if_index = header.find_name(self.source, "if", in_index + 1);
                (
                    self.expr(header.span_of(in_index + 1, if_index.unwrap_or(len))),
                    if_index.and_then(|i| self.expr(header.span_of(i + 1, len))),
                )
            }
            None => (None, None),
        };

        self.open("for", Statement::For(ForStatement {
            start_piece: index,
            variables,
            iterable,
            condition,
            stmts: Vec::new(),
            else_part: None,
            end_piece: None,
        }));
    }

    /// `block name` opens a body; `block name value` is the shorthand form.
    fn parse_block(&mut self, index: usize, header: &TagHeader) {
        let name = header
            .args
            .first()
            .filter(|arg| arg.kind == ArgKind::Name)
            .map(|arg| Name::new(self.source, arg.span));
        let value = self.expr(header.span_of(1, header.args.len()));

        let statement = Statement::Block(BlockStatement {
            start_piece: index,
            name,
            value,
            stmts: Vec::new(),
            end_piece: None,
        });
        if statement.has_body() {
            self.open("block", statement);
        } else {
            self.push_statement(statement);
        }
    }

    /// `macro name(param, param = default, ...)`
    fn parse_macro(&mut self, index: usize, header: &TagHeader) {
        let source = self.source;
        let name = header
            .args
            .first()
            .filter(|arg| arg.kind == ArgKind::Name)
            .map(|arg| Name::new(source, arg.span));

        let mut parameters = Vec::new();
        if header.args.get(1).is_some_and(|arg| arg.is_punct(source, "(")) {
            let close = header.find_punct(source, ")", 2).unwrap_or(header.args.len());
            for (from, to) in header.split_commas(source, 2, close, 1) {
                let Some(first) = header.args.get(from).filter(|arg| from < to && arg.kind == ArgKind::Name) else {
                    continue;
                };
                let default = if header.args.get(from + 1).is_some_and(|arg| from + 1 < to && arg.is_punct(source, "=")) {
                    self.expr(header.span_of(from + 2, to))
                } else {
                    None
                };
                parameters.push(MacroParameter {
                    name: Name::new(source, first.span),
                    default,
                });
            }
        }

        self.open("macro", Statement::Macro(MacroStatement {
            start_piece: index,
            name,
            parameters,
            stmts: Vec::new(),
            end_piece: None,
        }));
    }

    /// `set a, b = 1, 2` is inline; `set a` captures a body up to `endset`.
    fn parse_set(&mut self, index: usize, header: &TagHeader) {
        let len = header.args.len();
        let eq = header.find_punct(self.source, "=", 0);
        let targets = header.args[..eq.unwrap_or(len)]
            .iter()
            .filter(|arg| arg.depth == 0 && arg.kind == ArgKind::Name)
            .map(|arg| Name::new(self.source, arg.span))
            .collect();

        let statement = Statement::Set(SetStatement {
            start_piece: index,
            targets,
            value: eq.and_then(|eq| self.expr(header.span_of(eq + 1, len))),
            capture: eq.is_none(),
            stmts: Vec::new(),
            end_piece: None,
        });

        // An `=` with nothing after it is still the inline form
        if statement.has_body() {
            self.open("set", statement);
        } else {
            self.push_statement(statement);
        }
    }

    /// `import source as alias`
    fn parse_import(&mut self, index: usize, header: &TagHeader) {
        let len = header.args.len();
        let as_index = header.find_name(self.source, "as", 0);
        let alias = as_index
            .and_then(|i| header.args.get(i + 1))
            .filter(|arg| arg.kind == ArgKind::Name)
            .map(|arg| Name::new(self.source, arg.span));

        self.push_statement(Statement::Import(ImportStatement {
            piece: index,
            source: self.expr(header.span_of(0, as_index.unwrap_or(len))),
            alias,
        }));
    }

    /// `from source import name as alias, name`
    fn parse_from(&mut self, index: usize, header: &TagHeader) {
        let source = self.source;
        let len = header.args.len();
        let import_index = header.find_name(source, "import", 0);

        let mut names = Vec::new();
        if let Some(import_index) = import_index {
            for (from, to) in header.split_commas(source, import_index + 1, len, 0) {
                let group = &header.args[from..to];
                let Some(first) = group.first().filter(|arg| arg.kind == ArgKind::Name) else {
                    continue;
                };
                let alias = match group.get(1) {
                    Some(arg) if arg.is_name(source, "as") => group
                        .get(2)
                        .filter(|arg| arg.kind == ArgKind::Name)
                        .map(|arg| Name::new(source, arg.span)),
                    _ => None,
                };
                names.push(ImportedName {
                    name: Name::new(source, first.span),
                    alias,
                });
            }
        }

        self.push_statement(Statement::From(FromStatement {
            piece: index,
            source: self.expr(header.span_of(0, import_index.unwrap_or(len))),
            names,
        }));
    }

    /// Close the innermost open construct named `name`. Constructs opened
    /// after it are closed too, without an end piece.
    fn parse_end(&mut self, index: usize, name: &str) {
        if let Some(depth) = self.flattened.iter().rposition(|keyword| keyword == name) {
            self.flattened.truncate(depth);
            return;
        }

        let end_span = self.piece_span(index);
        let Some(depth) = self.stack.iter().rposition(|frame| frame.keyword == name) else {
            let diagnostic = Diagnostic::new(
                DiagnosticKind::UnexpectedEndTag,
                format!("`end{}` has no open `{}` to close", name, name),
                end_span,
            );
            self.report(diagnostic);
            return;
        };
        self.flattened.clear();

        if depth + 1 < self.stack.len() {
            let innermost = &self.stack[self.stack.len() - 1];
            let diagnostic = Diagnostic::new(
                DiagnosticKind::MismatchedEndTag,
                format!("`end{}` closes `{}` while `{}` is still open", name, name, innermost.keyword),
                end_span,
            )
            .with_related(self.piece_span(innermost.statement.start_piece()))
            .with_related_label(format!("`{}` opened here", innermost.keyword))
            .with_help(format!("add `{{% end{} %}}` before this tag", innermost.keyword));
            self.report(diagnostic);

            while self.stack.len() > depth + 1 {
                if let Some(frame) = self.stack.last() {
                    let diagnostic = Diagnostic::new(
                        DiagnosticKind::UnclosedBlock,
                        format!("`{}` is never closed", frame.keyword),
                        self.piece_span(frame.statement.start_piece()),
                    );
                    self.report(diagnostic);
                }
                self.pop_frame(None);
            }
        }

        self.pop_frame(Some(index));
    }

    fn report_stray_branch(&mut self, index: usize, keyword: &str) {
        let diagnostic = Diagnostic::new(
            DiagnosticKind::UnexpectedBranch,
            format!("`{}` outside of a construct that accepts it", keyword),
            self.piece_span(index),
        );
        self.report(diagnostic);
    }

    fn report_unclosed_delimiter(&mut self, piece: &Piece) {
        let (open, close) = match piece.kind {
            PieceKind::Tag => ("{%", "%}"),
            PieceKind::Expression => ("{{", "}}"),
            PieceKind::Comment => ("{#", "#}"),
            PieceKind::Text => return,
        };
        let open_span = Span::new(piece.start(), (piece.start() + open.len()).min(piece.end()));
        let diagnostic = Diagnostic::new(
            DiagnosticKind::UnclosedDelimiter,
            format!("`{}` is never closed", open),
            open_span,
        )
        .with_help(format!("add `{}`", close));
        self.report(diagnostic);
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        trace!(
            kind = diagnostic.kind.as_str(),
            start = diagnostic.span.start,
            "recovered: {}",
            diagnostic.message
        );
        self.diagnostics.push(diagnostic);
    }

    fn open(&mut self, keyword: &str, statement: Statement) {
        if self.stack.len() >= MAX_NESTING {
            if self.flattened.is_empty() {
                let diagnostic = Diagnostic::new(
                    DiagnosticKind::NestingTooDeep,
                    format!("`{}` is nested deeper than {} levels", keyword, MAX_NESTING),
                    self.piece_span(statement.start_piece()),
                )
                .with_help("its contents are kept in the enclosing construct");
                self.report(diagnostic);
            }
            self.flattened.push(keyword.to_string());
            return;
        }
        self.stack.push(Frame {
            keyword: keyword.to_string(),
            statement,
        });
    }

    /// Pop the innermost frame and attach it to its parent body.
    fn pop_frame(&mut self, end_piece: Option<usize>) {
        if let Some(mut frame) = self.stack.pop() {
            if let Some(end) = end_piece {
                set_end_piece(&mut frame.statement, end);
            }
            self.push_statement(frame.statement);
        }
    }

    /// Append to the body currently being filled.
    fn push_statement(&mut self, statement: Statement) {
        let body = match self.stack.last_mut().and_then(|frame| current_body(&mut frame.statement)) {
            Some(body) => body,
            None => &mut self.root,
        };
        body.push(statement);
    }

    fn expr(&self, span: Option<Span>) -> Option<Expr> {
        span.filter(|span| !span.is_empty())
            .map(|span| Expr::new(self.source, span))
    }

    fn piece_span(&self, index: usize) -> Span {
        self.pieces.get(index).map(|p| p.span).unwrap_or_default()
    }

    /// Index of the first top-level name from `words`, or the arg count.
    fn first_name_of(&self, header: &TagHeader, words: &[&str]) -> usize {
        words
            .iter()
            .filter_map(|word| header.find_name(self.source, word, 1))
            .min()
            .unwrap_or(header.args.len())
    }

    fn is_body_tag(&self, keyword: &str) -> bool {
        BODY_TAGS.contains(&keyword) || self.options.body_tags.iter().any(|tag| tag == keyword)
    }

    fn is_inline_tag(&self, keyword: &str) -> bool {
        INLINE_TAGS.contains(&keyword) || self.options.inline_tags.iter().any(|tag| tag == keyword)
    }
}

/// Body that new children of an open statement go into: the last branch
/// opened so far.
fn current_body(statement: &mut Statement) -> Option<&mut Vec<Statement>> {
    match statement {
        Statement::If(stmt) => {
            if let Some(part) = stmt.else_part.as_mut() {
                Some(&mut part.stmts)
            } else if let Some(part) = stmt.else_if_parts.last_mut() {
                Some(&mut part.stmts)
            } else {
                Some(&mut stmt.stmts)
            }
        }
        Statement::For(stmt) => match stmt.else_part.as_mut() {
            Some(part) => Some(&mut part.stmts),
            None => Some(&mut stmt.stmts),
        },
        Statement::Block(stmt) => Some(&mut stmt.stmts),
        Statement::Macro(stmt) => Some(&mut stmt.stmts),
        Statement::Set(stmt) => Some(&mut stmt.stmts),
        Statement::Simple(stmt) => Some(&mut stmt.stmts),
        Statement::Extends(_)
        | Statement::Include(_)
        | Statement::Use(_)
        | Statement::Import(_)
        | Statement::From(_)
        | Statement::Output(_) => None,
    }
}

fn set_end_piece(statement: &mut Statement, end: usize) {
    match statement {
        Statement::If(stmt) => stmt.end_piece = Some(end),
        Statement::For(stmt) => stmt.end_piece = Some(end),
        Statement::Block(stmt) => stmt.end_piece = Some(end),
        Statement::Macro(stmt) => stmt.end_piece = Some(end),
        Statement::Set(stmt) => stmt.end_piece = Some(end),
        Statement::Simple(stmt) => stmt.end_piece = Some(end),
        Statement::Extends(_)
        | Statement::Include(_)
        | Statement::Use(_)
        | Statement::Import(_)
        | Statement::From(_)
        | Statement::Output(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{find_pieces, tokenize};

    fn build(source: &str) -> (Vec<Statement>, Vec<Diagnostic>) {
        build_with(source, &Options::default())
    }

    fn build_with(source: &str, options: &Options) -> (Vec<Statement>, Vec<Diagnostic>) {
        let pieces = find_pieces(&tokenize(source));
        TreeBuilder::new(source, &pieces, options).build()
    }

    fn kinds(diagnostics: &[Diagnostic]) -> Vec<DiagnosticKind> {
        diagnostics.iter().map(|d| d.kind).collect()
    }

    fn texts(names: &[Name]) -> Vec<&str> {
        names.iter().map(|n| n.text.as_str()).collect()
    }

    #[test]
    fn test_if_else_chain() {
        let (stmts, diagnostics) = build("{% if a %}x{% elseif b %}y{% else %}z{% endif %}");
        assert!(diagnostics.is_empty());
        assert_eq!(stmts.len(), 1);
        let Statement::If(stmt) = &stmts[0] else {
            panic!("expected if, got {:?}", stmts[0]);
        };
        assert_eq!(stmt.start_piece, 0);
        assert_eq!(stmt.condition.as_ref().map(|c| c.text.as_str()), Some("a"));
        assert_eq!(stmt.else_if_parts.len(), 1);
        assert_eq!(stmt.else_if_parts[0].piece_index, 2);
        assert_eq!(stmt.else_if_parts[0].condition.as_ref().map(|c| c.text.as_str()), Some("b"));
        assert_eq!(stmt.else_part.as_ref().map(|e| e.piece_index), Some(4));
        assert_eq!(stmt.end_piece, Some(6));
    }

    #[test]
    fn test_nested_else_belongs_to_inner_construct() {
        let (stmts, _) = build("{% for x in xs %}{% if x %}a{% else %}b{% endif %}{% else %}c{% endfor %}");
        let Statement::For(outer) = &stmts[0] else {
            panic!("expected for");
        };
        assert_eq!(outer.else_part.as_ref().map(|e| e.piece_index), Some(6));
        assert_eq!(outer.end_piece, Some(8));
        assert_eq!(outer.stmts.len(), 1);
        let Statement::If(inner) = &outer.stmts[0] else {
            panic!("expected if");
        };
        assert_eq!(inner.else_part.as_ref().map(|e| e.piece_index), Some(3));
        assert_eq!(inner.end_piece, Some(5));
    }

    #[test]
    fn test_for_header() {
        let (stmts, _) = build("{% for key, value in items|sort if value.active %}{% endfor %}");
        let Statement::For(stmt) = &stmts[0] else {
            panic!("expected for");
        };
        assert_eq!(texts(&stmt.variables), vec!["key", "value"]);
        assert_eq!(stmt.iterable.as_ref().map(|e| e.text.as_str()), Some("items|sort"));
        assert_eq!(stmt.condition.as_ref().map(|e| e.text.as_str()), Some("value.active"));
    }

    #[test]
    fn test_unterminated_for_keeps_body() {
        let (stmts, diagnostics) = build("{% for x in xs %}<li>{{ x }}</li>");
        let Statement::For(stmt) = &stmts[0] else {
            panic!("expected for");
        };
        assert_eq!(stmt.end_piece, None);
        assert_eq!(stmt.stmts, vec![Statement::Output(OutputStatement { piece: 2 })]);
        assert_eq!(kinds(&diagnostics), vec![DiagnosticKind::UnclosedBlock]);
    }

    #[test]
    fn test_block_shorthand() {
        let (stmts, diagnostics) = build("{% block title 'Home' %}{% block body %}x{% endblock %}");
        assert!(diagnostics.is_empty());
        assert_eq!(stmts.len(), 2);
        let Statement::Block(short) = &stmts[0] else {
            panic!("expected block");
        };
        assert_eq!(short.name.as_ref().map(|n| n.text.as_str()), Some("title"));
        assert_eq!(short.value.as_ref().map(|v| v.text.as_str()), Some("'Home'"));
        assert_eq!(short.end_piece, None);
        let Statement::Block(full) = &stmts[1] else {
            panic!("expected block");
        };
        assert_eq!(full.end_piece, Some(3));
        assert!(full.value.is_none());
    }

    #[test]
    fn test_set_forms() {
        let (stmts, diagnostics) = build("{% set a, b = 1, 2 %}{% set c %}x{% endset %}");
        assert!(diagnostics.is_empty());
        let Statement::Set(inline) = &stmts[0] else {
            panic!("expected set");
        };
        assert_eq!(texts(&inline.targets), vec!["a", "b"]);
        assert_eq!(inline.value.as_ref().map(|v| v.text.as_str()), Some("1, 2"));
        assert_eq!(inline.end_piece, None);
        let Statement::Set(capture) = &stmts[1] else {
            panic!("expected set");
        };
        assert_eq!(texts(&capture.targets), vec!["c"]);
        assert_eq!(capture.end_piece, Some(3));
    }

    #[test]
    fn test_set_without_value_is_inline() {
        let (stmts, diagnostics) = build("{% set x = %}{% for item in items %}{% endfor %}");
        assert!(diagnostics.is_empty());
        assert_eq!(stmts.len(), 2);
        let Statement::Set(set) = &stmts[0] else {
            panic!("expected set");
        };
        assert!(!set.is_capture());
        assert!(set.value.is_none());
        assert!(!stmts[0].has_body());
        assert!(stmts[0].segments().is_empty());
        assert_eq!(stmts[1].start_piece(), 1);
    }

    #[test]
    fn test_macro_parameters() {
        let (stmts, _) = build(r#"{% macro input(name, value = '', type = "text") %}{% endmacro %}"#);
        let Statement::Macro(stmt) = &stmts[0] else {
            panic!("expected macro");
        };
        assert_eq!(stmt.name.as_ref().map(|n| n.text.as_str()), Some("input"));
        let params: Vec<(&str, Option<&str>)> = stmt
            .parameters
            .iter()
            .map(|p| (p.name.text.as_str(), p.default.as_ref().map(|d| d.text.as_str())))
            .collect();
        assert_eq!(params, vec![("name", None), ("value", Some("''")), ("type", Some("\"text\""))]);
        assert_eq!(stmt.end_piece, Some(1));
    }

    #[test]
    fn test_imports() {
        let (stmts, _) = build("{% import 'forms.html' as forms %}{% from _self import input as field, textarea %}");
        let Statement::Import(import) = &stmts[0] else {
            panic!("expected import");
        };
        assert_eq!(import.source.as_ref().map(|s| s.text.as_str()), Some("'forms.html'"));
        assert_eq!(import.alias.as_ref().map(|a| a.text.as_str()), Some("forms"));

        let Statement::From(from) = &stmts[1] else {
            panic!("expected from");
        };
        assert_eq!(from.source.as_ref().map(|s| s.text.as_str()), Some("_self"));
        let names: Vec<(&str, Option<&str>)> = from
            .names
            .iter()
            .map(|n| (n.name.text.as_str(), n.alias.as_ref().map(|a| a.text.as_str())))
            .collect();
        assert_eq!(names, vec![("input", Some("field")), ("textarea", None)]);
    }

    #[test]
    fn test_references() {
        let (stmts, _) = build("{% extends 'base.twig' %}{% include 'a.twig' with {x: 1} only %}{% use 'b.twig' %}");
        let templates: Vec<Option<&str>> = stmts
            .iter()
            .map(|s| match s {
                Statement::Extends(s) => s.parent.as_ref().and_then(|e| e.string_literal()),
                Statement::Include(s) => s.template.as_ref().and_then(|e| e.string_literal()),
                Statement::Use(s) => s.template.as_ref().and_then(|e| e.string_literal()),
                _ => None,
            })
            .collect();
        assert_eq!(templates, vec![Some("base.twig"), Some("a.twig"), Some("b.twig")]);
    }

    #[test]
    fn test_mismatched_end_closes_inner() {
        let (stmts, diagnostics) = build("{% for x in xs %}{% if x %}a{% endfor %}");
        assert_eq!(stmts.len(), 1);
        let Statement::For(outer) = &stmts[0] else {
            panic!("expected for");
        };
        assert_eq!(outer.end_piece, Some(3));
        assert_eq!(outer.stmts.len(), 1);
        assert_eq!(outer.stmts[0].end_piece(), None);
        assert_eq!(
            kinds(&diagnostics),
            vec![DiagnosticKind::MismatchedEndTag, DiagnosticKind::UnclosedBlock]
        );
        assert_eq!(diagnostics[0].related_label.as_deref(), Some("`if` opened here"));
    }

    #[test]
    fn test_nesting_past_limit_is_flattened() {
        let depth = 50_000;
        let source = format!("{}{{{{ x }}}}{}", "{% if a %}".repeat(depth), "{% endif %}".repeat(depth));
        let (stmts, diagnostics) = build(&source);
        assert_eq!(kinds(&diagnostics), vec![DiagnosticKind::NestingTooDeep]);
        assert_eq!(diagnostics[0].span.start, "{% if a %}".len() * MAX_NESTING);

        let mut levels = 0;
        let mut body = &stmts;
        while let Some(Statement::If(stmt)) = body.first() {
            assert!(stmt.end_piece.is_some());
            levels += 1;
            body = &stmt.stmts;
        }
        assert_eq!(levels, MAX_NESTING);
        assert_eq!(body, &vec![Statement::Output(OutputStatement { piece: depth })]);
    }

    #[test]
    fn test_branches_of_flattened_construct_are_ignored() {
        let source = format!(
            "{}{{% for x in xs %}}{{% else %}}{{% endfor %}}{}",
            "{% if a %}".repeat(MAX_NESTING),
            "{% endif %}".repeat(MAX_NESTING)
        );
        let (stmts, diagnostics) = build(&source);
        assert_eq!(kinds(&diagnostics), vec![DiagnosticKind::NestingTooDeep]);
        assert_eq!(stmts[0].end_piece(), Some(MAX_NESTING * 2 + 2));
    }

    #[test]
    fn test_stray_end_and_else() {
        let (stmts, diagnostics) = build("{% endif %}{% else %}x");
        assert!(stmts.is_empty());
        assert_eq!(
            kinds(&diagnostics),
            vec![DiagnosticKind::UnexpectedEndTag, DiagnosticKind::UnexpectedBranch]
        );
    }

    #[test]
    fn test_else_needs_innermost_construct() {
        let (stmts, diagnostics) = build("{% if a %}{% block b %}{% else %}{% endblock %}{% endif %}");
        let Statement::If(stmt) = &stmts[0] else {
            panic!("expected if");
        };
        assert!(stmt.else_part.is_none());
        assert_eq!(stmt.end_piece, Some(4));
        assert_eq!(stmt.stmts[0].end_piece(), Some(3));
        assert_eq!(kinds(&diagnostics), vec![DiagnosticKind::UnexpectedBranch]);
    }

    #[test]
    fn test_unknown_and_inline_tags() {
        let (stmts, diagnostics) = build("{% foo bar %}{% do x %}{% flush %}{% if a %}{% endif %}");
        assert_eq!(stmts.len(), 1);
        assert_eq!(stmts[0].start_piece(), 3);
        assert_eq!(kinds(&diagnostics), vec![DiagnosticKind::UnknownTag]);
    }

    #[test]
    fn test_configured_tags() {
        let options = Options {
            body_tags: vec!["trans".to_string()],
            inline_tags: vec!["dump".to_string()],
            ..Options::default()
        };
        let (stmts, diagnostics) = build_with("{% trans %}hi{% endtrans %}{% dump x %}", &options);
        assert!(diagnostics.is_empty());
        let Statement::Simple(stmt) = &stmts[0] else {
            panic!("expected simple");
        };
        assert_eq!(stmt.keyword, "trans");
        assert_eq!(stmt.end_piece, Some(2));
    }

    #[test]
    fn test_verbatim_body_is_text() {
        let (stmts, diagnostics) = build("{% verbatim %}{% if %}{% endverbatim %}");
        assert!(diagnostics.is_empty());
        let Statement::Simple(stmt) = &stmts[0] else {
            panic!("expected simple");
        };
        assert!(stmt.stmts.is_empty());
        assert_eq!(stmt.end_piece, Some(2));
    }

    #[test]
    fn test_unclosed_expression() {
        let (stmts, diagnostics) = build("a {{ b");
        assert_eq!(stmts, vec![Statement::Output(OutputStatement { piece: 1 })]);
        assert_eq!(kinds(&diagnostics), vec![DiagnosticKind::UnclosedDelimiter]);
        assert_eq!(diagnostics[0].span, Span::new(2, 4));
    }
}
