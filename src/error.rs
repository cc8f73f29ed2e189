use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::parser::positions::LineIndex;
use crate::parser::tokenizer::Span;

/// Kind of structural irregularity found while parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DiagnosticKind {
    /// `{%`, `{{` or `{#` without its closing delimiter
    UnclosedDelimiter,
    /// Body tag still open at the end of its enclosing body
    UnclosedBlock,
    /// `end*` tag with nothing open to close
    UnexpectedEndTag,
    /// `end*` tag closing a construct that is not the innermost one
    MismatchedEndTag,
    /// `else`/`elseif` where no open construct accepts it
    UnexpectedBranch,
    UnknownTag,
    /// Construct opened deeper than the nesting limit; its body is kept in
    /// the enclosing construct
    NestingTooDeep,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::UnclosedDelimiter => "Unclosed delimiter",
            DiagnosticKind::UnclosedBlock => "Unclosed block",
            DiagnosticKind::UnexpectedEndTag => "Unexpected end tag",
            DiagnosticKind::MismatchedEndTag => "Mismatched end tag",
            DiagnosticKind::UnexpectedBranch => "Unexpected branch",
            DiagnosticKind::UnknownTag => "Unknown tag",
            DiagnosticKind::NestingTooDeep => "Nesting too deep",
        }
    }
}

/// Non-fatal problem found while building the statement tree.
///
/// Diagnostics are informational: the tree is built the same way whether or
/// not anyone looks at them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub span: Span,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_span: Option<Span>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            message: message.into(),
            span,
            related_span: None,
            related_label: None,
            help: None,
        }
    }

    /// Add a related span (e.g. where the construct was opened)
    pub fn with_related(mut self, span: Span) -> Self {
        self.related_span = Some(span);
        self
    }

    /// Set the label for the related span
    pub fn with_related_label(mut self, label: impl Into<String>) -> Self {
        self.related_label = Some(label.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Render with source context
    pub fn render(&self, source: &str, filename: &str) -> String {
        self.render_inner(source, filename, false)
    }

    /// Render with ANSI color codes
    pub fn render_color(&self, source: &str, filename: &str) -> String {
        self.render_inner(source, filename, true)
    }

    fn render_inner(&self, source: &str, filename: &str, color: bool) -> String {
        let yellow = if color { "\x1b[1;33m" } else { "" };
        let dim = if color { "\x1b[2m" } else { "" };
        let cyan = if color { "\x1b[1;38;5;73m" } else { "" };
        let reset = if color { "\x1b[0m" } else { "" };

        let index = LineIndex::new(source);
        let mut output = String::new();
        output.push('\n');

        let start = index.line_col(source, self.span.start);
        output.push_str(&format!(
            " {}file:{} {}:{}:{}\n",
            dim,
            reset,
            filename,
            start.line + 1,
            start.col + 1
        ));

        let message = if color { highlight_code(&self.message) } else { self.message.clone() };
        output.push_str(&format!("{}warning:{} {}\n", yellow, reset, message));

        let width = (index.line(self.span.start.max(self.related_span.map_or(0, |s| s.start))) + 1)
            .to_string()
            .len()
            .max(2);

        output.push_str(&format!("{}{:>width$} |{}\n", dim, "", reset, width = width));
        render_snippet(&mut output, source, &index, self.span, None, color, width);

        if let Some(related) = self.related_span {
            let label = self.related_label.as_deref().unwrap_or("opened here");
            render_snippet(&mut output, source, &index, related, Some(label), color, width);
        }

        if let Some(ref help) = self.help {
            output.push('\n');
            for (i, help_line) in help.lines().enumerate() {
                let content = if color { highlight_code(help_line) } else { help_line.to_string() };
                if i == 0 {
                    output.push_str(&format!(" {}help:{} {}\n", cyan, reset, content));
                } else {
                    output.push_str(&format!("       {}\n", content));
                }
            }
        }

        output.push('\n');
        output
    }
}

/// One source line with a caret underline under `span`. Spans running past
/// the end of the line are underlined to the line end.
fn render_snippet(
    output: &mut String,
    source: &str,
    index: &LineIndex,
    span: Span,
    label: Option<&str>,
    color: bool,
    width: usize,
) {
    let yellow = if color { "\x1b[1;33m" } else { "" };
    let dim = if color { "\x1b[2m" } else { "" };
    let reset = if color { "\x1b[0m" } else { "" };

    let start = index.line_col(source, span.start);
    let Some(line) = source.lines().nth(start.line) else {
        return;
    };
    let end = index.line_col(source, span.end);
    let line_len = line.chars().count();
    let underline_len = if end.line == start.line {
        end.col.saturating_sub(start.col)
    } else {
        line_len.saturating_sub(start.col)
    }
    .max(1);

    let highlighted = if color { highlight_delimiters(line) } else { line.to_string() };
    output.push_str(&format!(
        "{}{:>width$} |{} {}\n",
        dim,
        start.line + 1,
        reset,
        highlighted,
        width = width
    ));

    let spaces = " ".repeat(start.col);
    let carets = "^".repeat(underline_len);
    match label {
        Some(label) => output.push_str(&format!(
            "{}{:>width$} |{} {}{}{} {}{}\n",
            dim, "", reset, spaces, dim, carets, label, reset,
            width = width
        )),
        None => output.push_str(&format!(
            "{}{:>width$} |{} {}{}{}{}\n",
            dim, "", reset, spaces, yellow, carets, reset,
            width = width
        )),
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

/// Highlight `code` spans in prose (messages, help text)
fn highlight_code(text: &str) -> String {
    const CODE: &str = "\x1b[38;5;173m";
    const RESET: &str = "\x1b[0m";

    let mut result = String::with_capacity(text.len() * 2);
    let mut parts = text.split('`');
    if let Some(first) = parts.next() {
        result.push_str(first);
    }
    for (i, part) in parts.enumerate() {
        if i % 2 == 0 {
            result.push_str(CODE);
            result.push('`');
            result.push_str(part);
            result.push('`');
            result.push_str(RESET);
        } else {
            result.push_str(part);
        }
    }
    result
}

/// Color template delimiters in a source line
fn highlight_delimiters(line: &str) -> String {
    const DELIM: &str = "\x1b[38;5;180m";
    const COMMENT: &str = "\x1b[38;5;244m";
    const RESET: &str = "\x1b[0m";

    let mut result = String::with_capacity(line.len() * 2);
    let mut rest = line;
    while let Some(pos) = rest.find(['{', '%', '}', '#']) {
        let (before, tail) = rest.split_at(pos);
        result.push_str(before);
        let pair = tail.get(..2).unwrap_or("");
        match pair {
            "{%" | "%}" | "{{" | "}}" => {
                result.push_str(DELIM);
                result.push_str(pair);
                result.push_str(RESET);
                rest = &tail[2..];
            }
            "{#" | "#}" => {
                result.push_str(COMMENT);
                result.push_str(pair);
                result.push_str(RESET);
                rest = &tail[2..];
            }
            _ => {
                result.push_str(&tail[..1]);
                rest = &tail[1..];
            }
        }
    }
    result.push_str(rest);
    result
}

/// Errors from the outer surfaces: file access, configuration, output.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", .path.display())]
    Config {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{} is not a template (expected one of: {expected})", .path.display())]
    NotATemplate { path: PathBuf, expected: String },

    #[error("{} does not exist", .0.display())]
    NotFound(PathBuf),
}

pub type Result<T> = std::result::Result<T, Error>;
