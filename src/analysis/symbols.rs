use serde::Serialize;

use super::{Visitor, walk};
use crate::ast::{Document, Expr, Name, Span, Statement};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SymbolKind {
    Macro,
    MacroParameter,
    Block,
    LoopVariable,
    Variable,
    ImportAlias,
    ImportedName,
    /// Template named by `extends`, `include`, `use`, `import` or `from`
    TemplateReference,
}

/// A name declared or referenced by a statement header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub span: Span,
    /// Piece holding the declaration
    pub piece: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Symbol {
    fn declared(name: &Name, kind: SymbolKind, piece: usize) -> Self {
        Self {
            name: name.text.clone(),
            kind,
            span: name.span,
            piece,
            detail: None,
        }
    }

    /// Template references are named by their literal value when they have one.
    fn reference(expr: &Expr, piece: usize, tag: &str) -> Self {
        Self {
            name: expr.string_literal().unwrap_or(&expr.text).to_string(),
            kind: SymbolKind::TemplateReference,
            span: expr.span,
            piece,
            detail: Some(tag.to_string()),
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[derive(Default)]
struct Collector {
    symbols: Vec<Symbol>,
}

impl<'a> Visitor<'a> for Collector {
    fn enter(&mut self, statement: &'a Statement) -> bool {
        let symbols = &mut self.symbols;
        match statement {
            Statement::Macro(stmt) => {
                if let Some(name) = &stmt.name {
                    let params: Vec<&str> = stmt.parameters.iter().map(|p| p.name.text.as_str()).collect();
                    let signature = format!("{}({})", name.text, params.join(", "));
                    symbols.push(Symbol::declared(name, SymbolKind::Macro, stmt.start_piece).with_detail(signature));
                }
                for param in &stmt.parameters {
                    let mut symbol = Symbol::declared(&param.name, SymbolKind::MacroParameter, stmt.start_piece);
                    symbol.detail = param.default.as_ref().map(|d| format!("= {}", d.text));
                    symbols.push(symbol);
                }
            }
            Statement::Block(stmt) => {
                if let Some(name) = &stmt.name {
                    symbols.push(Symbol::declared(name, SymbolKind::Block, stmt.start_piece));
                }
            }
            Statement::For(stmt) => {
                for variable in &stmt.variables {
                    symbols.push(Symbol::declared(variable, SymbolKind::LoopVariable, stmt.start_piece));
                }
            }
            Statement::Set(stmt) => {
                for target in &stmt.targets {
                    symbols.push(Symbol::declared(target, SymbolKind::Variable, stmt.start_piece));
                }
            }
            Statement::Import(stmt) => {
                if let Some(source) = &stmt.source {
                    symbols.push(Symbol::reference(source, stmt.piece, "import"));
                }
                if let Some(alias) = &stmt.alias {
                    let mut symbol = Symbol::declared(alias, SymbolKind::ImportAlias, stmt.piece);
                    symbol.detail = stmt.source.as_ref().map(|s| s.text.clone());
                    symbols.push(symbol);
                }
            }
            Statement::From(stmt) => {
                if let Some(source) = &stmt.source {
                    symbols.push(Symbol::reference(source, stmt.piece, "from"));
                }
                for imported in &stmt.names {
                    // `from x import a as b` declares `b`; `a` names the macro in `x`
                    let mut symbol = Symbol::declared(imported.local(), SymbolKind::ImportedName, stmt.piece);
                    symbol.detail = Some(imported.name.text.clone());
                    symbols.push(symbol);
                }
            }
            Statement::Extends(stmt) => {
                if let Some(parent) = &stmt.parent {
                    symbols.push(Symbol::reference(parent, stmt.piece, "extends"));
                }
            }
            Statement::Include(stmt) => {
                if let Some(template) = &stmt.template {
                    symbols.push(Symbol::reference(template, stmt.piece, "include"));
                }
            }
            Statement::Use(stmt) => {
                if let Some(template) = &stmt.template {
                    symbols.push(Symbol::reference(template, stmt.piece, "use"));
                }
            }
            Statement::If(_) | Statement::Simple(_) | Statement::Output(_) => {}
        }
        true
    }
}

/// Every symbol in the document, in document order.
pub fn symbols(document: &Document) -> Vec<Symbol> {
    let mut collector = Collector::default();
    walk(&document.statements, &mut collector);
    collector.symbols
}

/// The symbol whose name is under `offset`, if any. A cursor right after the
/// last character still counts.
pub fn symbol_at(document: &Document, offset: usize) -> Option<Symbol> {
    symbols(document)
        .into_iter()
        .find(|symbol| symbol.span.touches(offset))
}
