//! Read-only queries over a parsed document: visible names, folding ranges,
//! symbols and cursor classification.

mod context;
mod folding;
mod scope;
mod symbols;

pub use context::{CursorContext, cursor_context};
pub use folding::{FoldingKind, FoldingRange, folding_ranges};
pub use scope::{ScopeEntry, ScopeKind, scopes_at};
pub use symbols::{Symbol, SymbolKind, symbol_at, symbols};

use crate::ast::{Document, Statement};
use crate::parser::piece_at;

/// Visitor over the statement tree
pub trait Visitor<'a> {
    /// Called before visiting children. Return `false` to skip children.
    fn enter(&mut self, _statement: &'a Statement) -> bool {
        true
    }

    /// Called after visiting children.
    fn exit(&mut self, _statement: &'a Statement) {}
}

enum Step<'a> {
    Enter(&'a Statement),
    Exit(&'a Statement),
}

/// Depth-first walk in document order. Uses an explicit stack, so deeply
/// nested templates cannot overflow the call stack.
pub fn walk<'a, V: Visitor<'a> + ?Sized>(statements: &'a [Statement], visitor: &mut V) {
    let mut stack: Vec<Step<'a>> = statements.iter().rev().map(Step::Enter).collect();

    while let Some(step) = stack.pop() {
        match step {
            Step::Enter(statement) => {
                let descend = visitor.enter(statement);
                stack.push(Step::Exit(statement));
                if descend {
                    for segment in statement.segments().iter().rev() {
                        stack.extend(segment.stmts.iter().rev().map(Step::Enter));
                    }
                }
            }
            Step::Exit(statement) => visitor.exit(statement),
        }
    }
}

impl Document {
    /// Index of the piece under `offset`.
    pub fn piece_at(&self, offset: usize) -> Option<usize> {
        piece_at(&self.pieces, offset)
    }

    pub fn scopes_at(&self, offset: usize) -> Vec<ScopeEntry> {
        scopes_at(&self.pieces, &self.statements, offset)
    }

    pub fn folding_ranges(&self) -> Vec<FoldingRange> {
        folding_ranges(&self.source, &self.pieces, &self.statements)
    }

    pub fn symbols(&self) -> Vec<Symbol> {
        symbols(self)
    }

    pub fn symbol_at(&self, offset: usize) -> Option<Symbol> {
        symbol_at(self, offset)
    }

    pub fn cursor_context(&self, offset: usize) -> Option<CursorContext> {
        cursor_context(self, offset)
    }
}
