use serde::Serialize;

use crate::ast::{Branch, Name, Span, Statement};
use crate::parser::{Piece, piece_at};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ScopeKind {
    LoopVar,
    MacroParam,
    ImportedAlias,
    ImportedName,
    BlockLocal,
}

/// A name visible at some offset, and the construct that introduced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeEntry {
    pub name: String,
    pub kind: ScopeKind,
    /// Where the name is declared; `None` for the implicit `loop` variable
    pub span: Option<Span>,
    pub introduced_at_piece: usize,
    /// Piece where the binding stops being visible; `None` means the end of
    /// the document
    pub visible_until_piece: Option<usize>,
}

/// Names visible at `offset`, outermost first. A name bound again further
/// in replaces the outer binding.
///
/// Returns an empty list for offsets past the end of the document.
pub fn scopes_at(pieces: &[Piece], statements: &[Statement], offset: usize) -> Vec<ScopeEntry> {
    let Some(cursor) = piece_at(pieces, offset) else {
        return Vec::new();
    };

    let mut scope = Scope::default();
    let mut body = statements;
    // Closing piece of the body being scanned; `None` is the end of the document
    let mut limit: Option<usize> = None;

    loop {
        let mut inner = None;

        for statement in body {
            if statement.start_piece() >= cursor {
                break;
            }
            scope.declare_sibling(statement, cursor, limit);

            inner = statement.segments().into_iter().find_map(|segment| {
                let end = segment.close_piece.or(limit);
                let inside = segment.open_piece < cursor && end.is_none_or(|end| cursor < end);
                inside.then_some((statement, segment, end))
            });
            if inner.is_some() {
                break;
            }
        }

        let Some((statement, segment, end)) = inner else {
            break;
        };

        if segment.branch == Branch::Main {
            scope.declare_header(statement, end);
        }
        body = segment.stmts;
        limit = end;
    }

    scope.entries
}

#[derive(Default)]
struct Scope {
    entries: Vec<ScopeEntry>,
}

impl Scope {
    fn bind(&mut self, name: &Name, kind: ScopeKind, piece: usize, until: Option<usize>) {
        self.bind_implicit(&name.text, Some(name.span), kind, piece, until);
    }

    fn bind_implicit(&mut self, name: &str, span: Option<Span>, kind: ScopeKind, piece: usize, until: Option<usize>) {
        self.entries.retain(|entry| entry.name != name);
        self.entries.push(ScopeEntry {
            name: name.to_string(),
            kind,
            span,
            introduced_at_piece: piece,
            visible_until_piece: until,
        });
    }

    /// Bindings a statement before the cursor leaks to its later siblings.
    fn declare_sibling(&mut self, statement: &Statement, cursor: usize, limit: Option<usize>) {
        match statement {
            Statement::Import(stmt) => {
                if let Some(alias) = &stmt.alias {
                    self.bind(alias, ScopeKind::ImportedAlias, stmt.piece, limit);
                }
            }
            Statement::From(stmt) => {
                for imported in &stmt.names {
                    self.bind(imported.local(), ScopeKind::ImportedName, stmt.piece, limit);
                }
            }
            Statement::Set(stmt) => {
                // A capture is assigned once its body is complete
                let assigned = match stmt.end_piece {
                    Some(end) => end < cursor,
                    None => !stmt.is_capture(),
                };
                if !assigned {
                    return;
                }
                for target in &stmt.targets {
                    self.bind(target, ScopeKind::BlockLocal, stmt.start_piece, limit);
                }
            }
            _ => {}
        }
    }

    /// Bindings a statement's header introduces into its main body.
    fn declare_header(&mut self, statement: &Statement, until: Option<usize>) {
        match statement {
            Statement::For(stmt) => {
                for variable in &stmt.variables {
                    self.bind(variable, ScopeKind::LoopVar, stmt.start_piece, until);
                }
                self.bind_implicit("loop", None, ScopeKind::LoopVar, stmt.start_piece, until);
            }
            Statement::Macro(stmt) => {
                for parameter in &stmt.parameters {
                    self.bind(&parameter.name, ScopeKind::MacroParam, stmt.start_piece, until);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_document;

    fn names_at(source: &str, marker: &str) -> Vec<(String, ScopeKind)> {
        let doc = parse_document(source);
        let offset = source.find(marker).expect("marker in source");
        doc.scopes_at(offset)
            .into_iter()
            .map(|entry| (entry.name, entry.kind))
            .collect()
    }

    fn has(entries: &[(String, ScopeKind)], name: &str, kind: ScopeKind) -> bool {
        entries.iter().any(|(n, k)| n == name && *k == kind)
    }

    #[test]
    fn test_loop_vars_only_in_main_body() {
        let source = "{% for k, v in items %}BODY{% else %}EMPTY{% endfor %}AFTER";
        let body = names_at(source, "BODY");
        assert!(has(&body, "k", ScopeKind::LoopVar));
        assert!(has(&body, "v", ScopeKind::LoopVar));
        assert!(has(&body, "loop", ScopeKind::LoopVar));
        assert!(names_at(source, "EMPTY").is_empty());
        assert!(names_at(source, "AFTER").is_empty());
    }

    #[test]
    fn test_loop_var_not_visible_in_header() {
        let source = "{% for x in items %}{% endfor %}";
        assert!(names_at(source, "items").is_empty());
    }

    #[test]
    fn test_macro_params() {
        let source = "{% macro m(a, b = 2) %}BODY{% endmacro %}";
        let body = names_at(source, "BODY");
        assert_eq!(
            body,
            vec![
                ("a".to_string(), ScopeKind::MacroParam),
                ("b".to_string(), ScopeKind::MacroParam)
            ]
        );
    }

    #[test]
    fn test_sequential_set() {
        let source = "BEFORE{% set a = 1 %}{% if x %}INNER{% endif %}{% set b %}CAPTURE{% endset %}AFTER";
        assert!(names_at(source, "BEFORE").is_empty());
        assert!(has(&names_at(source, "INNER"), "a", ScopeKind::BlockLocal));
        let capture = names_at(source, "CAPTURE");
        assert!(has(&capture, "a", ScopeKind::BlockLocal));
        assert!(!has(&capture, "b", ScopeKind::BlockLocal));
        assert!(has(&names_at(source, "AFTER"), "b", ScopeKind::BlockLocal));
    }

    #[test]
    fn test_set_being_typed_does_not_hide_later_siblings() {
        let source = "{% set x = %}{% import 'f.twig' as forms %}{% for item in items %}HERE{% endfor %}";
        let entries = names_at(source, "HERE");
        assert!(has(&entries, "x", ScopeKind::BlockLocal));
        assert!(has(&entries, "forms", ScopeKind::ImportedAlias));
        assert!(has(&entries, "item", ScopeKind::LoopVar));
        assert!(has(&entries, "loop", ScopeKind::LoopVar));
    }

    #[test]
    fn test_set_inside_loop_stays_inside() {
        let source = "{% for x in y %}{% set t = x %}IN{% endfor %}OUT";
        assert!(has(&names_at(source, "IN"), "t", ScopeKind::BlockLocal));
        assert!(!has(&names_at(source, "OUT"), "t", ScopeKind::BlockLocal));
    }

    #[test]
    fn test_top_level_imports_visible_to_document_end() {
        let source = "{% import 'f.twig' as forms %}{% from 'g.twig' import a as b, c %}{% for x in y %}{% if z %}DEEP{% endif %}{% endfor %}";
        let doc = parse_document(source);
        let entries = doc.scopes_at(source.find("DEEP").expect("marker"));
        let forms = entries.iter().find(|e| e.name == "forms").expect("forms in scope");
        assert_eq!(forms.kind, ScopeKind::ImportedAlias);
        assert_eq!(forms.visible_until_piece, None);
        assert_eq!(forms.introduced_at_piece, 0);
        assert!(entries.iter().any(|e| e.name == "b" && e.kind == ScopeKind::ImportedName));
        assert!(entries.iter().any(|e| e.name == "c" && e.kind == ScopeKind::ImportedName));
        assert!(!entries.iter().any(|e| e.name == "a"));
    }

    #[test]
    fn test_unterminated_construct_scopes_to_end() {
        let source = "{% for item in items %}\n  <li>{{ item }}</li>\n";
        let entries = names_at(source, "</li>");
        assert!(has(&entries, "item", ScopeKind::LoopVar));
    }

    #[test]
    fn test_inner_binding_shadows_outer() {
        let source = "{% for x in a %}{% for x in x.children %}IN{% endfor %}{% endfor %}";
        let doc = parse_document(source);
        let entries = doc.scopes_at(source.find("IN").expect("marker"));
        let xs: Vec<&ScopeEntry> = entries.iter().filter(|e| e.name == "x").collect();
        assert_eq!(xs.len(), 1);
        assert_eq!(xs[0].introduced_at_piece, 1);
    }

    #[test]
    fn test_out_of_range_offset() {
        let doc = parse_document("{% for x in y %}a{% endfor %}");
        assert!(doc.scopes_at(10_000).is_empty());
        assert!(parse_document("").scopes_at(0).is_empty());
    }
}
