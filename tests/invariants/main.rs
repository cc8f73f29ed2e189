//! Structural invariants over every fixture template, on the full text and on
//! every line prefix of it (a document being typed top to bottom).
//!
//! Run with: cargo test --test invariants

use libtest_mimic::{Arguments, Failed, Trial};
use std::fs;
use std::path::{Path, PathBuf};
use twig_syntax::{Document, Statement, find_pieces, parse, parse_document, piece_at};

fn main() {
    let args = Arguments::from_args();
    libtest_mimic::run(&args, collect_trials()).exit();
}

fn collect_trials() -> Vec<Trial> {
    let pattern = format!("{}/tests/fixtures/**/*.twig", env!("CARGO_MANIFEST_DIR"));
    let mut paths: Vec<PathBuf> = glob::glob(&pattern)
        .expect("valid glob pattern")
        .filter_map(|entry| entry.ok())
        .collect();
    paths.sort();

    let mut trials = Vec::new();
    for path in paths {
        let name = fixture_name(&path);

        let full = path.clone();
        trials.push(Trial::test(format!("{}::full", name), move || {
            let source = read(&full)?;
            check(&source)
        }));

        let prefixes = path.clone();
        trials.push(Trial::test(format!("{}::line_prefixes", name), move || {
            let source = read(&prefixes)?;
            for (end, _) in source.match_indices('\n') {
                check(&source[..end])
                    .map_err(|err| Failed::from(format!("prefix ending at {}: {}", end, err.message().unwrap_or(""))))?;
            }
            Ok(())
        }));

        if name.starts_with("basic/") {
            let clean = path.clone();
            trials.push(Trial::test(format!("{}::no_diagnostics", name), move || {
                let source = read(&clean)?;
                let doc = parse_document(&source);
                match doc.diagnostics.first() {
                    None => Ok(()),
                    Some(diagnostic) => Err(diagnostic.render(&source, &clean.display().to_string()).into()),
                }
            }));
        }
    }
    trials
}

/// "tests/fixtures/basic/layout.twig" -> "basic/layout"
fn fixture_name(path: &Path) -> String {
    let parent = path.parent().and_then(|p| p.file_name()).unwrap_or_default();
    let stem = path.file_stem().unwrap_or_default();
    format!("{}/{}", parent.to_string_lossy(), stem.to_string_lossy())
}

fn read(path: &Path) -> Result<String, Failed> {
    fs::read_to_string(path).map_err(|err| format!("{}: {}", path.display(), err).into())
}

fn check(source: &str) -> Result<(), Failed> {
    let doc = parse_document(source);

    check_cover("token", doc.tokens.iter().map(|t| (t.span.start, t.span.end)), source.len())?;
    check_cover("piece", doc.pieces.iter().map(|p| (p.start(), p.end())), source.len())?;
    if find_pieces(&doc.tokens) != doc.pieces {
        return Err("piece extraction is not deterministic".into());
    }

    check_nesting(&doc.statements, 0, None)?;
    if parse(source, &doc.pieces) != doc.statements {
        return Err("reparsing produced a different tree".into());
    }

    check_scopes(&doc)?;

    for range in doc.folding_ranges() {
        if range.end_line <= range.start_line {
            return Err(format!("empty folding range {:?}", range).into());
        }
    }

    for diagnostic in &doc.diagnostics {
        if diagnostic.span.end > source.len() || diagnostic.span.start > diagnostic.span.end {
            return Err(format!("diagnostic span out of range: {:?}", diagnostic).into());
        }
    }
    Ok(())
}

fn check_cover(what: &str, spans: impl Iterator<Item = (usize, usize)>, len: usize) -> Result<(), Failed> {
    let mut at = 0;
    for (start, end) in spans {
        if start != at || end <= start {
            return Err(format!("{} {}..{} does not continue at {}", what, start, end, at).into());
        }
        at = end;
    }
    if at != len {
        return Err(format!("{}s end at {}, document is {} bytes", what, at, len).into());
    }
    Ok(())
}

fn check_nesting(statements: &[Statement], lower: usize, upper: Option<usize>) -> Result<(), Failed> {
    for statement in statements {
        let start = statement.start_piece();
        if start < lower || upper.is_some_and(|upper| start >= upper) {
            return Err(format!("{} at piece {} escapes its body {}..{:?}", statement.kind_name(), start, lower, upper).into());
        }
        if statement.end_piece().is_some_and(|end| end <= start) {
            return Err(format!("{} at piece {} ends before it starts", statement.kind_name(), start).into());
        }
        for segment in statement.segments() {
            if segment.close_piece.is_some_and(|close| close <= segment.open_piece) {
                return Err(format!("branch at piece {} closes before it opens", segment.open_piece).into());
            }
            check_nesting(segment.stmts, segment.open_piece + 1, segment.close_piece.or(upper))?;
        }
    }
    Ok(())
}

/// Every binding visible at a piece was introduced by an earlier piece and
/// is still live there.
fn check_scopes(doc: &Document) -> Result<(), Failed> {
    for piece in &doc.pieces {
        let offset = piece.start();
        let Some(cursor) = piece_at(&doc.pieces, offset) else {
            return Err(format!("no piece at offset {}", offset).into());
        };
        for entry in doc.scopes_at(offset) {
            if entry.introduced_at_piece >= cursor {
                return Err(format!("`{}` visible at piece {} before it is declared", entry.name, cursor).into());
            }
            if entry.visible_until_piece.is_some_and(|until| until <= cursor) {
                return Err(format!("`{}` visible at piece {} after its scope ends", entry.name, cursor).into());
            }
        }
    }
    Ok(())
}
