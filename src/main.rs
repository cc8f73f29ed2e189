use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use twig_syntax::{Document, Error, LineCol, LineIndex, Options, Result, parse_document_with};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "twig")]
#[command(about = "Inspect Twig templates: pieces, statement tree, scopes and diagnostics")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON file with parser options
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log pipeline details to stderr
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Args)]
struct Input {
    /// Template file
    #[arg(required_unless_present = "stdin")]
    file: Option<PathBuf>,

    /// Read from stdin
    #[arg(long)]
    stdin: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the piece list as JSON
    Pieces(Input),

    /// Print the statement tree and diagnostics as JSON
    Tree(Input),

    /// Print folding ranges as JSON
    Folds(Input),

    /// Print declared and referenced symbols as JSON
    Symbols(Input),

    /// Print the names visible at a position as JSON
    Scopes {
        #[command(flatten)]
        input: Input,

        /// Byte offset into the template
        #[arg(long, required_unless_present = "line", conflicts_with = "line")]
        offset: Option<usize>,

        /// Zero-based line, instead of a byte offset
        #[arg(long)]
        line: Option<usize>,

        /// Zero-based character column on `--line`
        #[arg(long, default_value_t = 0, requires = "line")]
        col: usize,
    },

    /// Report diagnostics for a file or every template under a directory
    Check {
        /// Template file or directory
        path: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let options = match &cli.config {
        Some(path) => Options::from_json_file(path)?,
        None => Options::default(),
    };
    debug!(?options, "loaded options");

    match cli.command {
        Commands::Pieces(input) => {
            let doc = load(&input, &options)?;
            print_json(&doc.pieces)?;
        }
        Commands::Tree(input) => {
            let doc = load(&input, &options)?;
            print_json(&Tree {
                statements: &doc.statements,
                diagnostics: &doc.diagnostics,
            })?;
        }
        Commands::Folds(input) => {
            let doc = load(&input, &options)?;
            print_json(&doc.folding_ranges())?;
        }
        Commands::Symbols(input) => {
            let doc = load(&input, &options)?;
            print_json(&doc.symbols())?;
        }
        Commands::Scopes {
            input,
            offset,
            line,
            col,
        } => {
            let doc = load(&input, &options)?;
            let offset = match (offset, line) {
                (Some(offset), _) => offset,
                // A line past the end maps past the end, where nothing is in scope
                (None, line) => LineIndex::new(&doc.source)
                    .offset(&doc.source, LineCol {
                        line: line.unwrap_or_default(),
                        col,
                    })
                    .unwrap_or(doc.len() + 1),
            };
            debug!(offset, "resolved scope position");
            print_json(&doc.scopes_at(offset))?;
        }
        Commands::Check { path } => return check_path(&path, &options),
    }

    Ok(ExitCode::SUCCESS)
}

#[derive(Serialize)]
struct Tree<'a> {
    statements: &'a [twig_syntax::Statement],
    diagnostics: &'a [twig_syntax::Diagnostic],
}

fn load(input: &Input, options: &Options) -> Result<Document> {
    let source = if input.stdin {
        let mut source = String::new();
        io::stdin().read_to_string(&mut source).map_err(|source| Error::Io {
            path: PathBuf::from("<stdin>"),
            source,
        })?;
        source
    } else {
        match &input.file {
            Some(path) => read_template(path)?,
            None => return Err(Error::NotFound(PathBuf::from("<input>"))),
        }
    };
    Ok(parse_document_with(&source, options))
}

fn read_template(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(Error::NotFound(path.to_path_buf()));
    }
    fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn check_path(path: &Path, options: &Options) -> Result<ExitCode> {
    let start = Instant::now();

    let files: Vec<PathBuf> = if path.is_file() {
        if !options.is_template(path) {
            return Err(Error::NotATemplate {
                path: path.to_path_buf(),
                expected: options.extensions.join(", "),
            });
        }
        vec![path.to_path_buf()]
    } else if path.is_dir() {
        WalkDir::new(path)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && options.is_template(e.path()))
            .map(|e| e.into_path())
            .collect()
    } else {
        return Err(Error::NotFound(path.to_path_buf()));
    };

    let color = io::stderr().is_terminal();
    let mut failed = 0;
    for file in &files {
        let source = read_template(file)?;
        let doc = parse_document_with(&source, options);
        let filename = file.display().to_string();
        if doc.diagnostics.is_empty() {
            print_checked(&filename);
            continue;
        }
        failed += 1;
        for diagnostic in &doc.diagnostics {
            if color {
                eprint!("{}", diagnostic.render_color(&source, &filename));
            } else {
                eprint!("{}", diagnostic.render(&source, &filename));
            }
        }
    }

    print_summary(files.len(), failed, start.elapsed());
    Ok(if failed == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn print_checked(path: &str) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("  \x1b[32m✓\x1b[0m {}", path);
    } else {
        eprintln!("  ✓ {}", path);
    }
}

fn print_summary(count: usize, failed: usize, elapsed: std::time::Duration) {
    let is_tty = io::stderr().is_terminal();
    let time_str = format_duration(elapsed);
    let files_word = if count == 1 { "file" } else { "files" };
    let problems = if failed == 0 {
        String::new()
    } else {
        format!(", {} with problems", failed)
    };

    if is_tty {
        eprintln!("\n\x1b[1mChecked {} {}{} in {}\x1b[0m", count, files_word, problems, time_str);
    } else {
        eprintln!("\nChecked {} {}{} in {}", count, files_word, problems, time_str);
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let micros = d.as_micros();
    if micros < 1000 {
        format!("{}μs", micros)
    } else if micros < 1_000_000 {
        format!("{:.1}ms", micros as f64 / 1000.0)
    } else {
        format!("{:.2}s", d.as_secs_f64())
    }
}
