use std::{
    collections::{hash_map::Entry, HashMap},
    error::Error,
    io::{self, Write},
    ops::Range,
    path::{Path, PathBuf},
};

use clap::Parser;
use codespan_reporting::{
    diagnostic::{Diagnostic, Label},
    files::SimpleFiles,
    term::{
        self,
        termcolor::{ColorChoice, ColorSpec, StandardStream, WriteColor},
    },
};
use kmpgrep::{
    kmp::{FailureTable, Finder, InvalidArgument, Mode},
    FileMatch, FileOccurrence, Matches, SearchError,
};
use regex::Regex;

#[derive(Parser)]
#[command(name = "kmpgrep", disable_help_subcommand = true)]
enum Args {
    /// Show every occurrence of a needle in the files under a directory.
    Search(SearchArgs),
    /// Count occurrences of a needle per file.
    Count(CountArgs),
    /// Print the failure table built for a needle.
    Table {
        needle: String,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(clap::Args)]
struct SearchArgs {
    #[command(flatten)]
    walk: WalkArgs,
    /// Only report the first occurrence in each file.
    #[arg(long)]
    first: bool,
    #[command(flatten)]
    output: OutputArgs,
}

#[derive(clap::Args)]
struct CountArgs {
    #[command(flatten)]
    walk: WalkArgs,
    #[command(flatten)]
    output: OutputArgs,
}

#[derive(clap::Args)]
struct WalkArgs {
    /// The exact byte sequence to look for. Must be non-empty and fit on one line.
    needle: String,
    /// Directory or file to search.
    #[arg(default_value = "./")]
    path: PathBuf,
    /// Only search files whose path matches the given regex.
    #[arg(long)]
    path_pattern: Option<Regex>,
}

#[derive(clap::Args)]
struct OutputArgs {
    /// When to use colors.
    #[arg(long, default_value_t = Color::Auto)]
    color: Color,
}

#[derive(Copy, Clone, clap::ValueEnum)]
enum Color {
    Auto,
    Always,
    Never,
}

impl Color {
    fn choice(self) -> ColorChoice {
        match self {
            Color::Auto => ColorChoice::Auto,
            Color::Always => ColorChoice::Always,
            Color::Never => ColorChoice::Never,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Color::Auto => "auto",
            Color::Always => "always",
            Color::Never => "never",
        }
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

type FileId = usize;

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    match args {
        Args::Search(args) => {
            let color = args.output.color;
            let mode = if args.first { Mode::First } else { Mode::All };
            let Some(matches) = collect(&args.walk, mode, color)? else {
                return Ok(());
            };
            Reporter::new(color).show(&args.walk.needle, &matches)?;
        }
        Args::Count(args) => {
            let color = args.output.color;
            let Some(matches) = collect(&args.walk, Mode::All, color)? else {
                return Ok(());
            };
            let stdout = &mut StandardStream::stdout(color.choice());
            for file in &matches.files {
                stdout.set_color(ColorSpec::new().set_bold(true))?;
                write!(stdout, "{}", file.path.display())?;
                stdout.reset()?;
                writeln!(stdout, ": {}", file.occurrences().len())?;
            }
            stdout.set_color(ColorSpec::new().set_bold(true))?;
            writeln!(stdout, "total: {}", matches.count())?;
            stdout.reset()?;
        }
        Args::Table { needle, output } => {
            let mut emitter = Emitter::new(true, output.color);
            if needle.is_empty() {
                emitter.emit_message(InvalidArgument::EmptyNeedle)?;
            }
            emitter.abort_if_errors();
            print_table(needle.as_bytes(), output.color)?;
        }
    }

    Ok(())
}

/// Runs the search, reporting argument problems as diagnostics. Returns
/// `None` when errors were emitted.
fn collect(args: &WalkArgs, mode: Mode, color: Color) -> Result<Option<Matches>, Box<dyn Error>> {
    let mut emitter = Emitter::new(true, color);
    let finder = match Finder::new(args.needle.as_bytes()) {
        Ok(finder) => finder,
        Err(err) => {
            emitter.emit_message(err)?;
            emitter.abort_if_errors();
            return Ok(None);
        }
    };
    match Matches::collect(&finder, &args.path, args.path_pattern.as_ref(), mode) {
        Ok(matches) => Ok(Some(matches)),
        Err(err @ SearchError::MultiLineNeedle) => {
            emitter.emit_message(err)?;
            emitter.abort_if_errors();
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

fn print_table(needle: &[u8], color: Color) -> io::Result<()> {
    let table = FailureTable::build(needle);
    let stdout = &mut StandardStream::stdout(color.choice());
    stdout.set_color(ColorSpec::new().set_bold(true))?;
    writeln!(stdout, "{:>5} {:>6} {:>4}", "index", "symbol", "lps")?;
    stdout.reset()?;
    for (i, (&symbol, &entry)) in needle.iter().zip(table.as_slice()).enumerate() {
        let symbol = std::ascii::escape_default(symbol).to_string();
        writeln!(stdout, "{i:>5} {symbol:>6} {entry:>4}")?;
    }
    Ok(())
}

struct Emitter {
    writer: StandardStream,
    config: codespan_reporting::term::Config,
    has_errors: bool,
}

impl Emitter {
    fn new(stderr: bool, color: Color) -> Self {
        let writer = if stderr {
            StandardStream::stderr(color.choice())
        } else {
            StandardStream::stdout(color.choice())
        };
        Self {
            writer,
            config: codespan_reporting::term::Config::default(),
            has_errors: false,
        }
    }

    fn abort_if_errors(&self) {
        if self.has_errors {
            std::process::exit(1);
        }
    }

    fn emit(
        &mut self,
        db: &FilesDB,
        diagnostic: Diagnostic<FileId>,
    ) -> Result<(), codespan_reporting::files::Error> {
        self.has_errors |= diagnostic.severity >= codespan_reporting::diagnostic::Severity::Error;
        term::emit(
            &mut self.writer.lock(),
            &self.config,
            &db.files,
            &diagnostic,
        )
    }

    /// Emits an error that doesn't point into any file.
    fn emit_message(
        &mut self,
        message: impl ToString,
    ) -> Result<(), codespan_reporting::files::Error> {
        let diagnostic = Diagnostic::error().with_message(message.to_string());
        self.emit(&FilesDB::new(), diagnostic)
    }
}

struct Reporter {
    db: FilesDB,
    emitter: Emitter,
    color: Color,
}

impl Reporter {
    fn new(color: Color) -> Self {
        Self {
            db: FilesDB::new(),
            emitter: Emitter::new(false, color),
            color,
        }
    }

    fn show(&mut self, needle: &str, matches: &Matches) -> Result<(), Box<dyn Error>> {
        for file in &matches.files {
            match self.db.file_diagnostic(file, needle) {
                Ok(diagnostic) => self.emitter.emit(&self.db, diagnostic)?,
                // Spans can only be rendered for UTF-8 files.
                Err(err) if err.kind() == io::ErrorKind::InvalidData => {
                    self.show_plain(file)?;
                }
                Err(err) => return Err(err.into()),
            }
        }

        let found = matches.count();
        let stdout = &mut StandardStream::stdout(self.color.choice());
        stdout.set_color(ColorSpec::new().set_bold(true))?;
        writeln!(
            stdout,
            "found {found} {} of `{needle}` in {} {}",
            pluralize("occurrence", found),
            matches.files.len(),
            pluralize("file", matches.files.len())
        )?;
        stdout.reset()?;
        Ok(())
    }

    fn show_plain(&self, file: &FileMatch) -> io::Result<()> {
        let stdout = &mut StandardStream::stdout(self.color.choice());
        for occurrence in file.occurrences() {
            let line = occurrence
                .line_number
                .map_or_else(|| "?".to_string(), |n| n.to_string());
            writeln!(
                stdout,
                "{}:{line}: byte {}",
                file.path.display(),
                occurrence.byte_offset
            )?;
        }
        Ok(())
    }
}

struct FilesDB {
    pub files: SimpleFiles<String, String>,
    path_to_file_id: HashMap<PathBuf, FileId>,
}

impl FilesDB {
    fn new() -> Self {
        Self {
            files: SimpleFiles::new(),
            path_to_file_id: HashMap::new(),
        }
    }

    fn labels<'a>(
        &mut self,
        occurrences: impl IntoIterator<Item = FileOccurrence<'a>>,
    ) -> io::Result<Vec<Label<FileId>>> {
        occurrences
            .into_iter()
            .map(|occurrence| self.label(occurrence.file(), occurrence.span()))
            .collect::<io::Result<_>>()
    }

    fn label(&mut self, path: &Path, span: Range<usize>) -> io::Result<Label<FileId>> {
        let file_id = self.try_get_or_insert(path, || std::fs::read_to_string(path))?;
        Ok(Label::primary(file_id, span))
    }

    fn try_get_or_insert<E>(
        &mut self,
        path: &Path,
        f: impl Fn() -> Result<String, E>,
    ) -> Result<FileId, E> {
        match self.path_to_file_id.entry(path.to_path_buf()) {
            Entry::Occupied(entry) => Ok(*entry.get()),
            Entry::Vacant(entry) => {
                let file_id = self.files.add(path.display().to_string(), f()?);
                entry.insert(file_id);
                Ok(file_id)
            }
        }
    }

    fn file_diagnostic(
        &mut self,
        file: &FileMatch,
        needle: &str,
    ) -> io::Result<Diagnostic<FileId>> {
        let found = file.occurrences().len();
        let labels = self.labels(file.file_occurrences())?;
        Ok(Diagnostic::note()
            .with_message(format!(
                "{found} {} of `{needle}`",
                pluralize("occurrence", found)
            ))
            .with_labels(labels))
    }
}

fn pluralize(word: &str, count: usize) -> String {
    if count == 1 {
        word.to_string()
    } else {
        format!("{word}s")
    }
}
