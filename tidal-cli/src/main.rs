use anyhow::{anyhow, bail, Result};
use clap::Parser;
use rustyline::{
    completion::{extract_word, Completer},
    error::ReadlineError,
    highlight::Highlighter,
    hint::Hinter,
    history::DefaultHistory,
    validate::Validator,
    Editor, Helper,
};
use std::{
    borrow::Cow,
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use tidal::{
    driver::memory::MEMORY_DATABASE,
    lexer::{is_valid_identifier_char, quote, LexerError, SegmentKind, Segmenter, KEYWORDS},
    Connection, DiagState, Diagnostic, Environment, Options, Registry, ResultSet, Transaction,
};
use unicode_width::UnicodeWidthStr;

#[derive(Parser, Debug)]
struct Args {
    /// Database to open; `:memory:` is discarded on exit
    #[arg(default_value = MEMORY_DATABASE)]
    database: String,

    /// Driver as <engine>:<driver>[:<libpath>]
    #[arg(long, default_value = "memory:default")]
    driver: String,

    #[arg(long)]
    user: Option<String>,

    #[arg(long)]
    password: Option<String>,

    /// Extra connect option, may be repeated
    #[arg(short = 'o', value_name = "KEY=VALUE", value_parser = parse_option)]
    options: Vec<(String, String)>,

    /// Run the statements in FILE before reading input
    #[arg(long, value_name = "FILE")]
    init: Option<PathBuf>,
}

impl Args {
    fn connect_options(&self) -> Options {
        let credentials = [("username", &self.user), ("password", &self.password)]
            .into_iter()
            .filter_map(|(key, value)| Some((key.to_owned(), value.clone()?)));
        std::iter::once(("database".to_owned(), self.database.clone()))
            .chain(credentials)
            .chain(self.options.iter().cloned())
            .map(|(key, value)| (key, value.into()))
            .collect()
    }
}

fn parse_option(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_owned(), value.to_owned()))
        }
        _ => Err(format!("expected KEY=VALUE, got {s:?}")),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let env = Environment::new(&Registry::default(), &args.driver)?;
    let mut conn = env.new_connection();
    let connected = conn.connect(&args.connect_options());
    report(std::iter::from_fn(|| conn.fetch_diag()));
    connected?;

    let mut repl = Repl::new(&conn)?;
    if let Some(init) = &args.init {
        repl.source(init)?;
    }
    repl.run()
}

fn report(diagnostics: impl Iterator<Item = Diagnostic>) {
    for diagnostic in diagnostics {
        eprintln!("{}: {diagnostic}", diagnostic.state());
    }
}

struct Repl<'conn> {
    editor: Editor<SqlHelper, DefaultHistory>,
    conn: &'conn Connection,
    txn: Option<Transaction<'conn>>,
    /// Lines of a statement that has not been terminated yet.
    pending: String,
}

impl<'conn> Repl<'conn> {
    fn new(conn: &'conn Connection) -> Result<Self> {
        let mut editor = Editor::new()?;
        editor.set_helper(Some(SqlHelper));
        Ok(Self {
            editor,
            conn,
            txn: None,
            pending: String::new(),
        })
    }

    fn prompt(&self) -> &'static str {
        if !self.pending.is_empty() {
            ". "
        } else if self.txn.is_some() {
            "*> "
        } else {
            "> "
        }
    }

    fn run(mut self) -> Result<()> {
        loop {
            match self.editor.readline(self.prompt()) {
                Ok(line) => self.feed(&line, true)?,
                Err(ReadlineError::Eof) => break,
                Err(ReadlineError::Interrupted) => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }
        self.flush(true);
        Ok(())
    }

    /// Runs every statement and metacommand in `path`.
    fn source(&mut self, path: &Path) -> Result<()> {
        let script = fs::read_to_string(path)?;
        for line in script.lines() {
            self.feed(line, false)?;
        }
        self.flush(true);
        self.pending.clear();
        Ok(())
    }

    fn feed(&mut self, line: &str, interactive: bool) -> Result<()> {
        let trimmed = line.trim();
        if self.pending.is_empty() {
            if trimmed.is_empty() {
                return Ok(());
            }
            if trimmed.starts_with('.') {
                if interactive {
                    self.editor.add_history_entry(trimmed)?;
                }
                if let Err(e) = self.metacommand(trimmed) {
                    eprintln!("{e}");
                }
                return Ok(());
            }
        }
        self.pending.push_str(line);
        self.pending.push('\n');
        if trimmed.ends_with(';') && self.flush(false) && interactive {
            let entry = std::mem::take(&mut self.pending);
            self.editor.add_history_entry(entry.trim_end())?;
        }
        Ok(())
    }

    /// Runs the complete statements in the pending input. Returns false if
    /// the input ends inside a quoted string and more lines are needed.
    fn flush(&mut self, at_eof: bool) -> bool {
        let Some(statements) = split_statements(&self.pending, at_eof) else {
            return false;
        };
        for sql in statements {
            if let Err(e) = self.execute(&sql) {
                eprintln!("{e}");
                if !at_eof {
                    break;
                }
            }
        }
        self.pending.clear();
        true
    }

    fn execute(&self, sql: &str) -> Result<()> {
        log::debug!("Running {sql:?}");
        let mut statement = self.conn.new_statement()?;
        let executed = statement.execute_direct(sql);
        report(
            std::iter::from_fn(|| statement.fetch_diag())
                .filter(|diagnostic| diagnostic.state() != DiagState::Error),
        );
        executed?;
        let table = Table::collect(statement.resultset()?)?;
        table.render(&mut std::io::stdout().lock())?;
        report(std::iter::from_fn(|| statement.fetch_diag()));
        Ok(())
    }

    fn metacommand(&mut self, line: &str) -> Result<()> {
        let words = std::iter::once("").chain(line.split_ascii_whitespace());
        match Metacommand::try_parse_from(words)? {
            Metacommand::Import(args) => {
                let count = if self.txn.is_some() {
                    args.import(self.conn)?
                } else {
                    let txn = self.conn.begin()?;
                    let count = args.import(self.conn)?;
                    txn.commit()?;
                    count
                };
                eprintln!("Imported {count} rows");
            }
            Metacommand::Read { file } => self.source(&file)?,
            Metacommand::Begin => {
                if self.txn.is_some() {
                    bail!("A transaction is already open");
                }
                self.txn = Some(self.conn.begin()?);
            }
            Metacommand::Commit => self.close_txn()?.commit()?,
            Metacommand::Rollback { to: None } => self.close_txn()?.rollback()?,
            Metacommand::Rollback { to: Some(name) } => self.open_txn()?.rollback_to(&name)?,
            Metacommand::Savepoint { name } => self.open_txn()?.savepoint(&name)?,
        }
        Ok(())
    }

    fn open_txn(&self) -> Result<&Transaction<'conn>> {
        self.txn
            .as_ref()
            .ok_or_else(|| anyhow!("No transaction is open"))
    }

    fn close_txn(&mut self) -> Result<Transaction<'conn>> {
        self.txn.take().ok_or_else(|| anyhow!("No transaction is open"))
    }
}

/// Splits `input` at top-level semicolons, dropping statements that hold
/// only whitespace and comments.
///
/// Returns `None` if `input` ends inside a quoted string, unless `at_eof`,
/// in which case the unterminated rest is passed on for the engine to reject.
fn split_statements(input: &str, at_eof: bool) -> Option<Vec<String>> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut significant = false;
    for segment in Segmenter::new(input) {
        let segment = match segment {
            Ok(segment) => segment,
            Err((LexerError::UnexpectedEof, _)) if !at_eof => return None,
            Err((_, rest)) => {
                current.push_str(rest);
                significant = true;
                break;
            }
        };
        match segment.kind() {
            SegmentKind::Operator if segment.slice() == ";" => {
                if significant {
                    statements.push(std::mem::take(&mut current));
                }
                current.clear();
                significant = false;
            }
            SegmentKind::Whitespace | SegmentKind::Comment => current.push_str(segment.slice()),
            _ => {
                current.push_str(segment.slice());
                significant = true;
            }
        }
    }
    if significant {
        statements.push(current);
    }
    Some(statements)
}

#[derive(Parser, Debug)]
enum Metacommand {
    /// Insert the records of FILE into TABLE
    #[command(name = ".import")]
    Import(ImportArgs),

    /// Run the statements in FILE
    #[command(name = ".read")]
    Read { file: PathBuf },

    /// Start a transaction
    #[command(name = ".begin")]
    Begin,

    /// Commit the open transaction
    #[command(name = ".commit")]
    Commit,

    /// Roll back the open transaction, or only to a savepoint
    #[command(name = ".rollback")]
    Rollback {
        #[arg(long, value_name = "SAVEPOINT")]
        to: Option<String>,
    },

    /// Set a savepoint in the open transaction
    #[command(name = ".savepoint")]
    Savepoint { name: String },
}

#[derive(clap::Args, Debug)]
struct ImportArgs {
    /// Fields separated by 0x1f, records by 0x1e
    #[arg(long, group = "format")]
    ascii: bool,

    /// Comma-separated fields (the default)
    #[arg(long, group = "format")]
    csv: bool,

    /// Tab-separated fields
    #[arg(long, group = "format")]
    tsv: bool,

    /// Treat the first record as a header and skip it
    #[arg(long)]
    skip_header: bool,

    /// Escape character inside quoted fields
    #[arg(long)]
    escape: Option<char>,

    file: PathBuf,
    table: String,
}

impl ImportArgs {
    fn reader(&self) -> Result<csv::Reader<fs::File>> {
        let mut builder = csv::ReaderBuilder::new();
        builder.has_headers(self.skip_header).flexible(true);
        if self.ascii {
            builder.ascii();
        } else if self.tsv {
            builder.delimiter(b'\t');
        }
        if let Some(escape) = self.escape {
            builder.escape(Some(u8::try_from(escape)?));
        }
        Ok(builder.from_path(&self.file)?)
    }

    /// Inserts every record as a row, binding each field as text.
    fn import(&self, conn: &Connection) -> Result<u64> {
        let mut reader = self.reader()?;
        let mut statement = conn.new_statement()?;
        let mut imported = 0;
        for record in reader.records() {
            let record = record?;
            if statement.sql().is_none() || statement.param_count() != record.len() {
                statement.close();
                let placeholders = vec!["?"; record.len()].join(", ");
                let table = quote(&self.table, '"');
                statement.prepare(&format!("INSERT INTO {table} VALUES ({placeholders})"))?;
            }
            for (index, field) in (1..).zip(record.iter()) {
                statement.bind(index, field)?;
            }
            statement.execute()?;
            imported += statement.affected_rows();
        }
        log::debug!("Imported {imported} rows from {}", self.file.display());
        Ok(imported)
    }
}

/// A result rendered as text, laid out in aligned columns.
struct Table {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    fn collect(mut results: ResultSet) -> Result<Self> {
        let header = results
            .columns()
            .iter()
            .map(|column| column.name.clone())
            .collect();
        let mut rows = Vec::new();
        while results.next()? {
            rows.push(results.row()?.iter().map(ToString::to_string).collect());
        }
        Ok(Self { header, rows })
    }

    fn widths(&self) -> Vec<usize> {
        let mut widths: Vec<_> = self.header.iter().map(|name| name.width()).collect();
        for row in &self.rows {
            for (width, text) in widths.iter_mut().zip(row) {
                *width = (*width).max(text.width());
            }
        }
        widths
    }

    fn render(&self, out: &mut impl Write) -> std::io::Result<()> {
        if self.header.is_empty() {
            return Ok(());
        }
        let widths = self.widths();
        let rule: Vec<_> = widths.iter().map(|width| "-".repeat(*width)).collect();
        write_line(out, &self.header, &widths)?;
        write_line(out, &rule, &widths)?;
        for row in &self.rows {
            write_line(out, row, &widths)?;
        }
        Ok(())
    }
}

/// Writes `cells` padded to `widths`, two spaces apart, without trailing
/// padding.
fn write_line(out: &mut impl Write, cells: &[String], widths: &[usize]) -> std::io::Result<()> {
    let mut line = String::new();
    for (i, (cell, width)) in cells.iter().zip(widths).enumerate() {
        if i > 0 {
            line.push_str("  ");
        }
        line.push_str(cell);
        if i + 1 < cells.len() {
            line.push_str(&" ".repeat(width.saturating_sub(cell.width())));
        }
    }
    writeln!(out, "{line}")
}

struct SqlHelper;

impl Helper for SqlHelper {}

impl Completer for SqlHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        let (start, prefix) = extract_word(line, pos, None, |ch| !is_valid_identifier_char(ch));
        let prefix = prefix.to_ascii_uppercase();
        let candidates = KEYWORDS
            .iter()
            .map(|keyword| keyword.to_ascii_uppercase())
            .filter(|keyword| keyword.starts_with(&prefix))
            .collect();
        Ok((start, candidates))
    }
}

/// ANSI color of a segment, if it is highlighted.
fn color(kind: SegmentKind) -> Option<&'static str> {
    match kind {
        SegmentKind::Keyword => Some("\x1b[32m"),
        SegmentKind::Literal => Some("\x1b[33m"),
        SegmentKind::Parameter => Some("\x1b[36m"),
        SegmentKind::Comment => Some("\x1b[90m"),
        SegmentKind::Identifier | SegmentKind::Operator | SegmentKind::Whitespace => None,
    }
}

impl Highlighter for SqlHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        let mut highlighted = String::with_capacity(line.len());
        for segment in Segmenter::new(line) {
            match segment {
                Ok(segment) => match color(segment.kind()) {
                    Some(color) => {
                        highlighted.push_str(color);
                        highlighted.push_str(segment.slice());
                        highlighted.push_str("\x1b[0m");
                    }
                    None => highlighted.push_str(segment.slice()),
                },
                Err((_, rest)) => {
                    highlighted.push_str(rest);
                    break;
                }
            }
        }
        Cow::Owned(highlighted)
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

impl Hinter for SqlHelper {
    type Hint = String;
}

impl Validator for SqlHelper {}
