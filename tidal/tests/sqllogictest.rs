use sqllogictest::{
    harness::{self, Arguments, Trial},
    strict_column_validator, DBOutput, Runner,
};
use std::path::PathBuf;
use tempfile::TempDir;
use tidal::{Environment, Error, Options, Registry, Type};

fn main() {
    let paths = harness::glob("tests/slt/**/*.slt").expect("failed to find test files");
    let tests: Vec<_> = paths
        .map(|entry| {
            let path = entry.expect("failed to read glob entry");
            let name = path.display().to_string();
            Trial::test(name, move || {
                let mut tester = Runner::new(|| async { Database::new() });
                tester.with_column_validator(strict_column_validator);
                tester.run_file(&path)?;
                Ok(())
            })
        })
        .collect();
    assert!(!tests.is_empty(), "no sqllogictest found");
    harness::run(&Arguments::from_args(), tests).exit()
}

/// A file-backed `memory` database. Every statement runs on a fresh
/// connection, so the file database carries the state between them.
struct Database {
    env: Environment,
    path: PathBuf,
    _dir: TempDir,
}

impl Database {
    fn new() -> Result<Self, Error> {
        let dir = tempfile::tempdir().expect("failed to create temporary directory");
        Ok(Self {
            env: Environment::new(&Registry::default(), "memory:default")?,
            path: dir.path().join("test.db"),
            _dir: dir,
        })
    }
}

impl sqllogictest::DB for Database {
    type Error = Error;
    type ColumnType = ColumnType;

    fn run(&mut self, sql: &str) -> Result<DBOutput<Self::ColumnType>, Self::Error> {
        let mut conn = self.env.new_connection();
        let mut options = Options::new();
        options.insert("database".to_owned(), self.path.display().to_string().into());
        conn.connect(&options)?;

        let mut statement = conn.new_statement()?;
        statement.execute_direct(sql)?;
        let mut rows = statement.resultset()?;
        if rows.column_count() == 0 {
            return Ok(DBOutput::StatementComplete(0));
        }
        let types = rows
            .columns()
            .iter()
            .map(|column| ColumnType::from(column.datatype))
            .collect();
        let mut output = Vec::new();
        while rows.next()? {
            output.push(rows.row()?.iter().map(ToString::to_string).collect());
        }
        Ok(DBOutput::Rows {
            types,
            rows: output,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ColumnType {
    Integer,
    Real,
    Boolean,
    Text,
}

impl From<Type> for ColumnType {
    fn from(ty: Type) -> Self {
        match ty {
            ty if ty.is_integer() => Self::Integer,
            Type::Float | Type::Double | Type::Numeric => Self::Real,
            Type::Boolean => Self::Boolean,
            _ => Self::Text,
        }
    }
}

impl sqllogictest::ColumnType for ColumnType {
    fn from_char(value: char) -> Option<Self> {
        Some(match value {
            'I' => Self::Integer,
            'R' => Self::Real,
            'B' => Self::Boolean,
            'T' => Self::Text,
            _ => return None,
        })
    }

    fn to_char(&self) -> char {
        match self {
            Self::Integer => 'I',
            Self::Real => 'R',
            Self::Boolean => 'B',
            Self::Text => 'T',
        }
    }
}
