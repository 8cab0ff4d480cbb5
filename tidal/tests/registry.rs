use rstest::rstest;
use tidal::{
    driver::{ConnectionBackend, Engine, Execution, Options, StatementBackend, TransactionId},
    BackendCell, ColumnDescriptor, DiagState, Diagnostic, DriverSpec, Environment, Error,
    ErrorKind, LogicError, Registry, RegistryError, Result, SharedCell, Type, Value,
};

#[rstest]
#[case("memory:default", "memory", "default", None)]
#[case("Memory:Default", "memory", "default", None)]
#[case("ext:odbc:/usr/lib/libodbc.so", "ext", "odbc", Some("/usr/lib/libodbc.so"))]
#[case("ext:odbc:C:\\odbc.dll", "ext", "odbc", Some("C:\\odbc.dll"))]
fn parse_driver_spec(
    #[case] input: &str,
    #[case] engine: &str,
    #[case] driver: &str,
    #[case] libpath: Option<&str>,
) {
    let spec: DriverSpec = input.parse().unwrap();
    assert_eq!(spec.engine(), engine);
    assert_eq!(spec.driver(), driver);
    assert_eq!(spec.libpath(), libpath);
    assert_eq!(DriverSpec::parse(&spec.to_string()).unwrap(), spec);
}

#[rstest]
#[case("")]
#[case("memory")]
#[case("memory:")]
#[case(":default")]
fn reject_invalid_driver_spec(#[case] input: &str) {
    assert!(matches!(
        DriverSpec::parse(input),
        Err(RegistryError::InvalidSpec(_))
    ));
}

#[test]
fn unknown_engine_and_driver() {
    let registry = Registry::default();
    assert_eq!(registry.engines().collect::<Vec<_>>(), ["memory"]);
    assert!(matches!(
        Environment::new(&registry, "oracle:oci"),
        Err(Error::Registry(RegistryError::UnknownEngine(engine))) if engine == "oracle"
    ));
    assert!(matches!(
        Environment::new(&registry, "memory:odbc"),
        Err(Error::Registry(RegistryError::UnknownDriver { .. }))
    ));
    assert_eq!(
        Environment::new(&registry, "memory").unwrap_err().kind(),
        ErrorKind::Registry
    );
    assert!(Environment::new(&Registry::empty(), "memory:default").is_err());
}

/// Returns a single row echoing its parameters as BIGINT columns.
struct EchoEngine;

struct EchoConnection {
    diagnostics: Vec<Diagnostic>,
}

#[derive(Default)]
struct EchoStatement {
    params: usize,
    cells: Vec<SharedCell>,
    pending: Option<Vec<Value>>,
    diagnostics: Vec<Diagnostic>,
}

impl Engine for EchoEngine {
    fn name(&self) -> &str {
        "echo"
    }

    fn connect(&self, options: &Options) -> Result<Box<dyn ConnectionBackend>> {
        let diagnostics = options
            .keys()
            .map(|key| Diagnostic::info("01S00", format!("Ignored option {key:?}")))
            .collect();
        Ok(Box::new(EchoConnection { diagnostics }))
    }
}

impl ConnectionBackend for EchoConnection {
    fn new_statement(&mut self) -> Result<Box<dyn StatementBackend>> {
        Ok(Box::<EchoStatement>::default())
    }

    fn begin(&mut self) -> Result<TransactionId> {
        Err(LogicError::NotSupported("Transactions").into())
    }

    fn commit(&mut self, _: TransactionId) -> Result<()> {
        Err(LogicError::NotSupported("Transactions").into())
    }

    fn rollback(&mut self, _: TransactionId) -> Result<()> {
        Err(LogicError::NotSupported("Transactions").into())
    }

    fn savepoint(&mut self, _: TransactionId, _: &str) -> Result<()> {
        Err(LogicError::NotSupported("Savepoints").into())
    }

    fn rollback_to(&mut self, _: TransactionId, _: &str) -> Result<()> {
        Err(LogicError::NotSupported("Savepoints").into())
    }

    fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }

    fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}

impl StatementBackend for EchoStatement {
    fn prepare(&mut self, sql: &str) -> Result<usize> {
        if sql.trim().is_empty() {
            return Err(tidal::EngineError::new(Diagnostic::error("42000", "Empty query")).into());
        }
        self.params = sql.matches('?').count();
        Ok(self.params)
    }

    fn execute(&mut self, params: &[Option<Value>]) -> Result<Execution> {
        let mut row = Vec::with_capacity(params.len());
        for param in params {
            row.push(match param {
                Some(value) => tidal::convert(value, Type::Int64)?,
                None => Value::Int64(0),
            });
        }
        if params.iter().any(Option::is_none) {
            self.diagnostics
                .push(Diagnostic::warning("01004", "NULL echoed as zero"));
        }
        self.pending = Some(row);
        Ok(Execution {
            affected_rows: 0,
            columns: (1..=params.len())
                .map(|i| ColumnDescriptor::new(format!("p{i}"), Type::Int64))
                .collect(),
        })
    }

    fn cell(&mut self, column: usize) -> Result<Box<dyn BackendCell>> {
        while self.cells.len() <= column {
            self.cells.push(SharedCell::new(Type::Int64));
        }
        Ok(Box::new(self.cells[column].clone()))
    }

    fn fetch(&mut self) -> Result<bool> {
        let Some(row) = self.pending.take() else {
            return Ok(false);
        };
        for (cell, value) in self.cells.iter().zip(row) {
            cell.set(value)?;
        }
        Ok(true)
    }

    fn close(&mut self) {
        self.pending = None;
        self.cells.clear();
    }

    fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}

fn echo_registry() -> Registry {
    let mut registry = Registry::default();
    registry.register("Echo", |spec| {
        assert_eq!(spec.driver(), "native");
        Ok(Box::new(EchoEngine))
    });
    registry
}

#[test]
fn registered_engine_serves_the_protocol() {
    let registry = echo_registry();
    assert_eq!(registry.engines().collect::<Vec<_>>(), ["echo", "memory"]);
    let env = Environment::new(&registry, "echo:native").unwrap();
    assert_eq!(env.engine_name(), "echo");

    let mut conn = env.new_connection();
    let mut options = Options::new();
    options.insert("database".to_owned(), "anything".into());
    conn.connect(&options).unwrap();
    let diagnostic = conn.fetch_diag().unwrap();
    assert_eq!(diagnostic.state(), DiagState::Info);
    assert_eq!(diagnostic.sqlstate(), "01S00");
    assert!(!conn.diag_avail());

    let mut statement = conn.new_statement().unwrap();
    statement.prepare("ECHO ?, ?").unwrap();
    assert_eq!(statement.param_count(), 2);
    statement.bind(1, "41").unwrap();
    statement.bind(2, 7u8).unwrap();
    statement.execute().unwrap();
    assert!(!statement.diag_avail());
    {
        let mut rows = statement.resultset().unwrap();
        assert_eq!(rows.column_count(), 2);
        assert!(rows.next().unwrap());
        assert_eq!(rows.column("p1").unwrap().as_i64().unwrap(), 41);
        assert_eq!(rows.column(1).unwrap().as_string().unwrap(), "7");
        assert!(!rows.next().unwrap());
    }

    statement.bind(1, None::<i64>).unwrap();
    statement.execute().unwrap();
    let warning = statement.fetch_diag().unwrap();
    assert_eq!(warning.state(), DiagState::Warning);
    assert_eq!(warning.sqlstate(), "01004");

    statement.bind(1, "x").unwrap();
    assert_eq!(statement.execute().unwrap_err().kind(), ErrorKind::Convert);
}

#[test]
fn engine_errors_and_unsupported_operations() {
    let env = Environment::new(&echo_registry(), "echo:native").unwrap();
    let mut conn = env.new_connection();
    conn.connect(&Options::new()).unwrap();

    let mut statement = conn.new_statement().unwrap();
    let err = statement.prepare("   ").unwrap_err();
    assert_eq!(err.sqlstate(), Some("42000"));
    assert!(statement.fetch_diag().is_some());

    assert!(matches!(
        statement.cancel(),
        Err(Error::Logic(LogicError::NotSupported(_)))
    ));
    drop(statement);
    assert!(matches!(
        conn.begin(),
        Err(Error::Logic(LogicError::NotSupported(_)))
    ));
}
