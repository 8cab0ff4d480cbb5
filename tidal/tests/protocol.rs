use rstest::{fixture, rstest};
use std::io::Read;
use tidal::{
    AdapterState, Connection, DiagState, Environment, Error, ErrorKind, LogicError, Numeric,
    ObjectKind, Options, Registry, SharedCell, StatementState, Type, Variant,
};

fn options(database: &str) -> Options {
    let mut options = Options::new();
    options.insert("database".to_owned(), database.into());
    options
}

#[fixture]
fn conn() -> Connection {
    let env = Environment::new(&Registry::default(), "memory:default").unwrap();
    let mut conn = env.new_connection();
    conn.connect(&options(":memory:")).unwrap();
    conn
}

#[rstest]
fn insert_and_select_bound_values(conn: Connection) {
    conn.execute("CREATE TABLE t (id INT NOT NULL)").unwrap();

    let mut insert = conn.new_statement().unwrap();
    insert.prepare("INSERT INTO t VALUES (?)").unwrap();
    assert_eq!(insert.param_count(), 1);
    for id in [104, 105, 106] {
        insert.param_mut(1).unwrap().set(id).unwrap();
        insert.execute().unwrap();
        assert_eq!(insert.affected_rows(), 1);
    }

    let mut select = conn.new_statement().unwrap();
    select.execute_direct("SELECT id FROM t").unwrap();
    let mut rows = select.resultset().unwrap();
    let mut ids = Vec::new();
    while rows.next().unwrap() {
        ids.push(rows.column(0).unwrap().as_int().unwrap());
    }
    assert_eq!(ids, [104, 105, 106]);
    assert!(rows.is_eof());
}

#[rstest]
fn numeric_keeps_declared_scale(conn: Connection) {
    conn.execute("CREATE TABLE prices (price NUMERIC(10, 2))")
        .unwrap();
    let mut statement = conn.new_statement().unwrap();
    statement
        .prepare("INSERT INTO prices (price) VALUES (?)")
        .unwrap();
    statement.bind(1, Numeric::new(12345, 2).unwrap()).unwrap();
    statement.execute().unwrap();

    statement.execute_direct("SELECT price FROM prices").unwrap();
    let mut rows = statement.resultset().unwrap();
    let column = rows.describe_column("price").unwrap();
    assert_eq!(column.datatype, Type::Numeric);
    assert_eq!(column.scale, Some(2));
    assert!(rows.next().unwrap());
    let price = rows.column("price").unwrap();
    assert_eq!(price.as_string().unwrap(), "123.45");
    assert_eq!(price.as_numeric().unwrap(), Numeric::new(12345, 2).unwrap());
}

#[rstest]
fn null_column_can_be_overwritten(conn: Connection) {
    conn.execute("CREATE TABLE n (v INT)").unwrap();
    conn.execute("INSERT INTO n VALUES (NULL)").unwrap();

    let mut statement = conn.new_statement().unwrap();
    statement.execute_direct("SELECT v FROM n").unwrap();
    let mut rows = statement.resultset().unwrap();
    assert!(rows.next().unwrap());
    let v = rows.column_mut(0).unwrap();
    let err = v.as_int().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NullValue);
    assert!(v.is_null());
    v.set_null(false).unwrap();
    v.set(5).unwrap();
    assert_eq!(v.as_int().unwrap(), 5);
}

#[rstest]
fn adapters_follow_the_cursor(conn: Connection) {
    conn.execute("CREATE TABLE t (id INT, name TEXT)").unwrap();
    conn.execute("INSERT INTO t VALUES (1, 'one'), (2, 'two')")
        .unwrap();

    let mut statement = conn.new_statement().unwrap();
    statement.execute_direct("SELECT * FROM t").unwrap();
    let mut rows = statement.resultset().unwrap();
    assert_eq!(rows.column_state(0).unwrap(), AdapterState::Unbound);
    assert!(matches!(
        rows.column(0),
        Err(Error::Logic(LogicError::NoCurrentRow(0)))
    ));

    assert!(rows.next().unwrap());
    assert_eq!(rows.row_number(), 1);
    assert_eq!(rows.column_state("name").unwrap(), AdapterState::Bound);
    let first = rows.row().unwrap();
    let kept = rows.column("NAME").unwrap().deepcopy();

    assert!(rows.next().unwrap());
    assert_eq!(rows.column(0).unwrap().as_int().unwrap(), 2);
    assert_eq!(rows.column(1).unwrap().as_string().unwrap(), "two");
    assert_eq!(first[0].as_int().unwrap(), 1);
    assert_eq!(first[1].name(), Some("name"));
    assert_eq!(kept.as_string().unwrap(), "one");

    assert!(!rows.next().unwrap());
    assert_eq!(rows.column_state(0).unwrap(), AdapterState::Stale);
    assert!(rows.column(0).is_err());
    assert!(!rows.next().unwrap());
}

#[rstest]
fn columns_are_found_by_position_and_name(conn: Connection) {
    conn.execute("CREATE TABLE t (a INT, b BOOLEAN NOT NULL)")
        .unwrap();
    let mut statement = conn.new_statement().unwrap();
    statement.execute_direct("SELECT * FROM t").unwrap();
    let rows = statement.resultset().unwrap();
    assert_eq!(rows.column_count(), 2);
    let b = rows.describe_column(1).unwrap();
    assert_eq!(b.name, "b");
    assert_eq!(b.datatype, Type::Boolean);
    assert!(!b.nullable);
    assert!(matches!(
        rows.describe_column("c"),
        Err(Error::NotFound(ObjectKind::Column, _))
    ));
    assert!(matches!(
        rows.describe_column(2),
        Err(Error::NotFound(ObjectKind::Column, _))
    ));
}

#[rstest]
fn reexecution_reuses_adapters(conn: Connection) {
    conn.execute("CREATE TABLE t (id INT)").unwrap();
    conn.execute("INSERT INTO t VALUES (1), (2), (3)").unwrap();

    let mut statement = conn.new_statement().unwrap();
    statement.prepare("SELECT id FROM t WHERE id = ?").unwrap();
    for id in [3, 1] {
        statement.bind(1, id).unwrap();
        statement.execute().unwrap();
        let mut rows = statement.resultset().unwrap();
        assert!(rows.next().unwrap());
        assert_eq!(rows.column(0).unwrap().as_int().unwrap(), id);
        assert!(!rows.next().unwrap());
    }
}

#[rstest]
fn bound_cell_is_read_at_execution(conn: Connection) {
    conn.execute("CREATE TABLE t (v BIGINT)").unwrap();
    let cell = SharedCell::new(Type::Int64);
    let mut statement = conn.new_statement().unwrap();
    statement.prepare("INSERT INTO t VALUES (?)").unwrap();
    statement.bind_cell(1, &cell).unwrap();
    for v in [10i64, 20] {
        cell.set(v).unwrap();
        statement.execute().unwrap();
    }
    cell.set_to_null();
    statement.execute().unwrap();

    statement
        .execute_direct("SELECT v FROM t WHERE v IS NOT NULL")
        .unwrap();
    let mut rows = statement.resultset().unwrap();
    let mut values = Vec::new();
    while rows.next().unwrap() {
        values.push(rows.column(0).unwrap().as_bigint().unwrap());
    }
    assert_eq!(values, [10, 20]);
}

#[rstest]
fn parameters_must_be_bound(conn: Connection) {
    conn.execute("CREATE TABLE t (a INT, b INT)").unwrap();
    let mut statement = conn.new_statement().unwrap();
    statement.prepare("INSERT INTO t VALUES (?, ?)").unwrap();
    statement.bind(1, 1).unwrap();
    assert!(matches!(
        statement.execute(),
        Err(Error::Logic(LogicError::UnboundParameter(2)))
    ));
    assert!(matches!(
        statement.param(2),
        Err(Error::Logic(LogicError::UnboundParameter(2)))
    ));
    assert!(matches!(
        statement.bind(0, 1),
        Err(Error::NotFound(ObjectKind::Parameter, _))
    ));
    assert!(matches!(
        statement.bind(3, 1),
        Err(Error::NotFound(ObjectKind::Parameter, _))
    ));
    statement.bind(2, Variant::null_of(Type::Int32)).unwrap();
    statement.execute().unwrap();
    assert_eq!(statement.affected_rows(), 1);
}

#[rstest]
fn statement_state_machine(conn: Connection) {
    let mut statement = conn.new_statement().unwrap();
    assert_eq!(statement.state(), StatementState::Unprepared);
    assert!(matches!(
        statement.execute(),
        Err(Error::Logic(LogicError::InvalidState { .. }))
    ));
    assert!(statement.resultset().is_err());

    statement.prepare("CREATE TABLE t (a INT)").unwrap();
    assert_eq!(statement.state(), StatementState::Prepared);
    assert!(statement.prepare("CREATE TABLE u (a INT)").is_err());
    assert!(statement.resultset().is_err());

    statement.execute().unwrap();
    assert_eq!(statement.state(), StatementState::Executed);
    assert_eq!(statement.resultset().unwrap().column_count(), 0);

    statement.close();
    statement.close();
    assert_eq!(statement.state(), StatementState::Unprepared);
    assert_eq!(statement.sql(), None);
    statement.prepare("SELECT a FROM t").unwrap();
    assert_eq!(statement.sql(), Some("SELECT a FROM t"));
}

#[rstest]
fn engine_errors_carry_sqlstate_and_sql(conn: Connection) {
    let mut statement = conn.new_statement().unwrap();
    let err = statement.execute_direct("SELECT * FROM missing").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Engine);
    assert_eq!(err.sqlstate(), Some("42S02"));
    assert!(err.to_string().contains("SELECT * FROM missing"));

    assert!(statement.diag_avail());
    let diagnostic = statement.fetch_diag().unwrap();
    assert_eq!(diagnostic.state(), DiagState::Error);
    assert_eq!(diagnostic.sqlstate(), "42S02");
    assert!(!statement.diag_avail());
}

#[rstest]
fn conversion_failures_map_to_sqlstates(conn: Connection) {
    conn.execute("CREATE TABLE t (small TINYINT, code CHAR(2), n INT NOT NULL)")
        .unwrap();
    let cases = [
        ("INSERT INTO t VALUES (1000, 'a', 1)", "22003"),
        ("INSERT INTO t VALUES (1, 'abc', 1)", "22001"),
        ("INSERT INTO t VALUES (1, 'a', NULL)", "23502"),
        ("INSERT INTO t VALUES ('x', 'a', 1)", "22018"),
        ("INSERT INTO t (small) VALUES (1, 2)", "21S01"),
        ("INSERT INTO t (nothing) VALUES (1)", "42S22"),
    ];
    for (sql, sqlstate) in cases {
        let err = conn.execute(sql).unwrap_err();
        assert_eq!(err.sqlstate(), Some(sqlstate), "{sql}");
    }
}

#[rstest]
fn only_single_statements_are_accepted(conn: Connection) {
    let mut statement = conn.new_statement().unwrap();
    assert!(matches!(
        statement.prepare("CREATE TABLE a (x INT); CREATE TABLE b (x INT)"),
        Err(Error::Logic(LogicError::MultipleStatements))
    ));
    let err = statement.prepare("").unwrap_err();
    assert_eq!(err.sqlstate(), Some("42000"));
}

#[rstest]
fn update_and_delete_report_affected_rows(conn: Connection) {
    conn.execute("CREATE TABLE t (id INT, tag TEXT)").unwrap();
    conn.execute("INSERT INTO t VALUES (1, 'a'), (2, 'b'), (3, 'a')")
        .unwrap();
    assert_eq!(conn.execute("UPDATE t SET tag = 'c' WHERE tag = 'a'").unwrap(), 2);
    assert_eq!(conn.execute("DELETE FROM t WHERE tag = 'c'").unwrap(), 2);
    assert_eq!(conn.execute("DELETE FROM t").unwrap(), 1);
}

#[rstest]
fn large_objects(conn: Connection) {
    conn.execute("CREATE TABLE docs (body MEMO, data BLOB)").unwrap();
    let mut statement = conn.new_statement().unwrap();
    statement
        .prepare("INSERT INTO docs VALUES (?, ?)")
        .unwrap();
    statement.bind(1, Variant::memo("x".repeat(10_000))).unwrap();
    statement.bind(2, vec![0xde_u8, 0xad, 0xbe, 0xef]).unwrap();
    statement.execute().unwrap();
    statement.bind(1, Variant::null_of(Type::Memo)).unwrap();
    statement.execute().unwrap();

    statement.execute_direct("SELECT * FROM docs").unwrap();
    let mut rows = statement.resultset().unwrap();
    assert_eq!(rows.describe_column(0).unwrap().datatype, Type::Memo);

    assert!(rows.next().unwrap());
    let mut body = rows.column(0).unwrap().as_memo().unwrap();
    assert_eq!(body.len(), 10_000);
    assert_eq!(body.next_chunk(4), Some("xxxx"));
    let mut data = Vec::new();
    rows.column("data")
        .unwrap()
        .as_blob()
        .unwrap()
        .read_to_end(&mut data)
        .unwrap();
    assert_eq!(data, [0xde, 0xad, 0xbe, 0xef]);

    let err = rows.column_mut(1).unwrap().set(vec![1u8]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReadOnly);

    assert!(rows.next().unwrap());
    assert!(rows.column(0).unwrap().is_null());
    assert!(rows.column(0).unwrap().as_memo().is_err());
    assert_eq!(rows.column(1).unwrap().as_bytes().unwrap(), [0xde, 0xad, 0xbe, 0xef]);
}

#[rstest]
#[case::deleted("DELETE FROM d")]
#[case::updated("UPDATE d SET id = 2, data = 'zzz'")]
fn large_object_belongs_to_the_fetched_row(conn: Connection, #[case] change: &str) {
    conn.execute("CREATE TABLE d (id INT, data BLOB)").unwrap();
    conn.execute("INSERT INTO d VALUES (1, 'abc')").unwrap();

    let mut statement = conn.new_statement().unwrap();
    statement.execute_direct("SELECT id, data FROM d").unwrap();
    let mut rows = statement.resultset().unwrap();
    assert!(rows.next().unwrap());
    conn.execute(change).unwrap();

    assert_eq!(rows.column("id").unwrap().as_int().unwrap(), 1);
    assert!(!rows.column("data").unwrap().is_null());
    assert_eq!(rows.column("data").unwrap().as_bytes().unwrap(), b"abc");
    assert!(!rows.next().unwrap());
}

#[rstest]
fn cancel_discards_pending_rows(conn: Connection) {
    conn.execute("CREATE TABLE t (id INT)").unwrap();
    conn.execute("INSERT INTO t VALUES (1), (2)").unwrap();
    let mut statement = conn.new_statement().unwrap();
    statement.execute_direct("SELECT id FROM t").unwrap();
    statement.cancel().unwrap();
    let mut rows = statement.resultset().unwrap();
    assert!(!rows.next().unwrap());
}

#[test]
fn connect_options() {
    let env = Environment::new(&Registry::default(), "memory:default").unwrap();
    assert_eq!(env.engine_name(), "memory");

    let mut conn = env.new_connection();
    assert!(!conn.is_connected());
    assert!(matches!(
        conn.new_statement(),
        Err(Error::Logic(LogicError::NotConnected))
    ));

    let err = conn.connect(&Options::new()).unwrap_err();
    assert_eq!(err.sqlstate(), Some("08001"));
    assert_eq!(conn.fetch_diag().unwrap().sqlstate(), "08001");

    let mut options = options(":memory:");
    options.insert("username".to_owned(), "scott".into());
    options.insert("password".to_owned(), "tiger".into());
    options.insert("compression".to_owned(), "on".into());
    conn.connect(&options).unwrap();
    assert!(conn.is_connected());
    let info = conn.fetch_diag().unwrap();
    assert_eq!(info.state(), DiagState::Info);
    assert_eq!(info.sqlstate(), "01S00");
    assert!(!conn.diag_avail());

    assert!(matches!(
        conn.connect(&options),
        Err(Error::Logic(LogicError::AlreadyConnected))
    ));
    conn.disconnect().unwrap();
    assert!(!conn.is_connected());
    conn.disconnect().unwrap();
}

#[test]
fn memory_databases_are_private_to_their_connection() {
    let env = Environment::new(&Registry::default(), "memory:default").unwrap();
    let mut a = env.new_connection();
    a.connect(&options(":memory:")).unwrap();
    let mut b = env.new_connection();
    b.connect(&options(":memory:")).unwrap();

    a.execute("CREATE TABLE t (id INT)").unwrap();
    let err = b.execute("DELETE FROM t").unwrap_err();
    assert_eq!(err.sqlstate(), Some("42S02"));
}
