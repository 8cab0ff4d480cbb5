use rstest::{fixture, rstest};
use std::path::Path;
use tempfile::TempDir;
use tidal::{
    Connection, Environment, Error, ErrorKind, ObjectKind, Options, Registry, TransactionError,
};

fn options(database: &Path) -> Options {
    let mut options = Options::new();
    options.insert(
        "database".to_owned(),
        database.display().to_string().into(),
    );
    options
}

fn connect(env: &Environment, database: &Path) -> Connection {
    let mut conn = env.new_connection();
    conn.connect(&options(database)).unwrap();
    conn
}

fn count(conn: &Connection, table: &str) -> usize {
    let mut statement = conn.new_statement().unwrap();
    statement
        .execute_direct(&format!("SELECT * FROM {table}"))
        .unwrap();
    let mut rows = statement.resultset().unwrap();
    let mut n = 0;
    while rows.next().unwrap() {
        n += 1;
    }
    n
}

#[fixture]
fn env() -> Environment {
    Environment::new(&Registry::default(), "memory:default").unwrap()
}

#[fixture]
fn dir() -> TempDir {
    tempfile::tempdir().unwrap()
}

#[rstest]
fn commit_keeps_and_rollback_discards(env: Environment) {
    let conn = connect(&env, Path::new(":memory:"));
    conn.execute("CREATE TABLE t (id INT)").unwrap();

    let txn = conn.begin().unwrap();
    conn.execute("INSERT INTO t VALUES (1)").unwrap();
    txn.commit().unwrap();
    assert!(!txn.is_active());
    assert!(matches!(
        txn.commit(),
        Err(Error::Transaction(TransactionError::Finished(_)))
    ));

    let txn = conn.begin().unwrap();
    conn.execute("INSERT INTO t VALUES (2)").unwrap();
    conn.execute("DROP TABLE t").unwrap();
    txn.rollback().unwrap();
    assert_eq!(count(&conn, "t"), 1);
}

#[rstest]
fn dropping_an_active_transaction_rolls_back(env: Environment) {
    let conn = connect(&env, Path::new(":memory:"));
    conn.execute("CREATE TABLE t (id INT)").unwrap();
    {
        let _txn = conn.begin().unwrap();
        conn.execute("INSERT INTO t VALUES (1), (2)").unwrap();
        assert_eq!(count(&conn, "t"), 2);
    }
    assert_eq!(count(&conn, "t"), 0);
}

#[rstest]
fn transactions_do_not_nest(env: Environment) {
    let conn = connect(&env, Path::new(":memory:"));
    let txn = conn.begin().unwrap();
    assert!(matches!(
        conn.begin(),
        Err(Error::Transaction(TransactionError::NestedTransaction))
    ));
    txn.commit().unwrap();
    conn.begin().unwrap().commit().unwrap();
}

#[rstest]
fn savepoints(env: Environment) {
    let conn = connect(&env, Path::new(":memory:"));
    conn.execute("CREATE TABLE t (id INT)").unwrap();

    let txn = conn.begin().unwrap();
    conn.execute("INSERT INTO t VALUES (1)").unwrap();
    txn.savepoint("a").unwrap();
    conn.execute("INSERT INTO t VALUES (2)").unwrap();
    txn.savepoint("b").unwrap();
    conn.execute("INSERT INTO t VALUES (3)").unwrap();

    txn.rollback_to("b").unwrap();
    assert_eq!(count(&conn, "t"), 2);
    txn.rollback_to("a").unwrap();
    assert_eq!(count(&conn, "t"), 1);
    assert!(matches!(
        txn.rollback_to("b"),
        Err(Error::NotFound(ObjectKind::Savepoint, _))
    ));

    // The savepoint stays usable.
    conn.execute("INSERT INTO t VALUES (4)").unwrap();
    txn.rollback_to("a").unwrap();
    txn.commit().unwrap();
    assert_eq!(count(&conn, "t"), 1);
}

#[rstest]
fn failed_statement_does_not_abort_transaction(env: Environment) {
    let conn = connect(&env, Path::new(":memory:"));
    conn.execute("CREATE TABLE t (id TINYINT)").unwrap();
    let txn = conn.begin().unwrap();
    conn.execute("INSERT INTO t VALUES (1)").unwrap();
    let err = conn
        .execute("INSERT INTO t VALUES (2), (300)")
        .unwrap_err();
    assert_eq!(err.sqlstate(), Some("22003"));
    txn.commit().unwrap();
    assert_eq!(count(&conn, "t"), 1);
}

#[rstest]
fn file_database_is_shared_and_persisted(env: Environment, dir: TempDir) {
    let path = dir.path().join("shared.db");
    let a = connect(&env, &path);
    let b = connect(&env, &path);
    a.execute("CREATE TABLE t (id INT)").unwrap();
    a.execute("INSERT INTO t VALUES (1)").unwrap();
    assert_eq!(count(&b, "t"), 1);
    drop(a);
    drop(b);
    assert!(path.exists());

    // A new engine instance loads the file.
    let env = Environment::new(&Registry::default(), "memory:default").unwrap();
    let conn = connect(&env, &path);
    assert_eq!(count(&conn, "t"), 1);
}

#[rstest]
fn uncommitted_changes_are_not_persisted(env: Environment, dir: TempDir) {
    let path = dir.path().join("txn.db");
    {
        let conn = connect(&env, &path);
        conn.execute("CREATE TABLE t (id INT)").unwrap();
        let txn = conn.begin().unwrap();
        conn.execute("INSERT INTO t VALUES (1)").unwrap();
        txn.rollback().unwrap();
        let txn = conn.begin().unwrap();
        conn.execute("INSERT INTO t VALUES (2)").unwrap();
        txn.commit().unwrap();
    }
    let env = Environment::new(&Registry::default(), "memory:default").unwrap();
    let conn = connect(&env, &path);
    let mut statement = conn.new_statement().unwrap();
    statement.execute_direct("SELECT id FROM t").unwrap();
    let mut rows = statement.resultset().unwrap();
    assert!(rows.next().unwrap());
    assert_eq!(rows.column(0).unwrap().as_int().unwrap(), 2);
    assert!(!rows.next().unwrap());
}

#[rstest]
fn concurrent_writer_is_busy(env: Environment, dir: TempDir) {
    let path = dir.path().join("busy.db");
    let a = connect(&env, &path);
    let b = connect(&env, &path);
    a.execute("CREATE TABLE t (id INT)").unwrap();

    let txn = a.begin().unwrap();
    a.execute("INSERT INTO t VALUES (1)").unwrap();
    let err = b.execute("INSERT INTO t VALUES (2)").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Busy);
    // Readers are not blocked and see uncommitted rows.
    assert_eq!(count(&b, "t"), 1);

    txn.commit().unwrap();
    b.execute("INSERT INTO t VALUES (2)").unwrap();
    assert_eq!(count(&a, "t"), 2);
}

#[rstest]
fn missing_file_is_not_created_on_request(env: Environment, dir: TempDir) {
    let path = dir.path().join("absent.db");
    let mut options = options(&path);
    options.insert("create".to_owned(), false.into());
    let mut conn = env.new_connection();
    let err = conn.connect(&options).unwrap_err();
    assert_eq!(err.sqlstate(), Some("08001"));
    assert!(!path.exists());
}
