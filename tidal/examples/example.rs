use tidal::{Environment, Options, Registry, SharedCell, Type};

fn main() -> tidal::Result<()> {
    let env = Environment::new(&Registry::default(), "memory:default")?;
    let mut conn = env.new_connection();
    let mut options = Options::new();
    options.insert("database".to_owned(), ":memory:".into());
    conn.connect(&options)?;

    conn.execute("CREATE TABLE users (id INT NOT NULL, name VARCHAR(20), balance NUMERIC(10, 2))")?;

    let txn = conn.begin()?;
    let mut insert = conn.new_statement()?;
    insert.prepare("INSERT INTO users VALUES (?, ?, ?)")?;
    let id = SharedCell::new(Type::Int32);
    insert.bind_cell(1, &id)?;
    for (n, (name, balance)) in (1..).zip([("Alice", "42.50"), ("Bob", "7"), ("Charlie", "-3.25")]) {
        id.set(n)?;
        insert.bind(2, name)?;
        // Converted to NUMERIC(10, 2) by the engine.
        insert.bind(3, balance)?;
        insert.execute()?;
    }
    drop(insert);
    txn.commit()?;

    let mut query = conn.new_statement()?;
    query.execute_direct("SELECT name, balance FROM users")?;
    let mut rows = query.resultset()?;
    while rows.next()? {
        let name = rows.column("name")?.as_string()?;
        let balance = rows.column(1)?.as_numeric()?;
        println!("name: {name}, balance: {balance}");
    }
    Ok(())
}
