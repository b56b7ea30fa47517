use futures::StreamExt;
use netro::{Connection, Result, Value};

pub async fn main() -> Result<()> {
    let mut conn = Connection::connect_env().await?;

    // Execute

    conn.create_command("CREATE TEMP TABLE netro(id int, name varchar(32), amount numeric(38,10))")
        .execute()
        .await?;

    let rows = conn
        .create_command("INSERT INTO netro VALUES (?, ?, ?)")
        .bind(1)
        .bind("Deez")
        .bind(Value::Decimal("0".into()))
        .execute_non_query()
        .await?;

    assert_eq!(rows, 1);

    conn.create_command("INSERT INTO netro VALUES (2, 'Foo', 42.5)").execute().await?;

    // Scalar

    let count = conn.create_command("SELECT COUNT(*) FROM netro").execute_scalar().await?;
    assert_eq!(count.as_i64(), Some(2));

    // Reader

    let mut cmd = conn.create_command("SELECT * FROM netro ORDER BY id");
    let mut reader = cmd.execute_reader().await?;

    for column in reader.get_schema_table() {
        println!("{column:?}");
    }

    while reader.read().await? {
        let id = reader.get_value(0)?;
        let amount = reader.get_value(2)?;
        println!("{id}: {amount}");
    }

    reader.close().await?;

    // Multiple results

    let mut cmd = conn.create_command("SELECT 1; DELETE FROM netro WHERE 1=2; SELECT name FROM netro");
    let mut reader = cmd.execute_reader().await?;
    let mut results = 1;

    loop {
        {
            let mut rows = reader.rows();
            while let Some(row) = rows.next().await {
                println!("{:?}", row?);
            }
        }
        if !reader.next_result().await? {
            break;
        }
        results += 1;
    }

    assert_eq!(results, 3);

    // Error leaves the connection usable

    let err = conn.create_command("SELECT 1/0").execute().await.unwrap_err();
    assert!(err.is_database());
    println!("{err}");

    let one = conn.create_command("SELECT 1").execute_scalar().await?;
    assert_eq!(one.as_i64(), Some(1));

    println!("{}", one.to_json());

    conn.close().await?;

    Ok(())
}
