mod mock_server_support;

use std::{future::poll_fn, pin::Pin};

use futures_core::Stream;
use mock_server_support::*;
use netro::{Connection, Value, ValueKind, netezza::NzType};
use time::macros::datetime;

fn batch_handler(sql: &str) -> Vec<Action> {
    match sql {
        "SELECT 1" => select_int("1"),
        "SELECT 2" => select_int("2"),
        "DELETE FROM t WHERE 1=2" => vec![Action::Send(complete("DELETE 0"))],
        "SELECT 1; DELETE FROM t WHERE 1=2; SELECT 2" => {
            let mut actions = select_int("1");
            actions.push(Action::Send(complete("DELETE 0")));
            actions.extend(select_int("2"));
            actions
        },
        "SELECT 1; SELECT 1/0; SELECT 3" => {
            let mut actions = select_int("1");
            actions.push(Action::Send(error("Divide by 0")));
            actions
        },
        "INSERT INTO t VALUES (1), (2); UPDATE t SET id = 3" => vec![
            Action::Send(complete("INSERT 0 2")),
            Action::Send(complete("UPDATE 2")),
        ],
        "SELECT id, name FROM users" => vec![
            Action::Send(row_description(&[("ID", 23, -1), ("NAME", 1043, 36)])),
            Action::Send(data_row(&[Some("1"), Some("ada")])),
            Action::Send(data_row(&[Some("2"), None])),
            Action::Send(data_row(&[Some("3"), Some("grace")])),
            Action::Send(complete("SELECT 3")),
        ],
        "SELECT * FROM dbos" => dbos_rows(),
        "-- nothing" => vec![Action::Send(frame(b'I', &[]))],
        _ => vec![Action::Send(error("unknown statement"))],
    }
}

/// `ID INT4, AMOUNT NUMERIC(5,2), CREATED ABSTIME, NAME VARCHAR(32)` in DBOS format.
fn dbos_rows() -> Vec<Action> {
    let columns = [
        ("ID", 23, -1),
        ("AMOUNT", 1700, ((5 << 16) | 2) + 4),
        ("CREATED", 702, -1),
        ("NAME", 1043, 36),
    ];
    let fields = [
        Field { nz_type: 3, size: 4, true_size: 4, offset: 4, fixed: true },
        Field { nz_type: 7, size: (5 << 8) | 2, true_size: 4, offset: 8, fixed: true },
        Field { nz_type: 3, size: 4, true_size: 4, offset: 12, fixed: true },
        Field { nz_type: 16, size: 32, true_size: 32, offset: 16, fixed: false },
    ];

    // size word, null bitmap, padding, fixed fields, varying fields
    let mut first = vec![22, 0, 0b0000, 0];
    first.extend_from_slice(&7i32.to_le_bytes());
    first.extend_from_slice(&4200i32.to_le_bytes());
    first.extend_from_slice(&86_400i32.to_le_bytes());
    first.extend_from_slice(&6u16.to_le_bytes());
    first.extend_from_slice(b"caf\xe9");

    let mut second = vec![16, 0, 0b1010, 0];
    second.extend_from_slice(&(-8i32).to_le_bytes());
    second.extend_from_slice(&0i32.to_le_bytes());
    second.extend_from_slice(&0i32.to_le_bytes());

    vec![
        Action::Send(row_description(&columns)),
        Action::Send(dbos_descriptor(&fields)),
        Action::Send(dbos_tuple(&first)),
        Action::Send(dbos_tuple(&second)),
        Action::Send(complete("SELECT 2")),
    ]
}

#[tokio::test]
async fn delete_has_no_rows() {
    let server = MockServer::start(batch_handler).await;
    let mut conn = Connection::connect_with(server.config()).await.unwrap();

    let mut cmd = conn.create_command("DELETE FROM t WHERE 1=2");
    let mut reader = cmd.execute_reader().await.unwrap();
    assert!(!reader.has_rows());
    assert_eq!(reader.field_count(), 0);
    assert!(!reader.read().await.unwrap());
    assert!(!reader.next_result().await.unwrap());
}

#[tokio::test]
async fn batch_yields_one_result_per_statement() {
    let server = MockServer::start(batch_handler).await;
    let mut conn = Connection::connect_with(server.config()).await.unwrap();

    let mut cmd = conn.create_command("SELECT 1; DELETE FROM t WHERE 1=2; SELECT 2");
    let mut reader = cmd.execute_reader().await.unwrap();

    let mut results = vec![];
    let mut next_results = 0;
    loop {
        let mut rows = vec![];
        let has_rows = reader.has_rows();
        while reader.read().await.unwrap() {
            rows.push(reader.get_value(0).unwrap());
        }
        results.push((has_rows, rows));

        if !reader.next_result().await.unwrap() {
            break;
        }
        next_results += 1;
    }

    assert_eq!(next_results, 2);
    assert_eq!(
        results,
        [
            (true, vec![Value::Int(1)]),
            (false, vec![]),
            (true, vec![Value::Int(2)]),
        ]
    );
    assert_eq!(reader.tags().len(), 3);
    assert_eq!(reader.tags()[1].as_str(), "DELETE 0");
}

#[tokio::test]
async fn batch_matches_sequential_execution() {
    let server = MockServer::start(batch_handler).await;
    let mut conn = Connection::connect_with(server.config()).await.unwrap();

    let mut sequential = vec![];
    for sql in ["SELECT 1", "SELECT 2"] {
        let mut cmd = conn.create_command(sql);
        let mut reader = cmd.execute_reader().await.unwrap();
        while reader.read().await.unwrap() {
            sequential.push(reader.values().unwrap());
        }
    }

    let mut batched = vec![];
    let mut cmd = conn.create_command("SELECT 1; DELETE FROM t WHERE 1=2; SELECT 2");
    let mut reader = cmd.execute_reader().await.unwrap();
    loop {
        while reader.read().await.unwrap() {
            batched.push(reader.values().unwrap());
        }
        if !reader.next_result().await.unwrap() {
            break;
        }
    }

    assert_eq!(sequential, batched);
}

#[tokio::test]
async fn skipped_rows_on_next_result() {
    let server = MockServer::start(batch_handler).await;
    let mut conn = Connection::connect_with(server.config()).await.unwrap();

    let mut cmd = conn.create_command("SELECT 1; DELETE FROM t WHERE 1=2; SELECT 2");
    let mut reader = cmd.execute_reader().await.unwrap();
    assert!(reader.next_result().await.unwrap());
    assert!(reader.next_result().await.unwrap());
    assert!(reader.read().await.unwrap());
    assert_eq!(reader.get_value(0).unwrap(), Value::Int(2));
    reader.close().await.unwrap();
}

#[tokio::test]
async fn mid_batch_error_keeps_connection_usable() {
    let server = MockServer::start(batch_handler).await;
    let mut conn = Connection::connect_with(server.config()).await.unwrap();

    {
        let mut cmd = conn.create_command("SELECT 1; SELECT 1/0; SELECT 3");
        let mut reader = cmd.execute_reader().await.unwrap();
        assert!(reader.read().await.unwrap());
        assert_eq!(reader.get_value(0).unwrap(), Value::Int(1));

        let err = reader.next_result().await.unwrap_err();
        assert!(err.is_database());
        assert_eq!(err.database_error().unwrap().message, "Divide by 0");
        assert!(!reader.next_result().await.unwrap());
    }

    let value = conn.create_command("SELECT 1").execute_scalar().await.unwrap();
    assert_eq!(value, Value::Int(1));
}

#[tokio::test]
async fn rows_affected() {
    let server = MockServer::start(batch_handler).await;
    let mut conn = Connection::connect_with(server.config()).await.unwrap();

    let mut cmd = conn.create_command("INSERT INTO t VALUES (1), (2); UPDATE t SET id = 3");
    let result = cmd.execute().await.unwrap();
    assert_eq!(result.rows_affected, 4);
    assert_eq!(result.tags.len(), 2);
    assert_eq!(cmd.rows_affected(), 4);

    let affected = conn.create_command("SELECT 1").execute_non_query().await.unwrap();
    assert_eq!(affected, -1);

    let affected = conn.create_command("DELETE FROM t WHERE 1=2").execute_non_query().await.unwrap();
    assert_eq!(affected, 0);
}

#[tokio::test]
async fn empty_query_response() {
    let server = MockServer::start(batch_handler).await;
    let mut conn = Connection::connect_with(server.config()).await.unwrap();

    let mut cmd = conn.create_command("-- nothing");
    let reader = cmd.execute_reader().await.unwrap();
    assert_eq!(reader.field_count(), 0);
    assert!(!reader.has_rows());
    drop(reader);

    let value = cmd.execute_scalar().await.unwrap();
    assert_eq!(value, Value::Null);
}

#[tokio::test]
async fn text_rows_with_nulls() {
    let server = MockServer::start(batch_handler).await;
    let mut conn = Connection::connect_with(server.config()).await.unwrap();

    let mut cmd = conn.create_command("SELECT id, name FROM users");
    let mut reader = cmd.execute_reader().await.unwrap();

    let schema = reader.get_schema_table();
    assert_eq!(schema.len(), 2);
    assert_eq!(schema[0].name, "ID");
    assert_eq!(schema[0].kind, ValueKind::Number);
    assert_eq!(schema[1].kind, ValueKind::String);
    assert_eq!(schema[1].column_size, 32);
    assert!(schema.iter().all(|c| c.nullable));

    assert!(reader.read().await.unwrap());
    assert_eq!(reader.values().unwrap(), [Value::Int(1), Value::Text("ada".into())]);
    assert!(reader.read().await.unwrap());
    assert_eq!(reader.get_value(1).unwrap(), Value::Null);

    let err = reader.get_value(2).unwrap_err();
    assert!(matches!(err.kind(), netro::ErrorKind::Index(_)));

    let mut rows = reader.rows();
    let row = poll_fn(|cx| Pin::new(&mut rows).poll_next(cx)).await;
    assert_eq!(row.unwrap().unwrap(), [Value::Int(3), Value::Text("grace".into())]);
    assert!(poll_fn(|cx| Pin::new(&mut rows).poll_next(cx)).await.is_none());
}

#[tokio::test]
async fn dbos_rows_decode() {
    let server = MockServer::start(batch_handler).await;
    let mut conn = Connection::connect_with(server.config()).await.unwrap();

    let mut cmd = conn.create_command("SELECT * FROM dbos");
    let mut reader = cmd.execute_reader().await.unwrap();
    assert!(reader.has_rows());

    let desc = reader.tuple_descriptor().unwrap();
    assert_eq!(desc.fields[2].nz_type, NzType::AbsTime);

    let schema = reader.get_schema_table();
    assert_eq!((schema[1].precision, schema[1].scale), (Some(5), Some(2)));
    assert_eq!(schema[2].kind, ValueKind::Date);

    assert!(reader.read().await.unwrap());
    assert_eq!(
        reader.values().unwrap(),
        [
            Value::Int(7),
            Value::Number(42.0),
            Value::Timestamp(datetime!(1970-01-02 0:00)),
            Value::Text("café".into()),
        ]
    );

    assert!(reader.read().await.unwrap());
    assert_eq!(
        reader.values().unwrap(),
        [
            Value::Int(-8),
            Value::Null,
            Value::Timestamp(datetime!(1970-01-01 0:00)),
            Value::Null,
        ]
    );

    assert!(!reader.read().await.unwrap());
    assert!(!reader.next_result().await.unwrap());
}
