mod mock_server_support;

use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use mock_server_support::*;
use netro::{Connection, ConnectionState, Value};

/// Session with a temp table, long statements wait for cancellation.
fn session_handler(sql: &str) -> Vec<Action> {
    match sql {
        "CREATE TEMP TABLE t (id INT)" => vec![Action::Send(complete("CREATE TABLE"))],
        "SELECT id FROM t" => vec![
            Action::Send(row_description(&[("ID", 23, -1)])),
            Action::Send(data_row(&[Some("1")])),
            Action::Send(complete("SELECT 1")),
        ],
        "SELECT long_running()" => vec![
            Action::Send(row_description(&[("LONG_RUNNING", 23, -1)])),
            Action::AwaitCancel,
        ],
        "SELECT 1" => select_int("1"),
        "SELECT 1/0" => vec![
            Action::Send(row_description(&[("?column?", 23, -1)])),
            Action::Send(error("Divide by 0")),
        ],
        "SELECT stalled()" => vec![Action::Sleep(Duration::from_secs(3))],
        "SELECT truncated()" => vec![Action::Send(frame(b'T', &[0, 1, b'I', b'D', 0]))],
        "DROP TABLE t" => vec![
            Action::Send(notice("first notice")),
            Action::Send(notice("second notice")),
            Action::Send(complete("DROP TABLE")),
        ],
        _ => vec![Action::Send(error(&format!("syntax error near \"{sql}\"")))],
    }
}

#[tokio::test]
async fn handshake_and_authentication() {
    let server = MockServer::start(session_handler).await;
    let mut conn = Connection::connect_with(server.config()).await.unwrap();

    assert_eq!(conn.state(), ConnectionState::Idle);
    assert_eq!(conn.handshake_version(), 6);
    assert_eq!(conn.server_version(), Some("Release 11.2.1"));
    let key = conn.backend_key().unwrap();
    assert_eq!((key.process_id, key.secret_key), (PROCESS_ID, SECRET_KEY));

    let value = conn.create_command("SELECT 1").execute_scalar().await.unwrap();
    assert_eq!(value, Value::Int(1));

    conn.close().await.unwrap();
    conn.close().await.unwrap();
    assert_eq!(conn.state(), ConnectionState::Closed);
    assert!(conn.create_command("SELECT 1").execute().await.unwrap_err().is_closed());
}

#[tokio::test]
async fn handshake_version_counter_offer() {
    let server = MockServer::with_version(3, session_handler).await;
    let conn = Connection::connect_with(server.config()).await.unwrap();
    assert_eq!(conn.handshake_version(), 3);
}

#[tokio::test]
async fn bad_password_surfaces_server_text() {
    let server = MockServer::start(session_handler).await;
    let config = netro::Config::new("127.0.0.1", "system", USER, "wrong").port(server.config().get_port());

    let err = Connection::connect_with(config).await.unwrap_err();
    assert!(err.is_auth());
    assert!(err.to_string().contains(AUTH_FAILED), "{err}");
    assert_eq!(server.sessions(), 0);
}

#[tokio::test]
async fn repeated_cancel_keeps_session() {
    let server = MockServer::start(session_handler).await;
    let mut conn = Connection::connect_with(server.config()).await.unwrap();

    conn.create_command("CREATE TEMP TABLE t (id INT)").execute().await.unwrap();

    for _ in 0..3 {
        let canceller = conn.canceller().unwrap();
        let cancel = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel().await
        });

        let start = Instant::now();
        let err = conn.create_command("SELECT long_running()").execute().await.unwrap_err();
        assert!(err.is_cancelled(), "{err}");
        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(conn.state(), ConnectionState::Idle);

        cancel.await.unwrap().unwrap();
    }

    let mut cmd = conn.create_command("SELECT id FROM t");
    let mut reader = cmd.execute_reader().await.unwrap();
    assert!(reader.read().await.unwrap());
    assert_eq!(reader.get_value(0).unwrap(), Value::Int(1));
    reader.close().await.unwrap();

    assert_eq!(server.cancels(), 3);
    assert_eq!(server.sessions(), 1);
}

#[tokio::test]
async fn timeout_then_connection_recovers() {
    let server = MockServer::start(session_handler).await;
    let config = server.config().command_timeout(Duration::from_millis(400));
    let mut conn = Connection::connect_with(config).await.unwrap();

    let start = Instant::now();
    let err = conn.create_command("SELECT long_running()").execute_reader().await.map(|_| ()).unwrap_err();
    let elapsed = start.elapsed();

    assert!(err.is_timeout());
    assert!(err.to_string().to_lowercase().contains("command execution timeout"), "{err}");
    assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "{elapsed:?}");
    assert_eq!(conn.state(), ConnectionState::Cancelling);

    let value = conn.create_command("SELECT 1").execute_scalar().await.unwrap();
    assert_eq!(value, Value::Int(1));
    assert_eq!(conn.state(), ConnectionState::Idle);
    assert_eq!(server.cancels(), 1);
    assert_eq!(server.sessions(), 1);
}

#[tokio::test]
async fn per_command_timeout_override() {
    let server = MockServer::start(session_handler).await;
    let mut conn = Connection::connect_with(server.config()).await.unwrap();

    let err = conn
        .create_command("SELECT long_running()")
        .timeout(Duration::from_millis(200))
        .execute()
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    conn.ready().await.unwrap();
    assert_eq!(conn.state(), ConnectionState::Idle);
}

#[tokio::test]
async fn notices_arrive_in_order() {
    let server = MockServer::start(session_handler).await;
    let mut conn = Connection::connect_with(server.config()).await.unwrap();

    let seen = Arc::new(Mutex::new(vec![]));
    let sink = seen.clone();
    conn.on_notice(move |notice| sink.lock().unwrap().push((notice.severity.clone(), notice.message.clone())));

    conn.create_command("DROP TABLE t").execute().await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        [
            ("NOTICE".to_owned(), "first notice".to_owned()),
            ("NOTICE".to_owned(), "second notice".to_owned()),
        ]
    );
}

#[tokio::test]
async fn notices_queue_without_listener() {
    let server = MockServer::start(session_handler).await;
    let mut conn = Connection::connect_with(server.config()).await.unwrap();

    conn.create_command("DROP TABLE t").execute().await.unwrap();

    let notices: Vec<_> = conn.take_notices().into_iter().map(|n| n.message).collect();
    assert_eq!(notices, ["first notice", "second notice"]);
}

#[tokio::test]
async fn invalid_sql_is_rejected() {
    let server = MockServer::start(session_handler).await;
    let mut conn = Connection::connect_with(server.config()).await.unwrap();

    let err = conn.create_command("SELEC 1").execute_non_query().await.unwrap_err();
    assert!(err.is_database());
    assert_eq!(err.database_error().unwrap().message, "syntax error near \"SELEC 1\"");

    let err = conn.create_command("SELEC 1").execute_reader().await.map(|_| ()).unwrap_err();
    assert!(err.is_database());

    assert_eq!(conn.state(), ConnectionState::Idle);
    let value = conn.create_command("SELECT 1").execute_scalar().await.unwrap();
    assert_eq!(value, Value::Int(1));
}

#[tokio::test]
async fn runtime_error_after_description_is_rejected() {
    let server = MockServer::start(session_handler).await;
    let mut conn = Connection::connect_with(server.config()).await.unwrap();

    let err = conn.create_command("SELECT 1/0").execute_reader().await.map(|_| ()).unwrap_err();
    assert!(err.is_database());
    assert_eq!(err.database_error().unwrap().message, "Divide by 0");
    assert_eq!(conn.state(), ConnectionState::Idle);

    let value = conn.create_command("SELECT 1").execute_scalar().await.unwrap();
    assert_eq!(value, Value::Int(1));
}

#[tokio::test]
async fn drain_timeout_faults_connection() {
    let server = MockServer::start(session_handler).await;
    let config = server.config().command_timeout(Duration::from_millis(200));
    let mut conn = Connection::connect_with(config).await.unwrap();

    let err = conn.create_command("SELECT stalled()").execute().await.unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(conn.state(), ConnectionState::Cancelling);

    let err = conn.ready().await.unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(conn.state(), ConnectionState::Faulted);

    let start = Instant::now();
    let err = conn.create_command("SELECT 1").execute().await.unwrap_err();
    assert!(err.is_closed(), "{err}");
    assert!(start.elapsed() < Duration::from_millis(100));
}

#[tokio::test]
async fn malformed_message_is_fatal() {
    let server = MockServer::start(session_handler).await;
    let mut conn = Connection::connect_with(server.config()).await.unwrap();

    let err = conn.create_command("SELECT truncated()").execute_reader().await.map(|_| ()).unwrap_err();
    assert!(matches!(err.kind(), netro::ErrorKind::Protocol(_)), "{err}");
    assert_eq!(conn.state(), ConnectionState::Faulted);

    let err = conn.create_command("SELECT 1").execute_scalar().await.unwrap_err();
    assert!(err.is_closed(), "{err}");
}

#[tokio::test]
async fn empty_command_fails_before_io() {
    let server = MockServer::start(session_handler).await;
    let mut conn = Connection::connect_with(server.config()).await.unwrap();

    let err = conn.create_command("  ").execute().await.unwrap_err();
    assert!(matches!(err.kind(), netro::ErrorKind::EmptyQuery(_)));

    let err = conn.create_command("SELECT ?").execute().await.unwrap_err();
    assert!(matches!(err.kind(), netro::ErrorKind::Config(_)));

    assert!(server.queries().is_empty());
}

#[tokio::test]
async fn dropped_reader_is_drained() {
    let server = MockServer::start(session_handler).await;
    let mut conn = Connection::connect_with(server.config()).await.unwrap();

    {
        let mut cmd = conn.create_command("SELECT id FROM t");
        let reader = cmd.execute_reader().await.unwrap();
        assert!(reader.has_rows());
    }
    assert_eq!(conn.state(), ConnectionState::Executing);

    let value = conn.create_command("SELECT 1").execute_scalar().await.unwrap();
    assert_eq!(value, Value::Int(1));
}
