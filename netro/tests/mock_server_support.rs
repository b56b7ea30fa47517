//! Scripted netezza backend for integration tests.
//!
//! The server accepts any number of sessions, performs the handshake with
//! md5 authentication, and answers every query with the messages returned by
//! the handler followed by `ReadyForQuery`.
#![allow(dead_code)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::Notify,
    task::JoinHandle,
};

use netro::{
    Config,
    netezza::handshake::{self, Authentication},
};

pub const PROCESS_ID: u32 = 4242;
pub const SECRET_KEY: u32 = 0xdead_beef;
pub const USER: &str = "admin";
pub const PASSWORD: &str = "secret";
pub const AUTH_FAILED: &str = "password authentication failed for user 'admin'";

const SALT: [u8; 2] = *b"ab";
const CANCEL_CODE: u32 = 80_877_102;

/// Server reaction to a query.
pub enum Action {
    Send(Vec<u8>),
    Sleep(Duration),
    /// Wait for a cancel request, then abort the statement.
    AwaitCancel,
}

type Handler = dyn Fn(&str) -> Vec<Action> + Send + Sync;

struct State {
    handler: Box<Handler>,
    version: u16,
    sessions: AtomicUsize,
    cancels: AtomicUsize,
    cancelled: Notify,
    queries: Mutex<Vec<String>>,
}

/// A test server, aborted when dropped.
pub struct MockServer {
    port: u16,
    handle: JoinHandle<()>,
    state: Arc<State>,
}

impl MockServer {
    pub async fn start(handler: impl Fn(&str) -> Vec<Action> + Send + Sync + 'static) -> Self {
        Self::with_version(6, handler).await
    }

    /// Server that counter-offers handshake `version`.
    pub async fn with_version(
        version: u16,
        handler: impl Fn(&str) -> Vec<Action> + Send + Sync + 'static,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let state = Arc::new(State {
            handler: Box::new(handler),
            version,
            sessions: AtomicUsize::new(0),
            cancels: AtomicUsize::new(0),
            cancelled: Notify::new(),
            queries: Mutex::new(vec![]),
        });

        let shared = state.clone();
        let handle = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let state = shared.clone();
                tokio::spawn(async move {
                    let _ = serve(socket, state).await;
                });
            }
        });

        Self { port, handle, state }
    }

    pub fn config(&self) -> Config {
        Config::new("127.0.0.1", "system", USER, PASSWORD).port(self.port)
    }

    /// Number of authenticated sessions.
    pub fn sessions(&self) -> usize {
        self.state.sessions.load(Ordering::SeqCst)
    }

    /// Number of valid cancel requests received.
    pub fn cancels(&self) -> usize {
        self.state.cancels.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.state.queries.lock().unwrap().clone()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn read_packet(socket: &mut TcpStream, len: u32) -> std::io::Result<Vec<u8>> {
    let mut packet = vec![0; len as usize - 4];
    socket.read_exact(&mut packet).await?;
    Ok(packet)
}

async fn serve(mut socket: TcpStream, state: Arc<State>) -> std::io::Result<()> {
    // the first handshake packet is never 16 bytes long
    let len = socket.read_u32().await?;
    if len == 16 {
        let code = socket.read_u32().await?;
        let pid = socket.read_u32().await?;
        let secret = socket.read_u32().await?;
        if code == CANCEL_CODE && pid == PROCESS_ID && secret == SECRET_KEY {
            state.cancels.fetch_add(1, Ordering::SeqCst);
            state.cancelled.notify_one();
        }
        return Ok(());
    }

    // version negotiation
    let mut packet = read_packet(&mut socket, len).await?;
    loop {
        let offered = i16::from_be_bytes([packet[2], packet[3]]) as u16;
        if offered <= state.version {
            socket.write_all(b"N").await?;
            break;
        }
        socket.write_all(&[b'M', b'0' + state.version as u8]).await?;
        let len = socket.read_u32().await?;
        packet = read_packet(&mut socket, len).await?;
    }

    loop {
        let len = socket.read_u32().await?;
        let packet = read_packet(&mut socket, len).await?;
        let opcode = u16::from_be_bytes([packet[0], packet[1]]);
        if opcode == handshake::opcode::CLIENT_DONE {
            break;
        }
        socket.write_all(b"N").await?;
    }

    // md5 authentication
    let mut auth = vec![b'R'];
    auth.extend_from_slice(&5i32.to_be_bytes());
    auth.extend_from_slice(&SALT);
    socket.write_all(&auth).await?;

    let len = socket.read_u32().await?;
    let password = read_packet(&mut socket, len).await?;
    let expected = handshake::hash_password(&Authentication::Md5Password { salt: SALT }, PASSWORD).unwrap();
    if password.strip_suffix(b"\0") != Some(expected.as_bytes()) {
        let mut reject = vec![b'E'];
        reject.extend_from_slice(AUTH_FAILED.as_bytes());
        reject.push(0);
        socket.write_all(&reject).await?;
        return Ok(());
    }

    state.sessions.fetch_add(1, Ordering::SeqCst);

    let mut out = vec![b'R'];
    out.extend_from_slice(&0i32.to_be_bytes());
    out.extend(parameter("server_version", "Release 11.2.1"));
    let mut key = PROCESS_ID.to_be_bytes().to_vec();
    key.extend_from_slice(&SECRET_KEY.to_be_bytes());
    out.extend(frame(b'K', &key));
    out.extend(ready());
    socket.write_all(&out).await?;

    loop {
        let Ok(msgtype) = socket.read_u8().await else {
            return Ok(());
        };
        let len = socket.read_u32().await?;
        let body = read_packet(&mut socket, len).await?;

        match msgtype {
            b'P' => {
                let sql = String::from_utf8_lossy(body.strip_suffix(b"\0").unwrap_or(&body)).into_owned();
                state.queries.lock().unwrap().push(sql.clone());

                for action in (state.handler)(&sql) {
                    match action {
                        Action::Send(bytes) => socket.write_all(&bytes).await?,
                        Action::Sleep(duration) => tokio::time::sleep(duration).await,
                        Action::AwaitCancel => {
                            let cancelled = state.cancelled.notified();
                            let _ = tokio::time::timeout(Duration::from_secs(10), cancelled).await;
                            socket.write_all(&error("Query was cancelled.")).await?;
                        },
                    }
                }
                socket.write_all(&ready()).await?;
            },
            _ => return Ok(()),
        }
    }
}

// ===== Messages =====

pub fn frame(msgtype: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![msgtype, 0, 0, 0, 0];
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(body);
    out
}

pub fn ready() -> Vec<u8> {
    vec![b'Z', 0, 0, 0, 0]
}

pub fn parameter(name: &str, value: &str) -> Vec<u8> {
    frame(b'S', format!("{name}\0{value}\0").as_bytes())
}

pub fn complete(tag: &str) -> Vec<u8> {
    frame(b'C', format!("{tag}\0").as_bytes())
}

pub fn error(message: &str) -> Vec<u8> {
    frame(b'E', format!("ERROR:  {message}\n\0").as_bytes())
}

pub fn notice(message: &str) -> Vec<u8> {
    frame(b'N', format!("NOTICE:  {message}\n\0").as_bytes())
}

/// `RowDescription` of `(name, oid, modifier)` columns.
pub fn row_description(columns: &[(&str, u32, i32)]) -> Vec<u8> {
    let mut body = (columns.len() as u16).to_be_bytes().to_vec();
    for (name, oid, modifier) in columns {
        body.extend_from_slice(name.as_bytes());
        body.push(0);
        body.extend_from_slice(&oid.to_be_bytes());
        body.extend_from_slice(&(-1i16).to_be_bytes());
        body.extend_from_slice(&modifier.to_be_bytes());
        body.push(0);
    }
    frame(b'T', &body)
}

/// Text `DataRow`.
pub fn data_row(values: &[Option<&str>]) -> Vec<u8> {
    let mut bitmap = vec![0u8; values.len().div_ceil(8)];
    let mut data = vec![];
    for (i, value) in values.iter().enumerate() {
        if let Some(value) = value {
            bitmap[i / 8] |= 0x80 >> (i % 8);
            data.extend_from_slice(&(value.len() as i32 + 4).to_be_bytes());
            data.extend_from_slice(value.as_bytes());
        }
    }
    bitmap.extend(data);
    frame(b'D', &bitmap)
}

/// One field of a DBOS tuple descriptor.
pub struct Field {
    pub nz_type: i32,
    pub size: i32,
    pub true_size: i32,
    pub offset: i32,
    pub fixed: bool,
}

/// DBOS tuple descriptor with two byte size word, nulls allowed, physical
/// order equal to column order.
pub fn dbos_descriptor(fields: &[Field]) -> Vec<u8> {
    let fixed = fields.iter().filter(|f| f.fixed).count() as i32;
    let header = [
        1,
        1,
        0,
        2,
        fixed,
        fields.len() as i32 - fixed,
        fields.iter().filter(|f| f.fixed).map(|f| f.true_size).sum(),
        256,
        fields.len() as i32,
    ];

    let mut body = vec![];
    for word in header {
        body.extend_from_slice(&word.to_be_bytes());
    }
    for (i, field) in fields.iter().enumerate() {
        let record = [
            field.nz_type,
            field.size,
            field.true_size,
            field.offset,
            i as i32,
            i as i32,
            1,
            field.fixed as i32,
            0,
        ];
        for word in record {
            body.extend_from_slice(&word.to_be_bytes());
        }
    }
    // date style, euro dates
    body.extend_from_slice(&1i32.to_be_bytes());
    body.extend_from_slice(&0i32.to_be_bytes());
    frame(b'X', &body)
}

pub fn dbos_tuple(record: &[u8]) -> Vec<u8> {
    frame(b'Y', record)
}

/// Answer `SELECT <n>` with one integer column.
pub fn select_int(n: &str) -> Vec<Action> {
    vec![
        Action::Send(row_description(&[("?column?", 23, -1)])),
        Action::Send(data_row(&[Some(n)])),
        Action::Send(complete("SELECT 1")),
    ]
}
