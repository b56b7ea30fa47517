//! Netezza connection.
//!
//! A [`Connection`] owns one socket and runs at most one command at a time,
//! which is enforced by [`Command`] and [`ResultReader`] borrowing the
//! connection mutably.
//!
//! ```text
//! Closed -> Connecting -> Authenticating -> Idle <-> Executing -> Idle ... -> Closed
//!                                            ^           |
//!                                            |       (timeout)
//!                                            +------ Cancelling
//! ```
//!
//! Any transport or protocol failure moves the connection to `Faulted`, and
//! every subsequent call fails with [`ConnectionClosed`].
//!
//! [`Command`]: crate::Command
//! [`ResultReader`]: crate::ResultReader
use std::time::Duration;
use tokio::time::Instant;

use crate::{
    Error, Result,
    command::Command,
    common::{debug, unit_error, verbose, warning},
    net::NzStream,
    netezza::{BackendMessage, backend::BackendKeyData, frontend},
};

mod config;
mod startup;
mod notice;
mod cancel;

pub use config::{Config, ParseError, DEFAULT_PORT, DEFAULT_COMMAND_TIMEOUT, DEFAULT_CONNECT_TIMEOUT};
pub use startup::AuthError;
pub use notice::{Notice, NoticeListener, DEFAULT_NOTICE_CAPACITY};
pub use cancel::Canceller;

use notice::NoticeQueue;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Connecting,
    Authenticating,
    /// Ready for a new command.
    Idle,
    /// A command response is being read.
    Executing,
    /// A timed out command was cancelled, its response is drained before the next command.
    Cancelling,
    /// Transport or protocol failure, the connection is unusable.
    Faulted,
}

/// A single connection to netezza.
#[derive(Debug)]
pub struct Connection {
    stream: NzStream,
    config: Config,
    state: ConnectionState,
    key: Option<BackendKeyData>,
    canceller: Option<Canceller>,
    notices: NoticeQueue,
    parameters: Vec<(String, String)>,
    handshake_version: u16,
}

impl Connection {
    /// Connect using config from environment variable.
    ///
    /// See [`Config::from_env`] for more details.
    pub async fn connect_env() -> Result<Self> {
        Self::connect_with(Config::from_env()).await
    }

    /// Connect using url, see [`Config::parse`].
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with(Config::parse(url)?).await
    }

    /// Open the socket, authenticate and wait until the server is ready.
    ///
    /// The whole sequence is bounded by the configured connect timeout.
    pub async fn connect_with(config: Config) -> Result<Self> {
        debug!("connecting to {}:{}/{}", config.host, config.port, config.dbname);

        let timeout = config.connect_timeout;
        let connect = Self::connect_inner(config);

        let result = match timeout.is_zero() {
            true => connect.await,
            false => match tokio::time::timeout(timeout, connect).await {
                Ok(result) => result,
                Err(_) => Err(std::io::Error::from(std::io::ErrorKind::TimedOut).into()),
            },
        };

        result.map_err(|err| err.context("failed to connect"))
    }

    async fn connect_inner(config: Config) -> Result<Self> {
        verbose!("state {:?}", ConnectionState::Connecting);
        let mut stream = NzStream::connect(&config.host, config.port).await?;

        verbose!("state {:?}", ConnectionState::Authenticating);
        let response = startup::startup(&mut stream, &config).await?;

        let canceller = response.key.map(|key| Canceller::new(&config.host, config.port, key));
        let mut notices = NoticeQueue::new(DEFAULT_NOTICE_CAPACITY);
        for notice in response.notices {
            notices.push(notice);
        }

        debug!("connected, backend {:?}", response.key);

        Ok(Self {
            stream,
            config,
            state: ConnectionState::Idle,
            key: response.key,
            canceller,
            notices,
            parameters: response.parameters,
            handshake_version: response.version,
        })
    }

    /// Create a command bound to this connection.
    pub fn create_command(&mut self, sql: impl Into<String>) -> Command<'_> {
        Command::new(self, sql)
    }

    /// Register notice listener.
    ///
    /// Listeners receive notices in arrival order, called between protocol
    /// messages while a command runs. Notices queued before the first
    /// listener was registered are delivered on the next dispatch.
    pub fn on_notice<F>(&mut self, listener: F)
    where
        F: FnMut(&Notice) + Send + 'static,
    {
        self.notices.listen(Box::new(listener));
        self.notices.dispatch();
    }

    /// Take notices that no listener has received.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        self.notices.take()
    }

    /// Handle to cancel the statement in progress from another task.
    ///
    /// Returns `None` if the server did not send cancellation key.
    pub fn canceller(&self) -> Option<Canceller> {
        self.canceller.clone()
    }

    /// Request cancellation of the statement in progress.
    pub async fn cancel(&self) -> Result<()> {
        match &self.canceller {
            Some(canceller) => canceller.cancel().await,
            None => {
                warning!("cancel requested without backend key");
                Ok(())
            },
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Backend process id and secret, used for cancellation.
    pub fn backend_key(&self) -> Option<BackendKeyData> {
        self.key
    }

    /// Negotiated handshake version.
    pub fn handshake_version(&self) -> u16 {
        self.handshake_version
    }

    /// Run-time parameter reported by the server.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .rev()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Server version, if reported.
    pub fn server_version(&self) -> Option<&str> {
        self.parameter("server_version")
    }

    /// Wait until the connection can accept a new command.
    ///
    /// A response left by a dropped reader or a timed out command is drained.
    pub async fn ready(&mut self) -> Result<()> {
        match self.state {
            ConnectionState::Idle => Ok(()),
            ConnectionState::Executing | ConnectionState::Cancelling => self.drain().await,
            _ => Err(ConnectionClosed.into()),
        }
    }

    /// Terminate the session and close the socket.
    ///
    /// Closing a closed connection does nothing.
    pub async fn close(&mut self) -> Result<()> {
        match self.state {
            ConnectionState::Closed => return Ok(()),
            ConnectionState::Faulted => {
                self.state = ConnectionState::Closed;
                return Ok(());
            },
            _ => { },
        }

        debug!("closing connection");
        self.state = ConnectionState::Closed;
        self.stream.send(frontend::Terminate);
        let flushed = self.stream.flush().await;
        let shutdown = self.stream.shutdown().await;
        flushed?;
        shutdown?;
        Ok(())
    }

    // ===== Command execution =====

    /// Send a simple query, the connection must be ready.
    pub(crate) async fn send_query(&mut self, sql: &str) -> Result<()> {
        self.ready().await?;

        verbose!("(F) Query {sql:?}");
        self.state = ConnectionState::Executing;
        self.stream.send(frontend::Query { sql });
        if let Err(err) = self.stream.flush().await {
            return Err(self.fault(err.into()));
        }
        Ok(())
    }

    /// Receive the next message of the command response.
    ///
    /// Notices, parameter status and ignored messages are handled here. On
    /// `ReadyForQuery` the connection is back to idle. When `deadline`
    /// passes, the statement is cancelled and [`TimeoutError`] is returned.
    pub(crate) async fn recv(&mut self, deadline: Option<Instant>) -> Result<BackendMessage> {
        if !matches!(self.state, ConnectionState::Executing) {
            return Err(ConnectionClosed.into());
        }

        loop {
            let result = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, self.stream.recv()).await {
                    Ok(result) => result,
                    Err(_) => return Err(self.timeout()),
                },
                None => self.stream.recv().await,
            };

            let msg = match result {
                Ok(msg) => msg,
                Err(err) => return Err(self.fault(err)),
            };

            match msg {
                BackendMessage::NoticeResponse(notice) => {
                    self.notices.push(notice);
                    self.notices.dispatch();
                },
                BackendMessage::ParameterStatus(param) => {
                    self.parameters.push((param.name, param.value));
                },
                BackendMessage::Notification(_) | BackendMessage::PortalName(_) => { },
                BackendMessage::ReadyForQuery(_) => {
                    self.state = ConnectionState::Idle;
                    return Ok(msg);
                },
                msg => return Ok(msg),
            }
        }
    }

    /// Discard the rest of the response up to `ReadyForQuery`.
    ///
    /// Server errors are discarded as well, as they belong to a response
    /// nobody waits for anymore.
    pub(crate) async fn drain(&mut self) -> Result<()> {
        debug!("draining response in {:?}", self.state);
        self.state = ConnectionState::Executing;

        let deadline = self.deadline(None);
        loop {
            match self.recv(deadline).await {
                Ok(BackendMessage::ReadyForQuery(_)) => return Ok(()),
                Ok(BackendMessage::ErrorResponse(_err)) => {
                    debug!("discarded error while draining: {_err}");
                },
                Ok(_) => { },
                Err(err) if err.is_timeout() => {
                    // server did not respond to the cancel request either
                    warning!("drain timed out, connection faulted");
                    self.state = ConnectionState::Faulted;
                    return Err(err);
                },
                Err(err) => return Err(err),
            }
        }
    }

    /// Deadline from now for `timeout`, or the configured command timeout.
    pub(crate) fn deadline(&self, timeout: Option<Duration>) -> Option<Instant> {
        let timeout = timeout.unwrap_or(self.config.command_timeout);
        match timeout.is_zero() {
            true => None,
            false => Some(Instant::now() + timeout),
        }
    }

    /// Cancel the running statement after its deadline passed.
    fn timeout(&mut self) -> Error {
        debug!("command timeout, cancelling");
        match &self.canceller {
            Some(canceller) => canceller.spawn(),
            None => {
                warning!("command timeout without backend key, statement keeps running");
            },
        }
        self.state = ConnectionState::Cancelling;
        TimeoutError.into()
    }

    /// Mark the connection unusable if `err` is fatal.
    pub(crate) fn fault(&mut self, err: Error) -> Error {
        if err.is_fatal() && self.state != ConnectionState::Closed {
            warning!("connection faulted: {err}");
            self.state = ConnectionState::Faulted;
        }
        err
    }
}

unit_error! {
    /// Command did not complete within its timeout.
    pub struct TimeoutError("Command execution timeout");
}

unit_error! {
    /// Connection is closed or unusable after a failure.
    pub struct ConnectionClosed("connection closed");
}
