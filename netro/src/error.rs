//! `netro` error types.
use std::{backtrace::Backtrace, borrow::Cow, fmt, io};

use crate::{
    command::EmptyQueryError,
    connection::{AuthError, ConnectionClosed, ParseError, TimeoutError},
    netezza::{ErrorResponse, ProtocolError},
    reader::IndexError,
    types::DecodeError,
};

/// A specialized [`Result`] type for `netro` operation.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All possible error from `netro` library.
pub struct Error {
    context: Cow<'static, str>,
    backtrace: Backtrace,
    kind: ErrorKind,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn into_kind(self) -> ErrorKind {
        self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// Prefix the error message with `context`.
    pub(crate) fn context(mut self, context: impl Into<Cow<'static, str>>) -> Self {
        self.context = context.into();
        self
    }

    /// Returns `true` if command exceeded its timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, ErrorKind::Timeout(_))
    }

    /// Returns `true` if the statement was aborted by a cancel request.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled(_))
    }

    /// Returns `true` if the server rejected the statement.
    pub fn is_database(&self) -> bool {
        matches!(self.kind, ErrorKind::Database(_))
    }

    /// Returns `true` if the server rejected the credentials.
    pub fn is_auth(&self) -> bool {
        matches!(self.kind, ErrorKind::Auth(_))
    }

    /// Returns `true` if the connection is no longer usable.
    pub fn is_closed(&self) -> bool {
        matches!(self.kind, ErrorKind::Closed(_))
    }

    /// Server error response, for both statement error and cancellation.
    pub fn database_error(&self) -> Option<&ErrorResponse> {
        match &self.kind {
            ErrorKind::Database(e) | ErrorKind::Cancelled(e) => Some(e),
            _ => None,
        }
    }

    /// Returns `true` if the error leaves the connection unusable.
    pub(crate) fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Protocol(_) | ErrorKind::Io(_) | ErrorKind::Closed(_) | ErrorKind::Auth(_)
        )
    }
}

/// All possible error kind from `netro` library.
pub enum ErrorKind {
    Config(ParseError),
    Protocol(ProtocolError),
    Io(io::Error),
    Auth(AuthError),
    Database(ErrorResponse),
    Cancelled(ErrorResponse),
    Timeout(TimeoutError),
    Closed(ConnectionClosed),
    Index(IndexError),
    Decode(DecodeError),
    EmptyQuery(EmptyQueryError),
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for Error {
            fn from($pat: $ty) -> Self {
                let backtrace = std::backtrace::Backtrace::capture();
                Self { context: Cow::Borrowed(""), backtrace, kind: $body }
            }
        }
    };
}

from!(<ErrorKind>e => e);
from!(<ParseError>e => ErrorKind::Config(e));
from!(<ProtocolError>e => ErrorKind::Protocol(e));
from!(<io::Error>e => ErrorKind::Io(e));
from!(<AuthError>e => ErrorKind::Auth(e));
from!(<ErrorResponse>e => match e.is_cancellation() {
    true => ErrorKind::Cancelled(e),
    false => ErrorKind::Database(e),
});
from!(<TimeoutError>e => ErrorKind::Timeout(e));
from!(<ConnectionClosed>e => ErrorKind::Closed(e));
from!(<IndexError>e => ErrorKind::Index(e));
from!(<DecodeError>e => ErrorKind::Decode(e));
from!(<EmptyQueryError>e => ErrorKind::EmptyQuery(e));

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Io(e) => Some(e),
            ErrorKind::Database(e) | ErrorKind::Cancelled(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.context.is_empty() {
            write!(f, "{}: ", self.context)?;
        }

        fmt::Display::fmt(&self.kind, f)?;

        if let std::backtrace::BacktraceStatus::Captured = self.backtrace.status() {
            let mut backtrace = self.backtrace.to_string();
            write!(f, "\n\n")?;
            writeln!(f, "Stack backtrace:")?;
            backtrace.truncate(backtrace.trim_end().len());
            write!(f, "{}", backtrace)?;
        }

        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl std::error::Error for ErrorKind { }

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => e.fmt(f),
            Self::Protocol(e) => e.fmt(f),
            Self::Io(e) => e.fmt(f),
            Self::Auth(e) => e.fmt(f),
            Self::Database(e) => e.fmt(f),
            Self::Cancelled(e) => e.fmt(f),
            Self::Timeout(e) => e.fmt(f),
            Self::Closed(e) => e.fmt(f),
            Self::Index(e) => e.fmt(f),
            Self::Decode(e) => e.fmt(f),
            Self::EmptyQuery(e) => e.fmt(f),
        }
    }
}

impl fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
