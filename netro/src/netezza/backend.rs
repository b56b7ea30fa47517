//! Netezza Backend Messages
use bytes::{Buf, Bytes, BytesMut};
use std::fmt;

use super::ProtocolError;
use crate::ext::{BytesExt, FmtExt};

/// Backend message larger than this is considered corrupted stream.
pub const MAX_MESSAGE_LEN: usize = 1 << 30;

/// Type byte plus the ignored header.
const PREFIX: usize = 1 + 4;

/// Try to split one framed backend message from `buf`.
///
/// Returns `Ok(None)` when `buf` does not yet contain a whole message,
/// in which case `buf` is untouched.
pub fn decode_frame(buf: &mut BytesMut) -> Result<Option<(u8, Bytes)>, ProtocolError> {
    let Some(&msgtype) = buf.first() else {
        return Ok(None);
    };

    if msgtype == ReadyForQuery::MSGTYPE {
        if buf.len() < PREFIX {
            return Ok(None);
        }
        buf.advance(PREFIX);
        return Ok(Some((msgtype, Bytes::new())));
    }

    let Some(mut len) = buf.get(PREFIX..PREFIX + 4) else {
        return Ok(None);
    };
    let len = len.get_u32() as usize;

    if len > MAX_MESSAGE_LEN {
        return Err(ProtocolError::TooLarge { len });
    }

    if buf.len() < PREFIX + 4 + len {
        buf.reserve(PREFIX + 4 + len - buf.len());
        return Ok(None);
    }

    buf.advance(PREFIX + 4);
    Ok(Some((msgtype, buf.split_to(len).freeze())))
}

/// A type that can be decoded into netezza backend message
pub trait BackendProtocol: Sized {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self,ProtocolError>;
}

/// Netezza backend messages
#[derive(Debug)]
pub enum BackendMessage {
    BackendKeyData(BackendKeyData),
    CommandComplete(CommandComplete),
    DataRow(DataRow),
    DbosDescriptor(DbosDescriptor),
    DbosTuple(DbosTuple),
    EmptyQueryResponse(EmptyQueryResponse),
    ErrorResponse(ErrorResponse),
    NoticeResponse(NoticeResponse),
    Notification(Notification),
    ParameterStatus(ParameterStatus),
    PortalName(PortalName),
    ReadyForQuery(ReadyForQuery),
    RowDescription(RowDescription),
}

macro_rules! match_backend {
    ($($name:ident,)*) => {
        impl BackendMessage {
            pub fn msgtype(&self) -> u8 {
                match self {
                    $(Self::$name(_) => $name::MSGTYPE,)*
                }
            }

            /// Get message name from message type.
            ///
            /// Returns `"Unknown"` for unknown message type.
            pub fn message_name(msgtype: u8) -> &'static str {
                match msgtype {
                    $($name::MSGTYPE => stringify!($name),)*
                    b'R' => "Authentication",
                    _ => "Unknown",
                }
            }

            /// Create [`ProtocolError`] for an out of place message.
            pub fn unexpected(&self, phase: &'static str) -> ProtocolError {
                ProtocolError::unexpected_phase(self.msgtype(), phase)
            }
        }
        impl BackendProtocol for BackendMessage {
            fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
                let message = match msgtype {
                    $($name::MSGTYPE => Self::$name(<$name as BackendProtocol>::decode(msgtype, body)?),)*
                    _ => return Err(ProtocolError::unknown(msgtype)),
                };
                Ok(message)
            }
        }
    };
}

match_backend! {
    BackendKeyData,
    CommandComplete,
    DataRow,
    DbosDescriptor,
    DbosTuple,
    EmptyQueryResponse,
    ErrorResponse,
    NoticeResponse,
    Notification,
    ParameterStatus,
    PortalName,
    ReadyForQuery,
    RowDescription,
}

macro_rules! assert_msgtype {
    ($typ:ident) => {
        if Self::MSGTYPE != $typ {
            return Err(ProtocolError::unexpected(Self::MSGTYPE,$typ))
        }
    };
}

/// Identifies the message as cancellation key data.
///
/// The frontend must save these values if it wishes to be able to issue CancelRequest messages later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendKeyData {
    /// The process ID of this backend.
    pub process_id: u32,
    /// The secret key of this backend.
    pub secret_key: u32,
}

impl BackendKeyData {
    pub const MSGTYPE: u8 = b'K';
}

impl BackendProtocol for BackendKeyData {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self,ProtocolError> {
        assert_msgtype!(msgtype);
        if body.remaining() < 8 {
            return Err(ProtocolError::short(8, body.remaining()));
        }
        Ok(Self {
            process_id: body.get_u32(),
            secret_key: body.get_u32(),
        })
    }
}

/// Identifies the message as a run-time parameter status report
#[derive(Debug, Clone)]
pub struct ParameterStatus {
    /// The name of the run-time parameter being reported
    pub name: String,
    /// The current value of the parameter
    pub value: String
}

impl ParameterStatus {
    pub const MSGTYPE: u8 = b'S';
}

impl BackendProtocol for ParameterStatus {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self,ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self {
            name: body.get_nul_string()?,
            value: body.get_nul_string()?,
        })
    }
}

/// Split server text of the form `SEVERITY:  message` into its parts.
fn server_text(body: &[u8], default_severity: &str) -> (String, String) {
    let text = String::from_utf8_lossy(body);
    let text = text.trim_end_matches(['\0', '\n', '\r']);

    if let Some((severity, message)) = text.split_once(':') {
        if !severity.is_empty() && severity.bytes().all(|b| b.is_ascii_uppercase()) {
            return (severity.to_owned(), message.trim_start().to_owned());
        }
    }

    (default_severity.to_owned(), text.to_owned())
}

/// A warning message. The frontend should display the message.
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct NoticeResponse {
    /// Severity reported by the server, e.g. `NOTICE` or `WARNING`.
    pub severity: String,
    /// The message text as sent by the server.
    pub message: String,
}

impl NoticeResponse {
    pub const MSGTYPE: u8 = b'N';
}

impl BackendProtocol for NoticeResponse {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self,ProtocolError> {
        assert_msgtype!(msgtype);
        let (severity, message) = server_text(&body, "NOTICE");
        Ok(NoticeResponse { severity, message })
    }
}

impl fmt::Display for NoticeResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)
    }
}

impl fmt::Debug for NoticeResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

/// Identifies the message as an error
///
/// Unlike postgres protocol version 3, the body is a single text of the
/// form `ERROR:  message`, the message is preserved verbatim.
#[derive(Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Severity reported by the server, e.g. `ERROR` or `FATAL`.
    pub severity: String,
    /// The message text as sent by the server.
    pub message: String,
}

impl ErrorResponse {
    pub const MSGTYPE: u8 = b'E';

    /// Returns `true` if the message reports a statement aborted by cancel request.
    pub fn is_cancellation(&self) -> bool {
        let message = self.message.to_ascii_lowercase();
        ["cancel", "terminat", "rolled back"]
            .iter()
            .any(|pat| message.contains(pat))
    }
}

impl BackendProtocol for ErrorResponse {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self,ProtocolError> {
        assert_msgtype!(msgtype);
        let (severity, message) = server_text(&body, "ERROR");
        Ok(Self { severity, message })
    }
}

impl std::error::Error for ErrorResponse { }

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl fmt::Debug for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}: {}\"", self.severity, self.message)
    }
}

/// Identifies the message as a row description
#[derive(Debug)]
pub struct RowDescription {
    /// Specifies the number of fields in a row (can be zero).
    pub field_len: u16,
    /// Undecoded field descriptions.
    pub body: Bytes,
}

impl RowDescription {
    pub const MSGTYPE: u8 = b'T';
}

impl BackendProtocol for RowDescription {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        if body.remaining() < 2 {
            return Err(ProtocolError::short(2, body.remaining()));
        }
        Ok(Self {
            field_len: body.get_u16(),
            body,
        })
    }
}

/// Identifies the message as a data row in text format.
///
/// The body starts with a null bitmap, the field count is only known from
/// the preceding [`RowDescription`].
pub struct DataRow {
    pub body: Bytes,
}

impl DataRow {
    pub const MSGTYPE: u8 = b'D';
}

impl BackendProtocol for DataRow {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self { body })
    }
}

impl fmt::Debug for DataRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DataRow").field(&self.body.lossy()).finish()
    }
}

/// Identifies the message as a DBOS binary tuple descriptor.
#[derive(Debug)]
pub struct DbosDescriptor {
    pub body: Bytes,
}

impl DbosDescriptor {
    pub const MSGTYPE: u8 = b'X';
}

impl BackendProtocol for DbosDescriptor {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self { body })
    }
}

/// Identifies the message as a DBOS binary tuple.
pub struct DbosTuple {
    pub body: Bytes,
}

impl DbosTuple {
    pub const MSGTYPE: u8 = b'Y';
}

impl BackendProtocol for DbosTuple {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self { body })
    }
}

impl fmt::Debug for DbosTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DbosTuple").field(&self.body.lossy()).finish()
    }
}

/// Identifies the message as a command-completed response
///
/// For an INSERT command, the tag is INSERT oid rows, where rows is the number of rows inserted.
///
/// For a DELETE command, the tag is DELETE rows where rows is the number of rows deleted.
///
/// For an UPDATE command, the tag is UPDATE rows where rows is the number of rows updated.
///
/// For a SELECT or CREATE TABLE AS command, the tag is SELECT rows where rows is the number of rows retrieved.
#[derive(Debug)]
pub struct CommandComplete {
    /// The command tag. This is usually a single word that identifies which SQL command was completed.
    pub tag: String,
}

impl CommandComplete {
    pub const MSGTYPE: u8 = b'C';
}

impl BackendProtocol for CommandComplete {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        let tag = match body.iter().any(|b| *b == b'\0') {
            true => body.get_nul_string()?,
            false => String::from_utf8_lossy(&body).into_owned(),
        };
        Ok(Self { tag })
    }
}

/// Asynchronous notification, the payload is ignored.
#[derive(Debug)]
pub struct Notification {
    pub body: Bytes,
}

impl Notification {
    pub const MSGTYPE: u8 = b'A';
}

impl BackendProtocol for Notification {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self { body })
    }
}

/// Cursor name for the statement, the payload is ignored.
#[derive(Debug)]
pub struct PortalName {
    pub body: Bytes,
}

impl PortalName {
    pub const MSGTYPE: u8 = b'P';
}

impl BackendProtocol for PortalName {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self { body })
    }
}

macro_rules! unit_msg {
    ($(
        $(#[$doc:meta])* struct $name:ident, $ty:literal;
    )*) => {$(
            $(#[$doc])*
            #[derive(Debug)]
            pub struct $name;

            impl $name {
                pub const MSGTYPE: u8 = $ty;
            }

            impl BackendProtocol for $name {
                fn decode(msgtype: u8, _: Bytes) -> Result<Self,ProtocolError> {
                    if $name::MSGTYPE != msgtype {
                        return Err(ProtocolError::unexpected(Self::MSGTYPE,msgtype))
                    }
                    Ok(Self)
                }
            }
    )*};
}

unit_msg! {
    /// Identifies the message as a response to an empty query string.
    ///
    /// This substitutes for CommandComplete.
    struct EmptyQueryResponse, b'I';

    /// ReadyForQuery is sent whenever the backend is ready for a new query cycle.
    struct ReadyForQuery, b'Z';
}
