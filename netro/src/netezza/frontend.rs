//! Netezza Frontend Messages
use bytes::{BufMut, BytesMut};

use crate::ext::{BufMutExt, StrExt, UsizeExt};

/// Write a frontend message to `buf`.
pub fn write<F: FrontendProtocol>(msg: F, buf: &mut BytesMut) {
    // msgtype + length
    const PREFIX: usize = 1 + 4;

    let size_hint = msg.size_hint();
    buf.reserve(PREFIX + size_hint as usize);

    let offset = buf.len();
    buf.put_u8(F::MSGTYPE);
    buf.put_u32(4 + size_hint);

    msg.encode(&mut *buf);

    assert_eq!(
        buf.len() - offset,
        PREFIX + size_hint as usize,
        "Frontend message body size not equal to size hint"
    );
}

/// A type which can be encoded into netezza frontend message
pub trait FrontendProtocol {
    /// Message type.
    const MSGTYPE: u8;

    /// Size of the main body.
    ///
    /// Note that this is **only** the size of main body as oppose of actual message which
    /// include the length itself.
    fn size_hint(&self) -> u32;

    /// Write the main body of the message.
    ///
    /// The lenght of body written must be equal to the
    /// length returned by [`size_hint`][FrontendProtocol::size_hint].
    fn encode(self, buf: impl BufMut);
}

/// Identifies the message as a simple query
///
/// Multiple statements separated by `;` are sent as one request and
/// produce one `CommandComplete` per statement.
pub struct Query<'a> {
    /// the query string itself
    pub sql: &'a str,
}

impl FrontendProtocol for Query<'_> {
    const MSGTYPE: u8 = b'P';

    fn size_hint(&self) -> u32 {
        self.sql.nul_string_len()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_nul_string(self.sql);
    }
}

/// Identifies the message as a termination.
pub struct Terminate;

impl FrontendProtocol for Terminate {
    const MSGTYPE: u8 = b'X';

    fn size_hint(&self) -> u32 { 0 }

    fn encode(self, _: impl BufMut) { }
}

/// Password response during authentication.
///
/// Authentication happens before regular messaging begin, thus this message
/// has no message-type byte and does not implement [`FrontendProtocol`].
#[derive(Debug)]
pub struct PasswordPacket<'a> {
    /// The password, hashed if requested.
    pub password: &'a str,
}

impl PasswordPacket<'_> {
    pub fn write(self, buf: &mut BytesMut) {
        buf.put_u32(4 + self.password.nul_string_len());
        buf.put_nul_string(self.password);
    }
}

/// Out of band request to cancel the statement in progress.
///
/// Sent as the only message on a new connection, and the server closes it
/// without any response.
#[derive(Debug, Clone, Copy)]
pub struct CancelRequest {
    pub process_id: u32,
    pub secret_key: u32,
}

impl CancelRequest {
    /// The cancel request code, `1234` in the most significant 16 bits and `5678` in the least.
    pub const CODE: u32 = 80_877_102;

    pub const LEN: u32 = 16;

    pub fn write(self, buf: &mut BytesMut) {
        buf.put_u32(Self::LEN);
        buf.put_u32(Self::CODE);
        buf.put_u32(self.process_id);
        buf.put_u32(self.secret_key);
    }
}

/// Handshake packet, `len | opcode | payload`, see [`handshake`][super::handshake].
#[derive(Debug)]
pub struct HandshakePacket<'a> {
    pub opcode: u16,
    pub payload: HandshakePayload<'a>,
}

/// Payload of [`HandshakePacket`].
#[derive(Debug)]
pub enum HandshakePayload<'a> {
    None,
    Str(&'a str),
    I16(i16),
    I32(i32),
    Protocol(i16, i16),
}

impl HandshakePacket<'_> {
    pub fn write(self, buf: &mut BytesMut) {
        let size = match self.payload {
            HandshakePayload::None => 0,
            HandshakePayload::Str(s) => s.len() + 1,
            HandshakePayload::I16(_) => 2,
            HandshakePayload::I32(_) | HandshakePayload::Protocol(..) => 4,
        };
        buf.put_u32((4 + 2 + size).to_u32());
        buf.put_u16(self.opcode);
        match self.payload {
            HandshakePayload::None => { },
            HandshakePayload::Str(s) => buf.put_nul_string(s),
            HandshakePayload::I16(n) => buf.put_i16(n),
            HandshakePayload::I32(n) => buf.put_i32(n),
            HandshakePayload::Protocol(major, minor) => {
                buf.put_i16(major);
                buf.put_i16(minor);
            },
        }
    }
}
