//! Session handshake and authentication exchange.
//!
//! Before regular messaging, the client negotiates the handshake version and
//! describes the session with a series of packets. Each packet is
//! `i32 length | i16 opcode | payload`, and the server answers every packet
//! with one status byte:
//!
//! - `N`, accepted
//! - `M` followed by one ascii digit, only for [`opcode::CLIENT_BEGIN`],
//!   the server proposes another handshake version
//! - `E` followed by nul terminated text, rejected
//!
//! [`opcode::CLIENT_DONE`] is not answered, the server continues with an
//! authentication request instead.
use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::{Buf, BytesMut};
use md5::Md5;
use sha2::{Digest, Sha256};

use super::ProtocolError;
use crate::ext::BytesExt;

/// Handshake packet opcodes.
pub mod opcode {
    pub const CLIENT_BEGIN: u16 = 1;
    pub const DB: u16 = 2;
    pub const USER: u16 = 3;
    pub const OPTIONS: u16 = 4;
    pub const REMOTE_PID: u16 = 6;
    pub const CLIENT_TYPE: u16 = 8;
    pub const PROTOCOL: u16 = 9;
    pub const SSL_NEGOTIATE: u16 = 11;
    pub const APPNAME: u16 = 13;
    pub const CLIENT_OS: u16 = 14;
    pub const CLIENT_HOST_NAME: u16 = 15;
    pub const CLIENT_OS_USER: u16 = 16;
    pub const VARLENA_64BIT: u16 = 17;
    pub const CLIENT_DONE: u16 = 1000;
}

/// The first handshake version offered.
pub const HANDSHAKE_VERSION: u16 = 6;

/// The oldest handshake version accepted from a server counter-offer.
pub const MIN_HANDSHAKE_VERSION: u16 = 2;

/// Data protocol requested in [`opcode::PROTOCOL`].
pub const PROTOCOL: (i16, i16) = (3, 5);

/// Client type reported in [`opcode::CLIENT_TYPE`].
pub const CLIENT_TYPE: i16 = 13;

/// Only unsecured session is offered in [`opcode::SSL_NEGOTIATE`].
pub const SECURITY_LEVEL_PLAIN: i32 = 0;

/// Server answer to a handshake packet.
#[derive(Debug, PartialEq, Eq)]
pub enum HandshakeAck {
    Accept,
    Version(u16),
    Reject(String),
}

/// Try to decode server answer to a handshake packet.
pub fn decode_ack(buf: &mut BytesMut) -> Result<Option<HandshakeAck>, ProtocolError> {
    let Some(&status) = buf.first() else {
        return Ok(None);
    };

    match status {
        b'N' => {
            buf.advance(1);
            Ok(Some(HandshakeAck::Accept))
        },
        b'M' => {
            let Some(&digit) = buf.get(1) else {
                return Ok(None);
            };
            if !digit.is_ascii_digit() {
                return Err(ProtocolError::malformed("handshake version is not a digit"));
            }
            buf.advance(2);
            Ok(Some(HandshakeAck::Version((digit - b'0') as u16)))
        },
        b'E' => match reject_text(buf) {
            Some(text) => Ok(Some(HandshakeAck::Reject(text?))),
            None => Ok(None),
        },
        found => Err(ProtocolError::unexpected_phase(found, "handshake")),
    }
}

/// Authentication request sent by the server.
#[derive(Debug, PartialEq, Eq)]
pub enum Authentication {
    /// Specifies that the authentication was successful.
    Ok,
    /// Specifies that a clear-text password is required.
    CleartextPassword,
    /// Specifies that an MD5-hashed password is required.
    Md5Password {
        salt: [u8; 2],
    },
    /// Specifies that a SHA256-hashed password is required.
    Sha256Password {
        salt: [u8; 2],
    },
    /// Server rejected the session, the literal server text.
    Reject(String),
}

impl Authentication {
    pub const MSGTYPE: u8 = b'R';
}

/// Try to decode an authentication request.
///
/// Authentication request does not have the regular message header.
pub fn decode_auth(buf: &mut BytesMut) -> Result<Option<Authentication>, ProtocolError> {
    let Some(&msgtype) = buf.first() else {
        return Ok(None);
    };

    if msgtype == b'E' {
        return match reject_text(buf) {
            Some(text) => Ok(Some(Authentication::Reject(text?))),
            None => Ok(None),
        };
    }

    if msgtype != Authentication::MSGTYPE {
        return Err(ProtocolError::unexpected(Authentication::MSGTYPE, msgtype));
    }

    let Some(mut code) = buf.get(1..5) else {
        return Ok(None);
    };
    let code = code.get_i32();

    let salted = |buf: &mut BytesMut| -> Option<[u8; 2]> {
        let salt = buf.get(5..7)?;
        let salt = [salt[0], salt[1]];
        buf.advance(7);
        Some(salt)
    };

    let auth = match code {
        0 => Authentication::Ok,
        3 => Authentication::CleartextPassword,
        5 => match salted(buf) {
            Some(salt) => return Ok(Some(Authentication::Md5Password { salt })),
            None => return Ok(None),
        },
        6 => match salted(buf) {
            Some(salt) => return Ok(Some(Authentication::Sha256Password { salt })),
            None => return Ok(None),
        },
        auth => return Err(ProtocolError::unknown_auth(auth)),
    };

    buf.advance(5);
    Ok(Some(auth))
}

/// Split `E` status byte with its nul terminated text, `None` if incomplete.
fn reject_text(buf: &mut BytesMut) -> Option<Result<String, ProtocolError>> {
    buf.iter().skip(1).position(|b| *b == b'\0')?;
    buf.advance(1);
    Some(buf.get_nul_string().map(|text| text.trim_end().to_owned()))
}

/// Hash password for salted authentication.
///
/// The reply is `base64(digest(salt || password))` without `=` padding.
pub fn hash_password(auth: &Authentication, password: &str) -> Option<String> {
    let digest = match auth {
        Authentication::Md5Password { salt } => {
            let mut md5 = Md5::new();
            md5.update(salt);
            md5.update(password.as_bytes());
            md5.finalize().to_vec()
        },
        Authentication::Sha256Password { salt } => {
            let mut sha = Sha256::new();
            sha.update(salt);
            sha.update(password.as_bytes());
            sha.finalize().to_vec()
        },
        _ => return None,
    };

    let mut encoded = STANDARD.encode(digest);
    encoded.truncate(encoded.trim_end_matches('=').len());
    Some(encoded)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ack() {
        let mut buf = BytesMut::from(&b"NM"[..]);
        assert_eq!(decode_ack(&mut buf).unwrap(), Some(HandshakeAck::Accept));
        assert_eq!(decode_ack(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"4");
        assert_eq!(decode_ack(&mut buf).unwrap(), Some(HandshakeAck::Version(4)));

        let mut buf = BytesMut::from(&b"Eno such database"[..]);
        assert_eq!(decode_ack(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"\0");
        assert_eq!(
            decode_ack(&mut buf).unwrap(),
            Some(HandshakeAck::Reject("no such database".into()))
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn auth_request() {
        let mut buf = BytesMut::from(&b"R\0\0\0\x05a"[..]);
        assert_eq!(decode_auth(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"b");
        assert_eq!(
            decode_auth(&mut buf).unwrap(),
            Some(Authentication::Md5Password { salt: *b"ab" })
        );

        let mut buf = BytesMut::from(&b"R\0\0\0\0"[..]);
        assert_eq!(decode_auth(&mut buf).unwrap(), Some(Authentication::Ok));

        let mut buf = BytesMut::from(&b"R\0\0\0\x09"[..]);
        assert!(decode_auth(&mut buf).is_err());
    }

    #[test]
    fn salted_hash_has_no_padding() {
        let md5 = hash_password(&Authentication::Md5Password { salt: *b"xy" }, "secret").unwrap();
        // 16 bytes digest encodes to 22 chars without padding
        assert_eq!(md5.len(), 22);
        assert!(!md5.ends_with('='));

        let sha = hash_password(&Authentication::Sha256Password { salt: *b"xy" }, "secret").unwrap();
        assert_eq!(sha.len(), 43);

        assert!(hash_password(&Authentication::Ok, "secret").is_none());
    }
}
