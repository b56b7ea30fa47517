//! Session handshake and authentication.
use std::fmt;

use super::Config;
use crate::{
    Result,
    common::{debug, verbose},
    net::NzStream,
    netezza::{
        BackendMessage, NoticeResponse, ProtocolError,
        backend::BackendKeyData,
        frontend::{HandshakePacket, HandshakePayload, PasswordPacket},
        handshake::{
            self, Authentication, HandshakeAck, HANDSHAKE_VERSION, MIN_HANDSHAKE_VERSION, opcode,
        },
    },
};

/// Server state collected before the first `ReadyForQuery`.
#[derive(Debug, Default)]
pub(crate) struct StartupResponse {
    pub version: u16,
    pub key: Option<BackendKeyData>,
    pub parameters: Vec<(String, String)>,
    pub notices: Vec<NoticeResponse>,
}

/// Perform the handshake, authenticate, and wait for `ReadyForQuery`.
pub(crate) async fn startup(stream: &mut NzStream, config: &Config) -> Result<StartupResponse> {
    let version = negotiate_version(stream).await?;
    debug!("handshake version {version}");

    let pid = std::process::id() as i32;
    let os_user = var_or(&["USER", "USERNAME"], "");
    let host_name = var_or(&["HOSTNAME", "COMPUTERNAME"], "localhost");

    use HandshakePayload::{I16, I32, Protocol, Str};
    let mut packets = vec![
        (opcode::SSL_NEGOTIATE, I32(handshake::SECURITY_LEVEL_PLAIN)),
        (opcode::USER, Str(&config.user)),
        (opcode::DB, Str(&config.dbname)),
        (opcode::PROTOCOL, Protocol(handshake::PROTOCOL.0, handshake::PROTOCOL.1)),
        (opcode::REMOTE_PID, I32(pid)),
        (opcode::CLIENT_TYPE, I16(handshake::CLIENT_TYPE)),
        (opcode::APPNAME, Str(&config.application_name)),
        (opcode::CLIENT_OS, Str(std::env::consts::OS)),
        (opcode::CLIENT_HOST_NAME, Str(&host_name)),
        (opcode::CLIENT_OS_USER, Str(&os_user)),
    ];
    if version >= 6 {
        packets.push((opcode::VARLENA_64BIT, I16(1)));
    }

    for (opcode, payload) in packets {
        packet(stream, opcode, payload).await?;
    }

    HandshakePacket { opcode: opcode::CLIENT_DONE, payload: HandshakePayload::None }.write(stream.write_buf());
    stream.flush().await?;

    authenticate(stream, config).await?;

    let mut response = StartupResponse { version, ..Default::default() };

    loop {
        match stream.recv().await? {
            BackendMessage::ReadyForQuery(_) => break,
            BackendMessage::BackendKeyData(key) => response.key = Some(key),
            BackendMessage::ParameterStatus(param) => response.parameters.push((param.name, param.value)),
            BackendMessage::NoticeResponse(notice) => response.notices.push(notice),
            BackendMessage::Notification(_) | BackendMessage::PortalName(_) => { },
            BackendMessage::ErrorResponse(err) => return Err(AuthError { message: err.message }.into()),
            msg => return Err(msg.unexpected("startup").into()),
        }
    }

    Ok(response)
}

/// Offer the newest handshake version, then follow the server counter-offer.
async fn negotiate_version(stream: &mut NzStream) -> Result<u16> {
    let mut version = HANDSHAKE_VERSION;

    loop {
        HandshakePacket {
            opcode: opcode::CLIENT_BEGIN,
            payload: HandshakePayload::I16(version as i16),
        }
        .write(stream.write_buf());
        stream.flush().await?;

        match stream.decode(handshake::decode_ack).await? {
            HandshakeAck::Accept => return Ok(version),
            HandshakeAck::Version(offer) => {
                verbose!("(B) handshake version offer {offer}");
                if offer == version || !(MIN_HANDSHAKE_VERSION..=HANDSHAKE_VERSION).contains(&offer) {
                    return Err(ProtocolError::malformed("unsupported handshake version").into());
                }
                version = offer;
            },
            HandshakeAck::Reject(message) => return Err(AuthError { message }.into()),
        }
    }
}

/// Send one handshake packet and wait for it to be accepted.
async fn packet(stream: &mut NzStream, opcode: u16, payload: HandshakePayload<'_>) -> Result<()> {
    verbose!("(F) handshake {opcode} {payload:?}");
    HandshakePacket { opcode, payload }.write(stream.write_buf());
    stream.flush().await?;

    match stream.decode(handshake::decode_ack).await? {
        HandshakeAck::Accept => Ok(()),
        HandshakeAck::Version(_) => Err(ProtocolError::malformed("handshake version offer out of place").into()),
        HandshakeAck::Reject(message) => Err(AuthError { message }.into()),
    }
}

async fn authenticate(stream: &mut NzStream, config: &Config) -> Result<()> {
    loop {
        let auth = stream.decode(handshake::decode_auth).await?;
        verbose!("(B) {auth:?}");

        let password = match &auth {
            Authentication::Ok => return Ok(()),
            Authentication::Reject(message) => return Err(AuthError { message: message.clone() }.into()),
            Authentication::CleartextPassword => config.pass.clone(),
            auth => match handshake::hash_password(auth, &config.pass) {
                Some(hash) => hash,
                None => return Err(ProtocolError::malformed("authentication request without hash").into()),
            },
        };

        PasswordPacket { password: &password }.write(stream.write_buf());
        stream.flush().await?;
    }
}

fn var_or(names: &[&str], default: &str) -> String {
    names
        .iter()
        .find_map(|name| std::env::var(name).ok())
        .unwrap_or_else(|| default.to_owned())
}

/// Server rejected the session, the literal server text.
pub struct AuthError {
    pub(crate) message: String,
}

impl AuthError {
    /// The message as sent by the server.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::error::Error for AuthError { }

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl fmt::Debug for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
