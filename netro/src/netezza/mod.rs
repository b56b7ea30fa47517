//! Netezza Frontend and Backend Protocol
//!
//! The protocol is derived from the postgres protocol version 2, with a
//! proprietary session handshake and binary tuple extension (DBOS) on top.
//!
//! ## Messaging Overview
//!
//! Before authentication, the client sends handshake packets and the server
//! replies with a single status byte, see [`handshake`].
//!
//! After authentication, every backend message starts with a message-type
//! byte, followed by a 4 byte header that the client ignores, and the length
//! of the body (which, unlike postgres, does not include the length itself).
//!
//! ```text
//! ┏━━━━┳━━━━━━━━━━━━━━━━━━━┳━━━━━━━━━━━━━━━━━━━┳━━━━━━┓
//! ┃ Ty ┃       Header      ┃       Length      ┃ Body ┃
//! ┣━━━━╋━━━━━━━━━━━━━━━━━━━╋━━━━━━━━━━━━━━━━━━━╋━━━━━━┫
//! ┃ u8 ┃      [u8; 4]      ┃      u32 (BE)     ┃ [u8] ┃
//! ┣━━━━╋━━━━━━━━━━━━━━━━━━━╋━━━━━━━━━━━━━━━━━━━╋━━━━━━┫
//! ┃ 43 ┃ 00 | 00 | 00 | 00 ┃ 00 | 00 | 00 | 09 ┃  ..  ┃
//! ┗━━━━┻━━━━━━━━━━━━━━━━━━━┻━━━━━━━━━━━━━━━━━━━┻━━━━━━┛
//! ```
//!
//! `ReadyForQuery` is the exception, it only carries the type and header.
//!
//! ## Byte order
//!
//! Message headers, lengths and the DBOS tuple descriptor are big-endian.
//! The DBOS tuple payload (`Y` message) is little-endian.

mod nz_type;
mod error;

pub mod handshake;
pub mod frontend;
pub mod backend;

pub use nz_type::{NzType, Oid, oid};
pub use frontend::FrontendProtocol;
pub use backend::{BackendMessage, BackendProtocol, ErrorResponse, NoticeResponse};
pub use error::ProtocolError;
