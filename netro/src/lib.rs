//! Netezza Driver
//!
//! # Examples
//!
//! Reading rows:
//!
//! ```no_run
//! use netro::Connection;
//!
//! # async fn app() -> netro::Result<()> {
//! let mut conn = Connection::connect_env().await?;
//!
//! let mut cmd = conn.create_command("SELECT id, name FROM users WHERE active = ?").bind(true);
//! let mut reader = cmd.execute_reader().await?;
//!
//! while reader.read().await? {
//!     let id = reader.get_value(0)?;
//!     let name = reader.get_value(1)?;
//!     println!("{id}: {name}");
//! }
//!
//! reader.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! Multiple statements in one request:
//!
//! ```no_run
//! # async fn app(conn: &mut netro::Connection) -> netro::Result<()> {
//! let mut cmd = conn.create_command("SELECT 1; DELETE FROM logs WHERE 1=2; SELECT 'a', 'b'");
//! let mut reader = cmd.execute_reader().await?;
//!
//! loop {
//!     println!("{} columns, has rows: {}", reader.field_count(), reader.has_rows());
//!     while reader.read().await? {
//!         println!("{:?}", reader.values()?);
//!     }
//!     if !reader.next_result().await? {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Cancelling from another task:
//!
//! ```no_run
//! # async fn app(conn: &mut netro::Connection) -> netro::Result<()> {
//! let canceller = conn.canceller().expect("server sent cancel key");
//! tokio::spawn(async move {
//!     tokio::time::sleep(std::time::Duration::from_secs(1)).await;
//!     canceller.cancel().await
//! });
//!
//! let err = conn.create_command("SELECT pg_sleep(60)").execute().await.unwrap_err();
//! assert!(err.is_cancelled());
//! # Ok(())
//! # }
//! ```

mod common;
mod ext;
mod net;

// Protocol
pub mod codec;
pub mod netezza;

// Decoding
pub mod descriptor;
pub mod types;

// Connection
pub mod connection;

// Operation
pub mod command;
pub mod reader;

mod error;


pub use connection::{Canceller, Config, Connection, ConnectionState, Notice};
pub use command::{Command, CommandTag, Encode, RowResult};
pub use reader::{ResultReader, Rows, SchemaRow};
pub use types::{Value, ValueKind};
pub use error::{Error, ErrorKind, Result};
