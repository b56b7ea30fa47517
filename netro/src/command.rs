//! Command execution.
//!
//! - [`Command`]
//! - [`Encode`]
//! - [`RowResult`], [`CommandTag`]
use std::{fmt, time::Duration};
use time::{Date, PrimitiveDateTime, Time};
use uuid::Uuid;

use crate::{
    Result,
    common::{span, unit_error, verbose},
    connection::{Canceller, Connection, ParseError},
    reader::ResultReader,
    types::Value,
};

/// SQL text bound to a connection.
///
/// Multiple statements separated by `;` are sent as one request, and produce
/// one sub-result each.
///
/// ```no_run
/// # async fn app(conn: &mut netro::Connection) -> netro::Result<()> {
/// let deleted = conn
///     .create_command("DELETE FROM orders WHERE status = ?")
///     .bind("void")
///     .execute_non_query()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct Command<'c> {
    conn: &'c mut Connection,
    sql: String,
    params: Vec<String>,
    timeout: Option<Duration>,
    rows_affected: Option<i64>,
}

impl<'c> Command<'c> {
    pub fn new(conn: &'c mut Connection, sql: impl Into<String>) -> Self {
        Self { conn, sql: sql.into(), params: vec![], timeout: None, rows_affected: None }
    }

    /// Override the connection command timeout, zero means no timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Bind value to the next `?` placeholder.
    ///
    /// Values are rendered as SQL literals on the client, placeholders inside
    /// quotes and comments are left alone.
    pub fn bind<E: Encode>(mut self, value: E) -> Self {
        let mut literal = String::new();
        value.encode(&mut literal);
        self.params.push(literal);
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Rows affected by the last execution, `-1` if unknown.
    pub fn rows_affected(&self) -> i64 {
        self.rows_affected.unwrap_or(-1)
    }

    /// Handle to cancel this command from another task.
    pub fn canceller(&self) -> Option<Canceller> {
        self.conn.canceller()
    }

    /// Request cancellation of the running statement on this connection.
    pub async fn cancel(&self) -> Result<()> {
        self.conn.cancel().await
    }

    /// Execute and wait for every statement to complete.
    pub async fn execute(&mut self) -> Result<RowResult> {
        let mut reader = self.execute_reader().await?;
        while reader.next_result().await? { }
        let result = reader.row_result();

        self.rows_affected = result.dml().then_some(result.rows_affected as i64);
        Ok(result)
    }

    /// Execute and returns the number of rows affected by DML statements.
    ///
    /// Returns `-1` if no statement reported affected rows.
    pub async fn execute_non_query(&mut self) -> Result<i64> {
        self.execute().await?;
        Ok(self.rows_affected())
    }

    /// Execute and returns the first column of the first row, or [`Value::Null`].
    pub async fn execute_scalar(&mut self) -> Result<Value> {
        let mut reader = self.execute_reader().await?;
        let value = match reader.read().await? {
            true if reader.field_count() > 0 => reader.get_value(0)?,
            _ => Value::Null,
        };
        reader.close().await?;
        Ok(value)
    }

    /// Execute and returns reader positioned at the first result.
    ///
    /// The reader must be closed or fully read before the connection accepts
    /// the next command, otherwise the rest is drained then.
    pub async fn execute_reader(&mut self) -> Result<ResultReader<'_>> {
        let sql = self.prepare()?;
        self.rows_affected = None;

        let deadline = self.conn.deadline(self.timeout);
        self.conn.send_query(&sql).await?;
        ResultReader::begin(self.conn, deadline).await
    }

    /// Substitute bound parameters.
    fn prepare(&self) -> Result<String> {
        span!("prepare");

        if self.sql.trim().is_empty() {
            return Err(EmptyQueryError.into());
        }
        let sql = bind_params(&self.sql, &self.params)?;
        verbose!("bound {} parameters", self.params.len());
        Ok(sql)
    }
}

impl fmt::Debug for Command<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("sql", &self.sql)
            .field("params", &self.params.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Replace `?` outside of quotes and comments with `params` in order.
fn bind_params(sql: &str, params: &[String]) -> Result<String, ParseError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Scan {
        Code,
        Quote,
        Ident,
        LineComment,
        BlockComment,
    }

    let mut out = String::with_capacity(sql.len() + params.iter().map(String::len).sum::<usize>());
    let total = params.len();
    let mut params = params.iter();
    let mut placeholders = 0;
    let mut scan = Scan::Code;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match (scan, c) {
            (Scan::Code, '?') => {
                placeholders += 1;
                if let Some(param) = params.next() {
                    out.push_str(param);
                }
                continue;
            },
            (Scan::Code, '\'') => scan = Scan::Quote,
            (Scan::Code, '"') => scan = Scan::Ident,
            (Scan::Code, '-') if chars.peek() == Some(&'-') => scan = Scan::LineComment,
            (Scan::Code, '/') if chars.peek() == Some(&'*') => {
                out.push(c);
                out.extend(chars.next());
                scan = Scan::BlockComment;
                continue;
            },
            (Scan::Quote, '\'') | (Scan::Ident, '"') => scan = Scan::Code,
            (Scan::LineComment, '\n') => scan = Scan::Code,
            (Scan::BlockComment, '*') if chars.peek() == Some(&'/') => {
                out.push(c);
                out.extend(chars.next());
                scan = Scan::Code;
                continue;
            },
            _ => { },
        }
        out.push(c);
    }

    if placeholders != total {
        return Err(ParseError::new(format!(
            "expected {placeholders} parameters, found {total}",
        )));
    }

    Ok(out)
}

unit_error! {
    /// Command text is empty.
    pub struct EmptyQueryError("query is empty");
}

// ===== Encode =====

/// A type that can be rendered as SQL literal.
pub trait Encode {
    /// Write the literal to `buf`.
    fn encode(&self, buf: &mut String);
}

impl<T: Encode + ?Sized> Encode for &T {
    fn encode(&self, buf: &mut String) {
        T::encode(self, buf)
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode(&self, buf: &mut String) {
        match self {
            Some(value) => value.encode(buf),
            None => buf.push_str("NULL"),
        }
    }
}

macro_rules! encode_int {
    ($($ty:ty),*) => {$(
        impl Encode for $ty {
            fn encode(&self, buf: &mut String) {
                buf.push_str(itoa::Buffer::new().format(*self));
            }
        }
    )*};
}

encode_int!(i8, i16, i32, i64, u8, u16, u32, u64);

macro_rules! encode_float {
    ($($ty:ty),*) => {$(
        impl Encode for $ty {
            fn encode(&self, buf: &mut String) {
                match self.is_finite() {
                    true => buf.push_str(&self.to_string()),
                    false => {
                        buf.push('\'');
                        buf.push_str(&self.to_string());
                        buf.push('\'');
                    },
                }
            }
        }
    )*};
}

encode_float!(f32, f64);

impl Encode for bool {
    fn encode(&self, buf: &mut String) {
        buf.push_str(if *self { "TRUE" } else { "FALSE" });
    }
}

impl Encode for str {
    fn encode(&self, buf: &mut String) {
        buf.reserve(self.len() + 2);
        buf.push('\'');
        for c in self.chars() {
            if c == '\'' {
                buf.push('\'');
            }
            buf.push(c);
        }
        buf.push('\'');
    }
}

impl Encode for String {
    fn encode(&self, buf: &mut String) {
        self.as_str().encode(buf)
    }
}

macro_rules! encode_display {
    ($($ty:ty),*) => {$(
        impl Encode for $ty {
            fn encode(&self, buf: &mut String) {
                Value::from(*self).to_string().as_str().encode(buf)
            }
        }
    )*};
}

encode_display!(Date, Time, PrimitiveDateTime, Uuid);

impl Encode for Value {
    fn encode(&self, buf: &mut String) {
        match self {
            Value::Null => buf.push_str("NULL"),
            Value::Bool(b) => b.encode(buf),
            Value::Int(n) => n.encode(buf),
            Value::BigInt(n) => n.encode(buf),
            Value::Number(n) => n.encode(buf),
            Value::Decimal(d) => buf.push_str(d),
            Value::Bytes(b) => {
                buf.push_str("x'");
                for b in b.iter() {
                    buf.push_str(&format!("{b:02x}"));
                }
                buf.push('\'');
            },
            other => other.to_string().as_str().encode(buf),
        }
    }
}

// ===== Result =====

/// Command tag of a completed statement, e.g. `INSERT 0 5`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTag {
    tag: String,
}

impl CommandTag {
    pub(crate) fn new(tag: String) -> Self {
        Self { tag }
    }

    pub fn as_str(&self) -> &str {
        &self.tag
    }

    /// The command keyword, e.g. `INSERT`.
    pub fn command(&self) -> &str {
        self.tag.split_whitespace().next().unwrap_or_default()
    }

    /// Number of rows reported in the tag.
    pub fn rows(&self) -> Option<u64> {
        let mut whs = self.tag.split_whitespace();
        let tag = whs.next()?;
        let rows = whs.next()?;
        let rows = match tag {
            "INSERT" => whs.next()?,
            "SELECT" | "UPDATE" | "DELETE" | "MERGE" | "FETCH" | "MOVE" | "COPY" => rows,
            _ => return None,
        };
        rows.parse().ok()
    }

    /// Returns `true` for data modifying statement.
    pub fn is_dml(&self) -> bool {
        matches!(self.command(), "INSERT" | "UPDATE" | "DELETE" | "MERGE")
    }
}

impl fmt::Display for CommandTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag)
    }
}

/// Query result with its rows affected.
#[derive(Debug, Clone, Default)]
pub struct RowResult {
    /// Sum of rows affected by data modifying statements.
    pub rows_affected: u64,
    /// Tag of every completed statement in order.
    pub tags: Vec<CommandTag>,
}

impl RowResult {
    pub(crate) fn new(tags: Vec<CommandTag>) -> Self {
        let rows_affected = tags
            .iter()
            .filter(|tag| tag.is_dml())
            .filter_map(CommandTag::rows)
            .sum();
        Self { rows_affected, tags }
    }

    /// Returns `true` if any statement modified data.
    pub fn dml(&self) -> bool {
        self.tags.iter().any(CommandTag::is_dml)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use time::macros::date;

    fn literal<E: Encode>(value: E) -> String {
        let mut buf = String::new();
        value.encode(&mut buf);
        buf
    }

    #[test]
    fn literals() {
        assert_eq!(literal(42), "42");
        assert_eq!(literal("it's"), "'it''s'");
        assert_eq!(literal(None::<i32>), "NULL");
        assert_eq!(literal(true), "TRUE");
        assert_eq!(literal(1.5), "1.5");
        assert_eq!(literal(f64::NAN), "'NaN'");
        assert_eq!(literal(date!(2024-01-05)), "'2024-01-05'");
        assert_eq!(literal(Value::Bytes(bytes::Bytes::from_static(b"\x0a\xff"))), "x'0aff'");
    }

    #[test]
    fn placeholders() {
        let params = ["1".to_string(), "'x'".to_string()];
        let sql = bind_params("SELECT ? , '?' -- ?\n, /* ? */ \"a?\", ?", &params).unwrap();
        assert_eq!(sql, "SELECT 1 , '?' -- ?\n, /* ? */ \"a?\", 'x'");

        assert!(bind_params("SELECT ?", &[]).is_err());
        assert!(bind_params("SELECT 1", &params[..1]).is_err());
    }

    #[test]
    fn command_tags() {
        let tags = ["INSERT 0 5", "DELETE 3", "SELECT 10", "CREATE TABLE"]
            .map(|t| CommandTag::new(t.into()))
            .to_vec();
        assert_eq!(tags[0].rows(), Some(5));
        assert_eq!(tags[3].rows(), None);
        assert_eq!(tags[3].command(), "CREATE");

        let result = RowResult::new(tags);
        assert_eq!(result.rows_affected, 8);
        assert!(result.dml());
        assert!(!RowResult::new(vec![CommandTag::new("SELECT 1".into())]).dml());
    }
}
