//! Streaming result reader.
//!
//! One request may contain several statements, each producing a sub-result.
//! [`ResultReader`] is positioned at the first sub-result when returned, rows
//! of the current sub-result are read with [`ResultReader::read`], and
//! [`ResultReader::next_result`] moves to the next sub-result.
use bytes::Bytes;
use futures_core::{Stream, future::LocalBoxFuture};
use std::{
    fmt,
    pin::Pin,
    task::{Context, Poll, ready},
};
use tokio::time::Instant;

use crate::{
    Error, Result,
    command::{CommandTag, RowResult},
    common::{debug, verbose},
    connection::Connection,
    descriptor::{self, FieldDescription, TupleDescriptor},
    netezza::{BackendMessage, ErrorResponse, NzType, Oid, ProtocolError, oid},
    types::{
        Value, ValueKind,
        convert::{decode_dbos, decode_text},
        numeric,
    },
};

/// Reader over the results of one command.
///
/// Holds the connection exclusively until dropped. Dropping the reader
/// before the response is fully read leaves the rest to be drained by the
/// next command.
pub struct ResultReader<'c> {
    conn: &'c mut Connection,
    deadline: Option<Instant>,
    columns: Vec<FieldDescription>,
    tuple: Option<TupleDescriptor>,
    /// Raw values of the current row.
    row: Vec<Option<Bytes>>,
    /// Current row came from a DBOS tuple.
    binary: bool,
    peeked: Option<BackendMessage>,
    has_rows: bool,
    in_rows: bool,
    tags: Vec<CommandTag>,
    done: bool,
}

impl<'c> ResultReader<'c> {
    /// Read up to the first sub-result.
    pub(crate) async fn begin(conn: &'c mut Connection, deadline: Option<Instant>) -> Result<Self> {
        let mut me = Self {
            conn,
            deadline,
            columns: vec![],
            tuple: None,
            row: vec![],
            binary: false,
            peeked: None,
            has_rows: false,
            in_rows: false,
            tags: vec![],
            done: false,
        };
        me.begin_result().await?;
        Ok(me)
    }

    /// Returns `true` if the current sub-result has at least one row.
    ///
    /// Known before the first [`read`][ResultReader::read], and not changed
    /// by reading.
    pub fn has_rows(&self) -> bool {
        self.has_rows
    }

    /// Number of columns in the current sub-result.
    pub fn field_count(&self) -> usize {
        self.columns.len()
    }

    /// Columns of the current sub-result.
    pub fn column_descriptions(&self) -> &[FieldDescription] {
        &self.columns
    }

    /// DBOS tuple descriptor of the current sub-result, if rows are binary.
    pub fn tuple_descriptor(&self) -> Option<&TupleDescriptor> {
        self.tuple.as_ref()
    }

    /// Tags of statements completed so far.
    pub fn tags(&self) -> &[CommandTag] {
        &self.tags
    }

    /// Rows affected by data modifying statements completed so far.
    pub fn records_affected(&self) -> u64 {
        self.row_result().rows_affected
    }

    pub(crate) fn row_result(&self) -> RowResult {
        RowResult::new(self.tags.clone())
    }

    /// Advance to the next row of the current sub-result.
    ///
    /// Returns `false` at the end of the sub-result, it does not move to the
    /// next one.
    pub async fn read(&mut self) -> Result<bool> {
        self.row.clear();
        if !self.in_rows {
            return Ok(false);
        }

        loop {
            match self.next_msg().await? {
                BackendMessage::DataRow(row) => {
                    let row = descriptor::split_data_row(row.body, self.columns.len());
                    self.row = self.protocol(row)?;
                    self.binary = false;
                    return Ok(true);
                },
                BackendMessage::DbosTuple(tuple) => {
                    let row = match &self.tuple {
                        Some(desc) => desc.split(&tuple.body),
                        None => Err(ProtocolError::malformed("tuple without descriptor")),
                    };
                    self.row = self.protocol(row)?;
                    self.binary = true;
                    return Ok(true);
                },
                BackendMessage::DbosDescriptor(desc) => {
                    let desc = TupleDescriptor::parse(&desc.body, &self.columns);
                    self.tuple = Some(self.protocol(desc)?);
                },
                BackendMessage::CommandComplete(cmd) => {
                    verbose!("(B) {cmd:?}");
                    self.tags.push(CommandTag::new(cmd.tag));
                    self.in_rows = false;
                    return Ok(false);
                },
                BackendMessage::ReadyForQuery(_) => {
                    self.done = true;
                    self.in_rows = false;
                    return Ok(false);
                },
                BackendMessage::ErrorResponse(err) => return Err(self.fail(err).await),
                msg => {
                    let err = msg.unexpected("row read");
                    return Err(self.conn.fault(err.into()));
                },
            }
        }
    }

    /// Advance to the next sub-result, skipping unread rows.
    ///
    /// Returns `false` when no sub-result remains.
    pub async fn next_result(&mut self) -> Result<bool> {
        while self.in_rows {
            self.read().await?;
        }
        self.begin_result().await
    }

    /// Decoded value of column `i` in the current row.
    pub fn get_value(&self, i: usize) -> Result<Value> {
        let Some(raw) = self.row.get(i) else {
            return Err(IndexError { index: i, len: self.row.len() }.into());
        };
        let Some(raw) = raw else {
            return Ok(Value::Null);
        };

        let value = match (&self.tuple, self.binary) {
            (Some(tuple), true) => {
                let column_oid = self.columns.get(i).map(|c| c.oid);
                decode_dbos(&tuple.fields[i], column_oid, raw)
            },
            _ => decode_text(&self.columns[i], raw),
        };
        Ok(value?)
    }

    /// Decoded values of the current row.
    pub fn values(&self) -> Result<Vec<Value>> {
        (0..self.row.len()).map(|i| self.get_value(i)).collect()
    }

    /// Stream of the remaining rows in the current sub-result.
    pub fn rows(&mut self) -> Rows<'_, 'c> {
        Rows { reader: Some(self), next: None }
    }

    /// One row per column of the current sub-result.
    pub fn get_schema_table(&self) -> Vec<SchemaRow> {
        self.columns
            .iter()
            .enumerate()
            .map(|(ordinal, column)| {
                let field = self.tuple.as_ref().and_then(|t| t.fields.get(ordinal));
                SchemaRow::new(ordinal, column, field.map(|f| (f.nz_type, f.size)))
            })
            .collect()
    }

    /// Read the rest of the response.
    ///
    /// Errors of the remaining statements are returned.
    pub async fn close(&mut self) -> Result<()> {
        while self.next_result().await? { }
        Ok(())
    }

    // ===== Internal =====

    async fn begin_result(&mut self) -> Result<bool> {
        self.columns.clear();
        self.tuple = None;
        self.row.clear();
        self.has_rows = false;
        self.in_rows = false;

        if self.done {
            return Ok(false);
        }

        loop {
            match self.next_msg().await? {
                BackendMessage::RowDescription(desc) => {
                    self.columns = self.protocol(FieldDescription::parse(desc))?;

                    let mut next = self.next_msg().await?;
                    if let BackendMessage::DbosDescriptor(desc) = next {
                        let desc = TupleDescriptor::parse(&desc.body, &self.columns);
                        self.tuple = Some(self.protocol(desc)?);
                        next = self.next_msg().await?;
                    }

                    // run-time failure after the statement was described
                    if let BackendMessage::ErrorResponse(err) = next {
                        self.columns.clear();
                        self.tuple = None;
                        return Err(self.fail(err).await);
                    }

                    self.has_rows = matches!(next, BackendMessage::DataRow(_) | BackendMessage::DbosTuple(_));
                    self.peeked = Some(next);
                    self.in_rows = true;
                    return Ok(true);
                },
                BackendMessage::CommandComplete(cmd) => {
                    verbose!("(B) {cmd:?}");
                    self.tags.push(CommandTag::new(cmd.tag));
                    return Ok(true);
                },
                BackendMessage::EmptyQueryResponse(_) => return Ok(true),
                BackendMessage::ReadyForQuery(_) => {
                    self.done = true;
                    return Ok(false);
                },
                BackendMessage::ErrorResponse(err) => return Err(self.fail(err).await),
                msg => {
                    let err = msg.unexpected("result");
                    return Err(self.conn.fault(err.into()));
                },
            }
        }
    }

    async fn next_msg(&mut self) -> Result<BackendMessage> {
        match self.peeked.take() {
            Some(msg) => Ok(msg),
            None => {
                let result = self.conn.recv(self.deadline).await;
                if result.is_err() {
                    self.done = true;
                    self.in_rows = false;
                }
                result
            },
        }
    }

    /// Statement failed, the rest of the batch is aborted.
    async fn fail(&mut self, err: ErrorResponse) -> Error {
        debug!("statement failed: {err}");
        self.done = true;
        self.in_rows = false;
        self.row.clear();

        if let Err(drain) = self.conn.drain().await {
            return drain;
        }
        err.into()
    }

    /// Malformed message, the connection is unusable.
    fn protocol<T>(&mut self, result: Result<T, ProtocolError>) -> Result<T> {
        result.map_err(|err| {
            self.done = true;
            self.in_rows = false;
            self.conn.fault(err.into())
        })
    }
}

impl fmt::Debug for ResultReader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultReader")
            .field("columns", &self.columns)
            .field("has_rows", &self.has_rows)
            .field("in_rows", &self.in_rows)
            .field("tags", &self.tags)
            .field("done", &self.done)
            .finish()
    }
}

/// Stream of decoded rows, returned from [`ResultReader::rows`].
#[must_use = "streams do nothing unless polled"]
pub struct Rows<'r, 'c> {
    reader: Option<&'r mut ResultReader<'c>>,
    next: Option<LocalBoxFuture<'r, (&'r mut ResultReader<'c>, Result<Option<Vec<Value>>>)>>,
}

impl<'r, 'c> Stream for Rows<'r, 'c> {
    type Item = Result<Vec<Value>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let me = self.get_mut();

        if me.next.is_none() {
            let Some(reader) = me.reader.take() else {
                return Poll::Ready(None);
            };
            me.next = Some(Box::pin(async move {
                let row = match reader.read().await {
                    Ok(true) => reader.values().map(Some),
                    Ok(false) => Ok(None),
                    Err(err) => Err(err),
                };
                (reader, row)
            }));
        }

        let Some(next) = me.next.as_mut() else {
            return Poll::Ready(None);
        };
        let (reader, row) = ready!(next.as_mut().poll(cx));
        me.next = None;

        match row {
            Ok(Some(values)) => {
                me.reader = Some(reader);
                Poll::Ready(Some(Ok(values)))
            },
            Ok(None) => Poll::Ready(None),
            Err(err) => Poll::Ready(Some(Err(err))),
        }
    }
}

impl fmt::Debug for Rows<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rows").field("pending", &self.next.is_some()).finish()
    }
}

/// Column metadata returned from [`ResultReader::get_schema_table`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SchemaRow {
    pub name: String,
    pub ordinal: usize,
    pub kind: ValueKind,
    pub type_oid: Oid,
    /// DBOS type code, only known when rows are binary.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub nz_type: Option<NzType>,
    pub precision: Option<u8>,
    pub scale: Option<u8>,
    /// Character length, `-1` if unbounded or not a character column.
    pub column_size: i32,
    /// Always `true`, not null constraint is not reported by the server.
    pub nullable: bool,
}

impl SchemaRow {
    fn new(ordinal: usize, column: &FieldDescription, field: Option<(NzType, i32)>) -> Self {
        let kind = match field {
            Some((nz_type, _)) => ValueKind::of_dbos(nz_type),
            None => ValueKind::of_oid(column.oid),
        };

        let (precision, scale) = match field {
            Some((NzType::Numeric, size)) => {
                let (p, s) = descriptor::numeric_size(size);
                (Some(p), Some(s))
            },
            _ if column.oid == oid::NUMERIC => match numeric::typmod(column.modifier) {
                Some((p, s)) => (Some(p), Some(s)),
                None => (None, None),
            },
            _ => (None, None),
        };

        let column_size = match column.oid {
            oid::BPCHAR | oid::VARCHAR | oid::NCHAR | oid::NVARCHAR if column.modifier > 4 => {
                column.modifier - 4
            },
            oid::BPCHAR | oid::VARCHAR | oid::NCHAR | oid::NVARCHAR if column.size > 0 => {
                i32::from(column.size)
            },
            _ => -1,
        };

        Self {
            name: column.name.clone(),
            ordinal,
            kind,
            type_oid: column.oid,
            nz_type: field.map(|(nz_type, _)| nz_type),
            precision,
            scale,
            column_size,
            nullable: true,
        }
    }
}

/// Column index out of range of the current row.
pub struct IndexError {
    index: usize,
    len: usize,
}

impl IndexError {
    pub fn index(&self) -> usize {
        self.index
    }
}

impl std::error::Error for IndexError { }

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "column index {} out of range for row of {} columns", self.index, self.len)
    }
}

impl fmt::Debug for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
