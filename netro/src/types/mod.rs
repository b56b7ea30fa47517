//! Value decoding.
//!
//! - [`Value`], a decoded column value
//! - [`convert`], pure decoders from raw column bytes
//! - [`numeric`], fixed point numeric
//! - [`DecodeError`]
use std::{borrow::Cow, fmt};

use crate::netezza::{NzType, Oid, ProtocolError};

pub mod convert;
pub mod numeric;
mod value;

pub use value::{Value, ValueKind};

/// Type of the column that failed to decode.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Source {
    Dbos(NzType),
    Oid(Oid),
}

/// An error when decoding a column value.
pub struct DecodeError {
    source: Source,
    reason: Cow<'static, str>,
}

impl DecodeError {
    pub(crate) fn new(ty: NzType, reason: impl Into<Cow<'static, str>>) -> Self {
        Self { source: Source::Dbos(ty), reason: reason.into() }
    }

    pub(crate) fn text(oid: Oid, reason: impl Into<Cow<'static, str>>) -> Self {
        Self { source: Source::Oid(oid), reason: reason.into() }
    }

    /// Map a short read inside a field of type `ty`.
    pub(crate) fn protocol(ty: NzType) -> impl Fn(ProtocolError) -> DecodeError {
        move |err| Self::new(ty, err.to_string())
    }

    /// Returns the decoding failure reason.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl std::error::Error for DecodeError { }

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source {
            Source::Dbos(ty) => write!(f, "failed to decode `{ty:?}`: {}", self.reason),
            Source::Oid(oid) => write!(f, "failed to decode oid `{oid}`: {}", self.reason),
        }
    }
}

impl fmt::Debug for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
