//! Checked primitive reads over a byte buffer.
//!
//! The protocol headers and lengths are big-endian, while the DBOS tuple
//! payload produced by the data slices is little-endian. Both live here so
//! the asymmetry is explicit at every call site.
//!
//! Unlike [`bytes::Buf`], every read here is bounds checked and returns
//! [`ProtocolError`] instead of panicking, because the input comes from the
//! network.
use crate::netezza::ProtocolError;

/// Cursor over a borrowed slice with checked big and little endian reads.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

macro_rules! reads {
    ($($be:ident, $le:ident => $ty:ty;)*) => {$(
        /// Read big-endian value.
        pub fn $be(&mut self) -> Result<$ty, ProtocolError> {
            let bytes = self.take(size_of::<$ty>())?;
            Ok(<$ty>::from_be_bytes(bytes.try_into().expect("length checked")))
        }

        /// Read little-endian value.
        pub fn $le(&mut self) -> Result<$ty, ProtocolError> {
            let bytes = self.take(size_of::<$ty>())?;
            Ok(<$ty>::from_le_bytes(bytes.try_into().expect("length checked")))
        }
    )*};
}

impl<'a> ByteReader<'a> {
    /// Create reader at the start of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current position from the start of the buffer.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Remaining unread bytes.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Move the cursor to absolute position.
    pub fn seek(&mut self, pos: usize) -> Result<(), ProtocolError> {
        if pos > self.buf.len() {
            return Err(ProtocolError::short(pos, self.buf.len()));
        }
        self.pos = pos;
        Ok(())
    }

    /// Take the next `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        let end = self.pos.checked_add(n).ok_or(ProtocolError::short(usize::MAX, self.buf.len()))?;
        let Some(slice) = self.buf.get(self.pos..end) else {
            return Err(ProtocolError::short(end, self.buf.len()));
        };
        self.pos = end;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    reads! {
        i16_be, i16_le => i16;
        u16_be, u16_le => u16;
        i32_be, i32_le => i32;
        u32_be, u32_le => u32;
        i64_be, i64_le => i64;
        f32_be, f32_le => f32;
        f64_be, f64_le => f64;
    }
}

/// Borrow `len` bytes at `offset`.
pub fn slice(buf: &[u8], offset: usize, len: usize) -> Result<&[u8], ProtocolError> {
    let mut r = ByteReader::new(buf);
    r.seek(offset)?;
    r.take(len)
}

macro_rules! read_at {
    ($($name:ident => $ty:ty, $from:ident;)*) => {$(
        #[doc = concat!("Read `", stringify!($ty), "` at `offset` using `", stringify!($from), "`.")]
        pub fn $name(buf: &[u8], offset: usize) -> Result<$ty, ProtocolError> {
            let bytes = slice(buf, offset, size_of::<$ty>())?;
            Ok(<$ty>::$from(bytes.try_into().expect("length checked")))
        }
    )*};
}

read_at! {
    read_i8 => i8, from_le_bytes;
    read_i16_le => i16, from_le_bytes;
    read_i32_le => i32, from_le_bytes;
    read_u32_le => u32, from_le_bytes;
    read_i64_le => i64, from_le_bytes;
    read_f32_le => f32, from_le_bytes;
    read_f64_le => f64, from_le_bytes;
    read_i16_be => i16, from_be_bytes;
    read_i32_be => i32, from_be_bytes;
    read_i64_be => i64, from_be_bytes;
    read_f32_be => f32, from_be_bytes;
    read_f64_be => f64, from_be_bytes;
}
