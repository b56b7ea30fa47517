//! Column layout of a result set.
//!
//! Every result set starts with a [`RowDescription`] which names the columns.
//! When the server streams rows in the binary DBOS format, it follows up with
//! a [`DbosDescriptor`] describing the physical record layout, parsed here
//! into [`TupleDescriptor`].
//!
//! [`RowDescription`]: crate::netezza::backend::RowDescription
//! [`DbosDescriptor`]: crate::netezza::backend::DbosDescriptor
use bytes::{Buf, Bytes};

use crate::{
    codec::{ByteReader, slice},
    ext::BytesExt,
    netezza::{NzType, Oid, ProtocolError, backend::RowDescription, oid},
};

/// `oid | size | modifier | format` after the column name.
const FIELD_SUFFIX: usize = size_of::<u32>() + size_of::<i16>() + size_of::<i32>() + size_of::<u8>();

/// Column as reported in `RowDescription`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescription {
    /// Column name.
    pub name: String,
    /// Type oid.
    pub oid: Oid,
    /// Declared type size, negative for varying size.
    pub size: i16,
    /// Type modifier, e.g. `VARCHAR(n)` length or numeric precision and scale.
    pub modifier: i32,
    /// Zero for text, one for binary.
    pub format: u8,
}

impl FieldDescription {
    /// Parse all columns from a `RowDescription` message.
    pub fn parse(desc: RowDescription) -> Result<Vec<FieldDescription>, ProtocolError> {
        let RowDescription { field_len, mut body } = desc;
        let mut fields = Vec::with_capacity(field_len as usize);

        for _ in 0..field_len {
            let name = body.get_nul_string()?;
            if body.remaining() < FIELD_SUFFIX {
                return Err(ProtocolError::short(FIELD_SUFFIX, body.remaining()));
            }
            fields.push(FieldDescription {
                name,
                oid: body.get_u32(),
                size: body.get_i16(),
                modifier: body.get_i32(),
                format: body.get_u8(),
            });
        }

        Ok(fields)
    }
}

/// Header of a DBOS tuple descriptor, nine big-endian `i32`.
const HEADER_LEN: usize = 9 * size_of::<i32>();

/// One field record in a DBOS tuple descriptor, nine big-endian `i32`.
const FIELD_LEN: usize = 9 * size_of::<i32>();

/// Physical layout of one field in a DBOS record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbosField {
    pub nz_type: NzType,
    /// Declared size, for numeric the precision in the high byte and scale in the low byte.
    pub size: i32,
    /// Storage size in bytes.
    pub true_size: i32,
    /// Byte offset from the start of the record.
    pub offset: i32,
    pub phys_field: i32,
    pub log_field: i32,
    pub nulls_allowed: bool,
    pub fixed_size: bool,
    pub spring_field: bool,
}

impl DbosField {
    /// Numeric `(precision, scale)` from the declared size.
    pub fn precision_scale(&self) -> (u8, u8) {
        numeric_size(self.size)
    }
}

/// Split numeric declared size into `(precision, scale)`.
pub fn numeric_size(size: i32) -> (u8, u8) {
    (((size >> 8) & 0xFF) as u8, (size & 0xFF) as u8)
}

/// Parsed DBOS tuple descriptor.
///
/// The descriptor is immutable once parsed, a new one is parsed for every
/// result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleDescriptor {
    pub version: i32,
    pub nulls_allowed: bool,
    pub size_word: i32,
    pub size_word_size: i32,
    pub num_fixed_fields: i32,
    pub num_varying_fields: i32,
    pub fixed_fields_size: i32,
    pub max_record_size: i32,
    pub fields: Vec<DbosField>,
    pub date_style: i32,
    pub euro_dates: bool,
    /// Field indexes of varying fields in physical order.
    varying: Vec<usize>,
}

impl TupleDescriptor {
    /// Parse descriptor body.
    ///
    /// `columns` is the preceding `RowDescription`, used to correct `INT4`
    /// fields that actually carry `abstime`.
    pub fn parse(body: &[u8], columns: &[FieldDescription]) -> Result<TupleDescriptor, ProtocolError> {
        if body.len() < HEADER_LEN {
            return Err(ProtocolError::short(HEADER_LEN, body.len()));
        }

        let mut r = ByteReader::new(body);
        let version = r.i32_be()?;
        let nulls_allowed = r.i32_be()? != 0;
        let size_word = r.i32_be()?;
        let size_word_size = r.i32_be()?;
        let num_fixed_fields = r.i32_be()?;
        let num_varying_fields = r.i32_be()?;
        let fixed_fields_size = r.i32_be()?;
        let max_record_size = r.i32_be()?;
        let num_fields = r.i32_be()?;

        let Ok(num_fields) = usize::try_from(num_fields) else {
            return Err(ProtocolError::malformed("negative field count in tuple descriptor"));
        };
        if r.remaining() < num_fields.saturating_mul(FIELD_LEN) {
            return Err(ProtocolError::short(HEADER_LEN + num_fields * FIELD_LEN, body.len()));
        }

        let mut fields = Vec::with_capacity(num_fields);
        for i in 0..num_fields {
            let mut nz_type = NzType::from_code(r.i32_be()?);
            let field = DbosField {
                nz_type,
                size: r.i32_be()?,
                true_size: r.i32_be()?,
                offset: r.i32_be()?,
                phys_field: r.i32_be()?,
                log_field: r.i32_be()?,
                nulls_allowed: r.i32_be()? != 0,
                fixed_size: r.i32_be()? != 0,
                spring_field: r.i32_be()? != 0,
            };

            // server reports abstime as plain int4, only the column oid tells
            if nz_type == NzType::Int && columns.get(i).is_some_and(|c| c.oid == oid::ABSTIME) {
                nz_type = NzType::AbsTime;
            }

            fields.push(DbosField { nz_type, ..field });
        }

        let date_style = r.i32_be()?;
        let euro_dates = r.i32_be()? != 0;

        let mut varying: Vec<usize> = (0..fields.len()).filter(|&i| !fields[i].fixed_size).collect();
        varying.sort_by_key(|&i| fields[i].phys_field);

        Ok(TupleDescriptor {
            version,
            nulls_allowed,
            size_word,
            size_word_size,
            num_fixed_fields,
            num_varying_fields,
            fixed_fields_size,
            max_record_size,
            fields,
            date_style,
            euro_dates,
            varying,
        })
    }

    pub fn field_len(&self) -> usize {
        self.fields.len()
    }

    /// Null bitmap length in bytes.
    fn bitmap_len(&self) -> usize {
        self.fields.len().div_ceil(8)
    }

    /// Returns `true` if field `i` is NULL in `record`.
    ///
    /// The bitmap follows the size word, least significant bit first, and is
    /// indexed by physical field.
    fn is_null(&self, record: &[u8], i: usize) -> Result<bool, ProtocolError> {
        if !self.nulls_allowed {
            return Ok(false);
        }
        let phys = self.fields[i].phys_field as usize;
        let bitmap = slice(record, self.size_word_size as usize, self.bitmap_len())?;
        let Some(&byte) = bitmap.get(phys / 8) else {
            return Err(ProtocolError::malformed("physical field outside null bitmap"));
        };
        Ok(byte >> (phys % 8) & 1 == 1)
    }

    /// Split one DBOS record into raw field values in column order.
    ///
    /// Fixed fields are sliced at their offset with their true size.
    /// Varying fields are laid out in physical order from the first varying
    /// field offset, each prefixed with a little-endian `u16` length that
    /// includes the prefix, padded to an even length. NULL varying fields
    /// take no space.
    pub fn split(&self, record: &Bytes) -> Result<Vec<Option<Bytes>>, ProtocolError> {
        let mut values = vec![None; self.fields.len()];
        let mut nulls = Vec::with_capacity(self.fields.len());

        for i in 0..self.fields.len() {
            nulls.push(self.is_null(record, i)?);
        }

        for (i, field) in self.fields.iter().enumerate() {
            if nulls[i] || !field.fixed_size {
                continue;
            }
            let offset = field.offset as usize;
            let len = field.true_size as usize;
            slice(record, offset, len)?;
            values[i] = Some(record.slice(offset..offset + len));
        }

        let Some(&first) = self.varying.first() else {
            return Ok(values);
        };

        let mut r = ByteReader::new(record);
        r.seek(self.fields[first].offset as usize)?;

        for &i in &self.varying {
            if nulls[i] {
                continue;
            }
            let len = r.u16_le()? as usize;
            let Some(data_len) = len.checked_sub(size_of::<u16>()) else {
                return Err(ProtocolError::malformed("varying field length shorter than its prefix"));
            };
            let start = r.position();
            r.take(data_len)?;
            values[i] = Some(record.slice(start..start + data_len));
            if len % 2 == 1 && r.remaining() > 0 {
                r.take(1)?;
            }
        }

        Ok(values)
    }
}

/// Split a text `DataRow` body into raw field values.
///
/// The body starts with a null bitmap, most significant bit first, where a
/// set bit means the value is present. Each present value is prefixed with a
/// big-endian `i32` length that includes the prefix.
pub fn split_data_row(mut body: Bytes, field_len: usize) -> Result<Vec<Option<Bytes>>, ProtocolError> {
    let bitmap_len = field_len.div_ceil(8);
    if body.remaining() < bitmap_len {
        return Err(ProtocolError::short(bitmap_len, body.remaining()));
    }
    let bitmap = body.split_to(bitmap_len);

    let mut values = Vec::with_capacity(field_len);
    for i in 0..field_len {
        let present = bitmap[i / 8] & (0x80 >> (i % 8)) != 0;
        if !present {
            values.push(None);
            continue;
        }
        if body.remaining() < 4 {
            return Err(ProtocolError::short(4, body.remaining()));
        }
        let len = body.get_i32();
        let Some(len) = usize::try_from(len).ok().and_then(|len| len.checked_sub(4)) else {
            return Err(ProtocolError::malformed("negative field length in data row"));
        };
        if body.remaining() < len {
            return Err(ProtocolError::short(len, body.remaining()));
        }
        values.push(Some(body.split_to(len)));
    }

    Ok(values)
}
