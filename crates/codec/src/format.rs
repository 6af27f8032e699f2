//! Object blob encoder and decoder.
//!
//! ```text
//! [object_id: u32][attribute_count: i32]
//! repeat attribute_count times:
//!   [size: i32][attribute_number: i32][raw_bytes: size]
//! ```

use byteorder::{ByteOrder, NativeEndian};
use bytes::Bytes;
use thiserror::Error;

use crate::record::{AttributeRecord, ObjectRecord};

/// Size of the object header: `object_id (u32) + attribute_count (i32)`.
pub const OBJ_HEADER_SIZE: usize = 4 + 4;

/// Size of each attribute header: `size (i32) + attribute_number (i32)`.
pub const ATTR_HEADER_SIZE: usize = 4 + 4;

/// Largest blob the pipeline will build for one object.
///
/// Keeps every `i32` size field in range and each blob well inside the file
/// store's record limit. The pipeline refuses attribute writes that would
/// grow an object past it.
pub const MAX_BLOB_SIZE: usize = 16 * 1024 * 1024;

/// Errors produced while decoding a blob. Encoding never fails.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The buffer ended in the middle of a header or payload.
    #[error("blob truncated at offset {offset}: needed {needed} more bytes, {remaining} left")]
    Truncated {
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    /// An attribute count or size field was negative.
    #[error("negative length field {value} at offset {offset}")]
    NegativeLength { offset: usize, value: i32 },

    /// Attribute numbers were not strictly increasing.
    #[error("attribute numbers out of order")]
    Unsorted,

    /// Bytes were left over after the last attribute.
    #[error("{0} trailing bytes after last attribute")]
    TrailingBytes(usize),
}

/// Returns the exact number of bytes [`encode`] will produce for `record`.
pub fn encoded_size(record: &ObjectRecord) -> usize {
    OBJ_HEADER_SIZE
        + record
            .attributes()
            .iter()
            .map(|a| ATTR_HEADER_SIZE + a.bytes.len())
            .sum::<usize>()
}

/// Serializes `record` into a freshly allocated blob.
///
/// The buffer is sized up front with [`encoded_size`]. Records built by the
/// pipeline never exceed [`MAX_BLOB_SIZE`], so the `i32` size fields never
/// overflow.
pub fn encode(record: &ObjectRecord) -> Vec<u8> {
    let mut buf = vec![0u8; encoded_size(record)];

    NativeEndian::write_u32(&mut buf[0..4], record.id);
    NativeEndian::write_i32(&mut buf[4..8], record.len() as i32);

    let mut pos = OBJ_HEADER_SIZE;
    for attr in record.attributes() {
        NativeEndian::write_i32(&mut buf[pos..pos + 4], attr.bytes.len() as i32);
        NativeEndian::write_i32(&mut buf[pos + 4..pos + 8], attr.number);
        pos += ATTR_HEADER_SIZE;
        buf[pos..pos + attr.bytes.len()].copy_from_slice(&attr.bytes);
        pos += attr.bytes.len();
    }

    buf
}

/// Bounds-checked cursor over a blob.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let remaining = self.data.len() - self.pos;
        if n > remaining {
            return Err(CodecError::Truncated {
                offset: self.pos,
                needed: n,
                remaining,
            });
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(NativeEndian::read_u32(self.take(4)?))
    }

    fn i32(&mut self) -> Result<i32, CodecError> {
        Ok(NativeEndian::read_i32(self.take(4)?))
    }

    /// Reads an `i32` that must be a non-negative length.
    fn length(&mut self) -> Result<usize, CodecError> {
        let offset = self.pos;
        let value = self.i32()?;
        usize::try_from(value).map_err(|_| CodecError::NegativeLength { offset, value })
    }
}

/// Parses a blob produced by [`encode`].
///
/// Never panics on malformed input. The decoded record is clean.
///
/// # Errors
///
/// Returns a [`CodecError`] if the buffer is truncated, carries a negative
/// length, lists attributes out of order, or has bytes past the last
/// attribute. Callers treat any of these as data corruption.
pub fn decode(data: &[u8]) -> Result<ObjectRecord, CodecError> {
    let mut cur = Cursor { data, pos: 0 };

    let id = cur.u32()?;
    let count = cur.length()?;

    // Every attribute needs at least its header, which bounds how much a
    // corrupt count can make us preallocate.
    let max_count = (data.len() - cur.pos) / ATTR_HEADER_SIZE;
    let mut attributes = Vec::with_capacity(count.min(max_count));

    for _ in 0..count {
        let size = cur.length()?;
        let number = cur.i32()?;
        let payload = cur.take(size)?;
        attributes.push(AttributeRecord {
            number,
            bytes: Bytes::copy_from_slice(payload),
        });
    }

    if cur.pos != data.len() {
        return Err(CodecError::TrailingBytes(data.len() - cur.pos));
    }

    ObjectRecord::from_sorted(id, attributes).ok_or(CodecError::Unsorted)
}
