//! Record framing for the [`FileStore`](crate::FileStore) log.
//!
//! ```text
//! file:   [magic: u32 LE = "ASL1"] [frame] [frame] ...
//! frame:  [record_len: u32 LE][crc32: u32 LE][body ...]
//! put:    [op=0: u8][key_len: u32 LE][key][val_len: u32 LE][value]
//! del:    [op=1: u8][key_len: u32 LE][key]
//! ```
//!
//! `record_len` includes the 4-byte CRC but not itself. The CRC covers the
//! body only.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use std::io::{self, Read};

use crate::StoreError;

/// Magic number at offset 0 of every log file (ASCII "ASL1").
pub(crate) const LOG_MAGIC: u32 = 0x4153_4C31;

/// Size of the file header (the magic).
pub(crate) const FILE_HEADER_BYTES: u64 = 4;

/// Size of the frame header: `record_len + crc32`.
pub(crate) const FRAME_HEADER_BYTES: u64 = 4 + 4;

/// Largest accepted body; anything bigger is treated as corruption.
const MAX_RECORD_SIZE: u32 = 64 * 1024 * 1024;

const OP_PUT: u8 = 0;
const OP_DEL: u8 = 1;

/// What a scanned frame did to its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameOp {
    /// A put whose value lives at `value_offset` (absolute file offset).
    Put { value_offset: u64, value_len: u32 },
    Del,
}

/// One frame found while scanning the log.
#[derive(Debug)]
pub(crate) struct ScannedFrame {
    pub key: Vec<u8>,
    pub op: FrameOp,
    pub frame_len: u64,
}

/// Result of a full scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScanEnd {
    /// Offset just past the last complete frame.
    pub valid_end: u64,
    /// `true` if a partial frame followed `valid_end`.
    pub truncated_tail: bool,
}

/// Serializes a put frame into `buf` (cleared first).
///
/// Returns the offset of the value bytes relative to the start of the frame.
pub(crate) fn frame_put(buf: &mut Vec<u8>, key: &[u8], value: &[u8]) -> io::Result<u64> {
    buf.clear();
    buf.extend_from_slice(&[0u8; FRAME_HEADER_BYTES as usize]);
    buf.write_u8(OP_PUT)?;
    buf.write_u32::<LittleEndian>(len_u32(key.len())?)?;
    buf.extend_from_slice(key);
    buf.write_u32::<LittleEndian>(len_u32(value.len())?)?;
    let value_at = buf.len() as u64;
    buf.extend_from_slice(value);
    seal(buf)?;
    Ok(value_at)
}

/// Serializes a delete frame into `buf` (cleared first).
pub(crate) fn frame_del(buf: &mut Vec<u8>, key: &[u8]) -> io::Result<()> {
    buf.clear();
    buf.extend_from_slice(&[0u8; FRAME_HEADER_BYTES as usize]);
    buf.write_u8(OP_DEL)?;
    buf.write_u32::<LittleEndian>(len_u32(key.len())?)?;
    buf.extend_from_slice(key);
    seal(buf)
}

fn len_u32(len: usize) -> io::Result<u32> {
    u32::try_from(len)
        .ok()
        .filter(|l| *l < MAX_RECORD_SIZE)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "record too large"))
}

/// Fills in `record_len` and the CRC of a frame whose body is `buf[8..]`.
fn seal(buf: &mut [u8]) -> io::Result<()> {
    let body = &buf[FRAME_HEADER_BYTES as usize..];
    let record_len = len_u32(body.len() + 4)?;

    let mut hasher = Crc32::new();
    hasher.update(body);
    let crc = hasher.finalize();

    buf[0..4].copy_from_slice(&record_len.to_le_bytes());
    buf[4..8].copy_from_slice(&crc.to_le_bytes());
    Ok(())
}

/// Reads and validates the file magic.
pub(crate) fn read_header<R: Read>(r: &mut R) -> Result<(), StoreError> {
    let magic = r.read_u32::<LittleEndian>()?;
    if magic != LOG_MAGIC {
        return Err(StoreError::Corrupt { offset: 0 });
    }
    Ok(())
}

/// Walks every frame after the file header, calling `visit` for each
/// complete, CRC-valid one.
///
/// A partial frame at the end (crash mid-append) ends the scan cleanly and is
/// reported through [`ScanEnd::truncated_tail`]. A CRC mismatch or unknown op
/// is [`StoreError::Corrupt`].
pub(crate) fn scan<R, F>(r: &mut R, mut visit: F) -> Result<ScanEnd, StoreError>
where
    R: Read,
    F: FnMut(ScannedFrame),
{
    let mut offset = FILE_HEADER_BYTES;
    let mut body = Vec::with_capacity(256);

    let tail = |offset: u64| -> Result<ScanEnd, StoreError> {
        Ok(ScanEnd {
            valid_end: offset,
            truncated_tail: true,
        })
    };

    loop {
        let record_len = match r.read_u32::<LittleEndian>() {
            Ok(v) => v,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Ok(ScanEnd {
                    valid_end: offset,
                    truncated_tail: false,
                })
            }
            Err(e) => return Err(e.into()),
        };
        if record_len <= 4 || record_len > MAX_RECORD_SIZE {
            return Err(StoreError::Corrupt { offset });
        }

        let crc = match r.read_u32::<LittleEndian>() {
            Ok(v) => v,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return tail(offset),
            Err(e) => return Err(e.into()),
        };

        body.clear();
        body.resize((record_len - 4) as usize, 0);
        match r.read_exact(&mut body) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return tail(offset),
            Err(e) => return Err(e.into()),
        }

        let mut hasher = Crc32::new();
        hasher.update(&body);
        if hasher.finalize() != crc {
            return Err(StoreError::Corrupt { offset });
        }

        let frame_len = FRAME_HEADER_BYTES + body.len() as u64;
        let frame = parse_body(&body, offset).ok_or(StoreError::Corrupt { offset })?;
        visit(ScannedFrame {
            key: frame.0,
            op: frame.1,
            frame_len,
        });
        offset += frame_len;
    }
}

fn parse_body(body: &[u8], frame_offset: u64) -> Option<(Vec<u8>, FrameOp)> {
    let mut br = body;
    let op = br.read_u8().ok()?;
    let key_len = br.read_u32::<LittleEndian>().ok()? as usize;
    if key_len > br.len() {
        return None;
    }
    let key = br[..key_len].to_vec();
    br = &br[key_len..];

    match op {
        OP_PUT => {
            let value_len = br.read_u32::<LittleEndian>().ok()?;
            if value_len as usize != br.len() {
                return None;
            }
            let value_offset = frame_offset + FRAME_HEADER_BYTES + (body.len() - br.len()) as u64;
            Some((
                key,
                FrameOp::Put {
                    value_offset,
                    value_len,
                },
            ))
        }
        OP_DEL if br.is_empty() => Some((key, FrameOp::Del)),
        _ => None,
    }
}
