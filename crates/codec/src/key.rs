//! Key vocabulary shared by every layer.
//!
//! All logical namespaces share one disk key space. A [`RecordType`] tag is
//! appended to the caller's key bytes before they reach the disk store so that
//! identical byte keys in different namespaces never collide.

use byteorder::{ByteOrder, NativeEndian};
use std::fmt;

/// Length of an encoded [`AttrKey`]: `object (u32) + attr (i32)`.
pub const ATTR_KEY_LEN: usize = 4 + 4;

/// Logical namespace discriminator for a cached or stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordType(pub u32);

impl RecordType {
    /// Placeholder for an unused slot. Never stored.
    pub const EMPTY: RecordType = RecordType(0);
    /// Per-object attribute data, routed through the object pipeline.
    pub const ATTRIBUTE: RecordType = RecordType(1);
    /// Database-wide parameters.
    pub const DBINFO: RecordType = RecordType(2);
    /// Object structure records.
    pub const OBJECT: RecordType = RecordType(3);
    /// Attribute number to name map.
    pub const ATRNUM: RecordType = RecordType(4);
    /// Record type to module name map.
    pub const MODULETYPE: RecordType = RecordType(5);
    /// First value available to modules; everything at or above is theirs.
    pub const RESERVED: RecordType = RecordType(0x0000_FFFF);

    pub fn is_attribute(self) -> bool {
        self == Self::ATTRIBUTE
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::EMPTY => f.write_str("empty"),
            Self::ATTRIBUTE => f.write_str("attribute"),
            Self::DBINFO => f.write_str("dbinfo"),
            Self::OBJECT => f.write_str("object"),
            Self::ATRNUM => f.write_str("atrnum"),
            Self::MODULETYPE => f.write_str("moduletype"),
            RecordType(n) => write!(f, "type#{}", n),
        }
    }
}

/// Composite key of one attribute: owning object plus attribute number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttrKey {
    pub object: u32,
    pub attr: i32,
}

impl AttrKey {
    pub fn new(object: u32, attr: i32) -> Self {
        Self { object, attr }
    }

    /// Encodes as `[object: u32][attr: i32]` in host byte order.
    pub fn to_bytes(self) -> [u8; ATTR_KEY_LEN] {
        let mut buf = [0u8; ATTR_KEY_LEN];
        NativeEndian::write_u32(&mut buf[0..4], self.object);
        NativeEndian::write_i32(&mut buf[4..8], self.attr);
        buf
    }

    /// Parses bytes produced by [`AttrKey::to_bytes`]. Returns `None` unless
    /// `bytes` is exactly [`ATTR_KEY_LEN`] long.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != ATTR_KEY_LEN {
            return None;
        }
        Some(Self {
            object: NativeEndian::read_u32(&bytes[0..4]),
            attr: NativeEndian::read_i32(&bytes[4..8]),
        })
    }
}

impl fmt::Display for AttrKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}/{}", self.object, self.attr)
    }
}

/// Builds the disk store key for `key` in namespace `record_type`:
/// `key ++ record_type (u32, host order)`.
pub fn tagged_key(key: &[u8], record_type: RecordType) -> Vec<u8> {
    let mut out = Vec::with_capacity(key.len() + 4);
    out.extend_from_slice(key);
    out.extend_from_slice(&[0u8; 4]);
    let tail = out.len() - 4;
    NativeEndian::write_u32(&mut out[tail..], record_type.0);
    out
}
