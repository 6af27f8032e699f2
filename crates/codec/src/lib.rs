//! # Codec - Binary Object Blobs
//!
//! Converts the full attribute set of one game object into a single flat byte
//! buffer and back. The object pipeline writes one blob per object instead of
//! one disk record per attribute, so a burst of attribute writes against the
//! same room or player costs a single disk write.
//!
//! ## Blob layout
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ object_id (u32) | attribute_count (i32)      │  OBJ_HEADER_SIZE = 8
//! ├──────────────────────────────────────────────┤
//! │ size (i32) | attribute_number (i32) | bytes  │  ATTR_HEADER_SIZE = 8
//! │ ... repeated attribute_count times ...       │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! No padding. `size` counts only the payload bytes. All integers are in
//! host byte order; a blob is not portable across architectures.
//!
//! The crate also owns the key vocabulary shared by the store, the pipeline
//! and the cache: [`RecordType`], [`AttrKey`] and [`tagged_key`].
//!
//! ## Example
//!
//! ```rust
//! use codec::{decode, encode, encoded_size, ObjectRecord};
//!
//! let mut obj = ObjectRecord::new(42);
//! obj.set(5, b"five".to_vec().into());
//! obj.set(1, b"one".to_vec().into());
//!
//! let blob = encode(&obj);
//! assert_eq!(blob.len(), encoded_size(&obj));
//! assert_eq!(decode(&blob).unwrap(), obj);
//! ```

mod format;
mod key;
mod record;

pub use format::{
    decode, encode, encoded_size, CodecError, ATTR_HEADER_SIZE, MAX_BLOB_SIZE, OBJ_HEADER_SIZE,
};
pub use key::{tagged_key, AttrKey, RecordType, ATTR_KEY_LEN};
pub use record::{AttributeRecord, ObjectRecord};
