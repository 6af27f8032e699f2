use bytes::Bytes;

/// One attribute of an object: its number and raw payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRecord {
    pub number: i32,
    pub bytes: Bytes,
}

/// The decoded attribute set of a single object.
///
/// Attributes are kept strictly sorted by `number` so every lookup, insert
/// and removal is a binary search. `dirty` is bookkeeping for the pipeline
/// and is ignored by equality: two records are equal when they describe the
/// same object with the same attributes.
#[derive(Debug, Clone, Default)]
pub struct ObjectRecord {
    pub id: u32,
    attributes: Vec<AttributeRecord>,
    pub dirty: bool,
}

impl PartialEq for ObjectRecord {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.attributes == other.attributes
    }
}

impl Eq for ObjectRecord {}

impl ObjectRecord {
    /// Creates an empty, clean record for object `id`.
    pub fn new(id: u32) -> Self {
        Self {
            id,
            attributes: Vec::new(),
            dirty: false,
        }
    }

    /// Builds a record from attributes already in ascending number order.
    ///
    /// Used by the decoder. Returns `None` if the numbers are not strictly
    /// increasing.
    pub(crate) fn from_sorted(id: u32, attributes: Vec<AttributeRecord>) -> Option<Self> {
        if attributes.windows(2).any(|w| w[0].number >= w[1].number) {
            return None;
        }
        Some(Self {
            id,
            attributes,
            dirty: false,
        })
    }

    fn search(&self, number: i32) -> Result<usize, usize> {
        self.attributes.binary_search_by_key(&number, |a| a.number)
    }

    /// Returns the payload of attribute `number`, if present.
    pub fn get(&self, number: i32) -> Option<&Bytes> {
        self.search(number).ok().map(|i| &self.attributes[i].bytes)
    }

    /// Inserts or replaces attribute `number` at its sorted position and
    /// marks the record dirty.
    pub fn set(&mut self, number: i32, bytes: Bytes) {
        match self.search(number) {
            Ok(i) => self.attributes[i].bytes = bytes,
            Err(i) => self.attributes.insert(i, AttributeRecord { number, bytes }),
        }
        self.dirty = true;
    }

    /// Removes attribute `number`, compacting the array.
    ///
    /// Returns the removed payload. The record is only marked dirty when
    /// something was actually removed.
    pub fn remove(&mut self, number: i32) -> Option<Bytes> {
        let i = self.search(number).ok()?;
        self.dirty = true;
        Some(self.attributes.remove(i).bytes)
    }

    /// Attributes in ascending number order.
    pub fn attributes(&self) -> &[AttributeRecord] {
        &self.attributes
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Total payload bytes across all attributes (headers excluded).
    pub fn payload_size(&self) -> usize {
        self.attributes.iter().map(|a| a.bytes.len()).sum()
    }
}
