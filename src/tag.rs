//! Stream tags and their per-port storage.

#![forbid(unsafe_code)]

use crate::pmt::Pmt;

/// A keyed annotation attached to an absolute item offset of a stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    /// Absolute item offset the tag is attached to.
    pub offset: u64,
    /// Tag key, usually a symbol.
    pub key: Pmt,
    /// Tag value.
    pub value: Pmt,
    /// Optional identifier of the block that created the tag.
    pub srcid: Option<Pmt>,
}

impl Tag {
    /// Create a tag with no source id.
    pub fn new(offset: u64, key: Pmt, value: Pmt) -> Self {
        Self {
            offset,
            key,
            value,
            srcid: None,
        }
    }

    /// Attach a source id.
    pub fn with_srcid(mut self, srcid: Pmt) -> Self {
        self.srcid = Some(srcid);
        self
    }
}

/// How tags on consumed input items are carried to the outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TagPropagation {
    /// Tags stop at this block.
    DontPropagate,
    /// Every input tag is copied to every output.
    #[default]
    AllToAll,
    /// Input `i` feeds output `i`.
    OneToOne,
    /// The block propagates tags itself.
    Custom,
}

/// Ordered tag storage for one port.
///
/// Tags stay sorted by offset; tags sharing an offset keep insertion order.
#[derive(Debug, Clone, Default)]
pub struct TagStore {
    tags: Vec<Tag>,
}

impl TagStore {
    pub fn new() -> Self {
        Self { tags: Vec::new() }
    }

    /// Insert a tag at its offset position.
    pub fn insert(&mut self, tag: Tag) {
        let idx = self.tags.partition_point(|t| t.offset <= tag.offset);
        self.tags.insert(idx, tag);
    }

    /// Tags with offsets in `[start, end)`, optionally restricted to `key`.
    ///
    /// Returns an owned snapshot; later inserts do not affect it.
    pub fn range(&self, start: u64, end: u64, key: Option<&Pmt>) -> Vec<Tag> {
        if start >= end {
            return Vec::new();
        }
        let lo = self.tags.partition_point(|t| t.offset < start);
        let hi = self.tags.partition_point(|t| t.offset < end);
        self.tags[lo..hi]
            .iter()
            .filter(|t| key.map_or(true, |k| &t.key == k))
            .cloned()
            .collect()
    }

    /// Drop every tag with an offset below `offset`.
    pub fn prune_before(&mut self, offset: u64) {
        let idx = self.tags.partition_point(|t| t.offset < offset);
        self.tags.drain(..idx);
    }

    /// Remove and return every stored tag, leaving the store empty.
    pub fn take_all(&mut self) -> Vec<Tag> {
        std::mem::take(&mut self.tags)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// All stored tags in offset order.
    pub fn as_slice(&self) -> &[Tag] {
        &self.tags
    }
}
