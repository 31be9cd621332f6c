//! IO signatures: how many streams a side of a block accepts, and their item sizes.

#![forbid(unsafe_code)]

use thiserror::Error;

/// Stream count bounds plus per-port item sizes in bytes.
///
/// When a block has more ports than listed sizes, the last size repeats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoSignature {
    min_streams: usize,
    max_streams: Option<usize>,
    item_sizes: Vec<usize>,
}

/// Rejected signature parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("min streams {min} exceeds max streams {max}")]
    Bounds { min: usize, max: usize },
    #[error("item size of stream {0} is zero")]
    ZeroItemSize(usize),
    #[error("signature allows streams but lists no item size")]
    MissingItemSize,
}

impl IoSignature {
    /// Signature with one item size shared by every port.
    pub fn new(min_streams: usize, max_streams: usize, item_size: usize) -> Result<Self, SignatureError> {
        Self::makev(min_streams, Some(max_streams), vec![item_size])
    }

    /// Signature with a size per port. `max_streams = None` means unbounded.
    pub fn makev(
        min_streams: usize,
        max_streams: Option<usize>,
        item_sizes: Vec<usize>,
    ) -> Result<Self, SignatureError> {
        if let Some(max) = max_streams {
            if min_streams > max {
                return Err(SignatureError::Bounds { min: min_streams, max });
            }
        }
        if let Some(idx) = item_sizes.iter().position(|&s| s == 0) {
            return Err(SignatureError::ZeroItemSize(idx));
        }
        if item_sizes.is_empty() && max_streams != Some(0) {
            return Err(SignatureError::MissingItemSize);
        }
        Ok(Self {
            min_streams,
            max_streams,
            item_sizes,
        })
    }

    /// Signature accepting no streams.
    pub fn null() -> Self {
        Self {
            min_streams: 0,
            max_streams: Some(0),
            item_sizes: Vec::new(),
        }
    }

    pub fn min_streams(&self) -> usize {
        self.min_streams
    }

    pub fn max_streams(&self) -> Option<usize> {
        self.max_streams
    }

    /// True when `count` streams satisfy the bounds.
    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min_streams && self.max_streams.map_or(true, |max| count <= max)
    }

    /// Item size in bytes for `port`.
    pub fn item_size(&self, port: usize) -> usize {
        match self.item_sizes.get(port) {
            Some(&size) => size,
            None => self.item_sizes.last().copied().unwrap_or(0),
        }
    }

    pub fn is_null(&self) -> bool {
        self.max_streams == Some(0)
    }
}
