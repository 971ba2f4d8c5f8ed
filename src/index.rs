//! # Checkpoint Index
//!
//! A bitmap recording which checkpoints reference an account for one index
//! category. Bit `n - 1` (most significant bit first within each byte) is set
//! when checkpoint `n` is active.
//!
//! The store never looks inside an index: it only moves the bytes produced by
//! [`CheckpointIndex::to_bytes`] and rebuilds values with
//! [`CheckpointIndex::from_bytes`].

use crate::error::{IndexError, Result};
use std::collections::{BTreeMap, HashMap};

/// Index category name to index, for exactly one account
pub type AccountIndexSet = BTreeMap<String, CheckpointIndex>;

/// Account identifier to that account's index set; one flush worth of dirty state
pub type FlushRequest = HashMap<String, AccountIndexSet>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckpointIndex {
    bitmap: Vec<u8>,
    first_checkpoint: Option<u32>,
    last_checkpoint: Option<u32>,
}

impl CheckpointIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index with every checkpoint in `checkpoints` active
    pub fn with_checkpoints(checkpoints: impl IntoIterator<Item = u32>) -> Result<Self> {
        let mut index = Self::new();
        for checkpoint in checkpoints {
            index.set_active(checkpoint)?;
        }
        Ok(index)
    }

    /// Rebuild an index from its raw bitmap.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut index = Self {
            bitmap: bytes.to_vec(),
            first_checkpoint: None,
            last_checkpoint: None,
        };
        let first = index.active_checkpoints().next();
        let last = index.scan_last();
        index.first_checkpoint = first;
        index.last_checkpoint = last;
        index
    }

    /// Raw bitmap, byte for byte
    pub fn to_bytes(&self) -> Vec<u8> {
        self.bitmap.clone()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bitmap
    }

    pub fn set_active(&mut self, checkpoint: u32) -> Result<()> {
        let (byte, mask) = Self::position(checkpoint)?;
        if byte >= self.bitmap.len() {
            self.bitmap.resize(byte + 1, 0);
        }
        self.bitmap[byte] |= mask;

        self.first_checkpoint = Some(
            self.first_checkpoint.map_or(checkpoint, |first| first.min(checkpoint)),
        );
        self.last_checkpoint = Some(
            self.last_checkpoint.map_or(checkpoint, |last| last.max(checkpoint)),
        );
        Ok(())
    }

    pub fn is_active(&self, checkpoint: u32) -> bool {
        match Self::position(checkpoint) {
            Ok((byte, mask)) => self.bitmap.get(byte).is_some_and(|b| b & mask != 0),
            Err(_) => false,
        }
    }

    /// First active checkpoint at or after `from`
    pub fn next_active(&self, from: u32) -> Option<u32> {
        let from = from.max(1);
        if self.last_checkpoint.is_some_and(|last| from > last) {
            return None;
        }
        self.active_checkpoints().find(|&checkpoint| checkpoint >= from)
    }

    /// Mark every checkpoint active in `other` as active here too
    pub fn merge(&mut self, other: &CheckpointIndex) {
        if other.bitmap.len() > self.bitmap.len() {
            self.bitmap.resize(other.bitmap.len(), 0);
        }
        for (mine, theirs) in self.bitmap.iter_mut().zip(&other.bitmap) {
            *mine |= theirs;
        }

        self.first_checkpoint = match (self.first_checkpoint, other.first_checkpoint) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.last_checkpoint = match (self.last_checkpoint, other.last_checkpoint) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }

    pub fn first_checkpoint(&self) -> Option<u32> {
        self.first_checkpoint
    }

    pub fn last_checkpoint(&self) -> Option<u32> {
        self.last_checkpoint
    }

    pub fn is_empty(&self) -> bool {
        self.first_checkpoint.is_none()
    }

    pub fn active_count(&self) -> usize {
        self.bitmap.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Active checkpoints in ascending order
    pub fn active_checkpoints(&self) -> impl Iterator<Item = u32> + '_ {
        self.bitmap.iter().enumerate().flat_map(|(byte, bits)| {
            (0..8u32).filter_map(move |offset| {
                if bits & (0x80 >> offset) != 0 {
                    Some(byte as u32 * 8 + offset + 1)
                } else {
                    None
                }
            })
        })
    }

    fn scan_last(&self) -> Option<u32> {
        let (byte, bits) = self
            .bitmap
            .iter()
            .enumerate()
            .rev()
            .find(|(_, bits)| **bits != 0)?;
        Some(byte as u32 * 8 + (7 - bits.trailing_zeros()) + 1)
    }

    fn position(checkpoint: u32) -> Result<(usize, u8)> {
        if checkpoint == 0 {
            return Err(IndexError::InvalidCheckpoint { checkpoint });
        }
        let bit = checkpoint - 1;
        Ok(((bit / 8) as usize, 0x80 >> (bit % 8)))
    }
}
