//! # Index Set Serializer
//!
//! Encodes an [`AccountIndexSet`] as a gzip-compressed MessagePack list of
//! `{name, bytes}` entries. Category names and each index's own bytes are
//! stored verbatim; entries are written in key order so encoding is
//! deterministic.

use crate::error::{IndexError, Result};
use crate::index::{AccountIndexSet, CheckpointIndex};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};

#[derive(Serialize)]
struct EncodedEntry<'a> {
    name: &'a str,
    #[serde(with = "serde_bytes")]
    bytes: &'a [u8],
}

#[derive(Deserialize)]
struct DecodedEntry {
    name: String,
    #[serde(with = "serde_bytes")]
    bytes: Vec<u8>,
}

/// Serialize and compress one account's index set
pub fn encode(set: &AccountIndexSet) -> Result<Vec<u8>> {
    let entries: Vec<EncodedEntry<'_>> = set
        .iter()
        .map(|(name, index)| EncodedEntry {
            name,
            bytes: index.as_bytes(),
        })
        .collect();

    let packed = rmp_serde::to_vec_named(&entries)?;

    let mut encoder = GzEncoder::new(Vec::with_capacity(packed.len() / 2), Compression::default());
    encoder
        .write_all(&packed)
        .map_err(|e| IndexError::serialization(format!("compress: {e}")))?;
    encoder
        .finish()
        .map_err(|e| IndexError::serialization(format!("compress: {e}")))
}

/// Decompress and decode an index set produced by [`encode`].
///
/// Nothing is returned unless the whole payload decodes cleanly.
pub fn decode(data: &[u8]) -> Result<AccountIndexSet> {
    let mut packed = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut packed)
        .map_err(|e| IndexError::serialization(format!("decompress: {e}")))?;

    let mut remaining: &[u8] = &packed;
    let entries = {
        let mut deserializer = rmp_serde::Deserializer::new(&mut remaining);
        Vec::<DecodedEntry>::deserialize(&mut deserializer)?
    };
    if !remaining.is_empty() {
        return Err(IndexError::serialization(format!(
            "decode: {} trailing bytes after index entries",
            remaining.len()
        )));
    }

    let mut set = BTreeMap::new();
    for entry in entries {
        let index = CheckpointIndex::from_bytes(&entry.bytes);
        if set.insert(entry.name.clone(), index).is_some() {
            return Err(IndexError::serialization(format!(
                "decode: duplicate index name {:?}",
                entry.name
            )));
        }
    }
    Ok(set)
}
