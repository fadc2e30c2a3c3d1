use serde::{Deserialize, Serialize};

use crate::hash::ObjectHash;

/// One `(id, offset)` pair of a pack index. Offsets are stored as u32 on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub hash: ObjectHash,
    pub offset: u64,
}

impl IndexEntry {
    pub fn new(hash: ObjectHash, offset: usize) -> Self {
        IndexEntry {
            hash,
            offset: offset as u64,
        }
    }
}
