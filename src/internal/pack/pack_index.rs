//! Pack index (`.idx`) writer and reader.
//!
//! Layout, all integers big-endian:
//!
//! ```text
//! fanout   256 x u32   fanout[b] = number of entries whose id's first byte <= b
//! entries  n x (u32 offset, 20-byte id), sorted ascending by id
//! trailer  20-byte pack checksum, 20-byte SHA-1 of everything before it
//! ```

use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt};

use crate::{
    errors::GitError,
    hash::{HASH_SIZE, ObjectHash},
    internal::pack::index_entry::IndexEntry,
    utils::{HashAlgorithm, read_sha},
};

const FANOUT_ENTRIES: usize = 256;
const FANOUT_LEN: usize = FANOUT_ENTRIES * 4;
const ENTRY_LEN: usize = 4 + HASH_SIZE;
const TRAILER_LEN: usize = HASH_SIZE * 2;

/// Serializes a sorted, fanout-prefixed index for one pack.
pub struct IdxBuilder {
    out: Vec<u8>,
    inner_hash: HashAlgorithm, // for idx trailer
    object_number: usize,
    pack_hash: ObjectHash,
}

impl IdxBuilder {
    pub fn new(object_number: usize, pack_hash: ObjectHash) -> Self {
        Self {
            out: Vec::with_capacity(FANOUT_LEN + object_number * ENTRY_LEN + TRAILER_LEN),
            inner_hash: HashAlgorithm::new(),
            object_number,
            pack_hash,
        }
    }

    fn send_data(&mut self, data: &[u8]) {
        self.inner_hash.update(data);
        self.out.extend_from_slice(data);
    }

    fn send_u32(&mut self, v: u32) {
        self.send_data(&v.to_be_bytes());
    }

    // bucket by the id's first byte (00~FF), then prefix-sum
    fn write_fanout(&mut self, entries: &[IndexEntry]) {
        let mut fanout = [0u32; FANOUT_ENTRIES];
        for entry in entries {
            fanout[entry.hash.first_byte() as usize] += 1;
        }
        for i in 1..FANOUT_ENTRIES {
            fanout[i] += fanout[i - 1];
        }
        for count in fanout {
            self.send_u32(count);
        }
    }

    fn write_entries(&mut self, entries: &[IndexEntry]) -> Result<(), GitError> {
        for e in entries {
            let offset = u32::try_from(e.offset).map_err(|_| {
                GitError::PackEncodeError(format!(
                    "offset {} of {} does not fit in 32 bits",
                    e.offset, e.hash
                ))
            })?;
            self.send_u32(offset);
            self.send_data(&e.hash.0);
        }
        Ok(())
    }

    fn write_trailer(&mut self) {
        let pack_hash = self.pack_hash;
        self.send_data(&pack_hash.0);
        let idx_hash = self.inner_hash.clone().finalize();
        self.out.extend_from_slice(&idx_hash.0);
    }

    /// Write the index for `entries`. Entries are sorted by id; a duplicated id keeps its first
    /// offset.
    pub fn write_idx(mut self, mut entries: Vec<IndexEntry>) -> Result<Vec<u8>, GitError> {
        if entries.len() != self.object_number {
            return Err(GitError::PackEncodeError(format!(
                "entries length {} != object_number {}",
                entries.len(),
                self.object_number
            )));
        }

        entries.sort_by(|a, b| a.hash.cmp(&b.hash));
        entries.dedup_by_key(|e| e.hash);

        self.write_fanout(&entries);
        self.write_entries(&entries)?;
        self.write_trailer();
        Ok(self.out)
    }
}

/// A parsed and checksum-verified pack index.
#[derive(Debug, Clone)]
pub struct PackIndex {
    fanout: [u32; FANOUT_ENTRIES],
    entries: Vec<IndexEntry>,
    pack_checksum: ObjectHash,
}

impl PackIndex {
    /// Parse `bytes`, verifying the trailing index checksum before anything else.
    pub fn parse(bytes: &[u8]) -> Result<Self, GitError> {
        if bytes.len() < FANOUT_LEN + TRAILER_LEN {
            return Err(GitError::InvalidIdxFile(format!(
                "{} bytes is shorter than the minimum {}",
                bytes.len(),
                FANOUT_LEN + TRAILER_LEN
            )));
        }

        let body_len = bytes.len() - HASH_SIZE;
        let index_checksum = ObjectHash::from_bytes(&bytes[body_len..])?;
        let mut hasher = HashAlgorithm::new();
        hasher.update(&bytes[..body_len]);
        let actual = hasher.finalize();
        if actual != index_checksum {
            return Err(GitError::ChecksumMismatch {
                target: "pack index".to_string(),
                expected: index_checksum,
                actual,
            });
        }

        let mut cursor = Cursor::new(bytes);
        let mut fanout = [0u32; FANOUT_ENTRIES];
        for slot in fanout.iter_mut() {
            *slot = cursor.read_u32::<BigEndian>()?;
        }
        if fanout.windows(2).any(|w| w[0] > w[1]) {
            return Err(GitError::InvalidIdxFile(
                "fanout table is not monotonic".to_string(),
            ));
        }

        let count = fanout[FANOUT_ENTRIES - 1] as usize;
        let expected_len = count
            .checked_mul(ENTRY_LEN)
            .and_then(|n| n.checked_add(FANOUT_LEN + TRAILER_LEN));
        if expected_len != Some(bytes.len()) {
            return Err(GitError::InvalidIdxFile(format!(
                "{count} entries need {expected_len:?} bytes, found {}",
                bytes.len()
            )));
        }

        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let offset = cursor.read_u32::<BigEndian>()?;
            entries.push(IndexEntry {
                hash: read_sha(&mut cursor)?,
                offset: offset as u64,
            });
        }
        let pack_checksum = read_sha(&mut cursor)?;

        if entries.windows(2).any(|w| w[0].hash >= w[1].hash) {
            return Err(GitError::InvalidIdxFile(
                "entries are not strictly sorted".to_string(),
            ));
        }
        let mut seen = 0usize;
        for (bucket, &cumulative) in fanout.iter().enumerate() {
            while seen < entries.len() && entries[seen].hash.first_byte() as usize == bucket {
                seen += 1;
            }
            if seen != cumulative as usize {
                return Err(GitError::InvalidIdxFile(format!(
                    "fanout[{bucket}] = {cumulative} disagrees with entries"
                )));
            }
        }

        Ok(PackIndex {
            fanout,
            entries,
            pack_checksum,
        })
    }

    /// Parse `bytes` and look up `id` in one step.
    pub fn lookup(bytes: &[u8], id: &ObjectHash) -> Result<Option<u64>, GitError> {
        Ok(Self::parse(bytes)?.find_offset(id))
    }

    /// Offset of `id` in the pack, or `None` when the pack does not hold it.
    pub fn find_offset(&self, id: &ObjectHash) -> Option<u64> {
        let bucket = id.first_byte() as usize;
        let start = if bucket == 0 {
            0
        } else {
            self.fanout[bucket - 1] as usize
        };
        let end = self.fanout[bucket] as usize;
        if start >= end {
            return None;
        }

        let slice = &self.entries[start..end];
        // boundary entries are checked before bisecting
        if slice[0].hash == *id {
            return Some(slice[0].offset);
        }
        let last = slice[slice.len() - 1];
        if last.hash == *id {
            return Some(last.offset);
        }
        slice
            .binary_search_by(|e| e.hash.cmp(id))
            .ok()
            .map(|i| slice[i].offset)
    }

    pub fn contains(&self, id: &ObjectHash) -> bool {
        self.find_offset(id).is_some()
    }

    /// Object ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = ObjectHash> + '_ {
        self.entries.iter().map(|e| e.hash)
    }

    pub fn fanout(&self) -> &[u32; FANOUT_ENTRIES] {
        &self.fanout
    }

    pub fn pack_checksum(&self) -> ObjectHash {
        self.pack_checksum
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
