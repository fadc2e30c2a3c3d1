//! Pack files: a header, a stream of [`block::Block`]s and a SHA-1 trailer, plus the index,
//! manifest and cache types the object store keeps alongside them.
//!
//! ```text
//! "PACK" | u32 version (1) | u32 block count | blocks... | SHA-1 of all preceding bytes
//! ```
//!
//! Packs and their indexes are named after the pack trailer checksum:
//! `pack_<hex>.pack` and `pack_<hex>.idx`.

pub mod block;
pub mod cache;
pub mod index_entry;
pub mod manifest;
pub mod pack_index;

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use rayon::prelude::*;
use tracing::debug;

use crate::{
    errors::GitError,
    hash::{HASH_SIZE, ObjectHash},
    internal::pack::{
        block::{Block, PackedObject},
        index_entry::IndexEntry,
        pack_index::IdxBuilder,
    },
    utils::HashAlgorithm,
};

pub const PACK_SIGNATURE: &[u8; 4] = b"PACK";
pub const PACK_VERSION: u32 = 1;
pub const PACK_HEADER_LEN: usize = 12;

/// File name of the pack whose trailer checksum is `checksum`.
pub fn pack_file_name(checksum: &ObjectHash) -> String {
    format!("pack_{checksum}.pack")
}

/// Index file name paired with a pack file name.
pub fn idx_file_name(pack_name: &str) -> String {
    match pack_name.strip_suffix(".pack") {
        Some(stem) => format!("{stem}.idx"),
        None => format!("{pack_name}.idx"),
    }
}

/// A framed pack and its index, ready to be written out.
#[derive(Clone, Debug)]
pub struct EncodedPack {
    pub checksum: ObjectHash,
    pub pack: Vec<u8>,
    pub index: Vec<u8>,
    pub entries: Vec<IndexEntry>,
}

impl EncodedPack {
    pub fn pack_name(&self) -> String {
        pack_file_name(&self.checksum)
    }

    pub fn idx_name(&self) -> String {
        idx_file_name(&self.pack_name())
    }
}

/// A parsed pack: every block with the offset it starts at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackFile {
    pub version: u32,
    pub blocks: Vec<(usize, Block)>,
    pub checksum: ObjectHash,
}

impl PackFile {
    /// Frame `objects` into one pack, in order, and build its index.
    pub fn build(objects: &[PackedObject]) -> Result<EncodedPack, GitError> {
        frame(encode_blocks(objects)?)
    }

    /// Parse a whole pack, verifying header, block count and trailer checksum.
    pub fn parse(bytes: &[u8]) -> Result<PackFile, GitError> {
        let body = verified_body(bytes)?;
        let version = BigEndian::read_u32(&body[4..8]);
        let count = BigEndian::read_u32(&body[8..12]) as usize;
        let checksum = ObjectHash::from_bytes(&bytes[body.len()..])?;

        let mut blocks = Vec::with_capacity(count.min(body.len()));
        let mut offset = PACK_HEADER_LEN;
        for _ in 0..count {
            let (block, next) = Block::decode(body, offset)?;
            blocks.push((offset, block));
            offset = next;
        }
        if offset != body.len() {
            return Err(GitError::InvalidPackFile(format!(
                "{} trailing bytes after {count} blocks",
                body.len() - offset
            )));
        }

        Ok(PackFile {
            version,
            blocks,
            checksum,
        })
    }

    /// Check header and trailer checksum only, returning the checksum.
    pub fn verify(bytes: &[u8]) -> Result<ObjectHash, GitError> {
        let body = verified_body(bytes)?;
        ObjectHash::from_bytes(&bytes[body.len()..])
    }

    /// Decode the single block at `offset` without walking the rest of the pack.
    pub fn read_block_at(bytes: &[u8], offset: usize) -> Result<Block, GitError> {
        let body_len = bytes.len().saturating_sub(HASH_SIZE);
        if offset < PACK_HEADER_LEN || offset >= body_len {
            return Err(GitError::InvalidPackFile(format!(
                "block offset {offset} outside the block stream"
            )));
        }
        Block::decode(&bytes[..body_len], offset).map(|(block, _)| block)
    }
}

/// Check header and trailer of `bytes`; returns everything before the trailer.
fn verified_body(bytes: &[u8]) -> Result<&[u8], GitError> {
    if bytes.len() < PACK_HEADER_LEN + HASH_SIZE {
        return Err(GitError::InvalidPackFile(format!(
            "{} bytes is too short for a pack",
            bytes.len()
        )));
    }
    if &bytes[0..4] != PACK_SIGNATURE {
        return Err(GitError::InvalidPackHeader(format!(
            "bad signature {:?}",
            String::from_utf8_lossy(&bytes[0..4])
        )));
    }
    let version = BigEndian::read_u32(&bytes[4..8]);
    if version != PACK_VERSION {
        return Err(GitError::InvalidPackHeader(format!(
            "unsupported version {version}"
        )));
    }

    let body_len = bytes.len() - HASH_SIZE;
    let expected = ObjectHash::from_bytes(&bytes[body_len..])?;
    let mut hasher = HashAlgorithm::new();
    hasher.update(&bytes[..body_len]);
    let actual = hasher.finalize();
    if actual != expected {
        return Err(GitError::ChecksumMismatch {
            target: "pack file".to_string(),
            expected,
            actual,
        });
    }
    Ok(&bytes[..body_len])
}

/// Encode every block, in parallel, keeping input order.
pub fn encode_blocks(objects: &[PackedObject]) -> Result<Vec<(ObjectHash, Vec<u8>)>, GitError> {
    objects
        .par_iter()
        .map(|object| Ok((object.id, object.block.encode()?)))
        .collect()
}

/// Greedily group encoded blocks so each group's total size stays within `size_limit`. A block
/// larger than the limit still gets a group of its own.
pub fn split_by_size(
    encoded: Vec<(ObjectHash, Vec<u8>)>,
    size_limit: usize,
) -> Vec<Vec<(ObjectHash, Vec<u8>)>> {
    let mut groups = Vec::new();
    let mut current = Vec::new();
    let mut current_size = 0usize;
    for (id, bytes) in encoded {
        if !current.is_empty() && current_size.saturating_add(bytes.len()) > size_limit {
            groups.push(std::mem::take(&mut current));
            current_size = 0;
        }
        current_size += bytes.len();
        current.push((id, bytes));
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

/// Encode `objects` and split them into size-bounded packs, each with its own index.
pub fn build_packs(
    objects: &[PackedObject],
    size_limit: usize,
) -> Result<Vec<EncodedPack>, GitError> {
    let encoded = encode_blocks(objects)?;
    split_by_size(encoded, size_limit)
        .into_iter()
        .map(frame)
        .collect()
}

/// Header, blocks and trailer for one group of encoded blocks, plus its index.
fn frame(encoded: Vec<(ObjectHash, Vec<u8>)>) -> Result<EncodedPack, GitError> {
    let count = u32::try_from(encoded.len()).map_err(|_| {
        GitError::PackEncodeError(format!("{} blocks exceed the pack count field", encoded.len()))
    })?;
    let total: usize = encoded.iter().map(|(_, bytes)| bytes.len()).sum();

    let mut pack = Vec::with_capacity(PACK_HEADER_LEN + total + HASH_SIZE);
    pack.extend_from_slice(PACK_SIGNATURE);
    pack.write_u32::<BigEndian>(PACK_VERSION)?;
    pack.write_u32::<BigEndian>(count)?;

    let mut entries = Vec::with_capacity(encoded.len());
    for (id, bytes) in &encoded {
        entries.push(IndexEntry::new(*id, pack.len()));
        pack.extend_from_slice(bytes);
    }

    let mut hasher = HashAlgorithm::new();
    hasher.update(&pack);
    let checksum = hasher.finalize();
    pack.extend_from_slice(&checksum.0);

    let index = IdxBuilder::new(entries.len(), checksum).write_idx(entries.clone())?;
    debug!(
        "framed pack {} with {} blocks, {} bytes",
        checksum,
        count,
        pack.len()
    );

    Ok(EncodedPack {
        checksum,
        pack,
        index,
        entries,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use tracing_subscriber::util::SubscriberInitExt;

    use super::*;
    use crate::{
        delta::make_deltas,
        internal::{object::types::ObjectType, pack::pack_index::PackIndex},
    };

    /// CAUTION: This two is same
    /// 1.
    /// tracing_subscriber::fmt().init();
    ///
    /// 2.
    /// env::set_var("RUST_LOG", "debug"); // must be set if use `fmt::init()`, or no output
    /// tracing_subscriber::fmt::init();
    pub(crate) fn init_logger() {
        let _ = tracing_subscriber::fmt::Subscriber::builder()
            .with_target(false)
            .without_time()
            .with_level(true)
            .with_max_level(tracing::Level::DEBUG)
            .finish()
            .try_init(); // avoid multi-init
    }

    fn sample_objects() -> Vec<PackedObject> {
        let v1 = b"The quick brown fox jumps over the lazy dog".to_vec();
        let v2 = b"The quick brown cat jumps over the lazy dog".to_vec();
        let v1_id = ObjectHash::from_type_and_data(ObjectType::Blob, &v1);
        let v2_id = ObjectHash::from_type_and_data(ObjectType::Blob, &v2);
        vec![
            PackedObject {
                id: v1_id,
                block: Block::Base {
                    kind: ObjectType::Blob,
                    content: v1.clone(),
                },
            },
            PackedObject {
                id: v2_id,
                block: Block::RefDelta {
                    base_id: v1_id,
                    deltas: make_deltas(&v2, &v1),
                },
            },
            PackedObject {
                id: ObjectHash([0x42; 20]),
                block: Block::OfsDelta {
                    back_offset: 99,
                    deltas: Vec::new(),
                },
            },
        ]
    }

    #[test]
    fn build_then_parse() {
        init_logger();
        let objects = sample_objects();
        let encoded = PackFile::build(&objects).unwrap();
        assert_eq!(&encoded.pack[..4], b"PACK");
        assert_eq!(BigEndian::read_u32(&encoded.pack[4..8]), PACK_VERSION);
        assert_eq!(BigEndian::read_u32(&encoded.pack[8..12]), 3);

        let parsed = PackFile::parse(&encoded.pack).unwrap();
        assert_eq!(parsed.checksum, encoded.checksum);
        let blocks: Vec<Block> = parsed.blocks.iter().map(|(_, b)| b.clone()).collect();
        let expected: Vec<Block> = objects.iter().map(|o| o.block.clone()).collect();
        assert_eq!(blocks, expected);

        let index = PackIndex::parse(&encoded.index).unwrap();
        assert_eq!(index.pack_checksum(), encoded.checksum);
        for (object, (offset, block)) in objects.iter().zip(&parsed.blocks) {
            assert_eq!(index.find_offset(&object.id), Some(*offset as u64));
            assert_eq!(&PackFile::read_block_at(&encoded.pack, *offset).unwrap(), block);
        }
        assert_eq!(
            encoded.pack_name(),
            format!("pack_{}.pack", encoded.checksum)
        );
        assert_eq!(encoded.idx_name(), format!("pack_{}.idx", encoded.checksum));
    }

    #[test]
    fn empty_pack_is_valid() {
        let encoded = PackFile::build(&[]).unwrap();
        assert_eq!(encoded.pack.len(), PACK_HEADER_LEN + HASH_SIZE);
        let parsed = PackFile::parse(&encoded.pack).unwrap();
        assert!(parsed.blocks.is_empty());
    }

    #[test]
    fn corrupt_packs_are_rejected() {
        let encoded = PackFile::build(&sample_objects()).unwrap();

        let mut bad_magic = encoded.pack.clone();
        bad_magic[0] = b'X';
        assert!(matches!(
            PackFile::parse(&bad_magic),
            Err(GitError::InvalidPackHeader(_))
        ));

        let mut flipped = encoded.pack.clone();
        flipped[PACK_HEADER_LEN + 1] ^= 0xff;
        assert!(matches!(
            PackFile::parse(&flipped),
            Err(GitError::ChecksumMismatch { .. })
        ));

        assert!(PackFile::parse(&encoded.pack[..20]).is_err());
        assert!(PackFile::read_block_at(&encoded.pack, 3).is_err());
        assert!(PackFile::read_block_at(&encoded.pack, encoded.pack.len() - 5).is_err());
    }

    #[test]
    fn split_is_greedy_and_never_empty() {
        let blocks = |sizes: &[usize]| -> Vec<(ObjectHash, Vec<u8>)> {
            sizes
                .iter()
                .enumerate()
                .map(|(i, &n)| (ObjectHash([i as u8; 20]), vec![0u8; n]))
                .collect()
        };
        let sizes_of = |groups: Vec<Vec<(ObjectHash, Vec<u8>)>>| -> Vec<Vec<usize>> {
            groups
                .into_iter()
                .map(|g| g.into_iter().map(|(_, b)| b.len()).collect())
                .collect()
        };

        assert_eq!(
            sizes_of(split_by_size(blocks(&[4, 4, 4, 4, 4]), 10)),
            vec![vec![4, 4], vec![4, 4], vec![4]]
        );
        // an oversized block still lands in a pack of its own
        assert_eq!(
            sizes_of(split_by_size(blocks(&[3, 50, 3]), 10)),
            vec![vec![3], vec![50], vec![3]]
        );
        assert!(split_by_size(Vec::new(), 10).is_empty());
    }

    #[test]
    fn build_packs_splits_and_indexes_each() {
        let objects = sample_objects();
        let packs = build_packs(&objects, 1).unwrap();
        assert_eq!(packs.len(), objects.len());
        for (pack, object) in packs.iter().zip(&objects) {
            let index = PackIndex::parse(&pack.index).unwrap();
            assert_eq!(index.find_offset(&object.id), Some(PACK_HEADER_LEN as u64));
            assert_eq!(PackFile::parse(&pack.pack).unwrap().blocks.len(), 1);
        }

        let single = build_packs(&objects, usize::MAX).unwrap();
        assert_eq!(single.len(), 1);
    }
}
