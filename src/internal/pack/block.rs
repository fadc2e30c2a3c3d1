//! Pack block codec: one stored object (full content or a delta) framed as a self-describing
//! block.
//!
//! Every block starts with a type+size header: three type bits (`1` commit, `2` tree, `3` blob,
//! `6` offset-delta, `7` ref-delta) and four inline size bits, continued by a varint when the size
//! does not fit. For a base block `size` is the length of the zlib payload; for delta blocks it is
//! the length of the encoded instruction stream.
//!
//! ```text
//! base       header | zlib(content)
//! ref-delta  header | 20-byte base id | instructions
//! ofs-delta  header | varint back offset | instructions
//! ```

use std::{fmt, io::Cursor};

use crate::{
    delta::{
        Delta, decode_deltas, encode_deltas, encoded_len,
        utils::{read_size_encoding, read_type_and_size, write_size_encoding, write_type_and_size},
    },
    errors::GitError,
    hash::{HASH_SIZE, ObjectHash},
    internal::{object::types::ObjectType, zlib},
};

const BLOCK_TYPE_BITS: u8 = 3;
pub const BLOCK_OFS_DELTA: u8 = 6;
pub const BLOCK_REF_DELTA: u8 = 7;

/// Pack-resident form of one object. The object's own id is not part of the block bytes; it is
/// carried next to it in [`PackedObject`] and recorded in the pack index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Block {
    Base {
        kind: ObjectType,
        content: Vec<u8>,
    },
    RefDelta {
        base_id: ObjectHash,
        deltas: Vec<Delta>,
    },
    OfsDelta {
        back_offset: u64,
        deltas: Vec<Delta>,
    },
}

/// A block paired with the id of the object it reconstructs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackedObject {
    pub id: ObjectHash,
    pub block: Block,
}

impl Block {
    /// The 3-bit type tag written into the header.
    pub fn type_tag(&self) -> u8 {
        match self {
            Block::Base { kind, .. } => kind.to_pack_type_u8(),
            Block::OfsDelta { .. } => BLOCK_OFS_DELTA,
            Block::RefDelta { .. } => BLOCK_REF_DELTA,
        }
    }

    pub fn is_delta(&self) -> bool {
        !matches!(self, Block::Base { .. })
    }

    /// Serialize the block.
    pub fn encode(&self) -> Result<Vec<u8>, GitError> {
        let mut out = Vec::new();
        match self {
            Block::Base { kind, content } => {
                let compressed = zlib::compress(content)?;
                write_type_and_size(
                    &mut out,
                    kind.to_pack_type_u8(),
                    BLOCK_TYPE_BITS,
                    compressed.len(),
                );
                out.extend_from_slice(&compressed);
            }
            Block::RefDelta { base_id, deltas } => {
                write_type_and_size(&mut out, BLOCK_REF_DELTA, BLOCK_TYPE_BITS, encoded_len(deltas));
                out.extend_from_slice(&base_id.0);
                out.extend_from_slice(&encode_deltas(deltas));
            }
            Block::OfsDelta {
                back_offset,
                deltas,
            } => {
                let back_offset = usize::try_from(*back_offset).map_err(|_| {
                    GitError::PackEncodeError(format!("back offset {back_offset} overflows"))
                })?;
                write_type_and_size(&mut out, BLOCK_OFS_DELTA, BLOCK_TYPE_BITS, encoded_len(deltas));
                write_size_encoding(&mut out, back_offset);
                out.extend_from_slice(&encode_deltas(deltas));
            }
        }
        Ok(out)
    }

    /// Decode the block starting at `offset` in `bytes`, returning it with the offset just past
    /// its last byte.
    pub fn decode(bytes: &[u8], offset: usize) -> Result<(Block, usize), GitError> {
        let rest = bytes.get(offset..).ok_or_else(|| {
            GitError::InvalidPackFile(format!("block offset {offset} past end {}", bytes.len()))
        })?;
        let malformed =
            |e: &dyn fmt::Display| GitError::InvalidPackFile(format!("block at offset {offset}: {e}"));
        let mut cursor = Cursor::new(rest);
        let (tag, size) =
            read_type_and_size(&mut cursor, BLOCK_TYPE_BITS).map_err(|e| malformed(&e))?;

        let block = match tag {
            1..=3 => {
                let kind = ObjectType::from_pack_type_u8(tag)?;
                let payload = take(rest, &mut cursor, size, offset)?;
                let content = zlib::decompress(payload).map_err(|e| malformed(&e))?;
                Block::Base { kind, content }
            }
            BLOCK_REF_DELTA => {
                let id = take(rest, &mut cursor, HASH_SIZE, offset)?;
                let base_id = ObjectHash::from_bytes(id)?;
                let deltas =
                    decode_deltas(take(rest, &mut cursor, size, offset)?).map_err(|e| malformed(&e))?;
                Block::RefDelta { base_id, deltas }
            }
            BLOCK_OFS_DELTA => {
                let back_offset = read_size_encoding(&mut cursor).map_err(|e| malformed(&e))? as u64;
                let deltas =
                    decode_deltas(take(rest, &mut cursor, size, offset)?).map_err(|e| malformed(&e))?;
                Block::OfsDelta {
                    back_offset,
                    deltas,
                }
            }
            _ => return Err(GitError::UnknownBlockType { tag, offset }),
        };

        Ok((block, offset + cursor.position() as usize))
    }
}

/// Borrow the next `len` bytes of the block and advance `cursor` past them.
fn take<'a>(
    rest: &'a [u8],
    cursor: &mut Cursor<&'a [u8]>,
    len: usize,
    offset: usize,
) -> Result<&'a [u8], GitError> {
    let start = cursor.position() as usize;
    let slice = start
        .checked_add(len)
        .and_then(|end| rest.get(start..end))
        .ok_or_else(|| {
            GitError::InvalidPackFile(format!(
                "block at offset {offset} declares {len} payload bytes past the end of the pack"
            ))
        })?;
    cursor.set_position((start + len) as u64);
    Ok(slice)
}
