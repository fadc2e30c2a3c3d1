//! Every stored object is identified by the SHA-1 digest of its serialized envelope
//! (`"{kind} {len}\0{data}"`). The same 20-byte digest type is reused for pack and index
//! trailer checksums, so a single [`ObjectHash`] covers both roles.
//!

use std::{fmt::Display, io, str::FromStr};

use serde::{Deserialize, Serialize};
use sha1::Digest;

use crate::{errors::GitError, internal::object::types::ObjectType};

/// Size of a SHA-1 digest in bytes.
pub const HASH_SIZE: usize = 20;
/// Length of the hexadecimal form of a SHA-1 digest.
pub const HASH_HEX_LEN: usize = 40;

/// The [`ObjectHash`] struct, encapsulating a `[u8; 20]` array, represents object ids and
/// checksums. Ordering is the unsigned lexicographic byte order, which is exactly the order
/// pack indexes sort their entries in.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Deserialize, Serialize,
)]
pub struct ObjectHash(pub [u8; HASH_SIZE]);

impl Display for ObjectHash {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl AsRef<[u8]> for ObjectHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Parse a 40 character hexadecimal string. Import `std::str::FromStr` to call
/// `ObjectHash::from_str`, or use `str::parse`.
impl FromStr for ObjectHash {
    type Err = GitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != HASH_HEX_LEN {
            return Err(GitError::InvalidHashValue(s.to_string()));
        }
        let mut h = [0u8; HASH_SIZE];
        hex::decode_to_slice(s, &mut h).map_err(|_| GitError::InvalidHashValue(s.to_string()))?;
        Ok(ObjectHash(h))
    }
}

impl ObjectHash {
    /// The all-zero id, used by commit chains as the "no object" sentinel.
    pub const ZERO: ObjectHash = ObjectHash([0u8; HASH_SIZE]);

    /// Calculates the SHA-1 of the given data.
    pub fn new(data: &[u8]) -> ObjectHash {
        let h = sha1::Sha1::digest(data);
        let mut bytes = [0u8; HASH_SIZE];
        bytes.copy_from_slice(h.as_ref());
        ObjectHash(bytes)
    }

    /// Create ObjectHash from object type and data
    pub fn from_type_and_data(object_type: ObjectType, data: &[u8]) -> ObjectHash {
        let mut d: Vec<u8> = Vec::with_capacity(data.len() + 16);
        d.extend(object_type.to_bytes());
        d.push(b' ');
        d.extend(data.len().to_string().as_bytes());
        d.push(b'\x00');
        d.extend(data);
        ObjectHash::new(&d)
    }

    /// Create ObjectHash from a byte slice, which must be exactly 20 bytes long.
    pub fn from_bytes(bytes: &[u8]) -> Result<ObjectHash, GitError> {
        if bytes.len() != HASH_SIZE {
            return Err(GitError::InvalidHashValue(format!(
                "invalid byte length: got {}, expected {}",
                bytes.len(),
                HASH_SIZE
            )));
        }
        let mut h = [0u8; HASH_SIZE];
        h.copy_from_slice(bytes);
        Ok(ObjectHash(h))
    }

    /// Create ObjectHash from a stream
    pub fn from_stream(data: &mut impl io::Read) -> io::Result<ObjectHash> {
        let mut h = [0u8; HASH_SIZE];
        data.read_exact(&mut h)?;
        Ok(ObjectHash(h))
    }

    /// First byte of the id; selects the fanout bucket in a pack index.
    pub fn first_byte(&self) -> u8 {
        self.0[0]
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}
