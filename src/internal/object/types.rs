//! Object kind enumeration shared by the envelope, the pack block codec and the store.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::errors::GitError;

/// Each stored object carries one of three kinds. The kind name is part of the serialized
/// envelope (and therefore of the object id), and its number is the type tag of a pack base
/// block.
///
/// * `Commit` (1): a snapshot record of the history.
/// * `Tree` (2): a directory listing.
/// * `Blob` (3): file content.
///
/// Delta blocks use tags 6 and 7 in the same 3-bit field; they are block kinds, not object
/// kinds, and live in [`crate::internal::pack::block`].
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Commit = 1,
    Tree,
    Blob,
}

const COMMIT_OBJECT_TYPE: &[u8] = b"commit";
const TREE_OBJECT_TYPE: &[u8] = b"tree";
const BLOB_OBJECT_TYPE: &[u8] = b"blob";

impl Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ObjectType::Blob => write!(f, "blob"),
            ObjectType::Tree => write!(f, "tree"),
            ObjectType::Commit => write!(f, "commit"),
        }
    }
}

impl ObjectType {
    /// Convert object type to the 3-bit pack block type tag.
    pub fn to_pack_type_u8(&self) -> u8 {
        match self {
            ObjectType::Commit => 1,
            ObjectType::Tree => 2,
            ObjectType::Blob => 3,
        }
    }

    /// Decode a 3-bit pack block type tag into an object type.
    pub fn from_pack_type_u8(number: u8) -> Result<ObjectType, GitError> {
        match number {
            1 => Ok(ObjectType::Commit),
            2 => Ok(ObjectType::Tree),
            3 => Ok(ObjectType::Blob),
            _ => Err(GitError::InvalidObjectType(format!(
                "Invalid pack object type number: {number}"
            ))),
        }
    }

    /// Kind name as written into the envelope header.
    pub fn to_bytes(&self) -> &'static [u8] {
        match self {
            ObjectType::Commit => COMMIT_OBJECT_TYPE,
            ObjectType::Tree => TREE_OBJECT_TYPE,
            ObjectType::Blob => BLOB_OBJECT_TYPE,
        }
    }

    /// Parses the kind name bytes of an envelope header.
    pub fn from_bytes(bytes: &[u8]) -> Result<ObjectType, GitError> {
        match bytes {
            COMMIT_OBJECT_TYPE => Ok(ObjectType::Commit),
            TREE_OBJECT_TYPE => Ok(ObjectType::Tree),
            BLOB_OBJECT_TYPE => Ok(ObjectType::Blob),
            _ => Err(GitError::InvalidObjectType(
                String::from_utf8_lossy(bytes).into_owned(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_type_numbers() {
        for kind in [ObjectType::Commit, ObjectType::Tree, ObjectType::Blob] {
            assert_eq!(
                ObjectType::from_pack_type_u8(kind.to_pack_type_u8()).unwrap(),
                kind
            );
        }
        assert_eq!(ObjectType::Blob.to_pack_type_u8(), 3);
        assert!(ObjectType::from_pack_type_u8(4).is_err());
        assert!(ObjectType::from_pack_type_u8(7).is_err());
    }

    #[test]
    fn names_parse_back() {
        assert_eq!(ObjectType::from_bytes(b"tree").unwrap(), ObjectType::Tree);
        assert_eq!(ObjectType::from_bytes(b"commit").unwrap(), ObjectType::Commit);
        assert_eq!(ObjectType::Blob.to_string(), "blob");
        assert!(ObjectType::from_bytes(b"tag").is_err());
        assert!(ObjectType::from_bytes(b"").is_err());
    }
}
