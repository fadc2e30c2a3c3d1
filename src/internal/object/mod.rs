//! The stored object model. Payloads are opaque: the store only needs an object's kind and its
//! bytes, which together form the envelope `"{kind} {len}\0{data}"` that is hashed for the id
//! and compressed for loose storage.

pub mod types;

use std::{
    fmt::{self, Display},
    io::{BufRead, Read},
};

use crate::{
    errors::GitError,
    hash::ObjectHash,
    internal::{object::types::ObjectType, zlib::stream::inflate::ReadBoxed},
};

/// One stored object: its kind plus the raw payload bytes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectEnvelope {
    pub kind: ObjectType,
    pub data: Vec<u8>,
}

impl Display for ObjectEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.kind, self.data.len())
    }
}

impl ObjectEnvelope {
    pub fn new(kind: ObjectType, data: impl Into<Vec<u8>>) -> Self {
        ObjectEnvelope {
            kind,
            data: data.into(),
        }
    }

    pub fn blob(data: impl Into<Vec<u8>>) -> Self {
        Self::new(ObjectType::Blob, data)
    }

    /// Serialized envelope: ASCII kind, a space, the decimal payload length, a NUL, the payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let len = self.data.len().to_string();
        let kind = self.kind.to_bytes();
        let mut out = Vec::with_capacity(kind.len() + len.len() + 2 + self.data.len());
        out.extend_from_slice(kind);
        out.push(b' ');
        out.extend_from_slice(len.as_bytes());
        out.push(b'\0');
        out.extend_from_slice(&self.data);
        out
    }

    /// Parse a serialized envelope. The declared length must match the payload exactly.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GitError> {
        let nul = bytes
            .iter()
            .position(|&b| b == b'\0')
            .ok_or_else(|| GitError::InvalidObjectInfo("missing NUL after header".to_string()))?;
        let header = &bytes[..nul];
        let space = header
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| GitError::InvalidObjectInfo("missing space in header".to_string()))?;

        let kind = ObjectType::from_bytes(&header[..space])?;
        let declared: usize = std::str::from_utf8(&header[space + 1..])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                GitError::InvalidObjectInfo(format!(
                    "bad length `{}`",
                    String::from_utf8_lossy(&header[space + 1..])
                ))
            })?;

        let data = &bytes[nul + 1..];
        if data.len() != declared {
            return Err(GitError::InvalidObjectInfo(format!(
                "header declares {declared} bytes, payload has {}",
                data.len()
            )));
        }
        Ok(ObjectEnvelope::new(kind, data))
    }

    /// Content id: SHA-1 of the serialized envelope.
    pub fn id(&self) -> ObjectHash {
        ObjectHash::from_type_and_data(self.kind, &self.data)
    }

    /// Inflate a loose object stream and parse it, checking the digest accumulated while
    /// inflating against `expected`.
    pub fn from_buf_read<R: BufRead>(
        read: &mut ReadBoxed<R>,
        expected: &ObjectHash,
    ) -> Result<Self, GitError> {
        let mut content = Vec::new();
        read.read_to_end(&mut content)
            .map_err(|e| GitError::InvalidObjectInfo(format!("loose object {expected}: {e}")))?;
        if !read.is_done() {
            return Err(GitError::InvalidObjectInfo(format!(
                "loose object {expected} ends before its zlib trailer"
            )));
        }
        let actual = read.digest().ok_or_else(|| {
            GitError::InvalidArgument("loose objects need a hashing reader".to_string())
        })?;
        if actual != *expected {
            return Err(GitError::ChecksumMismatch {
                target: format!("loose object {expected}"),
                expected: *expected,
                actual,
            });
        }
        Self::from_bytes(&content)
    }
}
