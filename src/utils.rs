//! Shared I/O utilities: an id reader and a streaming SHA-1 state that pack, index and
//! loose-object code feed as they write or inflate bytes.

use std::{io, io::Read};

use sha1::{Digest, Sha1};

use crate::hash::ObjectHash;

pub fn read_sha(file: &mut impl Read) -> io::Result<ObjectHash> {
    ObjectHash::from_stream(file)
}

/// Streaming SHA-1 state. Implements `std::io::Write` so it can sit at the end of
/// a writer chain, or be fed explicitly with [`HashAlgorithm::update`].
#[derive(Clone, Default)]
pub struct HashAlgorithm {
    inner: Sha1,
}

impl HashAlgorithm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update hash with data
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finalize into an [`ObjectHash`].
    pub fn finalize(self) -> ObjectHash {
        let digest: [u8; 20] = self.inner.finalize().into();
        ObjectHash(digest)
    }
}

impl std::io::Write for HashAlgorithm {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
