//! zlib helpers: a streaming inflater that hashes as it reads, and one-shot compress/decompress
//! used by the pack block codec and loose object storage.

pub mod stream;

use std::io::{self, Read, Write};

use flate2::{Compression, write::ZlibEncoder};

use self::stream::inflate::ReadBoxed;

/// zlib-compress `data` at the default level.
pub fn compress(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2 + 16), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Inflate a complete zlib stream.
pub fn decompress(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut reader = ReadBoxed::new_unhashed(data);
    let mut out = Vec::with_capacity(data.len() * 2);
    reader.read_to_end(&mut out)?;
    Ok(out)
}
