//! Buffered zlib inflater that can hash what it produces, so a loose object is decompressed and
//! checked against its id in a single pass.

use std::{io, io::BufRead};

use flate2::{Decompress, FlushDecompress, Status};

use crate::{hash::ObjectHash, utils::HashAlgorithm};

/// Inflates one zlib stream from a [`BufRead`]. Input past the zlib trailer is left unconsumed
/// in `inner`.
pub struct ReadBoxed<R> {
    pub inner: R,
    decompressor: Decompress,
    /// Digest of every inflated byte; `None` for unhashed readers.
    hasher: Option<HashAlgorithm>,
    done: bool,
}

impl<R: BufRead> ReadBoxed<R> {
    /// Reader for a loose object. Every inflated byte, envelope header included, is hashed, so
    /// [`ReadBoxed::digest`] ends up as the object id.
    pub fn new(inner: R) -> Self {
        Self::with_hasher(inner, Some(HashAlgorithm::new()))
    }

    /// Reader that only inflates.
    pub fn new_unhashed(inner: R) -> Self {
        Self::with_hasher(inner, None)
    }

    fn with_hasher(inner: R, hasher: Option<HashAlgorithm>) -> Self {
        ReadBoxed {
            inner,
            decompressor: Decompress::new(true),
            hasher,
            done: false,
        }
    }

    /// Digest of the bytes inflated so far, if this reader hashes.
    pub fn digest(&self) -> Option<ObjectHash> {
        self.hasher.clone().map(HashAlgorithm::finalize)
    }

    /// `true` once the zlib trailer has been read.
    pub fn is_done(&self) -> bool {
        self.done
    }
}

impl<R: BufRead> io::Read for ReadBoxed<R> {
    fn read(&mut self, into: &mut [u8]) -> io::Result<usize> {
        if self.done || into.is_empty() {
            return Ok(0);
        }
        let (n, done) = inflate_into(&mut self.inner, &mut self.decompressor, into)?;
        self.done = done;
        if let Some(hasher) = self.hasher.as_mut() {
            hasher.update(&into[..n]);
        }
        Ok(n)
    }
}

/// Feed `source` through `state` until `out` is full or the stream ends. Returns the number of
/// bytes written and whether the trailer was reached.
fn inflate_into(
    source: &mut impl BufRead,
    state: &mut Decompress,
    out: &mut [u8],
) -> io::Result<(usize, bool)> {
    let mut filled = 0;
    loop {
        let input = source.fill_buf()?;
        let at_eof = input.is_empty();
        let (in_before, out_before) = (state.total_in(), state.total_out());
        let flush = if at_eof {
            FlushDecompress::Finish
        } else {
            FlushDecompress::None
        };
        let status = state.decompress(input, &mut out[filled..], flush);
        let consumed = (state.total_in() - in_before) as usize;
        let produced = (state.total_out() - out_before) as usize;
        source.consume(consumed);
        filled += produced;

        match status {
            Ok(Status::StreamEnd) => return Ok((filled, true)),
            Ok(_) if filled == out.len() => return Ok((filled, false)),
            Ok(_) if at_eof && produced == 0 => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "zlib stream ends before its trailer",
                ));
            }
            Ok(_) if consumed > 0 || produced > 0 => {}
            Ok(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "zlib stream makes no progress",
                ));
            }
            Err(e) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("corrupt zlib stream: {e}"),
                ));
            }
        }
    }
}
