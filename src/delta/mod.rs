//! Chunk-matching delta codec: [`make_deltas`] describes a target buffer as copies from a base
//! buffer plus inserted literals, [`apply_deltas`] replays such a list, and [`format`] turns the
//! list into the compact byte stream stored inside pack blocks.

pub mod decode;
pub mod encode;
pub mod errors;
pub mod format;
pub mod utils;

use std::fmt;

pub use decode::apply_deltas;
pub use encode::{DEFAULT_CHUNK_SIZE, copied_ratio, make_deltas, make_deltas_with_chunk_size};
pub use format::{decode_deltas, encode_deltas, encoded_len};

/// Half-open byte interval `[start, end)` over a base or target buffer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ByteRange {
    pub start: usize,
    pub end: usize,
}

impl ByteRange {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "range start {start} past end {end}");
        ByteRange { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Borrow the covered bytes, or `None` when the range runs past `bytes`.
    pub fn read<'a>(&self, bytes: &'a [u8]) -> Option<&'a [u8]> {
        bytes.get(self.start..self.end)
    }
}

impl fmt::Debug for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// One reconstruction step. A list of these, ordered by `target.start`, tiles the whole target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delta {
    /// Copy `origin` from the base into `target`; both ranges have the same length.
    Copy { origin: ByteRange, target: ByteRange },
    /// Write `literal` into `target`.
    Insert { target: ByteRange, literal: Vec<u8> },
}

impl Delta {
    pub fn target_range(&self) -> ByteRange {
        match self {
            Delta::Copy { target, .. } | Delta::Insert { target, .. } => *target,
        }
    }

    pub fn is_copy(&self) -> bool {
        matches!(self, Delta::Copy { .. })
    }
}

/// Human-readable dump of a delta list, one `[copy]{..}` or `[insert]{..}` line per instruction.
/// Bytes are shown lossily as UTF-8; copies past the end of `base` render as `<out of range>`.
pub fn pretty_deltas(deltas: &[Delta], base: &[u8]) -> String {
    let mut out = String::new();
    for delta in deltas {
        match delta {
            Delta::Copy { origin, .. } => {
                out.push_str("[copy]{");
                match origin.read(base) {
                    Some(bytes) => out.push_str(&String::from_utf8_lossy(bytes)),
                    None => out.push_str("<out of range>"),
                }
            }
            Delta::Insert { literal, .. } => {
                out.push_str("[insert]{");
                out.push_str(&String::from_utf8_lossy(literal));
            }
        }
        out.push_str("}\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pretty_prints_both_kinds() {
        let base = b"hello";
        let deltas = vec![
            Delta::Copy {
                origin: ByteRange::new(0, 4),
                target: ByteRange::new(0, 4),
            },
            Delta::Insert {
                target: ByteRange::new(4, 6),
                literal: b"!!".to_vec(),
            },
        ];
        assert_eq!(pretty_deltas(&deltas, base), "[copy]{hell}\n[insert]{!!}\n");
    }

    #[test]
    fn range_read_is_bounds_checked() {
        assert_eq!(ByteRange::new(1, 3).read(b"abcd"), Some(&b"bc"[..]));
        assert_eq!(ByteRange::new(3, 9).read(b"abcd"), None);
        assert_eq!(ByteRange::new(2, 2).len(), 0);
    }
}
