//! Rebuilds a target buffer from a base buffer and the instruction list produced by
//! [`crate::delta::make_deltas`] or decoded by [`crate::delta::decode_deltas`].

use super::{Delta, errors::GitDeltaError};

/// Apply `deltas` to `base`, returning the reconstructed target bytes.
///
/// Instructions must be ordered by target offset and tile the target without gaps or overlaps.
/// Copies reaching past the end of `base`, and inserts whose literal length disagrees with their
/// target range, are rejected rather than truncated.
pub fn apply_deltas(deltas: &[Delta], base: &[u8]) -> Result<Vec<u8>, GitDeltaError> {
    let mut buffer = Vec::with_capacity(output_bound(deltas, base.len()));

    for delta in deltas {
        let target = delta.target_range();
        if target.start != buffer.len() {
            return Err(GitDeltaError::DeltaDecoderError(format!(
                "instruction for target {target:?} does not start at offset {}",
                buffer.len()
            )));
        }

        match delta {
            Delta::Copy { origin, .. } => {
                if origin.len() != target.len() {
                    return Err(GitDeltaError::DeltaDecoderError(format!(
                        "copy origin {origin:?} and target {target:?} differ in length"
                    )));
                }
                let bytes = origin.read(base).ok_or_else(|| {
                    GitDeltaError::DeltaDecoderError(format!(
                        "copy origin {origin:?} exceeds base length {}",
                        base.len()
                    ))
                })?;
                buffer.extend_from_slice(bytes);
            }
            Delta::Insert { literal, .. } => {
                if literal.len() != target.len() {
                    return Err(GitDeltaError::DeltaDecoderError(format!(
                        "insert for target {target:?} carries {} bytes",
                        literal.len()
                    )));
                }
                buffer.extend_from_slice(literal);
            }
        }
    }

    Ok(buffer)
}

/// Upper bound on the size of a well-formed result. Declared target offsets are not trusted;
/// a copy can contribute at most the whole base and an insert at most its literal.
fn output_bound(deltas: &[Delta], base_len: usize) -> usize {
    deltas.iter().fold(0usize, |total, delta| {
        let len = match delta {
            Delta::Copy { target, .. } => target.len().min(base_len),
            Delta::Insert { literal, .. } => literal.len(),
        };
        total.saturating_add(len)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::ByteRange;

    #[test]
    fn copy_then_insert() {
        let deltas = vec![
            Delta::Copy {
                origin: ByteRange::new(2, 5),
                target: ByteRange::new(0, 3),
            },
            Delta::Insert {
                target: ByteRange::new(3, 5),
                literal: b"!?".to_vec(),
            },
        ];
        assert_eq!(apply_deltas(&deltas, b"xxabcyy").unwrap(), b"abc!?");
    }

    #[test]
    fn empty_list_is_empty_target() {
        assert!(apply_deltas(&[], b"anything").unwrap().is_empty());
    }

    #[test]
    fn copy_past_base_end_fails() {
        let deltas = vec![Delta::Copy {
            origin: ByteRange::new(3, 8),
            target: ByteRange::new(0, 5),
        }];
        let err = apply_deltas(&deltas, b"short").unwrap_err();
        assert!(matches!(err, GitDeltaError::DeltaDecoderError(_)));
    }

    #[test]
    fn gap_between_instructions_fails() {
        let deltas = vec![
            Delta::Insert {
                target: ByteRange::new(0, 1),
                literal: b"a".to_vec(),
            },
            Delta::Insert {
                target: ByteRange::new(2, 3),
                literal: b"c".to_vec(),
            },
        ];
        assert!(apply_deltas(&deltas, b"").is_err());
    }

    #[test]
    fn literal_length_mismatch_fails() {
        let deltas = vec![Delta::Insert {
            target: ByteRange::new(0, 4),
            literal: b"ab".to_vec(),
        }];
        assert!(apply_deltas(&deltas, b"").is_err());
    }

    #[test]
    fn far_target_offset_is_rejected_without_allocating() {
        let deltas = vec![Delta::Copy {
            origin: ByteRange::new(0, 1),
            target: ByteRange::new(1 << 40, (1 << 40) + 1),
        }];
        let err = apply_deltas(&deltas, b"abc").unwrap_err();
        assert!(matches!(err, GitDeltaError::DeltaDecoderError(_)));
    }

    #[test]
    fn bound_ignores_declared_offsets() {
        let deltas = vec![
            Delta::Copy {
                origin: ByteRange::new(0, 1 << 40),
                target: ByteRange::new(0, 1 << 40),
            },
            Delta::Insert {
                target: ByteRange::new(1 << 40, (1 << 40) + 2),
                literal: b"ok".to_vec(),
            },
        ];
        assert_eq!(output_bound(&deltas, 3), 5);
        assert!(apply_deltas(&deltas, b"abc").is_err());
    }
}
