//! Byte encoding of a delta instruction list, as stored in pack delta blocks.
//!
//! Each instruction starts with a type+size header using one type bit (`0` copy, `1` insert)
//! and six inline length bits, followed by the target start offset as a varint. A copy then
//! carries its origin start offset as a varint; an insert carries its literal bytes.

use std::io::{Cursor, Read};

use super::{
    ByteRange, Delta,
    errors::GitDeltaError,
    utils::{
        read_size_encoding, read_type_and_size, size_encoding_len, type_and_size_len,
        write_size_encoding, write_type_and_size,
    },
};

const INSTRUCTION_TYPE_BITS: u8 = 1;
const COPY_TYPE: u8 = 0;
const INSERT_TYPE: u8 = 1;

/// Serialize `deltas` into the instruction byte stream.
pub fn encode_deltas(deltas: &[Delta]) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_len(deltas));
    for delta in deltas {
        match delta {
            Delta::Copy { origin, target } => {
                write_type_and_size(&mut out, COPY_TYPE, INSTRUCTION_TYPE_BITS, target.len());
                write_size_encoding(&mut out, target.start);
                write_size_encoding(&mut out, origin.start);
            }
            Delta::Insert { target, literal } => {
                write_type_and_size(&mut out, INSERT_TYPE, INSTRUCTION_TYPE_BITS, literal.len());
                write_size_encoding(&mut out, target.start);
                out.extend_from_slice(literal);
            }
        }
    }
    out
}

/// Exact number of bytes [`encode_deltas`] produces for `deltas`.
pub fn encoded_len(deltas: &[Delta]) -> usize {
    deltas
        .iter()
        .map(|delta| match delta {
            Delta::Copy { origin, target } => {
                type_and_size_len(INSTRUCTION_TYPE_BITS, target.len())
                    + size_encoding_len(target.start)
                    + size_encoding_len(origin.start)
            }
            Delta::Insert { target, literal } => {
                type_and_size_len(INSTRUCTION_TYPE_BITS, literal.len())
                    + size_encoding_len(target.start)
                    + literal.len()
            }
        })
        .sum()
}

/// Parse an instruction byte stream. The whole input must be consumed by whole instructions,
/// and each instruction must start where the previous one ended.
pub fn decode_deltas(bytes: &[u8]) -> Result<Vec<Delta>, GitDeltaError> {
    let mut stream = Cursor::new(bytes);
    let mut deltas = Vec::new();
    let mut next_start = 0;

    while (stream.position() as usize) < bytes.len() {
        let (kind, len) = read_type_and_size(&mut stream, INSTRUCTION_TYPE_BITS)?;
        let target_start = read_size_encoding(&mut stream)?;
        if target_start != next_start {
            return Err(GitDeltaError::DeltaFormatError(format!(
                "instruction targets offset {target_start}, expected {next_start}"
            )));
        }
        let target_end = checked_end(target_start, len)?;
        next_start = target_end;
        let target = ByteRange::new(target_start, target_end);

        match kind {
            COPY_TYPE => {
                let origin_start = read_size_encoding(&mut stream)?;
                let origin = ByteRange::new(origin_start, checked_end(origin_start, len)?);
                deltas.push(Delta::Copy { origin, target });
            }
            INSERT_TYPE => {
                let remaining = bytes.len() - stream.position() as usize;
                if len > remaining {
                    return Err(GitDeltaError::DeltaFormatError(format!(
                        "insert of {len} bytes but only {remaining} remain"
                    )));
                }
                let mut literal = vec![0; len];
                stream.read_exact(&mut literal)?;
                deltas.push(Delta::Insert { target, literal });
            }
            other => {
                return Err(GitDeltaError::DeltaFormatError(format!(
                    "unknown instruction type {other}"
                )));
            }
        }
    }

    Ok(deltas)
}

fn checked_end(start: usize, len: usize) -> Result<usize, GitDeltaError> {
    start.checked_add(len).ok_or_else(|| {
        GitDeltaError::DeltaFormatError(format!("range {start}+{len} overflows usize"))
    })
}

#[cfg(test)]
mod tests {
    use quickcheck::quickcheck;

    use super::*;
    use crate::delta::{apply_deltas, make_deltas};

    #[test]
    fn copy_and_insert_bytes() {
        let deltas = vec![
            Delta::Copy {
                origin: ByteRange::new(5, 9),
                target: ByteRange::new(0, 4),
            },
            Delta::Insert {
                target: ByteRange::new(4, 6),
                literal: b"hi".to_vec(),
            },
        ];
        let bytes = encode_deltas(&deltas);
        assert_eq!(
            bytes,
            vec![0b0000_0100, 0, 5, 0b0100_0010, 4, b'h', b'i']
        );
        assert_eq!(bytes.len(), encoded_len(&deltas));
        assert_eq!(decode_deltas(&bytes).unwrap(), deltas);
    }

    #[test]
    fn long_insert_spills_length() {
        let literal = vec![b'z'; 200];
        let deltas = vec![Delta::Insert {
            target: ByteRange::new(0, 200),
            literal,
        }];
        let bytes = encode_deltas(&deltas);
        // 200 = 0b11_001000: low six bits inline, 3 in the continuation varint
        assert_eq!(&bytes[..3], &[0b1100_1000, 3, 0]);
        assert_eq!(decode_deltas(&bytes).unwrap(), deltas);
    }

    #[test]
    fn empty_stream_is_empty_list() {
        assert!(encode_deltas(&[]).is_empty());
        assert!(decode_deltas(&[]).unwrap().is_empty());
    }

    #[test]
    fn truncated_insert_fails() {
        let mut bytes = encode_deltas(&[Delta::Insert {
            target: ByteRange::new(0, 5),
            literal: b"hello".to_vec(),
        }]);
        bytes.pop();
        assert!(decode_deltas(&bytes).is_err());
    }

    #[test]
    fn truncated_copy_fails() {
        // header and target offset, origin offset missing
        assert!(decode_deltas(&[0b0000_0011, 0]).is_err());
        // continuation flag with nothing after it
        assert!(decode_deltas(&[0b1000_0000]).is_err());
    }

    #[test]
    fn non_contiguous_target_start_fails() {
        let mut bytes = Vec::new();
        write_type_and_size(&mut bytes, COPY_TYPE, INSTRUCTION_TYPE_BITS, 1);
        write_size_encoding(&mut bytes, 1 << 40);
        write_size_encoding(&mut bytes, 0);
        assert_eq!(bytes[0], 0x01);
        let err = decode_deltas(&bytes).unwrap_err();
        assert!(matches!(err, GitDeltaError::DeltaFormatError(_)));

        // second instruction leaves a one byte gap
        let bytes = encode_deltas(&[
            Delta::Insert {
                target: ByteRange::new(0, 1),
                literal: b"a".to_vec(),
            },
            Delta::Insert {
                target: ByteRange::new(2, 3),
                literal: b"c".to_vec(),
            },
        ]);
        assert!(decode_deltas(&bytes).is_err());
    }

    #[test]
    fn encoder_output_survives_the_wire() {
        fn prop(target: Vec<u8>, base: Vec<u8>) -> bool {
            let deltas = make_deltas(&target, &base);
            let decoded = decode_deltas(&encode_deltas(&deltas)).unwrap();
            decoded == deltas && apply_deltas(&decoded, &base).unwrap() == target
        }
        quickcheck(prop as fn(Vec<u8>, Vec<u8>) -> bool);
    }
}
