//! Shared varint and type+size framing helpers. The delta instruction codec (1 type bit) and the
//! pack block codec (3 type bits) both frame their headers with these.
//!
//! A varint is little-endian base-128: seven data bits per byte, msb set while more bytes follow.
//! A type+size header packs `type` into the bits below the msb and the low bits of `size` under
//! it; when `size` does not fit, the msb is set and `size >> size_bits` follows as a varint.

use std::io::{self, Read};

const VAR_INT_ENCODING_BITS: u8 = 7;
const VAR_INT_CONTINUE_FLAG: u8 = 1 << VAR_INT_ENCODING_BITS;

/// Read exactly `N` bytes from the stream into a fixed array.
#[inline]
pub fn read_bytes<R: Read, const N: usize>(stream: &mut R) -> io::Result<[u8; N]> {
    let mut bytes = [0; N];
    stream.read_exact(&mut bytes)?;

    Ok(bytes)
}

/// Read a varint (little-endian 7-bit chunks with msb as continue flag).
pub fn read_size_encoding<R: Read>(stream: &mut R) -> io::Result<usize> {
    let mut value = 0;
    let mut length = 0;

    loop {
        let (byte_value, more_bytes) = read_var_int_byte(stream)?;
        let chunk = byte_value as usize;
        // bits shifted past the top of usize would be silently lost
        if length >= usize::BITS || (length > 0 && chunk >> (usize::BITS - length) != 0) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "varint does not fit in usize",
            ));
        }
        value |= chunk << length;
        if !more_bytes {
            return Ok(value);
        }

        length += VAR_INT_ENCODING_BITS as u32;
    }
}

/// Read one varint byte, returning (7-bit value, has_more flag).
pub fn read_var_int_byte<R: Read>(stream: &mut R) -> io::Result<(u8, bool)> {
    let [byte] = read_bytes(stream)?;
    let value = byte & !VAR_INT_CONTINUE_FLAG;
    let more_bytes = byte & VAR_INT_CONTINUE_FLAG != 0;

    Ok((value, more_bytes))
}

/// Append `number` as a varint.
pub fn write_size_encoding(out: &mut Vec<u8>, number: usize) {
    let mut number = number;

    loop {
        if number >> VAR_INT_ENCODING_BITS > 0 {
            out.push((number & 0x7f) as u8 | VAR_INT_CONTINUE_FLAG);
        } else {
            out.push((number & 0x7f) as u8);
            break;
        }

        number >>= VAR_INT_ENCODING_BITS;
    }
}

/// Number of bytes [`write_size_encoding`] emits for `number`.
pub fn size_encoding_len(number: usize) -> usize {
    let mut len = 1;
    let mut number = number >> VAR_INT_ENCODING_BITS;
    while number > 0 {
        len += 1;
        number >>= VAR_INT_ENCODING_BITS;
    }
    len
}

#[inline]
fn size_bits(type_bits: u8) -> u8 {
    VAR_INT_ENCODING_BITS - type_bits
}

/// Append a type+size header. `type_bits` is 1 for delta instructions and 3 for pack blocks.
pub fn write_type_and_size(out: &mut Vec<u8>, obj_type: u8, type_bits: u8, size: usize) {
    let size_bits = size_bits(type_bits);
    let size_mask = (1usize << size_bits) - 1;
    let first = (size & size_mask) as u8 | (obj_type << size_bits);
    if size > size_mask {
        out.push(first | VAR_INT_CONTINUE_FLAG);
        write_size_encoding(out, size >> size_bits);
    } else {
        out.push(first);
    }
}

/// Number of bytes [`write_type_and_size`] emits.
pub fn type_and_size_len(type_bits: u8, size: usize) -> usize {
    let high = size >> size_bits(type_bits);
    if high == 0 { 1 } else { 1 + size_encoding_len(high) }
}

/// Read a type+size header, returning `(type, size)`.
pub fn read_type_and_size<R: Read>(stream: &mut R, type_bits: u8) -> io::Result<(u8, usize)> {
    let size_bits = size_bits(type_bits);
    let size_mask = (1u8 << size_bits) - 1;
    let [first] = read_bytes(stream)?;
    let obj_type = (first & !VAR_INT_CONTINUE_FLAG) >> size_bits;
    let mut size = (first & size_mask) as usize;
    if first & VAR_INT_CONTINUE_FLAG != 0 {
        let high = read_size_encoding(stream)?;
        let high = high.checked_mul(1usize << size_bits).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "type+size header overflows usize")
        })?;
        size |= high;
    }
    Ok((obj_type, size))
}
