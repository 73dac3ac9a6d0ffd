//! Binary encoding and decoding
//!
//! Layout of every chunk (big-endian):
//!
//! ```text
//! +----------------+-------------------+---------------------+
//! | code (4 ASCII) | length (u32)      | payload (length)    |
//! +----------------+-------------------+---------------------+
//! ```
//!
//! Container payloads are the concatenated encodings of their children.

use crate::chunk::{Chunk, HEADER_LEN};
use crate::code::{ContentCode, ValueType};
use crate::error::{DmapError, Result};
use crate::registry::registry;
use crate::value::{Value, Version};
use bytes::{BufMut, Bytes, BytesMut};
use chrono::DateTime;

/// Maximum container nesting accepted by the decoder
pub const MAX_DEPTH: usize = 64;

/// Encode a chunk into a new buffer
pub fn encode(chunk: &Chunk) -> Bytes {
    let mut buf = BytesMut::with_capacity(chunk.encoded_len());
    encode_into(chunk, &mut buf);
    buf.freeze()
}

/// Append the encoding of a chunk to `buf`
pub fn encode_into(chunk: &Chunk, buf: &mut BytesMut) {
    buf.reserve(chunk.encoded_len());
    buf.put_slice(chunk.code().as_bytes());
    // Chunk construction guarantees the payload fits in u32
    buf.put_u32(chunk.payload_len() as u32);

    match chunk.value() {
        Value::U8(v) => buf.put_u8(*v),
        Value::I8(v) => buf.put_i8(*v),
        Value::U16(v) => buf.put_u16(*v),
        Value::I16(v) => buf.put_i16(*v),
        Value::U32(v) => buf.put_u32(*v),
        Value::I32(v) => buf.put_i32(*v),
        Value::U64(v) => buf.put_u64(*v),
        Value::I64(v) => buf.put_i64(*v),
        Value::String(s) => buf.put_slice(s.as_bytes()),
        Value::Date(d) => buf.put_u32(d.timestamp() as u32),
        Value::Version(v) => {
            buf.put_u8(v.major);
            buf.put_u8(v.minor);
            buf.put_u8(v.patch);
        }
        Value::Boolean(v) => buf.put_u8(u8::from(*v)),
        Value::Container(children) => {
            for child in children {
                encode_into(child, buf);
            }
        }
    }
}

/// Decode exactly one chunk spanning all of `input`
pub fn decode(input: &[u8]) -> Result<Chunk> {
    let (chunk, used) = decode_prefix(input)?;
    if used != input.len() {
        return Err(DmapError::TrailingBytes(input.len() - used));
    }
    Ok(chunk)
}

/// Decode the chunk at the start of `input`, returning it with the bytes consumed
pub fn decode_prefix(input: &[u8]) -> Result<(Chunk, usize)> {
    decode_at_depth(input, 0)
}

/// Read a chunk header without validating the code
pub fn peek_header(input: &[u8]) -> Option<(ContentCode, u32)> {
    if input.len() < HEADER_LEN {
        return None;
    }
    let code = ContentCode::new([input[0], input[1], input[2], input[3]]);
    let len = u32::from_be_bytes([input[4], input[5], input[6], input[7]]);
    Some((code, len))
}

fn decode_at_depth(input: &[u8], depth: usize) -> Result<(Chunk, usize)> {
    if depth > MAX_DEPTH {
        return Err(DmapError::TooDeep(MAX_DEPTH));
    }

    let (code, len) = peek_header(input).ok_or(DmapError::Truncated {
        needed: HEADER_LEN,
        available: input.len(),
    })?;
    let entry = registry().require(code)?;

    let len = len as usize;
    let end = HEADER_LEN + len;
    if input.len() < end {
        return Err(DmapError::Truncated {
            needed: end,
            available: input.len(),
        });
    }
    let payload = &input[HEADER_LEN..end];

    let value = decode_payload(code, entry.value_type, payload, depth)?;
    Ok((Chunk::new(code, value)?, end))
}

fn decode_payload(code: ContentCode, ty: ValueType, payload: &[u8], depth: usize) -> Result<Value> {
    if let Some(width) = ty.fixed_width() {
        if payload.len() != width {
            return Err(DmapError::LengthMismatch {
                code,
                expected: width,
                actual: payload.len(),
            });
        }
    }

    let value = match ty {
        ValueType::U8 => Value::U8(payload[0]),
        ValueType::I8 => Value::I8(i8::from_be_bytes([payload[0]])),
        ValueType::U16 => Value::U16(u16::from_be_bytes([payload[0], payload[1]])),
        ValueType::I16 => Value::I16(i16::from_be_bytes([payload[0], payload[1]])),
        ValueType::U32 => Value::U32(u32::from_be_bytes(fixed(payload))),
        ValueType::I32 => Value::I32(i32::from_be_bytes(fixed(payload))),
        ValueType::U64 => Value::U64(u64::from_be_bytes(fixed(payload))),
        ValueType::I64 => Value::I64(i64::from_be_bytes(fixed(payload))),
        ValueType::Boolean => Value::Boolean(payload[0] != 0),
        ValueType::Version => Value::Version(Version::new(payload[0], payload[1], payload[2])),
        ValueType::Date => {
            let secs = u32::from_be_bytes(fixed(payload));
            let date = DateTime::from_timestamp(i64::from(secs), 0)
                .ok_or(DmapError::DateOutOfRange(code))?;
            Value::Date(date)
        }
        ValueType::String => Value::String(
            std::str::from_utf8(payload)
                .map_err(|_| DmapError::InvalidUtf8(code))?
                .to_string(),
        ),
        ValueType::Container => {
            let mut children = Vec::new();
            let mut offset = 0;
            while offset < payload.len() {
                let (child, used) = decode_at_depth(&payload[offset..], depth + 1)?;
                children.push(child);
                offset += used;
            }
            Value::Container(children)
        }
    };

    Ok(value)
}

/// Copy a slice whose length was already checked into a fixed array
fn fixed<const N: usize>(payload: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&payload[..N]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::codes::*;

    #[test]
    fn encodes_status_chunk() {
        let chunk = Chunk::new(MSTT, 200u32).unwrap();
        assert_eq!(
            encode(&chunk).as_ref(),
            b"mstt\x00\x00\x00\x04\x00\x00\x00\xc8"
        );
    }

    #[test]
    fn encodes_nested_container_length_in_bytes() {
        let chunk = Chunk::container(
            MUPD,
            vec![
                Chunk::new(MSTT, 200u32).unwrap(),
                Chunk::new(MUSR, 5u32).unwrap(),
            ],
        )
        .unwrap();
        let bytes = encode(&chunk);
        assert_eq!(&bytes[..8], b"mupd\x00\x00\x00\x18");
        assert_eq!(bytes.len(), 8 + 24);
        assert_eq!(decode(&bytes).unwrap(), chunk);
    }

    #[test]
    fn version_uses_three_bytes() {
        let chunk = Chunk::new(APRO, Version::new(3, 0, 2)).unwrap();
        assert_eq!(encode(&chunk).as_ref(), b"apro\x00\x00\x00\x03\x03\x00\x02");
    }

    #[test]
    fn unknown_code_aborts_decode() {
        let bytes = b"zzzz\x00\x00\x00\x01\x01";
        assert_eq!(
            decode(bytes).unwrap_err(),
            DmapError::UnknownCode(ContentCode::new(*b"zzzz"))
        );
    }

    #[test]
    fn unknown_child_aborts_enclosing_container() {
        let mut bytes = BytesMut::new();
        bytes.put_slice(b"mlcl");
        bytes.put_u32(9);
        bytes.put_slice(b"zzzz\x00\x00\x00\x01\x01");
        assert!(matches!(
            decode(&bytes),
            Err(DmapError::UnknownCode(_))
        ));
    }

    #[test]
    fn fixed_width_mismatch_is_an_error() {
        let bytes = b"mstt\x00\x00\x00\x02\x00\xc8";
        assert_eq!(
            decode(bytes).unwrap_err(),
            DmapError::LengthMismatch {
                code: MSTT,
                expected: 4,
                actual: 2
            }
        );
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let bytes = b"minm\x00\x00\x00\x10abc";
        assert!(matches!(
            decode(bytes),
            Err(DmapError::Truncated { needed: 24, available: 11 })
        ));
        assert!(matches!(decode(b"mst"), Err(DmapError::Truncated { .. })));
    }

    #[test]
    fn trailing_bytes_are_an_error() {
        let mut bytes = encode(&Chunk::new(MIKD, 2u8).unwrap()).to_vec();
        bytes.push(0);
        assert_eq!(decode(&bytes).unwrap_err(), DmapError::TrailingBytes(1));
    }

    #[test]
    fn invalid_utf8_is_an_error() {
        let bytes = b"minm\x00\x00\x00\x02\xff\xfe";
        assert_eq!(decode(bytes).unwrap_err(), DmapError::InvalidUtf8(MINM));
    }

    #[test]
    fn excessive_nesting_is_rejected() {
        let mut chunk = Chunk::new(MSTT, 1u32).unwrap();
        for _ in 0..=MAX_DEPTH {
            chunk = Chunk::container(MLCL, vec![chunk]).unwrap();
        }
        assert_eq!(
            decode(&encode(&chunk)).unwrap_err(),
            DmapError::TooDeep(MAX_DEPTH)
        );
    }
}
