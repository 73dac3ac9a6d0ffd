//! Chunk: the generic tagged value node

use crate::code::{ContentCode, ValueType};
use crate::error::{DmapError, Result};
use crate::registry::registry;
use crate::value::Value;
use chrono::{DateTime, Timelike, Utc};
use std::fmt::Write as _;

/// Header bytes preceding every payload (code + u32 length)
pub const HEADER_LEN: usize = 8;

/// A content code with its value
///
/// Construction validates the value against the registry, so a `Chunk` that
/// exists can always be encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    code: ContentCode,
    value: Value,
    payload_len: usize,
}

impl Chunk {
    /// Create a chunk, checking the code is registered with the value's type
    pub fn new(code: ContentCode, value: impl Into<Value>) -> Result<Self> {
        let value = value.into();
        let entry = registry().require(code)?;

        if entry.value_type != value.value_type() {
            return Err(DmapError::TypeMismatch {
                code,
                expected: entry.value_type,
                actual: value.value_type(),
            });
        }

        let value = match value {
            Value::Date(date) => Value::Date(normalize_date(code, date)?),
            other => other,
        };

        let payload_len = match &value {
            Value::String(s) => s.len(),
            Value::Container(children) => children.iter().map(Chunk::encoded_len).sum(),
            other => other.value_type().fixed_width().unwrap_or_default(),
        };

        if u32::try_from(payload_len).is_err() {
            return Err(DmapError::PayloadTooLarge {
                code,
                len: payload_len,
            });
        }

        Ok(Self {
            code,
            value,
            payload_len,
        })
    }

    /// Create a container chunk
    pub fn container(code: ContentCode, children: Vec<Chunk>) -> Result<Self> {
        Self::new(code, Value::Container(children))
    }

    pub fn code(&self) -> ContentCode {
        self.code
    }

    /// Semantic name from the registry (`dmap.status`)
    pub fn name(&self) -> &'static str {
        registry().get(self.code).map_or("unknown", |e| e.name)
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn value_type(&self) -> ValueType {
        self.value.value_type()
    }

    pub fn is_container(&self) -> bool {
        matches!(self.value, Value::Container(_))
    }

    /// Children of a container; empty for scalars
    pub fn children(&self) -> &[Chunk] {
        match &self.value {
            Value::Container(children) => children,
            _ => &[],
        }
    }

    /// First direct child with the given code
    pub fn child(&self, code: ContentCode) -> Option<&Chunk> {
        self.children().iter().find(|c| c.code == code)
    }

    /// Integer value of the first direct child with the given code
    pub fn child_u64(&self, code: ContentCode) -> Option<u64> {
        self.child(code).and_then(|c| c.value.as_u64())
    }

    /// String value of the first direct child with the given code
    pub fn child_str(&self, code: ContentCode) -> Option<&str> {
        self.child(code).and_then(|c| c.value.as_str())
    }

    /// Payload length in bytes (the value written in the length field)
    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    /// Total encoded length including the header
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.payload_len
    }

    /// Indented tree rendering with semantic names, for diagnostics
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_into(&mut out, 0);
        out
    }

    fn dump_into(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        match &self.value {
            Value::Container(children) => {
                let _ = writeln!(out, "{indent}{} {} ({} bytes)", self.code, self.name(), self.payload_len);
                for child in children {
                    child.dump_into(out, depth + 1);
                }
            }
            value => {
                let _ = writeln!(out, "{indent}{} {} = {value}", self.code, self.name());
            }
        }
    }
}

/// Dates travel as u32 seconds; drop sub-second precision and reject values
/// outside the representable range.
fn normalize_date(code: ContentCode, date: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let secs = date.timestamp();
    if u32::try_from(secs).is_err() {
        return Err(DmapError::DateOutOfRange(code));
    }
    date.with_nanosecond(0).ok_or(DmapError::DateOutOfRange(code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::codes::*;
    use crate::value::Version;
    use chrono::TimeZone;

    #[test]
    fn rejects_unknown_codes() {
        let err = Chunk::new(ContentCode::new(*b"xxxx"), 1u32).unwrap_err();
        assert_eq!(err, DmapError::UnknownCode(ContentCode::new(*b"xxxx")));
    }

    #[test]
    fn rejects_wrong_value_type() {
        let err = Chunk::new(MSTT, "200").unwrap_err();
        assert!(matches!(err, DmapError::TypeMismatch { expected: ValueType::U32, .. }));
    }

    #[test]
    fn container_length_counts_bytes_not_children() {
        let chunk = Chunk::container(
            MLIT,
            vec![
                Chunk::new(MIID, 7u32).unwrap(),
                Chunk::new(MINM, "abc").unwrap(),
            ],
        )
        .unwrap();
        // (8 + 4) + (8 + 3)
        assert_eq!(chunk.payload_len(), 23);
        assert_eq!(chunk.children().len(), 2);
        assert_eq!(chunk.child_u64(MIID), Some(7));
        assert_eq!(chunk.child_str(MINM), Some("abc"));
    }

    #[test]
    fn dates_are_truncated_to_seconds() {
        let date = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let chunk = Chunk::new(ASDA, date).unwrap();
        assert_eq!(
            chunk.value(),
            &Value::Date(Utc.timestamp_opt(1_700_000_000, 0).unwrap())
        );
    }

    #[test]
    fn dates_before_epoch_are_rejected() {
        let date = Utc.timestamp_opt(-5, 0).unwrap();
        assert_eq!(
            Chunk::new(ASDA, date).unwrap_err(),
            DmapError::DateOutOfRange(ASDA)
        );
    }

    #[test]
    fn dump_names_fields() {
        let chunk = Chunk::container(
            MSRV,
            vec![
                Chunk::new(MSTT, 200u32).unwrap(),
                Chunk::new(MPRO, Version::new(2, 0, 0)).unwrap(),
            ],
        )
        .unwrap();
        let dump = chunk.dump();
        assert!(dump.contains("msrv dmap.serverinforesponse"));
        assert!(dump.contains("  mstt dmap.status = 200"));
        assert!(dump.contains("  mpro dmap.protocolversion = 2.0.0"));
    }
}
