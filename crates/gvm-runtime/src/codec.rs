//! Heap record codec.
//!
//! Every heap record has the same width:
//! ```text
//! byte 0      tag: bits 0-2 kind, bit 3 GC mark, bits 4-7 string chunk length
//! bytes 1..5  field A: address (little endian)
//! bytes 5..9  field B: payload (little endian)
//! ```
//! A `String` record keeps its next-chunk address in field A and up to
//! `STRING_CHUNK` bytes in field B.

use core::fmt;

use num_enum::TryFromPrimitive;

use crate::error::{Result, RuntimeError};

/// Heap address. 0 is NULL and is never allocated.
pub type Addr = u32;

pub const NULL_ADDR: Addr = 0;

pub const ADDR_BYTES: usize = 4;
pub const PAYLOAD_BYTES: usize = 4;
pub const RECORD_SIZE: usize = 1 + ADDR_BYTES + PAYLOAD_BYTES;

/// Bytes of string data carried by one record.
pub const STRING_CHUNK: usize = PAYLOAD_BYTES;

/// Integer domain of the payload field.
pub const MIN_INT: i64 = i32::MIN as i64;
pub const MAX_INT: i64 = i32::MAX as i64;

/// Largest record count a semispace may have; every address must fit field A.
pub const MAX_RECORDS: usize = (Addr::MAX - 1) as usize;

const KIND_MASK: u8 = 0b0000_0111;
const MARK_BIT: u8 = 0b0000_1000;
const LEN_SHIFT: u32 = 4;

const FIELD_A: core::ops::Range<usize> = 1..1 + ADDR_BYTES;
const FIELD_B: core::ops::Range<usize> = 1 + ADDR_BYTES..RECORD_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u8)]
pub enum RecordKind {
    Bool = 1,
    Int = 2,
    String = 3,
    BinaryPtr = 4,
}

impl RecordKind {
    pub fn name(&self) -> &'static str {
        match self {
            RecordKind::Bool => "bool",
            RecordKind::Int => "int",
            RecordKind::String => "string",
            RecordKind::BinaryPtr => "pointer",
        }
    }

    /// Decode the kind bits of a tag byte.
    pub fn from_tag(tag: u8) -> Result<Self> {
        Self::try_from(tag & KIND_MASK).map_err(|_| RuntimeError::UnknownTag { tag })
    }
}

#[inline]
pub fn is_marked(tag: u8) -> bool {
    tag & MARK_BIT != 0
}

#[inline]
pub fn with_mark(tag: u8, marked: bool) -> u8 {
    if marked {
        tag | MARK_BIT
    } else {
        tag & !MARK_BIT
    }
}

/// One chunk of a string: up to `STRING_CHUNK` bytes plus the next chunk.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct StrChunk {
    bytes: [u8; STRING_CHUNK],
    len: u8,
    pub next: Addr,
}

impl StrChunk {
    /// Build a chunk from at most `STRING_CHUNK` bytes; extra bytes are dropped.
    pub fn new(data: &[u8], next: Addr) -> Self {
        let len = data.len().min(STRING_CHUNK);
        let mut bytes = [0u8; STRING_CHUNK];
        bytes[..len].copy_from_slice(&data[..len]);
        StrChunk { bytes, len: len as u8, next }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

impl fmt::Debug for StrChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrChunk")
            .field("bytes", &String::from_utf8_lossy(self.as_bytes()))
            .field("next", &self.next)
            .finish()
    }
}

/// A decoded heap record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record {
    Bool(bool),
    Int(i32),
    String(StrChunk),
    BinaryPtr(Addr, Addr),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Bool(_) => RecordKind::Bool,
            Record::Int(_) => RecordKind::Int,
            Record::String(_) => RecordKind::String,
            Record::BinaryPtr(..) => RecordKind::BinaryPtr,
        }
    }

    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut out = [0u8; RECORD_SIZE];
        let (tag, a, b): (u8, Addr, [u8; PAYLOAD_BYTES]) = match *self {
            Record::Bool(v) => (RecordKind::Bool as u8, NULL_ADDR, (v as u32).to_le_bytes()),
            Record::Int(v) => (RecordKind::Int as u8, NULL_ADDR, v.to_le_bytes()),
            Record::String(chunk) => (
                RecordKind::String as u8 | (chunk.len << LEN_SHIFT),
                chunk.next,
                chunk.bytes,
            ),
            Record::BinaryPtr(c1, c2) => (RecordKind::BinaryPtr as u8, c1, c2.to_le_bytes()),
        };
        out[0] = tag;
        out[FIELD_A].copy_from_slice(&a.to_le_bytes());
        out[FIELD_B].copy_from_slice(&b);
        out
    }

    /// Decode a record. The mark bit is ignored.
    pub fn decode(bytes: &[u8; RECORD_SIZE]) -> Result<Self> {
        let tag = bytes[0];
        let mut a = [0u8; ADDR_BYTES];
        a.copy_from_slice(&bytes[FIELD_A]);
        let a = Addr::from_le_bytes(a);
        let mut b = [0u8; PAYLOAD_BYTES];
        b.copy_from_slice(&bytes[FIELD_B]);

        Ok(match RecordKind::from_tag(tag)? {
            RecordKind::Bool => Record::Bool(u32::from_le_bytes(b) != 0),
            RecordKind::Int => Record::Int(i32::from_le_bytes(b)),
            RecordKind::String => {
                let len = (tag >> LEN_SHIFT) as usize;
                if len > STRING_CHUNK {
                    return Err(RuntimeError::UnknownTag { tag });
                }
                Record::String(StrChunk::new(&b[..len], a))
            }
            RecordKind::BinaryPtr => Record::BinaryPtr(a, Addr::from_le_bytes(b)),
        })
    }

    /// Addresses the collector follows out of this record (NULL where absent).
    pub fn children(&self) -> [Addr; 2] {
        match *self {
            Record::String(chunk) => [chunk.next, NULL_ADDR],
            Record::BinaryPtr(c1, c2) => [c1, c2],
            Record::Bool(_) | Record::Int(_) => [NULL_ADDR, NULL_ADDR],
        }
    }

    /// Rewrite the address fields through `f`. NULL is passed through as-is.
    pub fn try_map_children<F>(self, mut f: F) -> Result<Self>
    where
        F: FnMut(Addr) -> Result<Addr>,
    {
        let mut map = |addr: Addr| if addr == NULL_ADDR { Ok(NULL_ADDR) } else { f(addr) };
        Ok(match self {
            Record::String(chunk) => Record::String(StrChunk { next: map(chunk.next)?, ..chunk }),
            Record::BinaryPtr(c1, c2) => Record::BinaryPtr(map(c1)?, map(c2)?),
            other => other,
        })
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Record::Bool(v) => write!(f, "BOOL {}", v),
            Record::Int(v) => write!(f, "INT {}", v),
            Record::String(chunk) => write!(
                f,
                "STRING {:?} -> {}",
                String::from_utf8_lossy(chunk.as_bytes()),
                chunk.next
            ),
            Record::BinaryPtr(c1, c2) => write!(f, "PTR {} {}", c1, c2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn round_trip(record: Record) {
        assert_eq!(Record::decode(&record.encode()), Ok(record));
    }

    #[test]
    fn test_record_size() {
        assert_eq!(RECORD_SIZE, 9);
        assert_eq!(MAX_INT, 2_147_483_647);
        assert_eq!(MIN_INT, -2_147_483_648);
    }

    #[test]
    fn test_round_trip_fixed() {
        round_trip(Record::Bool(true));
        round_trip(Record::Bool(false));
        round_trip(Record::Int(0));
        round_trip(Record::Int(i32::MIN));
        round_trip(Record::Int(i32::MAX));
        round_trip(Record::String(StrChunk::new(b"", NULL_ADDR)));
        round_trip(Record::String(StrChunk::new(b"abcd", 17)));
        round_trip(Record::BinaryPtr(NULL_ADDR, NULL_ADDR));
        round_trip(Record::BinaryPtr(1, Addr::MAX));
    }

    #[test]
    fn test_round_trip_sampled() {
        let mut rng = fastrand::Rng::with_seed(0x9e37);
        for _ in 0..1000 {
            round_trip(Record::Int(rng.i32(..)));
            round_trip(Record::BinaryPtr(rng.u32(..), rng.u32(..)));
            let len = rng.usize(0..=STRING_CHUNK);
            let data: Vec<u8> = (0..len).map(|_| rng.u8(b' '..=b'~')).collect();
            round_trip(Record::String(StrChunk::new(&data, rng.u32(..))));
        }
    }

    #[test]
    fn test_unknown_tag() {
        let mut bytes = Record::Int(5).encode();
        bytes[0] = 0;
        assert_eq!(Record::decode(&bytes), Err(RuntimeError::UnknownTag { tag: 0 }));
        bytes[0] = 7;
        assert_eq!(Record::decode(&bytes), Err(RuntimeError::UnknownTag { tag: 7 }));
    }

    #[test]
    fn test_corrupt_string_length() {
        let mut bytes = Record::String(StrChunk::new(b"ab", NULL_ADDR)).encode();
        bytes[0] = RecordKind::String as u8 | (7 << LEN_SHIFT);
        assert!(matches!(Record::decode(&bytes), Err(RuntimeError::UnknownTag { .. })));
    }

    #[test]
    fn test_mark_bit_is_transparent() {
        let mut bytes = Record::BinaryPtr(3, 4).encode();
        assert!(!is_marked(bytes[0]));
        bytes[0] = with_mark(bytes[0], true);
        assert!(is_marked(bytes[0]));
        assert_eq!(Record::decode(&bytes), Ok(Record::BinaryPtr(3, 4)));
        assert_eq!(with_mark(bytes[0], false), RecordKind::BinaryPtr as u8);
    }

    #[test]
    fn test_map_children_keeps_null() {
        let rec = Record::BinaryPtr(5, NULL_ADDR);
        let mapped = rec.try_map_children(|a| Ok(a * 10)).unwrap();
        assert_eq!(mapped, Record::BinaryPtr(50, NULL_ADDR));
        assert_eq!(Record::Int(3).children(), [NULL_ADDR, NULL_ADDR]);
    }
}
