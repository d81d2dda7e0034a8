//! String object operations.
//!
//! Layout: a chain of `String` records, each holding up to `STRING_CHUNK`
//! bytes and the address of the next chunk (NULL on the last one).
//! The empty string is a single empty chunk.

use crate::codec::{Addr, Record, RecordKind, StrChunk, NULL_ADDR, STRING_CHUNK};
use crate::error::{Result, RuntimeError};
use crate::memory::{confusion, Memory};

/// Number of records a string of `len` bytes occupies.
#[inline]
pub fn chunk_count(len: usize) -> usize {
    len.div_ceil(STRING_CHUNK).max(1)
}

/// Allocate every chunk after the first and return the head chunk, linked to
/// the allocated tail but not yet written anywhere.
pub(crate) fn alloc_tail(mem: &mut Memory, bytes: &[u8]) -> Result<StrChunk> {
    let mut pieces = bytes.chunks(STRING_CHUNK);
    let head = pieces.next().unwrap_or(&[]);
    let tail: Vec<&[u8]> = pieces.collect();

    let mut next = NULL_ADDR;
    for piece in tail.iter().rev() {
        next = mem.alloc_record(&Record::String(StrChunk::new(piece, next)))?;
    }
    Ok(StrChunk::new(head, next))
}

/// Walk the chunk chain starting at `addr`, feeding each chunk to `f`.
/// Stops early when `f` returns false.
fn walk<F>(mem: &Memory, addr: Addr, mut f: F) -> Result<()>
where
    F: FnMut(&[u8]) -> bool,
{
    let mut at = addr;
    // A well-formed chain cannot be longer than the heap.
    for _ in 0..=mem.used() {
        if at == NULL_ADDR {
            return Ok(());
        }
        match mem.record(at)? {
            Record::String(chunk) => {
                if !f(chunk.as_bytes()) {
                    return Ok(());
                }
                at = chunk.next;
            }
            other => return Err(confusion(at, RecordKind::String, &other)),
        }
    }
    Err(RuntimeError::InvalidAddress(at))
}

pub fn read(mem: &Memory, addr: Addr) -> Result<String> {
    if addr == NULL_ADDR {
        return Err(RuntimeError::InvalidAddress(addr));
    }
    let mut bytes = Vec::new();
    walk(mem, addr, |chunk| {
        bytes.extend_from_slice(chunk);
        true
    })?;
    String::from_utf8(bytes).map_err(|_| RuntimeError::InvalidUtf8(addr))
}

/// Compare the string at `addr` with `s` without materializing it.
pub fn equals(mem: &Memory, addr: Addr, s: &str) -> Result<bool> {
    let mut rest = s.as_bytes();
    let mut same = true;
    walk(mem, addr, |chunk| {
        same = rest.starts_with(chunk);
        rest = rest.get(chunk.len()..).unwrap_or(&[]);
        same
    })?;
    Ok(same && rest.is_empty())
}
