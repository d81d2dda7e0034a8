//! Singly linked list operations.
//!
//! Layout: one `BinaryPtr(item, next)` cell per element, NULL-terminated.
//! The empty list is NULL.

use crate::codec::{Addr, Record, NULL_ADDR};
use crate::error::{Result, RuntimeError};
use crate::memory::Memory;

/// Build a list of `items`, returning its head.
pub fn alloc(mem: &mut Memory, items: &[Addr]) -> Result<Addr> {
    mem.ensure_room(items.len())?;
    let mut head = NULL_ADDR;
    for &item in items.iter().rev() {
        head = mem.alloc_pair(item, head)?;
    }
    Ok(head)
}

/// Cell addresses of the list starting at `head`.
fn cells(mem: &Memory, head: Addr) -> Result<Vec<Addr>> {
    let mut out = Vec::new();
    let mut at = head;
    while at != NULL_ADDR {
        if out.len() > mem.used() {
            return Err(RuntimeError::InvalidAddress(at));
        }
        out.push(at);
        at = mem.get_pair(at)?.1;
    }
    Ok(out)
}

/// Items of the list starting at `head`.
pub fn get(mem: &Memory, head: Addr) -> Result<Vec<Addr>> {
    cells(mem, head)?
        .into_iter()
        .map(|cell| Ok(mem.get_pair(cell)?.0))
        .collect()
}

/// Overwrite the list at `head` with `items`, reusing its cells and growing or
/// truncating as needed. Returns the (possibly new) head.
pub fn set(mem: &mut Memory, head: Addr, items: &[Addr]) -> Result<Addr> {
    let cells = cells(mem, head)?;
    let keep = items.len().min(cells.len());
    let rest = alloc(mem, &items[keep..])?;
    if keep == 0 {
        return Ok(rest);
    }
    for i in 0..keep {
        let next = if i + 1 < keep { cells[i + 1] } else { rest };
        mem.write_record(cells[i], &Record::BinaryPtr(items[i], next))?;
    }
    Ok(head)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::HeapValue;
    use pretty_assertions::assert_eq;

    fn ints(mem: &mut Memory, values: &[i64]) -> Vec<Addr> {
        values.iter().map(|&v| mem.alloc(&HeapValue::Int(v)).unwrap()).collect()
    }

    #[test]
    fn test_alloc_and_get() {
        let mut mem = Memory::new(32, None).unwrap();
        let items = ints(&mut mem, &[1, 2, 3]);
        let head = alloc(&mut mem, &items).unwrap();
        assert_eq!(get(&mem, head).unwrap(), items);
        assert_eq!(alloc(&mut mem, &[]).unwrap(), NULL_ADDR);
        assert_eq!(get(&mem, NULL_ADDR).unwrap(), Vec::<Addr>::new());
    }

    #[test]
    fn test_set_grow_and_shrink() {
        let mut mem = Memory::new(64, None).unwrap();
        let items = ints(&mut mem, &[1, 2, 3, 4, 5]);
        let head = alloc(&mut mem, &items[..2]).unwrap();

        let grown = set(&mut mem, head, &items).unwrap();
        assert_eq!(grown, head);
        assert_eq!(get(&mem, head).unwrap(), items);

        let shrunk = set(&mut mem, head, &items[3..]).unwrap();
        assert_eq!(shrunk, head);
        assert_eq!(get(&mem, head).unwrap(), items[3..].to_vec());

        assert_eq!(set(&mut mem, head, &[]).unwrap(), NULL_ADDR);
        let fresh = set(&mut mem, NULL_ADDR, &items[..1]).unwrap();
        assert_eq!(get(&mem, fresh).unwrap(), items[..1].to_vec());
    }
}
