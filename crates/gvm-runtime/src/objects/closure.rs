//! Closure object operations.
//!
//! Layout: `BinaryPtr(captured_scope, pc_cell)` where `pc_cell` is an `Int`
//! record holding the entry program counter. A nil closure is `BinaryPtr(0, 0)`.

use crate::codec::{Addr, NULL_ADDR};
use crate::error::{Result, RuntimeError};
use crate::memory::{HeapValue, Memory};

/// Records allocated by `create`.
pub const RECORDS: usize = 2;

pub fn create(mem: &mut Memory, scope: Addr, pc: usize) -> Result<Addr> {
    let pc = i64::try_from(pc).map_err(|_| RuntimeError::IntOutOfRange(i64::MAX))?;
    mem.ensure_room(RECORDS)?;
    let pc_cell = mem.alloc(&HeapValue::Int(pc))?;
    mem.alloc_pair(scope, pc_cell)
}

/// Captured scope and entry pc of the closure at `addr`.
pub fn parts(mem: &Memory, addr: Addr) -> Result<(Addr, usize)> {
    let (scope, pc_cell) = mem.get_pair(addr)?;
    if pc_cell == NULL_ADDR {
        return Err(RuntimeError::NilDereference);
    }
    let pc = mem.get_int(pc_cell)?;
    let pc = usize::try_from(pc).map_err(|_| RuntimeError::IntOutOfRange(pc))?;
    Ok((scope, pc))
}
