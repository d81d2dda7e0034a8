//! TEST_AND_SET: the one atomic primitive mutexes and channels build on.
//!
//! Instructions never interleave, so the compare and the write below are
//! atomic with respect to every other fiber.

use gvm_runtime::{HeapValue, Memory};

use super::alu::deref;
use crate::fiber::Fiber;
use crate::vm::VmError;

/// Pop `desired`, `expected` and a pointer. If the pointer's target holds
/// `expected`, store `desired` there and push `true`; otherwise push `false`.
pub fn exec_test_and_set(fiber: &mut Fiber, mem: &mut Memory) -> Result<(), VmError> {
    let desired = fiber.pop(mem)?;
    let expected = fiber.pop(mem)?;
    let ptr = fiber.pop(mem)?;
    let target = deref(mem, ptr)?;

    let swapped = mem.load(target)? == mem.load(expected)?;
    if swapped {
        let value = mem.load(desired)?;
        mem.set(target, &value)?;
    }
    let result = mem.alloc(&HeapValue::Bool(swapped))?;
    fiber.push(mem, result)
}
