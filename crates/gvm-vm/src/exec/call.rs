//! CALL and GOROUTINE.

use gvm_common_core::GO_CALL_SEQUENCE;
use gvm_runtime::objects::list;
use gvm_runtime::Memory;

use crate::fiber::Fiber;
use crate::vm::{ExecResult, VmError};

/// Pop a closure and enter it.
pub fn exec_call(fiber: &mut Fiber, mem: &mut Memory) -> Result<(), VmError> {
    let closure = fiber.pop(mem)?;
    fiber.exec_fn(mem, closure)
}

/// Pop a closure and `argc` arguments into the operand stack of a new fiber.
///
/// The new fiber runs the call sequence that follows this instruction in the
/// spawner's scope; the spawner skips over it.
pub fn exec_goroutine(fiber: &mut Fiber, mem: &mut Memory, argc: usize) -> Result<ExecResult, VmError> {
    let closure = fiber.pop(mem)?;
    let mut items = Vec::with_capacity(argc + 1);
    items.push(closure);
    items.extend(fiber.pop_n(mem, argc)?);
    let stack = list::alloc(mem, &items)?;

    let spawned = ExecResult::Spawn {
        pc: fiber.pc + 1,
        scope: fiber.scope,
        stack,
    };
    fiber.pc += 1 + GO_CALL_SEQUENCE;
    Ok(spawned)
}
