//! Load/store instructions: LDC, LD, POP, ASSIGN

use gvm_common_core::Constant;
use gvm_runtime::{scope, Memory};

use super::constant_value;
use crate::fiber::Fiber;
use crate::vm::VmError;

/// Push a fresh cell holding the literal.
pub fn exec_ldc(fiber: &mut Fiber, mem: &mut Memory, c: &Constant) -> Result<(), VmError> {
    let addr = mem.alloc(&constant_value(c))?;
    fiber.push(mem, addr)
}

/// Push the value cell bound to `sym`.
pub fn exec_ld(fiber: &mut Fiber, mem: &mut Memory, sym: &str) -> Result<(), VmError> {
    let cell = scope::lookup_addr(mem, fiber.scope, sym)?;
    fiber.push(mem, cell)
}

pub fn exec_pop(fiber: &mut Fiber, mem: &Memory) -> Result<(), VmError> {
    fiber.pop(mem).map(|_| ())
}

/// Pop the target, then the source, and copy the source's value into the
/// target cell. Every alias of the target observes the write.
pub fn exec_assign(fiber: &mut Fiber, mem: &mut Memory) -> Result<(), VmError> {
    let target = fiber.pop(mem)?;
    let source = fiber.pop(mem)?;
    let value = mem.load(source)?;
    mem.set(target, &value)?;
    Ok(())
}
