//! Jump instructions: JOF

use gvm_runtime::Memory;

use crate::fiber::Fiber;
use crate::vm::VmError;

/// Pop a bool; jump to `target` when it is false.
pub fn exec_jof(fiber: &mut Fiber, mem: &Memory, target: usize) -> Result<(), VmError> {
    let cond = fiber.pop(mem)?;
    if mem.get_bool(cond)? {
        fiber.pc += 1;
    } else {
        fiber.pc = target;
    }
    Ok(())
}
