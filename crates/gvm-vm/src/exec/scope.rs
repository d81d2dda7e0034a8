//! Scope instructions: DECL, ENTER_SCOPE, EXIT_SCOPE

use gvm_common_core::{ScopeExit, ValueType};
use gvm_runtime::{scope, HeapValue, Memory};

use crate::fiber::Fiber;
use crate::vm::VmError;

/// Bind `sym` to the zero value of `ty` in the innermost frame.
pub fn exec_decl(fiber: &mut Fiber, mem: &mut Memory, sym: &str, ty: &ValueType) -> Result<(), VmError> {
    scope::declare(mem, fiber.scope, sym, &HeapValue::zero(ty))?;
    Ok(())
}

pub fn exec_enter_scope(
    fiber: &mut Fiber,
    mem: &mut Memory,
    decls: &[String],
    for_exit: Option<usize>,
) -> Result<(), VmError> {
    match for_exit {
        Some(exit) => fiber.exec_for(mem, exit, decls),
        None => fiber.add_frame(mem, decls),
    }
}

pub fn exec_exit_scope(fiber: &mut Fiber, mem: &Memory, exit: &ScopeExit) -> Result<(), VmError> {
    match *exit {
        ScopeExit::Frame => fiber.exit_frame(mem),
        ScopeExit::Unwind(label) => fiber.exit_special_frame(mem, label),
        ScopeExit::Continue(target) => fiber.continue_loop(mem, target),
    }
}
