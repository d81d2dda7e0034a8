//! Instruction execution.
//!
//! Each instruction runs against the current fiber and the shared heap.
//! Straight-line instructions fall through to `pc + 1`; control-flow
//! instructions set the pc themselves.

mod alu;
mod call;
mod jump;
mod load;
mod scope;
mod sync;
mod sys_call;

use gvm_common_core::{AluOp, Constant, FrameLabel, Instruction, SysCall};
use gvm_runtime::objects::{closure, string};
use gvm_runtime::scope as frames;
use gvm_runtime::{HeapValue, Memory};

use crate::fiber::Fiber;
use crate::sink::PrintSink;
use crate::vm::{ExecResult, VmError};

pub(crate) fn constant_value(c: &Constant) -> HeapValue {
    match c {
        Constant::Nil => HeapValue::NIL,
        Constant::Bool(b) => HeapValue::Bool(*b),
        Constant::Int(i) => HeapValue::Int(*i),
        Constant::String(s) => HeapValue::String(s.clone()),
    }
}

/// Execute one instruction of `fiber`.
pub fn execute(
    inst: &Instruction,
    fiber: &mut Fiber,
    mem: &mut Memory,
    sink: &mut dyn PrintSink,
) -> Result<ExecResult, VmError> {
    match inst {
        Instruction::Nop | Instruction::Reset | Instruction::Clear => {}
        Instruction::Ldc(c) => load::exec_ldc(fiber, mem, c)?,
        Instruction::Ld(sym) => load::exec_ld(fiber, mem, sym)?,
        Instruction::Pop => load::exec_pop(fiber, mem)?,
        Instruction::Assign => load::exec_assign(fiber, mem)?,
        Instruction::Decl { sym, ty } => scope::exec_decl(fiber, mem, sym, ty)?,
        Instruction::Alu(op) => alu::exec_alu(fiber, mem, *op)?,
        Instruction::TestAndSet => sync::exec_test_and_set(fiber, mem)?,

        Instruction::Jof(target) => {
            jump::exec_jof(fiber, mem, *target)?;
            return Ok(ExecResult::Continue);
        }
        Instruction::Goto(target) => {
            fiber.pc = *target;
            return Ok(ExecResult::Continue);
        }
        Instruction::EnterScope { decls, for_exit } => {
            scope::exec_enter_scope(fiber, mem, decls, *for_exit)?;
            return Ok(ExecResult::Continue);
        }
        Instruction::ExitScope(exit) => {
            scope::exec_exit_scope(fiber, mem, exit)?;
            return Ok(ExecResult::Continue);
        }
        Instruction::Call => {
            call::exec_call(fiber, mem)?;
            return Ok(ExecResult::Continue);
        }
        Instruction::Goroutine(argc) => return call::exec_goroutine(fiber, mem, *argc),
        Instruction::SysCall(call) => {
            let result = sys_call::exec_sys_call(fiber, mem, sink, call)?;
            fiber.pc += 1;
            return Ok(result);
        }
    }
    fiber.pc += 1;
    Ok(ExecResult::Continue)
}

/// Upper bound on the records `inst` allocates when run by `fiber`.
///
/// Reserving this before executing lets the collector run at the instruction
/// boundary instead of in the middle of an instruction.
pub fn alloc_estimate(inst: &Instruction, fiber: &Fiber, mem: &Memory) -> Result<usize, VmError> {
    // Every push allocates one stack cell.
    const PUSH: usize = 1;

    let records = match inst {
        Instruction::Nop
        | Instruction::Reset
        | Instruction::Clear
        | Instruction::Pop
        | Instruction::Jof(_)
        | Instruction::Goto(_)
        | Instruction::ExitScope(_) => 0,
        Instruction::Ldc(c) => constant_value(c).records() + PUSH,
        Instruction::Ld(_) => PUSH,
        Instruction::Decl { sym, ty } => frames::binding_records(sym, &HeapValue::zero(ty)),
        Instruction::EnterScope { decls, for_exit } => match for_exit {
            Some(_) => frames::special_frame_records(FrameLabel::For, decls.as_slice()),
            None => frames::frame_records(decls.as_slice()),
        },
        // Writing a string reuses the target's record for the first chunk.
        Instruction::Assign => value_records(fiber, mem, 1)?.saturating_sub(1),
        Instruction::Call => frames::special_frame_records::<&str>(FrameLabel::Call, &[]),
        Instruction::Alu(op) => match op {
            AluOp::Add => match (value_at(fiber, mem, 0)?, value_at(fiber, mem, 1)?) {
                (HeapValue::String(a), HeapValue::String(b)) => string::chunk_count(a.len() + b.len()) + PUSH,
                _ => 1 + PUSH,
            },
            AluOp::Deref => PUSH,
            _ => 1 + PUSH,
        },
        Instruction::TestAndSet => value_records(fiber, mem, 0)?.saturating_sub(1) + 1 + PUSH,
        Instruction::Goroutine(argc) => argc + 1,
        Instruction::SysCall(call) => match call {
            SysCall::Make(ty) => HeapValue::zero(ty).records() + PUSH,
            SysCall::New(ty) => HeapValue::zero(ty).records() + 1 + PUSH,
            SysCall::MakeLambda(_) => closure::RECORDS + PUSH,
            SysCall::Print(_)
            | SysCall::PrintOs
            | SysCall::PrintHeap
            | SysCall::Breakpoint
            | SysCall::Yield
            | SysCall::Done => 0,
        },
    };
    Ok(records)
}

fn value_at(fiber: &Fiber, mem: &Memory, depth: usize) -> Result<HeapValue, VmError> {
    let addr = fiber.peek_nth(mem, depth)?;
    Ok(mem.load(addr)?)
}

fn value_records(fiber: &Fiber, mem: &Memory, depth: usize) -> Result<usize, VmError> {
    Ok(value_at(fiber, mem, depth)?.records())
}
