//! SYS_CALL: allocation helpers, printing and scheduler requests.

use gvm_common_core::SysCall;
use gvm_runtime::objects::closure;
use gvm_runtime::{HeapValue, Memory};

use crate::fiber::Fiber;
use crate::sink::{PrintSink, PrintSource};
use crate::vm::{ExecResult, VmError};

/// Run `call`. The caller advances the pc.
pub fn exec_sys_call(
    fiber: &mut Fiber,
    mem: &mut Memory,
    sink: &mut dyn PrintSink,
    call: &SysCall,
) -> Result<ExecResult, VmError> {
    match call {
        SysCall::Make(ty) => {
            let addr = mem.alloc(&HeapValue::zero(ty))?;
            fiber.push(mem, addr)?;
        }
        SysCall::New(ty) => {
            let cell = mem.alloc(&HeapValue::zero(ty))?;
            let ptr = mem.alloc(&HeapValue::pointer(cell))?;
            fiber.push(mem, ptr)?;
        }
        SysCall::MakeLambda(entry) => {
            let addr = closure::create(mem, fiber.scope, *entry)?;
            fiber.push(mem, addr)?;
        }
        SysCall::Print(n) => {
            let values = fiber.pop_n(mem, *n)?;
            let text = render(mem, &values)?.join(" ");
            sink.print(PrintSource::Thread(fiber.id), &text);
        }
        SysCall::PrintOs => {
            let items = fiber.stack_items(mem)?;
            let text = format!("[{}]", render(mem, &items)?.join(", "));
            sink.print(PrintSource::Thread(fiber.id), &text);
        }
        SysCall::PrintHeap => {
            for line in mem.dump()? {
                sink.print(PrintSource::Component("HEAP"), &line);
            }
        }
        SysCall::Breakpoint => return Ok(ExecResult::Breakpoint),
        SysCall::Yield => return Ok(ExecResult::Yield),
        SysCall::Done => return Ok(ExecResult::Done),
    }
    Ok(ExecResult::Continue)
}

fn render(mem: &Memory, addrs: &[gvm_runtime::Addr]) -> Result<Vec<String>, VmError> {
    let mut out = Vec::with_capacity(addrs.len());
    for &addr in addrs {
        out.push(mem.load(addr)?.to_string());
    }
    Ok(out)
}
