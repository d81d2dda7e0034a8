//! Fiber (goroutine) control.
//!
//! A fiber is plain data: a program counter plus the heap addresses of its
//! innermost scope frame and its operand stack. The operand stack is a list
//! of cons cells whose items are value addresses, top first.

use gvm_common_core::FrameLabel;
use gvm_runtime::objects::{closure, list};
use gvm_runtime::{scope, Addr, Memory, NULL_ADDR};

use crate::vm::VmError;

pub type FiberId = u32;

/// Id of the fiber created by `Vm::new`.
pub const MAIN_FIBER: FiberId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiberStatus {
    Runnable,
    Breakpoint,
    TimeSliceExceeded,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fiber {
    pub id: FiberId,
    pub pc: usize,
    pub scope: Addr,
    pub stack: Addr,
    pub status: FiberStatus,
}

impl Fiber {
    pub fn new(id: FiberId, pc: usize, scope: Addr, stack: Addr) -> Self {
        Self {
            id,
            pc,
            scope,
            stack,
            status: FiberStatus::Runnable,
        }
    }

    #[inline]
    pub fn is_main(&self) -> bool {
        self.id == MAIN_FIBER
    }

    // =========================================================================
    // Operand stack
    // =========================================================================

    pub fn push(&mut self, mem: &mut Memory, value: Addr) -> Result<(), VmError> {
        self.stack = mem.alloc_pair(value, self.stack)?;
        Ok(())
    }

    pub fn pop(&mut self, mem: &Memory) -> Result<Addr, VmError> {
        let (top, rest) = self.top_cell(mem)?;
        self.stack = rest;
        Ok(top)
    }

    pub fn peek(&self, mem: &Memory) -> Result<Addr, VmError> {
        Ok(self.top_cell(mem)?.0)
    }

    /// Item `depth` places below the top, without popping.
    pub fn peek_nth(&self, mem: &Memory, depth: usize) -> Result<Addr, VmError> {
        let mut cell = self.stack;
        for _ in 0..depth {
            if cell == NULL_ADDR {
                return Err(VmError::StackUnderflow(self.id));
            }
            cell = mem.get_pair(cell)?.1;
        }
        if cell == NULL_ADDR {
            return Err(VmError::StackUnderflow(self.id));
        }
        Ok(mem.get_pair(cell)?.0)
    }

    /// Pop `n` items; the first element of the result was on top.
    pub fn pop_n(&mut self, mem: &Memory, n: usize) -> Result<Vec<Addr>, VmError> {
        (0..n).map(|_| self.pop(mem)).collect()
    }

    /// Every stack item, top first.
    pub fn stack_items(&self, mem: &Memory) -> Result<Vec<Addr>, VmError> {
        Ok(list::get(mem, self.stack)?)
    }

    fn top_cell(&self, mem: &Memory) -> Result<(Addr, Addr), VmError> {
        if self.stack == NULL_ADDR {
            return Err(VmError::StackUnderflow(self.id));
        }
        Ok(mem.get_pair(self.stack)?)
    }

    // =========================================================================
    // Frames
    // =========================================================================

    /// Enter a block declaring `symbols`.
    pub fn add_frame<S: AsRef<str>>(&mut self, mem: &mut Memory, symbols: &[S]) -> Result<(), VmError> {
        self.scope = scope::alloc_new_frame(mem, self.scope, symbols)?;
        self.pc += 1;
        Ok(())
    }

    /// Call `closure`: push a CALL frame returning to the next instruction in
    /// the current scope, then jump to the closure's entry in its captured scope.
    pub fn exec_fn(&mut self, mem: &mut Memory, closure: Addr) -> Result<(), VmError> {
        let (captured, entry) = closure::parts(mem, closure)?;
        self.scope = scope::alloc_new_call_frame(mem, self.pc + 1, self.scope, captured)?;
        self.pc = entry;
        Ok(())
    }

    /// Enter a loop declaring `symbols`; leaving it resumes at `exit`.
    pub fn exec_for<S: AsRef<str>>(&mut self, mem: &mut Memory, exit: usize, symbols: &[S]) -> Result<(), VmError> {
        self.scope = scope::alloc_new_special_frame(mem, exit, self.scope, FrameLabel::For, self.scope, symbols)?;
        self.pc += 1;
        Ok(())
    }

    /// Leave an ordinary block.
    pub fn exit_frame(&mut self, mem: &Memory) -> Result<(), VmError> {
        self.scope = scope::get_enclosing_frame(mem, self.scope)?;
        self.pc += 1;
        Ok(())
    }

    /// Unwind to the nearest `label` frame and resume its continuation.
    pub fn exit_special_frame(&mut self, mem: &Memory, label: FrameLabel) -> Result<(), VmError> {
        let k = scope::get_enclosing_special_frame(mem, self.scope, label)?;
        self.scope = k.rts;
        self.pc = k.pc;
        Ok(())
    }

    /// Unwind to the nearest FOR frame, staying inside it, and jump to `target`.
    pub fn continue_loop(&mut self, mem: &Memory, target: usize) -> Result<(), VmError> {
        let k = scope::get_enclosing_special_frame(mem, self.scope, FrameLabel::For)?;
        self.scope = k.frame;
        self.pc = target;
        Ok(())
    }
}
