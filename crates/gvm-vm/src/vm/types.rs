//! VM types and configuration.

use std::time::Duration;

use gvm_common_core::BytecodeError;
use gvm_runtime::{Addr, RuntimeError};
use thiserror::Error;

use crate::fiber::FiberId;

/// Time slice: number of instructions a fiber runs before it is preempted.
pub const DEFAULT_TIME_SLICE: u32 = 100;

pub const DEFAULT_HEAP_CAPACITY: usize = 65_536;

pub const DEFAULT_MAX_RUN_TIME: Duration = Duration::from_secs(10);

/// What one executed instruction asks of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecResult {
    Continue,
    /// Give up the rest of the time slice.
    Yield,
    Breakpoint,
    /// Enqueue a new fiber starting at `pc` in `scope` with operand stack `stack`.
    Spawn { pc: usize, scope: Addr, stack: Addr },
    Done,
}

/// Outcome of a single `Vm::step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Running,
    /// The current fiber stopped on `SYS_CALL breakpoint`.
    Breakpoint,
    /// The main fiber executed `SYS_CALL done`.
    Halted,
}

/// Outcome of `Vm::run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Breakpoint,
    Halted,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// Unknown opcodes and sys-call symbols are rejected when a listing is assembled.
    #[error(transparent)]
    Bytecode(#[from] BytecodeError),

    #[error("operand stack underflow in fiber {0}")]
    StackUnderflow(FiberId),

    #[error("program counter {pc} is outside the program ({len} instructions)")]
    InvalidPc { pc: usize, len: usize },

    #[error("unsupported operand(s) for {op}: {kinds}")]
    UnsupportedOperand { op: &'static str, kinds: String },

    #[error("integer division by zero")]
    DivisionByZero,

    #[error("program still running after {0:?}")]
    InfiniteLoop(Duration),

    #[error("machine has halted")]
    MachineHalted,
}

/// VM configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct VmConfig {
    /// Records per semispace.
    pub heap_capacity: usize,
    /// Heap usage ratio in (0, 1] that triggers a collection at the next
    /// instruction boundary. `None` collects only when an instruction would
    /// not fit.
    pub gc_threshold: Option<f64>,
    pub time_slice: u32,
    /// Wall-clock guard for `Vm::run`.
    pub max_run_time: Option<Duration>,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            heap_capacity: DEFAULT_HEAP_CAPACITY,
            gc_threshold: None,
            time_slice: DEFAULT_TIME_SLICE,
            max_run_time: Some(DEFAULT_MAX_RUN_TIME),
        }
    }
}

impl VmConfig {
    pub fn with_heap_capacity(mut self, records: usize) -> Self {
        self.heap_capacity = records;
        self
    }

    pub fn with_gc_threshold(mut self, ratio: f64) -> Self {
        self.gc_threshold = Some(ratio);
        self
    }

    pub fn with_time_slice(mut self, instructions: u32) -> Self {
        self.time_slice = instructions;
        self
    }

    pub fn with_max_run_time(mut self, limit: Option<Duration>) -> Self {
        self.max_run_time = limit;
        self
    }

    /// Heap capacity and threshold are checked by `Memory::new`.
    pub(crate) fn validate(&self) -> Result<(), RuntimeError> {
        if self.time_slice == 0 {
            return Err(RuntimeError::Config("time slice must be non-zero".into()));
        }
        if self.max_run_time == Some(Duration::ZERO) {
            return Err(RuntimeError::Config("max run time must be non-zero".into()));
        }
        Ok(())
    }
}
