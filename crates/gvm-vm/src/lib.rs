//! # gvm-vm
//!
//! Virtual machine for compiled Go programs: one shared heap, many fibers
//! (goroutines) scheduled round-robin on a single host thread.
//!
//! - `fiber` - per-goroutine state and frame/stack primitives
//! - `scheduler` - ready queue and time slicing
//! - `exec` - instruction semantics
//! - `gc_roots` - root scanning for the copying collector
//! - `sink` - where `print` output and diagnostics go
//! - `vm` - the machine, its configuration and the embedding API

pub mod exec;
pub mod fiber;
mod gc_roots;
pub mod scheduler;
pub mod sink;
pub mod vm;

pub use fiber::{Fiber, FiberId, FiberStatus, MAIN_FIBER};
pub use scheduler::Scheduler;
pub use sink::{CollectSink, PrintSink, PrintSource, TracingSink};
pub use vm::{
    initialize, step, ExecResult, RunOutcome, StepOutcome, Vm, VmConfig, VmError,
    DEFAULT_HEAP_CAPACITY, DEFAULT_MAX_RUN_TIME, DEFAULT_TIME_SLICE,
};
