//! Virtual machine main structure.

mod types;

pub use types::{
    ExecResult, RunOutcome, StepOutcome, VmConfig, VmError, DEFAULT_HEAP_CAPACITY,
    DEFAULT_MAX_RUN_TIME, DEFAULT_TIME_SLICE,
};

use std::time::Instant;

use gvm_common_core::{CompiledFile, Instruction};
use gvm_runtime::{scope, Memory, NULL_ADDR};
use tracing::info;

use crate::exec;
use crate::fiber::{Fiber, FiberStatus, MAIN_FIBER};
use crate::scheduler::Scheduler;
use crate::sink::{PrintSink, TracingSink};

/// Steps between two wall-clock checks in `run`.
const CLOCK_CHECK_INTERVAL: u64 = 1024;

pub struct Vm {
    program: CompiledFile,
    pub(crate) memory: Memory,
    pub(crate) scheduler: Scheduler,
    pub(crate) sink: Box<dyn PrintSink>,
    config: VmConfig,
    halted: bool,
    steps: u64,
}

impl Vm {
    /// Create a machine whose output goes to `tracing`.
    pub fn new(program: CompiledFile, config: VmConfig) -> Result<Self, VmError> {
        Self::with_sink(program, config, TracingSink)
    }

    pub fn with_sink(
        program: CompiledFile,
        config: VmConfig,
        sink: impl PrintSink + 'static,
    ) -> Result<Self, VmError> {
        config.validate()?;
        let mut memory = Memory::new(config.heap_capacity, config.gc_threshold)?;
        let global = scope::alloc_new_frame::<&str>(&mut memory, NULL_ADDR, &[])?;
        let main = Fiber::new(MAIN_FIBER, 0, global, NULL_ADDR);
        info!(
            instructions = program.len(),
            heap_capacity = config.heap_capacity,
            time_slice = config.time_slice,
            "vm initialized"
        );
        Ok(Self {
            program,
            memory,
            scheduler: Scheduler::new(main, config.time_slice),
            sink: Box::new(sink),
            config,
            halted: false,
            steps: 0,
        })
    }

    /// Assemble a text listing and create a machine for it.
    pub fn from_listing(source: &str, config: VmConfig) -> Result<Self, VmError> {
        Self::new(CompiledFile::parse(source)?, config)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn program(&self) -> &CompiledFile {
        &self.program
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Instructions executed so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// Execute one instruction of the current fiber.
    pub fn step(&mut self) -> Result<StepOutcome, VmError> {
        if self.halted {
            return Err(VmError::MachineHalted);
        }
        let fiber = self.scheduler.current_mut();
        if fiber.status == FiberStatus::Breakpoint {
            fiber.status = FiberStatus::Runnable;
        }
        let pc = fiber.pc;

        let records = exec::alloc_estimate(fetch(&self.program, pc)?, self.scheduler.current(), &self.memory)?;
        self.reserve(records)?;

        let inst = fetch(&self.program, pc)?;
        let result = exec::execute(inst, self.scheduler.current_mut(), &mut self.memory, self.sink.as_mut())?;
        self.steps += 1;

        match result {
            ExecResult::Continue => self.scheduler.tick(),
            ExecResult::Yield => self.scheduler.yield_current(),
            ExecResult::Spawn { pc, scope, stack } => {
                self.scheduler.spawn(pc, scope, stack);
                self.scheduler.tick();
            }
            ExecResult::Breakpoint => {
                self.scheduler.current_mut().status = FiberStatus::Breakpoint;
                return Ok(StepOutcome::Breakpoint);
            }
            ExecResult::Done => {
                if self.scheduler.current().is_main() {
                    self.halt();
                    return Ok(StepOutcome::Halted);
                }
                // The main fiber is always current or queued, so the queue
                // is never empty here.
                self.scheduler.retire_current();
            }
        }
        Ok(StepOutcome::Running)
    }

    /// Step until the machine halts or a fiber hits a breakpoint.
    pub fn run(&mut self) -> Result<RunOutcome, VmError> {
        let started = Instant::now();
        loop {
            match self.step()? {
                StepOutcome::Running => {}
                StepOutcome::Breakpoint => return Ok(RunOutcome::Breakpoint),
                StepOutcome::Halted => return Ok(RunOutcome::Halted),
            }
            if self.steps % CLOCK_CHECK_INTERVAL == 0 {
                if let Some(limit) = self.config.max_run_time {
                    if started.elapsed() > limit {
                        return Err(VmError::InfiniteLoop(limit));
                    }
                }
            }
        }
    }

    /// Make room for `records` before an instruction runs, collecting at
    /// most once.
    fn reserve(&mut self, records: usize) -> Result<(), VmError> {
        if self.memory.collection_due() || !self.memory.has_room(records) {
            self.collect_garbage()?;
        }
        Ok(self.memory.ensure_room(records)?)
    }

    fn halt(&mut self) {
        self.halted = true;
        let stats = self.memory.stats();
        info!(
            steps = self.steps,
            abandoned = self.scheduler.fiber_count() - 1,
            collections = stats.collections,
            records_freed = stats.records_freed,
            "vm halted"
        );
    }
}

fn fetch(program: &CompiledFile, pc: usize) -> Result<&Instruction, VmError> {
    program.get(pc).ok_or(VmError::InvalidPc { pc, len: program.len() })
}

// =============================================================================
// State-passing API
// =============================================================================

/// Create the initial machine state for `program`.
pub fn initialize(program: CompiledFile, config: VmConfig) -> Result<Vm, VmError> {
    Vm::new(program, config)
}

/// Advance `vm` by one instruction. Returns `None` once the main fiber has
/// finished.
pub fn step(mut vm: Vm) -> Result<Option<Vm>, VmError> {
    match vm.step()? {
        StepOutcome::Halted => Ok(None),
        StepOutcome::Running | StepOutcome::Breakpoint => Ok(Some(vm)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::CollectSink;
    use gvm_runtime::RuntimeError;
    use pretty_assertions::assert_eq;

    fn vm(source: &str, config: VmConfig) -> (Vm, CollectSink) {
        let sink = CollectSink::new();
        let program = CompiledFile::parse(source).unwrap();
        (Vm::with_sink(program, config, sink.clone()).unwrap(), sink)
    }

    #[test]
    fn test_config_rejected() {
        let program = CompiledFile::parse("SYS_CALL done").unwrap();
        for config in [
            VmConfig::default().with_time_slice(0),
            VmConfig::default().with_heap_capacity(0),
            VmConfig::default().with_gc_threshold(1.5),
        ] {
            assert!(matches!(
                Vm::new(program.clone(), config),
                Err(VmError::Runtime(RuntimeError::Config(_)))
            ));
        }
    }

    #[test]
    fn test_breakpoint_resumes() {
        let (mut vm, sink) = vm(
            "LDC 1\nSYS_CALL breakpoint\nSYS_CALL print\nSYS_CALL done",
            VmConfig::default(),
        );
        assert_eq!(vm.run(), Ok(RunOutcome::Breakpoint));
        assert_eq!(vm.scheduler().current().status, FiberStatus::Breakpoint);
        assert_eq!(vm.step(), Ok(StepOutcome::Running));
        assert_eq!(vm.scheduler().current().status, FiberStatus::Runnable);
        assert_eq!(vm.run(), Ok(RunOutcome::Halted));
        assert_eq!(sink.output(), vec!["1"]);
        assert_eq!(vm.steps(), 4);
    }

    #[test]
    fn test_halted_machine() {
        let (mut vm, _) = vm("SYS_CALL done", VmConfig::default());
        assert_eq!(vm.step(), Ok(StepOutcome::Halted));
        assert!(vm.is_halted());
        assert_eq!(vm.step(), Err(VmError::MachineHalted));
    }

    #[test]
    fn test_running_off_the_end() {
        let (mut vm, _) = vm("NOP", VmConfig::default());
        assert_eq!(vm.step(), Ok(StepOutcome::Running));
        assert_eq!(vm.step(), Err(VmError::InvalidPc { pc: 1, len: 1 }));
    }

    #[test]
    fn test_state_passing() {
        let program = CompiledFile::parse("NOP\nSYS_CALL done").unwrap();
        let state = initialize(program, VmConfig::default()).unwrap();
        let state = step(state).unwrap().unwrap();
        assert_eq!(state.steps(), 1);
        assert!(step(state).unwrap().is_none());
    }
}
