//! GC root scanning for VM.
//!
//! Roots are the scope and operand-stack addresses of every fiber, current
//! and queued. Everything else on the heap is reached through them.

use gvm_runtime::{Addr, GcReport};

use crate::sink::PrintSource;
use crate::vm::{Vm, VmError};

impl Vm {
    /// Run a full collection and relocate every fiber's roots.
    pub fn collect_garbage(&mut self) -> Result<GcReport, VmError> {
        let mut roots: Vec<Addr> = self
            .scheduler
            .fibers()
            .flat_map(|fiber| [fiber.scope, fiber.stack])
            .collect();

        let report = self.memory.collect(&mut roots)?;

        for (fiber, moved) in self.scheduler.fibers_mut().zip(roots.chunks_exact(2)) {
            fiber.scope = moved[0];
            fiber.stack = moved[1];
        }
        self.sink.print(
            PrintSource::Component("GC"),
            &format!("freed {} of {} records, {} live", report.freed(), report.before, report.live),
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use crate::sink::CollectSink;
    use crate::vm::{StepOutcome, Vm, VmConfig};
    use gvm_common_core::CompiledFile;
    use gvm_runtime::{scope, HeapValue};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_roots_survive_collection() {
        let program = CompiledFile::parse(
            r#"
            ENTER_SCOPE [x]
            DECL x string
            LDC "kept across collections"
            LD x
            ASSIGN
            LDC 11
            LDC "garbage string value"
            POP
            SYS_CALL done
            "#,
        )
        .unwrap();
        let sink = CollectSink::new();
        let mut vm = Vm::with_sink(program, VmConfig::default(), sink.clone()).unwrap();
        for _ in 0..8 {
            assert_eq!(vm.step(), Ok(StepOutcome::Running));
        }

        let report = vm.collect_garbage().unwrap();
        assert!(report.freed() > 0);
        assert_eq!(vm.memory().used(), report.live);

        let fiber = vm.scheduler().current().clone();
        let x = scope::lookup(vm.memory(), fiber.scope, "x").unwrap();
        assert_eq!(x, HeapValue::String("kept across collections".into()));
        let top = fiber.peek(vm.memory()).unwrap();
        assert_eq!(vm.memory().load(top), Ok(HeapValue::Int(11)));
        assert_eq!(sink.component("GC").len(), 1);
    }
}
