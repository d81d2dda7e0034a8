//! Shared helpers for the integration tests.

#![allow(dead_code)]

use gvm_common_core::CompiledFile;
use gvm_vm::{CollectSink, RunOutcome, Vm, VmConfig, VmError};

pub struct Run {
    pub vm: Vm,
    pub sink: CollectSink,
    pub outcome: Result<RunOutcome, VmError>,
}

impl Run {
    pub fn output(&self) -> Vec<String> {
        self.sink.output()
    }
}

/// Assemble `source` and run it to completion.
pub fn run(source: &str) -> Run {
    run_with(source, VmConfig::default())
}

pub fn run_with(source: &str, config: VmConfig) -> Run {
    let program = CompiledFile::parse(source).expect("listing should assemble");
    let sink = CollectSink::new();
    let mut vm = Vm::with_sink(program, config, sink.clone()).expect("config should be valid");
    let outcome = vm.run();
    Run { vm, sink, outcome }
}
