//! Collections triggered by the executor.

mod common;

use common::run_with;
use gvm_runtime::RuntimeError;
use gvm_vm::{RunOutcome, VmConfig, VmError};
use pretty_assertions::assert_eq;

const GARBAGE_LOOP: &str = r#"
    DECL i int
    DECL keep string
    LDC "survives every collection"
    LD keep
    ASSIGN
    loop:
    LDC 300
    LD i
    ALU LT
    JOF @end
    LDC "garbage garbage garbage"
    POP
    LDC 1
    LD i
    ALU ADD
    LD i
    ASSIGN
    GOTO @loop
    end:
    LD keep
    LD i
    SYS_CALL print 2
    SYS_CALL done
"#;

#[test]
fn test_collects_on_overflow() {
    let r = run_with(GARBAGE_LOOP, VmConfig::default().with_heap_capacity(128));
    assert_eq!(r.outcome, Ok(RunOutcome::Halted));
    assert_eq!(r.output(), vec!["300 survives every collection"]);

    let stats = r.vm.memory().stats();
    assert!(stats.collections > 0);
    assert!(stats.records_freed > 0);
    assert_eq!(r.sink.component("GC").len() as u64, stats.collections);
}

#[test]
fn test_threshold_collects_earlier() {
    let lazy = run_with(GARBAGE_LOOP, VmConfig::default().with_heap_capacity(512));
    let eager = run_with(
        GARBAGE_LOOP,
        VmConfig::default().with_heap_capacity(512).with_gc_threshold(0.2),
    );
    assert_eq!(eager.output(), lazy.output());
    assert!(eager.vm.memory().stats().collections > lazy.vm.memory().stats().collections);
}

#[test]
fn test_live_data_overflows() {
    // s = s + "abcd" forever: the live string outgrows the heap.
    let r = run_with(
        r#"
        DECL s string
        grow:
        LDC "abcd"
        LD s
        ALU ADD
        LD s
        ASSIGN
        GOTO @grow
        "#,
        VmConfig::default().with_heap_capacity(64),
    );
    assert!(
        matches!(r.outcome, Err(VmError::Runtime(RuntimeError::HeapOverflow { capacity: 64, .. }))),
        "{:?}",
        r.outcome
    );
}

#[test]
fn test_large_live_set_does_not_collect_every_step() {
    // An 80-record string stays live, above a 64-record threshold.
    let program = format!(
        r#"
        DECL i int
        DECL big string
        LDC "{}"
        LD big
        ASSIGN
        loop:
        LDC 200
        LD i
        ALU LT
        JOF @end
        LDC 1
        LD i
        ALU ADD
        LD i
        ASSIGN
        GOTO @loop
        end:
        LD i
        SYS_CALL print
        SYS_CALL done
        "#,
        "x".repeat(320)
    );
    let r = run_with(
        &program,
        VmConfig::default().with_heap_capacity(256).with_gc_threshold(0.25),
    );
    assert_eq!(r.outcome, Ok(RunOutcome::Halted));
    assert_eq!(r.output(), vec!["200"]);

    let collections = r.vm.memory().stats().collections;
    assert!(collections > 0);
    assert!(
        collections * 20 < r.vm.steps(),
        "{} collections in {} steps",
        collections,
        r.vm.steps()
    );
}
