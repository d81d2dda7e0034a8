//! # gvm-common-core
//!
//! Types shared between the external compiler and the VM:
//! - `instruction` - the instruction set (opcodes, constants, declared types)
//! - `bytecode` - the `CompiledFile` container, its listing and assembler

pub mod instruction;
pub mod bytecode;

pub use instruction::{
    AluOp, Constant, FrameLabel, Instruction, Opcode, ScopeExit, SysCall, ValueType,
    GO_CALL_SEQUENCE,
};
pub use bytecode::{BytecodeError, CompiledFile, LabelMap};
