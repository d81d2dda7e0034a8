//! Runtime errors.

use gvm_common_core::FrameLabel;
use thiserror::Error;

use crate::codec::Addr;

/// Faults raised by the heap, the typed memory layer and the scope model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("heap overflow: {requested} record(s) requested, {free} of {capacity} free")]
    HeapOverflow {
        requested: usize,
        free: usize,
        capacity: usize,
    },

    #[error("invalid heap address {0}")]
    InvalidAddress(Addr),

    #[error("unknown record tag {tag:#04x}")]
    UnknownTag { tag: u8 },

    #[error("type confusion at address {addr}: expected {expected}, found {found}")]
    TypeConfusion {
        addr: Addr,
        expected: &'static str,
        found: &'static str,
    },

    #[error("integer {0} does not fit in a heap record")]
    IntOutOfRange(i64),

    #[error("string at address {0} is not valid UTF-8")]
    InvalidUtf8(Addr),

    #[error("unbound symbol `{0}`")]
    UnboundSymbol(String),

    #[error("no enclosing {0} frame")]
    UnwindTargetNotFound(FrameLabel),

    #[error("innermost frame is a {0} frame and must be exited by label")]
    SpecialFrameExit(FrameLabel),

    #[error("nil pointer dereference")]
    NilDereference,

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
