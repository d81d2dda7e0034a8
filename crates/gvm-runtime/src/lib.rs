//! # gvm-runtime
//!
//! Memory for the gvm virtual machine:
//! - `codec` - fixed-size tagged heap records and their byte encoding
//! - `heap` - the untyped bump allocator over one semispace
//! - `memory` - typed values on top of the allocator
//! - `objects` - strings, lists and closures built from records
//! - `scope` - heap-resident lexical frames and special frames
//! - `gc` - the copying collector

pub mod codec;
pub mod error;
pub mod gc;
pub mod heap;
pub mod memory;
pub mod objects;
pub mod scope;

pub use codec::{Addr, Record, RecordKind, MAX_INT, MIN_INT, NULL_ADDR};
pub use error::{Result, RuntimeError};
pub use gc::{GcReport, GcStats};
pub use memory::{HeapValue, Memory};
pub use scope::Continuation;
