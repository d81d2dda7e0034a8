//! Composite objects built from heap records.
//!
//! Each submodule provides operations for a specific object type.

pub mod closure;
pub mod list;
pub mod string;
