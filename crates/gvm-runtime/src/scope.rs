//! Lexical scope frames.
//!
//! A frame is `BinaryPtr(bindings, parent)`; `parent` is NULL for the global
//! frame. `bindings` is a flat association list alternating key and value
//! nodes:
//! ```text
//! key   = BinaryPtr(symbol_string, value_node)
//! value = BinaryPtr(value_cell, next_key)
//! ```
//! Lookup returns the value cell, so assignment rewrites the cell in place.
//!
//! Special frames also bind `__label` (`CALL` or `FOR`), `__pc` and
//! `__ptrToRts`, which together form the continuation used by return,
//! break and continue.

use gvm_common_core::FrameLabel;

use crate::codec::{Addr, NULL_ADDR};
use crate::error::{Result, RuntimeError};
use crate::memory::{HeapValue, Memory};
use crate::objects::string;

pub const LABEL_SYM: &str = "__label";
pub const PC_SYM: &str = "__pc";
pub const RTS_SYM: &str = "__ptrToRts";

/// Where a special frame resumes: `pc` in scope `rts`. `frame` is the special
/// frame itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Continuation {
    pub pc: usize,
    pub rts: Addr,
    pub frame: Addr,
}

// =============================================================================
// Sizes
// =============================================================================

/// Records allocated for one binding of `sym` to `value`.
pub fn binding_records(sym: &str, value: &HeapValue) -> usize {
    string::chunk_count(sym.len()) + 2 + value.records()
}

/// Records allocated by `alloc_new_frame`.
pub fn frame_records<S: AsRef<str>>(symbols: &[S]) -> usize {
    1 + symbols
        .iter()
        .map(|s| binding_records(s.as_ref(), &HeapValue::NIL))
        .sum::<usize>()
}

/// Records allocated by `alloc_new_special_frame`.
pub fn special_frame_records<S: AsRef<str>>(label: FrameLabel, symbols: &[S]) -> usize {
    frame_records(symbols)
        + binding_records(LABEL_SYM, &HeapValue::String(label.as_str().to_string()))
        + binding_records(PC_SYM, &HeapValue::Int(0))
        + binding_records(RTS_SYM, &HeapValue::NIL)
}

// =============================================================================
// Construction
// =============================================================================

/// Prepend `bindings` (in order) to the association list `next`.
fn alloc_bindings(mem: &mut Memory, bindings: &[(&str, HeapValue)], mut next: Addr) -> Result<Addr> {
    for (sym, value) in bindings.iter().rev() {
        let cell = mem.alloc(value)?;
        let key = mem.alloc(&HeapValue::String((*sym).to_string()))?;
        let value_node = mem.alloc_pair(cell, next)?;
        next = mem.alloc_pair(key, value_node)?;
    }
    Ok(next)
}

fn alloc_frame(mem: &mut Memory, parent: Addr, bindings: &[(&str, HeapValue)]) -> Result<Addr> {
    let needed = 1 + bindings.iter().map(|(s, v)| binding_records(s, v)).sum::<usize>();
    mem.ensure_room(needed)?;
    let assoc = alloc_bindings(mem, bindings, NULL_ADDR)?;
    mem.alloc_pair(assoc, parent)
}

/// Push a frame declaring `symbols` (each bound to nil) in front of `parent`.
pub fn alloc_new_frame<S: AsRef<str>>(mem: &mut Memory, parent: Addr, symbols: &[S]) -> Result<Addr> {
    let bindings: Vec<(&str, HeapValue)> = symbols
        .iter()
        .map(|s| (s.as_ref(), HeapValue::NIL))
        .collect();
    alloc_frame(mem, parent, &bindings)
}

/// Push a special frame in front of `base` whose continuation is `(pc, rts)`.
pub fn alloc_new_special_frame<S: AsRef<str>>(
    mem: &mut Memory,
    pc: usize,
    rts: Addr,
    label: FrameLabel,
    base: Addr,
    symbols: &[S],
) -> Result<Addr> {
    let pc = i64::try_from(pc).map_err(|_| RuntimeError::IntOutOfRange(i64::MAX))?;
    let mut bindings = vec![
        (LABEL_SYM, HeapValue::String(label.as_str().to_string())),
        (PC_SYM, HeapValue::Int(pc)),
        (RTS_SYM, HeapValue::pointer(rts)),
    ];
    bindings.extend(symbols.iter().map(|s| (s.as_ref(), HeapValue::NIL)));
    alloc_frame(mem, base, &bindings)
}

/// Frame for a function body: returns to `pc` in `rts`, runs in `callee`'s
/// captured scope.
pub fn alloc_new_call_frame(mem: &mut Memory, pc: usize, rts: Addr, callee: Addr) -> Result<Addr> {
    alloc_new_special_frame::<&str>(mem, pc, rts, FrameLabel::Call, callee, &[])
}

// =============================================================================
// Lookup
// =============================================================================

/// Value cell of `sym` in `frame` alone.
fn find_in_frame(mem: &Memory, frame: Addr, sym: &str) -> Result<Option<Addr>> {
    let (mut key, _) = mem.get_pair(frame)?;
    while key != NULL_ADDR {
        let (name, value_node) = mem.get_pair(key)?;
        let (cell, next) = mem.get_pair(value_node)?;
        if string::equals(mem, name, sym)? {
            return Ok(Some(cell));
        }
        key = next;
    }
    Ok(None)
}

/// Value cell bound to `sym`, innermost frame first.
pub fn lookup_addr(mem: &Memory, scope: Addr, sym: &str) -> Result<Addr> {
    let mut frame = scope;
    while frame != NULL_ADDR {
        if let Some(cell) = find_in_frame(mem, frame, sym)? {
            return Ok(cell);
        }
        frame = mem.get_pair(frame)?.1;
    }
    Err(RuntimeError::UnboundSymbol(sym.to_string()))
}

pub fn lookup(mem: &Memory, scope: Addr, sym: &str) -> Result<HeapValue> {
    let cell = lookup_addr(mem, scope, sym)?;
    mem.load(cell)
}

/// Overwrite the value of `sym`, keeping its cell.
pub fn assign(mem: &mut Memory, scope: Addr, sym: &str, value: &HeapValue) -> Result<()> {
    let cell = lookup_addr(mem, scope, sym)?;
    mem.set(cell, value)
}

/// Bind `sym` to `value` in the innermost frame, adding the binding if the
/// frame does not have one. Returns the value cell.
pub fn declare(mem: &mut Memory, scope: Addr, sym: &str, value: &HeapValue) -> Result<Addr> {
    if let Some(cell) = find_in_frame(mem, scope, sym)? {
        mem.set(cell, value)?;
        return Ok(cell);
    }
    mem.ensure_room(binding_records(sym, value))?;
    let (assoc, parent) = mem.get_pair(scope)?;
    let assoc = alloc_bindings(mem, &[(sym, value.clone())], assoc)?;
    mem.set(scope, &HeapValue::BinaryPtr { child1: assoc, child2: parent })?;
    let (_, value_node) = mem.get_pair(assoc)?;
    Ok(mem.get_pair(value_node)?.0)
}

/// Label of `frame` if it is a special frame.
pub fn frame_label(mem: &Memory, frame: Addr) -> Result<Option<FrameLabel>> {
    match find_in_frame(mem, frame, LABEL_SYM)? {
        Some(cell) => Ok(FrameLabel::from_name(&mem.get_string(cell)?)),
        None => Ok(None),
    }
}

// =============================================================================
// Unwinding
// =============================================================================

/// Drop the innermost frame. Special frames must be left by label.
pub fn get_enclosing_frame(mem: &Memory, scope: Addr) -> Result<Addr> {
    if let Some(label) = frame_label(mem, scope)? {
        return Err(RuntimeError::SpecialFrameExit(label));
    }
    Ok(mem.get_pair(scope)?.1)
}

/// Nearest special frame labelled `label` and its continuation.
pub fn get_enclosing_special_frame(mem: &Memory, scope: Addr, label: FrameLabel) -> Result<Continuation> {
    let mut frame = scope;
    while frame != NULL_ADDR {
        if frame_label(mem, frame)? == Some(label) {
            let pc_cell = slot(mem, frame, PC_SYM)?;
            let pc = mem.get_int(pc_cell)?;
            let pc = usize::try_from(pc).map_err(|_| RuntimeError::IntOutOfRange(pc))?;
            let rts = mem.get_pair(slot(mem, frame, RTS_SYM)?)?.0;
            return Ok(Continuation { pc, rts, frame });
        }
        frame = mem.get_pair(frame)?.1;
    }
    Err(RuntimeError::UnwindTargetNotFound(label))
}

fn slot(mem: &Memory, frame: Addr, sym: &str) -> Result<Addr> {
    find_in_frame(mem, frame, sym)?.ok_or_else(|| RuntimeError::UnboundSymbol(sym.to_string()))
}
