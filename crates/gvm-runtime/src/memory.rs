//! Typed memory manager.
//!
//! Builds booleans, integers, strings and pointer cells on top of the
//! untyped allocator. Owns both semispaces; see `gc` for collection.

use core::fmt;

use gvm_common_core::ValueType;

use crate::codec::{Addr, Record, RecordKind, NULL_ADDR};
use crate::error::{Result, RuntimeError};
use crate::gc::GcStats;
use crate::heap::NodeHeap;
use crate::objects::string;

/// A decoded heap value. Strings are reassembled from their chunk chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeapValue {
    Bool(bool),
    Int(i64),
    String(String),
    BinaryPtr { child1: Addr, child2: Addr },
}

impl HeapValue {
    /// The nil pointer / nil closure.
    pub const NIL: HeapValue = HeapValue::BinaryPtr { child1: NULL_ADDR, child2: NULL_ADDR };

    /// A pointer cell referring to `target`.
    pub fn pointer(target: Addr) -> Self {
        HeapValue::BinaryPtr { child1: target, child2: NULL_ADDR }
    }

    /// Zero value of a declared type.
    pub fn zero(ty: &ValueType) -> Self {
        match ty {
            ValueType::Bool => HeapValue::Bool(false),
            ValueType::Int => HeapValue::Int(0),
            ValueType::String => HeapValue::String(String::new()),
            ValueType::Ref(_) => HeapValue::NIL,
        }
    }

    pub fn is_nil(&self) -> bool {
        *self == HeapValue::NIL
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            HeapValue::Bool(_) => RecordKind::Bool,
            HeapValue::Int(_) => RecordKind::Int,
            HeapValue::String(_) => RecordKind::String,
            HeapValue::BinaryPtr { .. } => RecordKind::BinaryPtr,
        }
    }

    /// Number of records this value occupies once allocated.
    pub fn records(&self) -> usize {
        match self {
            HeapValue::String(s) => string::chunk_count(s.len()),
            _ => 1,
        }
    }
}

impl fmt::Display for HeapValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeapValue::Bool(v) => write!(f, "{}", v),
            HeapValue::Int(v) => write!(f, "{}", v),
            HeapValue::String(s) => f.write_str(s),
            v if v.is_nil() => f.write_str("nil"),
            HeapValue::BinaryPtr { child1, .. } => write!(f, "&{}", child1),
        }
    }
}

pub struct Memory {
    pub(crate) active: NodeHeap,
    pub(crate) standby: NodeHeap,
    gc_threshold: Option<f64>,
    /// Records carried over by the last collection.
    pub(crate) last_live: usize,
    pub(crate) stats: GcStats,
}

impl Memory {
    /// Create two semispaces of `capacity` records each.
    ///
    /// `gc_threshold` is the usage ratio in (0, 1] past which `over_threshold`
    /// reports true.
    pub fn new(capacity: usize, gc_threshold: Option<f64>) -> Result<Self> {
        if let Some(ratio) = gc_threshold {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(RuntimeError::Config(format!(
                    "gc threshold {} is outside (0, 1]",
                    ratio
                )));
            }
        }
        Ok(Self {
            active: NodeHeap::new(capacity)?,
            standby: NodeHeap::new(capacity)?,
            gc_threshold,
            last_live: 0,
            stats: GcStats::default(),
        })
    }

    // =========================================================================
    // Capacity
    // =========================================================================

    #[inline]
    pub fn capacity(&self) -> usize {
        self.active.capacity()
    }

    #[inline]
    pub fn used(&self) -> usize {
        self.active.used()
    }

    #[inline]
    pub fn free(&self) -> usize {
        self.active.free()
    }

    #[inline]
    pub fn has_room(&self, records: usize) -> bool {
        records <= self.active.free()
    }

    /// Fail with `HeapOverflow` unless `records` more records fit.
    pub fn ensure_room(&self, records: usize) -> Result<()> {
        if self.has_room(records) {
            Ok(())
        } else {
            Err(RuntimeError::HeapOverflow {
                requested: records,
                free: self.free(),
                capacity: self.capacity(),
            })
        }
    }

    pub fn over_threshold(&self) -> bool {
        match self.gc_threshold {
            Some(ratio) => self.used() as f64 >= ratio * self.capacity() as f64,
            None => false,
        }
    }

    /// Whether a threshold-triggered collection should run now.
    ///
    /// Past the threshold, usage must also have doubled since the last
    /// collection. A live set above the threshold then collects only after
    /// as much garbage again has piled up, or when the heap is full.
    pub fn collection_due(&self) -> bool {
        self.over_threshold() && self.used() >= self.last_live.saturating_mul(2)
    }

    /// Records carried over by the last collection.
    pub fn last_live(&self) -> usize {
        self.last_live
    }

    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    // =========================================================================
    // Records
    // =========================================================================

    pub fn record(&self, addr: Addr) -> Result<Record> {
        self.active.read(addr)
    }

    pub(crate) fn write_record(&mut self, addr: Addr, record: &Record) -> Result<()> {
        self.active.write(addr, record)
    }

    pub(crate) fn alloc_record(&mut self, record: &Record) -> Result<Addr> {
        let addr = self.active.alloc()?;
        self.active.write(addr, record)?;
        Ok(addr)
    }

    // =========================================================================
    // Values
    // =========================================================================

    /// Decode the value at `addr`; NULL reads as `None`.
    pub fn get(&self, addr: Addr) -> Result<Option<HeapValue>> {
        if addr == NULL_ADDR {
            return Ok(None);
        }
        Ok(Some(match self.active.read(addr)? {
            Record::Bool(v) => HeapValue::Bool(v),
            Record::Int(v) => HeapValue::Int(v as i64),
            Record::String(_) => HeapValue::String(string::read(self, addr)?),
            Record::BinaryPtr(child1, child2) => HeapValue::BinaryPtr { child1, child2 },
        }))
    }

    /// Like `get`, but NULL is an error.
    pub fn load(&self, addr: Addr) -> Result<HeapValue> {
        self.get(addr)?.ok_or(RuntimeError::InvalidAddress(addr))
    }

    /// Replace the content at `addr`, keeping the address.
    ///
    /// For strings the first chunk is rewritten in place and the remaining
    /// chunks are freshly allocated.
    pub fn set(&mut self, addr: Addr, value: &HeapValue) -> Result<()> {
        if !self.active.contains(addr) {
            return Err(RuntimeError::InvalidAddress(addr));
        }
        self.ensure_room(value.records() - 1)?;
        let record = self.encode(value)?;
        self.active.write(addr, &record)
    }

    pub fn alloc(&mut self, value: &HeapValue) -> Result<Addr> {
        self.ensure_room(value.records())?;
        let record = self.encode(value)?;
        self.alloc_record(&record)
    }

    pub fn alloc_pair(&mut self, child1: Addr, child2: Addr) -> Result<Addr> {
        self.alloc_record(&Record::BinaryPtr(child1, child2))
    }

    /// Encode `value` as its head record, allocating any string tail.
    fn encode(&mut self, value: &HeapValue) -> Result<Record> {
        Ok(match value {
            HeapValue::Bool(v) => Record::Bool(*v),
            HeapValue::Int(v) => {
                Record::Int(i32::try_from(*v).map_err(|_| RuntimeError::IntOutOfRange(*v))?)
            }
            HeapValue::String(s) => Record::String(string::alloc_tail(self, s.as_bytes())?),
            HeapValue::BinaryPtr { child1, child2 } => Record::BinaryPtr(*child1, *child2),
        })
    }

    // =========================================================================
    // Typed access
    // =========================================================================

    pub fn get_bool(&self, addr: Addr) -> Result<bool> {
        match self.active.read(addr)? {
            Record::Bool(v) => Ok(v),
            other => Err(confusion(addr, RecordKind::Bool, &other)),
        }
    }

    pub fn get_int(&self, addr: Addr) -> Result<i64> {
        match self.active.read(addr)? {
            Record::Int(v) => Ok(v as i64),
            other => Err(confusion(addr, RecordKind::Int, &other)),
        }
    }

    pub fn get_string(&self, addr: Addr) -> Result<String> {
        string::read(self, addr)
    }

    /// Both children of a `BinaryPtr` record.
    pub fn get_pair(&self, addr: Addr) -> Result<(Addr, Addr)> {
        match self.active.read(addr)? {
            Record::BinaryPtr(c1, c2) => Ok((c1, c2)),
            other => Err(confusion(addr, RecordKind::BinaryPtr, &other)),
        }
    }

    /// One line per live record of the active heap, in address order.
    pub fn dump(&self) -> Result<Vec<String>> {
        self.active
            .addresses()
            .map(|addr| Ok(format!("{:>6}  {}", addr, self.active.read(addr)?)))
            .collect()
    }
}

pub(crate) fn confusion(addr: Addr, expected: RecordKind, found: &Record) -> RuntimeError {
    RuntimeError::TypeConfusion {
        addr,
        expected: expected.name(),
        found: found.kind().name(),
    }
}
