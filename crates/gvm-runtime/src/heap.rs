//! Untyped record allocator.
//!
//! A fixed-capacity byte buffer of `RECORD_SIZE` slots, bump-allocated from
//! address 1. The allocator has no policy beyond failing when full; the
//! typed memory layer decides when to collect.

use crate::codec::{self, Addr, Record, MAX_RECORDS, NULL_ADDR, RECORD_SIZE};
use crate::error::{Result, RuntimeError};

pub struct NodeHeap {
    buf: Vec<u8>,
    capacity: usize,
    /// Next address to hand out.
    top: Addr,
}

impl NodeHeap {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(RuntimeError::Config("heap capacity must be non-zero".into()));
        }
        if capacity > MAX_RECORDS {
            return Err(RuntimeError::Config(format!(
                "heap capacity {} exceeds the addressable maximum {}",
                capacity, MAX_RECORDS
            )));
        }
        Ok(Self {
            buf: vec![0u8; capacity * RECORD_SIZE],
            capacity,
            top: 1,
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn used(&self) -> usize {
        (self.top - 1) as usize
    }

    #[inline]
    pub fn free(&self) -> usize {
        self.capacity - self.used()
    }

    /// Addresses handed out since the last reset, in allocation order.
    pub fn addresses(&self) -> impl Iterator<Item = Addr> {
        1..self.top
    }

    /// Whether `addr` has been handed out since the last reset.
    #[inline]
    pub fn contains(&self, addr: Addr) -> bool {
        addr != NULL_ADDR && addr < self.top
    }

    pub fn alloc(&mut self) -> Result<Addr> {
        if self.free() == 0 {
            return Err(self.overflow(1));
        }
        let addr = self.top;
        self.top += 1;
        Ok(addr)
    }

    /// Allocate `n` consecutive slots, or none at all.
    pub fn alloc_many(&mut self, n: usize) -> Result<Vec<Addr>> {
        if n > self.free() {
            return Err(self.overflow(n));
        }
        let start = self.top;
        self.top += n as Addr;
        Ok((start..self.top).collect())
    }

    pub fn read(&self, addr: Addr) -> Result<Record> {
        let slot = self.slot(addr)?;
        let mut bytes = [0u8; RECORD_SIZE];
        bytes.copy_from_slice(&self.buf[slot]);
        Record::decode(&bytes)
    }

    /// Overwrite the record at `addr`. Clears the mark bit.
    pub fn write(&mut self, addr: Addr, record: &Record) -> Result<()> {
        let slot = self.slot(addr)?;
        self.buf[slot].copy_from_slice(&record.encode());
        Ok(())
    }

    pub fn is_marked(&self, addr: Addr) -> Result<bool> {
        let slot = self.slot(addr)?;
        Ok(codec::is_marked(self.buf[slot.start]))
    }

    /// Set or clear the mark bit, returning its previous state.
    pub fn set_marked(&mut self, addr: Addr, marked: bool) -> Result<bool> {
        let slot = self.slot(addr)?;
        let tag = &mut self.buf[slot.start];
        let was = codec::is_marked(*tag);
        *tag = codec::with_mark(*tag, marked);
        Ok(was)
    }

    /// Forget every allocation. Subsequent addresses start from 1 again.
    pub fn reset(&mut self) {
        let used = self.used() * RECORD_SIZE;
        self.buf[..used].fill(0);
        self.top = 1;
    }

    fn slot(&self, addr: Addr) -> Result<core::ops::Range<usize>> {
        if !self.contains(addr) {
            return Err(RuntimeError::InvalidAddress(addr));
        }
        let start = (addr as usize - 1) * RECORD_SIZE;
        Ok(start..start + RECORD_SIZE)
    }

    fn overflow(&self, requested: usize) -> RuntimeError {
        RuntimeError::HeapOverflow {
            requested,
            free: self.free(),
            capacity: self.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_alloc_starts_at_one() {
        let mut heap = NodeHeap::new(4).unwrap();
        assert_eq!(heap.alloc().unwrap(), 1);
        assert_eq!(heap.alloc_many(2).unwrap(), vec![2, 3]);
        assert_eq!(heap.used(), 3);
        assert_eq!(heap.free(), 1);
    }

    #[test]
    fn test_addresses_strictly_increase() {
        let mut heap = NodeHeap::new(256).unwrap();
        let mut rng = fastrand::Rng::with_seed(7);
        let mut last = NULL_ADDR;
        while heap.free() > 0 {
            let n = rng.usize(1..=4).min(heap.free());
            for addr in heap.alloc_many(n).unwrap() {
                assert!(addr > last);
                last = addr;
            }
        }
        assert_eq!(last, 256);
    }

    #[test]
    fn test_overflow() {
        let mut heap = NodeHeap::new(2).unwrap();
        heap.alloc().unwrap();
        assert_eq!(
            heap.alloc_many(2),
            Err(RuntimeError::HeapOverflow { requested: 2, free: 1, capacity: 2 })
        );
        // A failed bulk allocation takes nothing.
        assert_eq!(heap.alloc().unwrap(), 2);
        assert!(matches!(heap.alloc(), Err(RuntimeError::HeapOverflow { .. })));
    }

    #[test]
    fn test_read_write() {
        let mut heap = NodeHeap::new(8).unwrap();
        let a = heap.alloc().unwrap();
        heap.write(a, &Record::Int(-12)).unwrap();
        assert_eq!(heap.read(a).unwrap(), Record::Int(-12));

        // Unwritten slots have no valid tag.
        let b = heap.alloc().unwrap();
        assert_eq!(heap.read(b), Err(RuntimeError::UnknownTag { tag: 0 }));
    }

    #[test]
    fn test_invalid_addresses() {
        let mut heap = NodeHeap::new(8).unwrap();
        heap.alloc().unwrap();
        assert_eq!(heap.read(0), Err(RuntimeError::InvalidAddress(0)));
        assert_eq!(heap.read(2), Err(RuntimeError::InvalidAddress(2)));
        assert_eq!(heap.write(9, &Record::Bool(true)), Err(RuntimeError::InvalidAddress(9)));
    }

    #[test]
    fn test_mark_and_reset() {
        let mut heap = NodeHeap::new(8).unwrap();
        let a = heap.alloc().unwrap();
        heap.write(a, &Record::BinaryPtr(0, 0)).unwrap();
        assert_eq!(heap.set_marked(a, true), Ok(false));
        assert_eq!(heap.is_marked(a), Ok(true));
        assert_eq!(heap.read(a).unwrap(), Record::BinaryPtr(0, 0));
        heap.write(a, &Record::Bool(false)).unwrap();
        assert_eq!(heap.is_marked(a), Ok(false));

        heap.reset();
        assert_eq!(heap.used(), 0);
        assert_eq!(heap.read(a), Err(RuntimeError::InvalidAddress(a)));
        assert_eq!(heap.alloc().unwrap(), 1);
    }

    #[test]
    fn test_bad_capacity() {
        assert!(matches!(NodeHeap::new(0), Err(RuntimeError::Config(_))));
        assert!(matches!(NodeHeap::new(MAX_RECORDS + 1), Err(RuntimeError::Config(_))));
    }
}
