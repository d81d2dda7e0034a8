//! Copying (semispace) garbage collector.
//!
//! Live records are found breadth-first from the roots using the tag mark
//! bit, copied into the standby heap in visit order, and their address
//! fields rewritten through the old→new map. The roots are rewritten in
//! place, then the heaps swap and the old one is reset.

use std::collections::VecDeque;

use hashbrown::HashMap;

use crate::codec::{Addr, NULL_ADDR};
use crate::error::{Result, RuntimeError};
use crate::memory::Memory;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    pub collections: u64,
    pub records_copied: u64,
    pub records_freed: u64,
}

/// Outcome of one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcReport {
    /// Records in use before collecting.
    pub before: usize,
    /// Records carried over.
    pub live: usize,
}

impl GcReport {
    pub fn freed(&self) -> usize {
        self.before - self.live
    }
}

impl Memory {
    /// Addresses reachable from `roots`, in breadth-first order.
    pub fn reachable(&mut self, roots: &[Addr]) -> Result<Vec<Addr>> {
        let order = self.mark(roots);
        // Clear marks even if the traversal failed half way.
        let order = match order {
            Ok(order) => order,
            Err((visited, err)) => {
                self.unmark(&visited)?;
                return Err(err);
            }
        };
        self.unmark(&order)?;
        Ok(order)
    }

    fn mark(&mut self, roots: &[Addr]) -> std::result::Result<Vec<Addr>, (Vec<Addr>, RuntimeError)> {
        let mut order = Vec::new();
        let mut gray: VecDeque<Addr> = VecDeque::new();

        for &root in roots {
            if let Err(e) = self.shade(root, &mut order, &mut gray) {
                return Err((order, e));
            }
        }
        while let Some(addr) = gray.pop_front() {
            let children = match self.active.read(addr) {
                Ok(record) => record.children(),
                Err(e) => return Err((order, e)),
            };
            for child in children {
                if let Err(e) = self.shade(child, &mut order, &mut gray) {
                    return Err((order, e));
                }
            }
        }
        Ok(order)
    }

    fn shade(&mut self, addr: Addr, order: &mut Vec<Addr>, gray: &mut VecDeque<Addr>) -> Result<()> {
        if addr == NULL_ADDR {
            return Ok(());
        }
        if !self.active.set_marked(addr, true)? {
            order.push(addr);
            gray.push_back(addr);
        }
        Ok(())
    }

    fn unmark(&mut self, addrs: &[Addr]) -> Result<()> {
        for &addr in addrs {
            self.active.set_marked(addr, false)?;
        }
        Ok(())
    }

    /// Collect garbage. Every address in `roots` is rewritten to its new
    /// location; any other address held outside the heap becomes invalid.
    pub fn collect(&mut self, roots: &mut [Addr]) -> Result<GcReport> {
        let before = self.active.used();
        let order = self.reachable(roots)?;

        let mut forward: HashMap<Addr, Addr> = HashMap::with_capacity(order.len());
        self.standby.reset();
        for &old in &order {
            let new = self.standby.alloc()?;
            self.standby.write(new, &self.active.read(old)?)?;
            forward.insert(old, new);
        }

        let relocate = |addr: Addr| forward.get(&addr).copied().ok_or(RuntimeError::InvalidAddress(addr));
        for &new in forward.values() {
            let record = self.standby.read(new)?.try_map_children(relocate)?;
            self.standby.write(new, &record)?;
        }
        for root in roots.iter_mut() {
            if *root != NULL_ADDR {
                *root = relocate(*root)?;
            }
        }

        std::mem::swap(&mut self.active, &mut self.standby);
        self.standby.reset();

        let report = GcReport { before, live: order.len() };
        self.last_live = report.live;
        self.stats.collections += 1;
        self.stats.records_copied += report.live as u64;
        self.stats.records_freed += report.freed() as u64;
        tracing::debug!(
            before = report.before,
            live = report.live,
            freed = report.freed(),
            "garbage collection finished"
        );
        Ok(report)
    }
}
