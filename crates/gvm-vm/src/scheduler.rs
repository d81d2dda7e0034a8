//! Round-robin fiber scheduler.
//!
//! One current fiber plus a FIFO ready queue. Every executed instruction
//! costs one unit of the current time slice; when the slice runs out the
//! current fiber moves to the back of the queue and the head takes over.
//! With an empty queue the current fiber simply keeps running.

use std::collections::VecDeque;

use tracing::{debug, trace};

use crate::fiber::{Fiber, FiberId, FiberStatus};

pub struct Scheduler {
    current: Fiber,
    ready: VecDeque<Fiber>,
    time_slice: u32,
    remaining: u32,
    next_id: FiberId,
}

impl Scheduler {
    pub fn new(main: Fiber, time_slice: u32) -> Self {
        let next_id = main.id + 1;
        Self {
            current: main,
            ready: VecDeque::new(),
            time_slice,
            remaining: time_slice,
            next_id,
        }
    }

    #[inline]
    pub fn current(&self) -> &Fiber {
        &self.current
    }

    #[inline]
    pub fn current_mut(&mut self) -> &mut Fiber {
        &mut self.current
    }

    /// Fibers waiting for their turn, in queue order.
    pub fn ready(&self) -> impl Iterator<Item = &Fiber> {
        self.ready.iter()
    }

    /// Current fiber first, then the ready queue.
    pub fn fibers(&self) -> impl Iterator<Item = &Fiber> {
        std::iter::once(&self.current).chain(self.ready.iter())
    }

    /// Same order as `fibers`.
    pub fn fibers_mut(&mut self) -> impl Iterator<Item = &mut Fiber> {
        std::iter::once(&mut self.current).chain(self.ready.iter_mut())
    }

    pub fn fiber_count(&self) -> usize {
        1 + self.ready.len()
    }

    /// Queue a new fiber and return its id.
    pub fn spawn(&mut self, pc: usize, scope: gvm_runtime::Addr, stack: gvm_runtime::Addr) -> FiberId {
        let id = self.next_id;
        self.next_id += 1;
        self.ready.push_back(Fiber::new(id, pc, scope, stack));
        debug!(fiber = id, parent = self.current.id, pc, "goroutine spawned");
        id
    }

    /// Charge one instruction to the current slice.
    pub fn tick(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.preempt();
        }
    }

    /// Give up the rest of the current slice.
    pub fn yield_current(&mut self) {
        self.preempt();
    }

    fn preempt(&mut self) {
        self.remaining = self.time_slice;
        let Some(mut next) = self.ready.pop_front() else {
            return;
        };
        next.status = FiberStatus::Runnable;
        let mut prev = std::mem::replace(&mut self.current, next);
        if prev.status == FiberStatus::Runnable {
            prev.status = FiberStatus::TimeSliceExceeded;
        }
        trace!(from = prev.id, to = self.current.id, "fiber switch");
        self.ready.push_back(prev);
    }

    /// Drop the finished current fiber and switch to the head of the queue.
    /// Returns `None`, keeping the current fiber, if nothing else is ready.
    pub fn retire_current(&mut self) -> Option<Fiber> {
        let mut next = self.ready.pop_front()?;
        next.status = FiberStatus::Runnable;
        self.remaining = self.time_slice;
        let mut done = std::mem::replace(&mut self.current, next);
        done.status = FiberStatus::Done;
        debug!(fiber = done.id, "goroutine finished");
        Some(done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiber::MAIN_FIBER;
    use gvm_runtime::NULL_ADDR;
    use pretty_assertions::assert_eq;

    fn scheduler(slice: u32) -> Scheduler {
        Scheduler::new(Fiber::new(MAIN_FIBER, 0, NULL_ADDR, NULL_ADDR), slice)
    }

    fn order(s: &Scheduler) -> Vec<FiberId> {
        s.fibers().map(|f| f.id).collect()
    }

    #[test]
    fn test_alone_keeps_running() {
        let mut s = scheduler(2);
        for _ in 0..5 {
            s.tick();
        }
        assert_eq!(s.current().id, MAIN_FIBER);
        assert_eq!(s.current().status, FiberStatus::Runnable);
    }

    #[test]
    fn test_round_robin() {
        let mut s = scheduler(2);
        assert_eq!(s.spawn(5, NULL_ADDR, NULL_ADDR), 1);
        assert_eq!(s.spawn(5, NULL_ADDR, NULL_ADDR), 2);
        assert_eq!(order(&s), vec![0, 1, 2]);

        let mut seen = Vec::new();
        for _ in 0..12 {
            seen.push(s.current().id);
            s.tick();
        }
        assert_eq!(seen, vec![0, 0, 1, 1, 2, 2, 0, 0, 1, 1, 2, 2]);
        assert_eq!(s.ready().next().map(|f| f.status), Some(FiberStatus::TimeSliceExceeded));
    }

    #[test]
    fn test_yield_refreshes_slice() {
        let mut s = scheduler(3);
        s.spawn(0, NULL_ADDR, NULL_ADDR);
        s.tick();
        s.yield_current();
        assert_eq!(s.current().id, 1);
        s.tick();
        s.tick();
        assert_eq!(s.current().id, 1);
        s.tick();
        assert_eq!(s.current().id, MAIN_FIBER);
    }

    #[test]
    fn test_retire() {
        let mut s = scheduler(10);
        assert_eq!(s.retire_current(), None);
        s.spawn(0, NULL_ADDR, NULL_ADDR);
        s.spawn(0, NULL_ADDR, NULL_ADDR);
        s.yield_current();
        let done = s.retire_current().unwrap();
        assert_eq!((done.id, done.status), (1, FiberStatus::Done));
        assert_eq!(order(&s), vec![2, 0]);
        assert_eq!(s.fiber_count(), 2);
    }
}
