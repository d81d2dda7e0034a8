//! Print sinks: where program output and VM diagnostics go.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::info;

use crate::fiber::FiberId;

/// Origin of a printed line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintSource {
    /// Program output from a fiber.
    Thread(FiberId),
    /// Diagnostics from a VM component (`GC`, `HEAP`).
    Component(&'static str),
}

impl fmt::Display for PrintSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrintSource::Thread(id) => write!(f, "thread {}", id),
            PrintSource::Component(tag) => f.write_str(tag),
        }
    }
}

pub trait PrintSink {
    fn print(&mut self, source: PrintSource, message: &str);
}

impl<F> PrintSink for F
where
    F: FnMut(PrintSource, &str),
{
    fn print(&mut self, source: PrintSource, message: &str) {
        self(source, message)
    }
}

/// Forwards every line as a `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl PrintSink for TracingSink {
    fn print(&mut self, source: PrintSource, message: &str) {
        match source {
            PrintSource::Thread(id) => info!(thread = id, "{}", message),
            PrintSource::Component(tag) => info!(component = tag, "{}", message),
        }
    }
}

/// Keeps every line in memory. Clones share the same buffer, so a test can
/// hand one clone to the VM and read from another.
#[derive(Debug, Default, Clone)]
pub struct CollectSink {
    lines: Rc<RefCell<Vec<(PrintSource, String)>>>,
}

impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(PrintSource, String)> {
        self.lines.borrow().clone()
    }

    /// Program output only, in print order.
    pub fn output(&self) -> Vec<String> {
        self.lines
            .borrow()
            .iter()
            .filter(|(source, _)| matches!(source, PrintSource::Thread(_)))
            .map(|(_, line)| line.clone())
            .collect()
    }

    /// Lines from one component.
    pub fn component(&self, tag: &str) -> Vec<String> {
        self.lines
            .borrow()
            .iter()
            .filter(|(source, _)| matches!(source, PrintSource::Component(t) if *t == tag))
            .map(|(_, line)| line.clone())
            .collect()
    }
}

impl PrintSink for CollectSink {
    fn print(&mut self, source: PrintSource, message: &str) {
        self.lines.borrow_mut().push((source, message.to_string()));
    }
}
